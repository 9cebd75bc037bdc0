// Authentication module
// Token acquisition, on-disk caching and the process-wide token slot

mod authority;
mod cache;
mod holder;

use async_trait::async_trait;

use crate::error::AuthError;

pub use authority::TokenAuthority;
pub use cache::TokenCache;
pub use holder::TokenHolder;

/// Permissions requested on every acquisition, silent or interactive
pub const SCOPES: [&str; 5] = [
    "Mail.Read",
    "Mail.ReadWrite",
    "Mail.Send",
    "Calendars.Read",
    "User.Read",
];

/// Anything that can hand out a bearer token
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire(&self) -> Result<String, AuthError>;
}
