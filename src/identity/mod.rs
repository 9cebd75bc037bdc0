// Identity provider module
// Public-client OAuth2 against the Microsoft identity platform and its serializable token cache

mod cache;
mod callback;
mod client;
mod pkce;
mod types;

use async_trait::async_trait;

use crate::error::AuthError;

pub use cache::{AccessTokenEntry, RefreshTokenEntry, SerializableTokenCache};
pub use client::{BrowserLauncher, PublicClientApplication};
pub use types::{Account, Prompt, TokenResponse};

/// Token acquisition primitives offered by an identity provider client
#[async_trait]
pub trait PublicClient: Send + Sync {
    /// Obtain a token for `account` without user interaction.
    ///
    /// Returns `Ok(None)` when the cache holds nothing usable for the account,
    /// and `Ok(Some(..))` without an access token when the provider refused the
    /// stored refresh material.
    async fn acquire_token_silent(
        &self,
        scopes: &[&str],
        account: &Account,
        cache: &mut SerializableTokenCache,
    ) -> Result<Option<TokenResponse>, AuthError>;

    /// Run the browser sign-in. Blocks until the user completes or abandons it.
    async fn acquire_token_interactive(
        &self,
        scopes: &[&str],
        prompt: Prompt,
        cache: &mut SerializableTokenCache,
    ) -> Result<TokenResponse, AuthError>;
}
