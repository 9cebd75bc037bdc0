// Microsoft Graph module
// Authenticated v1.0 calls for mail, calendar and the user profile

mod calendar;
mod client;
mod mail;
pub mod models;

pub use client::GraphClient;
pub use mail::NewMessage;

#[cfg(test)]
pub(crate) use client::test_support;
