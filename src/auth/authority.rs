// Token authority
// Silent acquisition from the cache first, interactive sign-in as the fallback

use async_trait::async_trait;
use std::time::Duration;

use super::cache::TokenCache;
use super::{TokenSource, SCOPES};
use crate::config::Config;
use crate::error::AuthError;
use crate::identity::{Prompt, PublicClient, PublicClientApplication};

/// Produces bearer tokens for [`SCOPES`], preferring non-interactive paths
pub struct TokenAuthority<C: PublicClient> {
    client_id: String,
    tenant_id: String,
    cache: TokenCache,
    client: C,
}

impl<C: PublicClient> TokenAuthority<C> {
    /// Both identifiers are required; blanks are rejected before any I/O
    pub fn new(
        client_id: impl Into<String>,
        tenant_id: impl Into<String>,
        cache: TokenCache,
        client: C,
    ) -> Result<Self, AuthError> {
        let client_id = client_id.into();
        let tenant_id = tenant_id.into();

        if client_id.trim().is_empty() {
            return Err(AuthError::Configuration(
                "client id (MS_CLIENT_ID) is required".to_string(),
            ));
        }
        if tenant_id.trim().is_empty() {
            return Err(AuthError::Configuration(
                "tenant id (MS_TENANT_ID) is required".to_string(),
            ));
        }

        Ok(Self {
            client_id,
            tenant_id,
            cache,
            client,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Obtain a bearer token.
    ///
    /// Tries the first cached account silently; if that yields nothing, opens
    /// the browser once with an account picker. The cache file is rewritten
    /// only when the identity library reports a change.
    pub async fn acquire(&self) -> Result<String, AuthError> {
        let mut cache = self.cache.load()?;

        if let Some(account) = cache.accounts().into_iter().next() {
            tracing::debug!(
                tenant = %self.tenant_id,
                "Attempting silent token acquisition for {}",
                account.username
            );

            match self
                .client
                .acquire_token_silent(&SCOPES, &account, &mut cache)
                .await?
            {
                Some(result) => match result.access_token() {
                    Some(token) => {
                        self.cache.save(&cache)?;
                        tracing::info!("Token acquired silently for {}", account.username);
                        return Ok(token.to_string());
                    }
                    None => tracing::info!(
                        "Silent token acquisition failed: {}",
                        result.error_detail()
                    ),
                },
                None => tracing::debug!("No usable cached credentials for {}", account.username),
            }
        }

        tracing::info!("No cached token found. Opening browser for Microsoft login...");
        let result = self
            .client
            .acquire_token_interactive(&SCOPES, Prompt::SelectAccount, &mut cache)
            .await?;

        let token = match result.access_token() {
            Some(token) => token.to_string(),
            None => {
                let detail = result.error_detail();
                tracing::error!("Interactive sign-in failed: {}", detail);
                return Err(AuthError::Acquisition(detail.to_string()));
            }
        };

        self.cache.save(&cache)?;
        tracing::info!("Token acquired interactively");
        Ok(token)
    }
}

impl TokenAuthority<PublicClientApplication> {
    /// Build the authority with the real identity platform client
    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        let client = PublicClientApplication::new(
            config.client_id.clone(),
            &config.authority_host,
            config.tenant_id.clone(),
            Duration::from_secs(config.http_timeout),
        )?
        .with_redirect_port(config.redirect_port)
        .with_interactive_timeout(config.interactive_timeout.map(Duration::from_secs))
        .with_open_browser(config.open_browser);

        tracing::debug!("Token authority: {}", client.authority());

        Self::new(
            config.client_id.clone(),
            config.tenant_id.clone(),
            TokenCache::new(config.token_cache_path.clone()),
            client,
        )
    }
}

#[async_trait]
impl<C: PublicClient> TokenSource for TokenAuthority<C> {
    async fn acquire(&self) -> Result<String, AuthError> {
        TokenAuthority::acquire(self).await
    }
}
