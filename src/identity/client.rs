// Public client application
// OAuth2 authorization code + PKCE and refresh token grants against the Microsoft identity platform

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::cache::SerializableTokenCache;
use super::callback::CallbackListener;
use super::pkce::{generate_state, PkcePair};
use super::types::{Account, IdTokenClaims, Prompt, TokenResponse};
use super::PublicClient;
use crate::error::AuthError;

/// Scopes added to every request so the endpoint returns refresh and ID tokens
const RESERVED_SCOPES: [&str; 3] = ["offline_access", "openid", "profile"];

/// Opens the authorize URL for the user
pub type BrowserLauncher = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Public (secretless) client registered with a single tenant authority
pub struct PublicClientApplication {
    client_id: String,
    /// `<authority host>/<tenant>`
    authority: String,
    /// Authority host name, recorded on cached accounts
    environment: String,
    tenant_id: String,
    http: Client,
    redirect_port: u16,
    interactive_timeout: Option<Duration>,
    open_browser: bool,
    launcher: BrowserLauncher,
}

impl PublicClientApplication {
    /// Create a client for `authority_host` (e.g. `https://login.microsoftonline.com`)
    pub fn new(
        client_id: impl Into<String>,
        authority_host: &str,
        tenant_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, AuthError> {
        let tenant_id = tenant_id.into();
        let host_url = Url::parse(authority_host).map_err(|e| {
            AuthError::Configuration(format!("invalid authority host '{}': {}", authority_host, e))
        })?;
        let environment = host_url
            .host_str()
            .ok_or_else(|| {
                AuthError::Configuration(format!("authority host '{}' has no host", authority_host))
            })?
            .to_string();

        let http = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client_id: client_id.into(),
            authority: format!("{}/{}", authority_host.trim_end_matches('/'), tenant_id),
            environment,
            tenant_id,
            http,
            redirect_port: 0,
            interactive_timeout: None,
            open_browser: true,
            launcher: Arc::new(|url: &str| webbrowser::open(url)),
        })
    }

    /// Fixed loopback port; 0 (the default) picks an ephemeral one
    pub fn with_redirect_port(mut self, port: u16) -> Self {
        self.redirect_port = port;
        self
    }

    pub fn with_interactive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.interactive_timeout = timeout;
        self
    }

    /// When disabled the authorize URL is only printed to stderr
    pub fn with_open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    pub fn with_browser_launcher(mut self, launcher: BrowserLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority)
    }

    fn authorize_url(
        &self,
        scopes: &[&str],
        prompt: Prompt,
        redirect_uri: &str,
        challenge: &str,
        state: &str,
    ) -> Result<Url, AuthError> {
        let endpoint = format!("{}/oauth2/v2.0/authorize", self.authority);
        let scope = wire_scope(scopes);
        Url::parse_with_params(
            &endpoint,
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", redirect_uri),
                ("response_mode", "query"),
                ("scope", scope.as_str()),
                ("state", state),
                ("prompt", prompt.as_str()),
                ("code_challenge", challenge),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| AuthError::Configuration(format!("invalid authority URL: {}", e)))
    }

    /// POST a grant to the token endpoint.
    /// OAuth error bodies come back as token-less responses, not as `Err`.
    async fn redeem(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let grant = form
            .iter()
            .find(|(k, _)| *k == "grant_type")
            .map(|(_, v)| *v)
            .unwrap_or_default();
        tracing::debug!(grant_type = grant, "Redeeming grant at token endpoint");

        let response = self
            .http
            .post(self.token_endpoint())
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<TokenResponse>(&body) {
            Ok(parsed) => {
                if !status.is_success() {
                    tracing::warn!(
                        status = %status,
                        error = parsed.error.as_deref().unwrap_or(""),
                        "Token endpoint rejected {} grant",
                        grant
                    );
                }
                Ok(parsed)
            }
            Err(_) => {
                let snippet: String = body.chars().take(200).collect();
                tracing::warn!(status = %status, "Token endpoint returned a non-JSON body");
                Ok(TokenResponse::from_error(
                    format!("http_{}", status.as_u16()),
                    Some(snippet).filter(|s| !s.is_empty()),
                ))
            }
        }
    }

    /// Store a successful response, keyed by the ID token's account when present
    fn remember(
        &self,
        scopes: &[&str],
        response: &TokenResponse,
        known_account: Option<&Account>,
        cache: &mut SerializableTokenCache,
    ) {
        let from_id_token = response
            .id_token
            .as_deref()
            .and_then(IdTokenClaims::decode)
            .and_then(|claims| claims.to_account(&self.environment, &self.tenant_id));

        match from_id_token.as_ref().or(known_account) {
            Some(account) => {
                cache.add(&self.client_id, account, scopes, response, Utc::now().timestamp());
            }
            None => {
                tracing::warn!("Token response carried no usable ID token; not caching the sign-in");
            }
        }
    }

    async fn launch_browser(&self, url: String) {
        if !self.open_browser {
            eprintln!("Open this URL in your browser to sign in to Microsoft 365:\n\n{}\n", url);
            return;
        }

        let launcher = Arc::clone(&self.launcher);
        let browser_url = url.clone();
        let result = tokio::task::spawn_blocking(move || launcher(&browser_url)).await;
        let failure = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };
        eprintln!(
            "Unable to open browser: {}. Please open the URL manually instead:\n{}",
            failure, url
        );
    }
}

#[async_trait]
impl PublicClient for PublicClientApplication {
    async fn acquire_token_silent(
        &self,
        scopes: &[&str],
        account: &Account,
        cache: &mut SerializableTokenCache,
    ) -> Result<Option<TokenResponse>, AuthError> {
        let now = Utc::now().timestamp();

        if let Some(entry) = cache.find_access_token(account, &self.client_id, scopes, now) {
            tracing::debug!("Using cached access token for {}", account.username);
            return Ok(Some(TokenResponse {
                access_token: Some(entry.secret.clone()),
                expires_in: Some(entry.expires_on - now),
                scope: Some(entry.target.clone()),
                token_type: Some("Bearer".to_string()),
                ..Default::default()
            }));
        }

        let refresh_token = match cache.find_refresh_token(account, &self.client_id) {
            Some(entry) => entry.secret.clone(),
            None => {
                tracing::debug!("No refresh token cached for {}", account.username);
                return Ok(None);
            }
        };

        tracing::info!("Refreshing access token for {}", account.username);
        let scope = wire_scope(scopes);
        let response = self
            .redeem(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("scope", scope.as_str()),
            ])
            .await?;

        if response.access_token().is_some() {
            self.remember(scopes, &response, Some(account), cache);
        } else if response.error.as_deref() == Some("invalid_grant") {
            cache.remove_refresh_token(account, &self.client_id);
        }

        Ok(Some(response))
    }

    async fn acquire_token_interactive(
        &self,
        scopes: &[&str],
        prompt: Prompt,
        cache: &mut SerializableTokenCache,
    ) -> Result<TokenResponse, AuthError> {
        let listener = CallbackListener::bind(self.redirect_port).await?;
        let redirect_uri = listener.redirect_uri();
        let pkce = PkcePair::generate();
        let state = generate_state();

        let url = self.authorize_url(scopes, prompt, &redirect_uri, &pkce.challenge, &state)?;
        tracing::info!(port = listener.port(), "Waiting for sign-in redirect");
        self.launch_browser(url.to_string()).await;

        let payload = listener.wait(&state, self.interactive_timeout).await?;

        if let Some(error) = payload.error {
            tracing::warn!("Sign-in returned error: {}", error);
            return Ok(TokenResponse::from_error(error, payload.error_description));
        }
        let code = payload
            .code
            .ok_or_else(|| AuthError::Callback("redirect carried no authorization code".to_string()))?;

        let scope = wire_scope(scopes);
        let response = self
            .redeem(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("code", code.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("code_verifier", pkce.verifier.as_str()),
                ("scope", scope.as_str()),
            ])
            .await?;

        if response.access_token().is_some() {
            self.remember(scopes, &response, None, cache);
        }

        Ok(response)
    }
}

fn wire_scope(scopes: &[&str]) -> String {
    scopes
        .iter()
        .chain(RESERVED_SCOPES.iter())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(host: &str) -> PublicClientApplication {
        PublicClientApplication::new("abc", host, "contoso", Duration::from_secs(5)).unwrap()
    }

    fn account() -> Account {
        Account {
            home_account_id: "oid.contoso".to_string(),
            environment: "127.0.0.1".to_string(),
            realm: "contoso".to_string(),
            username: "adele@contoso.com".to_string(),
            local_account_id: "oid".to_string(),
        }
    }

    #[test]
    fn test_authority_and_environment() {
        let app = app("https://login.microsoftonline.com/");
        assert_eq!(app.authority(), "https://login.microsoftonline.com/contoso");
        assert_eq!(app.environment, "login.microsoftonline.com");
    }

    #[test]
    fn test_invalid_authority_host() {
        let err = PublicClientApplication::new("abc", "not a url", "t", Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn test_wire_scope_appends_reserved_scopes() {
        assert_eq!(
            wire_scope(&["Mail.Read", "User.Read"]),
            "Mail.Read User.Read offline_access openid profile"
        );
    }

    #[test]
    fn test_authorize_url_parameters() {
        let app = app("https://login.microsoftonline.com");
        let url = app
            .authorize_url(
                &["Mail.Read"],
                Prompt::SelectAccount,
                "http://localhost:5000",
                "chal",
                "st",
            )
            .unwrap();
        assert_eq!(url.path(), "/contoso/oauth2/v2.0/authorize");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["prompt"], "select_account");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["redirect_uri"], "http://localhost:5000");
        assert_eq!(pairs["response_type"], "code");
    }

    #[tokio::test]
    async fn test_silent_without_refresh_token_is_none() {
        let app = app("https://login.microsoftonline.com");
        let mut cache = SerializableTokenCache::new();
        let result = app
            .acquire_token_silent(&["Mail.Read"], &account(), &mut cache)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(!cache.has_state_changed());
    }

    #[tokio::test]
    async fn test_silent_refresh_updates_cache() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/contoso/oauth2/v2.0/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                mockito::Matcher::UrlEncoded("refresh_token".into(), "rt-old".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"at-new","refresh_token":"rt-new","expires_in":3600,"scope":"Mail.Read"}"#)
            .create_async()
            .await;

        let app = app(&server.url());
        let mut cache = SerializableTokenCache::new();
        cache.add(
            "abc",
            &account(),
            &["Mail.Read"],
            &TokenResponse {
                refresh_token: Some("rt-old".to_string()),
                ..Default::default()
            },
            0,
        );
        let blob = cache.serialize().unwrap();
        let mut cache = SerializableTokenCache::new();
        cache.deserialize(&blob).unwrap();

        let result = app
            .acquire_token_silent(&["Mail.Read"], &account(), &mut cache)
            .await
            .unwrap()
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.access_token(), Some("at-new"));
        assert!(cache.has_state_changed());
        assert_eq!(cache.find_refresh_token(&account(), "abc").unwrap().secret, "rt-new");
    }

    #[tokio::test]
    async fn test_silent_invalid_grant_drops_refresh_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/contoso/oauth2/v2.0/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant","error_description":"AADSTS70000: expired"}"#)
            .create_async()
            .await;

        let app = app(&server.url());
        let mut cache = SerializableTokenCache::new();
        cache.add(
            "abc",
            &account(),
            &["Mail.Read"],
            &TokenResponse {
                refresh_token: Some("rt".to_string()),
                ..Default::default()
            },
            0,
        );

        let result = app
            .acquire_token_silent(&["Mail.Read"], &account(), &mut cache)
            .await
            .unwrap()
            .unwrap();

        assert!(result.access_token().is_none());
        assert_eq!(result.error_detail(), "AADSTS70000: expired");
        assert!(cache.find_refresh_token(&account(), "abc").is_none());
    }

    #[tokio::test]
    async fn test_non_json_token_endpoint_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/contoso/oauth2/v2.0/token")
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let app = app(&server.url());
        let response = app.redeem(&[("grant_type", "refresh_token")]).await.unwrap();
        assert_eq!(response.error.as_deref(), Some("http_502"));
        assert_eq!(response.error_detail(), "Bad Gateway");
    }
}
