// Identity provider types

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// A previously authenticated identity stored in the token cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// `<object id>.<tenant id>`
    pub home_account_id: String,
    /// Authority host the account signed in against
    pub environment: String,
    /// Tenant the tokens were issued by
    pub realm: String,
    pub username: String,
    #[serde(default)]
    pub local_account_id: String,
}

/// Prompt behaviour for the authorize request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Always show the account picker, even with an existing browser session
    SelectAccount,
    Login,
    Consent,
}

impl Prompt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Prompt::SelectAccount => "select_account",
            Prompt::Login => "login",
            Prompt::Consent => "consent",
        }
    }
}

/// Body of a token endpoint response, successful or not
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// A response carrying only an OAuth error
    pub fn from_error(error: impl Into<String>, description: Option<String>) -> Self {
        Self {
            error: Some(error.into()),
            error_description: description,
            ..Default::default()
        }
    }

    /// The bearer token, if the response carries a non-empty one
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Human-readable reason for a missing token
    pub fn error_detail(&self) -> &str {
        self.error_description
            .as_deref()
            .filter(|d| !d.is_empty())
            .or_else(|| self.error.as_deref().filter(|e| !e.is_empty()))
            .unwrap_or("Unknown error")
    }
}

/// Claims read from an ID token. Signature is not verified; the claims only
/// label cache entries.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct IdTokenClaims {
    pub oid: Option<String>,
    pub tid: Option<String>,
    pub sub: Option<String>,
    pub preferred_username: Option<String>,
    pub email: Option<String>,
}

impl IdTokenClaims {
    pub(crate) fn decode(id_token: &str) -> Option<Self> {
        let payload = id_token.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Build the cache account for these claims
    pub(crate) fn to_account(&self, environment: &str, fallback_realm: &str) -> Option<Account> {
        let local_id = self.oid.clone().or_else(|| self.sub.clone())?;
        let realm = self
            .tid
            .clone()
            .unwrap_or_else(|| fallback_realm.to_string());
        let username = self
            .preferred_username
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_default();

        Some(Account {
            home_account_id: format!("{}.{}", local_id, realm),
            environment: environment.to_string(),
            realm,
            username,
            local_account_id: local_id,
        })
    }
}
