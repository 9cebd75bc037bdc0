// Serializable token cache
// In-memory store of accounts and tokens with a serialize/deserialize contract

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{Account, TokenResponse};

/// Access tokens expiring within this window are treated as expired
const EXPIRY_BUFFER_SECS: i64 = 300;

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenEntry {
    pub home_account_id: String,
    pub environment: String,
    pub client_id: String,
    pub realm: String,
    /// Space separated scopes the token was granted for
    pub target: String,
    pub secret: String,
    /// Unix timestamp (seconds)
    pub expires_on: i64,
    pub cached_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenEntry {
    pub home_account_id: String,
    pub environment: String,
    pub client_id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CacheState {
    #[serde(rename = "Account", default)]
    accounts: BTreeMap<String, Account>,
    #[serde(rename = "AccessToken", default)]
    access_tokens: BTreeMap<String, AccessTokenEntry>,
    #[serde(rename = "RefreshToken", default)]
    refresh_tokens: BTreeMap<String, RefreshTokenEntry>,
}

/// Token cache that callers persist as an opaque string.
///
/// Every mutation after construction or [`deserialize`](Self::deserialize)
/// raises `has_state_changed`, which is the signal that the blob needs to be
/// written back.
#[derive(Debug, Clone, Default)]
pub struct SerializableTokenCache {
    state: CacheState,
    state_changed: bool,
}

impl SerializableTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache contents with a previously serialized blob.
    /// An empty blob yields an empty cache.
    pub fn deserialize(&mut self, blob: &str) -> Result<(), serde_json::Error> {
        self.state = if blob.trim().is_empty() {
            CacheState::default()
        } else {
            serde_json::from_str(blob)?
        };
        self.state_changed = false;
        Ok(())
    }

    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.state)
    }

    pub fn has_state_changed(&self) -> bool {
        self.state_changed
    }

    /// Accounts in stable key order
    pub fn accounts(&self) -> Vec<Account> {
        self.state.accounts.values().cloned().collect()
    }

    /// Cached access token covering `scopes` that is still valid at `now`
    pub fn find_access_token(
        &self,
        account: &Account,
        client_id: &str,
        scopes: &[&str],
        now: i64,
    ) -> Option<&AccessTokenEntry> {
        self.state.access_tokens.values().find(|entry| {
            entry.home_account_id == account.home_account_id
                && entry.environment == account.environment
                && entry.client_id == client_id
                && entry.realm == account.realm
                && entry.expires_on > now + EXPIRY_BUFFER_SECS
                && target_covers(&entry.target, scopes)
        })
    }

    pub fn find_refresh_token(
        &self,
        account: &Account,
        client_id: &str,
    ) -> Option<&RefreshTokenEntry> {
        self.state
            .refresh_tokens
            .get(&refresh_token_key(account, client_id))
    }

    /// Record the outcome of a successful token request for `account`
    pub fn add(
        &mut self,
        client_id: &str,
        account: &Account,
        requested_scopes: &[&str],
        response: &TokenResponse,
        now: i64,
    ) {
        self.state
            .accounts
            .insert(account_key(account), account.clone());

        if let Some(secret) = response.refresh_token.as_deref().filter(|s| !s.is_empty()) {
            self.state.refresh_tokens.insert(
                refresh_token_key(account, client_id),
                RefreshTokenEntry {
                    home_account_id: account.home_account_id.clone(),
                    environment: account.environment.clone(),
                    client_id: client_id.to_string(),
                    secret: secret.to_string(),
                },
            );
        }

        if let Some(secret) = response.access_token() {
            let target = response
                .scope
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| requested_scopes.join(" "));

            // One live access token per account/client/realm
            self.state.access_tokens.retain(|_, entry| {
                !(entry.home_account_id == account.home_account_id
                    && entry.environment == account.environment
                    && entry.client_id == client_id
                    && entry.realm == account.realm)
            });

            let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
            let entry = AccessTokenEntry {
                home_account_id: account.home_account_id.clone(),
                environment: account.environment.clone(),
                client_id: client_id.to_string(),
                realm: account.realm.clone(),
                target: target.clone(),
                secret: secret.to_string(),
                expires_on: now + expires_in,
                cached_at: now,
            };
            self.state
                .access_tokens
                .insert(access_token_key(account, client_id, &target), entry);
        }

        self.state_changed = true;
    }

    /// Forget the refresh token for `account` (e.g. after `invalid_grant`)
    pub fn remove_refresh_token(&mut self, account: &Account, client_id: &str) {
        if self
            .state
            .refresh_tokens
            .remove(&refresh_token_key(account, client_id))
            .is_some()
        {
            self.state_changed = true;
        }
    }
}

fn account_key(account: &Account) -> String {
    format!(
        "{}-{}-{}",
        account.home_account_id, account.environment, account.realm
    )
    .to_lowercase()
}

fn refresh_token_key(account: &Account, client_id: &str) -> String {
    format!(
        "{}-{}-refreshtoken-{}--",
        account.home_account_id, account.environment, client_id
    )
    .to_lowercase()
}

fn access_token_key(account: &Account, client_id: &str, target: &str) -> String {
    format!(
        "{}-{}-accesstoken-{}-{}-{}",
        account.home_account_id, account.environment, client_id, account.realm, target
    )
    .to_lowercase()
}

/// Scope names compare case-insensitively and ignore a resource prefix
/// such as `https://graph.microsoft.com/`.
fn normalize_scope(scope: &str) -> String {
    scope
        .rsplit('/')
        .next()
        .unwrap_or(scope)
        .to_lowercase()
}

fn target_covers(target: &str, scopes: &[&str]) -> bool {
    let granted: Vec<String> = target.split_whitespace().map(normalize_scope).collect();
    scopes
        .iter()
        .all(|scope| granted.contains(&normalize_scope(scope)))
}
