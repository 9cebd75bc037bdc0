use anyhow::{Context, Result as AnyResult};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::models::User;
use crate::auth::TokenHolder;
use crate::error::{ApiError, Result};

/// Authenticated client for Microsoft Graph.
/// Every request presents the token held by the shared [`TokenHolder`]; there
/// are no retries and a 401 is surfaced as-is.
pub struct GraphClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Process-wide token slot
    tokens: Arc<TokenHolder>,

    /// e.g. `https://graph.microsoft.com/v1.0`
    base_url: Url,
}

impl GraphClient {
    pub fn new(tokens: Arc<TokenHolder>, base_url: &str, request_timeout: u64) -> AnyResult<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid Graph base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Graph base URL cannot carry a path: {}", base_url);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            tokens,
            base_url,
        })
    }

    /// Build `<base>/<segments...>`, percent-encoding each segment
    fn url_for(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Internal(anyhow::anyhow!("Graph base URL cannot be a base")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and return the decoded JSON body.
    /// 202, 204 and empty bodies become `{"status": "success"}`.
    pub async fn request(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let token = self.tokens.get().await?;
        let url = self.url_for(segments)?;

        tracing::debug!(method = %method, url = %url, "Sending Graph request");

        let mut request = self
            .client
            .request(method.clone(), url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let message = String::from_utf8_lossy(&bytes).into_owned();
            tracing::warn!(status = %status, method = %method, "Graph request failed");
            return Err(ApiError::GraphApi {
                status: status.as_u16(),
                message,
            });
        }

        if status == StatusCode::ACCEPTED || status == StatusCode::NO_CONTENT || bytes.is_empty() {
            return Ok(serde_json::json!({"status": "success"}));
        }

        serde_json::from_slice(&bytes)
            .context("Microsoft Graph returned invalid JSON")
            .map_err(ApiError::Internal)
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T> {
        let value = self.request(Method::GET, segments, query, None).await?;
        decode(value)
    }

    pub(crate) async fn post<B: Serialize>(&self, segments: &[&str], body: &B) -> Result<Value> {
        let body = serde_json::to_value(body)
            .context("Failed to encode request body")
            .map_err(ApiError::Internal)?;
        self.request(Method::POST, segments, &[], Some(&body)).await
    }

    /// `GET /me`
    pub async fn get_me(&self) -> Result<User> {
        self.get(&["me"], &[]).await
    }
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .context("Unexpected response shape from Microsoft Graph")
        .map_err(ApiError::Internal)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::TokenSource;
    use crate::error::AuthError;
    use async_trait::async_trait;

    pub(crate) struct StaticToken(pub &'static str);

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn acquire(&self) -> std::result::Result<String, AuthError> {
            Ok(self.0.to_string())
        }
    }

    pub(crate) fn graph_for(server: &mockito::ServerGuard) -> GraphClient {
        let holder = Arc::new(TokenHolder::new(Arc::new(StaticToken("test-token"))));
        GraphClient::new(holder, &server.url(), 5).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::graph_for;
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_request_sends_bearer_and_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/me")
            .match_header("authorization", "Bearer test-token")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"{"displayName":"Adele Vance","mail":"adele@contoso.com"}"#)
            .create_async()
            .await;

        let graph = graph_for(&server);
        let me = graph.get_me().await.unwrap();

        mock.assert_async().await;
        assert_eq!(me.display_name.as_deref(), Some("Adele Vance"));
    }

    #[tokio::test]
    async fn test_accepted_and_empty_bodies_are_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/me/sendMail")
            .with_status(202)
            .create_async()
            .await;
        server
            .mock("GET", "/me/empty")
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let graph = graph_for(&server);
        let sent = graph
            .post(&["me", "sendMail"], &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(sent, serde_json::json!({"status": "success"}));

        let empty = graph
            .request(Method::GET, &["me", "empty"], &[], None)
            .await
            .unwrap();
        assert_eq!(empty["status"], "success");
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/me")
            .with_status(401)
            .with_body(r#"{"error":{"code":"InvalidAuthenticationToken"}}"#)
            .create_async()
            .await;

        let graph = graph_for(&server);
        match graph.get_me().await.unwrap_err() {
            ApiError::GraphApi { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("InvalidAuthenticationToken"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_path_segments_are_encoded_and_query_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/me/messages/AAMk%2Fabc")
            .match_query(Matcher::UrlEncoded("$select".into(), "id".into()))
            .with_status(200)
            .with_body(r#"{"id":"AAMk/abc"}"#)
            .create_async()
            .await;

        let graph = graph_for(&server);
        let value = graph
            .request(
                Method::GET,
                &["me", "messages", "AAMk/abc"],
                &[("$select", "id".to_string())],
                None,
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(value["id"], "AAMk/abc");
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let holder = Arc::new(TokenHolder::new(Arc::new(test_support::StaticToken("t"))));
        assert!(GraphClient::new(holder, "mailto:someone", 5).is_err());
        let holder = Arc::new(TokenHolder::new(Arc::new(test_support::StaticToken("t"))));
        assert!(GraphClient::new(holder, "not a url", 5).is_err());
    }
}
