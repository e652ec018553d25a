//! API client for the habitlink partner API.
//!
//! This module provides the `ApiClient` struct for exchanging a partner
//! user id for a bearer token and for reporting habit completions.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use reqwest::{header, Client, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SdkConfig;

use super::{ApiError, ApiErrorKind, ApiRequest};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct CreateBearerTokenRequest<'a> {
    #[serde(rename = "partnerUserId")]
    partner_user_id: &'a str,
    #[serde(rename = "partnerId")]
    partner_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateBearerTokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct CompleteDailyHabitResponse {
    message: String,
}

/// The two remote operations the session coordinator depends on.
///
/// `ApiClient` is the production implementation; tests substitute their own.
pub trait PartnerApi: Send + Sync {
    /// Exchange `user_id` for a bearer token.
    fn authenticate_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<String, ApiError>>;

    /// Report today's habit as completed on behalf of the token's owner.
    fn complete_daily_habit<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<(), ApiError>>;
}

/// API client for the partner API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    partner_id: String,
    last_token: Arc<Mutex<Option<String>>>,
}

impl ApiClient {
    /// Create a new API client for the configured environment
    pub fn new(config: &SdkConfig) -> anyhow::Result<Self> {
        Self::with_base_url(config, config.environment.base_url())
    }

    /// Create a client against an explicit base URL (local servers, self-hosted backends)
    pub fn with_base_url(config: &SdkConfig, base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        // Url::join replaces the last path segment unless the base ends with '/'
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            partner_id: config.partner_id.clone(),
            last_token: Arc::new(Mutex::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Last token returned by `createBearerToken`. A hint only: the
    /// credential store stays authoritative.
    pub fn last_token(&self) -> Option<String> {
        self.last_token.lock().clone()
    }

    /// Exchange a partner user id for a bearer token
    pub async fn authenticate_user(&self, user_id: &str) -> Result<String, ApiError> {
        let request = ApiRequest::CreateBearerToken;
        let body = CreateBearerTokenRequest {
            partner_user_id: user_id,
            partner_id: &self.partner_id,
        };

        let response: CreateBearerTokenResponse = self.post(request, &body, None).await?;
        debug!(token_len = response.token.len(), "Bearer token received");

        *self.last_token.lock() = Some(response.token.clone());
        Ok(response.token)
    }

    /// Mark today's habit as completed
    pub async fn complete_daily_habit(&self, token: &str) -> Result<(), ApiError> {
        let request = ApiRequest::CompleteDailyHabit;
        let response: CompleteDailyHabitResponse = self
            .post(request, &serde_json::json!({}), Some(token))
            .await?;
        debug!(message = %response.message, "Daily habit completion acknowledged");
        Ok(())
    }

    fn endpoint(&self, request: ApiRequest) -> Result<Url, ApiError> {
        Url::parse(&self.base_url)
            .and_then(|base| base.join(request.path()))
            .map_err(|e| {
                ApiError::new(
                    request,
                    ApiErrorKind::InvalidUrl(format!("{}{}: {}", self.base_url, request.path(), e)),
                )
            })
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(
        request: ApiRequest,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%request, status = status.as_u16(), "Partner API returned an error status");
            Err(ApiError::from_status(request, status, &body))
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        request: ApiRequest,
        body: &B,
        bearer: Option<&str>,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(request)?;
        let payload = serde_json::to_vec(body)
            .map_err(|e| ApiError::new(request, ApiErrorKind::EncodingFailed(e.to_string())))?;

        let mut builder = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json")
            .body(payload);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::transport(request, &e))?;
        let response = Self::check_response(request, response).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::transport(request, &e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::new(request, ApiErrorKind::DecodingFailed(e.to_string())))
    }
}

impl PartnerApi for ApiClient {
    fn authenticate_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<String, ApiError>> {
        ApiClient::authenticate_user(self, user_id).boxed()
    }

    fn complete_daily_habit<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
        ApiClient::complete_daily_habit(self, token).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use mockito::Matcher;

    fn config() -> SdkConfig {
        SdkConfig::new("partner-42", Environment::Staging)
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = ApiClient::with_base_url(&config(), "https://example.test/v1")
            .expect("client should build");
        assert_eq!(client.base_url(), "https://example.test/v1/");
        assert_eq!(
            client.endpoint(ApiRequest::CreateBearerToken).unwrap().as_str(),
            "https://example.test/v1/createBearerToken"
        );
    }

    #[test]
    fn test_unparseable_base_url_is_invalid_url() {
        let client = ApiClient::with_base_url(&config(), "not a url").expect("client should build");
        let err = client.endpoint(ApiRequest::CompleteDailyHabit).unwrap_err();
        assert_eq!(err.request, ApiRequest::CompleteDailyHabit);
        assert!(matches!(err.kind, ApiErrorKind::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_authenticate_user_posts_ids_and_returns_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/createBearerToken")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::json!({
                "partnerUserId": "u1",
                "partnerId": "partner-42",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token":"tok-u1"}"#)
            .create_async()
            .await;

        let client = ApiClient::with_base_url(&config(), &server.url()).unwrap();
        let token = client.authenticate_user("u1").await.expect("token");

        mock.assert_async().await;
        assert_eq!(token, "tok-u1");
        assert_eq!(client.last_token().as_deref(), Some("tok-u1"));
    }

    #[tokio::test]
    async fn test_authenticate_user_server_error_is_request_failed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/createBearerToken")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let client = ApiClient::with_base_url(&config(), &server.url()).unwrap();
        let err = client.authenticate_user("u1").await.unwrap_err();

        assert_eq!(err.request, ApiRequest::CreateBearerToken);
        assert_eq!(err.status(), Some(500));
        assert!(client.last_token().is_none());
    }

    #[tokio::test]
    async fn test_authenticate_user_unexpected_body_is_decoding_failed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/createBearerToken")
            .with_status(200)
            .with_body(r#"{"jwt":"nope"}"#)
            .create_async()
            .await;

        let client = ApiClient::with_base_url(&config(), &server.url()).unwrap();
        let err = client.authenticate_user("u1").await.unwrap_err();

        assert_eq!(err.request, ApiRequest::CreateBearerToken);
        assert!(matches!(err.kind, ApiErrorKind::DecodingFailed(_)));
    }

    #[tokio::test]
    async fn test_complete_daily_habit_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/completeDailyHabit")
            .match_header("authorization", "Bearer tok-u1")
            .with_status(201)
            .with_body(r#"{"message":"streak extended"}"#)
            .create_async()
            .await;

        let client = ApiClient::with_base_url(&config(), &server.url()).unwrap();
        client.complete_daily_habit("tok-u1").await.expect("completion");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_daily_habit_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/completeDailyHabit")
            .with_status(401)
            .create_async()
            .await;

        let client = ApiClient::with_base_url(&config(), &server.url()).unwrap();
        let err = client.complete_daily_habit("stale").await.unwrap_err();

        assert_eq!(err.request, ApiRequest::CompleteDailyHabit);
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_connection_refused_is_request_failed_without_status() {
        // Bind and drop a listener so the port is very likely closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::with_base_url(&config(), &format!("http://{}", addr)).unwrap();
        let err = client.authenticate_user("u1").await.unwrap_err();

        assert!(matches!(
            err.kind,
            ApiErrorKind::RequestFailed { status: None, .. }
        ));
    }
}
