//! HTTP client for the remote entry service.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::error::{RemoteError, RemoteResult};
use super::remote::{RemoteClient, RemoteRecord};
use crate::config::RemoteConfig;
use crate::models::EntryId;
use crate::util::compact_text;

#[derive(Clone)]
pub struct HttpRemoteClient {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteClient")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpRemoteClient {
    pub fn new(config: &RemoteConfig) -> crate::Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeouts().request)
            .build()
            .map_err(|error| {
                crate::Error::Config(format!("failed to build HTTP client: {error}"))
            })?;

        Ok(Self {
            base_url: config.remote_url()?,
            auth_token: config.auth_token.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, self.url(path))
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> RemoteResult<reqwest::Response> {
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

#[derive(Debug, Deserialize)]
struct EntriesResponse {
    entries: Vec<RemoteRecord>,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    valid: bool,
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn list_modified_since(&self, timestamp: i64) -> RemoteResult<Vec<RemoteRecord>> {
        let request = self
            .request(reqwest::Method::GET, "/v1/entries")
            .query(&[("since", timestamp)]);
        let response = self.send(request).await?;
        let payload = response
            .json::<EntriesResponse>()
            .await
            .map_err(transport_error)?;
        Ok(payload.entries)
    }

    async fn create_or_update(&self, record: &RemoteRecord) -> RemoteResult<RemoteRecord> {
        let request = self
            .request(reqwest::Method::PUT, &format!("/v1/entries/{}", record.id))
            .json(record);
        let response = self.send(request).await?;
        response
            .json::<RemoteRecord>()
            .await
            .map_err(transport_error)
    }

    async fn delete(&self, id: &EntryId) -> RemoteResult<()> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/v1/entries/{id}"))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        // Already gone counts as deleted
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    async fn validate_token(&self) -> RemoteResult<bool> {
        if self.auth_token.is_none() {
            return Ok(false);
        }
        let request = self.request(reqwest::Method::GET, "/v1/auth/validate");
        match self.send(request).await {
            Ok(response) => Ok(response
                .json::<ValidateResponse>()
                .await
                .map_err(transport_error)?
                .valid),
            Err(RemoteError::Auth(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    RemoteError::Network(error.to_string())
}

fn status_error(status: StatusCode, body: &str) -> RemoteError {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Auth(message),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            RemoteError::Validation(message)
        }
        _ => RemoteError::Network(message),
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP ({})", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            RemoteError::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, ""),
            RemoteError::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, ""),
            RemoteError::Validation(_)
        ));
        assert!(matches!(
            status_error(StatusCode::CONFLICT, ""),
            RemoteError::Validation(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            RemoteError::Network(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            RemoteError::Network(_)
        ));
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        assert_eq!(
            parse_api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                r#"{"message":" text too long ","error":"invalid"}"#
            ),
            "text too long (422)"
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
        assert_eq!(parse_api_error(StatusCode::NOT_FOUND, "  "), "HTTP (404)");
    }

    #[test]
    fn new_rejects_invalid_config() {
        assert!(HttpRemoteClient::new(&RemoteConfig::default()).is_err());

        let config = RemoteConfig {
            base_url: Some("https://sync.example.com/".to_string()),
            auth_token: Some("secret".to_string()),
            ..RemoteConfig::default()
        };
        let client = HttpRemoteClient::new(&config).unwrap();
        assert_eq!(client.url("/v1/entries"), "https://sync.example.com/v1/entries");
        assert!(!format!("{client:?}").contains("secret"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_token_never_validates() {
        let config = RemoteConfig {
            base_url: Some("http://127.0.0.1:9".to_string()),
            ..RemoteConfig::default()
        };
        let client = HttpRemoteClient::new(&config).unwrap();
        assert_eq!(client.validate_token().await, Ok(false));
    }
}
