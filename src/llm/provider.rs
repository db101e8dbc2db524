//! Provider client: a single HTTP call made with a single credential.
//!
//! The two vendors use different request and response envelopes. Each has an
//! adapter module (`gemini`, `openai`) that builds the request body and pulls
//! the candidate text out of the response. Everything above this layer only
//! sees [`NormalizedResponse`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::llm::credentials::{Credential, ProviderKind};
use crate::llm::{gemini, openai};

/// Provider-agnostic result of a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedResponse {
    /// Which backend produced the text.
    pub provider: ProviderKind,
    /// Candidate text exactly as the model returned it.
    pub text: String,
}

/// Performs a single call against the backend named by the credential.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn call(
        &self,
        prompt: &str,
        credential: &Credential,
    ) -> Result<NormalizedResponse, LlmError>;
}

/// reqwest-backed client for both vendors.
pub struct HttpProviderClient {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpProviderClient {
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::Transport {
                provider: "http".to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    fn build_request(&self, prompt: &str, credential: &Credential) -> reqwest::RequestBuilder {
        let secret = credential.secret().expose_secret();
        match credential.kind() {
            ProviderKind::Primary => self
                .client
                .post(gemini::endpoint(
                    &self.config.primary_base_url,
                    &self.config.primary_model,
                ))
                .query(&[("key", secret)])
                .json(&gemini::request_body(prompt)),
            ProviderKind::Secondary => self
                .client
                .post(openai::endpoint(&self.config.secondary_base_url))
                .bearer_auth(secret)
                .json(&openai::request_body(&self.config.secondary_model, prompt)),
        }
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn call(
        &self,
        prompt: &str,
        credential: &Credential,
    ) -> Result<NormalizedResponse, LlmError> {
        let kind = credential.kind();
        let provider = provider_name(kind);

        let response = self
            .build_request(prompt, credential)
            .send()
            .await
            .map_err(|e| LlmError::Transport {
                provider: provider.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        debug!(provider, status = %status, "provider response received");

        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(provider, status, body, retry_after));
        }

        let body = response.text().await.map_err(|e| LlmError::Transport {
            provider: provider.to_string(),
            reason: format!("failed to read response body: {e}"),
        })?;

        let text = match kind {
            ProviderKind::Primary => gemini::extract_text(&body),
            ProviderKind::Secondary => openai::extract_text(&body),
        }
        .map_err(|reason| LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason,
        })?;

        Ok(NormalizedResponse {
            provider: kind,
            text,
        })
    }
}

fn provider_name(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Primary => "gemini",
        ProviderKind::Secondary => "openai",
    }
}

/// Map a non-2xx status to the error taxonomy. 429 is the only quota signal.
fn classify_status(
    provider: &str,
    status: StatusCode,
    body: String,
    retry_after: Option<Duration>,
) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        }
    } else {
        let body: String = body.chars().take(300).collect();
        LlmError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
            body,
        }
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> HttpProviderClient {
        HttpProviderClient::new(ProviderConfig {
            primary_model: "test-model".into(),
            primary_base_url: server.uri(),
            secondary_model: "test-chat".into(),
            secondary_base_url: server.uri(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn primary(key: &str) -> Credential {
        Credential::primary(SecretString::from(key))
    }

    fn secondary(key: &str) -> Credential {
        Credential::secondary(SecretString::from(key))
    }

    #[tokio::test]
    async fn primary_success_is_normalized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .and(query_param("key", "k1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "{\"codeExist\":0}"}]}}]
            })))
            .mount(&server)
            .await;

        let response = client_for(&server).call("prompt", &primary("k1")).await.unwrap();
        assert_eq!(response.provider, ProviderKind::Primary);
        assert_eq!(response.text, "{\"codeExist\":0}");
    }

    #[tokio::test]
    async fn secondary_uses_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}}]
            })))
            .mount(&server)
            .await;

        let response = client_for(&server).call("prompt", &secondary("sk-1")).await.unwrap();
        assert_eq!(response.provider, ProviderKind::Secondary);
        assert_eq!(response.text, "hello");
    }

    #[tokio::test]
    async fn status_429_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = client_for(&server).call("prompt", &primary("k1")).await.unwrap_err();
        match err {
            LlmError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_is_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client_for(&server).call("prompt", &secondary("sk")).await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn empty_candidates_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).call("prompt", &primary("k1")).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let client = HttpProviderClient::new(ProviderConfig {
            primary_base_url: "http://127.0.0.1:1".into(),
            request_timeout: Duration::from_secs(2),
            ..ProviderConfig::default()
        })
        .unwrap();
        let err = client.call("prompt", &primary("k1")).await.unwrap_err();
        assert!(matches!(err, LlmError::Transport { .. }));
    }
}
