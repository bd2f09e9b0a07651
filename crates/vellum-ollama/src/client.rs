//! Ollama HTTP client.

use crate::error::{OllamaError, OllamaResult};
use crate::types::*;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;
use vellum_config::OllamaConfig;

/// Client for interacting with Ollama's API.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    host: String,
    timeout: Duration,
    api_key: Option<String>,
}

impl OllamaClient {
    /// Create a new client from configuration.
    pub fn from_config(config: &OllamaConfig) -> OllamaResult<Self> {
        let client = Self::with_timeout(&config.host, config.timeout())?;
        Ok(match config.resolved_api_key() {
            Some(key) => client.with_api_key(key),
            None => client,
        })
    }

    /// Create a new client with default settings.
    pub fn new(host: impl Into<String>) -> OllamaResult<Self> {
        Self::with_timeout(&host.into(), Duration::from_secs(60))
    }

    fn with_timeout(host: &str, timeout: Duration) -> OllamaResult<Self> {
        if host.trim().is_empty() {
            return Err(OllamaError::InvalidConfig("ollama.host is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(OllamaError::Http)?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            timeout,
            api_key: None,
        })
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> OllamaResult<Response> {
        self.authorized(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                OllamaError::Timeout {
                    seconds: self.timeout.as_secs(),
                }
            } else if e.is_connect() {
                OllamaError::ServerNotRunning {
                    host: self.host.clone(),
                }
            } else if e.is_request() {
                OllamaError::Connection(e.to_string())
            } else {
                OllamaError::Http(e)
            }
        })
    }

    /// Turn a non-success response into the matching error.
    async fn check(&self, response: Response, model: &str) -> OllamaResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = retry_after_from(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, retry_after, body, model))
    }

    /// Generate text (non-streaming).
    pub async fn generate(&self, request: GenerateRequest) -> OllamaResult<GenerateResponse> {
        let url = format!("{}/api/generate", self.host);
        debug!("Generating with model {}", request.model);

        let mut request = request;
        request.stream = false;

        let response = self.send(self.client.post(&url).json(&request)).await?;
        let response = self.check(response, &request.model).await?;
        let generate_response: GenerateResponse = response.json().await?;
        Ok(generate_response)
    }

    /// Embed a batch of texts in one call. Returns one vector per input, in order.
    pub async fn embed(&self, model: &str, texts: &[String]) -> OllamaResult<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.host);
        debug!(model, count = texts.len(), "Requesting embeddings");

        let request = EmbedRequest {
            model: model.to_string(),
            input: texts.to_vec(),
        };

        let response = self.send(self.client.post(&url).json(&request)).await?;
        let response = self.check(response, model).await?;
        let parsed: EmbedResponse = response.json().await?;
        Ok(parsed.embeddings)
    }
}

/// Parse a `Retry-After` header given in seconds.
fn retry_after_from(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let seconds: f64 = value.trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

/// Map an HTTP status to the error taxonomy.
fn error_for_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: String,
    model: &str,
) -> OllamaError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => OllamaError::Authentication {
            status: status.as_u16(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => OllamaError::RateLimited { retry_after },
        StatusCode::REQUEST_TIMEOUT => OllamaError::Timeout { seconds: 0 },
        s if s.is_server_error() => OllamaError::Server {
            status: s.as_u16(),
            message,
        },
        s if s == StatusCode::NOT_FOUND || message.contains("not found") => {
            OllamaError::ModelNotFound {
                model: model.to_string(),
            }
        }
        s => OllamaError::ApiError {
            status: s.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_client_creation() {
        let config = OllamaConfig::default();
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.host(), "http://localhost:11434");

        let client = OllamaClient::new("http://example:11434/").unwrap();
        assert_eq!(client.host(), "http://example:11434");
        assert!(OllamaClient::new("  ").is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            error_for_status(StatusCode::UNAUTHORIZED, None, r#"{"error":"bad key"}"#.into(), "m"),
            OllamaError::Authentication { status: 401, ref message } if message == "bad key"
        ));
        assert!(matches!(
            error_for_status(StatusCode::FORBIDDEN, None, String::new(), "m"),
            OllamaError::Authentication { status: 403, .. }
        ));
        assert!(matches!(
            error_for_status(
                StatusCode::TOO_MANY_REQUESTS,
                Some(Duration::from_secs(3)),
                String::new(),
                "m"
            ),
            OllamaError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(3)
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_GATEWAY, None, "upstream".into(), "m"),
            OllamaError::Server { status: 502, .. }
        ));
        assert!(matches!(
            error_for_status(StatusCode::NOT_FOUND, None, String::new(), "llama3"),
            OllamaError::ModelNotFound { ref model } if model == "llama3"
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_REQUEST, None, "bad input".into(), "m"),
            OllamaError::ApiError { status: 400, .. }
        ));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after_from(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(retry_after_from(&headers), Some(Duration::from_secs(2)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after_from(&headers), None);
    }
}
