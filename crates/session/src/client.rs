use std::sync::Arc;
use std::time::Duration;

use config::ClientConfig;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::bus::AuthErrorBus;
use crate::error::AuthErrorKind;
use crate::machine::SessionManager;

/// Bounded retry policy for one request, independent of the session
/// machine's own counters. Overridable per call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_cap: Duration,
}

impl From<&ClientConfig> for RetryPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_cap: config.backoff_cap,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Error body shape returned by the application's API on failures
#[derive(Debug, Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    retryable: Option<bool>,
}

/// Outbound request wrapper with 401-triggered refresh-and-retry.
///
/// 5xx responses and transport failures retry with exponential backoff
/// up to the policy bound; a retryable 401 asks the session machine for
/// one refresh and replays the request exactly once on success. Every
/// failed attempt is classified onto the error bus once.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    sessions: Arc<SessionManager>,
    errors: Arc<AuthErrorBus>,
    policy: RetryPolicy,
}

impl ApiClient {
    pub fn new(
        config: &ClientConfig,
        sessions: Arc<SessionManager>,
        errors: Arc<AuthErrorBus>,
    ) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(&config.base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            sessions,
            errors,
            policy: RetryPolicy::from(config),
        })
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        policy: Option<RetryPolicy>,
    ) -> Result<T, ClientError> {
        self.execute(Method::GET, path, None, policy).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        policy: Option<RetryPolicy>,
    ) -> Result<T, ClientError> {
        let body = serde_json::to_value(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        self.execute(Method::POST, path, Some(body), policy).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        policy: Option<RetryPolicy>,
    ) -> Result<T, ClientError> {
        let body = serde_json::to_value(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        self.execute(Method::PUT, path, Some(body), policy).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        policy: Option<RetryPolicy>,
    ) -> Result<T, ClientError> {
        self.execute(Method::DELETE, path, None, policy).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        policy: Option<RetryPolicy>,
    ) -> Result<T, ClientError> {
        let policy = policy.unwrap_or(self.policy);
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        let mut attempt: u32 = 0;
        // One refresh-and-replay per logical request, no matter how many
        // attempts the backoff loop makes
        let mut refreshed = false;

        loop {
            let mut request = self.http.request(method.clone(), url.clone());
            if let Some(session) = self.sessions.snapshot().session {
                request = request.bearer_auth(&session.access_token);
            }
            if let Some(body) = &body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    self.errors
                        .create_error(AuthErrorKind::NetworkError, err.to_string(), Some(true));
                    if attempt >= policy.max_retries {
                        return Err(ClientError::Network(err.to_string()));
                    }
                    self.backoff(attempt, policy.backoff_cap).await;
                    attempt += 1;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map_err(|e| ClientError::Decode(e.to_string()));
            }

            let body_text = response.text().await.unwrap_or_default();
            let error_body: ErrorBody = serde_json::from_str(&body_text).unwrap_or_default();
            let message = error_body
                .error
                .unwrap_or_else(|| format!("HTTP {status}"));

            if status == StatusCode::UNAUTHORIZED {
                let retryable = error_body.retryable.unwrap_or(false);
                self.errors.create_error(
                    AuthErrorKind::Unauthorized,
                    format!("{method} {path}: {message}"),
                    Some(retryable),
                );

                if retryable && !refreshed && attempt < policy.max_retries {
                    refreshed = true;
                    debug!(%method, path, "401 received, attempting session refresh");
                    if self.sessions.refresh_session().await {
                        attempt += 1;
                        continue;
                    }
                }
                return Err(ClientError::Unauthorized(message));
            }

            if status.is_server_error() {
                self.errors.create_error(
                    AuthErrorKind::NetworkError,
                    format!("{method} {path}: {message}"),
                    Some(true),
                );
                if attempt >= policy.max_retries {
                    warn!(%method, path, status = status.as_u16(), attempt, "retries exhausted");
                    return Err(ClientError::Status {
                        status: status.as_u16(),
                        message,
                    });
                }
                self.backoff(attempt, policy.backoff_cap).await;
                attempt += 1;
                continue;
            }

            // Remaining 4xx are the caller's problem, no retry
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }
    }

    async fn backoff(&self, attempt: u32, cap: Duration) {
        let delay = backoff_delay(attempt, cap);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off before retry");
        tokio::time::sleep(delay).await;
    }
}

/// Exponential backoff schedule: min(1000ms * 2^attempt, cap)
fn backoff_delay(attempt: u32, cap: Duration) -> Duration {
    Duration::from_millis(1000)
        .saturating_mul(1u32 << attempt.min(16))
        .min(cap)
}
