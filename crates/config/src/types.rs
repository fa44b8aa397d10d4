use std::{env, time::Duration};

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub session: SessionConfig,
    pub cache: CacheConfig,
    pub client: ClientConfig,
}

impl CoreConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            session: SessionConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            client: ClientConfig::from_env()?,
        })
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            cache: CacheConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

/// Session state machine configuration
///
/// Bounds for the initialization retry loop and the manual refresh
/// circuit breakers. Counters reset on any success; the cooldown gates
/// concurrent refresh storms from multiple failed requests.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum initialization attempts before degrading to logged-out
    pub max_init_retries: u32,
    /// Base delay for linear init backoff (delay * attempt)
    pub retry_delay: Duration,
    /// Minimum spacing between manual refresh attempts
    pub refresh_cooldown: Duration,
    /// Maximum manual refresh attempts before forcing logout
    pub max_refresh_attempts: u32,
}

impl SessionConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            max_init_retries: env::var("SESSION_MAX_INIT_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| "SESSION_MAX_INIT_RETRIES must be a valid number")?,
            retry_delay: Duration::from_millis(
                env::var("SESSION_RETRY_DELAY_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .map_err(|_| "SESSION_RETRY_DELAY_MS must be a valid number")?,
            ),
            refresh_cooldown: Duration::from_millis(
                env::var("SESSION_REFRESH_COOLDOWN_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .map_err(|_| "SESSION_REFRESH_COOLDOWN_MS must be a valid number")?,
            ),
            max_refresh_attempts: env::var("SESSION_MAX_REFRESH_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| "SESSION_MAX_REFRESH_ATTEMPTS must be a valid number")?,
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_init_retries: 3,
            retry_delay: Duration::from_millis(1000),
            refresh_cooldown: Duration::from_millis(5000),
            max_refresh_attempts: 3,
        }
    }
}

/// Authentication cache configuration
///
/// The cache only exists to de-duplicate bursts of near-simultaneous
/// identity checks, so the TTL stays in the seconds range.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    /// Cookie name prefixes that identify the provider session.
    /// Unrelated cookies must not perturb the fingerprint.
    pub session_cookie_prefixes: Vec<String>,
}

impl CacheConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let prefixes = env::var("CACHE_SESSION_COOKIE_PREFIXES")
            .ok()
            .map(|names| {
                names
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["auth-token".to_string()]);

        Ok(Self {
            ttl: Duration::from_secs(
                env::var("CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .map_err(|_| "CACHE_TTL_SECS must be a valid number")?,
            ),
            session_cookie_prefixes: prefixes,
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            session_cookie_prefixes: vec!["auth-token".to_string()],
        }
    }
}

/// Resilient request client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Maximum retries for retryable failures (5xx, retryable 401)
    pub max_retries: u32,
    /// Upper bound on the exponential backoff delay
    pub backoff_cap: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000/api".to_string()),
            max_retries: env::var("API_MAX_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .map_err(|_| "API_MAX_RETRIES must be a valid number")?,
            backoff_cap: Duration::from_millis(
                env::var("API_BACKOFF_CAP_MS")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .map_err(|_| "API_BACKOFF_CAP_MS must be a valid number")?,
            ),
            request_timeout: Duration::from_secs(
                env::var("API_REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .map_err(|_| "API_REQUEST_TIMEOUT_SECS must be a valid number")?,
            ),
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            max_retries: 2,
            backoff_cap: Duration::from_millis(8000),
            request_timeout: Duration::from_secs(30),
        }
    }
}
