use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed classification of authentication failures.
///
/// Each kind maps to exactly one fixed user-facing message; raw provider
/// error strings never reach the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    TokenExpired,
    RefreshFailed,
    NetworkError,
    InvalidSession,
    Unauthorized,
}

impl AuthErrorKind {
    /// Whether a failure of this kind is worth retrying locally before
    /// surfacing it to the user
    pub fn is_retryable(self) -> bool {
        matches!(self, AuthErrorKind::NetworkError | AuthErrorKind::TokenExpired)
    }

    /// Fixed user-facing message table, exhaustive over the taxonomy
    pub fn user_message(self) -> &'static str {
        match self {
            AuthErrorKind::TokenExpired => "Your session has expired. Please sign in again.",
            AuthErrorKind::RefreshFailed => {
                "We could not renew your session. Please sign in again."
            }
            AuthErrorKind::NetworkError => {
                "Connection problem. Check your network and try again."
            }
            AuthErrorKind::InvalidSession => "Your session is no longer valid. Please sign in.",
            AuthErrorKind::Unauthorized => "You are not authorized to perform this action.",
        }
    }
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuthErrorKind::TokenExpired => "token_expired",
            AuthErrorKind::RefreshFailed => "refresh_failed",
            AuthErrorKind::NetworkError => "network_error",
            AuthErrorKind::InvalidSession => "invalid_session",
            AuthErrorKind::Unauthorized => "unauthorized",
        };
        write!(f, "{name}")
    }
}

/// An immutable authentication failure record.
///
/// Created once, appended to the in-process log and broadcast once.
/// Never persisted across process restarts, so serialization is
/// one-way (for surfacing, not storage).
#[derive(Debug, Clone, Serialize)]
pub struct AuthError {
    pub kind: AuthErrorKind,
    /// Internal detail for logs, never shown to the user
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub retryable: bool,
    pub user_message: &'static str,
}

impl AuthError {
    /// Classify a failure. `retryable` overrides the kind's default when
    /// the caller knows better (e.g. a 401 the server marked retryable).
    pub fn new(
        kind: AuthErrorKind,
        message: impl Into<String>,
        retryable: Option<bool>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp,
            retryable: retryable.unwrap_or_else(|| kind.is_retryable()),
            user_message: kind.user_message(),
        }
    }

    /// Session-destroying kinds trigger forced clean logout when surfaced
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self.kind,
            AuthErrorKind::RefreshFailed | AuthErrorKind::InvalidSession
        )
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_user_message() {
        let kinds = [
            AuthErrorKind::TokenExpired,
            AuthErrorKind::RefreshFailed,
            AuthErrorKind::NetworkError,
            AuthErrorKind::InvalidSession,
            AuthErrorKind::Unauthorized,
        ];
        for kind in kinds {
            assert!(!kind.user_message().is_empty());
        }
    }

    #[test]
    fn retryable_override_wins() {
        let err = AuthError::new(
            AuthErrorKind::Unauthorized,
            "401 with retryable flag",
            Some(true),
            Utc::now(),
        );
        assert!(err.retryable);

        let err = AuthError::new(AuthErrorKind::NetworkError, "timeout", None, Utc::now());
        assert!(err.retryable);
    }

    #[test]
    fn refresh_failures_are_session_fatal() {
        let err = AuthError::new(AuthErrorKind::RefreshFailed, "empty session", None, Utc::now());
        assert!(err.is_session_fatal());

        let err = AuthError::new(AuthErrorKind::NetworkError, "timeout", None, Utc::now());
        assert!(!err.is_session_fatal());
    }
}
