use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Domain ID types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        UserId(uuid)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Domain models

/// The authenticated principal derived from a Session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
}

/// A live authenticated credential issued by the identity gateway.
///
/// The token pair is opaque to the core: it is forwarded on outbound
/// requests and otherwise never inspected. Sessions are replaced
/// wholesale on every gateway event, never mutated in place.
///
/// `user` mirrors what the provider attaches to the credential. A
/// session without a principal is a provider contract violation on the
/// refresh path and is rejected there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub user: Option<Identity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Event kinds delivered on the gateway's change stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChange {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    /// Anything the core does not recognize. Handled conservatively by
    /// session presence so an unclassified event cannot leave stale
    /// state behind.
    Other,
}

/// Identity gateway collaborator contract.
///
/// The remote provider is treated as untrusted and unreliable: every
/// call may fail, and a "successful" response may still violate the
/// contract (e.g. a refresh that carries no session).
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// Fetch the currently issued session, if any
    async fn current_session(&self) -> anyhow::Result<Option<Session>>;

    /// Ask the provider to refresh the current session
    async fn refresh_session(&self) -> anyhow::Result<Option<Session>>;

    /// Revoke the current session on the provider side
    async fn sign_out(&self) -> anyhow::Result<()>;
}

/// Profile store collaborator contract
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Look up the role recorded for a user. `None` means no role is
    /// known; callers must fail closed rather than assume one.
    async fn lookup_role(&self, user_id: &UserId) -> anyhow::Result<Option<Role>>;
}

/// Injectable time source so cooldown and TTL logic can be driven
/// deterministically in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
