use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use config::SessionConfig;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bus::AuthErrorBus;
use crate::cache::SessionCache;
use crate::capability::Capabilities;
use crate::error::{AuthError, AuthErrorKind};
use crate::ports::{AuthChange, Clock, Identity, IdentityGateway, ProfileStore, Role, Session};


/// Lifecycle phase of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Authenticated,
    Unauthenticated,
    SigningOut,
}

/// Read-only view of the machine's current state
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session: Option<Session>,
    pub identity: Option<Identity>,
    pub role: Option<Role>,
    pub loading: bool,
    pub auth_error: Option<AuthError>,
}

/// A gateway change-stream notification
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub change: AuthChange,
    pub session: Option<Session>,
}

#[derive(Debug)]
struct MachineState {
    phase: SessionPhase,
    session: Option<Session>,
    identity: Option<Identity>,
    role: Option<Role>,
    /// Bumped on every session transition. A resolved profile lookup is
    /// discarded when its captured generation no longer matches, so a
    /// slower continuation cannot overwrite a later event's effects.
    generation: u64,
    init_attempts: u32,
    refresh_attempts: u32,
    last_refresh_attempt: Option<DateTime<Utc>>,
    pending_error: Option<AuthError>,
}

impl MachineState {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            session: None,
            identity: None,
            role: None,
            generation: 0,
            init_attempts: 0,
            refresh_attempts: 0,
            last_refresh_attempt: None,
            pending_error: None,
        }
    }
}

/// Owner of the authenticated session.
///
/// Drives initialization retries, manual refresh with cooldown, and
/// forced-logout recovery, reacting to the gateway's change stream one
/// event at a time. State-mutating operations are serialized through a
/// single in-flight guard so a SignedOut arriving mid-refresh can never
/// race a successful refresh's state write.
pub struct SessionManager {
    gateway: Arc<dyn IdentityGateway>,
    profiles: Arc<dyn ProfileStore>,
    cache: Arc<SessionCache>,
    errors: Arc<AuthErrorBus>,
    clock: Arc<dyn Clock>,
    policy: SessionConfig,
    state: Mutex<MachineState>,
    /// Serializes event handlers, initialization, refresh and sign-out
    op_guard: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(
        gateway: Arc<dyn IdentityGateway>,
        profiles: Arc<dyn ProfileStore>,
        cache: Arc<SessionCache>,
        errors: Arc<AuthErrorBus>,
        clock: Arc<dyn Clock>,
        policy: SessionConfig,
    ) -> Self {
        Self {
            gateway,
            profiles,
            cache,
            errors,
            clock,
            policy,
            state: Mutex::new(MachineState::new()),
            op_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Current state. Session, identity and role always move together,
    /// so the view is self-consistent at any instant.
    pub fn snapshot(&self) -> SessionSnapshot {
        let st = self.state.lock().expect("session state lock poisoned");
        SessionSnapshot {
            phase: st.phase,
            session: st.session.clone(),
            identity: st.identity.clone(),
            role: st.role,
            loading: matches!(
                st.phase,
                SessionPhase::Uninitialized | SessionPhase::Initializing
            ),
            auth_error: st.pending_error.clone(),
        }
    }

    /// Capability predicates derived from the current snapshot
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::from_snapshot(&self.snapshot())
    }

    pub fn clear_auth_error(&self) {
        self.state
            .lock()
            .expect("session state lock poisoned")
            .pending_error = None;
    }

    /// First-mount initialization: fetch the current session from the
    /// gateway, retrying with linear backoff up to the configured bound.
    /// Exhausting the bound degrades to a usable logged-out state; it
    /// never hangs in `Initializing`.
    pub async fn initialize(&self) {
        let _guard = self.op_guard.lock().await;
        {
            let mut st = self.state.lock().expect("session state lock poisoned");
            st.phase = SessionPhase::Initializing;
            st.init_attempts = 0;
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            {
                let mut st = self.state.lock().expect("session state lock poisoned");
                st.init_attempts = attempt;
            }

            match self.gateway.current_session().await {
                Ok(Some(session)) => {
                    debug!(attempt, "initialization found an active session");
                    self.adopt_session(session, true).await;
                    let mut st = self.state.lock().expect("session state lock poisoned");
                    st.init_attempts = 0;
                    return;
                }
                Ok(None) => {
                    debug!(attempt, "initialization found no session");
                    let mut st = self.state.lock().expect("session state lock poisoned");
                    st.phase = SessionPhase::Unauthenticated;
                    st.init_attempts = 0;
                    return;
                }
                Err(err) if attempt <= self.policy.max_init_retries => {
                    let delay = self.policy.retry_delay * attempt;
                    warn!(
                        attempt,
                        max_retries = self.policy.max_init_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "session initialization failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let recorded = self.errors.create_error(
                        AuthErrorKind::NetworkError,
                        format!("session initialization failed after {attempt} attempts: {err}"),
                        None,
                    );
                    warn!(attempt, "session initialization retries exhausted");
                    let mut st = self.state.lock().expect("session state lock poisoned");
                    st.phase = SessionPhase::Unauthenticated;
                    st.pending_error = Some(recorded);
                    return;
                }
            }
        }
    }

    /// Consume the gateway's change stream. Single consumer, arrival
    /// order, one event at a time.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<GatewayEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event.change, event.session).await;
        }
        debug!("gateway event stream closed");
    }

    /// Apply one gateway event. Serialized with every other
    /// state-mutating operation.
    pub async fn handle_event(&self, change: AuthChange, session: Option<Session>) {
        let _guard = self.op_guard.lock().await;
        debug!(change = ?change, has_session = session.is_some(), "gateway event");

        match (change, session) {
            (AuthChange::SignedOut, _) => self.apply_signed_out(),
            (AuthChange::SignedIn, Some(session)) => {
                self.cache.clear(None);
                self.clear_auth_error();
                self.reset_counters();
                self.adopt_session(session, true).await;
            }
            // Session presence wins over the event label
            (AuthChange::SignedIn, None) => self.apply_signed_out(),
            (AuthChange::TokenRefreshed, Some(session)) if session.user.is_some() => {
                // Identity unchanged, role kept as-is
                self.adopt_session(session, false).await;
                let mut st = self.state.lock().expect("session state lock poisoned");
                st.refresh_attempts = 0;
            }
            (AuthChange::TokenRefreshed, _) => {
                // A provider reporting "refreshed" without supplying a
                // session violates its contract; do not accept it silently.
                let recorded = self.errors.create_error(
                    AuthErrorKind::RefreshFailed,
                    "token refresh event carried no session",
                    None,
                );
                self.forced_logout(Some(recorded));
            }
            (AuthChange::UserUpdated, Some(session)) => {
                self.adopt_session(session, true).await;
            }
            (AuthChange::UserUpdated, None) => self.apply_signed_out(),
            // Unclassified events must not leave stale state behind:
            // fall back to session presence.
            (AuthChange::Other, Some(session)) => {
                self.adopt_session(session, true).await;
            }
            (AuthChange::Other, None) => self.apply_signed_out(),
        }
    }

    /// Explicit refresh, invokable by any consumer (e.g. after a 401).
    /// Guarded by a cooldown and an attempt bound; neither breaker
    /// contacts the gateway.
    pub async fn refresh_session(&self) -> bool {
        let _guard = self.op_guard.lock().await;
        let now = self.clock.now();

        {
            let mut st = self.state.lock().expect("session state lock poisoned");

            if let Some(last) = st.last_refresh_attempt {
                let cooldown = chrono::Duration::from_std(self.policy.refresh_cooldown)
                    .unwrap_or_else(|_| chrono::Duration::seconds(5));
                if now < last + cooldown {
                    debug!("refresh suppressed by cooldown");
                    return false;
                }
            }

            if st.refresh_attempts >= self.policy.max_refresh_attempts {
                drop(st);
                let recorded = self.errors.create_error(
                    AuthErrorKind::RefreshFailed,
                    format!(
                        "refresh attempt limit reached ({})",
                        self.policy.max_refresh_attempts
                    ),
                    None,
                );
                self.state
                    .lock()
                    .expect("session state lock poisoned")
                    .pending_error = Some(recorded);
                return false;
            }

            st.refresh_attempts += 1;
            st.last_refresh_attempt = Some(now);
        }

        match self.gateway.refresh_session().await {
            Ok(Some(session)) if session.user.is_some() => {
                info!("manual session refresh succeeded");
                self.adopt_session(session, false).await;
                let mut st = self.state.lock().expect("session state lock poisoned");
                st.refresh_attempts = 0;
                true
            }
            Ok(_) => {
                let recorded = self.errors.create_error(
                    AuthErrorKind::RefreshFailed,
                    "gateway refresh returned no session",
                    None,
                );
                self.forced_logout(Some(recorded));
                false
            }
            Err(err) => {
                let recorded = self.errors.create_error(
                    AuthErrorKind::RefreshFailed,
                    format!("gateway refresh failed: {err}"),
                    None,
                );
                self.forced_logout(Some(recorded));
                false
            }
        }
    }

    /// User-initiated sign-out. On gateway success the resulting
    /// SignedOut event performs the actual clearing; on failure the
    /// machine falls back to forced clean logout so the UI can never get
    /// stuck in `SigningOut`.
    pub async fn sign_out(&self) {
        let _guard = self.op_guard.lock().await;
        {
            let mut st = self.state.lock().expect("session state lock poisoned");
            st.phase = SessionPhase::SigningOut;
        }

        match self.gateway.sign_out().await {
            Ok(()) => {
                info!("gateway sign-out accepted, awaiting SignedOut event");
            }
            Err(err) => {
                warn!(error = %err, "gateway sign-out failed, forcing local logout");
                self.forced_logout(None);
            }
        }
    }

    /// Validated, role-tagged identity for request handling.
    ///
    /// De-duplicates bursts of near-simultaneous checks through the
    /// short-TTL cache; within the TTL repeated calls never hit the
    /// gateway. Verification failures are not cached.
    pub async fn verified_identity(&self) -> Option<(Identity, Option<Role>)> {
        let session = {
            self.state
                .lock()
                .expect("session state lock poisoned")
                .session
                .clone()
        }?;
        let fp = self.cache.session_fingerprint(&session);

        let identity = if let Some(cached) = self.cache.get(&fp) {
            cached
        } else {
            match self.gateway.current_session().await {
                Ok(current) => {
                    let verified = current.and_then(|s| s.user);
                    self.cache.set(&fp, verified.clone());
                    verified
                }
                Err(err) => {
                    warn!(error = %err, "identity verification failed");
                    None
                }
            }
        };

        let identity = identity?;
        let role = self.state.lock().expect("session state lock poisoned").role;
        Some((identity, role))
    }

    /// Adopt a session wholesale, bumping the generation so any stale
    /// in-flight profile lookup gets discarded. When `resolve_role` is
    /// set the role is cleared first and refilled from the profile
    /// store; identity and session always move in the same transition.
    async fn adopt_session(&self, session: Session, resolve_role: bool) {
        let (generation, identity) = {
            let mut st = self.state.lock().expect("session state lock poisoned");
            st.identity = session.user.clone();
            st.session = Some(session);
            if resolve_role {
                st.role = None;
            }
            st.generation += 1;
            st.phase = SessionPhase::Authenticated;
            (st.generation, st.identity.clone())
        };

        if !resolve_role {
            return;
        }
        let Some(identity) = identity else {
            // No principal on the session: leave the role unresolved,
            // capabilities fail closed.
            return;
        };

        match self.profiles.lookup_role(&identity.id).await {
            Ok(role) => {
                let mut st = self.state.lock().expect("session state lock poisoned");
                if st.generation != generation {
                    debug!("discarding role lookup for superseded session");
                    return;
                }
                if role.is_none() {
                    warn!(user_id = %identity.id, "no role recorded for user");
                }
                st.role = role;
            }
            Err(err) => {
                warn!(user_id = %identity.id, error = %err, "role lookup failed");
            }
        }
    }

    /// SignedOut from the gateway: clear everything atomically and start
    /// from a clean slate.
    fn apply_signed_out(&self) {
        {
            let mut st = self.state.lock().expect("session state lock poisoned");
            st.session = None;
            st.identity = None;
            st.role = None;
            st.generation += 1;
            st.phase = SessionPhase::Unauthenticated;
            st.init_attempts = 0;
            st.refresh_attempts = 0;
            st.last_refresh_attempt = None;
            st.pending_error = None;
        }
        self.cache.clear(None);
        info!("session cleared");
    }

    /// Local-only state reset. Deliberately does not call the gateway's
    /// sign-out operation: this path runs while the remote auth path is
    /// already failing, and another remote call could loop.
    fn forced_logout(&self, error: Option<AuthError>) {
        {
            let mut st = self.state.lock().expect("session state lock poisoned");
            st.session = None;
            st.identity = None;
            st.role = None;
            st.generation += 1;
            st.phase = SessionPhase::Unauthenticated;
            st.init_attempts = 0;
            st.refresh_attempts = 0;
            st.last_refresh_attempt = None;
            if let Some(err) = error {
                st.pending_error = Some(err);
            }
        }
        self.cache.clear(None);
        info!("forced clean logout applied");
    }

    fn reset_counters(&self) {
        let mut st = self.state.lock().expect("session state lock poisoned");
        st.init_attempts = 0;
        st.refresh_attempts = 0;
        st.last_refresh_attempt = None;
    }
}
