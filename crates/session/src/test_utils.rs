// Test utilities for the session crate
#![cfg(test)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::ports::{
    AuthChange, Clock, Identity, IdentityGateway, ProfileStore, Role, Session, UserId,
};

/// Deterministic time source for cooldown and TTL tests
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: std::time::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += ChronoDuration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn test_identity(email: &str) -> Identity {
    Identity {
        id: Uuid::new_v4().into(),
        email: email.to_string(),
    }
}

pub fn test_session(user: Option<Identity>) -> Session {
    Session {
        access_token: format!("at_{}", Uuid::new_v4().simple()),
        refresh_token: Some(format!("rt_{}", Uuid::new_v4().simple())),
        expires_at: Utc::now() + ChronoDuration::hours(1),
        user,
    }
}

type SessionResult = anyhow::Result<Option<Session>>;

/// Scripted identity gateway.
///
/// Responses are consumed front-to-back; an exhausted queue answers
/// "no session" / success so tests only script what they care about.
/// Call counters let tests assert the gateway was or was not contacted.
#[derive(Default)]
pub struct ScriptedGateway {
    current_responses: Mutex<VecDeque<SessionResult>>,
    refresh_responses: Mutex<VecDeque<SessionResult>>,
    sign_out_responses: Mutex<VecDeque<anyhow::Result<()>>>,
    pub current_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub sign_out_calls: AtomicU32,
}

impl ScriptedGateway {
    pub fn push_current(&self, response: SessionResult) {
        self.current_responses.lock().unwrap().push_back(response);
    }

    pub fn push_refresh(&self, response: SessionResult) {
        self.refresh_responses.lock().unwrap().push_back(response);
    }

    pub fn push_sign_out(&self, response: anyhow::Result<()>) {
        self.sign_out_responses.lock().unwrap().push_back(response);
    }

    pub fn refresh_call_count(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityGateway for ScriptedGateway {
    async fn current_session(&self) -> SessionResult {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        self.current_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(None))
    }

    async fn refresh_session(&self) -> SessionResult {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(None))
    }

    async fn sign_out(&self) -> anyhow::Result<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.sign_out_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

/// Profile store backed by a fixed role table
#[derive(Default)]
pub struct StaticProfiles {
    roles: Mutex<HashMap<UserId, Role>>,
    pub lookup_calls: AtomicU32,
    fail: std::sync::atomic::AtomicBool,
}

impl StaticProfiles {
    pub fn with_role(self, user_id: UserId, role: Role) -> Self {
        self.roles.lock().unwrap().insert(user_id, role);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProfileStore for StaticProfiles {
    async fn lookup_role(&self, user_id: &UserId) -> anyhow::Result<Option<Role>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("profile store unavailable");
        }
        Ok(self.roles.lock().unwrap().get(user_id).copied())
    }
}

/// Random event generator for the lifecycle invariant test
pub fn random_event(rng: &mut impl rand::Rng) -> (AuthChange, Option<Session>) {
    let change = match rng.gen_range(0..5) {
        0 => AuthChange::SignedIn,
        1 => AuthChange::SignedOut,
        2 => AuthChange::TokenRefreshed,
        3 => AuthChange::UserUpdated,
        _ => AuthChange::Other,
    };
    let session = if rng.gen_bool(0.6) {
        let user = rng
            .gen_bool(0.8)
            .then(|| test_identity("random@example.com"));
        Some(test_session(user))
    } else {
        None
    };
    (change, session)
}
