use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::ports::{Clock, Identity, Session};

/// Derive a deterministic cache key from the session-identifying cookie
/// subset. Only cookies whose names start with one of the configured
/// prefixes participate, so unrelated cookies cannot perturb the key.
/// Pairs are sorted by name before hashing to make the result
/// independent of iteration order.
pub fn fingerprint<'a, I>(cookies: I, session_prefixes: &[String]) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut relevant: Vec<(&str, &str)> = cookies
        .into_iter()
        .filter(|(name, _)| session_prefixes.iter().any(|p| name.starts_with(p.as_str())))
        .collect();
    relevant.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (name, value) in relevant {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b";");
    }
    hex::encode(hasher.finalize())
}

/// Represent a session's identifying token set as cookie pairs, the
/// shape the provider stores them in on the browser side
pub fn session_cookie_pairs(session: &Session) -> Vec<(&'static str, &str)> {
    let mut pairs = vec![("auth-token.0", session.access_token.as_str())];
    if let Some(refresh) = &session.refresh_token {
        pairs.push(("auth-token.1", refresh.as_str()));
    }
    pairs
}

/// A cached identity lookup result. `identity` may be `None`: a
/// recently-confirmed "not signed in" is as cacheable as a hit.
#[derive(Debug, Clone)]
struct CacheEntry {
    identity: Option<Identity>,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Short-TTL cache gating repeated identity lookups.
///
/// This exists only to de-duplicate bursts of near-simultaneous checks
/// within a single render/request cycle, not as a general-purpose cache.
/// Expired entries read as a miss and are evicted on access.
pub struct SessionCache {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    session_prefixes: Vec<String>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl SessionCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration, session_prefixes: Vec<String>) -> Self {
        Self {
            clock,
            ttl,
            session_prefixes,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(clock: Arc<dyn Clock>, config: &config::CacheConfig) -> Self {
        Self::new(clock, config.ttl, config.session_cookie_prefixes.clone())
    }

    /// Fingerprint a session's identifying token set with this cache's
    /// configured cookie prefixes
    pub fn session_fingerprint(&self, session: &Session) -> String {
        fingerprint(session_cookie_pairs(session), &self.session_prefixes)
    }

    /// Look up a fingerprint. Returns `None` on miss or expiry; an
    /// expired entry is purged on the way out.
    pub fn get(&self, fp: &str) -> Option<Option<Identity>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("session cache lock poisoned");

        match entries.get(fp) {
            Some(entry) if now <= entry.expires_at => {
                debug!(fingerprint = %fp, "session cache hit");
                Some(entry.identity.clone())
            }
            Some(_) => {
                debug!(fingerprint = %fp, "session cache entry expired");
                entries.remove(fp);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, fp: &str, identity: Option<Identity>) {
        let now = self.clock.now();
        let expires_at = now
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::seconds(5));

        self.entries
            .lock()
            .expect("session cache lock poisoned")
            .insert(
                fp.to_string(),
                CacheEntry {
                    identity,
                    created_at: now,
                    expires_at,
                },
            );
    }

    /// Remove one entry, or everything when no fingerprint is given.
    /// The full purge runs on SignedIn/SignedOut so no identity can leak
    /// across sessions.
    pub fn clear(&self, fp: Option<&str>) {
        let mut entries = self.entries.lock().expect("session cache lock poisoned");
        match fp {
            Some(fp) => {
                entries.remove(fp);
            }
            None => entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("session cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualClock;
    use uuid::Uuid;

    fn test_identity() -> Identity {
        Identity {
            id: Uuid::new_v4().into(),
            email: "user@example.com".to_string(),
        }
    }

    fn prefixes() -> Vec<String> {
        vec!["auth-token".to_string()]
    }

    fn cache_with_clock(ttl: Duration) -> (Arc<ManualClock>, SessionCache) {
        let clock = Arc::new(ManualClock::default());
        let cache = SessionCache::new(clock.clone(), ttl, prefixes());
        (clock, cache)
    }

    #[test]
    fn fingerprint_ignores_unrelated_cookies() {
        let with_noise = fingerprint(
            vec![
                ("auth-token", "abc"),
                ("analytics_id", "xyz"),
                ("theme", "dark"),
            ],
            &prefixes(),
        );
        let without_noise = fingerprint(vec![("auth-token", "abc")], &prefixes());
        assert_eq!(with_noise, without_noise);
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let a = fingerprint(
            vec![("auth-token.0", "abc"), ("auth-token.1", "def")],
            &prefixes(),
        );
        let b = fingerprint(
            vec![("auth-token.1", "def"), ("auth-token.0", "abc")],
            &prefixes(),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_session_data() {
        let a = fingerprint(vec![("auth-token", "abc")], &prefixes());
        let b = fingerprint(vec![("auth-token", "def")], &prefixes());
        assert_ne!(a, b);
    }

    #[test]
    fn hit_before_ttl_miss_after() {
        let (clock, cache) = cache_with_clock(Duration::from_secs(5));
        let id = test_identity();

        cache.set("fp", Some(id.clone()));
        assert_eq!(cache.get("fp"), Some(Some(id)));

        clock.advance(Duration::from_secs(6));
        assert_eq!(cache.get("fp"), None);
        // Expired entry was evicted, not just skipped
        assert!(cache.is_empty());
    }

    #[test]
    fn caches_negative_results() {
        let (_clock, cache) = cache_with_clock(Duration::from_secs(5));

        cache.set("fp", None);
        assert_eq!(cache.get("fp"), Some(None));
    }

    #[test]
    fn clear_all_and_clear_one() {
        let (_clock, cache) = cache_with_clock(Duration::from_secs(5));

        cache.set("a", Some(test_identity()));
        cache.set("b", Some(test_identity()));

        cache.clear(Some("a"));
        assert_eq!(cache.get("a"), None);
        assert!(cache.get("b").is_some());

        cache.clear(None);
        assert!(cache.is_empty());
    }
}
