//! Duplicate-suppression stores for funnel events.
//!
//! Two independent instances with different lifetimes:
//! - `EventWindow` — a TTL map for internal funnel events. Re-emission is
//!   legitimate after the window (a retried network call), but render-loop
//!   duplicates inside it are suppressed. Expired entries are purged so a
//!   long-lived session stays bounded.
//! - `PixelRegistry` — an unbounded seen-set for outbound analytics events.
//!   Conversion pixels must fire at most once per semantic occurrence for
//!   the whole session; re-firing corrupts ad-platform attribution, so this
//!   store is never time-windowed.
//!
//! Both are session-scoped: nothing here is persisted.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Default suppression window for internal funnel events.
pub const DEFAULT_EVENT_WINDOW: Duration = Duration::from_millis(10_000);

/// Entry count at which a purge sweep runs before inserting.
const PURGE_THRESHOLD: usize = 256;

/// Time-windowed dedupe map for internal funnel events.
///
/// Key shape: `funnelId:stepId:intent:leadId|"no_lead"`.
#[derive(Debug)]
pub struct EventWindow {
    window: Duration,
    entries: HashMap<String, Instant>,
}

impl Default for EventWindow {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_WINDOW)
    }
}

impl EventWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// Check whether an event key may fire now, recording it if so.
    /// Returns `false` when the key fired within the window.
    pub fn check_and_record(&mut self, key: &str) -> bool {
        self.check_and_record_at(key, Instant::now())
    }

    /// Clock-injected variant of [`check_and_record`](Self::check_and_record).
    pub fn check_and_record_at(&mut self, key: &str, now: Instant) -> bool {
        if let Some(last_seen) = self.entries.get(key) {
            if now.duration_since(*last_seen) < self.window {
                return false;
            }
        }

        if self.entries.len() >= PURGE_THRESHOLD {
            let window = self.window;
            self.entries
                .retain(|_, last_seen| now.duration_since(*last_seen) < window);
        }

        self.entries.insert(key.to_string(), now);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Unbounded at-most-once registry for outbound analytics events.
#[derive(Debug, Default)]
pub struct PixelRegistry {
    seen: HashSet<String>,
}

impl PixelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dedupe key. Returns `true` when the key is fresh (the
    /// event may fire) and `false` when it was already seen this session.
    pub fn register(&mut self, key: &str) -> bool {
        self.seen.insert(key.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

/// Fallback dedupe key when the caller supplies none: a digest over the
/// event name and canonical payload, so the same semantic occurrence always
/// maps to the same key.
pub fn digest_key(event_name: &str, payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_name.as_bytes());
    hasher.update(b":");
    hasher.update(payload.to_string().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_suppresses_within_window() {
        let mut window = EventWindow::new(Duration::from_millis(10_000));
        let t0 = Instant::now();
        assert!(window.check_and_record_at("fn:s1:capture:no_lead", t0));
        assert!(!window.check_and_record_at("fn:s1:capture:no_lead", t0 + Duration::from_millis(5_000)));
    }

    #[test]
    fn test_window_allows_after_window() {
        let mut window = EventWindow::new(Duration::from_millis(10_000));
        let t0 = Instant::now();
        assert!(window.check_and_record_at("k", t0));
        assert!(window.check_and_record_at("k", t0 + Duration::from_millis(10_001)));
    }

    #[test]
    fn test_window_keys_are_independent() {
        let mut window = EventWindow::new(Duration::from_millis(10_000));
        let t0 = Instant::now();
        assert!(window.check_and_record_at("a", t0));
        assert!(window.check_and_record_at("b", t0));
    }

    #[test]
    fn test_window_purges_expired_entries() {
        let mut window = EventWindow::new(Duration::from_millis(100));
        let t0 = Instant::now();
        for i in 0..PURGE_THRESHOLD {
            assert!(window.check_and_record_at(&format!("key-{}", i), t0));
        }
        assert_eq!(window.len(), PURGE_THRESHOLD);

        // All prior entries expired; the next insert sweeps them out.
        let later = t0 + Duration::from_millis(200);
        assert!(window.check_and_record_at("fresh", later));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_registry_fires_at_most_once() {
        let mut registry = PixelRegistry::new();
        assert!(registry.register("lead:visitor@example.com"));
        assert!(!registry.register("lead:visitor@example.com"));
        assert!(registry.contains("lead:visitor@example.com"));
    }

    #[test]
    fn test_registry_never_expires() {
        // No clock anywhere in the API: suppression is for the session
        // lifetime by construction.
        let mut registry = PixelRegistry::new();
        assert!(registry.register("k"));
        for _ in 0..100 {
            assert!(!registry.register("k"));
        }
    }

    #[test]
    fn test_digest_key_is_stable() {
        let payload = serde_json::json!({"value": 1, "currency": "USD"});
        let a = digest_key("Lead", &payload);
        let b = digest_key("Lead", &payload);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_digest_key_varies_by_event_and_payload() {
        let payload = serde_json::json!({"value": 1});
        assert_ne!(digest_key("Lead", &payload), digest_key("Schedule", &payload));
        assert_ne!(
            digest_key("Lead", &payload),
            digest_key("Lead", &serde_json::json!({"value": 2}))
        );
    }
}
