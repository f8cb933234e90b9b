use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::debug;

use crate::error::Result;

/// How long a memoized query result stays fresh. Matches the short window
/// the external tool's output can be considered current.
pub(crate) const QUERY_CACHE_TTL_MS: u64 = 6_500;

type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

/// Signature of a domain query call: session token plus verb plus every
/// positional argument and option, hashed so keys stay uniform.
pub(crate) fn call_signature(token: &str, verb: &str, args: &serde_json::Value) -> String {
    let payload = serde_json::json!({ "session": token, "verb": verb, "args": args });
    let bytes = serde_json::to_vec(&payload).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

struct CacheEntry {
    value: serde_json::Value,
    created_at: Instant,
}

/// Memoization cache keyed by call signature, owned by the client instance
/// rather than process-global state. Entries go stale on lookup after the
/// TTL; nothing actively evicts them. Errors are never cached. Duplicate
/// concurrent fetches for the same key are collapsed into one external
/// invocation via a per-key gate.
pub(crate) struct QueryCache {
    ttl: Duration,
    clock: Clock,
    entries: Mutex<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl QueryCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(Instant::now))
    }

    /// Injectable clock so tests control time instead of sleeping.
    pub(crate) fn with_clock(ttl: Duration, clock: Clock) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn lookup(&self, key: &str) -> Option<serde_json::Value> {
        let now = (self.clock)();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| now.saturating_duration_since(entry.created_at) < self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Return the fresh cached value for `key`, or run `fetch` and cache its
    /// success. Concurrent callers for the same key serialize on the gate so
    /// at most one fetch runs; late arrivals observe the stored result.
    pub(crate) fn get_or_fetch<F>(&self, key: &str, fetch: F) -> Result<serde_json::Value>
    where
        F: FnOnce() -> Result<serde_json::Value>,
    {
        if let Some(hit) = self.lookup(key) {
            return Ok(hit);
        }

        let gate = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = gate.lock().unwrap_or_else(|e| e.into_inner());

        // Another caller may have filled the entry while we waited.
        if let Some(hit) = self.lookup(key) {
            return Ok(hit);
        }

        debug!("cache miss for {key}");
        let result = fetch();
        if let Ok(value) = &result {
            let created_at = (self.clock)();
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.insert(
                key.to_string(),
                CacheEntry {
                    value: value.clone(),
                    created_at,
                },
            );
        }

        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(key);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn manual_clock() -> (Clock, Arc<Mutex<Duration>>) {
        let base = Instant::now();
        let offset = Arc::new(Mutex::new(Duration::ZERO));
        let handle = offset.clone();
        let clock: Clock = Arc::new(move || base + *handle.lock().unwrap());
        (clock, offset)
    }

    #[test]
    fn second_call_within_ttl_hits_the_cache() {
        let cache = QueryCache::new(Duration::from_millis(QUERY_CACHE_TTL_MS));
        let fetches = AtomicUsize::new(0);
        let fetch = || {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({"uuid": "a1"}))
        };

        let first = cache.get_or_fetch("k", fetch).unwrap();
        let second = cache
            .get_or_fetch("k", || panic!("should have been cached"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_entry_triggers_a_refetch() {
        let (clock, offset) = manual_clock();
        let cache = QueryCache::with_clock(Duration::from_millis(QUERY_CACHE_TTL_MS), clock);
        let fetches = AtomicUsize::new(0);

        for _ in 0..2 {
            cache
                .get_or_fetch("k", || {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::json!(1))
                })
                .unwrap();
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        *offset.lock().unwrap() = Duration::from_millis(QUERY_CACHE_TTL_MS + 1);
        cache
            .get_or_fetch("k", || {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!(1))
            })
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let err = cache
            .get_or_fetch("k", || Err(ClientError::query("boom")))
            .unwrap_err();
        assert!(matches!(err, ClientError::Query { .. }));

        let value = cache
            .get_or_fetch("k", || Ok(serde_json::json!("recovered")))
            .unwrap();
        assert_eq!(value, serde_json::json!("recovered"));
    }

    #[test]
    fn distinct_signatures_fetch_independently() {
        let a = call_signature("tok", "get user", &serde_json::json!(["u1"]));
        let b = call_signature("tok", "get user", &serde_json::json!(["u2"]));
        let c = call_signature("other", "get user", &serde_json::json!(["u1"]));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(
            a,
            call_signature("tok", "get user", &serde_json::json!(["u1"]))
        );
    }

    #[test]
    fn concurrent_duplicates_spawn_one_fetch() {
        let cache = Arc::new(QueryCache::new(Duration::from_secs(60)));
        let fetches = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let fetches = fetches.clone();
                thread::spawn(move || {
                    cache
                        .get_or_fetch("k", || {
                            fetches.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(serde_json::json!("shared"))
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), serde_json::json!("shared"));
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
