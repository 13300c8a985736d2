//! Short-lived cache of upstream responses for the bandwidth-priced path.
//!
//! A response fetched while quoting an invoice is kept until the invoice is paid, so the
//! paid retrieval does not hit upstream again. Each entry remembers the method and params
//! it answers; a paid call asking for something else must not be served from it. Entries
//! expire after a fixed TTL no matter what happens to the invoice.

use std::{num::NonZeroUsize, time::Duration};

use lru::LruCache;
use parking_lot::Mutex;
use rpc402_core::{
    jsonrpc::{JsonRpcRequest, JsonRpcResponse},
    types::{AnyJson, unix_millis},
};
use serde::Serialize;
use tokio::time::Instant;

/// Default time an entry stays readable.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default maximum number of entries.
const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    /// Method of the request the response answers
    pub method: String,
    pub params: Option<AnyJson>,
    pub response: JsonRpcResponse,
    /// Length of the serialized JSON response
    pub size_bytes: usize,
    /// Milliseconds since the unix epoch at insertion
    pub timestamp: u64,
    inserted: Instant,
}

impl CachedResponse {
    /// Whether this is the answer to `request`, regardless of its id.
    pub fn answers(&self, request: &JsonRpcRequest) -> bool {
        self.method == request.method && self.params == request.params
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub keys: usize,
    pub hits: u64,
    pub misses: u64,
}

struct Inner {
    entries: LruCache<String, CachedResponse>,
    hits: u64,
    misses: u64,
}

pub struct ResponseCache {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The entry lock is not reentrant; never take it here.
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

/// Cache key of the response quoted for an invoice.
pub fn cache_key(invoice_id: &str) -> String {
    format!("response:{invoice_id}")
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        ResponseCache {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
            ttl,
        }
    }

    /// Store the response to `request` and return its serialized size in bytes.
    pub fn put(
        &self,
        key: impl Into<String>,
        request: &JsonRpcRequest,
        response: JsonRpcResponse,
    ) -> usize {
        let size_bytes = serde_json::to_vec(&response)
            .map(|bytes| bytes.len())
            .unwrap_or_default();

        let entry = CachedResponse {
            method: request.method.clone(),
            params: request.params.clone(),
            response,
            size_bytes,
            timestamp: unix_millis(),
            inserted: Instant::now(),
        };
        self.inner.lock().entries.put(key.into(), entry);
        size_bytes
    }

    /// Read a live entry. Expired entries are dropped and count as misses.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut inner = self.inner.lock();

        let live = match inner.entries.get(key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => Some(entry.clone()),
            Some(_) => {
                inner.entries.pop(key);
                None
            }
            None => None,
        };

        match live {
            Some(_) => inner.hits += 1,
            None => inner.misses += 1,
        }
        live
    }

    /// Remove an entry, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().entries.pop(key).is_some()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            keys: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use rpc402_core::jsonrpc::JsonRpcId;
    use serde_json::json;

    use super::*;

    fn response() -> JsonRpcResponse {
        JsonRpcResponse::result(JsonRpcId::from(1), json!({ "blockTime": 1700000000 }))
    }

    fn request() -> JsonRpcRequest {
        JsonRpcRequest::new(1u64, "getBlockTime", Some(json!([430])))
    }

    #[test]
    fn put_reports_serialized_size() {
        let cache = ResponseCache::default();
        let expected = serde_json::to_vec(&response()).unwrap().len();

        assert_eq!(cache.put(cache_key("inv-1"), &request(), response()), expected);
        assert_eq!(cache.get("response:inv-1").unwrap().size_bytes, expected);
    }

    #[test]
    fn delete_and_stats() {
        let cache = ResponseCache::default();
        cache.put("a", &request(), response());

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert!(cache.get("a").is_none());

        assert_eq!(
            cache.stats(),
            CacheStats {
                keys: 0,
                hits: 1,
                misses: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(60), 16);
        cache.put("a", &request(), response());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("a").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("a").is_none());
        assert_eq!(cache.stats().keys, 0);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = ResponseCache::new(DEFAULT_TTL, 2);
        cache.put("a", &request(), response());
        cache.put("b", &request(), response());
        cache.get("a");
        cache.put("c", &request(), response());

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn entries_answer_only_their_own_request() {
        let cache = ResponseCache::default();
        cache.put("a", &request(), response());
        let entry = cache.get("a").unwrap();

        assert!(entry.answers(&JsonRpcRequest::new(99u64, "getBlockTime", Some(json!([430])))));
        assert!(!entry.answers(&JsonRpcRequest::new(1u64, "getBlockTime", Some(json!([431])))));
        assert!(!entry.answers(&JsonRpcRequest::new(1u64, "getBlock", Some(json!([430])))));
    }

    #[test]
    fn debug_does_not_take_the_entry_lock() {
        let cache = ResponseCache::default();
        cache.put("a", &request(), response());

        let _held = cache.inner.lock();
        let rendered = format!("{cache:?}");
        assert!(rendered.starts_with("ResponseCache"), "{rendered}");
        assert!(rendered.contains("ttl"), "{rendered}");
    }
}
