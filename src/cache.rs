//! Caching layer for routing decisions and pipeline metrics.
//!
//! Three process-wide structures back the router: a generic
//! [`LruCache`] with optional TTL, the read-mostly [`CapabilityIndex`]
//! built once at router construction, and [`PerformanceMetrics`]
//! keeping a bounded window of phase durations. All are guarded by
//! per-instance mutexes and reachable through accessor functions so any
//! task can use them.
//!
//! Tests that assert on global state should either use capability names
//! unique to the test or call the `clear` methods first.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, OnceLock, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Samples kept per phase in [`PerformanceMetrics`].
const METRIC_WINDOW: usize = 100;
/// Default routing-cache capacity.
const ROUTING_CACHE_SIZE: usize = 500;
/// Default routing-cache entry TTL.
const ROUTING_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Locks a mutex, recovering the guard if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheMetrics {
    /// Lookups that returned a live entry.
    pub hits: u64,
    /// Lookups that found nothing (including expired entries).
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0 when no lookups occurred.
    pub hit_rate: f64,
    /// Current number of live entries.
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Entries evicted because the cache was full.
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed.
    pub expirations: u64,
}

struct CacheEntry<V> {
    value: V,
    created: Instant,
    last_access: u64,
    ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.created.elapsed() > ttl)
    }
}

struct LruInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// Thread-safe LRU cache with optional TTL.
///
/// Entries are evicted least-recently-accessed-first once `max_size` is
/// exceeded. Expiration is lazy: an expired entry is removed on the
/// `get` that observes it, which counts as an expiration plus a miss.
/// A `None` TTL means the entry never expires.
pub struct LruCache<K, V> {
    inner: Mutex<LruInner<K, V>>,
    max_size: usize,
    default_ttl: Option<Duration>,
}

impl<K, V> LruCache<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a cache holding at most `max_size` entries with an
    /// optional default TTL.
    #[must_use]
    pub fn new(max_size: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            inner: Mutex::new(LruInner {
                entries: HashMap::new(),
                clock: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
            max_size: max_size.max(1),
            default_ttl,
        }
    }

    /// Returns the cached value for `key`, promoting it to
    /// most-recently-used. Expired entries are removed and counted.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = lock(&self.inner);
        inner.clock += 1;
        let stamp = inner.clock;

        let expired = match inner.entries.get(key) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(),
        };

        if expired {
            inner.entries.remove(key);
            inner.expirations += 1;
            inner.misses += 1;
            return None;
        }

        inner.hits += 1;
        inner.entries.get_mut(key).map(|entry| {
            entry.last_access = stamp;
            entry.value.clone()
        })
    }

    /// Inserts `value` under `key` with the default TTL.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Inserts `value` under `key` with an explicit per-entry TTL
    /// (`None` = never expires). The key becomes most-recently-used; if
    /// capacity is exceeded the oldest entry is evicted.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Option<Duration>) {
        let mut inner = lock(&self.inner);
        inner.clock += 1;
        let stamp = inner.clock;
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created: Instant::now(),
                last_access: stamp,
                ttl,
            },
        );

        if inner.entries.len() > self.max_size {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                inner.entries.remove(&key);
                inner.evictions += 1;
            }
        }
    }

    /// Removes all entries. Counters are preserved.
    pub fn clear(&self) {
        lock(&self.inner).entries.clear();
    }

    /// Removes all entries and resets counters.
    pub fn reset(&self) {
        let mut inner = lock(&self.inner);
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
        inner.expirations = 0;
    }

    /// Current counter snapshot.
    pub fn metrics(&self) -> CacheMetrics {
        let inner = lock(&self.inner);
        let total = inner.hits + inner.misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total == 0 {
            0.0
        } else {
            inner.hits as f64 / total as f64
        };
        CacheMetrics {
            hits: inner.hits,
            misses: inner.misses,
            hit_rate,
            size: inner.entries.len(),
            max_size: self.max_size,
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }
}

#[derive(Default)]
struct CapabilityIndexInner {
    forward: BTreeMap<String, Vec<String>>,
    reverse: BTreeMap<String, Vec<String>>,
    initialized: bool,
}

/// Read-mostly index of agent capabilities.
///
/// Built once at router construction: a forward map (agent id → its
/// capabilities) and a reverse map (capability → agent ids in sorted
/// agent order). Reads take a shared lock; `initialize` is the only
/// writer.
#[derive(Default)]
pub struct CapabilityIndex {
    inner: RwLock<CapabilityIndexInner>,
}

impl CapabilityIndex {
    /// Creates an empty, uninitialized index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates the index from a capability map. Re-initializing with
    /// the same map is a no-op in effect; callers normally guard with
    /// [`Self::is_initialized`].
    pub fn initialize(&self, capability_map: &BTreeMap<String, Vec<String>>) {
        let mut reverse: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (agent_id, capabilities) in capability_map {
            for capability in capabilities {
                reverse
                    .entry(capability.clone())
                    .or_default()
                    .push(agent_id.clone());
            }
        }
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.forward = capability_map.clone();
        inner.reverse = reverse;
        inner.initialized = true;
        tracing::debug!(agents = capability_map.len(), "capability index initialized");
    }

    /// Whether [`Self::initialize`] has run.
    pub fn is_initialized(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .initialized
    }

    /// Capabilities advertised by `agent_id`, if known.
    pub fn get_agent_capabilities(&self, agent_id: &str) -> Option<Vec<String>> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .forward
            .get(agent_id)
            .cloned()
    }

    /// Agent ids advertising `capability` (exact match), in sorted
    /// agent order. Empty when none do.
    pub fn find_agents_for_capability(&self, capability: &str) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .reverse
            .get(capability)
            .cloned()
            .unwrap_or_default()
    }

    /// Drops all index state. Intended for tests.
    pub fn clear(&self) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *inner = CapabilityIndexInner::default();
    }
}

/// LRU+TTL cache of routing decisions (`capability → agent id`).
pub struct RoutingCache {
    cache: LruCache<String, String>,
}

impl RoutingCache {
    /// Creates a routing cache with the default capacity (500) and TTL
    /// (one hour).
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: LruCache::new(ROUTING_CACHE_SIZE, Some(ROUTING_CACHE_TTL)),
        }
    }

    /// Cached agent id for `capability`, if present and live.
    pub fn get_routing(&self, capability: &str) -> Option<String> {
        self.cache.get(&capability.to_string())
    }

    /// Caches a routing decision under the default TTL.
    pub fn set_routing(&self, capability: &str, agent_id: &str) {
        self.cache.set(capability.to_string(), agent_id.to_string());
    }

    /// Removes all cached decisions. Intended for tests and capability
    /// reloads.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Current counter snapshot.
    pub fn metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }
}

impl Default for RoutingCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics over the retained duration window of one phase.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PhaseStats {
    /// Number of retained samples.
    pub count: usize,
    /// Minimum duration in seconds.
    pub min: f64,
    /// Maximum duration in seconds.
    pub max: f64,
    /// Mean duration in seconds.
    pub avg: f64,
    /// 50th percentile.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
}

/// Bounded per-phase duration collector.
///
/// Keeps the last [`METRIC_WINDOW`] samples per phase; phases are
/// created lazily on first record. Statistics are computed over the
/// current window, sorted at query time.
#[derive(Default)]
pub struct PerformanceMetrics {
    inner: Mutex<HashMap<String, VecDeque<f64>>>,
}

impl PerformanceMetrics {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a phase duration in seconds.
    pub fn record(&self, phase: &str, duration_secs: f64) {
        let mut inner = lock(&self.inner);
        let samples = inner.entry(phase.to_string()).or_default();
        samples.push_back(duration_secs);
        while samples.len() > METRIC_WINDOW {
            samples.pop_front();
        }
    }

    /// Statistics for one phase, or `None` when no samples exist.
    pub fn get_stats(&self, phase: &str) -> Option<PhaseStats> {
        let inner = lock(&self.inner);
        let samples = inner.get(phase)?;
        if samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percentile = |p: f64| -> f64 {
            let idx = ((count as f64 * p) as usize).min(count - 1);
            sorted[idx]
        };
        #[allow(clippy::cast_precision_loss)]
        Some(PhaseStats {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            avg: sum / count as f64,
            p50: percentile(0.50),
            p95: percentile(0.95),
            p99: percentile(0.99),
        })
    }

    /// Statistics for every phase with samples.
    pub fn get_all_stats(&self) -> BTreeMap<String, PhaseStats> {
        let phases: Vec<String> = {
            let inner = lock(&self.inner);
            inner.keys().cloned().collect()
        };
        phases
            .into_iter()
            .filter_map(|phase| self.get_stats(&phase).map(|stats| (phase, stats)))
            .collect()
    }

    /// Drops all samples. Intended for tests.
    pub fn clear(&self) {
        lock(&self.inner).clear();
    }
}

static CAPABILITY_INDEX: OnceLock<CapabilityIndex> = OnceLock::new();
static ROUTING_CACHE: OnceLock<RoutingCache> = OnceLock::new();
static PERFORMANCE_METRICS: OnceLock<PerformanceMetrics> = OnceLock::new();

/// Process-wide [`CapabilityIndex`], created on first use.
pub fn capability_index() -> &'static CapabilityIndex {
    CAPABILITY_INDEX.get_or_init(CapabilityIndex::new)
}

/// Process-wide [`RoutingCache`], created on first use.
pub fn routing_cache() -> &'static RoutingCache {
    ROUTING_CACHE.get_or_init(RoutingCache::new)
}

/// Process-wide [`PerformanceMetrics`], created on first use.
pub fn performance_metrics() -> &'static PerformanceMetrics {
    PERFORMANCE_METRICS.get_or_init(PerformanceMetrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let cache: LruCache<String, i32> = LruCache::new(10, None);
        cache.set("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"missing".to_string()), None);
    }

    #[test]
    fn test_eviction_drops_least_recently_used() {
        let cache: LruCache<String, i32> = LruCache::new(3, None);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);
        cache.set("c".to_string(), 3);
        cache.set("d".to_string(), 4);
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"d".to_string()), Some(4));
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[test]
    fn test_get_promotes_to_most_recent() {
        let cache: LruCache<String, i32> = LruCache::new(3, None);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);
        cache.set("c".to_string(), 3);
        // Touch "a" so "b" becomes the oldest.
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        cache.set("d".to_string(), 4);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_reinsert_moves_to_most_recent() {
        let cache: LruCache<String, i32> = LruCache::new(2, None);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);
        cache.set("a".to_string(), 10);
        cache.set("c".to_string(), 3);
        assert_eq!(cache.get(&"a".to_string()), Some(10));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_ttl_expiration_counts_as_miss() {
        let cache: LruCache<String, i32> = LruCache::new(10, Some(Duration::from_millis(5)));
        cache.set("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"a".to_string()), None);
        let metrics = cache.metrics();
        assert_eq!(metrics.expirations, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hits, 0);
    }

    #[test]
    fn test_none_ttl_never_expires() {
        let cache: LruCache<String, i32> = LruCache::new(10, Some(Duration::from_millis(5)));
        cache.set_with_ttl("a".to_string(), 1, None);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn test_metrics_hit_rate() {
        let cache: LruCache<String, i32> = LruCache::new(10, None);
        cache.set("a".to_string(), 1);
        let _ = cache.get(&"a".to_string());
        let _ = cache.get(&"b".to_string());
        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert!((metrics.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_capability_index_round_trip() {
        let index = CapabilityIndex::new();
        assert!(!index.is_initialized());

        let mut map = BTreeMap::new();
        map.insert(
            "geo".to_string(),
            vec!["geocoding".to_string(), "reverse_geocoding".to_string()],
        );
        map.insert("finance".to_string(), vec!["stocks".to_string()]);
        index.initialize(&map);

        assert!(index.is_initialized());
        assert_eq!(
            index.find_agents_for_capability("geocoding"),
            vec!["geo".to_string()]
        );
        assert_eq!(
            index.get_agent_capabilities("finance"),
            Some(vec!["stocks".to_string()])
        );
        assert!(index.find_agents_for_capability("unknown").is_empty());

        index.clear();
        assert!(!index.is_initialized());
        assert!(index.find_agents_for_capability("geocoding").is_empty());
    }

    #[test]
    fn test_capability_index_concurrent_reads() {
        let index = std::sync::Arc::new(CapabilityIndex::new());
        let mut map = BTreeMap::new();
        map.insert("wiki".to_string(), vec!["wikipedia".to_string()]);
        index.initialize(&map);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let index = std::sync::Arc::clone(&index);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(
                            index.find_agents_for_capability("wikipedia"),
                            vec!["wiki".to_string()]
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().is_ok());
        }
    }

    #[test]
    fn test_routing_cache_round_trip() {
        let cache = RoutingCache::new();
        assert!(cache.get_routing("test_cache_rt_geocoding").is_none());
        cache.set_routing("test_cache_rt_geocoding", "geo");
        assert_eq!(
            cache.get_routing("test_cache_rt_geocoding"),
            Some("geo".to_string())
        );
    }

    #[test]
    fn test_performance_metrics_stats() {
        let metrics = PerformanceMetrics::new();
        assert!(metrics.get_stats("interpretation").is_none());

        for i in 1..=10 {
            metrics.record("interpretation", f64::from(i) / 10.0);
        }
        let stats = metrics.get_stats("interpretation");
        assert!(stats.is_some());
        if let Some(stats) = stats {
            assert_eq!(stats.count, 10);
            assert!((stats.min - 0.1).abs() < 1e-9);
            assert!((stats.max - 1.0).abs() < 1e-9);
            assert!((stats.avg - 0.55).abs() < 1e-9);
            assert!((stats.p50 - 0.6).abs() < 1e-9);
        }
    }

    #[test]
    fn test_performance_metrics_window_is_bounded() {
        let metrics = PerformanceMetrics::new();
        for i in 0..250 {
            metrics.record("execution_window", f64::from(i));
        }
        let stats = metrics.get_stats("execution_window");
        if let Some(stats) = stats {
            assert_eq!(stats.count, METRIC_WINDOW);
            // Only the most recent 100 samples remain.
            assert!((stats.min - 150.0).abs() < 1e-9);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn test_global_accessors_are_singletons() {
        assert!(std::ptr::eq(routing_cache(), routing_cache()));
        assert!(std::ptr::eq(capability_index(), capability_index()));
    }
}
