//! Response cache with stale-while-revalidate semantics.
//!
//! An entry moves through `Fresh` (before `expires_at`), `Stale` (up to one stale window past it)
//! and `Expired`. Fresh entries are served as-is, stale entries are served while a background
//! refresh runs on the [`Revalidator`], and missing or expired entries are fetched inline.
//! Concurrent stale hits for one key share a single refresh.

use std::{
	collections::HashSet,
	fmt::Display,
	future::Future,
	num::NonZeroUsize,
	sync::{Arc, Mutex},
};

use lru::LruCache;
use time::{Duration, OffsetDateTime};

use pantry_domain::CacheKey;

use crate::{clock::{self, Clock}, revalidate::Revalidator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
	pub payload: String,
	pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
	Missing,
	Fresh,
	Stale,
	Expired,
}
impl CacheState {
	pub fn classify(
		entry: Option<&CacheEntry>,
		now: OffsetDateTime,
		stale_window: Duration,
	) -> Self {
		match entry {
			None => Self::Missing,
			Some(entry) if entry.expires_at > now => Self::Fresh,
			Some(entry) if entry.expires_at > now - stale_window => Self::Stale,
			Some(_) => Self::Expired,
		}
	}
}

/// Key-value capability behind [`ResponseCache`].
///
/// Implementations do not need internal locking; the cache serializes all access.
pub trait CacheStore
where
	Self: Send,
{
	fn get(&mut self, key: &str) -> Option<CacheEntry>;

	fn set(&mut self, key: &str, entry: CacheEntry);

	fn evict(&mut self, key: &str);
}

pub struct LruCacheStore {
	entries: LruCache<String, CacheEntry>,
}
impl LruCacheStore {
	pub fn new(capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

		Self { entries: LruCache::new(capacity) }
	}
}
impl CacheStore for LruCacheStore {
	fn get(&mut self, key: &str) -> Option<CacheEntry> {
		self.entries.get(key).cloned()
	}

	fn set(&mut self, key: &str, entry: CacheEntry) {
		self.entries.put(key.to_string(), entry);
	}

	fn evict(&mut self, key: &str) {
		self.entries.pop(key);
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
	pub value: String,
	pub served_from_cache: bool,
}

#[derive(Clone)]
pub struct ResponseCache {
	inner: Arc<CacheInner>,
}

struct CacheInner {
	store: Mutex<Box<dyn CacheStore>>,
	refreshing: Mutex<HashSet<String>>,
	clock: Arc<dyn Clock>,
	ttl: Duration,
	stale_window: Duration,
	revalidator: Arc<Revalidator>,
}

impl ResponseCache {
	pub fn new(
		cfg: &pantry_config::Cache,
		clock: Arc<dyn Clock>,
		revalidator: Arc<Revalidator>,
	) -> Self {
		Self::with_store(
			Box::new(LruCacheStore::new(cfg.max_entries)),
			clock::seconds(cfg.ttl_secs),
			clock::seconds(cfg.stale_window_secs),
			clock,
			revalidator,
		)
	}

	pub fn with_store(
		store: Box<dyn CacheStore>,
		ttl: Duration,
		stale_window: Duration,
		clock: Arc<dyn Clock>,
		revalidator: Arc<Revalidator>,
	) -> Self {
		Self {
			inner: Arc::new(CacheInner {
				store: Mutex::new(store),
				refreshing: Mutex::new(HashSet::new()),
				clock,
				ttl,
				stale_window,
				revalidator,
			}),
		}
	}

	pub async fn resolve<F, Fut, E>(&self, key: &CacheKey, producer: F) -> Result<Resolved, E>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<String, E>> + Send + 'static,
		E: Display + Send + 'static,
	{
		let now = self.inner.clock.now();
		let entry = self.entry(key);
		let state = CacheState::classify(entry.as_ref(), now, self.inner.stale_window);

		match (state, entry) {
			(CacheState::Fresh, Some(entry)) => {
				tracing::debug!(cache_key_prefix = %key.log_prefix(), "Cache hit.");

				Ok(Resolved { value: entry.payload, served_from_cache: true })
			},
			(CacheState::Stale, Some(entry)) => {
				tracing::debug!(cache_key_prefix = %key.log_prefix(), "Stale cache hit.");

				if self.try_mark_refreshing(key) {
					self.schedule_refresh(key, producer());
				} else {
					tracing::debug!(
						cache_key_prefix = %key.log_prefix(),
						"Revalidation already in flight."
					);
				}

				Ok(Resolved { value: entry.payload, served_from_cache: true })
			},
			(state, _) => {
				if state == CacheState::Expired {
					self.evict(key);
				}

				tracing::debug!(cache_key_prefix = %key.log_prefix(), ?state, "Cache miss.");

				let value = producer().await?;

				self.write(key, value.clone());

				Ok(Resolved { value, served_from_cache: false })
			},
		}
	}

	pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
		self.inner.store.lock().unwrap_or_else(|err| err.into_inner()).get(key.as_str())
	}

	pub fn state(&self, key: &CacheKey) -> CacheState {
		let entry = self.entry(key);

		CacheState::classify(entry.as_ref(), self.inner.clock.now(), self.inner.stale_window)
	}

	pub fn is_refreshing(&self, key: &CacheKey) -> bool {
		self.inner
			.refreshing
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.contains(key.as_str())
	}

	fn write(&self, key: &CacheKey, payload: String) {
		let entry = CacheEntry { payload, expires_at: self.inner.clock.now() + self.inner.ttl };

		self.inner.store.lock().unwrap_or_else(|err| err.into_inner()).set(key.as_str(), entry);
	}

	fn evict(&self, key: &CacheKey) {
		self.inner.store.lock().unwrap_or_else(|err| err.into_inner()).evict(key.as_str());
	}

	fn try_mark_refreshing(&self, key: &CacheKey) -> bool {
		self.inner
			.refreshing
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.insert(key.as_str().to_string())
	}

	fn clear_refreshing(&self, key: &CacheKey) {
		self.inner
			.refreshing
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.remove(key.as_str());
	}

	fn schedule_refresh<Fut, E>(&self, key: &CacheKey, refresh: Fut)
	where
		Fut: Future<Output = Result<String, E>> + Send + 'static,
		E: Display + Send + 'static,
	{
		let guard = RefreshGuard { cache: self.clone(), key: key.clone() };
		let job = async move {
			let RefreshGuard { cache, key } = &guard;

			match refresh.await {
				Ok(value) => {
					cache.write(key, value);

					tracing::info!(
						cache_key_prefix = %key.log_prefix(),
						"Background revalidation stored a fresh entry."
					);
				},
				Err(err) => tracing::warn!(
					cache_key_prefix = %key.log_prefix(),
					error = %err,
					"Background revalidation failed; keeping the stale entry."
				),
			}
		};

		if let Err(err) = self.inner.revalidator.submit(Box::pin(job)) {
			tracing::warn!(
				cache_key_prefix = %key.log_prefix(),
				error = %err,
				"Background revalidation was not scheduled."
			);
		}
	}
}

/// Owned by a refresh job. Dropping it clears the in-flight marker whether the job finished,
/// panicked, or was never run.
struct RefreshGuard {
	cache: ResponseCache,
	key: CacheKey,
}
impl Drop for RefreshGuard {
	fn drop(&mut self) {
		self.cache.clear_refreshing(&self.key);
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	struct FixedClock(Mutex<OffsetDateTime>);
	impl FixedClock {
		fn advance(&self, by: Duration) {
			*self.0.lock().unwrap_or_else(|err| err.into_inner()) += by;
		}
	}
	impl Clock for FixedClock {
		fn now(&self) -> OffsetDateTime {
			*self.0.lock().unwrap_or_else(|err| err.into_inner())
		}
	}

	fn cache() -> (Arc<FixedClock>, Arc<Revalidator>, ResponseCache) {
		let clock = Arc::new(FixedClock(Mutex::new(OffsetDateTime::UNIX_EPOCH)));
		let revalidator = Arc::new(Revalidator::spawn(&pantry_config::Revalidation {
			workers: 1,
			queue_capacity: 8,
		}));
		let cache = ResponseCache::with_store(
			Box::new(LruCacheStore::new(16)),
			Duration::hours(12),
			Duration::hours(12),
			clock.clone(),
			revalidator.clone(),
		);

		(clock, revalidator, cache)
	}

	fn counting_producer(
		calls: &Arc<AtomicUsize>,
		value: &str,
	) -> impl FnOnce() -> std::future::Ready<Result<String, String>> {
		let calls = calls.clone();
		let value = value.to_string();

		move || {
			calls.fetch_add(1, Ordering::SeqCst);

			std::future::ready(Ok(value))
		}
	}

	#[test]
	fn classifies_entry_ages() {
		let now = OffsetDateTime::UNIX_EPOCH + Duration::days(10);
		let window = Duration::hours(12);
		let entry = |offset: Duration| CacheEntry { payload: String::new(), expires_at: now + offset };

		assert_eq!(CacheState::classify(None, now, window), CacheState::Missing);
		assert_eq!(
			CacheState::classify(Some(&entry(Duration::seconds(1))), now, window),
			CacheState::Fresh
		);
		assert_eq!(CacheState::classify(Some(&entry(Duration::ZERO)), now, window), CacheState::Stale);
		assert_eq!(
			CacheState::classify(Some(&entry(-Duration::hours(11))), now, window),
			CacheState::Stale
		);
		assert_eq!(
			CacheState::classify(Some(&entry(-Duration::hours(12))), now, window),
			CacheState::Expired
		);
	}

	#[tokio::test]
	async fn fresh_entry_never_calls_the_producer() {
		let (clock, _, cache) = cache();
		let key = CacheKey::new::<&str>("soup", &[]);
		let calls = Arc::new(AtomicUsize::new(0));
		let first = cache.resolve(&key, counting_producer(&calls, "v1")).await.expect("miss");

		clock.advance(Duration::hours(11));

		let second = cache.resolve(&key, counting_producer(&calls, "v2")).await.expect("hit");

		assert!(!first.served_from_cache);
		assert!(second.served_from_cache);
		assert_eq!(second.value, "v1");
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn failed_fetch_writes_nothing() {
		let (_, _, cache) = cache();
		let key = CacheKey::new::<&str>("soup", &[]);
		let result = cache
			.resolve(&key, || std::future::ready(Err::<String, _>("upstream down".to_string())))
			.await;

		assert_eq!(result, Err("upstream down".to_string()));
		assert_eq!(cache.state(&key), CacheState::Missing);
	}

	#[tokio::test]
	async fn stale_hit_serves_old_value_and_refreshes_once() {
		let (clock, revalidator, cache) = cache();
		let key = CacheKey::new::<&str>("soup", &[]);
		let calls = Arc::new(AtomicUsize::new(0));

		cache.resolve(&key, counting_producer(&calls, "v1")).await.expect("miss");
		clock.advance(Duration::hours(13));

		let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
		let gated = {
			let calls = calls.clone();

			move || {
				calls.fetch_add(1, Ordering::SeqCst);

				async move {
					let _ = release_rx.await;

					Ok::<_, String>("v2".to_string())
				}
			}
		};
		let stale = cache.resolve(&key, gated).await.expect("stale hit");

		assert!(stale.served_from_cache);
		assert_eq!(stale.value, "v1");
		assert!(cache.is_refreshing(&key));

		let again = cache.resolve(&key, counting_producer(&calls, "v3")).await.expect("stale hit");

		assert_eq!(again.value, "v1");
		assert_eq!(calls.load(Ordering::SeqCst), 2);

		let _ = release_tx.send(());

		revalidator.shutdown().await;

		let entry = cache.entry(&key).expect("entry");

		assert_eq!(entry.payload, "v2");
		assert_eq!(entry.expires_at, clock.now() + Duration::hours(12));
		assert!(!cache.is_refreshing(&key));
	}

	#[tokio::test]
	async fn failed_refresh_keeps_the_stale_entry() {
		let (clock, revalidator, cache) = cache();
		let key = CacheKey::new::<&str>("soup", &[]);
		let calls = Arc::new(AtomicUsize::new(0));

		cache.resolve(&key, counting_producer(&calls, "v1")).await.expect("miss");
		clock.advance(Duration::hours(13));

		let stale = cache
			.resolve(&key, || std::future::ready(Err::<String, _>("boom".to_string())))
			.await
			.expect("stale hit");

		revalidator.shutdown().await;

		assert_eq!(stale.value, "v1");
		assert_eq!(cache.entry(&key).map(|entry| entry.payload), Some("v1".to_string()));
		assert_eq!(cache.state(&key), CacheState::Stale);
	}

	#[tokio::test]
	async fn expired_entry_is_fetched_inline() {
		let (clock, _, cache) = cache();
		let key = CacheKey::new::<&str>("soup", &[]);
		let calls = Arc::new(AtomicUsize::new(0));

		cache.resolve(&key, counting_producer(&calls, "v1")).await.expect("miss");
		clock.advance(Duration::hours(25));

		let resolved = cache.resolve(&key, counting_producer(&calls, "v2")).await.expect("miss");

		assert!(!resolved.served_from_cache);
		assert_eq!(resolved.value, "v2");
		assert_eq!(cache.state(&key), CacheState::Fresh);
	}

	#[tokio::test]
	async fn closed_executor_clears_the_refresh_marker() {
		let (clock, revalidator, cache) = cache();
		let key = CacheKey::new::<&str>("soup", &[]);
		let calls = Arc::new(AtomicUsize::new(0));

		cache.resolve(&key, counting_producer(&calls, "v1")).await.expect("miss");
		revalidator.shutdown().await;
		clock.advance(Duration::hours(13));

		let stale = cache.resolve(&key, counting_producer(&calls, "v2")).await.expect("stale hit");

		assert_eq!(stale.value, "v1");
		assert!(!cache.is_refreshing(&key));
	}

	#[tokio::test]
	async fn panicking_refresh_clears_the_refresh_marker() {
		let (clock, revalidator, cache) = cache();
		let key = CacheKey::new::<&str>("soup", &[]);
		let calls = Arc::new(AtomicUsize::new(0));

		cache.resolve(&key, counting_producer(&calls, "v1")).await.expect("miss");
		clock.advance(Duration::hours(13));

		let stale = cache
			.resolve(&key, || async {
				if true {
					panic!("refresh blew up");
				}

				Ok::<String, String>("v2".to_string())
			})
			.await
			.expect("stale hit");

		revalidator.shutdown().await;

		assert_eq!(stale.value, "v1");
		assert!(!cache.is_refreshing(&key));
		assert_eq!(cache.entry(&key).map(|entry| entry.payload), Some("v1".to_string()));
	}
}
