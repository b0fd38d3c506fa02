use std::{
	num::NonZeroUsize,
	sync::{Arc, Mutex},
};

use lru::LruCache;
use time::{Duration, OffsetDateTime};

use crate::clock::{self, Clock};

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
	pub allowed: bool,
	pub limit: u32,
	pub remaining: u32,
	/// When the oldest counted request leaves the window.
	pub reset_at: OffsetDateTime,
}

/// Per-identity acceptance history.
///
/// Implementations do not need internal locking; the governor serializes all access.
pub trait RateStore
where
	Self: Send,
{
	fn get(&mut self, identity: &str) -> Option<Vec<OffsetDateTime>>;

	fn set(&mut self, identity: &str, hits: Vec<OffsetDateTime>);

	fn evict(&mut self, identity: &str);

	/// Identities whose newest hit is at or before `cutoff`.
	fn idle_identities(&self, cutoff: OffsetDateTime) -> Vec<String>;

	fn len(&self) -> usize;
}

/// Capacity-bounded store; the least recently touched identity is reclaimed first.
pub struct LruRateStore {
	entries: LruCache<String, Vec<OffsetDateTime>>,
}
impl LruRateStore {
	pub fn new(capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

		Self { entries: LruCache::new(capacity) }
	}
}
impl RateStore for LruRateStore {
	fn get(&mut self, identity: &str) -> Option<Vec<OffsetDateTime>> {
		self.entries.get(identity).cloned()
	}

	fn set(&mut self, identity: &str, hits: Vec<OffsetDateTime>) {
		self.entries.put(identity.to_string(), hits);
	}

	fn evict(&mut self, identity: &str) {
		self.entries.pop(identity);
	}

	fn idle_identities(&self, cutoff: OffsetDateTime) -> Vec<String> {
		self.entries
			.iter()
			.filter(|(_, hits)| hits.iter().max().map(|newest| *newest <= cutoff).unwrap_or(true))
			.map(|(identity, _)| identity.clone())
			.collect()
	}

	fn len(&self) -> usize {
		self.entries.len()
	}
}

/// Sliding-window limiter: at most `limit` admissions per identity in any `window`.
pub struct RateGovernor {
	store: Mutex<Box<dyn RateStore>>,
	clock: Arc<dyn Clock>,
	window: Duration,
	limit: u32,
}
impl RateGovernor {
	pub fn new(cfg: &pantry_config::RateLimit, clock: Arc<dyn Clock>) -> Self {
		Self::with_store(
			Box::new(LruRateStore::new(cfg.max_identities)),
			clock::seconds(cfg.window_secs),
			cfg.max_requests,
			clock,
		)
	}

	pub fn with_store(
		store: Box<dyn RateStore>,
		window: Duration,
		limit: u32,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self { store: Mutex::new(store), clock, window, limit }
	}

	pub fn limit(&self) -> u32 {
		self.limit
	}

	pub fn admit(&self, identity: &str) -> RateDecision {
		let now = self.clock.now();
		let cutoff = now - self.window;
		let mut store = self.store.lock().unwrap_or_else(|err| err.into_inner());
		let mut hits = store.get(identity).unwrap_or_default();

		hits.retain(|hit| *hit > cutoff);

		if hits.len() >= self.limit as usize {
			let reset_at = hits.iter().min().copied().unwrap_or(now) + self.window;

			store.set(identity, hits);

			return RateDecision { allowed: false, limit: self.limit, remaining: 0, reset_at };
		}

		hits.push(now);

		let remaining = self.limit.saturating_sub(hits.len() as u32);
		let reset_at = hits.iter().min().copied().unwrap_or(now) + self.window;

		store.set(identity, hits);

		RateDecision { allowed: true, limit: self.limit, remaining, reset_at }
	}

	/// Drops identities with no activity inside the current window. Returns how many were dropped.
	pub fn sweep(&self) -> usize {
		let cutoff = self.clock.now() - self.window;
		let mut store = self.store.lock().unwrap_or_else(|err| err.into_inner());
		let idle = store.idle_identities(cutoff);

		for identity in &idle {
			store.evict(identity);
		}

		idle.len()
	}

	pub fn tracked_identities(&self) -> usize {
		self.store.lock().unwrap_or_else(|err| err.into_inner()).len()
	}
}
