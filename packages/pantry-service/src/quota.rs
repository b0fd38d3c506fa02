use std::sync::{Arc, Mutex};

use time::{Duration, OffsetDateTime};

use crate::{clock::{self, Clock}, rate::RateDecision};

struct WindowState {
	started_at: OffsetDateTime,
	count: u32,
}

/// Process-wide counter that resets every `window`; no per-identity dimension.
pub struct FixedWindowCounter {
	state: Mutex<WindowState>,
	clock: Arc<dyn Clock>,
	window: Duration,
	limit: u32,
}
impl FixedWindowCounter {
	pub fn new(cfg: &pantry_config::Image, clock: Arc<dyn Clock>) -> Self {
		Self::with_window(clock::seconds(cfg.window_secs), cfg.max_requests, clock)
	}

	pub fn with_window(window: Duration, limit: u32, clock: Arc<dyn Clock>) -> Self {
		let state = WindowState { started_at: clock.now(), count: 0 };

		Self { state: Mutex::new(state), clock, window, limit }
	}

	pub fn acquire(&self) -> RateDecision {
		let now = self.clock.now();
		let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

		if now >= state.started_at + self.window {
			state.started_at = now;
			state.count = 0;
		}

		let reset_at = state.started_at + self.window;

		if state.count >= self.limit {
			return RateDecision { allowed: false, limit: self.limit, remaining: 0, reset_at };
		}

		state.count += 1;

		RateDecision {
			allowed: true,
			limit: self.limit,
			remaining: self.limit - state.count,
			reset_at,
		}
	}
}
