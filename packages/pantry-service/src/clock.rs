use time::{Duration, OffsetDateTime};

/// Source of wall-clock time for every time-dependent component.
pub trait Clock
where
	Self: Send + Sync,
{
	fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Whole seconds as a signed duration, clamped to the configured maximum so clock arithmetic
/// cannot overflow.
pub(crate) fn seconds(secs: u64) -> Duration {
	let secs = secs.min(pantry_config::MAX_DURATION_SECS);

	Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}
