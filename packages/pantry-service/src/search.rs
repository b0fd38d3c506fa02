use std::{
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::{Duration, Instant},
};

use serde::{Deserialize, de::IgnoredAny};

use pantry_config::Config;
use pantry_domain::CacheKey;

use crate::{Error, Providers, RecipeService, Result, rate::RateDecision};

const MAX_FILTER_CHARS: usize = 40;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	#[serde(default)]
	pub filters: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
	Hit,
	Miss,
}
impl CacheStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Hit => "HIT",
			Self::Miss => "MISS",
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct Timings {
	pub admission: Duration,
	pub cache: Duration,
	/// Only set when this request waited on the upstream model.
	pub upstream: Option<Duration>,
	pub total: Duration,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
	/// Serialized recipe batch.
	pub result: String,
	pub recipe_count: usize,
	pub cache: CacheStatus,
	pub rate: RateDecision,
	pub timings: Timings,
}

impl RecipeService {
	pub async fn search(&self, req: SearchRequest, identity: &str) -> Result<SearchOutcome> {
		let started = Instant::now();
		let (query, filters) = validate_search(&self.cfg, req)?;
		let phase = Instant::now();
		let rate = self.governor.admit(identity);
		let admission = phase.elapsed();

		if !rate.allowed {
			tracing::info!(identity, reset_at = %rate.reset_at, "Search rejected by rate limit.");

			return Err(Error::RateLimited { decision: rate });
		}

		let key = CacheKey::new(&query, &filters);
		let upstream_micros = Arc::new(AtomicU64::new(0));
		let producer = {
			let providers = self.providers.clone();
			let cfg = self.cfg.clone();
			let timer = upstream_micros.clone();

			move || fetch_recipes(providers, cfg, query, filters, timer)
		};
		let phase = Instant::now();
		let resolved = match self.cache.resolve(&key, producer).await {
			Ok(resolved) => resolved,
			Err(err) => {
				log_failure(&err, &key);

				return Err(err);
			},
		};
		let cache_elapsed = phase.elapsed();
		// A stale hit shares the timer with its background refresh, so only a miss reports it.
		let upstream = match upstream_micros.load(Ordering::Relaxed) {
			0 => None,
			_ if resolved.served_from_cache => None,
			micros => Some(Duration::from_micros(micros)),
		};
		let cache = if resolved.served_from_cache { CacheStatus::Hit } else { CacheStatus::Miss };
		let timings = Timings { admission, cache: cache_elapsed, upstream, total: started.elapsed() };
		let recipe_count = serde_json::from_str::<Vec<IgnoredAny>>(&resolved.value)
			.map(|recipes| recipes.len())
			.unwrap_or_default();

		tracing::info!(
			cache_key_prefix = %key.log_prefix(),
			hit = resolved.served_from_cache,
			recipes = recipe_count,
			remaining = rate.remaining,
			elapsed_ms = timings.total.as_millis() as u64,
			"Search resolved."
		);

		Ok(SearchOutcome { result: resolved.value, recipe_count, cache, rate, timings })
	}
}

fn validate_search(cfg: &Config, req: SearchRequest) -> Result<(String, Vec<String>)> {
	let query = req.query.trim();

	if query.is_empty() {
		return Err(Error::InvalidRequest {
			field: "query",
			message: "query must be non-empty.".to_string(),
		});
	}
	if query.chars().count() > cfg.search.max_query_chars {
		return Err(Error::InvalidRequest {
			field: "query",
			message: format!("query must be at most {} characters.", cfg.search.max_query_chars),
		});
	}

	let filters: Vec<String> = req
		.filters
		.iter()
		.map(|filter| filter.trim())
		.filter(|filter| !filter.is_empty())
		.map(str::to_string)
		.collect();

	if filters.len() > cfg.search.max_filters {
		return Err(Error::InvalidRequest {
			field: "filters",
			message: format!("at most {} filters are allowed.", cfg.search.max_filters),
		});
	}
	if filters.iter().any(|filter| filter.chars().count() > MAX_FILTER_CHARS) {
		return Err(Error::InvalidRequest {
			field: "filters",
			message: format!("filters must be at most {MAX_FILTER_CHARS} characters each."),
		});
	}

	Ok((query.to_string(), filters))
}

async fn fetch_recipes(
	providers: Providers,
	cfg: Arc<Config>,
	query: String,
	filters: Vec<String>,
	timer: Arc<AtomicU64>,
) -> Result<String> {
	let started = Instant::now();
	let raw = providers.generation.generate(&cfg.providers.generation, &query, &filters).await;

	timer.store((started.elapsed().as_micros() as u64).max(1), Ordering::Relaxed);

	let batch = pantry_domain::parse(&raw?)?;

	tracing::debug!(recipes = batch.len(), "Upstream response validated.");

	Ok(pantry_domain::to_payload(&batch)?)
}

fn log_failure(err: &Error, key: &CacheKey) {
	match err {
		Error::Configuration { message } => tracing::error!(
			cache_key_prefix = %key.log_prefix(),
			error = %message,
			"Upstream is not configured."
		),
		Error::MalformedResponse { message } => tracing::warn!(
			cache_key_prefix = %key.log_prefix(),
			error = %message,
			"Upstream response could not be parsed."
		),
		other => tracing::warn!(
			cache_key_prefix = %key.log_prefix(),
			error = %other,
			"Upstream request failed."
		),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config() -> Config {
		toml::from_str(
			r#"
[service]
http_bind = "127.0.0.1:0"
log_level = "info"

[providers.generation]
api_base = "http://127.0.0.1:1"
path = "/"
model = "test"
api_key_env = "UNUSED"

[providers.image]
api_base = "http://127.0.0.1:1"
path = "/"
model = "test"
api_key_env = "UNUSED"
"#,
		)
		.expect("Failed to parse test config.")
	}

	fn request(query: &str, filters: &[&str]) -> SearchRequest {
		SearchRequest {
			query: query.to_string(),
			filters: filters.iter().map(|filter| filter.to_string()).collect(),
		}
	}

	#[test]
	fn trims_query_and_drops_blank_filters() {
		let (query, filters) =
			validate_search(&config(), request("  pasta ", &["vegan", " ", " nut-free "]))
				.expect("valid");

		assert_eq!(query, "pasta");
		assert_eq!(filters, vec!["vegan", "nut-free"]);
	}

	#[test]
	fn rejects_blank_and_oversized_queries() {
		let cfg = config();

		assert!(matches!(
			validate_search(&cfg, request("   ", &[])),
			Err(Error::InvalidRequest { field: "query", .. })
		));
		assert!(matches!(
			validate_search(&cfg, request(&"a".repeat(201), &[])),
			Err(Error::InvalidRequest { .. })
		));
	}

	#[test]
	fn rejects_too_many_or_too_long_filters() {
		let cfg = config();
		let many = ["a", "b", "c", "d", "e", "f", "g", "h", "i"];
		let long = "x".repeat(41);

		assert!(matches!(
			validate_search(&cfg, request("pasta", &many)),
			Err(Error::InvalidRequest { field: "filters", .. })
		));
		assert!(matches!(
			validate_search(&cfg, request("pasta", &[long.as_str()])),
			Err(Error::InvalidRequest { field: "filters", .. })
		));
	}
}
