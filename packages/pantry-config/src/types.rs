use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	#[serde(default)]
	pub rate_limit: RateLimit,
	#[serde(default)]
	pub cache: Cache,
	#[serde(default)]
	pub revalidation: Revalidation,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub image: Image,
	pub providers: Providers,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	/// Derive the client identity from `X-Forwarded-For` / `X-Real-IP` before the peer address.
	#[serde(default = "default_true")]
	pub trust_forwarded_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimit {
	pub window_secs: u64,
	pub max_requests: u32,
	pub max_identities: usize,
	pub sweep_interval_secs: u64,
}
impl Default for RateLimit {
	fn default() -> Self {
		Self { window_secs: 60, max_requests: 5, max_identities: 10_000, sweep_interval_secs: 300 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub ttl_secs: u64,
	/// How long past `ttl_secs` an entry may still be served while it is refreshed.
	/// Zero falls back to `ttl_secs`.
	pub stale_window_secs: u64,
	pub max_entries: usize,
}
impl Default for Cache {
	fn default() -> Self {
		Self { ttl_secs: 43_200, stale_window_secs: 43_200, max_entries: 1_000 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Revalidation {
	pub workers: usize,
	pub queue_capacity: usize,
}
impl Default for Revalidation {
	fn default() -> Self {
		Self { workers: 2, queue_capacity: 64 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Search {
	pub max_query_chars: usize,
	pub max_filters: usize,
}
impl Default for Search {
	fn default() -> Self {
		Self { max_query_chars: 200, max_filters: 8 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Image {
	pub window_secs: u64,
	pub max_requests: u32,
	pub max_description_chars: usize,
}
impl Default for Image {
	fn default() -> Self {
		Self { window_secs: 60, max_requests: 10, max_description_chars: 500 }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub generation: GenerationProviderConfig,
	pub image: ImageProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationProviderConfig {
	pub api_base: String,
	pub path: String,
	pub model: String,
	/// Name of the environment variable holding the bearer credential.
	pub api_key_env: String,
	#[serde(default = "default_temperature")]
	pub temperature: f32,
	#[serde(default = "default_max_tokens")]
	pub max_tokens: u32,
	#[serde(default = "default_generation_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageProviderConfig {
	pub api_base: String,
	pub path: String,
	pub model: String,
	pub api_key_env: String,
	#[serde(default = "default_image_size")]
	pub size: String,
	#[serde(default = "default_image_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

fn default_true() -> bool {
	true
}

fn default_temperature() -> f32 {
	0.2
}

fn default_max_tokens() -> u32 {
	3_000
}

fn default_generation_timeout_ms() -> u64 {
	25_000
}

fn default_image_size() -> String {
	"1024x1024".to_string()
}

fn default_image_timeout_ms() -> u64 {
	30_000
}
