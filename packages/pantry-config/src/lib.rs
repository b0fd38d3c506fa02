mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, GenerationProviderConfig, Image, ImageProviderConfig, Providers, RateLimit,
	Revalidation, Search, Service,
};

use std::{env, fs, path::Path};

/// Upper bound for every window and TTL setting, one year in seconds.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.rate_limit.window_secs == 0 {
		return Err(Error::Validation {
			message: "rate_limit.window_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.rate_limit.max_requests == 0 {
		return Err(Error::Validation {
			message: "rate_limit.max_requests must be greater than zero.".to_string(),
		});
	}
	if cfg.rate_limit.max_identities == 0 {
		return Err(Error::Validation {
			message: "rate_limit.max_identities must be greater than zero.".to_string(),
		});
	}
	if cfg.rate_limit.sweep_interval_secs == 0 {
		return Err(Error::Validation {
			message: "rate_limit.sweep_interval_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.ttl_secs == 0 {
		return Err(Error::Validation {
			message: "cache.ttl_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.max_entries == 0 {
		return Err(Error::Validation {
			message: "cache.max_entries must be greater than zero.".to_string(),
		});
	}
	if cfg.revalidation.workers == 0 {
		return Err(Error::Validation {
			message: "revalidation.workers must be greater than zero.".to_string(),
		});
	}
	if cfg.revalidation.queue_capacity == 0 {
		return Err(Error::Validation {
			message: "revalidation.queue_capacity must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_query_chars == 0 {
		return Err(Error::Validation {
			message: "search.max_query_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.image.window_secs == 0 {
		return Err(Error::Validation {
			message: "image.window_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.image.max_requests == 0 {
		return Err(Error::Validation {
			message: "image.max_requests must be greater than zero.".to_string(),
		});
	}
	if cfg.image.max_description_chars == 0 {
		return Err(Error::Validation {
			message: "image.max_description_chars must be greater than zero.".to_string(),
		});
	}

	for (key, secs) in [
		("rate_limit.window_secs", cfg.rate_limit.window_secs),
		("rate_limit.sweep_interval_secs", cfg.rate_limit.sweep_interval_secs),
		("cache.ttl_secs", cfg.cache.ttl_secs),
		("cache.stale_window_secs", cfg.cache.stale_window_secs),
		("image.window_secs", cfg.image.window_secs),
	] {
		if secs > MAX_DURATION_SECS {
			return Err(Error::Validation {
				message: format!("{key} must be at most {MAX_DURATION_SECS} seconds."),
			});
		}
	}

	let generation = &cfg.providers.generation;

	if !generation.temperature.is_finite() {
		return Err(Error::Validation {
			message: "providers.generation.temperature must be a finite number.".to_string(),
		});
	}
	if !(0.0..=2.0).contains(&generation.temperature) {
		return Err(Error::Validation {
			message: "providers.generation.temperature must be in the range 0.0-2.0.".to_string(),
		});
	}
	if generation.max_tokens == 0 {
		return Err(Error::Validation {
			message: "providers.generation.max_tokens must be greater than zero.".to_string(),
		});
	}

	for (label, api_base, api_key_env, timeout_ms) in [
		("generation", &generation.api_base, &generation.api_key_env, generation.timeout_ms),
		(
			"image",
			&cfg.providers.image.api_base,
			&cfg.providers.image.api_key_env,
			cfg.providers.image.timeout_ms,
		),
	] {
		if api_base.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("providers.{label}.api_base must be non-empty."),
			});
		}
		if api_key_env.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("providers.{label}.api_key_env must be non-empty."),
			});
		}
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("providers.{label}.timeout_ms must be greater than zero."),
			});
		}
	}

	Ok(())
}

/// Reads a provider credential from the environment variable `name`.
pub fn api_key(name: &str) -> Result<String> {
	match env::var(name) {
		Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
		_ => Err(Error::MissingCredential { env: name.to_string() }),
	}
}

fn normalize(cfg: &mut Config) {
	if cfg.cache.stale_window_secs == 0 {
		cfg.cache.stale_window_secs = cfg.cache.ttl_secs;
	}

	for api_base in [&mut cfg.providers.generation.api_base, &mut cfg.providers.image.api_base] {
		let trimmed = api_base.trim().trim_end_matches('/').to_string();

		*api_base = trimmed;
	}
}
