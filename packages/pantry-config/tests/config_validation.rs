use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use pantry_config::{Config, Error};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let mut table = root.as_table_mut().expect("Template config must be a table.");

	for part in section.split('.') {
		table = table
			.get_mut(part)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn sample_toml_without(section: &str) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");

	root.as_table_mut().expect("Template config must be a table.").remove(section);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("pantry_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> pantry_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = pantry_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn base_config() -> Config {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse test config.")
}

#[test]
fn sample_config_loads_and_normalizes_api_base() {
	let cfg = load_payload(SAMPLE_CONFIG_TEMPLATE_TOML.to_string()).expect("Expected valid config.");

	assert_eq!(cfg.providers.generation.api_base, "https://api.openai.com");
	assert_eq!(cfg.rate_limit.max_requests, 5);
	assert_eq!(cfg.cache.ttl_secs, 43_200);
}

#[test]
fn optional_sections_fall_back_to_defaults() {
	let cfg = load_payload(sample_toml_without("rate_limit")).expect("Expected valid config.");

	assert_eq!(cfg.rate_limit.window_secs, 60);
	assert_eq!(cfg.rate_limit.max_requests, 5);
	assert_eq!(cfg.rate_limit.max_identities, 10_000);
}

#[test]
fn zero_stale_window_falls_back_to_ttl() {
	let cfg = load_payload(sample_toml_with("cache", "stale_window_secs", Value::Integer(0)))
		.expect("Expected valid config.");

	assert_eq!(cfg.cache.stale_window_secs, cfg.cache.ttl_secs);
}

#[test]
fn rate_limit_quota_must_be_positive() {
	let err = load_payload(sample_toml_with("rate_limit", "max_requests", Value::Integer(0)))
		.expect_err("Expected rate limit validation error.");

	assert!(
		err.to_string().contains("rate_limit.max_requests must be greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn cache_ttl_must_be_positive() {
	let err = load_payload(sample_toml_with("cache", "ttl_secs", Value::Integer(0)))
		.expect_err("Expected cache TTL validation error.");

	assert!(
		err.to_string().contains("cache.ttl_secs must be greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn cache_ttl_has_an_upper_bound() {
	let err =
		load_payload(sample_toml_with("cache", "ttl_secs", Value::Integer(1_000_000_000_000)))
			.expect_err("Expected cache TTL validation error.");

	assert!(
		err.to_string().contains("cache.ttl_secs must be at most 31536000 seconds."),
		"Unexpected error: {err}"
	);
}

#[test]
fn window_settings_have_an_upper_bound() {
	for (section, key) in [
		("rate_limit", "window_secs"),
		("rate_limit", "sweep_interval_secs"),
		("cache", "stale_window_secs"),
		("image", "window_secs"),
	] {
		let err = load_payload(sample_toml_with(section, key, Value::Integer(i64::MAX)))
			.expect_err("Expected window validation error.");

		assert!(
			err.to_string().contains(&format!("{section}.{key} must be at most 31536000 seconds.")),
			"Unexpected error: {err}"
		);
	}
}

#[test]
fn one_year_window_is_accepted() {
	let cfg = load_payload(sample_toml_with(
		"rate_limit",
		"window_secs",
		Value::Integer(pantry_config::MAX_DURATION_SECS as i64),
	))
	.expect("Expected valid config.");

	assert_eq!(cfg.rate_limit.window_secs, 31_536_000);
}

#[test]
fn provider_sections_need_only_endpoint_model_and_credential() {
	let payload = r#"
[service]
http_bind = "127.0.0.1:0"
log_level = "info"

[providers.generation]
api_base = "https://llm.example.com"
api_key_env = "PANTRY_LLM_API_KEY"
model = "m"
path = "/v1/chat/completions"

[providers.image]
api_base = "https://images.example.com"
api_key_env = "PANTRY_IMAGE_API_KEY"
model = "m"
path = "/v1/images/generations"
"#;
	let cfg = load_payload(payload.to_string()).expect("Expected valid config.");

	assert_eq!(cfg.providers.generation.model, "m");
	assert_eq!(cfg.providers.image.size, "1024x1024");
}

#[test]
fn credential_env_name_must_be_non_empty() {
	let err = load_payload(sample_toml_with(
		"providers.image",
		"api_key_env",
		Value::String("  ".to_string()),
	))
	.expect_err("Expected credential validation error.");

	assert!(
		err.to_string().contains("providers.image.api_key_env must be non-empty."),
		"Unexpected error: {err}"
	);
}

#[test]
fn temperature_must_be_in_range() {
	let mut cfg = base_config();

	cfg.providers.generation.temperature = 3.5;

	let err = pantry_config::validate(&cfg).expect_err("Expected temperature validation error.");

	assert!(matches!(err, Error::Validation { .. }), "Unexpected error: {err}");
}

#[test]
fn unparsable_file_reports_parse_error() {
	let err = load_payload("[service\nhttp_bind = ".to_string())
		.expect_err("Expected parse error.");

	assert!(matches!(err, Error::ParseConfig { .. }), "Unexpected error: {err}");
}

#[test]
fn missing_file_reports_read_error() {
	let path = env::temp_dir().join("pantry_config_test_missing_file.toml");
	let err = pantry_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }), "Unexpected error: {err}");
}

#[test]
fn unset_credential_is_reported_as_missing() {
	let err = pantry_config::api_key("PANTRY_CONFIG_TEST_UNSET_CREDENTIAL")
		.expect_err("Expected missing credential.");

	let Error::MissingCredential { env } = err else {
		panic!("Expected missing credential, got {err:?}.");
	};

	assert_eq!(env, "PANTRY_CONFIG_TEST_UNSET_CREDENTIAL");
}
