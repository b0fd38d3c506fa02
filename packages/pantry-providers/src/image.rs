use serde_json::Value;

use crate::{Error, PostJson, Result};

/// Requests one generated image for `description` and returns its URL.
pub async fn generate_image(
	cfg: &pantry_config::ImageProviderConfig,
	description: &str,
) -> Result<String> {
	let body = serde_json::json!({
		"model": cfg.model,
		"prompt": description.trim(),
		"n": 1,
		"size": cfg.size,
	});
	let json = crate::post_json(PostJson {
		url: format!("{}{}", cfg.api_base, cfg.path),
		api_key_env: &cfg.api_key_env,
		default_headers: &cfg.default_headers,
		timeout_ms: cfg.timeout_ms,
		body,
	})
	.await?;

	parse_image_url(json)
}

fn parse_image_url(json: Value) -> Result<String> {
	json.get("data")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|item| item.get("url"))
		.and_then(|url| url.as_str())
		.filter(|url| !url.is_empty())
		.map(str::to_string)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Image response is missing data[0].url.".to_string(),
		})
}
