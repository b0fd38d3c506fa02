use serde_json::Value;

use crate::{Error, PostJson, Result};

const SYSTEM_PROMPT: &str = "\
You are a recipe search engine. Reply with a JSON array of 3 to 6 recipe objects and nothing else: \
no prose, no Markdown. Each object must have exactly these fields: \
\"id\" (string), \"title\" (string), \"description\" (one or two sentences), \
\"ingredients\" (array of strings with quantities), \"instructions\" (array of step strings), \
\"prepTime\" (string such as \"25 minutes\"), \"dietaryInfo\" (array of strings such as \
\"vegan\" or \"gluten-free\"), and \"recipeType\" (string such as \"main\" or \"dessert\").";

/// Asks the upstream model for recipes matching `query` and returns the raw message content.
pub async fn generate(
	cfg: &pantry_config::GenerationProviderConfig,
	query: &str,
	filters: &[String],
) -> Result<String> {
	let body = serde_json::json!({
		"model": cfg.model,
		"messages": build_messages(query, filters),
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_tokens,
	});
	let json = crate::post_json(PostJson {
		url: format!("{}{}", cfg.api_base, cfg.path),
		api_key_env: &cfg.api_key_env,
		default_headers: &cfg.default_headers,
		timeout_ms: cfg.timeout_ms,
		body,
	})
	.await?;

	parse_completion_content(json)
}

pub fn build_messages(query: &str, filters: &[String]) -> Vec<Value> {
	let mut user = format!("Find recipes for: {}", query.trim());

	if !filters.is_empty() {
		user.push_str("\nEvery recipe must satisfy these dietary requirements: ");
		user.push_str(&filters.join(", "));
	}

	vec![
		serde_json::json!({ "role": "system", "content": SYSTEM_PROMPT }),
		serde_json::json!({ "role": "user", "content": user }),
	]
}

fn parse_completion_content(json: Value) -> Result<String> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.filter(|content| !content.trim().is_empty())
		.map(str::to_string)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Completion response is missing message content.".to_string(),
		})
}
