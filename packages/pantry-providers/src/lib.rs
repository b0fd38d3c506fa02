pub mod generation;
pub mod image;

mod error;

pub use error::{Error, Result};

use std::time::Duration;

use reqwest::{
	Client,
	header::{AUTHORIZATION, HeaderMap, HeaderName},
};
use serde_json::{Map, Value};

const MAX_ERROR_BODY_CHARS: usize = 512;

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();
	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);
	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};
		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}
	Ok(headers)
}

pub(crate) struct PostJson<'a> {
	pub(crate) url: String,
	pub(crate) api_key_env: &'a str,
	pub(crate) default_headers: &'a Map<String, Value>,
	pub(crate) timeout_ms: u64,
	pub(crate) body: Value,
}

/// Single authenticated POST with a hard deadline. Never retries.
pub(crate) async fn post_json(req: PostJson<'_>) -> Result<Value> {
	let PostJson { url, api_key_env, default_headers, timeout_ms, body } = req;
	let api_key = pantry_config::api_key(api_key_env)?;
	let client = Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?;
	let res = client
		.post(url)
		.headers(auth_headers(&api_key, default_headers)?)
		.json(&body)
		.send()
		.await
		.map_err(|err| classify(err, timeout_ms))?;
	let status = res.status();

	if !status.is_success() {
		let body = res.text().await.unwrap_or_default();

		return Err(Error::Status {
			status: status.as_u16(),
			body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
		});
	}

	res.json::<Value>().await.map_err(|err| classify(err, timeout_ms))
}

fn classify(err: reqwest::Error, timeout_ms: u64) -> Error {
	if err.is_timeout() {
		return Error::Timeout { timeout_ms };
	}
	if err.is_decode() {
		return Error::InvalidResponse {
			message: format!("Provider response body is not valid JSON: {err}"),
		};
	}

	Error::Reqwest(err)
}
