use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use serde_json::{Map, Value};

use crate::recipe::{Recipe, SearchResultBatch};

pub const UNTITLED_RECIPE: &str = "Untitled Recipe";
pub const MISSING_DESCRIPTION: &str = "No description available.";
pub const UNKNOWN_PREP_TIME: &str = "Unknown";

static CODE_FENCE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("Code fence pattern must compile."));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
	#[error("Malformed model response: {reason}")]
	MalformedResponse { reason: String },
}
impl ParseError {
	fn malformed(reason: impl Into<String>) -> Self {
		Self::MalformedResponse { reason: reason.into() }
	}
}

/// Turns raw model output into a validated recipe batch.
///
/// Strict JSON is tried first. Only when that fails is the text repaired: code fences are
/// stripped, the outermost `[...]` slice is taken, and trailing commas are removed.
pub fn parse(raw: &str) -> Result<SearchResultBatch, ParseError> {
	let value = match serde_json::from_str::<Value>(raw) {
		Ok(value) => value,
		Err(_) => {
			let repaired = repair(raw);

			serde_json::from_str::<Value>(&repaired).map_err(|err| {
				ParseError::malformed(format!("content is not valid JSON after repair: {err}"))
			})?
		},
	};
	let Value::Array(items) = value else {
		return Err(ParseError::malformed("content is not a JSON array"));
	};
	let mut seen = HashSet::with_capacity(items.len());
	let recipes: Vec<Recipe> = items
		.iter()
		.enumerate()
		.filter_map(|(index, item)| recipe_from_value(index, item, &mut seen))
		.collect();

	SearchResultBatch::new(recipes).ok_or_else(|| ParseError::malformed("no recipes recovered"))
}

/// Serializes a batch into the payload stored in the cache and returned to clients.
pub fn to_payload(batch: &SearchResultBatch) -> Result<String, ParseError> {
	serde_json::to_string(batch)
		.map_err(|err| ParseError::malformed(format!("failed to encode recipes: {err}")))
}

fn repair(raw: &str) -> String {
	let unfenced = CODE_FENCE.replace_all(raw, "");
	let mut text = unfenced.trim();

	if !text.starts_with('[')
		&& let (Some(start), Some(end)) = (text.find('['), text.rfind(']'))
		&& start < end
	{
		text = &text[start..=end];
	}

	strip_trailing_commas(text)
}

// Drops commas that directly precede `]` or `}`, leaving string literals untouched.
fn strip_trailing_commas(text: &str) -> String {
	let chars: Vec<char> = text.chars().collect();
	let mut out = String::with_capacity(text.len());
	let mut in_string = false;
	let mut escaped = false;

	for (i, &ch) in chars.iter().enumerate() {
		if in_string {
			out.push(ch);

			if escaped {
				escaped = false;
			} else if ch == '\\' {
				escaped = true;
			} else if ch == '"' {
				in_string = false;
			}

			continue;
		}

		match ch {
			'"' => {
				in_string = true;

				out.push(ch);
			},
			',' => {
				let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());

				if !matches!(next, Some(']') | Some('}')) {
					out.push(ch);
				}
			},
			_ => out.push(ch),
		}
	}

	out
}

fn recipe_from_value(index: usize, value: &Value, seen: &mut HashSet<String>) -> Option<Recipe> {
	let object = value.as_object()?;
	let id = match id_field(object) {
		Some(id) if !seen.contains(&id) => id,
		_ => positional_id(index, seen),
	};

	seen.insert(id.clone());

	Some(Recipe {
		id,
		title: string_field(object, "title").unwrap_or_else(|| UNTITLED_RECIPE.to_string()),
		description: string_field(object, "description")
			.unwrap_or_else(|| MISSING_DESCRIPTION.to_string()),
		ingredients: string_list(object, "ingredients"),
		instructions: string_list(object, "instructions"),
		prep_time: string_field(object, "prepTime")
			.unwrap_or_else(|| UNKNOWN_PREP_TIME.to_string()),
		dietary_info: unique(string_list(object, "dietaryInfo")),
		recipe_type: string_field(object, "recipeType"),
	})
}

fn id_field(object: &Map<String, Value>) -> Option<String> {
	match object.get("id")? {
		Value::Number(number) => Some(number.to_string()),
		Value::String(text) => Some(text.trim().to_string()).filter(|id| !id.is_empty()),
		_ => None,
	}
}

fn positional_id(index: usize, seen: &HashSet<String>) -> String {
	let base = format!("recipe-{}", index + 1);

	if !seen.contains(&base) {
		return base;
	}

	(2..).map(|n| format!("{base}-{n}")).find(|id| !seen.contains(id)).unwrap_or(base)
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
	object
		.get(key)
		.and_then(Value::as_str)
		.map(str::trim)
		.filter(|text| !text.is_empty())
		.map(str::to_string)
}

fn string_list(object: &Map<String, Value>, key: &str) -> Vec<String> {
	let Some(items) = object.get(key).and_then(Value::as_array) else {
		return Vec::new();
	};

	items
		.iter()
		.filter_map(Value::as_str)
		.map(str::trim)
		.filter(|item| !item.is_empty())
		.map(str::to_string)
		.collect()
}

fn unique(items: Vec<String>) -> Vec<String> {
	let mut seen = HashSet::with_capacity(items.len());

	items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}
