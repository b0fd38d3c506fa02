use std::fmt;

const FILTER_SEPARATOR: &str = "|filters:";

/// Normalized identity of a search for caching purposes.
///
/// The query is case-folded and whitespace-collapsed. Dietary filters are trimmed, case-folded,
/// de-duplicated, sorted, and appended as a distinct sub-key, so queries that only differ in
/// casing, spacing, or filter order share a key. Separator characters inside the query or a
/// filter are escaped, so user text can never forge the filter sub-key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);
impl CacheKey {
	pub fn new<S>(query: &str, filters: &[S]) -> Self
	where
		S: AsRef<str>,
	{
		let mut key = escape(&normalize_text(query));
		let mut terms: Vec<String> = filters
			.iter()
			.map(|filter| normalize_text(filter.as_ref()))
			.filter(|filter| !filter.is_empty())
			.map(|filter| escape(&filter))
			.collect();

		terms.sort();
		terms.dedup();

		if !terms.is_empty() {
			key.push_str(FILTER_SEPARATOR);
			key.push_str(&terms.join(","));
		}

		Self(key)
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Short blake3 digest, safe to log in place of the raw query.
	pub fn log_prefix(&self) -> String {
		let digest = blake3::hash(self.0.as_bytes()).to_hex();

		digest.as_str()[..12].to_string()
	}
}

impl fmt::Display for CacheKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for CacheKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

fn normalize_text(text: &str) -> String {
	text.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

fn escape(part: &str) -> String {
	let mut escaped = String::with_capacity(part.len());

	for ch in part.chars() {
		if matches!(ch, '\\' | '|' | ',') {
			escaped.push('\\');
		}

		escaped.push(ch);
	}

	escaped
}
