pub mod fingerprint;
pub mod recipe;
pub mod sanitize;

pub use fingerprint::CacheKey;
pub use recipe::{Recipe, SearchResultBatch};
pub use sanitize::{ParseError, parse, to_payload};
