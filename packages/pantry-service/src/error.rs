use crate::rate::RateDecision;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest {
		/// Request field that failed validation.
		field: &'static str,
		message: String,
	},
	#[error("Rate limit exceeded.")]
	RateLimited { decision: RateDecision },
	#[error("Configuration error: {message}")]
	Configuration { message: String },
	#[error("Upstream timeout: {message}")]
	UpstreamTimeout { message: String },
	#[error("Upstream error: {message}")]
	Upstream { message: String },
	#[error("Malformed response: {message}")]
	MalformedResponse { message: String },
}
impl From<pantry_providers::Error> for Error {
	fn from(err: pantry_providers::Error) -> Self {
		match err {
			pantry_providers::Error::MissingCredential { .. }
			| pantry_providers::Error::InvalidConfig { .. }
			| pantry_providers::Error::InvalidHeaderName(_)
			| pantry_providers::Error::InvalidHeaderValue(_) =>
				Self::Configuration { message: err.to_string() },
			pantry_providers::Error::Timeout { .. } =>
				Self::UpstreamTimeout { message: err.to_string() },
			other => Self::Upstream { message: other.to_string() },
		}
	}
}

impl From<pantry_domain::ParseError> for Error {
	fn from(err: pantry_domain::ParseError) -> Self {
		Self::MalformedResponse { message: err.to_string() }
	}
}
