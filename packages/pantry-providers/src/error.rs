pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Provider credential is not configured; set {env}.")]
	MissingCredential { env: String },
	#[error("Provider request timed out after {timeout_ms} ms.")]
	Timeout { timeout_ms: u64 },
	#[error("Provider returned HTTP {status}.")]
	Status { status: u16, body: String },
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
}
impl From<pantry_config::Error> for Error {
	fn from(err: pantry_config::Error) -> Self {
		match err {
			pantry_config::Error::MissingCredential { env } => Self::MissingCredential { env },
			other => Self::InvalidConfig { message: other.to_string() },
		}
	}
}
