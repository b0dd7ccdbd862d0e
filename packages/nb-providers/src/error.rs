pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Generation provider is unavailable: {message}")]
	Unavailable { message: String },
	#[error("Generation request timed out: {message}")]
	Timeout { message: String },
	#[error("Generation provider returned an unusable response: {message}")]
	InvalidResponse { message: String },
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
}
impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		if err.is_timeout() {
			Self::Timeout { message: err.to_string() }
		} else if err.is_decode() {
			Self::InvalidResponse { message: err.to_string() }
		} else {
			Self::Unavailable { message: err.to_string() }
		}
	}
}
