use nb_domain::{FormatError, status::FailureKind};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Ownership error: {message}")]
	Ownership { message: String },
	#[error("Precondition failed: {message}")]
	Precondition { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Generation unavailable: {message}")]
	GenerationUnavailable { message: String },
	#[error("Generation timed out: {message}")]
	GenerationTimeout { message: String },
	#[error("Generation format error: {message}")]
	GenerationFormat { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	/// Failure kind recorded on a note when this error ends its generation.
	pub fn failure_kind(&self) -> FailureKind {
		match self {
			Self::GenerationUnavailable { .. } => FailureKind::Unavailable,
			Self::GenerationTimeout { .. } => FailureKind::Timeout,
			Self::GenerationFormat { .. } => FailureKind::Format,
			_ => FailureKind::Storage,
		}
	}
}
impl From<nb_storage::Error> for Error {
	fn from(err: nb_storage::Error) -> Self {
		match err {
			nb_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			nb_storage::Error::Decode(message) => Self::Storage { message },
			nb_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			nb_storage::Error::NotFound(message) => Self::NotFound { message },
			nb_storage::Error::Conflict(message) => Self::Conflict { message },
		}
	}
}
impl From<nb_providers::Error> for Error {
	fn from(err: nb_providers::Error) -> Self {
		match err {
			nb_providers::Error::Timeout { message } => Self::GenerationTimeout { message },
			other => Self::GenerationUnavailable { message: other.to_string() },
		}
	}
}
impl From<FormatError> for Error {
	fn from(err: FormatError) -> Self {
		Self::GenerationFormat { message: err.to_string() }
	}
}
