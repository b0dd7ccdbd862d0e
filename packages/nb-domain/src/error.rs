/// Generated text that does not have the shape the pipeline expects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
	#[error("Generated text is not valid JSON: {message}")]
	InvalidJson { message: String },
	#[error("Generated JSON is missing field {field}.")]
	MissingField { field: &'static str },
	#[error("Generated field {field} has the wrong type.")]
	WrongType { field: &'static str },
	#[error("Generated note content is empty.")]
	EmptyContent,
	#[error(
		"Revised content has {next_chars} characters, fewer than the current {prev_chars}."
	)]
	ContentShrank { prev_chars: usize, next_chars: usize },
}
