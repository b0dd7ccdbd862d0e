use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
	Pending,
	Ready,
	Failed,
}
impl NoteStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Ready => "ready",
			Self::Failed => "failed",
		}
	}
}
impl fmt::Display for NoteStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for NoteStatus {
	type Err = UnknownVariant;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value {
			"pending" => Ok(Self::Pending),
			"ready" => Ok(Self::Ready),
			"failed" => Ok(Self::Failed),
			other => Err(UnknownVariant { kind: "note status", value: other.to_string() }),
		}
	}
}

/// Why a generation attempt ended in [`NoteStatus::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	Unavailable,
	Timeout,
	Format,
	/// The process owning the generation stopped before it finished.
	Interrupted,
	/// The generated note could not be stored.
	Storage,
}
impl FailureKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Unavailable => "unavailable",
			Self::Timeout => "timeout",
			Self::Format => "format",
			Self::Interrupted => "interrupted",
			Self::Storage => "storage",
		}
	}
}
impl fmt::Display for FailureKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for FailureKind {
	type Err = UnknownVariant;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value {
			"unavailable" => Ok(Self::Unavailable),
			"timeout" => Ok(Self::Timeout),
			"format" => Ok(Self::Format),
			"interrupted" => Ok(Self::Interrupted),
			"storage" => Ok(Self::Storage),
			other => Err(UnknownVariant { kind: "failure kind", value: other.to_string() }),
		}
	}
}

/// Operation that produced a stored note revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionSource {
	Generate,
	Integrate,
	Edit,
}
impl RevisionSource {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Generate => "generate",
			Self::Integrate => "integrate",
			Self::Edit => "edit",
		}
	}
}
impl fmt::Display for RevisionSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for RevisionSource {
	type Err = UnknownVariant;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value {
			"generate" => Ok(Self::Generate),
			"integrate" => Ok(Self::Integrate),
			"edit" => Ok(Self::Edit),
			other => Err(UnknownVariant { kind: "revision source", value: other.to_string() }),
		}
	}
}

/// Where a transcript-to-note lineage currently sits.
///
/// `Generating -> {Ready, Failed}`, then `Ready -> QuestionsGenerated -> Ready` for every answer
/// that gets integrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
	Generating,
	Ready,
	QuestionsGenerated,
	Failed,
}
impl PipelineStage {
	/// `questions_revision` is the note revision the active question set was generated from.
	pub fn of(status: NoteStatus, note_revision: i64, questions_revision: Option<i64>) -> Self {
		match status {
			NoteStatus::Pending => Self::Generating,
			NoteStatus::Failed => Self::Failed,
			NoteStatus::Ready if questions_revision == Some(note_revision) =>
				Self::QuestionsGenerated,
			NoteStatus::Ready => Self::Ready,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {value}.")]
pub struct UnknownVariant {
	pub kind: &'static str,
	pub value: String,
}
