use time::OffsetDateTime;
use uuid::Uuid;

use nb_domain::status::{FailureKind, NoteStatus, RevisionSource};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transcript {
	pub transcript_id: Uuid,
	pub owner_id: String,
	pub title: String,
	pub content: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// Current state of a note. `revision` is 0 until the first successful generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
	pub note_id: Uuid,
	pub transcript_id: Uuid,
	pub owner_id: String,
	pub title: String,
	pub content: String,
	pub status: NoteStatus,
	pub failure_kind: Option<FailureKind>,
	pub failure_message: Option<String>,
	pub revision: i64,
	/// Service instance that runs the note's generation; `None` for notes written directly.
	pub generator_id: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
	pub question_id: Uuid,
	pub note_id: Uuid,
	/// Note revision the question was generated from.
	pub note_revision: i64,
	pub position: i32,
	pub text: String,
	pub created_at: OffsetDateTime,
}

/// Immutable snapshot of a note's content at one revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteRevision {
	pub note_id: Uuid,
	pub revision: i64,
	pub title: String,
	pub content: String,
	pub source: RevisionSource,
	pub created_at: OffsetDateTime,
}

/// Compare-and-swap write of a note's current state.
///
/// The write only lands when the stored note still has `expected_revision` and
/// `expected_status`; `snapshot`, when present, is recorded in the same write.
#[derive(Clone, Copy, Debug)]
pub struct NoteUpdate<'a> {
	pub note: &'a Note,
	pub expected_revision: i64,
	pub expected_status: NoteStatus,
	pub snapshot: Option<&'a NoteRevision>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
	pub skip: u32,
	pub limit: u32,
}
