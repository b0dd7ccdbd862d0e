pub mod db;
pub mod memory;
pub mod models;
pub mod pg;
pub mod schema;

mod error;

pub use error::Error;

use std::{collections::HashMap, future::Future, pin::Pin};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{Note, NoteRevision, NoteUpdate, Page, Question, Transcript};

pub type Result<T, E = Error> = std::result::Result<T, E>;
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistence seam for transcripts, notes, question sets, and note revisions.
///
/// Ownership is not checked here. Implementations enforce the structural rules instead: at most
/// one pending note per transcript, compare-and-swap note writes, and no deletion while a note
/// is still pending.
pub trait Store
where
	Self: Send + Sync,
{
	fn insert_transcript<'a>(&'a self, transcript: &'a Transcript) -> BoxFuture<'a, Result<()>>;

	fn get_transcript<'a>(&'a self, transcript_id: Uuid)
	-> BoxFuture<'a, Result<Option<Transcript>>>;

	fn list_transcripts<'a>(
		&'a self,
		owner_id: &'a str,
		page: Page,
	) -> BoxFuture<'a, Result<Vec<Transcript>>>;

	fn update_transcript<'a>(&'a self, transcript: &'a Transcript) -> BoxFuture<'a, Result<()>>;

	/// Removes the transcript with every derived note. Fails with [`Error::Conflict`] while a
	/// note for it is pending.
	fn delete_transcript<'a>(&'a self, transcript_id: Uuid) -> BoxFuture<'a, Result<()>>;

	/// Inserts a pending or ready note, recording `snapshot` in the same write.
	///
	/// Fails with [`Error::Conflict`] when a pending note is inserted for a transcript that
	/// already has one.
	fn insert_note<'a>(
		&'a self,
		note: &'a Note,
		snapshot: Option<&'a NoteRevision>,
	) -> BoxFuture<'a, Result<()>>;

	fn get_note<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Option<Note>>>;

	fn list_notes<'a>(&'a self, owner_id: &'a str, page: Page) -> BoxFuture<'a, Result<Vec<Note>>>;

	fn update_note<'a>(&'a self, update: NoteUpdate<'a>) -> BoxFuture<'a, Result<()>>;

	fn delete_note<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<()>>;

	/// Swaps the whole question set of a note in one step.
	fn replace_questions<'a>(
		&'a self,
		note_id: Uuid,
		questions: &'a [Question],
	) -> BoxFuture<'a, Result<()>>;

	fn list_questions<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Vec<Question>>>;

	/// Note revision each active question set was generated from, keyed by note. Notes without
	/// questions are absent.
	fn question_revisions<'a>(
		&'a self,
		note_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<HashMap<Uuid, i64>>>;

	fn list_revisions<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Vec<NoteRevision>>>;

	/// Marks the pending notes claimed by `generator_id` as failed with
	/// [`nb_domain::status::FailureKind::Interrupted`] and returns how many were changed.
	fn fail_pending_notes<'a>(
		&'a self,
		generator_id: &'a str,
		message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>>;
}
