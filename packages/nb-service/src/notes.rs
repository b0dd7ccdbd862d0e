use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use nb_domain::{
	revision,
	status::{FailureKind, NoteStatus, PipelineStage, RevisionSource},
};
use nb_storage::models::{Note, NoteRevision, NoteUpdate};

use crate::{Error, ListRequest, NoteService, Result, access};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoteResponse {
	pub note_id: Uuid,
	pub transcript_id: Uuid,
	pub owner_id: String,
	pub title: String,
	pub content: String,
	pub status: NoteStatus,
	pub stage: PipelineStage,
	pub failure: Option<FailureResponse>,
	pub revision: i64,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureResponse {
	pub kind: FailureKind,
	pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RevisionResponse {
	pub note_id: Uuid,
	pub revision: i64,
	pub title: String,
	pub content: String,
	pub source: RevisionSource,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}
impl From<NoteRevision> for RevisionResponse {
	fn from(revision: NoteRevision) -> Self {
		Self {
			note_id: revision.note_id,
			revision: revision.revision,
			title: revision.title,
			content: revision.content,
			source: revision.source,
			created_at: revision.created_at,
		}
	}
}

/// A note written by hand for a transcript, outside the generation pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateNoteRequest {
	pub user_id: String,
	pub transcript_id: Uuid,
	#[serde(default)]
	pub title: Option<String>,
	pub content: String,
}

/// Direct edit of a note, outside the generation pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EditNoteRequest {
	pub user_id: String,
	pub note_id: Uuid,
	pub title: Option<String>,
	pub content: Option<String>,
}

impl NoteService {
	/// Stores a ready note at revision 1 without calling the generation provider.
	pub async fn create_note(&self, req: CreateNoteRequest) -> Result<NoteResponse> {
		if req.content.trim().is_empty() {
			return Err(Error::InvalidRequest {
				message: "Note content must not be empty.".to_string(),
			});
		}

		let transcript = self.load_transcript(&req.user_id, req.transcript_id).await?;
		let now = revision::now();
		let note = Note {
			note_id: Uuid::new_v4(),
			transcript_id: transcript.transcript_id,
			owner_id: transcript.owner_id,
			title: req.title.map(|title| title.trim().to_string()).unwrap_or(transcript.title),
			content: req.content,
			status: NoteStatus::Ready,
			failure_kind: None,
			failure_message: None,
			revision: 1,
			generator_id: None,
			created_at: now,
			updated_at: now,
		};
		let snapshot = snapshot_of(&note, RevisionSource::Edit);

		self.store.insert_note(&note, Some(&snapshot)).await?;

		tracing::info!(
			note_id = %note.note_id,
			transcript_id = %note.transcript_id,
			"Note written by hand."
		);

		Ok(response_of(note, None))
	}

	pub async fn get_note(&self, user_id: &str, note_id: Uuid) -> Result<NoteResponse> {
		let note = self.load_note(user_id, note_id).await?;

		self.note_response(note).await
	}

	pub async fn list_notes(&self, user_id: &str, req: ListRequest) -> Result<Vec<NoteResponse>> {
		let user_id = access::require_user(user_id)?;
		let notes = self.store.list_notes(user_id, req.page()?).await?;
		let ready_ids = notes
			.iter()
			.filter(|note| note.status == NoteStatus::Ready)
			.map(|note| note.note_id)
			.collect::<Vec<_>>();
		let question_revisions = self.store.question_revisions(&ready_ids).await?;

		Ok(notes
			.into_iter()
			.map(|note| {
				let questions_revision = question_revisions.get(&note.note_id).copied();

				response_of(note, questions_revision)
			})
			.collect())
	}

	pub async fn list_revisions(
		&self,
		user_id: &str,
		note_id: Uuid,
	) -> Result<Vec<RevisionResponse>> {
		self.load_note(user_id, note_id).await?;

		let revisions = self.store.list_revisions(note_id).await?;

		Ok(revisions.into_iter().map(RevisionResponse::from).collect())
	}

	pub async fn edit_note(&self, req: EditNoteRequest) -> Result<NoteResponse> {
		if req.title.is_none() && req.content.is_none() {
			return Err(Error::InvalidRequest { message: "No updates provided.".to_string() });
		}
		if req.content.as_deref().is_some_and(|content| content.trim().is_empty()) {
			return Err(Error::InvalidRequest {
				message: "Note content must not be empty.".to_string(),
			});
		}

		self.load_note(&req.user_id, req.note_id).await?;

		let _guard = self.locks.try_lock(req.note_id).ok_or_else(|| busy(req.note_id))?;
		let note = self.load_note(&req.user_id, req.note_id).await?;

		match note.status {
			NoteStatus::Ready => {},
			NoteStatus::Pending => {
				return Err(Error::Conflict {
					message: format!("Note {} is still being generated.", note.note_id),
				});
			},
			NoteStatus::Failed => {
				return Err(Error::Precondition {
					message: format!(
						"Note {} failed to generate and cannot be edited.",
						note.note_id
					),
				});
			},
		}

		let mut next = next_revision(&note);

		if let Some(title) = req.title {
			next.title = title.trim().to_string();
		}
		if let Some(content) = req.content {
			next.content = content;
		}

		let snapshot = snapshot_of(&next, RevisionSource::Edit);

		self.store
			.update_note(NoteUpdate {
				note: &next,
				expected_revision: note.revision,
				expected_status: NoteStatus::Ready,
				snapshot: Some(&snapshot),
			})
			.await?;

		tracing::info!(note_id = %next.note_id, revision = next.revision, "Note edited.");

		self.note_response(next).await
	}

	pub async fn delete_note(&self, user_id: &str, note_id: Uuid) -> Result<()> {
		self.load_note(user_id, note_id).await?;

		let _guard = self.locks.try_lock(note_id).ok_or_else(|| busy(note_id))?;

		self.store.delete_note(note_id).await?;

		tracing::info!(%note_id, "Note deleted.");

		Ok(())
	}

	pub(crate) async fn load_note(&self, user_id: &str, note_id: Uuid) -> Result<Note> {
		let user_id = access::require_user(user_id)?;
		let Some(note) = self.store.get_note(note_id).await? else {
			return Err(Error::NotFound { message: format!("Note {note_id} not found.") });
		};

		access::ensure_owner(&note.owner_id, user_id, "Note", note_id)?;

		Ok(note)
	}

	pub(crate) async fn note_response(&self, note: Note) -> Result<NoteResponse> {
		let questions_revision = match note.status {
			NoteStatus::Ready => {
				let revisions = self.store.question_revisions(&[note.note_id]).await?;

				revisions.get(&note.note_id).copied()
			},
			NoteStatus::Pending | NoteStatus::Failed => None,
		};

		Ok(response_of(note, questions_revision))
	}
}

/// `questions_revision` is the note revision the active question set came from, if any.
fn response_of(note: Note, questions_revision: Option<i64>) -> NoteResponse {
	let stage = PipelineStage::of(note.status, note.revision, questions_revision);
	let failure = note.failure_kind.map(|kind| FailureResponse {
		kind,
		message: note.failure_message.clone().unwrap_or_default(),
	});

	NoteResponse {
		note_id: note.note_id,
		transcript_id: note.transcript_id,
		owner_id: note.owner_id,
		title: note.title,
		content: note.content,
		status: note.status,
		stage,
		failure,
		revision: note.revision,
		created_at: note.created_at,
		updated_at: note.updated_at,
	}
}

/// Copy of `note` one revision ahead, ready and with a strictly newer `updated_at`.
pub(crate) fn next_revision(note: &Note) -> Note {
	Note {
		status: NoteStatus::Ready,
		failure_kind: None,
		failure_message: None,
		revision: note.revision + 1,
		updated_at: revision::next_updated_at(note.updated_at, revision::now()),
		..note.clone()
	}
}

pub(crate) fn snapshot_of(note: &Note, source: RevisionSource) -> NoteRevision {
	NoteRevision {
		note_id: note.note_id,
		revision: note.revision,
		title: note.title.clone(),
		content: note.content.clone(),
		source,
		created_at: note.updated_at,
	}
}

fn busy(note_id: Uuid) -> Error {
	Error::Conflict { message: format!("Note {note_id} is being updated by another request.") }
}
