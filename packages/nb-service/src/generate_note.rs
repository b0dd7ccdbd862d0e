use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nb_domain::{
	prompt,
	response::{self, NoteDraft},
	revision,
	status::{NoteStatus, RevisionSource},
};
use nb_storage::models::{Note, NoteUpdate, Transcript};

use crate::{
	Error, NoteResponse, NoteService, Result,
	notes::{next_revision, snapshot_of},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerateNoteRequest {
	pub user_id: String,
	pub transcript_id: Uuid,
	/// Wait for the generated note instead of returning the pending one right away.
	#[serde(default = "default_wait")]
	pub wait: bool,
}

impl NoteService {
	/// Starts one generation for the transcript.
	///
	/// The generation runs on a detached task without a deadline of its own, so it finishes and
	/// persists its result even when the caller goes away. When waiting, the returned note is
	/// either ready or failed with its `failure` set. A second call for the same transcript while
	/// one is pending fails with [`Error::Conflict`].
	pub async fn generate_note(&self, req: GenerateNoteRequest) -> Result<NoteResponse> {
		let transcript = self.load_transcript(&req.user_id, req.transcript_id).await?;

		if transcript.content.trim().is_empty() {
			return Err(Error::Precondition {
				message: format!("Transcript {} has no content.", transcript.transcript_id),
			});
		}

		let now = revision::now();
		let pending = Note {
			note_id: Uuid::new_v4(),
			transcript_id: transcript.transcript_id,
			owner_id: transcript.owner_id.clone(),
			title: String::new(),
			content: String::new(),
			status: NoteStatus::Pending,
			failure_kind: None,
			failure_message: None,
			revision: 0,
			generator_id: Some(self.cfg.service.instance_id.clone()),
			created_at: now,
			updated_at: now,
		};

		self.store.insert_note(&pending, None).await?;

		tracing::info!(
			note_id = %pending.note_id,
			transcript_id = %transcript.transcript_id,
			"Note generation started."
		);

		let service = self.clone();
		let task = tokio::spawn({
			let pending = pending.clone();

			async move { service.finish_generation(pending, transcript).await }
		});

		if !req.wait {
			return self.note_response(pending).await;
		}

		let note = crate::joined(task).await?;

		self.note_response(note).await
	}

	/// Settles `pending` as ready or failed.
	///
	/// A failure is returned as the failed note. An error is returned only when the note could not
	/// be moved out of pending at all.
	async fn finish_generation(&self, pending: Note, transcript: Transcript) -> Result<Note> {
		let draft = match self.draft_note(&transcript).await {
			Ok(draft) => draft,
			Err(err) => {
				tracing::warn!(note_id = %pending.note_id, error = %err, "Note generation failed.");

				return self.record_failure(&pending, &err).await;
			},
		};
		let mut ready = next_revision(&pending);

		ready.title = if draft.title.is_empty() { transcript.title } else { draft.title };
		ready.content = draft.content;

		let snapshot = snapshot_of(&ready, RevisionSource::Generate);
		let stored = self
			.store
			.update_note(NoteUpdate {
				note: &ready,
				expected_revision: pending.revision,
				expected_status: NoteStatus::Pending,
				snapshot: Some(&snapshot),
			})
			.await;

		if let Err(err) = stored {
			let err = Error::Storage { message: format!("Failed to store generated note: {err}") };

			tracing::error!(note_id = %ready.note_id, error = %err, "Note generation failed.");

			return self.record_failure(&pending, &err).await;
		}

		tracing::info!(note_id = %ready.note_id, "Note generation finished.");

		Ok(ready)
	}

	async fn draft_note(&self, transcript: &Transcript) -> Result<NoteDraft> {
		let language = &self.cfg.generation.language;
		let prompt = prompt::note_from_transcript(&transcript.content, language);
		let raw = self.generate(&prompt).await?;

		Ok(response::parse_note_draft(&raw)?)
	}

	async fn record_failure(&self, pending: &Note, err: &Error) -> Result<Note> {
		let failed = Note {
			status: NoteStatus::Failed,
			failure_kind: Some(err.failure_kind()),
			failure_message: Some(err.to_string()),
			updated_at: revision::next_updated_at(pending.updated_at, revision::now()),
			..pending.clone()
		};
		let update = NoteUpdate {
			note: &failed,
			expected_revision: pending.revision,
			expected_status: NoteStatus::Pending,
			snapshot: None,
		};

		if let Err(store_err) = self.store.update_note(update).await {
			tracing::error!(
				note_id = %pending.note_id,
				error = %store_err,
				"Failed to record note generation failure."
			);

			return Err(Error::Storage {
				message: format!(
					"Note {} is stuck pending after {err}; recording the failure failed: \
					 {store_err}",
					pending.note_id
				),
			});
		}

		Ok(failed)
	}
}

fn default_wait() -> bool {
	true
}
