use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nb_domain::{
	prompt, response,
	status::{NoteStatus, RevisionSource},
};
use nb_storage::models::{Note, NoteUpdate};

use crate::{
	Error, NoteResponse, NoteService, Result,
	notes::{next_revision, snapshot_of},
};

/// An answer to one or more questions, to be merged into the note.
///
/// Questions are referenced by id from the note's stored sets or passed as free text; both may be
/// combined.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntegrateAnswerRequest {
	pub user_id: String,
	pub note_id: Uuid,
	#[serde(default)]
	pub question_ids: Vec<Uuid>,
	#[serde(default)]
	pub questions: Vec<String>,
	pub answer: String,
}

impl NoteService {
	/// Rewrites the whole note with the answer folded in and stores it as a new revision.
	///
	/// Integrations on the same note run one at a time; each starts from the latest revision. When
	/// generation fails the note is left exactly as it was.
	pub async fn integrate_answer(&self, req: IntegrateAnswerRequest) -> Result<NoteResponse> {
		if req.answer.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "answer must not be empty.".to_string() });
		}
		if req.question_ids.is_empty() && req.questions.iter().all(|text| text.trim().is_empty()) {
			return Err(Error::InvalidRequest {
				message: "At least one question is required.".to_string(),
			});
		}

		self.load_note(&req.user_id, req.note_id).await?;

		let service = self.clone();

		crate::detached(async move { service.integrate_answer_locked(req).await }).await
	}

	async fn integrate_answer_locked(&self, req: IntegrateAnswerRequest) -> Result<NoteResponse> {
		let _guard = self.locks.lock(req.note_id).await;
		let note = self.load_note(&req.user_id, req.note_id).await?;

		if note.status != NoteStatus::Ready {
			return Err(Error::Precondition {
				message: format!(
					"Note {} is {}; answers can only be merged into a ready note.",
					note.note_id, note.status
				),
			});
		}

		let questions = self.resolve_questions(&note, &req).await?;
		let question_refs = questions.iter().map(String::as_str).collect::<Vec<_>>();
		let prompt = prompt::integrate_answer(
			&note.content,
			&question_refs,
			req.answer.trim(),
			&self.cfg.generation.language,
		);
		let raw = self.generate(&prompt).await?;
		let draft = response::parse_note_draft(&raw)?;

		response::ensure_non_decreasing(&note.content, &draft.content)?;

		let mut next = next_revision(&note);

		if !draft.title.is_empty() {
			next.title = draft.title;
		}

		next.content = draft.content;

		let snapshot = snapshot_of(&next, RevisionSource::Integrate);

		self.store
			.update_note(NoteUpdate {
				note: &next,
				expected_revision: note.revision,
				expected_status: NoteStatus::Ready,
				snapshot: Some(&snapshot),
			})
			.await?;

		tracing::info!(
			note_id = %next.note_id,
			revision = next.revision,
			questions = questions.len(),
			"Answer integrated."
		);

		self.note_response(next).await
	}

	async fn resolve_questions(
		&self,
		note: &Note,
		req: &IntegrateAnswerRequest,
	) -> Result<Vec<String>> {
		let mut texts = Vec::with_capacity(req.question_ids.len() + req.questions.len());

		if !req.question_ids.is_empty() {
			let stored = self.store.list_questions(note.note_id).await?;

			for question_id in &req.question_ids {
				let Some(question) =
					stored.iter().find(|question| question.question_id == *question_id)
				else {
					return Err(Error::InvalidRequest {
						message: format!(
							"Question {question_id} does not belong to note {}.",
							note.note_id
						),
					});
				};

				texts.push(question.text.clone());
			}
		}

		texts.extend(
			req.questions
				.iter()
				.map(|text| text.trim())
				.filter(|text| !text.is_empty())
				.map(str::to_string),
		);

		Ok(texts)
	}
}
