use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use nb_domain::{prompt, response, revision, status::NoteStatus};
use nb_storage::models::Question;

use crate::{Error, NoteService, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestionResponse {
	pub question_id: Uuid,
	pub note_id: Uuid,
	pub note_revision: i64,
	pub position: i32,
	pub text: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}
impl From<Question> for QuestionResponse {
	fn from(question: Question) -> Self {
		Self {
			question_id: question.question_id,
			note_id: question.note_id,
			note_revision: question.note_revision,
			position: question.position,
			text: question.text,
			created_at: question.created_at,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestionsResponse {
	pub note_id: Uuid,
	/// Note revision the questions were generated from, when known.
	pub note_revision: Option<i64>,
	pub questions: Vec<QuestionResponse>,
}

impl NoteService {
	/// Generates follow-up questions for a ready note and replaces its previous question set.
	///
	/// On any failure the previous set stays active.
	pub async fn generate_questions(
		&self,
		user_id: &str,
		note_id: Uuid,
	) -> Result<QuestionsResponse> {
		self.load_note(user_id, note_id).await?;

		let service = self.clone();
		let user_id = user_id.to_string();

		crate::detached(async move { service.generate_questions_locked(&user_id, note_id).await })
			.await
	}

	pub async fn list_questions(&self, user_id: &str, note_id: Uuid) -> Result<QuestionsResponse> {
		self.load_note(user_id, note_id).await?;

		let questions = self.store.list_questions(note_id).await?;
		let note_revision = questions.first().map(|question| question.note_revision);

		Ok(questions_response(note_id, note_revision, questions))
	}

	async fn generate_questions_locked(
		&self,
		user_id: &str,
		note_id: Uuid,
	) -> Result<QuestionsResponse> {
		let _guard = self.locks.lock(note_id).await;
		let note = self.load_note(user_id, note_id).await?;

		if note.status != NoteStatus::Ready {
			return Err(Error::Precondition {
				message: format!("Note {note_id} is {}; questions need a ready note.", note.status),
			});
		}

		let max_count = self.cfg.questions.max_count;
		let prompt =
			prompt::follow_up_questions(&note.content, &self.cfg.generation.language, max_count);
		let raw = self.generate(&prompt).await?;
		let texts = response::parse_questions(&raw, max_count as usize)?;
		let now = revision::now();
		let questions = texts
			.into_iter()
			.zip(0_i32..)
			.map(|(text, position)| Question {
				question_id: Uuid::new_v4(),
				note_id,
				note_revision: note.revision,
				position,
				text,
				created_at: now,
			})
			.collect::<Vec<_>>();

		self.store.replace_questions(note_id, &questions).await?;

		tracing::info!(
			%note_id,
			revision = note.revision,
			count = questions.len(),
			"Follow-up questions generated."
		);

		Ok(questions_response(note_id, Some(note.revision), questions))
	}
}

fn questions_response(
	note_id: Uuid,
	note_revision: Option<i64>,
	questions: Vec<Question>,
) -> QuestionsResponse {
	QuestionsResponse {
		note_id,
		note_revision,
		questions: questions.into_iter().map(QuestionResponse::from).collect(),
	}
}
