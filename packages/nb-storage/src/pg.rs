//! Postgres-backed [`Store`].

use std::collections::HashMap;

use sqlx::{PgConnection, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use nb_domain::status::{FailureKind, NoteStatus, RevisionSource};

use crate::{
	BoxFuture, Error, Result, Store,
	db::Db,
	models::{Note, NoteRevision, NoteUpdate, Page, Question, Transcript},
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(sqlx::FromRow)]
struct TranscriptRow {
	transcript_id: Uuid,
	owner_id: String,
	title: String,
	content: String,
	created_at: OffsetDateTime,
	updated_at: OffsetDateTime,
}
impl From<TranscriptRow> for Transcript {
	fn from(row: TranscriptRow) -> Self {
		Self {
			transcript_id: row.transcript_id,
			owner_id: row.owner_id,
			title: row.title,
			content: row.content,
			created_at: row.created_at,
			updated_at: row.updated_at,
		}
	}
}

#[derive(sqlx::FromRow)]
struct NoteRow {
	note_id: Uuid,
	transcript_id: Uuid,
	owner_id: String,
	title: String,
	content: String,
	status: String,
	failure_kind: Option<String>,
	failure_message: Option<String>,
	revision: i64,
	generator_id: Option<String>,
	created_at: OffsetDateTime,
	updated_at: OffsetDateTime,
}
impl TryFrom<NoteRow> for Note {
	type Error = Error;

	fn try_from(row: NoteRow) -> Result<Self> {
		let status =
			row.status.parse::<NoteStatus>().map_err(|err| Error::Decode(err.to_string()))?;
		let failure_kind = row
			.failure_kind
			.map(|kind| kind.parse::<FailureKind>())
			.transpose()
			.map_err(|err| Error::Decode(err.to_string()))?;

		Ok(Self {
			note_id: row.note_id,
			transcript_id: row.transcript_id,
			owner_id: row.owner_id,
			title: row.title,
			content: row.content,
			status,
			failure_kind,
			failure_message: row.failure_message,
			revision: row.revision,
			generator_id: row.generator_id,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
	question_id: Uuid,
	note_id: Uuid,
	note_revision: i64,
	position: i32,
	text: String,
	created_at: OffsetDateTime,
}
impl From<QuestionRow> for Question {
	fn from(row: QuestionRow) -> Self {
		Self {
			question_id: row.question_id,
			note_id: row.note_id,
			note_revision: row.note_revision,
			position: row.position,
			text: row.text,
			created_at: row.created_at,
		}
	}
}

#[derive(sqlx::FromRow)]
struct RevisionRow {
	note_id: Uuid,
	revision: i64,
	title: String,
	content: String,
	source: String,
	created_at: OffsetDateTime,
}
impl TryFrom<RevisionRow> for NoteRevision {
	type Error = Error;

	fn try_from(row: RevisionRow) -> Result<Self> {
		let source =
			row.source.parse::<RevisionSource>().map_err(|err| Error::Decode(err.to_string()))?;

		Ok(Self {
			note_id: row.note_id,
			revision: row.revision,
			title: row.title,
			content: row.content,
			source,
			created_at: row.created_at,
		})
	}
}

pub struct PgStore {
	db: Db,
}
impl PgStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}

	pub fn db(&self) -> &Db {
		&self.db
	}
}
impl Store for PgStore {
	fn insert_transcript<'a>(&'a self, transcript: &'a Transcript) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			sqlx::query(
				"\
INSERT INTO transcripts (transcript_id, owner_id, title, content, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6)",
			)
			.bind(transcript.transcript_id)
			.bind(transcript.owner_id.as_str())
			.bind(transcript.title.as_str())
			.bind(transcript.content.as_str())
			.bind(transcript.created_at)
			.bind(transcript.updated_at)
			.execute(&self.db.pool)
			.await
			.map_err(|err| {
				map_constraint(err, || {
					format!("Transcript {} already exists.", transcript.transcript_id)
				})
			})?;

			Ok(())
		})
	}

	fn get_transcript<'a>(
		&'a self,
		transcript_id: Uuid,
	) -> BoxFuture<'a, Result<Option<Transcript>>> {
		Box::pin(async move {
			let row: Option<TranscriptRow> =
				sqlx::query_as("SELECT * FROM transcripts WHERE transcript_id = $1")
					.bind(transcript_id)
					.fetch_optional(&self.db.pool)
					.await?;

			Ok(row.map(Transcript::from))
		})
	}

	fn list_transcripts<'a>(
		&'a self,
		owner_id: &'a str,
		page: Page,
	) -> BoxFuture<'a, Result<Vec<Transcript>>> {
		Box::pin(async move {
			let rows: Vec<TranscriptRow> = sqlx::query_as(
				"\
SELECT *
FROM transcripts
WHERE owner_id = $1
ORDER BY created_at ASC, transcript_id ASC
OFFSET $2
LIMIT $3",
			)
			.bind(owner_id)
			.bind(i64::from(page.skip))
			.bind(i64::from(page.limit))
			.fetch_all(&self.db.pool)
			.await?;

			Ok(rows.into_iter().map(Transcript::from).collect())
		})
	}

	fn update_transcript<'a>(&'a self, transcript: &'a Transcript) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let result = sqlx::query(
				"\
UPDATE transcripts
SET title = $2, content = $3, updated_at = $4
WHERE transcript_id = $1",
			)
			.bind(transcript.transcript_id)
			.bind(transcript.title.as_str())
			.bind(transcript.content.as_str())
			.bind(transcript.updated_at)
			.execute(&self.db.pool)
			.await?;

			if result.rows_affected() == 0 {
				return Err(Error::NotFound(format!(
					"Transcript {} not found.",
					transcript.transcript_id
				)));
			}

			Ok(())
		})
	}

	fn delete_transcript<'a>(&'a self, transcript_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut tx = self.db.pool.begin().await?;
			// Row lock conflicts with the key-share lock a concurrent pending-note insert holds,
			// so the pending check below sees that insert once it commits.
			let locked: Option<Uuid> = sqlx::query_scalar(
				"SELECT transcript_id FROM transcripts WHERE transcript_id = $1 FOR UPDATE",
			)
			.bind(transcript_id)
			.fetch_optional(&mut *tx)
			.await?;

			if locked.is_none() {
				return Err(Error::NotFound(format!("Transcript {transcript_id} not found.")));
			}
			if has_pending_note(&mut tx, transcript_id).await? {
				return Err(Error::Conflict(format!(
					"Transcript {transcript_id} has a note generation in progress."
				)));
			}

			sqlx::query("DELETE FROM transcripts WHERE transcript_id = $1")
				.bind(transcript_id)
				.execute(&mut *tx)
				.await?;

			tx.commit().await?;

			Ok(())
		})
	}

	fn insert_note<'a>(
		&'a self,
		note: &'a Note,
		snapshot: Option<&'a NoteRevision>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if note.status == NoteStatus::Failed {
				return Err(Error::InvalidArgument(
					"New notes must be pending or ready.".to_string(),
				));
			}
			if snapshot.is_some_and(|snapshot| snapshot.note_id != note.note_id) {
				return Err(Error::InvalidArgument(format!(
					"Snapshot must belong to note {}.",
					note.note_id
				)));
			}

			let mut tx = self.db.pool.begin().await?;

			sqlx::query(
				"\
INSERT INTO notes (
	note_id,
	transcript_id,
	owner_id,
	title,
	content,
	status,
	failure_kind,
	failure_message,
	revision,
	generator_id,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, NULL, NULL, $7, $8, $9, $10)",
			)
			.bind(note.note_id)
			.bind(note.transcript_id)
			.bind(note.owner_id.as_str())
			.bind(note.title.as_str())
			.bind(note.content.as_str())
			.bind(note.status.as_str())
			.bind(note.revision)
			.bind(note.generator_id.as_deref())
			.bind(note.created_at)
			.bind(note.updated_at)
			.execute(&mut *tx)
			.await
			.map_err(|err| match constraint_code(&err).as_deref() {
				Some(FOREIGN_KEY_VIOLATION) =>
					Error::NotFound(format!("Transcript {} not found.", note.transcript_id)),
				_ => map_constraint(err, || {
					format!(
						"Transcript {} already has a note generation in progress.",
						note.transcript_id
					)
				}),
			})?;

			if let Some(snapshot) = snapshot {
				insert_revision(&mut tx, snapshot).await?;
			}

			tx.commit().await?;

			Ok(())
		})
	}

	fn get_note<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Option<Note>>> {
		Box::pin(async move {
			let row: Option<NoteRow> = sqlx::query_as("SELECT * FROM notes WHERE note_id = $1")
				.bind(note_id)
				.fetch_optional(&self.db.pool)
				.await?;

			row.map(Note::try_from).transpose()
		})
	}

	fn list_notes<'a>(&'a self, owner_id: &'a str, page: Page) -> BoxFuture<'a, Result<Vec<Note>>> {
		Box::pin(async move {
			let rows: Vec<NoteRow> = sqlx::query_as(
				"\
SELECT *
FROM notes
WHERE owner_id = $1
ORDER BY created_at ASC, note_id ASC
OFFSET $2
LIMIT $3",
			)
			.bind(owner_id)
			.bind(i64::from(page.skip))
			.bind(i64::from(page.limit))
			.fetch_all(&self.db.pool)
			.await?;

			rows.into_iter().map(Note::try_from).collect()
		})
	}

	fn update_note<'a>(&'a self, update: NoteUpdate<'a>) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let note = update.note;
			let mut tx = self.db.pool.begin().await?;
			let result = sqlx::query(
				"\
UPDATE notes
SET
	title = $2,
	content = $3,
	status = $4,
	failure_kind = $5,
	failure_message = $6,
	revision = $7,
	updated_at = $8
WHERE note_id = $1 AND revision = $9 AND status = $10",
			)
			.bind(note.note_id)
			.bind(note.title.as_str())
			.bind(note.content.as_str())
			.bind(note.status.as_str())
			.bind(note.failure_kind.map(FailureKind::as_str))
			.bind(note.failure_message.as_deref())
			.bind(note.revision)
			.bind(note.updated_at)
			.bind(update.expected_revision)
			.bind(update.expected_status.as_str())
			.execute(&mut *tx)
			.await?;

			if result.rows_affected() == 0 {
				let exists: Option<Uuid> =
					sqlx::query_scalar("SELECT note_id FROM notes WHERE note_id = $1")
						.bind(note.note_id)
						.fetch_optional(&mut *tx)
						.await?;

				return Err(match exists {
					Some(_) => Error::Conflict(format!(
						"Note {} changed concurrently; expected revision {} ({}).",
						note.note_id, update.expected_revision, update.expected_status
					)),
					None => Error::NotFound(format!("Note {} not found.", note.note_id)),
				});
			}

			if let Some(snapshot) = update.snapshot {
				insert_revision(&mut tx, snapshot).await?;
			}

			tx.commit().await?;

			Ok(())
		})
	}

	fn delete_note<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut tx = self.db.pool.begin().await?;
			let status: Option<String> =
				sqlx::query_scalar("SELECT status FROM notes WHERE note_id = $1 FOR UPDATE")
					.bind(note_id)
					.fetch_optional(&mut *tx)
					.await?;
			let Some(status) = status else {
				return Err(Error::NotFound(format!("Note {note_id} not found.")));
			};

			if status == NoteStatus::Pending.as_str() {
				return Err(Error::Conflict(format!("Note {note_id} is still being generated.")));
			}

			sqlx::query("DELETE FROM notes WHERE note_id = $1")
				.bind(note_id)
				.execute(&mut *tx)
				.await?;

			tx.commit().await?;

			Ok(())
		})
	}

	fn replace_questions<'a>(
		&'a self,
		note_id: Uuid,
		questions: &'a [Question],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if questions.iter().any(|question| question.note_id != note_id) {
				return Err(Error::InvalidArgument(format!(
					"Questions must all belong to note {note_id}."
				)));
			}

			let mut tx = self.db.pool.begin().await?;
			let exists: Option<Uuid> =
				sqlx::query_scalar("SELECT note_id FROM notes WHERE note_id = $1 FOR UPDATE")
					.bind(note_id)
					.fetch_optional(&mut *tx)
					.await?;

			if exists.is_none() {
				return Err(Error::NotFound(format!("Note {note_id} not found.")));
			}

			sqlx::query("DELETE FROM note_questions WHERE note_id = $1")
				.bind(note_id)
				.execute(&mut *tx)
				.await?;

			for question in questions {
				sqlx::query(
					"\
INSERT INTO note_questions (question_id, note_id, note_revision, position, text, created_at)
VALUES ($1, $2, $3, $4, $5, $6)",
				)
				.bind(question.question_id)
				.bind(question.note_id)
				.bind(question.note_revision)
				.bind(question.position)
				.bind(question.text.as_str())
				.bind(question.created_at)
				.execute(&mut *tx)
				.await?;
			}

			tx.commit().await?;

			Ok(())
		})
	}

	fn list_questions<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Vec<Question>>> {
		Box::pin(async move {
			let rows: Vec<QuestionRow> = sqlx::query_as(
				"SELECT * FROM note_questions WHERE note_id = $1 ORDER BY position ASC",
			)
			.bind(note_id)
			.fetch_all(&self.db.pool)
			.await?;

			Ok(rows.into_iter().map(Question::from).collect())
		})
	}

	fn question_revisions<'a>(
		&'a self,
		note_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<HashMap<Uuid, i64>>> {
		Box::pin(async move {
			if note_ids.is_empty() {
				return Ok(HashMap::new());
			}

			let rows: Vec<(Uuid, i64)> = sqlx::query_as(
				"\
SELECT DISTINCT ON (note_id) note_id, note_revision
FROM note_questions
WHERE note_id = ANY($1)
ORDER BY note_id, position ASC",
			)
			.bind(note_ids)
			.fetch_all(&self.db.pool)
			.await?;

			Ok(rows.into_iter().collect())
		})
	}

	fn list_revisions<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Vec<NoteRevision>>> {
		Box::pin(async move {
			let rows: Vec<RevisionRow> = sqlx::query_as(
				"SELECT * FROM note_revisions WHERE note_id = $1 ORDER BY revision ASC",
			)
			.bind(note_id)
			.fetch_all(&self.db.pool)
			.await?;

			rows.into_iter().map(NoteRevision::try_from).collect()
		})
	}

	fn fail_pending_notes<'a>(
		&'a self,
		generator_id: &'a str,
		message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let result = sqlx::query(
				"\
UPDATE notes
SET
	status = $1,
	failure_kind = $2,
	failure_message = $3,
	updated_at = GREATEST($4, updated_at + interval '1 microsecond')
WHERE status = $5 AND generator_id = $6",
			)
			.bind(NoteStatus::Failed.as_str())
			.bind(FailureKind::Interrupted.as_str())
			.bind(message)
			.bind(now)
			.bind(NoteStatus::Pending.as_str())
			.bind(generator_id)
			.execute(&self.db.pool)
			.await?;

			Ok(result.rows_affected())
		})
	}
}

async fn has_pending_note(
	tx: &mut Transaction<'_, Postgres>,
	transcript_id: Uuid,
) -> Result<bool> {
	let conn: &mut PgConnection = &mut *tx;
	let pending: bool = sqlx::query_scalar(
		"SELECT EXISTS (SELECT 1 FROM notes WHERE transcript_id = $1 AND status = $2)",
	)
	.bind(transcript_id)
	.bind(NoteStatus::Pending.as_str())
	.fetch_one(conn)
	.await?;

	Ok(pending)
}

async fn insert_revision(
	tx: &mut Transaction<'_, Postgres>,
	snapshot: &NoteRevision,
) -> Result<()> {
	let conn: &mut PgConnection = &mut *tx;

	sqlx::query(
		"\
INSERT INTO note_revisions (note_id, revision, title, content, source, created_at)
VALUES ($1, $2, $3, $4, $5, $6)",
	)
	.bind(snapshot.note_id)
	.bind(snapshot.revision)
	.bind(snapshot.title.as_str())
	.bind(snapshot.content.as_str())
	.bind(snapshot.source.as_str())
	.bind(snapshot.created_at)
	.execute(conn)
	.await
	.map_err(|err| {
		map_constraint(err, || {
			format!("Note {} revision {} already exists.", snapshot.note_id, snapshot.revision)
		})
	})?;

	Ok(())
}

fn constraint_code(err: &sqlx::Error) -> Option<String> {
	err.as_database_error().and_then(|db_err| db_err.code()).map(|code| code.into_owned())
}

fn map_constraint(err: sqlx::Error, conflict: impl FnOnce() -> String) -> Error {
	match constraint_code(&err).as_deref() {
		Some(UNIQUE_VIOLATION) => Error::Conflict(conflict()),
		_ => Error::Sqlx(err),
	}
}
