//! Process-local store used for tests and single-node setups without Postgres.

use std::{
	collections::HashMap,
	sync::{Mutex, MutexGuard},
};

use time::OffsetDateTime;
use uuid::Uuid;

use nb_domain::status::{FailureKind, NoteStatus};

use crate::{
	BoxFuture, Error, Result, Store,
	models::{Note, NoteRevision, NoteUpdate, Page, Question, Transcript},
};

#[derive(Default)]
struct State {
	transcripts: HashMap<Uuid, Transcript>,
	notes: HashMap<Uuid, Note>,
	questions: HashMap<Uuid, Vec<Question>>,
	revisions: HashMap<Uuid, Vec<NoteRevision>>,
}
impl State {
	fn has_pending_note(&self, transcript_id: Uuid) -> bool {
		self.notes
			.values()
			.any(|note| note.transcript_id == transcript_id && note.status == NoteStatus::Pending)
	}

	fn remove_note(&mut self, note_id: Uuid) {
		self.notes.remove(&note_id);
		self.questions.remove(&note_id);
		self.revisions.remove(&note_id);
	}
}

#[derive(Default)]
pub struct MemoryStore {
	state: Mutex<State>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl Store for MemoryStore {
	fn insert_transcript<'a>(&'a self, transcript: &'a Transcript) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = self.state();

			if state.transcripts.contains_key(&transcript.transcript_id) {
				return Err(Error::Conflict(format!(
					"Transcript {} already exists.",
					transcript.transcript_id
				)));
			}

			state.transcripts.insert(transcript.transcript_id, transcript.clone());

			Ok(())
		})
	}

	fn get_transcript<'a>(
		&'a self,
		transcript_id: Uuid,
	) -> BoxFuture<'a, Result<Option<Transcript>>> {
		Box::pin(async move { Ok(self.state().transcripts.get(&transcript_id).cloned()) })
	}

	fn list_transcripts<'a>(
		&'a self,
		owner_id: &'a str,
		page: Page,
	) -> BoxFuture<'a, Result<Vec<Transcript>>> {
		Box::pin(async move {
			let state = self.state();
			let mut items = state
				.transcripts
				.values()
				.filter(|transcript| transcript.owner_id == owner_id)
				.cloned()
				.collect::<Vec<_>>();

			items.sort_by_key(|transcript| (transcript.created_at, transcript.transcript_id));

			Ok(paginate(items, page))
		})
	}

	fn update_transcript<'a>(&'a self, transcript: &'a Transcript) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = self.state();
			let Some(stored) = state.transcripts.get_mut(&transcript.transcript_id) else {
				return Err(Error::NotFound(format!(
					"Transcript {} not found.",
					transcript.transcript_id
				)));
			};

			*stored = transcript.clone();

			Ok(())
		})
	}

	fn delete_transcript<'a>(&'a self, transcript_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = self.state();

			if !state.transcripts.contains_key(&transcript_id) {
				return Err(Error::NotFound(format!("Transcript {transcript_id} not found.")));
			}
			if state.has_pending_note(transcript_id) {
				return Err(Error::Conflict(format!(
					"Transcript {transcript_id} has a note generation in progress."
				)));
			}

			let note_ids = state
				.notes
				.values()
				.filter(|note| note.transcript_id == transcript_id)
				.map(|note| note.note_id)
				.collect::<Vec<_>>();

			for note_id in note_ids {
				state.remove_note(note_id);
			}

			state.transcripts.remove(&transcript_id);

			Ok(())
		})
	}

	fn insert_note<'a>(
		&'a self,
		note: &'a Note,
		snapshot: Option<&'a NoteRevision>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = self.state();

			if !state.transcripts.contains_key(&note.transcript_id) {
				return Err(Error::NotFound(format!(
					"Transcript {} not found.",
					note.transcript_id
				)));
			}
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
			if state.notes.contains_key(&note.note_id) {
				return Err(Error::Conflict(format!("Note {} already exists.", note.note_id)));
			}
			if note.status == NoteStatus::Pending && state.has_pending_note(note.transcript_id) {
				return Err(Error::Conflict(format!(
					"Transcript {} already has a note generation in progress.",
					note.transcript_id
				)));
			}

			state.notes.insert(note.note_id, note.clone());

			if let Some(snapshot) = snapshot {
				state.revisions.entry(note.note_id).or_default().push(snapshot.clone());
			}

			Ok(())
		})
	}

	fn get_note<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Option<Note>>> {
		Box::pin(async move { Ok(self.state().notes.get(&note_id).cloned()) })
	}

	fn list_notes<'a>(&'a self, owner_id: &'a str, page: Page) -> BoxFuture<'a, Result<Vec<Note>>> {
		Box::pin(async move {
			let state = self.state();
			let mut items = state
				.notes
				.values()
				.filter(|note| note.owner_id == owner_id)
				.cloned()
				.collect::<Vec<_>>();

			items.sort_by_key(|note| (note.created_at, note.note_id));

			Ok(paginate(items, page))
		})
	}

	fn update_note<'a>(&'a self, update: NoteUpdate<'a>) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut guard = self.state();
			let state = &mut *guard;
			let note_id = update.note.note_id;
			let Some(stored) = state.notes.get_mut(&note_id) else {
				return Err(Error::NotFound(format!("Note {note_id} not found.")));
			};

			if stored.revision != update.expected_revision
				|| stored.status != update.expected_status
			{
				return Err(Error::Conflict(format!(
					"Note {note_id} changed concurrently; expected revision {} ({}), found {} \
					 ({}).",
					update.expected_revision,
					update.expected_status,
					stored.revision,
					stored.status
				)));
			}

			let revisions = state.revisions.entry(note_id).or_default();

			if let Some(snapshot) = update.snapshot {
				if revisions.iter().any(|existing| existing.revision == snapshot.revision) {
					return Err(Error::Conflict(format!(
						"Note {note_id} revision {} already exists.",
						snapshot.revision
					)));
				}

				revisions.push(snapshot.clone());
			}

			*stored = update.note.clone();

			Ok(())
		})
	}

	fn delete_note<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = self.state();
			let Some(note) = state.notes.get(&note_id) else {
				return Err(Error::NotFound(format!("Note {note_id} not found.")));
			};

			if note.status == NoteStatus::Pending {
				return Err(Error::Conflict(format!("Note {note_id} is still being generated.")));
			}

			state.remove_note(note_id);

			Ok(())
		})
	}

	fn replace_questions<'a>(
		&'a self,
		note_id: Uuid,
		questions: &'a [Question],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = self.state();

			if !state.notes.contains_key(&note_id) {
				return Err(Error::NotFound(format!("Note {note_id} not found.")));
			}
			if questions.iter().any(|question| question.note_id != note_id) {
				return Err(Error::InvalidArgument(format!(
					"Questions must all belong to note {note_id}."
				)));
			}

			state.questions.insert(note_id, questions.to_vec());

			Ok(())
		})
	}

	fn list_questions<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Vec<Question>>> {
		Box::pin(async move {
			let mut questions = self.state().questions.get(&note_id).cloned().unwrap_or_default();

			questions.sort_by_key(|question| question.position);

			Ok(questions)
		})
	}

	fn question_revisions<'a>(
		&'a self,
		note_ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<HashMap<Uuid, i64>>> {
		Box::pin(async move {
			let state = self.state();

			Ok(note_ids
				.iter()
				.filter_map(|note_id| {
					let first = state.questions.get(note_id)?.first()?;

					Some((*note_id, first.note_revision))
				})
				.collect())
		})
	}

	fn list_revisions<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Vec<NoteRevision>>> {
		Box::pin(async move {
			let mut revisions = self.state().revisions.get(&note_id).cloned().unwrap_or_default();

			revisions.sort_by_key(|revision| revision.revision);

			Ok(revisions)
		})
	}

	fn fail_pending_notes<'a>(
		&'a self,
		generator_id: &'a str,
		message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let mut state = self.state();
			let mut changed = 0;
			let claimed = state.notes.values_mut().filter(|note| {
				note.status == NoteStatus::Pending
					&& note.generator_id.as_deref() == Some(generator_id)
			});

			for note in claimed {
				note.status = NoteStatus::Failed;
				note.failure_kind = Some(FailureKind::Interrupted);
				note.failure_message = Some(message.to_string());
				note.updated_at = nb_domain::revision::next_updated_at(note.updated_at, now);
				changed += 1;
			}

			Ok(changed)
		})
	}
}

fn paginate<T>(items: Vec<T>, page: Page) -> Vec<T> {
	items.into_iter().skip(page.skip as usize).take(page.limit as usize).collect()
}
