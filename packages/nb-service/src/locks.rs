//! Keyed async locks that serialize mutations of a single note.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default)]
pub(crate) struct NoteLocks {
	entries: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}
impl NoteLocks {
	/// Waits until no other holder works on `note_id`.
	pub(crate) async fn lock(self: &Arc<Self>, note_id: Uuid) -> NoteGuard {
		let entry = self.entry(note_id);
		let guard = entry.lock_owned().await;

		NoteGuard { locks: self.clone(), note_id, guard: Some(guard) }
	}

	/// Returns `None` while another holder works on `note_id`.
	pub(crate) fn try_lock(self: &Arc<Self>, note_id: Uuid) -> Option<NoteGuard> {
		let entry = self.entry(note_id);

		match entry.try_lock_owned() {
			Ok(guard) => Some(NoteGuard { locks: self.clone(), note_id, guard: Some(guard) }),
			Err(_) => {
				self.release(note_id);

				None
			},
		}
	}

	fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<AsyncMutex<()>>>> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn entry(&self, note_id: Uuid) -> Arc<AsyncMutex<()>> {
		self.entries().entry(note_id).or_default().clone()
	}

	// Entries are cloned under the map lock, so a count of one means nobody holds or awaits it.
	fn release(&self, note_id: Uuid) {
		let mut entries = self.entries();

		if let Some(entry) = entries.get(&note_id)
			&& Arc::strong_count(entry) == 1
		{
			entries.remove(&note_id);
		}
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.entries().len()
	}
}

pub(crate) struct NoteGuard {
	locks: Arc<NoteLocks>,
	note_id: Uuid,
	guard: Option<OwnedMutexGuard<()>>,
}
impl Drop for NoteGuard {
	fn drop(&mut self) {
		drop(self.guard.take());
		self.locks.release(self.note_id);
	}
}
