pub mod generate_note;
pub mod integrate;
pub mod notes;
pub mod questions;
pub mod time_serde;
pub mod transcripts;

mod access;
mod error;
mod locks;

pub use error::{Error, Result};
pub use generate_note::GenerateNoteRequest;
pub use integrate::IntegrateAnswerRequest;
pub use nb_storage::BoxFuture;
pub use notes::{
	CreateNoteRequest, EditNoteRequest, FailureResponse, NoteResponse, RevisionResponse,
};
pub use questions::{QuestionResponse, QuestionsResponse};
pub use transcripts::{CreateTranscriptRequest, TranscriptResponse, UpdateTranscriptRequest};

use std::{future::Future, sync::Arc};

use nb_config::{Config, LlmProviderConfig};
use nb_domain::prompt::Prompt;
use nb_providers::completion;
use nb_storage::{Store, models::Page};
use tokio::task::JoinHandle;

use crate::locks::NoteLocks;

pub const DEFAULT_PAGE_LIMIT: u32 = 100;
pub const MAX_PAGE_LIMIT: u32 = 1_000;

/// The single external capability of the pipeline: turn a prompt into generated text.
pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		prompt: &'a Prompt,
	) -> BoxFuture<'a, nb_providers::Result<String>>;
}

#[derive(Clone)]
pub struct Providers {
	pub generation: Arc<dyn GenerationProvider>,
}
impl Providers {
	pub fn new(generation: Arc<dyn GenerationProvider>) -> Self {
		Self { generation }
	}
}
impl Default for Providers {
	fn default() -> Self {
		Self { generation: Arc::new(DefaultProviders) }
	}
}

struct DefaultProviders;
impl GenerationProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		prompt: &'a Prompt,
	) -> BoxFuture<'a, nb_providers::Result<String>> {
		Box::pin(completion::complete(cfg, &prompt.instructions, Some(&prompt.context)))
	}
}

#[derive(Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ListRequest {
	pub skip: Option<u32>,
	pub limit: Option<u32>,
}
impl ListRequest {
	pub(crate) fn page(self) -> Result<Page> {
		let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);

		if limit == 0 || limit > MAX_PAGE_LIMIT {
			return Err(Error::InvalidRequest {
				message: format!("limit must be between 1 and {MAX_PAGE_LIMIT}."),
			});
		}

		Ok(Page { skip: self.skip.unwrap_or(0), limit })
	}
}

/// Transcript-to-note pipeline over a [`Store`] and a [`GenerationProvider`].
///
/// Cloning is cheap and every clone shares the same store, providers, and note locks.
#[derive(Clone)]
pub struct NoteService {
	pub cfg: Arc<Config>,
	pub store: Arc<dyn Store>,
	pub providers: Providers,
	locks: Arc<NoteLocks>,
}
impl NoteService {
	pub fn new(cfg: Config, store: Arc<dyn Store>) -> Self {
		Self::with_providers(cfg, store, Providers::default())
	}

	pub fn with_providers(cfg: Config, store: Arc<dyn Store>, providers: Providers) -> Self {
		Self { cfg: Arc::new(cfg), store, providers, locks: Arc::new(NoteLocks::default()) }
	}

	/// Fails notes a previous run of this instance left pending so their transcripts can be
	/// generated again.
	///
	/// Only notes claimed under `service.instance_id` are touched, so generations still running on
	/// other instances sharing the store keep their pending notes.
	pub async fn recover_pending(&self) -> Result<u64> {
		let now = nb_domain::revision::now();
		let recovered = self
			.store
			.fail_pending_notes(
				&self.cfg.service.instance_id,
				"Generation was interrupted before it finished.",
				now,
			)
			.await?;

		if recovered > 0 {
			tracing::warn!(recovered, "Marked interrupted note generations as failed.");
		}

		Ok(recovered)
	}

	pub(crate) async fn generate(&self, prompt: &Prompt) -> Result<String> {
		let raw = self.providers.generation.complete(&self.cfg.providers.llm, prompt).await?;

		Ok(raw)
	}
}

/// Runs `fut` on its own task so it completes even when the caller stops waiting.
pub(crate) async fn detached<T, F>(fut: F) -> Result<T>
where
	F: Future<Output = Result<T>> + Send + 'static,
	T: Send + 'static,
{
	joined(tokio::spawn(fut)).await
}

pub(crate) async fn joined<T>(task: JoinHandle<Result<T>>) -> Result<T> {
	task.await.map_err(|err| Error::Storage {
		message: format!("Pipeline task ended abnormally: {err}."),
	})?
}
