use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use nb_domain::revision;
use nb_storage::models::Transcript;

use crate::{Error, ListRequest, NoteService, Result, access};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTranscriptRequest {
	pub user_id: String,
	#[serde(default)]
	pub title: Option<String>,
	pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateTranscriptRequest {
	pub user_id: String,
	pub transcript_id: Uuid,
	pub title: Option<String>,
	pub content: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptResponse {
	pub transcript_id: Uuid,
	pub owner_id: String,
	pub title: String,
	pub content: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}
impl From<Transcript> for TranscriptResponse {
	fn from(transcript: Transcript) -> Self {
		Self {
			transcript_id: transcript.transcript_id,
			owner_id: transcript.owner_id,
			title: transcript.title,
			content: transcript.content,
			created_at: transcript.created_at,
			updated_at: transcript.updated_at,
		}
	}
}

impl NoteService {
	pub async fn create_transcript(
		&self,
		req: CreateTranscriptRequest,
	) -> Result<TranscriptResponse> {
		let user_id = access::require_user(&req.user_id)?;

		require_content(&req.content)?;

		let now = revision::now();
		let transcript = Transcript {
			transcript_id: Uuid::new_v4(),
			owner_id: user_id.to_string(),
			title: req.title.map(|title| title.trim().to_string()).unwrap_or_default(),
			content: req.content,
			created_at: now,
			updated_at: now,
		};

		self.store.insert_transcript(&transcript).await?;

		tracing::info!(transcript_id = %transcript.transcript_id, "Transcript created.");

		Ok(transcript.into())
	}

	pub async fn get_transcript(
		&self,
		user_id: &str,
		transcript_id: Uuid,
	) -> Result<TranscriptResponse> {
		Ok(self.load_transcript(user_id, transcript_id).await?.into())
	}

	pub async fn list_transcripts(
		&self,
		user_id: &str,
		req: ListRequest,
	) -> Result<Vec<TranscriptResponse>> {
		let user_id = access::require_user(user_id)?;
		let transcripts = self.store.list_transcripts(user_id, req.page()?).await?;

		Ok(transcripts.into_iter().map(TranscriptResponse::from).collect())
	}

	pub async fn update_transcript(
		&self,
		req: UpdateTranscriptRequest,
	) -> Result<TranscriptResponse> {
		if req.title.is_none() && req.content.is_none() {
			return Err(Error::InvalidRequest { message: "No updates provided.".to_string() });
		}
		if let Some(content) = req.content.as_deref() {
			require_content(content)?;
		}

		let mut transcript = self.load_transcript(&req.user_id, req.transcript_id).await?;

		if let Some(title) = req.title {
			transcript.title = title.trim().to_string();
		}
		if let Some(content) = req.content {
			transcript.content = content;
		}

		transcript.updated_at = revision::next_updated_at(transcript.updated_at, revision::now());

		self.store.update_transcript(&transcript).await?;

		Ok(transcript.into())
	}

	/// Deletes the transcript with all notes derived from it; refused while a generation runs.
	pub async fn delete_transcript(&self, user_id: &str, transcript_id: Uuid) -> Result<()> {
		self.load_transcript(user_id, transcript_id).await?;
		self.store.delete_transcript(transcript_id).await?;

		tracing::info!(%transcript_id, "Transcript deleted.");

		Ok(())
	}

	pub(crate) async fn load_transcript(
		&self,
		user_id: &str,
		transcript_id: Uuid,
	) -> Result<Transcript> {
		let user_id = access::require_user(user_id)?;
		let Some(transcript) = self.store.get_transcript(transcript_id).await? else {
			return Err(Error::NotFound {
				message: format!("Transcript {transcript_id} not found."),
			});
		};

		access::ensure_owner(&transcript.owner_id, user_id, "Transcript", transcript_id)?;

		Ok(transcript)
	}
}

fn require_content(content: &str) -> Result<()> {
	if content.trim().is_empty() {
		return Err(Error::InvalidRequest {
			message: "Transcript content must not be empty.".to_string(),
		});
	}

	Ok(())
}
