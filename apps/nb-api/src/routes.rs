use axum::{
	Json, Router,
	extract::{FromRequestParts, Path, Query, State},
	http::{StatusCode, request::Parts},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nb_domain::status::{FailureKind, NoteStatus};
use nb_service::{
	CreateNoteRequest, CreateTranscriptRequest, EditNoteRequest, Error, GenerateNoteRequest,
	IntegrateAnswerRequest, ListRequest, NoteResponse, QuestionsResponse, RevisionResponse,
	TranscriptResponse, UpdateTranscriptRequest,
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/transcripts", post(create_transcript).get(list_transcripts))
		.route(
			"/transcripts/{transcript_id}",
			get(get_transcript).put(update_transcript).delete(delete_transcript),
		)
		.route("/transcripts/{transcript_id}/generate-note", post(generate_note))
		.route("/notes", post(create_note).get(list_notes))
		.route("/notes/{note_id}", get(get_note).put(edit_note).delete(delete_note))
		.route("/notes/{note_id}/revisions", get(list_revisions))
		.route("/notes/{note_id}/generate-questions", post(generate_questions))
		.route("/notes/{note_id}/questions", get(list_questions))
		.route("/notes/{note_id}/update-with-answer", post(update_with_answer))
		.with_state(state)
}

/// Authenticated user id of the request.
pub struct Caller(pub String);
impl FromRequestParts<AppState> for Caller {
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
		state.auth.authenticate(&parts.headers).map(Caller).ok_or_else(|| {
			json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Missing or invalid credentials.")
		})
	}
}

#[derive(Debug, Deserialize)]
struct TranscriptBody {
	title: Option<String>,
	content: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptPatchBody {
	title: Option<String>,
	content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateNoteQuery {
	wait: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct NoteBody {
	transcript_id: String,
	title: Option<String>,
	content: String,
}

#[derive(Debug, Deserialize)]
struct NotePatchBody {
	title: Option<String>,
	content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnswerBody {
	#[serde(default)]
	question_ids: Vec<Uuid>,
	#[serde(default)]
	questions: Vec<String>,
	/// Single free-text question.
	question: Option<String>,
	#[serde(alias = "answer_text")]
	answer: String,
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn create_transcript(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Json(payload): Json<TranscriptBody>,
) -> Result<(StatusCode, Json<TranscriptResponse>), ApiError> {
	let response = state
		.service
		.create_transcript(CreateTranscriptRequest {
			user_id,
			title: payload.title,
			content: payload.content,
		})
		.await?;

	Ok((StatusCode::CREATED, Json(response)))
}

async fn list_transcripts(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Query(query): Query<ListRequest>,
) -> Result<Json<Vec<TranscriptResponse>>, ApiError> {
	let response = state.service.list_transcripts(&user_id, query).await?;

	Ok(Json(response))
}

async fn get_transcript(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Path(transcript_id): Path<String>,
) -> Result<Json<TranscriptResponse>, ApiError> {
	let transcript_id = parse_id(&transcript_id)?;
	let response = state.service.get_transcript(&user_id, transcript_id).await?;

	Ok(Json(response))
}

async fn update_transcript(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Path(transcript_id): Path<String>,
	Json(payload): Json<TranscriptPatchBody>,
) -> Result<Json<TranscriptResponse>, ApiError> {
	let transcript_id = parse_id(&transcript_id)?;
	let response = state
		.service
		.update_transcript(UpdateTranscriptRequest {
			user_id,
			transcript_id,
			title: payload.title,
			content: payload.content,
		})
		.await?;

	Ok(Json(response))
}

async fn delete_transcript(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Path(transcript_id): Path<String>,
) -> Result<StatusCode, ApiError> {
	let transcript_id = parse_id(&transcript_id)?;

	state.service.delete_transcript(&user_id, transcript_id).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn generate_note(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Path(transcript_id): Path<String>,
	Query(query): Query<GenerateNoteQuery>,
) -> Result<(StatusCode, Json<NoteResponse>), ApiError> {
	let transcript_id = parse_id(&transcript_id)?;
	let response = state
		.service
		.generate_note(GenerateNoteRequest {
			user_id,
			transcript_id,
			wait: query.wait.unwrap_or(true),
		})
		.await?;
	let status = match (response.status, response.failure.as_ref().map(|failure| failure.kind)) {
		(NoteStatus::Pending, _) => StatusCode::ACCEPTED,
		(NoteStatus::Ready, _) => StatusCode::CREATED,
		(NoteStatus::Failed, Some(FailureKind::Timeout)) => StatusCode::GATEWAY_TIMEOUT,
		(NoteStatus::Failed, Some(FailureKind::Unavailable | FailureKind::Format)) =>
			StatusCode::BAD_GATEWAY,
		(NoteStatus::Failed, _) => StatusCode::INTERNAL_SERVER_ERROR,
	};

	Ok((status, Json(response)))
}

async fn create_note(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Json(payload): Json<NoteBody>,
) -> Result<(StatusCode, Json<NoteResponse>), ApiError> {
	let transcript_id = parse_id(&payload.transcript_id)?;
	let response = state
		.service
		.create_note(CreateNoteRequest {
			user_id,
			transcript_id,
			title: payload.title,
			content: payload.content,
		})
		.await?;

	Ok((StatusCode::CREATED, Json(response)))
}

async fn list_notes(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Query(query): Query<ListRequest>,
) -> Result<Json<Vec<NoteResponse>>, ApiError> {
	let response = state.service.list_notes(&user_id, query).await?;

	Ok(Json(response))
}

async fn get_note(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Path(note_id): Path<String>,
) -> Result<Json<NoteResponse>, ApiError> {
	let note_id = parse_id(&note_id)?;
	let response = state.service.get_note(&user_id, note_id).await?;

	Ok(Json(response))
}

async fn edit_note(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Path(note_id): Path<String>,
	Json(payload): Json<NotePatchBody>,
) -> Result<Json<NoteResponse>, ApiError> {
	let note_id = parse_id(&note_id)?;
	let response = state
		.service
		.edit_note(EditNoteRequest {
			user_id,
			note_id,
			title: payload.title,
			content: payload.content,
		})
		.await?;

	Ok(Json(response))
}

async fn delete_note(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Path(note_id): Path<String>,
) -> Result<StatusCode, ApiError> {
	let note_id = parse_id(&note_id)?;

	state.service.delete_note(&user_id, note_id).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn list_revisions(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Path(note_id): Path<String>,
) -> Result<Json<Vec<RevisionResponse>>, ApiError> {
	let note_id = parse_id(&note_id)?;
	let response = state.service.list_revisions(&user_id, note_id).await?;

	Ok(Json(response))
}

async fn generate_questions(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Path(note_id): Path<String>,
) -> Result<Json<QuestionsResponse>, ApiError> {
	let note_id = parse_id(&note_id)?;
	let response = state.service.generate_questions(&user_id, note_id).await?;

	Ok(Json(response))
}

async fn list_questions(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Path(note_id): Path<String>,
) -> Result<Json<QuestionsResponse>, ApiError> {
	let note_id = parse_id(&note_id)?;
	let response = state.service.list_questions(&user_id, note_id).await?;

	Ok(Json(response))
}

async fn update_with_answer(
	State(state): State<AppState>,
	Caller(user_id): Caller,
	Path(note_id): Path<String>,
	Json(payload): Json<AnswerBody>,
) -> Result<Json<NoteResponse>, ApiError> {
	let note_id = parse_id(&note_id)?;
	let mut questions = payload.questions;

	questions.extend(payload.question);

	let response = state
		.service
		.integrate_answer(IntegrateAnswerRequest {
			user_id,
			note_id,
			question_ids: payload.question_ids,
			questions,
			answer: payload.answer,
		})
		.await?;

	Ok(Json(response))
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
	Uuid::parse_str(raw).map_err(|_| {
		json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", format!("{raw} is not a valid id."))
	})
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		let (status, code) = match &err {
			Error::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
			Error::Ownership { .. } => (StatusCode::FORBIDDEN, "OWNERSHIP"),
			Error::Precondition { .. } => (StatusCode::CONFLICT, "PRECONDITION_FAILED"),
			Error::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
			Error::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
			Error::GenerationUnavailable { .. } =>
				(StatusCode::BAD_GATEWAY, "GENERATION_UNAVAILABLE"),
			Error::GenerationTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "GENERATION_TIMEOUT"),
			Error::GenerationFormat { .. } => (StatusCode::BAD_GATEWAY, "GENERATION_FORMAT"),
			Error::Storage { .. } => {
				tracing::error!(error = %err, "Storage failure.");

				(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE")
			},
		};

		json_error(status, code, err.to_string())
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError::new(status, code, message)
}
