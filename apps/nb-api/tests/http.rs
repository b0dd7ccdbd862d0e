use std::{
	collections::{HashMap, VecDeque},
	sync::{Arc, Mutex},
};

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::{Map, Value, json};
use tokio::sync::Notify;
use tower::util::ServiceExt;

use nb_api::{
	auth::{AuthState, USER_ID_HEADER},
	routes,
	state::AppState,
};
use nb_config::{Config, Generation, LlmProviderConfig, Questions, Security, Service, Storage};
use nb_domain::prompt::Prompt;
use nb_service::{BoxFuture, GenerationProvider, NoteService, Providers};
use nb_storage::memory::MemoryStore;

const ALICE_TOKEN: &str = "token-alice";
const MALLORY_TOKEN: &str = "token-mallory";
const TRANSCRIPT: &str = "这座城市很大，人口超过两千万。城市的交通主要依靠地铁，早晚高峰非常拥挤。";
const NOTE: &str = "### 城市概况\n\n#### 核心观点\n这座城市规模很大，人口超过两千万。";

enum Reply {
	Text(String),
	Unavailable,
	Timeout,
	/// Answers only after `release` is notified.
	Held(String),
}

struct QueuedProvider {
	replies: Mutex<VecDeque<Reply>>,
	release: Notify,
}
impl QueuedProvider {
	fn new(replies: Vec<Reply>) -> Self {
		Self { replies: Mutex::new(replies.into()), release: Notify::new() }
	}
}
impl GenerationProvider for QueuedProvider {
	fn complete<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_prompt: &'a Prompt,
	) -> BoxFuture<'a, nb_providers::Result<String>> {
		let reply = self.replies.lock().expect("Replies lock poisoned.").pop_front();

		Box::pin(async move {
			match reply {
				Some(Reply::Text(text)) => Ok(text),
				Some(Reply::Held(text)) => {
					self.release.notified().await;

					Ok(text)
				},
				Some(Reply::Timeout) => Err(nb_providers::Error::Timeout {
					message: "operation timed out".to_string(),
				}),
				Some(Reply::Unavailable) | None => Err(nb_providers::Error::Unavailable {
					message: "HTTP 503 Service Unavailable".to_string(),
				}),
			}
		})
	}
}

fn test_config() -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
			instance_id: "nb-api-test".to_string(),
		},
		storage: Storage {
			backend: "memory".to_string(),
			postgres: None,
			recover_pending_on_start: false,
		},
		providers: nb_config::Providers {
			llm: LlmProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/chat/completions".to_string(),
				model: "test".to_string(),
				temperature: 0.7,
				max_tokens: 2_000,
				timeout_ms: None,
				default_headers: Map::new(),
			},
		},
		generation: Generation::default(),
		questions: Questions::default(),
		security: Security {
			bind_localhost_only: true,
			auth_mode: "static_keys".to_string(),
			auth_keys: Vec::new(),
		},
	}
}

fn app_with(replies: Vec<Reply>, auth: AuthState) -> (Router, Arc<QueuedProvider>) {
	let provider = Arc::new(QueuedProvider::new(replies));
	let service = NoteService::with_providers(
		test_config(),
		Arc::new(MemoryStore::new()),
		Providers::new(provider.clone()),
	);

	(routes::router(AppState::with_service(service, auth)), provider)
}

fn static_keys() -> AuthState {
	let users_by_token = HashMap::from([
		(ALICE_TOKEN.to_string(), "user-alice".to_string()),
		(MALLORY_TOKEN.to_string(), "user-mallory".to_string()),
	]);

	AuthState::StaticKeys { users_by_token }
}

fn note_json(content: &str) -> Reply {
	Reply::Text(json!({ "title": "城市概况", "content": content }).to_string())
}

async fn send(
	app: &Router,
	method: &str,
	uri: &str,
	token: &str,
	body: Option<Value>,
) -> (StatusCode, Value) {
	let builder = Request::builder()
		.method(method)
		.uri(uri)
		.header("authorization", format!("Bearer {token}"));
	let request = match body {
		Some(body) => builder
			.header("content-type", "application/json")
			.body(Body::from(body.to_string())),
		None => builder.body(Body::empty()),
	}
	.expect("Failed to build request.");
	let response = app.clone().oneshot(request).await.expect("Failed to call handler.");
	let status = response.status();
	let bytes =
		body::to_bytes(response.into_body(), usize::MAX).await.expect("Failed to read body.");
	let json = if bytes.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&bytes).expect("Failed to parse response body.")
	};

	(status, json)
}

async fn create_transcript(app: &Router) -> String {
	let (status, body) = send(
		app,
		"POST",
		"/transcripts",
		ALICE_TOKEN,
		Some(json!({ "title": "城市讲座", "content": TRANSCRIPT })),
	)
	.await;

	assert_eq!(status, StatusCode::CREATED);

	body["transcript_id"].as_str().expect("Missing transcript_id.").to_string()
}

#[tokio::test]
async fn health_needs_no_credentials() {
	let (app, _) = app_with(Vec::new(), static_keys());
	let response = app
		.oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
		.await
		.expect("Failed to call handler.");

	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_or_unknown_token_is_unauthorized() {
	let (app, _) = app_with(Vec::new(), static_keys());
	let response = app
		.clone()
		.oneshot(Request::builder().uri("/transcripts").body(Body::empty()).expect("request"))
		.await
		.expect("Failed to call handler.");

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

	let (status, body) = send(&app, "GET", "/transcripts", "token-unknown", None).await;

	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(body["error_code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn off_mode_reads_the_user_id_header() {
	let (app, _) = app_with(Vec::new(), AuthState::Off);
	let request = Request::builder()
		.method("POST")
		.uri("/transcripts")
		.header(USER_ID_HEADER, "user-local")
		.header("content-type", "application/json")
		.body(Body::from(json!({ "content": TRANSCRIPT }).to_string()))
		.expect("request");
	let response = app.oneshot(request).await.expect("Failed to call handler.");
	let status = response.status();
	let bytes = body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
	let body: Value = serde_json::from_slice(&bytes).expect("json");

	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(body["owner_id"], "user-local");
}

#[tokio::test]
async fn chinese_flow_over_http_appends_ten_full_stops() {
	let appended = format!("{NOTE}{}", "。".repeat(10));
	let (app, _) = app_with(
		vec![
			note_json(NOTE),
			Reply::Text(
				json!({ "questions": ["这座城市的人口是多少？", "地铁系统有多大？"] }).to_string(),
			),
			note_json(&appended),
		],
		static_keys(),
	);
	let transcript_id = create_transcript(&app).await;
	let (status, note) = send(
		&app,
		"POST",
		&format!("/transcripts/{transcript_id}/generate-note"),
		ALICE_TOKEN,
		None,
	)
	.await;

	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(note["status"], "ready");
	assert_eq!(note["stage"], "ready");

	let note_id = note["note_id"].as_str().expect("Missing note_id.").to_string();
	let (status, questions) =
		send(&app, "POST", &format!("/notes/{note_id}/generate-questions"), ALICE_TOKEN, None)
			.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(questions["questions"].as_array().map(Vec::len), Some(2));

	let (_, stored) = send(&app, "GET", &format!("/notes/{note_id}"), ALICE_TOKEN, None).await;

	assert_eq!(stored["stage"], "questions_generated");

	let (status, revised) = send(
		&app,
		"POST",
		&format!("/notes/{note_id}/update-with-answer"),
		ALICE_TOKEN,
		Some(json!({
			"question": questions["questions"][0]["text"],
			"answer_text": "在正文后面加十个'。'",
		})),
	)
	.await;

	assert_eq!(status, StatusCode::OK);

	let content = revised["content"].as_str().expect("Missing content.");

	assert_eq!(content.chars().count(), NOTE.chars().count() + 10);
	assert!(content.ends_with(&"。".repeat(10)));
	assert_eq!(revised["revision"], 2);
	assert_eq!(revised["stage"], "ready");

	let (_, revisions) =
		send(&app, "GET", &format!("/notes/{note_id}/revisions"), ALICE_TOKEN, None).await;

	assert_eq!(revisions.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn other_users_get_ownership_errors() {
	let (app, _) = app_with(vec![note_json(NOTE)], static_keys());
	let transcript_id = create_transcript(&app).await;
	let (status, body) =
		send(&app, "GET", &format!("/transcripts/{transcript_id}"), MALLORY_TOKEN, None).await;

	assert_eq!(status, StatusCode::FORBIDDEN);
	assert_eq!(body["error_code"], "OWNERSHIP");

	let (status, _) = send(
		&app,
		"POST",
		&format!("/transcripts/{transcript_id}/generate-note"),
		MALLORY_TOKEN,
		None,
	)
	.await;

	assert_eq!(status, StatusCode::FORBIDDEN);

	let (_, listed) = send(&app, "GET", "/transcripts", MALLORY_TOKEN, None).await;

	assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn background_generation_is_accepted_and_blocks_deletion() {
	let (app, provider) =
		app_with(vec![Reply::Held(json!({ "content": NOTE }).to_string())], static_keys());
	let transcript_id = create_transcript(&app).await;
	let (status, note) = send(
		&app,
		"POST",
		&format!("/transcripts/{transcript_id}/generate-note?wait=false"),
		ALICE_TOKEN,
		None,
	)
	.await;

	assert_eq!(status, StatusCode::ACCEPTED);
	assert_eq!(note["status"], "pending");
	assert_eq!(note["stage"], "generating");

	let (status, body) =
		send(&app, "DELETE", &format!("/transcripts/{transcript_id}"), ALICE_TOKEN, None).await;

	assert_eq!(status, StatusCode::CONFLICT);
	assert_eq!(body["error_code"], "CONFLICT");

	let (status, body) = send(
		&app,
		"POST",
		&format!("/transcripts/{transcript_id}/generate-note"),
		ALICE_TOKEN,
		None,
	)
	.await;

	assert_eq!(status, StatusCode::CONFLICT);
	assert_eq!(body["error_code"], "CONFLICT");

	provider.release.notify_one();

	let note_id = note["note_id"].as_str().expect("Missing note_id.").to_string();
	let mut settled = Value::Null;

	for _ in 0..400 {
		let (_, current) =
			send(&app, "GET", &format!("/notes/{note_id}"), ALICE_TOKEN, None).await;

		if current["status"] != "pending" {
			settled = current;

			break;
		}

		tokio::time::sleep(std::time::Duration::from_millis(5)).await;
	}

	assert_eq!(settled["status"], "ready");
	assert_eq!(settled["title"], "城市讲座");

	let (status, _) =
		send(&app, "DELETE", &format!("/transcripts/{transcript_id}"), ALICE_TOKEN, None).await;

	assert_eq!(status, StatusCode::NO_CONTENT);

	let (status, body) = send(&app, "GET", &format!("/notes/{note_id}"), ALICE_TOKEN, None).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error_code"], "NOT_FOUND");
}

#[tokio::test]
async fn generation_failures_keep_their_kind() {
	let (app, _) = app_with(
		vec![Reply::Unavailable, Reply::Timeout, Reply::Text("不是 JSON".to_string())],
		static_keys(),
	);
	let transcript_id = create_transcript(&app).await;
	let uri = format!("/transcripts/{transcript_id}/generate-note");
	let expected = [
		(StatusCode::BAD_GATEWAY, "unavailable"),
		(StatusCode::GATEWAY_TIMEOUT, "timeout"),
		(StatusCode::BAD_GATEWAY, "format"),
	];

	for (expected_status, kind) in expected {
		let (status, body) = send(&app, "POST", &uri, ALICE_TOKEN, None).await;

		assert_eq!(status, expected_status);
		assert_eq!(body["status"], "failed");
		assert_eq!(body["stage"], "failed");
		assert_eq!(body["failure"]["kind"], kind);
		assert!(body["note_id"].is_string());
	}

	let (_, notes) = send(&app, "GET", "/notes", ALICE_TOKEN, None).await;
	let kinds: Vec<&str> = notes
		.as_array()
		.expect("Expected a note list.")
		.iter()
		.filter_map(|note| note["failure"]["kind"].as_str())
		.collect();

	assert_eq!(kinds.len(), 3);
	assert!(kinds.contains(&"unavailable"));
	assert!(kinds.contains(&"timeout"));
	assert!(kinds.contains(&"format"));
}

#[tokio::test]
async fn questions_on_a_failed_note_are_a_precondition_error() {
	let (app, _) = app_with(vec![Reply::Unavailable], static_keys());
	let transcript_id = create_transcript(&app).await;
	let (_, note) = send(
		&app,
		"POST",
		&format!("/transcripts/{transcript_id}/generate-note?wait=false"),
		ALICE_TOKEN,
		None,
	)
	.await;
	let note_id = note["note_id"].as_str().expect("Missing note_id.").to_string();

	for _ in 0..400 {
		let (_, current) =
			send(&app, "GET", &format!("/notes/{note_id}"), ALICE_TOKEN, None).await;

		if current["status"] == "failed" {
			break;
		}

		tokio::time::sleep(std::time::Duration::from_millis(5)).await;
	}

	let (status, body) =
		send(&app, "POST", &format!("/notes/{note_id}/generate-questions"), ALICE_TOKEN, None)
			.await;

	assert_eq!(status, StatusCode::CONFLICT);
	assert_eq!(body["error_code"], "PRECONDITION_FAILED");
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
	let (app, _) = app_with(Vec::new(), static_keys());
	let (status, body) = send(&app, "GET", "/notes/not-a-uuid", ALICE_TOKEN, None).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error_code"], "INVALID_REQUEST");

	let (status, body) =
		send(&app, "POST", "/transcripts", ALICE_TOKEN, Some(json!({ "content": "   " }))).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error_code"], "INVALID_REQUEST");

	let (status, _) = send(&app, "GET", "/transcripts?limit=0", ALICE_TOKEN, None).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);

	let missing = uuid::Uuid::new_v4();
	let (status, _) = send(&app, "GET", &format!("/notes/{missing}"), ALICE_TOKEN, None).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn notes_can_be_created_by_hand() {
	let (app, _) = app_with(Vec::new(), static_keys());
	let transcript_id = create_transcript(&app).await;
	let (status, note) = send(
		&app,
		"POST",
		"/notes",
		ALICE_TOKEN,
		Some(json!({ "transcript_id": transcript_id, "title": "手写笔记", "content": NOTE })),
	)
	.await;

	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(note["status"], "ready");
	assert_eq!(note["revision"], 1);
	assert_eq!(note["title"], "手写笔记");
	assert_eq!(note["transcript_id"], transcript_id.as_str());

	let note_id = note["note_id"].as_str().expect("Missing note_id.");
	let (status, revisions) =
		send(&app, "GET", &format!("/notes/{note_id}/revisions"), ALICE_TOKEN, None).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(revisions[0]["source"], "edit");

	let (status, body) = send(
		&app,
		"POST",
		"/notes",
		MALLORY_TOKEN,
		Some(json!({ "transcript_id": transcript_id, "content": NOTE })),
	)
	.await;

	assert_eq!(status, StatusCode::FORBIDDEN);
	assert_eq!(body["error_code"], "OWNERSHIP");

	let (status, body) = send(
		&app,
		"POST",
		"/notes",
		ALICE_TOKEN,
		Some(json!({ "transcript_id": "not-a-uuid", "content": NOTE })),
	)
	.await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error_code"], "INVALID_REQUEST");
}
