//! Single-shot chat completion against an OpenAI-compatible endpoint.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Sends one completion request and returns the generated text.
///
/// `prompt` becomes the system message and `context` the user message; without a context the
/// prompt is sent as the only user message. The request carries no deadline unless
/// `cfg.timeout_ms` is set, and it is never retried here.
pub async fn complete(
	cfg: &nb_config::LlmProviderConfig,
	prompt: &str,
	context: Option<&str>,
) -> Result<String> {
	let mut builder = Client::builder();

	if let Some(timeout_ms) = cfg.timeout_ms {
		builder = builder.timeout(Duration::from_millis(timeout_ms));
	}

	let client = builder.build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_tokens,
		"messages": build_messages(prompt, context),
		"response_format": { "type": "json_object" },
	});

	tracing::debug!(
		provider_id = %cfg.provider_id,
		model = %cfg.model,
		"Sending completion request."
	);

	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let status = res.status();

	if !status.is_success() {
		let text = res.text().await.unwrap_or_default();
		let snippet: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();

		return Err(Error::Unavailable { message: format!("HTTP {status}: {snippet}") });
	}

	let json: Value = res.json().await?;

	parse_completion_text(json)
}

fn build_messages(prompt: &str, context: Option<&str>) -> Value {
	match context {
		Some(context) => serde_json::json!([
			{ "role": "system", "content": prompt },
			{ "role": "user", "content": context },
		]),
		None => serde_json::json!([{ "role": "user", "content": prompt }]),
	}
}

fn parse_completion_text(json: Value) -> Result<String> {
	if let Some(error) = json.get("error") {
		let message = error
			.get("message")
			.and_then(|v| v.as_str())
			.map(str::to_string)
			.unwrap_or_else(|| error.to_string());

		return Err(Error::Unavailable { message });
	}

	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Completion response is missing choices[0].message.content.".to_string(),
		})?;

	if content.trim().is_empty() {
		return Err(Error::InvalidResponse {
			message: "Completion response content is empty.".to_string(),
		});
	}

	Ok(content.to_string())
}
