use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FormatError;

/// Title and body produced by a note generation or an answer integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
	pub title: String,
	pub content: String,
}

pub fn parse_note_draft(raw: &str) -> Result<NoteDraft, FormatError> {
	let json = parse_json(raw)?;
	let Some(object) = json.as_object() else {
		return Err(FormatError::WrongType { field: "$" });
	};
	let content = match object.get("content") {
		Some(Value::String(content)) => content.trim().to_string(),
		Some(_) => return Err(FormatError::WrongType { field: "content" }),
		None => return Err(FormatError::MissingField { field: "content" }),
	};
	let title = match object.get("title") {
		Some(Value::String(title)) => title.trim().to_string(),
		Some(Value::Null) | None => String::new(),
		Some(_) => return Err(FormatError::WrongType { field: "title" }),
	};

	if content.is_empty() {
		return Err(FormatError::EmptyContent);
	}

	Ok(NoteDraft { title, content })
}

/// Parses a question list, dropping blank entries and keeping at most `max_count` in order.
///
/// Accepts `{"questions": [...]}` or a bare array. An empty list is a valid result.
pub fn parse_questions(raw: &str, max_count: usize) -> Result<Vec<String>, FormatError> {
	let json = parse_json(raw)?;
	let items = match &json {
		Value::Array(items) => items,
		Value::Object(object) => match object.get("questions") {
			Some(Value::Array(items)) => items,
			Some(_) => return Err(FormatError::WrongType { field: "questions" }),
			None => return Err(FormatError::MissingField { field: "questions" }),
		},
		_ => return Err(FormatError::WrongType { field: "$" }),
	};
	let mut questions = Vec::with_capacity(items.len().min(max_count));

	for item in items {
		let Some(text) = item.as_str() else {
			return Err(FormatError::WrongType { field: "questions[]" });
		};
		let text = text.trim();

		if text.is_empty() {
			continue;
		}
		if questions.len() == max_count {
			break;
		}

		questions.push(text.to_string());
	}

	Ok(questions)
}

pub fn char_len(text: &str) -> usize {
	text.chars().count()
}

/// Rejects a revision whose content is shorter, in characters, than the content it replaces.
pub fn ensure_non_decreasing(prev: &str, next: &str) -> Result<(), FormatError> {
	let prev_chars = char_len(prev);
	let next_chars = char_len(next);

	if next_chars < prev_chars {
		return Err(FormatError::ContentShrank { prev_chars, next_chars });
	}

	Ok(())
}

fn parse_json(raw: &str) -> Result<Value, FormatError> {
	serde_json::from_str(strip_code_fence(raw))
		.map_err(|err| FormatError::InvalidJson { message: err.to_string() })
}

// Accepts JSON wrapped in a ```json fence.
fn strip_code_fence(raw: &str) -> &str {
	let trimmed = raw.trim();
	let Some(rest) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	let rest = rest.strip_prefix("json").unwrap_or(rest);

	rest.strip_suffix("```").unwrap_or(rest).trim()
}
