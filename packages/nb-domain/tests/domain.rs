use time::{Duration, macros::datetime};

use nb_domain::{
	FormatError,
	prompt,
	response::{self, NoteDraft},
	revision,
	status::{FailureKind, NoteStatus, PipelineStage},
};

#[test]
fn parses_note_draft_from_json_object() {
	let raw = r####"{"title": "测试笔记", "content": "### 测试笔记\n\n#### 核心观点\n内容。"}"####;
	let draft = response::parse_note_draft(raw).expect("Expected a note draft.");

	assert_eq!(
		draft,
		NoteDraft {
			title: "测试笔记".to_string(),
			content: "### 测试笔记\n\n#### 核心观点\n内容。".to_string(),
		}
	);
}

#[test]
fn note_draft_without_title_gets_empty_title() {
	let draft = response::parse_note_draft(r#"{"content": "body"}"#).expect("Expected a draft.");

	assert_eq!(draft.title, "");
	assert_eq!(draft.content, "body");
}

#[test]
fn note_draft_requires_content() {
	assert_eq!(
		response::parse_note_draft(r#"{"title": "t"}"#),
		Err(FormatError::MissingField { field: "content" })
	);
	assert_eq!(
		response::parse_note_draft(r#"{"title": "t", "content": "   "}"#),
		Err(FormatError::EmptyContent)
	);
	assert_eq!(
		response::parse_note_draft(r#"{"content": {"nested": true}}"#),
		Err(FormatError::WrongType { field: "content" })
	);
}

#[test]
fn note_draft_rejects_plain_text() {
	let err = response::parse_note_draft("Here is your note: ...").expect_err("Expected error.");

	assert!(matches!(err, FormatError::InvalidJson { .. }));
}

#[test]
fn parses_questions_in_order() {
	let raw = r#"{"questions": ["问题1？", "问题2？", "问题3？"]}"#;
	let questions = response::parse_questions(raw, 10).expect("Expected questions.");

	assert_eq!(questions, vec!["问题1？", "问题2？", "问题3？"]);
}

#[test]
fn parses_bare_question_array_and_drops_blanks() {
	let questions =
		response::parse_questions(r#"["  a?  ", "", "   ", "b?"]"#, 10).expect("Expected list.");

	assert_eq!(questions, vec!["a?", "b?"]);
}

#[test]
fn question_list_is_truncated_to_bound() {
	let raw = r#"{"questions": ["1", "2", "3", "4", "5"]}"#;
	let questions = response::parse_questions(raw, 3).expect("Expected questions.");

	assert_eq!(questions, vec!["1", "2", "3"]);
}

#[test]
fn empty_question_list_is_not_an_error() {
	let questions = response::parse_questions(r#"{"questions": []}"#, 5).expect("Expected empty.");

	assert!(questions.is_empty());
}

#[test]
fn malformed_question_payloads_are_format_errors() {
	assert_eq!(
		response::parse_questions(r#"{"items": []}"#, 5),
		Err(FormatError::MissingField { field: "questions" })
	);
	assert_eq!(
		response::parse_questions(r#"{"questions": [1, 2]}"#, 5),
		Err(FormatError::WrongType { field: "questions[]" })
	);
	assert!(matches!(
		response::parse_questions("1. Why?\n2. How?", 5),
		Err(FormatError::InvalidJson { .. })
	));
}

#[test]
fn non_decreasing_check_counts_characters() {
	assert!(response::ensure_non_decreasing("这座城市", "这座城市。").is_ok());
	assert!(response::ensure_non_decreasing("abc", "abc").is_ok());
	assert_eq!(
		response::ensure_non_decreasing("这座城市", "城市"),
		Err(FormatError::ContentShrank { prev_chars: 4, next_chars: 2 })
	);
}

#[test]
fn next_updated_at_is_strictly_increasing() {
	let prev = datetime!(2026-01-01 00:00:00.000001 UTC);

	assert_eq!(revision::next_updated_at(prev, prev), prev + Duration::microseconds(1));
	assert_eq!(
		revision::next_updated_at(prev, prev - Duration::seconds(5)),
		prev + Duration::microseconds(1)
	);

	let later = datetime!(2026-01-01 00:00:01.123456789 UTC);

	assert_eq!(revision::next_updated_at(prev, later), datetime!(2026-01-01 00:00:01.123456 UTC));
}

#[test]
fn status_round_trips_through_strings() {
	for status in [NoteStatus::Pending, NoteStatus::Ready, NoteStatus::Failed] {
		assert_eq!(status.as_str().parse::<NoteStatus>(), Ok(status));
	}
	for kind in [
		FailureKind::Unavailable,
		FailureKind::Timeout,
		FailureKind::Format,
		FailureKind::Interrupted,
		FailureKind::Storage,
	] {
		assert_eq!(kind.as_str().parse::<FailureKind>(), Ok(kind));
	}

	assert!("archived".parse::<NoteStatus>().is_err());
}

#[test]
fn stage_follows_the_lineage() {
	assert_eq!(PipelineStage::of(NoteStatus::Pending, 0, None), PipelineStage::Generating);
	assert_eq!(PipelineStage::of(NoteStatus::Failed, 0, None), PipelineStage::Failed);
	assert_eq!(PipelineStage::of(NoteStatus::Ready, 1, None), PipelineStage::Ready);
	assert_eq!(PipelineStage::of(NoteStatus::Ready, 1, Some(1)), PipelineStage::QuestionsGenerated);
	// Questions generated before the last integration belong to an older snapshot.
	assert_eq!(PipelineStage::of(NoteStatus::Ready, 2, Some(1)), PipelineStage::Ready);
}

#[test]
fn transcript_prompt_separates_instructions_from_content() {
	let prompt = prompt::note_from_transcript("这座城市很大。", "Chinese");

	assert!(prompt.instructions.contains("{\"title\": string, \"content\": string}"));
	assert!(prompt.instructions.ends_with("Write the note in Chinese."));
	assert_eq!(prompt.context, "Transcript:\n这座城市很大。");
}
