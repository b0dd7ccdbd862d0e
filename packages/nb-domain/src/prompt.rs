//! Prompt construction for the three generation calls.
//!
//! Every prompt is split into fixed `instructions` and the user `context` the instructions refer
//! to, so providers can send them as separate chat messages.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
	pub instructions: String,
	pub context: String,
}

pub fn note_from_transcript(transcript: &str, language: &str) -> Prompt {
	let instructions = format!(
		"\
Turn the transcript in the next message into a structured note.
Make the speaker's viewpoints explicit and lay out the chains of reasoning they use.
Stay faithful to the transcript and do not invent facts.
Aim for a note of roughly the same length as the transcript.
Answer with one JSON object of the form {{\"title\": string, \"content\": string}}.
The title is short; the content is the full structured note as plain text.
Do not nest JSON inside either field and do not write anything outside the object.
Write the note in {language}."
	);

	Prompt { instructions, context: format!("Transcript:\n{transcript}") }
}

pub fn follow_up_questions(note: &str, language: &str, max_count: u32) -> Prompt {
	let min_count = max_count.min(3);
	let instructions = format!(
		"\
Read the note in the next message as a listener who just heard it and wants to ask the speaker \
follow-up questions.
Write between {min_count} and {max_count} questions that clarify, deepen, or fill gaps in the note.
Answer with one JSON object of the form {{\"questions\": [string, ...]}} and nothing else.
Write the questions in {language}."
	);

	Prompt { instructions, context: format!("Note:\n{note}") }
}

pub fn integrate_answer(note: &str, questions: &[&str], answer: &str, language: &str) -> Prompt {
	let instructions = format!(
		"\
The next message holds a note followed by follow-up questions and the author's answer.
Rewrite the whole note so that it incorporates the answer.
Keep everything the note already says and its structure; the result must not be shorter than \
the original note.
If the answer asks for a specific edit to the text, apply it exactly.
Answer with one JSON object of the form {{\"title\": string, \"content\": string}}.
The content is plain text. Do not nest JSON inside either field and do not write anything \
outside the object.
Write the note in {language}."
	);
	let mut context = format!("Note:\n{note}\n\n");

	for question in questions {
		context.push_str("Question: ");
		context.push_str(question);
		context.push('\n');
	}

	context.push_str("Answer: ");
	context.push_str(answer);

	Prompt { instructions, context }
}
