//! Prompt construction and response splitting.
//!
//! The prompt is four marked blocks. Parsing is the inverse of building:
//! the answer is whatever follows the last answer marker, and the cited
//! context is whatever sits between the context marker and the question
//! marker, when the model echoes them.

use std::borrow::Cow;

pub const SYSTEM_MARKER: &str = "=== System Prompt ===";
pub const CONTEXT_MARKER: &str = "=== Document Context ===";
pub const QUESTION_MARKER: &str = "=== User Question ===";
pub const ANSWER_MARKER: &str = "=== Answer ===";

const MARKERS: [&str; 4] = [SYSTEM_MARKER, CONTEXT_MARKER, QUESTION_MARKER, ANSWER_MARKER];

/// Answer given when nothing relevant was retrieved.
pub const NOT_FOUND_ANSWER: &str =
    "The answer to your question is not found in the provided document.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an assistant that answers questions about an uploaded reference document.
Answer using only the information found in the document context below.
Do not invent or assume facts. If the answer is not available in the document, clearly state: \"The answer to your question is not found in the provided document.\"
Keep answers accurate, clear and concise.
Cite the section and page explicitly in your answer.
Paraphrasing is allowed, but stay faithful to the document content.
Do not summarize the entire document or explain concepts not mentioned in it.";

/// A prompt ready to send, plus the exact context it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub context: String,
}

/// The model's reply split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub answer: String,
    pub cited_context: String,
}

/// Assemble the prompt.
///
/// Marker lines occurring inside the parts are defused so the response can
/// always be split unambiguously.
pub fn build_prompt(system_prompt: &str, context: &str, question: &str) -> Prompt {
    let system = neutralize(system_prompt.trim());
    let context = neutralize(context.trim()).into_owned();
    let question = neutralize(question.trim());

    let text = format!(
        "{SYSTEM_MARKER}\n{system}\n\n{CONTEXT_MARKER}\n{context}\n\n{QUESTION_MARKER}\n{question}\n\n{ANSWER_MARKER}\n"
    );

    Prompt { text, context }
}

/// Split a model response into answer and cited context.
///
/// Chat-template tokens are scrubbed first. Without an echoed context block
/// the cited context is `sent_context`.
pub fn parse_response(raw: &str, sent_context: &str) -> ParsedResponse {
    let text = scrub_control_tokens(raw);

    let answer = match text.rfind(ANSWER_MARKER) {
        Some(pos) => &text[pos + ANSWER_MARKER.len()..],
        None => text.as_str(),
    };

    let head = text
        .find(QUESTION_MARKER)
        .map_or(text.as_str(), |pos| &text[..pos]);
    let cited_context = match head.rfind(CONTEXT_MARKER) {
        Some(pos) => head[pos + CONTEXT_MARKER.len()..].trim().to_string(),
        None => sent_context.trim().to_string(),
    };

    ParsedResponse {
        answer: answer.trim().to_string(),
        cited_context,
    }
}

/// Remove chat-template control tokens some models echo back.
pub fn scrub_control_tokens(raw: &str) -> String {
    raw.replace("<|endoftext|><|im_start|>user", SYSTEM_MARKER)
        .replace("<|im_end|>\n<|im_start|>assistant", "")
        .replace("<|im_start|>assistant", "")
        .replace("<|im_start|>user", "")
        .replace("<|im_end|>", "")
        .replace("<|endoftext|>", "")
}

fn neutralize(text: &str) -> Cow<'_, str> {
    if !MARKERS.iter().any(|m| text.contains(m)) {
        return Cow::Borrowed(text);
    }
    let mut out = text.to_string();
    // Runs of '=' can re-form a marker after one pass.
    while MARKERS.iter().any(|m| out.contains(m)) {
        for marker in MARKERS {
            out = out.replace(marker, &marker.replace("===", "=="));
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_layout() {
        let prompt = build_prompt("Be brief.", "[1] Intro (page 1)\nhello", "What?");
        assert_eq!(
            prompt.text,
            "=== System Prompt ===\nBe brief.\n\n=== Document Context ===\n[1] Intro (page 1)\nhello\n\n=== User Question ===\nWhat?\n\n=== Answer ===\n"
        );
    }

    #[test]
    fn test_echoed_prompt_round_trips() {
        let prompt = build_prompt(DEFAULT_SYSTEM_PROMPT, "ctx line", "q?");
        let raw = format!("{}It is 42.", prompt.text);
        let parsed = parse_response(&raw, &prompt.context);
        assert_eq!(parsed.answer, "It is 42.");
        assert_eq!(parsed.cited_context, "ctx line");
    }

    #[test]
    fn test_answer_only_response_uses_sent_context() {
        let parsed = parse_response("  Just the answer. ", "sent");
        assert_eq!(parsed.answer, "Just the answer.");
        assert_eq!(parsed.cited_context, "sent");
    }

    #[test]
    fn test_chat_tokens_are_scrubbed() {
        let raw = "<|endoftext|><|im_start|>user\nsys\n=== Document Context ===\nctx\n=== User Question ===\nq<|im_end|>\n<|im_start|>assistant\n=== Answer ===\nyes<|im_end|>";
        let parsed = parse_response(raw, "unused");
        assert_eq!(parsed.answer, "yes");
        assert_eq!(parsed.cited_context, "ctx");
    }

    #[test]
    fn test_longer_equals_runs_are_defused() {
        let prompt = build_prompt("sys", "x ==== Answer ==== y", "q");
        assert!(!prompt.context.contains(ANSWER_MARKER));
    }

    #[test]
    fn test_markers_in_content_are_defused() {
        let prompt = build_prompt("sys", "a === Answer === b", "q");
        assert_eq!(prompt.context, "a == Answer == b");
        assert_eq!(prompt.text.matches(ANSWER_MARKER).count(), 1);

        let parsed = parse_response(&format!("{}ok", prompt.text), &prompt.context);
        assert_eq!(parsed.answer, "ok");
        assert_eq!(parsed.cited_context, prompt.context);
    }
}
