use crate::database::{MessageRole, StoredMessage};

/// Compose the generation prompt: fixed system instructions, the recent
/// history rendered oldest-first as context-only material, then the
/// effective question. History is never treated as knowledge; the guard
/// lines below keep the model from citing its own earlier answers.
pub fn build_prompt(system_prompt: &str, history: &[StoredMessage], question: &str) -> String {
    let mut history_text = String::new();
    for message in history {
        let prefix = match message.role {
            MessageRole::User => "User",
            MessageRole::Assistant => "Assistant",
        };
        history_text.push_str(prefix);
        history_text.push_str(": ");
        history_text.push_str(&message.content);
        history_text.push('\n');
    }

    format!(
        r#"{system_prompt}

IMPORTANT:
- Conversation history is provided ONLY to understand intent and follow-ups.
- Do NOT treat previous answers as facts or sources.
- Answer strictly from the provided documents.
- Do NOT repeat old answers unless relevant to the current question.

Conversation history (context only):
{history_text}

User question:
{question}
"#
    )
}
