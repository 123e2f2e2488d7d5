use super::resolver::VerifyAnswer;
use super::LlmService;
use crate::models::chat::ChatMessage;
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// Reply prefix the validator uses to reject a cached answer.
const REJECT_SENTINEL: &str = "INVALID";

/// Strict LLM gate between the knowledge box and the user.
///
/// The model only checks relevance and may lightly rephrase; it must never
/// add facts or change numbers, percentages or conditions. A rejection
/// forces the TXT-RAG fallback.
pub struct RelevanceVerifier {
    llm_service: Arc<LlmService>,
}

impl RelevanceVerifier {
    pub fn new(llm_service: Arc<LlmService>) -> Self {
        Self { llm_service }
    }

    fn build_verification_prompt(question: &str, candidate_answer: &str) -> String {
        format!(
            r#"You are a strict financial QA validator.

User question:
{question}

Cached answer:
{candidate_answer}

TASK:
1. Decide if the cached answer DIRECTLY answers the user question.
2. If it does NOT clearly answer the question, respond ONLY with:
   INVALID
3. If it DOES answer correctly:
   - Keep the same meaning
   - Do NOT add new facts
   - Do NOT change numbers, percentages, conditions
   - You may lightly rephrase for clarity (optional)
   - Be concise and human-like

IMPORTANT:
- Never guess
- Never combine multiple topics
- Never expand scope
"#
        )
    }

    /// `None` when the model rejected the candidate or returned nothing
    /// usable; an empty verdict must never surface as an empty answer.
    fn parse_verdict(raw: &str) -> Option<String> {
        let text = raw.trim();

        if text.is_empty() {
            return None;
        }

        if text.to_uppercase().starts_with(REJECT_SENTINEL) {
            return None;
        }

        Some(text.to_string())
    }
}

#[async_trait::async_trait]
impl VerifyAnswer for RelevanceVerifier {
    async fn verify(&self, question: &str, candidate_answer: &str) -> Result<Option<String>> {
        let prompt = Self::build_verification_prompt(question, candidate_answer);

        let raw = self
            .llm_service
            .generate_chat(vec![ChatMessage::user(prompt)])
            .await?;

        let verdict = Self::parse_verdict(&raw);
        debug!(
            "Verifier verdict for '{}': {}",
            question,
            if verdict.is_some() { "accept" } else { "reject" }
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sentinel_rejects() {
        assert_eq!(RelevanceVerifier::parse_verdict("INVALID"), None);
        assert_eq!(
            RelevanceVerifier::parse_verdict("invalid - talks about a different loan"),
            None
        );
        assert_eq!(RelevanceVerifier::parse_verdict("  INVALID\n"), None);
    }

    #[test]
    fn test_empty_verdict_rejects() {
        assert_eq!(RelevanceVerifier::parse_verdict(""), None);
        assert_eq!(RelevanceVerifier::parse_verdict("   \n "), None);
    }

    #[test]
    fn test_answer_passes_through_trimmed() {
        let verdict =
            RelevanceVerifier::parse_verdict("  The gold loan rate is 9% per annum.  ");
        assert_eq!(
            verdict,
            Some("The gold loan rate is 9% per annum.".to_string())
        );
    }

    #[test]
    fn test_prompt_carries_question_and_candidate() {
        let prompt = RelevanceVerifier::build_verification_prompt(
            "documents for gold loan",
            "You need ID proof and gold valuation.",
        );
        assert!(prompt.contains("documents for gold loan"));
        assert!(prompt.contains("You need ID proof and gold valuation."));
        assert!(prompt.contains("INVALID"));
    }
}
