use super::topic::LoanTopic;
use std::collections::HashSet;

/// Shared vague-question / follow-up policy.
///
/// One canonical definition serves both the cache gate and follow-up
/// detection, so the two can never drift apart: an utterance is vague when
/// it has at most two words, or when it exactly equals one of the generic
/// loan-attribute tokens (an optional trailing question mark is ignored).
#[derive(Debug, Clone)]
pub struct QuestionPolicy {
    vague_tokens: HashSet<String>,
}

impl QuestionPolicy {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            vague_tokens: tokens.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    fn normalize(utterance: &str) -> String {
        utterance
            .trim()
            .trim_end_matches('?')
            .trim()
            .to_lowercase()
    }

    /// Vague questions must never be answered from cache: their topic is
    /// ambiguous, so they go to follow-up handling or grounded generation.
    pub fn is_vague(&self, utterance: &str) -> bool {
        let normalized = Self::normalize(utterance);

        if normalized.split_whitespace().count() <= 2 {
            return true;
        }

        self.vague_tokens.contains(&normalized)
    }

    /// A follow-up is a short, topic-dependent utterance ("documents?",
    /// "rate?") only interpretable relative to the active topic. Same
    /// predicate as `is_vague`.
    pub fn is_followup(&self, utterance: &str) -> bool {
        self.is_vague(utterance)
    }

    /// Rewrite a follow-up into a fully specified question. Callers must
    /// hold an active topic; without one the turn is answered with a
    /// clarification question instead.
    pub fn rewrite(&self, utterance: &str, topic: LoanTopic) -> String {
        format!("{} for {}", Self::normalize(utterance), topic.display_name())
    }
}

impl Default for QuestionPolicy {
    fn default() -> Self {
        Self::new(crate::config::settings::ChatConfig::default_vague_tokens())
    }
}
