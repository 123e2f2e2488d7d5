use super::policy::QuestionPolicy;
use super::prompt::build_prompt;
use super::topic::LoanTopic;
use crate::config::ChatConfig;
use crate::database::{MessageRole, SessionStore};
use crate::services::rag_service::SOURCE_LABEL;
use crate::services::resolver::CacheResolver;
use crate::utils::error::ApiError;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Fixed clarification question for topic-less follow-ups. Returned without
/// contacting any downstream collaborator.
pub const CLARIFICATION_RESPONSE: &str = "Which loan are you referring to?";

/// Answer produced by the RAG collaborator. Infallible by contract: on
/// internal failure the collaborator returns its fixed apology text.
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub text: String,
    pub sources: Vec<String>,
}

/// Document retrieval & generation collaborator.
#[async_trait::async_trait]
pub trait GenerateAnswer: Send + Sync {
    async fn generate(&self, full_prompt: &str) -> GeneratedAnswer;
}

/// Which path produced the final response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOrigin {
    KnowledgeBox,
    Generated,
    Clarification,
}

#[derive(Debug)]
pub struct ChatOutcome {
    pub response: String,
    pub sources: Vec<String>,
    pub origin: AnswerOrigin,
}

/// Per-turn orchestrator: session upkeep, topic tracking, follow-up
/// rewriting, knowledge-box-first resolution and the RAG fallback.
pub struct AnswerRouter {
    store: SessionStore,
    resolver: CacheResolver,
    rag_engine: Arc<dyn GenerateAnswer>,
    policy: Arc<QuestionPolicy>,
    config: ChatConfig,
    system_prompt: String,
}

impl AnswerRouter {
    pub fn new(
        store: SessionStore,
        resolver: CacheResolver,
        rag_engine: Arc<dyn GenerateAnswer>,
        policy: Arc<QuestionPolicy>,
        config: ChatConfig,
        system_prompt: String,
    ) -> Self {
        Self {
            store,
            resolver,
            rag_engine,
            policy,
            config,
            system_prompt,
        }
    }

    /// Process one inbound chat turn to completion.
    ///
    /// No session-store lock is held across collaborator calls; each store
    /// operation is its own pooled statement.
    pub async fn handle(&self, session_id: &str, message: &str) -> Result<ChatOutcome, ApiError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ApiError::BadRequest("message must not be empty".to_string()));
        }
        if session_id.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "session_id must not be empty".to_string(),
            ));
        }

        // Never serve expired session state: sweep before the first read.
        self.store.expire(self.config.session_ttl_minutes).await?;
        self.store.ensure(session_id).await?;
        self.store.append(session_id, MessageRole::User, message).await?;

        // An explicit mention updates the tracked topic; anything else keeps
        // whatever the session already knows.
        let explicit_topic = LoanTopic::detect(message);
        let active_topic = match explicit_topic {
            Some(topic) => {
                self.store.set_topic(session_id, topic).await?;
                info!("Session {}: topic set to '{}'", session_id, topic.display_name());
                Some(topic)
            }
            None => self.store.get_topic(session_id).await?,
        };

        // A short utterance that already names its loan type is fully
        // specified; only topic-less shorthand needs rewriting.
        let effective_question = if explicit_topic.is_none() && self.policy.is_followup(message) {
            match active_topic {
                Some(topic) => {
                    let rewritten = self.policy.rewrite(message, topic);
                    debug!(
                        "Follow-up '{}' rewritten to '{}'",
                        message, rewritten
                    );
                    rewritten
                }
                None => {
                    // Clarification turns are deliberately not persisted as
                    // assistant messages; the user turn above already is.
                    info!("Session {}: follow-up without active topic", session_id);
                    return Ok(ChatOutcome {
                        response: CLARIFICATION_RESPONSE.to_string(),
                        sources: Vec::new(),
                        origin: AnswerOrigin::Clarification,
                    });
                }
            }
        } else {
            message.to_string()
        };

        if let Some(answer) = self.resolver.resolve(&effective_question).await {
            self.store
                .append(session_id, MessageRole::Assistant, &answer)
                .await?;
            return Ok(ChatOutcome {
                response: answer,
                sources: vec![SOURCE_LABEL.to_string()],
                origin: AnswerOrigin::KnowledgeBox,
            });
        }

        let history = self
            .store
            .recent(session_id, self.config.history_window)
            .await?;
        let full_prompt = build_prompt(&self.system_prompt, &history, &effective_question);

        let generated = self.rag_engine.generate(&full_prompt).await;

        self.store
            .append(session_id, MessageRole::Assistant, &generated.text)
            .await?;

        Ok(ChatOutcome {
            response: generated.text,
            sources: generated.sources,
            origin: AnswerOrigin::Generated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::session_store::memory_store;
    use crate::services::resolver::{CacheLookup, CacheMatch, VerifyAnswer};
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        pub Cache {}

        #[async_trait::async_trait]
        impl CacheLookup for Cache {
            async fn lookup(&self, question: &str) -> Result<Option<CacheMatch>>;
        }
    }

    mock! {
        pub Verifier {}

        #[async_trait::async_trait]
        impl VerifyAnswer for Verifier {
            async fn verify(&self, question: &str, candidate_answer: &str) -> Result<Option<String>>;
        }
    }

    mock! {
        pub Rag {}

        #[async_trait::async_trait]
        impl GenerateAnswer for Rag {
            async fn generate(&self, full_prompt: &str) -> GeneratedAnswer;
        }
    }

    fn generated(text: &str) -> GeneratedAnswer {
        GeneratedAnswer {
            text: text.to_string(),
            sources: vec![SOURCE_LABEL.to_string()],
        }
    }

    fn chat_config() -> ChatConfig {
        ChatConfig {
            history_window: 8,
            session_ttl_minutes: 10,
            vague_tokens: ChatConfig::default_vague_tokens(),
        }
    }

    async fn router(cache: MockCache, verifier: MockVerifier, rag: MockRag) -> AnswerRouter {
        let policy = Arc::new(QuestionPolicy::default());
        let resolver = CacheResolver::new(
            Arc::new(cache),
            Arc::new(verifier),
            policy.clone(),
            0.80,
        );
        AnswerRouter::new(
            memory_store().await,
            resolver,
            Arc::new(rag),
            policy,
            chat_config(),
            "You are Lora.".to_string(),
        )
    }

    #[tokio::test]
    async fn test_cache_hit_sets_topic_and_answers_from_cache() {
        let mut cache = MockCache::new();
        cache
            .expect_lookup()
            .with(eq("What is personal loan interest rate?"))
            .returning(|_| {
                Ok(Some(CacheMatch {
                    answer: "Personal loan interest rate is 12% per annum.".to_string(),
                    score: 0.92,
                }))
            });
        let mut verifier = MockVerifier::new();
        verifier
            .expect_verify()
            .returning(|_, answer| Ok(Some(answer.to_string())));
        let mut rag = MockRag::new();
        rag.expect_generate().times(0);

        let router = router(cache, verifier, rag).await;
        let outcome = router
            .handle("s1", "What is personal loan interest rate?")
            .await
            .unwrap();

        assert_eq!(outcome.origin, AnswerOrigin::KnowledgeBox);
        assert!(outcome.response.contains("12%"));
        assert_eq!(outcome.sources, vec![SOURCE_LABEL.to_string()]);
        assert_eq!(
            router.store.get_topic("s1").await.unwrap(),
            Some(LoanTopic::Personal)
        );

        // Both turns persisted
        let history = router.store.recent("s1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_followup_is_rewritten_with_active_topic() {
        let mut cache = MockCache::new();
        cache
            .expect_lookup()
            .with(eq("I want a gold loan"))
            .times(1)
            .returning(|_| Ok(None));
        cache
            .expect_lookup()
            .with(eq("documents for gold loan"))
            .times(1)
            .returning(|_| Ok(None));
        let mut verifier = MockVerifier::new();
        verifier.expect_verify().times(0);
        let mut rag = MockRag::new();
        rag.expect_generate()
            .withf(|prompt: &str| prompt.contains("User question:\nI want a gold loan"))
            .times(1)
            .returning(|_| generated("We offer gold loans up to 5 lakh."));
        rag.expect_generate()
            .withf(|prompt: &str| prompt.contains("User question:\ndocuments for gold loan"))
            .times(1)
            .returning(|_| generated("You need ID proof and gold valuation."));

        let router = router(cache, verifier, rag).await;

        router.handle("s2", "I want a gold loan").await.unwrap();
        let outcome = router.handle("s2", "documents?").await.unwrap();

        assert_eq!(outcome.origin, AnswerOrigin::Generated);
        assert!(outcome.response.contains("ID proof"));

        // Topic survives the follow-up turn
        assert_eq!(
            router.store.get_topic("s2").await.unwrap(),
            Some(LoanTopic::Gold)
        );
    }

    #[tokio::test]
    async fn test_first_message_followup_gets_clarification_only() {
        let mut cache = MockCache::new();
        cache.expect_lookup().times(0);
        let mut verifier = MockVerifier::new();
        verifier.expect_verify().times(0);
        let mut rag = MockRag::new();
        rag.expect_generate().times(0);

        let router = router(cache, verifier, rag).await;
        let outcome = router.handle("s3", "eligibility?").await.unwrap();

        assert_eq!(outcome.response, CLARIFICATION_RESPONSE);
        assert_eq!(outcome.origin, AnswerOrigin::Clarification);
        assert!(outcome.sources.is_empty());

        // The user turn is logged; the clarification is not
        let history = router.store.recent("s3", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_verifier_rejection_forces_generation_path() {
        let mut cache = MockCache::new();
        cache.expect_lookup().returning(|_| {
            Ok(Some(CacheMatch {
                answer: "Cached text about a different question.".to_string(),
                score: 0.95,
            }))
        });
        let mut verifier = MockVerifier::new();
        verifier.expect_verify().times(1).returning(|_, _| Ok(None));
        let mut rag = MockRag::new();
        rag.expect_generate()
            .times(1)
            .returning(|_| generated("Generated grounded answer."));

        let router = router(cache, verifier, rag).await;
        let outcome = router
            .handle("s4", "Can I prepay my home loan without penalty?")
            .await
            .unwrap();

        assert_eq!(outcome.origin, AnswerOrigin::Generated);
        assert_eq!(outcome.response, "Generated grounded answer.");
    }

    #[tokio::test]
    async fn test_topic_unchanged_by_followup_until_new_explicit_mention() {
        let mut cache = MockCache::new();
        cache.expect_lookup().returning(|_| Ok(None));
        let mut verifier = MockVerifier::new();
        verifier.expect_verify().times(0);
        let mut rag = MockRag::new();
        rag.expect_generate().returning(|_| generated("ok"));

        let router = router(cache, verifier, rag).await;

        router.handle("s5", "Tell me about education loan").await.unwrap();
        router.handle("s5", "rate?").await.unwrap();
        assert_eq!(
            router.store.get_topic("s5").await.unwrap(),
            Some(LoanTopic::Education)
        );

        router.handle("s5", "What about home loan instead?").await.unwrap();
        assert_eq!(
            router.store.get_topic("s5").await.unwrap(),
            Some(LoanTopic::Home)
        );
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let cache = MockCache::new();
        let verifier = MockVerifier::new();
        let rag = MockRag::new();

        let router = router(cache, verifier, rag).await;
        let err = router.handle("s6", "   ").await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
