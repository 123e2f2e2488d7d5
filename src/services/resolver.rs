use super::intent::QuestionPolicy;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Best cached match for a question, with its raw similarity score.
#[derive(Debug, Clone)]
pub struct CacheMatch {
    pub answer: String,
    pub score: f32,
}

/// Semantic Q&A cache collaborator.
#[async_trait::async_trait]
pub trait CacheLookup: Send + Sync {
    async fn lookup(&self, question: &str) -> Result<Option<CacheMatch>>;
}

/// Relevance verifier collaborator. `None` is a definitive "do not use the
/// cached answer this turn" signal, never retried.
#[async_trait::async_trait]
pub trait VerifyAnswer: Send + Sync {
    async fn verify(&self, question: &str, candidate_answer: &str) -> Result<Option<String>>;
}

/// Two-stage gate deciding whether a cached answer may be reused without
/// generation: a similarity threshold followed by independent relevance
/// verification. Embedding similarity alone produces false positives on
/// short finance questions, so the verifier has the final word.
pub struct CacheResolver {
    cache: Arc<dyn CacheLookup>,
    verifier: Arc<dyn VerifyAnswer>,
    policy: Arc<QuestionPolicy>,
    similarity_threshold: f32,
}

impl CacheResolver {
    pub fn new(
        cache: Arc<dyn CacheLookup>,
        verifier: Arc<dyn VerifyAnswer>,
        policy: Arc<QuestionPolicy>,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            cache,
            verifier,
            policy,
            similarity_threshold,
        }
    }

    /// Resolve a question from cache, or `None` when no safe cached answer
    /// exists and the caller must fall through to generation.
    ///
    /// Collaborator failures are logged and degrade to `None`: a broken
    /// cache must never be fatal to the turn.
    pub async fn resolve(&self, question: &str) -> Option<String> {
        if self.policy.is_vague(question) {
            debug!("Question is vague, skipping cache lookup");
            return None;
        }

        let candidate = match self.cache.lookup(question).await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache lookup failed, falling through to generation: {}", e);
                return None;
            }
        };

        if candidate.score < self.similarity_threshold {
            debug!(
                "Best cache score {:.4} below threshold {:.2}",
                candidate.score, self.similarity_threshold
            );
            return None;
        }

        match self.verifier.verify(question, &candidate.answer).await {
            Ok(Some(refined)) => {
                info!("Cache hit confirmed (score {:.4})", candidate.score);
                Some(refined)
            }
            Ok(None) => {
                info!(
                    "Verifier rejected cached answer (score {:.4})",
                    candidate.score
                );
                None
            }
            Err(e) => {
                warn!("Verification failed, falling through to generation: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn resolver(cache: MockCache, verifier: MockVerifier) -> CacheResolver {
        CacheResolver::new(
            Arc::new(cache),
            Arc::new(verifier),
            Arc::new(QuestionPolicy::default()),
            0.80,
        )
    }

    #[tokio::test]
    async fn test_vague_question_never_touches_cache() {
        let mut cache = MockCache::new();
        cache.expect_lookup().times(0);
        let mut verifier = MockVerifier::new();
        verifier.expect_verify().times(0);

        // "interest" could be a literal cache key; it still must not resolve
        let resolved = resolver(cache, verifier).resolve("interest").await;
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn test_below_threshold_yields_none() {
        let mut cache = MockCache::new();
        cache.expect_lookup().returning(|_| {
            Ok(Some(CacheMatch {
                answer: "Gold loan rate is 9%.".to_string(),
                score: 0.62,
            }))
        });
        let mut verifier = MockVerifier::new();
        verifier.expect_verify().times(0);

        let resolved = resolver(cache, verifier)
            .resolve("what is the gold loan interest rate?")
            .await;
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn test_verified_hit_returns_refined_answer() {
        let mut cache = MockCache::new();
        cache
            .expect_lookup()
            .with(eq("what is the gold loan interest rate?"))
            .returning(|_| {
                Ok(Some(CacheMatch {
                    answer: "Gold loan rate is 9% per annum.".to_string(),
                    score: 0.91,
                }))
            });
        let mut verifier = MockVerifier::new();
        verifier
            .expect_verify()
            .returning(|_, answer| Ok(Some(answer.to_string())));

        let resolved = resolver(cache, verifier)
            .resolve("what is the gold loan interest rate?")
            .await;
        assert_eq!(resolved, Some("Gold loan rate is 9% per annum.".to_string()));
    }

    #[tokio::test]
    async fn test_verifier_rejection_is_definitive() {
        let mut cache = MockCache::new();
        cache.expect_lookup().returning(|_| {
            Ok(Some(CacheMatch {
                answer: "Personal loan needs PAN and Aadhaar.".to_string(),
                score: 0.95,
            }))
        });
        let mut verifier = MockVerifier::new();
        verifier.expect_verify().times(1).returning(|_, _| Ok(None));

        let resolved = resolver(cache, verifier)
            .resolve("can I prepay my personal loan early?")
            .await;
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn test_cache_failure_degrades_to_none() {
        let mut cache = MockCache::new();
        cache
            .expect_lookup()
            .returning(|_| Err(anyhow::anyhow!("cache offline")));
        let mut verifier = MockVerifier::new();
        verifier.expect_verify().times(0);

        let resolved = resolver(cache, verifier)
            .resolve("what documents are needed for a home loan?")
            .await;
        assert_eq!(resolved, None);
    }
}
