pub mod embedding_service;
pub mod intent;
pub mod knowledge_box;
pub mod llm_service;
pub mod rag_service;
pub mod resolver;
pub mod verifier;

pub use embedding_service::EmbeddingService;
pub use knowledge_box::KnowledgeBox;
pub use llm_service::LlmService;
pub use rag_service::RagService;
pub use resolver::CacheResolver;
pub use verifier::RelevanceVerifier;
