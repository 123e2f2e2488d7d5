pub mod settings;

pub use settings::{
    ChatConfig, DatabaseConfig, EmbeddingConfig, KnowledgeConfig, LlmConfig, PromptsConfig,
    RagConfig, ServerConfig, Settings,
};
