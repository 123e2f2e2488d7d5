use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub knowledge: KnowledgeConfig,
    pub rag: RagConfig,
    pub chat: ChatConfig,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub dimension: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KnowledgeConfig {
    /// Path to the Q&A workbook. A missing file disables the knowledge box.
    pub workbook_path: String,
    pub sheet: String,
    pub similarity_threshold: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RagConfig {
    pub documents_dir: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_top_k: usize,
    pub max_context_length: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChatConfig {
    /// Number of history messages rendered into the prompt (oldest-first).
    pub history_window: usize,
    /// Sessions idle longer than this are purged at request entry.
    pub session_ttl_minutes: i64,
    /// Generic single-topic tokens that make a question vague on their own.
    #[serde(default = "default_vague_tokens")]
    pub vague_tokens: Vec<String>,
}

fn default_vague_tokens() -> Vec<String> {
    ChatConfig::default_vague_tokens()
}

impl ChatConfig {
    pub fn default_vague_tokens() -> Vec<String> {
        [
            "documents",
            "eligibility",
            "criteria",
            "rate",
            "interest",
            "repayment",
            "charges",
            "fees",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    pub system_prompt: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}
