use super::intent::router::{GenerateAnswer, GeneratedAnswer};
use super::{EmbeddingService, LlmService};
use crate::config::RagConfig;
use crate::models::chat::ChatMessage;
use crate::utils::similarity::cosine_similarity;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Friendly, non-technical source label. File names never reach the UI.
pub const SOURCE_LABEL: &str = "Lora Finance Company Policies and Documents";

/// Fixed user-safe response when generation fails internally.
pub const FALLBACK_RESPONSE: &str =
    "I encountered an error while retrieving information. Please contact customer care.";

struct IndexedChunk {
    content: String,
    embedding: Vec<f32>,
}

/// Retrieval-augmented generation over the TXT policy corpus.
///
/// TXT documents are the authoritative knowledge source; the knowledge box
/// is only a cache in front of this engine. Chunks are embedded once at
/// startup into an in-memory index. Failures never cross the `generate`
/// boundary: every turn gets either a grounded answer or the fixed
/// fallback string.
pub struct RagService {
    embedding_service: Arc<EmbeddingService>,
    llm_service: Arc<LlmService>,
    config: RagConfig,
    chunks: Vec<IndexedChunk>,
}

impl RagService {
    pub async fn build(
        embedding_service: Arc<EmbeddingService>,
        llm_service: Arc<LlmService>,
        config: RagConfig,
    ) -> Result<Self> {
        let texts = load_txt_files(Path::new(&config.documents_dir));

        let mut pieces = Vec::new();
        for text in &texts {
            pieces.extend(chunk_text(text, config.chunk_size, config.chunk_overlap));
        }

        if pieces.is_empty() {
            warn!(
                "No TXT documents found under {}, RAG index is empty",
                config.documents_dir
            );
        }

        let embeddings = embedding_service
            .embed_batch(&pieces)
            .await
            .context("Failed to embed document chunks")?;

        let chunks: Vec<IndexedChunk> = pieces
            .into_iter()
            .zip(embeddings)
            .map(|(content, embedding)| IndexedChunk { content, embedding })
            .collect();

        info!(
            "RAG index ready: {} chunks from {} document(s)",
            chunks.len(),
            texts.len()
        );

        Ok(Self {
            embedding_service,
            llm_service,
            config,
            chunks,
        })
    }

    /// Top-k chunk contents by cosine similarity against the query.
    fn retrieve(&self, query_embedding: &[f32]) -> Vec<&str> {
        let mut scored: Vec<(f32, &str)> = self
            .chunks
            .iter()
            .filter_map(|chunk| {
                cosine_similarity(query_embedding, &chunk.embedding)
                    .ok()
                    .map(|score| (score, chunk.content.as_str()))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(self.config.retrieval_top_k)
            .map(|(_, content)| content)
            .collect()
    }

    fn build_context(&self, chunks: &[&str]) -> String {
        if chunks.is_empty() {
            return String::from("No relevant excerpts were found in the documents.");
        }

        let mut context = String::from("Relevant document excerpts:\n\n");
        for (i, chunk) in chunks.iter().enumerate() {
            context.push_str(chunk);
            context.push_str("\n\n");

            if context.len() > self.config.max_context_length {
                debug!(
                    "Context truncated at {} chunks (max length: {})",
                    i + 1,
                    self.config.max_context_length
                );
                break;
            }
        }

        context
    }

    async fn answer(&self, full_prompt: &str) -> Result<String> {
        let query_embedding = self.embedding_service.embed(full_prompt).await?;
        let retrieved = self.retrieve(&query_embedding);
        let context = self.build_context(&retrieved);

        let system = format!(
            "Answer strictly from the document excerpts below. If the excerpts do not \
             contain the answer, say the information is not available in our documents. \
             Never invent facts.\n\n{}",
            context
        );

        let text = self
            .llm_service
            .generate_chat(vec![
                ChatMessage::system(system),
                ChatMessage::user(full_prompt),
            ])
            .await?;

        if text.trim().is_empty() {
            anyhow::bail!("empty completion from LLM");
        }

        Ok(text.trim().to_string())
    }
}

#[async_trait::async_trait]
impl GenerateAnswer for RagService {
    /// The prompt already carries system rules, session context and the
    /// effective question. Never raises past this boundary.
    async fn generate(&self, full_prompt: &str) -> GeneratedAnswer {
        match self.answer(full_prompt).await {
            Ok(text) => GeneratedAnswer {
                text,
                sources: vec![SOURCE_LABEL.to_string()],
            },
            Err(e) => {
                error!("RAG query failed: {}", e);
                GeneratedAnswer {
                    text: FALLBACK_RESPONSE.to_string(),
                    sources: Vec::new(),
                }
            }
        }
    }
}

fn load_txt_files(dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read documents dir {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut texts = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => texts.push(text.trim().to_string()),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable file {}: {}", path.display(), e),
        }
    }
    texts
}

/// Fixed-size character windows with overlap between consecutive chunks.
fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total_len = chars.len();
    let mut chunks = Vec::new();

    if total_len == 0 || chunk_size == 0 {
        return chunks;
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut start = 0;

    while start < total_len {
        let end = std::cmp::min(start + chunk_size, total_len);
        chunks.push(chars[start..end].iter().collect());

        if end >= total_len {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text_respects_size_and_overlap() {
        let text = "abcdefghij"; // 10 chars
        let chunks = chunk_text(text, 4, 1);

        assert_eq!(chunks[0], "abcd");
        assert_eq!(chunks[1], "defg");
        assert_eq!(chunks[2], "ghij");
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_chunk_text_short_input_is_single_chunk() {
        assert_eq!(chunk_text("ab", 512, 50), vec!["ab".to_string()]);
        assert!(chunk_text("", 512, 50).is_empty());
    }

    #[test]
    fn test_chunk_text_never_loops_on_large_overlap() {
        let chunks = chunk_text("abcdef", 3, 5);
        assert!(chunks.len() <= 6);
        assert_eq!(chunks[0], "abc");
    }
}
