use super::resolver::{CacheLookup, CacheMatch};
use super::EmbeddingService;
use crate::config::KnowledgeConfig;
use crate::utils::similarity::cosine_similarity;
use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct QaEntry {
    question: String,
    answer: String,
    embedding: Vec<f32>,
}

/// Semantic cache over the curated Q&A workbook.
///
/// The workbook is a token-saving cache only; the TXT corpus behind the RAG
/// engine stays the primary knowledge source. Question embeddings are
/// computed once at startup. A missing workbook disables the cache and
/// every lookup returns no match.
pub struct KnowledgeBox {
    entries: Vec<QaEntry>,
    embedding_service: Arc<EmbeddingService>,
}

impl KnowledgeBox {
    pub async fn load(
        config: &KnowledgeConfig,
        embedding_service: Arc<EmbeddingService>,
    ) -> Result<Self> {
        let path = Path::new(&config.workbook_path);

        if !path.exists() {
            warn!(
                "Knowledge workbook {} not found, knowledge box disabled",
                config.workbook_path
            );
            return Ok(Self {
                entries: Vec::new(),
                embedding_service,
            });
        }

        let pairs = read_qa_sheet(path, &config.sheet)?;
        info!(
            "Loaded {} Q&A pairs from {}",
            pairs.len(),
            config.workbook_path
        );

        let questions: Vec<String> = pairs.iter().map(|(q, _)| q.clone()).collect();
        let embeddings = embedding_service
            .embed_batch(&questions)
            .await
            .context("Failed to embed knowledge-box questions")?;

        let entries = pairs
            .into_iter()
            .zip(embeddings)
            .map(|((question, answer), embedding)| QaEntry {
                question,
                answer,
                embedding,
            })
            .collect();

        Ok(Self {
            entries,
            embedding_service,
        })
    }

    pub fn is_enabled(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait::async_trait]
impl CacheLookup for KnowledgeBox {
    /// Best semantic match with its raw cosine score; threshold gating is
    /// the resolver's job.
    async fn lookup(&self, question: &str) -> Result<Option<CacheMatch>> {
        if self.entries.is_empty() {
            return Ok(None);
        }

        let query_embedding = self.embedding_service.embed(question).await?;

        let mut best: Option<(&QaEntry, f32)> = None;
        for entry in &self.entries {
            let score = cosine_similarity(&query_embedding, &entry.embedding)?;
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((entry, score)),
            }
        }

        Ok(best.map(|(entry, score)| {
            debug!(
                "Best knowledge-box match '{}' (score {:.4})",
                entry.question, score
            );
            CacheMatch {
                answer: entry.answer.clone(),
                score,
            }
        }))
    }
}

/// Read (question, answer) pairs from the workbook sheet. The first row is
/// treated as a header when it names the columns; otherwise the first two
/// columns are used as-is.
fn read_qa_sheet(path: &Path, sheet: &str) -> Result<Vec<(String, String)>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;

    let range = workbook
        .worksheet_range(sheet)
        .with_context(|| format!("Worksheet '{}' not found", sheet))?;

    let cell_text = |cell: &Data| -> Option<String> {
        match cell {
            Data::String(s) => Some(s.trim().to_string()),
            Data::Int(i) => Some(i.to_string()),
            Data::Float(f) => Some(f.to_string()),
            _ => None,
        }
    };

    let (question_col, answer_col, header_consumed) = match range.rows().next() {
        Some(first_row) => {
            let headers: Vec<Option<String>> = first_row
                .iter()
                .map(|c| cell_text(c).map(|s| s.to_lowercase()))
                .collect();
            let find = |name: &str| {
                headers
                    .iter()
                    .position(|h| h.as_deref() == Some(name))
            };
            match (find("question"), find("answer")) {
                (Some(q), Some(a)) => (q, a, true),
                _ => (0, 1, false),
            }
        }
        None => return Ok(Vec::new()),
    };

    let mut pairs = Vec::new();
    let data_rows = range.rows().skip(if header_consumed { 1 } else { 0 });

    for row in data_rows {
        let question = row.get(question_col).and_then(&cell_text);
        let answer = row.get(answer_col).and_then(&cell_text);

        if let (Some(question), Some(answer)) = (question, answer) {
            if !question.is_empty() && !answer.is_empty() {
                pairs.push((question, answer));
            }
        }
    }

    Ok(pairs)
}
