use crate::config::EmbeddingConfig;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    content: String,
    input: String, // some servers expect "input", send both
}

/// Client for a llama.cpp-style embedding server.
#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    base_url: String,
    dimension: usize,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url,
            dimension: config.dimension,
        }
    }

    /// Generate an embedding for a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        let request = EmbeddingRequest {
            content: text.to_string(),
            input: text.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/embedding", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let json_value: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embedding = Self::extract_embedding(&json_value)
            .with_context(|| format!("Unrecognized embedding response format: {}", json_value))?;

        if embedding.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            );
        }

        Ok(embedding)
    }

    /// Generate embeddings for a batch of texts, one request per text.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Accepts llama.cpp `{"embedding": [...]}`, OpenAI `{"data":
    /// [{"embedding": [...]}]}` and bare-array variants.
    fn extract_embedding(value: &serde_json::Value) -> Option<Vec<f32>> {
        let floats = |arr: &Vec<serde_json::Value>| -> Vec<f32> {
            arr.iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect()
        };

        let embedding = if let Some(arr) = value.get("embedding").and_then(|v| v.as_array()) {
            floats(arr)
        } else if let Some(first) = value
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
        {
            floats(first.get("embedding")?.as_array()?)
        } else if let Some(arr) = value.as_array() {
            match arr.first() {
                Some(first) if first.is_object() => {
                    floats(first.get("embedding")?.as_array()?)
                }
                Some(_) => floats(arr),
                None => return None,
            }
        } else {
            return None;
        };

        if embedding.is_empty() {
            None
        } else {
            Some(embedding)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_llama_cpp_format() {
        let value = json!({ "embedding": [0.1, 0.2, 0.3] });
        let embedding = EmbeddingService::extract_embedding(&value).unwrap();
        assert_eq!(embedding.len(), 3);
    }

    #[test]
    fn test_extract_openai_format() {
        let value = json!({ "data": [{ "embedding": [0.5, 0.6] }] });
        let embedding = EmbeddingService::extract_embedding(&value).unwrap();
        assert_eq!(embedding, vec![0.5, 0.6]);
    }

    #[test]
    fn test_extract_bare_array() {
        let value = json!([0.1, 0.2]);
        assert_eq!(
            EmbeddingService::extract_embedding(&value),
            Some(vec![0.1, 0.2])
        );
    }

    #[test]
    fn test_extract_rejects_unknown_shape() {
        let value = json!({ "foo": "bar" });
        assert_eq!(EmbeddingService::extract_embedding(&value), None);
    }
}
