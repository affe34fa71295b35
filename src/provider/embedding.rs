//! Embedding model client.
//!
//! Wraps an OpenAI-compatible `/embeddings` endpoint behind the
//! `EmbeddingProvider` trait. Calls have a hard timeout and bounded
//! retries with backoff; long inputs can be split into overlapping
//! chunks with `chunk_text` and embedded piecewise via `embed_chunked`.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::provider::{http_client, with_retry, ProviderError};

pub trait EmbeddingProvider: Send + Sync {
    /// Vector length this model produces.
    fn dimensions(&self) -> usize;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed several texts, one vector per input, order preserved.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

pub struct OpenAiEmbeddings {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    max_retries: u32,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddings {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        dimensions: usize,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            dimensions,
            max_retries,
        })
    }

    fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": inputs }))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let body: EmbeddingsResponse = response.json()?;
        if body.data.len() != inputs.len() {
            return Err(ProviderError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                body.data.len()
            )));
        }

        // The API may reorder items; `index` is authoritative.
        let mut items = body.data;
        items.sort_by_key(|item| item.index);

        let mut vectors = Vec::with_capacity(items.len());
        for item in items {
            if item.embedding.len() != self.dimensions {
                return Err(ProviderError::MalformedResponse(format!(
                    "expected {}-dimensional vector, got {}",
                    self.dimensions,
                    item.embedding.len()
                )));
            }
            vectors.push(item.embedding);
        }
        Ok(vectors)
    }
}

impl EmbeddingProvider for OpenAiEmbeddings {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        // The embedding model treats newlines as strong separators.
        let input = text.replace('\n', " ");
        let mut vectors = self.embed_batch(&[input])?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::MalformedResponse("no embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        with_retry("embeddings", self.max_retries, || self.request(texts))
    }
}

/// Split `text` into overlapping chunks of at most `max_len` characters.
///
/// Chunk `i` starts at `i * (max_len - overlap)`; the final partial chunk
/// is kept as-is. Offsets are in characters, not bytes, so multi-byte
/// input never splits a codepoint.
pub fn chunk_text(text: &str, max_len: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![];
    }
    let step = max_len.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_len).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Embed a long text chunk by chunk, returning each chunk paired with its
/// vector so the caller can pick an aggregation policy.
pub fn embed_chunked(
    provider: &dyn EmbeddingProvider,
    text: &str,
    max_len: usize,
    overlap: usize,
) -> Result<Vec<(String, Vec<f32>)>, ProviderError> {
    let chunks = chunk_text(text, max_len, overlap);
    let vectors = provider.embed_batch(&chunks)?;
    Ok(chunks.into_iter().zip(vectors).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello world", 1000, 200);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 1000, 200).is_empty());
    }

    #[test]
    fn chunks_start_at_stride_offsets() {
        let text: String = ('a'..='z').collect();
        let chunks = chunk_text(&text, 10, 4);

        // stride 6: offsets 0, 6, 12, 18, 24
        assert_eq!(chunks[0], "abcdefghij");
        assert_eq!(chunks[1], "ghijklmnop");
        assert_eq!(chunks[2], "mnopqrstuv");
        assert_eq!(chunks[3], "stuvwxyz");
        assert_eq!(chunks.len(), 4);
    }

    #[test]
    fn overlap_repeats_tail_of_previous_chunk() {
        let chunks = chunk_text("0123456789", 6, 2);
        assert_eq!(chunks, vec!["012345", "456789"]);
    }

    #[test]
    fn multibyte_text_splits_on_codepoints() {
        let text = "héllо wörld çüé".repeat(10);
        let chunks = chunk_text(&text, 20, 5);
        let reassembled: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert!(reassembled >= text.chars().count());
        for chunk in chunks {
            assert!(chunk.chars().count() <= 20);
        }
    }

    #[test]
    fn response_items_are_reordered_by_index() {
        let raw = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let parsed: EmbeddingsResponse = serde_json::from_value(raw).unwrap();
        let mut items = parsed.data;
        items.sort_by_key(|item| item.index);
        assert_eq!(items[0].embedding, vec![1.0, 0.0]);
        assert_eq!(items[1].embedding, vec![0.0, 1.0]);
    }
}
