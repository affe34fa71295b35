//! Query-time similarity search.

use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::provider::EmbeddingProvider;
use crate::store::{SearchHit, Store};

/// Embeds query text and ranks stored talent vectors against it.
///
/// An empty result is a normal outcome, not a failure. `candidates`
/// restricts the search to a caller-supplied id set (e.g. talents
/// already associated with one organisation).
pub struct SimilaritySearcher {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    limit: usize,
    min_similarity: f64,
}

impl SimilaritySearcher {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        limit: usize,
        min_similarity: f64,
    ) -> Self {
        Self {
            store,
            embedder,
            limit,
            min_similarity,
        }
    }

    pub fn search(&self, query: &str, candidates: Option<&[i64]>) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CoreError::InvalidInput(
                "query must not be blank".to_string(),
            ));
        }

        let vector = self.embedder.embed(query)?;
        let hits =
            self.store
                .query_vectors(&vector, candidates, self.limit, self.min_similarity)?;
        log::debug!("query {query:?}: {} hit(s)", hits.len());
        Ok(hits)
    }
}
