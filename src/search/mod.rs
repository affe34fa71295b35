//! Read path: similarity retrieval plus generative relevance filtering.
//!
//! - `searcher`: embeds the query and ranks stored vectors
//! - `relevance`: narrows the ranked candidates with a chat model

pub mod relevance;
pub mod searcher;

pub use relevance::RelevanceFilter;
pub use searcher::SimilaritySearcher;

/// Default number of hits returned by a similarity search.
pub const DEFAULT_LIMIT: usize = 10;

/// Default minimum cosine similarity for a hit to qualify.
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.5;
