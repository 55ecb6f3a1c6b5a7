use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use dealforge_core::RetrievedFragment;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("retrieval backend unavailable: {0}")]
    Unavailable(String),
}

/// Looks up proposal-relevant fragments for a free-text query. Empty
/// results are a valid answer, not an error.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedFragment>, RetrievalError>;
}

/// Deterministic keyword retriever over an in-process document set. Scores
/// by token overlap between the query and each document, which is enough
/// for tests and for running without a vector backend.
#[derive(Default)]
pub struct InMemoryRetriever {
    documents: Vec<(String, String)>,
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 2)
        .map(|token| token.to_lowercase())
        .collect()
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: Vec<(String, String)>) -> Self {
        Self { documents }
    }

    pub fn add_document(&mut self, source_id: impl Into<String>, text: impl Into<String>) {
        self.documents.push((source_id.into(), text.into()));
    }
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedFragment>, RetrievalError> {
        let query_terms = tokens(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut fragments: Vec<RetrievedFragment> = self
            .documents
            .iter()
            .filter_map(|(source_id, text)| {
                let document_terms = tokens(text);
                let overlap = query_terms.intersection(&document_terms).count();
                (overlap > 0).then(|| RetrievedFragment {
                    text: text.clone(),
                    source_id: source_id.clone(),
                    score: overlap as f64 / query_terms.len() as f64,
                })
            })
            .collect();

        fragments.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        fragments.truncate(k);
        Ok(fragments)
    }
}
