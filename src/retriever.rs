use std::{sync::Arc, time::Duration};

use rayon::prelude::*;
use serde::Serialize;

use crate::{
    corpus::{self, Corpus, SearchResult},
    embedder::{Embedder, EmbeddingVector},
    entry::Entry,
    error::{Error, Result},
};

const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Ranked hits from one corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusResults {
    pub corpus: String,
    pub label: String,
    pub results: Vec<SearchResult>,
}

/// Per-corpus results for one query, in the retriever's corpus order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalContext {
    groups: Vec<CorpusResults>,
}

impl RetrievalContext {
    pub fn new(groups: Vec<CorpusResults>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[CorpusResults] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<CorpusResults> {
        self.groups
    }

    /// Results for one corpus, or `None` if it was not searched.
    pub fn get(&self, corpus: &str) -> Option<&[SearchResult]> {
        self.groups
            .iter()
            .find(|g| g.corpus == corpus)
            .map(|g| g.results.as_slice())
    }

    pub fn total_results(&self) -> usize {
        self.groups.iter().map(|g| g.results.len()).sum()
    }

    /// True when no corpus produced any result.
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.results.is_empty())
    }
}

/// Fronts a set of corpora behind a single query embedding.
pub struct Retriever {
    corpora: Vec<Corpus>,
    embedder: Arc<dyn Embedder>,
    max_distance: Option<f32>,
    embed_timeout: Duration,
}

impl Retriever {
    pub fn new(corpora: Vec<Corpus>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            corpora,
            embedder,
            max_distance: None,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
        }
    }

    /// Drop hits farther than `max_distance` (squared L2). `None` disables
    /// the cutoff.
    pub fn with_max_distance(mut self, max_distance: Option<f32>) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn corpora(&self) -> &[Corpus] {
        &self.corpora
    }

    pub fn corpus(&self, name: &str) -> Option<&Corpus> {
        self.corpora.iter().find(|c| c.name() == name)
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Embed `query` once and search every corpus for its top `k` entries.
    ///
    /// If the query cannot be embedded, every corpus comes back with no
    /// results rather than an error.
    pub async fn search(&self, query: &str, k: usize) -> RetrievalContext {
        match self.embed_query(query).await {
            Ok(embedding) => self.search_embedding(&embedding, k),
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed, no retrieval possible");
                self.empty_context()
            }
        }
    }

    /// Search every corpus with an already computed query embedding.
    pub fn search_embedding(
        &self,
        embedding: &EmbeddingVector,
        k: usize,
    ) -> RetrievalContext {
        let groups = self
            .corpora
            .par_iter()
            .map(|corpus| {
                let results = corpus
                    .search(embedding, k, self.max_distance)
                    .unwrap_or_else(|e| {
                        tracing::warn!(
                            corpus = corpus.name(),
                            error = %e,
                            "corpus search failed"
                        );
                        Vec::new()
                    });
                tracing::debug!(
                    corpus = corpus.name(),
                    hits = results.len(),
                    "searched corpus"
                );
                CorpusResults {
                    corpus: corpus.name().to_string(),
                    label: corpus.label().to_string(),
                    results,
                }
            })
            .collect();

        RetrievalContext::new(groups)
    }

    /// Case-insensitive substring matches, at most `limit` per corpus.
    ///
    /// Restricting to a corpus that is not loaded is a `NotFound` error.
    pub fn find(
        &self,
        term: &str,
        only: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(&Corpus, Vec<&Entry>)>> {
        corpus::find_in(&self.corpora, term, only, limit)
    }

    async fn embed_query(&self, query: &str) -> Result<EmbeddingVector> {
        let embedding =
            tokio::time::timeout(self.embed_timeout, self.embedder.embed(query))
                .await
                .map_err(|_| Error::Timeout {
                    operation: "query embedding",
                    seconds: self.embed_timeout.as_secs(),
                })??;
        embedding.check_dimension(self.embedder.dimension())?;
        Ok(embedding)
    }

    fn empty_context(&self) -> RetrievalContext {
        RetrievalContext::new(
            self.corpora
                .iter()
                .map(|c| CorpusResults {
                    corpus: c.name().to_string(),
                    label: c.label().to_string(),
                    results: Vec::new(),
                })
                .collect(),
        )
    }
}
