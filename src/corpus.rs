use std::path::Path;

use serde::Serialize;

use crate::{
    config::CorpusConfig,
    data_dir::DataDir,
    embedder::EmbeddingVector,
    entry::{Entry, load_entries},
    error::{Error, Result},
    vector_index::VectorIndex,
};

/// A search hit inside one corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub entry: Entry,
    /// Raw squared Euclidean distance between the query and this entry's
    /// embedding. **Lower means more relevant**; this is not a similarity
    /// and is not normalized.
    pub relevance_score: f32,
}

/// One legal code: its ordered sections paired with their vector index.
///
/// Entry `i` is the entry whose embedding sits at index position `i`. The
/// pairing is checked whenever a corpus is constructed and the two halves
/// are never handed out mutably.
#[derive(Debug)]
pub struct Corpus {
    name: String,
    label: String,
    entries: Vec<Entry>,
    index: VectorIndex,
}

impl Corpus {
    /// Pair entries with an index, failing if their lengths differ.
    pub fn from_parts(
        name: impl Into<String>,
        label: impl Into<String>,
        entries: Vec<Entry>,
        index: VectorIndex,
    ) -> Result<Self> {
        let name = name.into();
        if entries.len() != index.len() {
            return Err(Error::StructuralMismatch {
                corpus: name,
                entries: entries.len(),
                vectors: index.len(),
            });
        }
        Ok(Self {
            name,
            label: label.into(),
            entries,
            index,
        })
    }

    /// Load a corpus from its entry list and persisted index.
    pub fn load(
        name: &str,
        label: &str,
        entries_path: &Path,
        index_path: &Path,
        expected_dimension: usize,
    ) -> Result<Self> {
        let entries = load_entries(entries_path)?;
        let index = VectorIndex::load(index_path, expected_dimension)?;
        let corpus = Self::from_parts(name, label, entries, index)?;
        tracing::info!(corpus = name, sections = corpus.len(), "loaded corpus");
        Ok(corpus)
    }

    /// Load a configured corpus, resolving its paths against `data_dir`.
    pub fn from_config(
        config: &CorpusConfig,
        data_dir: &DataDir,
        expected_dimension: usize,
    ) -> Result<Self> {
        Self::load(
            &config.name,
            &config.label,
            &data_dir.corpus_file(&config.entries),
            &data_dir.corpus_file(&config.index),
            expected_dimension,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// The entry at an index position.
    ///
    /// # Panics
    ///
    /// Panics if `position` is out of range. Positions come from this
    /// corpus's own index, so that only happens on a logic error.
    pub fn lookup(&self, position: usize) -> &Entry {
        &self.entries[position]
    }

    /// Top-`k` entries by distance to `query`, closest first.
    ///
    /// With `max_distance` set, hits farther than it are dropped.
    pub fn search(
        &self,
        query: &EmbeddingVector,
        k: usize,
        max_distance: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        let neighbors = self.index.search(query, k)?;
        Ok(neighbors
            .into_iter()
            .filter(|n| max_distance.is_none_or(|max| n.distance <= max))
            .map(|n| SearchResult {
                entry: self.lookup(n.position).clone(),
                relevance_score: n.distance,
            })
            .collect())
    }

    /// Entries whose title or description contains `term`, ignoring case.
    pub fn find(&self, term: &str) -> Vec<&Entry> {
        let needle = term.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.matches_lowercase(&needle))
            .collect()
    }
}

/// Case-insensitive substring matches across `corpora`, at most `limit` per
/// corpus. `only` restricts the lookup to one corpus by name.
pub fn find_in<'a>(
    corpora: &'a [Corpus],
    term: &str,
    only: Option<&str>,
    limit: usize,
) -> Result<Vec<(&'a Corpus, Vec<&'a Entry>)>> {
    if let Some(name) = only
        && !corpora.iter().any(|c| c.name() == name)
    {
        return Err(Error::NotFound {
            kind: "corpus",
            name: name.to_string(),
        });
    }

    Ok(corpora
        .iter()
        .filter(|c| only.is_none_or(|name| c.name() == name))
        .map(|c| {
            let mut hits = c.find(term);
            hits.truncate(limit);
            (c, hits)
        })
        .collect())
}
