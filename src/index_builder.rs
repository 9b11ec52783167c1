//! Offline index construction: entry list in, persisted vector index out.

use kdam::{BarExt, tqdm};

use crate::{
    config::CorpusConfig,
    data_dir::DataDir,
    embedder::Embedder,
    entry::load_entries,
    error::Result,
    vector_index::VectorIndex,
};

/// Embed every entry of one corpus and persist the resulting index.
///
/// Entries are embedded one at a time in file order, so index position `i`
/// always belongs to entry `i`. The first embedding failure aborts the
/// build and leaves any existing index file untouched.
///
/// Returns the number of indexed entries.
pub async fn build_corpus_index(
    corpus: &CorpusConfig,
    data_dir: &DataDir,
    embedder: &dyn Embedder,
) -> Result<usize> {
    let entries_path = data_dir.corpus_file(&corpus.entries);
    let index_path = data_dir.corpus_file(&corpus.index);
    let entries = load_entries(&entries_path)?;

    tracing::info!(
        corpus = corpus.name.as_str(),
        sections = entries.len(),
        model = embedder.model_id(),
        "embedding corpus"
    );

    let mut pb = tqdm!(
        total = entries.len(),
        desc = format!("Embedding {}", corpus.label),
        unit = " sections"
    );

    let mut vectors = Vec::with_capacity(entries.len());
    for entry in &entries {
        let vector = embedder.embed(&entry.embedding_text()).await?;
        vectors.push(vector);
        pb.update(1)?;
    }
    pb.refresh()?;
    eprintln!();

    let index = VectorIndex::build(embedder.dimension(), vectors)?;
    index.save(&index_path)?;

    tracing::info!(
        corpus = corpus.name.as_str(),
        path = %index_path.display(),
        "saved index"
    );
    Ok(index.len())
}
