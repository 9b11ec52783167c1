//! vajra - grounded question answering over Indian criminal law.
//!
//! Three legal codes, the Bharatiya Nyaya Sanhita (BNS), the Bharatiya
//! Sakshya Adhiniyam (BSA) and the Bharatiya Nagarik Suraksha Sanhita
//! (BNSS), are each held as a [`Corpus`]: an ordered list of sections paired
//! with an exhaustive squared-L2 [`VectorIndex`] over their embeddings.
//!
//! A question is embedded once, every corpus is searched in parallel, the
//! hits are merged into labeled context blocks by the [`ContextAssembler`],
//! and a [`Generator`] writes the answer from that context alone. When
//! nothing relevant is retrieved no generation call is made.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vajra::{Config, DataDir, ResponseOrchestrator};
//! use vajra::gemini::{GeminiEmbedder, GeminiGenerator};
//!
//! # async fn run() -> vajra::Result<()> {
//! let data_dir = DataDir::resolve(None)?;
//! let config = Config::load(None, &data_dir)?;
//!
//! let embedder = Arc::new(GeminiEmbedder::from_env(&config.embedding)?);
//! let generator = Arc::new(GeminiGenerator::from_env(&config.generation)?);
//! let orchestrator =
//!     ResponseOrchestrator::from_config(&config, &data_dir, embedder, generator)?;
//!
//! println!("{}", orchestrator.answer("What is the punishment for theft?").await);
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod data_dir;
pub mod embedder;
pub mod entry;
pub mod error;
pub mod gemini;
pub mod generator;
pub mod index_builder;
pub mod mcp;
pub mod orchestrator;
pub mod prompt;
pub mod retriever;
pub mod vector_index;

#[cfg(test)]
mod testing;

pub use assembler::ContextAssembler;
pub use config::Config;
pub use corpus::{Corpus, SearchResult};
pub use data_dir::DataDir;
pub use embedder::{Embedder, EmbeddingVector};
pub use entry::Entry;
pub use error::{Error, Result};
pub use generator::{GenerationRequest, Generator};
pub use orchestrator::{NO_CONTEXT_MESSAGE, ResponseOrchestrator};
pub use retriever::{RetrievalContext, Retriever};
pub use vector_index::{Neighbor, VectorIndex};
