//! In-process stand-ins for the external services, used by unit tests.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    corpus::Corpus,
    embedder::{Embedder, EmbeddingVector},
    entry::Entry,
    error::{Error, Result},
    generator::{GenerationRequest, Generator},
    vector_index::VectorIndex,
};

/// Embeds known texts to fixed vectors and anything else to `fallback`.
pub struct FakeEmbedder {
    dimension: usize,
    known: HashMap<String, Vec<f32>>,
    fallback: Option<Vec<f32>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            known: HashMap::new(),
            fallback: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.known.insert(text.to_string(), vector);
        self
    }

    pub fn with_fallback(mut self, vector: Vec<f32>) -> Self {
        self.fallback = Some(vector);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str {
        "fake-embedder"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.known
            .get(text)
            .or(self.fallback.as_ref())
            .cloned()
            .map(EmbeddingVector::new)
            .ok_or_else(|| Error::Embedding(format!("no vector for '{text}'")))
    }
}

/// Records prompts and replies with a canned answer or error.
pub struct FakeGenerator {
    reply: std::result::Result<String, String>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<GenerationRequest>>,
}

impl FakeGenerator {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    fn model_id(&self) -> &str {
        "fake-generator"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.prompts.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(Error::Generation)
    }
}

pub fn entry(number: &str, title: &str, description: &str) -> Entry {
    Entry {
        section_number: number.into(),
        section_title: title.into(),
        description: description.into(),
    }
}

/// Build an in-memory corpus from `(entry, vector)` pairs.
pub fn corpus(name: &str, label: &str, rows: Vec<(Entry, Vec<f32>)>) -> Corpus {
    let dimension = rows.first().map_or(2, |(_, v)| v.len());
    let (entries, vectors): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .map(|(e, v)| (e, EmbeddingVector::new(v)))
        .unzip();
    let index = VectorIndex::build(dimension, vectors).unwrap();
    Corpus::from_parts(name, label, entries, index).unwrap()
}
