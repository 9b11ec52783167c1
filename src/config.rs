//! TOML configuration for services, retrieval and the corpus set.
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! the stock BNS / BSA / BNSS setup backed by Gemini.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    data_dir::DataDir,
    error::{Error, Result},
};

pub const CONFIG_ENV_VAR: &str = "VAJRA_CONFIG";

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.0-flash-lite";
pub const DEFAULT_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TOP_K: usize = 3;
pub const MAX_EMBEDDING_RETRIES: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default = "default_corpora", rename = "corpus")]
    pub corpora: Vec<CorpusConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            corpora: default_corpora(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Extra attempts after a transient failure (network, 429, 5xx).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_dimension(),
            base_url: default_base_url(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Drop results whose squared L2 distance exceeds this value. Unset
    /// keeps every top-k hit regardless of how far away it is.
    #[serde(default)]
    pub max_distance: Option<f32>,
    /// Corpus names in the order their context blocks are emitted. Empty
    /// means declaration order.
    #[serde(default)]
    pub priority: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_distance: None,
            priority: Vec::new(),
        }
    }
}

/// One corpus: a JSON entry list paired with its persisted vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusConfig {
    pub name: String,
    /// Short tag used in context blocks, e.g. "BNS".
    pub label: String,
    /// Full statute name used in the prompt persona.
    pub title: String,
    pub entries: PathBuf,
    pub index: PathBuf,
}

impl CorpusConfig {
    fn stock(name: &str, label: &str, title: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            title: title.to_string(),
            entries: PathBuf::from(format!("{name}_data.json")),
            index: PathBuf::from(format!("{name}_index.vjx")),
        }
    }
}

fn default_corpora() -> Vec<CorpusConfig> {
    vec![
        CorpusConfig::stock("bns", "BNS", "Bharatiya Nyaya Sanhita"),
        CorpusConfig::stock("bsa", "BSA", "Bharatiya Sakshya Adhiniyam"),
        CorpusConfig::stock(
            "bnss",
            "BNSS",
            "Bharatiya Nagarik Suraksha Sanhita",
        ),
    ]
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.into()
}
fn default_dimension() -> usize {
    DEFAULT_EMBEDDING_DIMENSION
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_generation_model() -> String {
    DEFAULT_GENERATION_MODEL.into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_output_tokens() -> u32 {
    300
}
fn default_generation_timeout() -> u64 {
    60
}
fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl Config {
    /// Load configuration, in order of priority:
    /// 1. An explicit path (from --config)
    /// 2. The VAJRA_CONFIG environment variable
    /// 3. `config.toml` inside the data directory, if present
    /// 4. Built-in defaults
    pub fn load(explicit: Option<&Path>, data_dir: &DataDir) -> Result<Self> {
        let path = if let Some(path) = explicit {
            Some(path.to_path_buf())
        } else if let Ok(val) = std::env::var(CONFIG_ENV_VAR) {
            Some(PathBuf::from(val))
        } else {
            let candidate = data_dir.config_file();
            candidate.exists().then_some(candidate)
        };

        let config = match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load_from(&path)?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read config {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.corpora.is_empty() {
            return Err(Error::Config("at least one corpus is required".into()));
        }

        let mut seen = HashSet::new();
        for corpus in &self.corpora {
            if corpus.name.is_empty() {
                return Err(Error::Config("corpus name cannot be empty".into()));
            }
            if !seen.insert(corpus.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate corpus name '{}'",
                    corpus.name
                )));
            }
        }

        for name in &self.retrieval.priority {
            if !seen.contains(name.as_str()) {
                return Err(Error::Config(format!(
                    "priority names unknown corpus '{name}'"
                )));
            }
        }

        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be at least 1".into()));
        }
        if let Some(max) = self.retrieval.max_distance
            && (max.is_nan() || max < 0.0)
        {
            return Err(Error::Config(format!(
                "retrieval.max_distance must be non-negative, got {max}"
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be positive".into(),
            ));
        }
        if self.embedding.timeout_secs == 0 {
            return Err(Error::Config(
                "embedding.timeout_secs must be at least 1".into(),
            ));
        }
        if self.generation.timeout_secs == 0 {
            return Err(Error::Config(
                "generation.timeout_secs must be at least 1".into(),
            ));
        }
        if self.embedding.max_retries > MAX_EMBEDDING_RETRIES {
            return Err(Error::Config(format!(
                "embedding.max_retries must be at most {MAX_EMBEDDING_RETRIES}, got {}",
                self.embedding.max_retries
            )));
        }

        Ok(())
    }

    pub fn corpus(&self, name: &str) -> Result<&CorpusConfig> {
        self.corpora
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::NotFound {
                kind: "corpus",
                name: name.to_string(),
            })
    }

    /// Corpus names in context-block order.
    pub fn assembly_order(&self) -> Vec<String> {
        if self.retrieval.priority.is_empty() {
            self.corpora.iter().map(|c| c.name.clone()).collect()
        } else {
            self.retrieval.priority.clone()
        }
    }
}
