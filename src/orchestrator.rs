use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::Serialize;

use crate::{
    assembler::ContextAssembler,
    config::{Config, DEFAULT_TOP_K},
    corpus::Corpus,
    data_dir::DataDir,
    embedder::Embedder,
    error::{Error, Result},
    generator::{GenerationRequest, Generator},
    prompt::{self, Source},
    retriever::{RetrievalContext, Retriever},
};

/// Returned when retrieval finds nothing to ground an answer on.
pub const NO_CONTEXT_MESSAGE: &str =
    "Sorry, I couldn't find relevant legal information for your query.";

/// Retrieval depth and generation limits for [`ResponseOrchestrator`].
#[derive(Debug, Clone)]
pub struct AnswerSettings {
    pub top_k: usize,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub generation_timeout: Duration,
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            temperature: 0.2,
            max_output_tokens: 300,
            generation_timeout: Duration::from_secs(60),
        }
    }
}

impl AnswerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            temperature: config.generation.temperature,
            max_output_tokens: config.generation.max_output_tokens,
            generation_timeout: config.generation.timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Generated,
    NoContext,
    GenerationFailed,
}

/// The text shown to the user plus what it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub outcome: Outcome,
    pub context: RetrievalContext,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub embedding_model: String,
    pub generation_model: String,
    pub corpora: Vec<CorpusStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorpusStatus {
    pub name: String,
    pub label: String,
    pub sections: usize,
    pub dimension: usize,
}

/// Retrieval, context assembly and generation for one question.
pub struct ResponseOrchestrator {
    retriever: Retriever,
    assembler: ContextAssembler,
    generator: Arc<dyn Generator>,
    settings: AnswerSettings,
    titles: HashMap<String, String>,
}

impl ResponseOrchestrator {
    pub fn new(
        retriever: Retriever,
        assembler: ContextAssembler,
        generator: Arc<dyn Generator>,
        settings: AnswerSettings,
    ) -> Self {
        Self {
            retriever,
            assembler,
            generator,
            settings,
            titles: HashMap::new(),
        }
    }

    /// Full statute names keyed by corpus name, used in the prompt persona.
    /// Corpora without a title are introduced by their label.
    pub fn with_titles(mut self, titles: HashMap<String, String>) -> Self {
        self.titles = titles;
        self
    }

    /// Load every configured corpus and wire the pipeline together.
    ///
    /// Any corpus that fails to load aborts construction.
    pub fn from_config(
        config: &Config,
        data_dir: &DataDir,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        if embedder.dimension() != config.embedding.dimension {
            return Err(Error::DimensionMismatch {
                expected: config.embedding.dimension,
                found: embedder.dimension(),
            });
        }

        let corpora = config
            .corpora
            .iter()
            .map(|c| Corpus::from_config(c, data_dir, config.embedding.dimension))
            .collect::<Result<Vec<_>>>()?;

        let retriever = Retriever::new(corpora, embedder)
            .with_max_distance(config.retrieval.max_distance)
            .with_embed_timeout(config.embedding.timeout());
        let titles = config
            .corpora
            .iter()
            .map(|c| (c.name.clone(), c.title.clone()))
            .collect();

        Ok(Self::new(
            retriever,
            ContextAssembler::new(config.assembly_order()),
            generator,
            AnswerSettings::from_config(config),
        )
        .with_titles(titles))
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn settings(&self) -> &AnswerSettings {
        &self.settings
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    pub fn status(&self) -> Status {
        Status {
            embedding_model: self.retriever.embedder().model_id().to_string(),
            generation_model: self.generator.model_id().to_string(),
            corpora: self
                .retriever
                .corpora()
                .iter()
                .map(|c| CorpusStatus {
                    name: c.name().to_string(),
                    label: c.label().to_string(),
                    sections: c.len(),
                    dimension: c.dimension(),
                })
                .collect(),
        }
    }

    /// Answer `query`, returning only the user-facing text.
    pub async fn answer(&self, query: &str) -> String {
        self.respond(query).await.text
    }

    /// Answer `query`, keeping the retrieval context alongside the text.
    ///
    /// Never fails: empty retrieval yields [`NO_CONTEXT_MESSAGE`] without a
    /// generation call, and a failed generation yields a visible error
    /// string.
    pub async fn respond(&self, query: &str) -> Answer {
        let context = self.retriever.search(query, self.settings.top_k).await;

        let Some(grounding) = self.assembler.assemble(&context) else {
            tracing::info!("no relevant sections found, skipping generation");
            return Answer {
                text: NO_CONTEXT_MESSAGE.to_string(),
                outcome: Outcome::NoContext,
                context,
            };
        };

        tracing::debug!(
            sections = context.total_results(),
            "generating grounded answer"
        );
        let prompt = prompt::build_prompt(&self.sources(), &grounding, query);

        match self.generate(prompt).await {
            Ok(text) => Answer {
                text,
                outcome: Outcome::Generated,
                context,
            },
            Err(e) => {
                tracing::error!(error = %e, "generation failed");
                Answer {
                    text: format!("Error generating response: {}", failure_reason(&e)),
                    outcome: Outcome::GenerationFailed,
                    context,
                }
            }
        }
    }

    async fn generate(&self, prompt: String) -> Result<String> {
        let request = GenerationRequest {
            prompt,
            temperature: self.settings.temperature,
            max_output_tokens: self.settings.max_output_tokens,
        };
        let timeout = self.settings.generation_timeout;
        tokio::time::timeout(timeout, self.generator.generate(&request))
            .await
            .map_err(|_| Error::Timeout {
                operation: "generation",
                seconds: timeout.as_secs(),
            })?
    }

    fn sources(&self) -> Vec<Source<'_>> {
        self.retriever
            .corpora()
            .iter()
            .map(|c| Source {
                label: c.label(),
                title: self
                    .titles
                    .get(c.name())
                    .map_or(c.label(), String::as_str),
            })
            .collect()
    }
}

fn failure_reason(error: &Error) -> String {
    match error {
        Error::Generation(reason) => reason.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEmbedder, FakeGenerator, corpus, entry};

    const QUERY: &str = "What is the punishment for theft?";

    fn retriever(embedder: Arc<FakeEmbedder>) -> Retriever {
        Retriever::new(
            vec![
                corpus(
                    "bns",
                    "BNS",
                    vec![
                        (
                            entry("303", "Theft", "Dishonest taking."),
                            vec![1.0, 0.0],
                        ),
                        (
                            entry("309", "Robbery", "Theft with force."),
                            vec![0.8, 0.3],
                        ),
                    ],
                ),
                corpus(
                    "bsa",
                    "BSA",
                    vec![(
                        entry("57", "Primary evidence", "The document."),
                        vec![-1.0, 0.0],
                    )],
                ),
            ],
            embedder,
        )
    }

    fn orchestrator(
        embedder: Arc<FakeEmbedder>,
        generator: Arc<FakeGenerator>,
    ) -> ResponseOrchestrator {
        ResponseOrchestrator::new(
            retriever(embedder),
            ContextAssembler::new(vec!["bns".into(), "bsa".into()]),
            generator,
            AnswerSettings::default(),
        )
    }

    #[tokio::test]
    async fn empty_retrieval_returns_apology_without_generation() {
        let embedder = Arc::new(FakeEmbedder::new(2));
        let generator = Arc::new(FakeGenerator::replying("unused"));
        let orch = orchestrator(embedder, generator.clone());

        let answer = orch.respond(QUERY).await;

        assert_eq!(answer.text, NO_CONTEXT_MESSAGE);
        assert_eq!(answer.outcome, Outcome::NoContext);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn distance_cutoff_can_empty_retrieval() {
        let embedder = Arc::new(FakeEmbedder::new(2).with(QUERY, vec![10.0, 10.0]));
        let generator = Arc::new(FakeGenerator::replying("unused"));
        let orch = ResponseOrchestrator::new(
            retriever(embedder).with_max_distance(Some(1.0)),
            ContextAssembler::default(),
            generator.clone(),
            AnswerSettings::default(),
        );

        assert_eq!(orch.answer(QUERY).await, NO_CONTEXT_MESSAGE);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn generated_text_is_returned_verbatim() {
        let embedder = Arc::new(FakeEmbedder::new(2).with(QUERY, vec![1.0, 0.0]));
        let generator = Arc::new(FakeGenerator::replying(
            "Under Section 303 of the BNS, theft is punishable...",
        ));
        let orch = orchestrator(embedder, generator.clone());

        let answer = orch.respond(QUERY).await;

        assert_eq!(answer.outcome, Outcome::Generated);
        assert_eq!(
            answer.text,
            "Under Section 303 of the BNS, theft is punishable..."
        );
        assert_eq!(generator.calls(), 1);
        assert_eq!(answer.context.get("bns").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn prompt_carries_context_query_and_limits() {
        let embedder = Arc::new(FakeEmbedder::new(2).with(QUERY, vec![1.0, 0.0]));
        let generator = Arc::new(FakeGenerator::replying("ok"));
        let orch = orchestrator(embedder, generator.clone())
            .with_titles(HashMap::from([(
                "bns".to_string(),
                "Bharatiya Nyaya Sanhita".to_string(),
            )]));

        orch.answer(QUERY).await;

        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.max_output_tokens, 300);
        assert!((request.temperature - 0.2).abs() < f32::EPSILON);
        assert!(request.prompt.contains("- Bharatiya Nyaya Sanhita (BNS)"));
        assert!(request.prompt.contains("- BSA (BSA)"));
        assert!(request.prompt.contains(
            "BNS Context:\nSection 303 - Theft: Dishonest taking.\nSection 309 - Robbery: Theft with force."
        ));
        assert!(request.prompt.contains(&format!("User Question: {QUERY}")));
    }

    #[tokio::test]
    async fn generation_failure_is_visible() {
        let embedder = Arc::new(FakeEmbedder::new(2).with(QUERY, vec![1.0, 0.0]));
        let generator = Arc::new(FakeGenerator::failing("API error 403 Forbidden"));
        let orch = orchestrator(embedder, generator.clone());

        let answer = orch.respond(QUERY).await;

        assert_eq!(answer.outcome, Outcome::GenerationFailed);
        assert_eq!(
            answer.text,
            "Error generating response: API error 403 Forbidden"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn generation_timeout_is_reported_as_failure() {
        let embedder = Arc::new(FakeEmbedder::new(2).with(QUERY, vec![1.0, 0.0]));
        let generator = Arc::new(
            FakeGenerator::replying("too late").with_delay(Duration::from_secs(600)),
        );
        let orch = orchestrator(embedder, generator);

        let answer = orch.respond(QUERY).await;

        assert_eq!(answer.outcome, Outcome::GenerationFailed);
        assert_eq!(
            answer.text,
            "Error generating response: generation timed out after 60s"
        );
    }

    #[test]
    fn status_reports_models_and_section_counts() {
        let orch = orchestrator(
            Arc::new(FakeEmbedder::new(2)),
            Arc::new(FakeGenerator::replying("unused")),
        );

        let status = orch.status();
        assert_eq!(status.embedding_model, "fake-embedder");
        assert_eq!(status.generation_model, "fake-generator");
        let counts: Vec<(&str, usize)> = status
            .corpora
            .iter()
            .map(|c| (c.name.as_str(), c.sections))
            .collect();
        assert_eq!(counts, [("bns", 2), ("bsa", 1)]);
    }

    #[test]
    fn from_config_rejects_embedder_of_wrong_dimension() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::resolve(Some(tmp.path())).unwrap();
        let result = ResponseOrchestrator::from_config(
            &Config::default(),
            &data_dir,
            Arc::new(FakeEmbedder::new(2)),
            Arc::new(FakeGenerator::replying("unused")),
        );
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                expected: 768,
                found: 2
            })
        ));
    }

    #[test]
    fn from_config_fails_on_missing_corpus_files() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::resolve(Some(tmp.path())).unwrap();
        let result = ResponseOrchestrator::from_config(
            &Config::default(),
            &data_dir,
            Arc::new(FakeEmbedder::new(768)),
            Arc::new(FakeGenerator::replying("unused")),
        );
        assert!(matches!(
            result,
            Err(Error::MissingData { kind: "entries", .. })
        ));
    }
}
