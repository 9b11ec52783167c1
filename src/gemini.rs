//! Gemini REST clients for embeddings and text generation.
//!
//! Both talk to the `generativelanguage.googleapis.com` v1beta surface and
//! authenticate with an API key taken from `GOOGLE_API_KEY` (or
//! `GEMINI_API_KEY`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    config::{EmbeddingConfig, GenerationConfig},
    embedder::{Embedder, EmbeddingVector},
    error::{Error, Result},
    generator::{GenerationRequest, Generator},
};

pub const API_KEY_ENV_VARS: &[&str] = &["GOOGLE_API_KEY", "GEMINI_API_KEY"];

const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Resolve the API key from the environment.
pub fn api_key_from_env() -> Result<String> {
    API_KEY_ENV_VARS
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .ok_or_else(|| {
            Error::Config(format!(
                "no Gemini API key: set {}",
                API_KEY_ENV_VARS.join(" or ")
            ))
        })
}

#[derive(Clone)]
struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }

    async fn post<B, R>(&self, url: &str, body: &B) -> std::result::Result<R, CallError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| CallError::transient(format!("request to {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = format!("API error {status}: {text}");
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                CallError::transient(message)
            } else {
                CallError::fatal(message)
            });
        }

        resp.json::<R>()
            .await
            .map_err(|e| CallError::fatal(format!("malformed response: {e}")))
    }
}

#[derive(Debug)]
struct CallError {
    message: String,
    transient: bool,
}

impl CallError {
    fn transient(message: String) -> Self {
        Self {
            message,
            transient: true,
        }
    }

    fn fatal(message: String) -> Self {
        Self {
            message,
            transient: false,
        }
    }
}

// -- Embeddings --

#[derive(Debug, Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

/// Embedder backed by the Gemini `embedContent` endpoint.
pub struct GeminiEmbedder {
    http: GeminiClient,
    model: String,
    dimension: usize,
    max_retries: u32,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            http: GeminiClient::new(&config.base_url, api_key, config.timeout())?,
            model: config.model.clone(),
            dimension: config.dimension,
            max_retries: config.max_retries,
        })
    }

    pub fn from_env(config: &EmbeddingConfig) -> Result<Self> {
        Self::new(config, api_key_from_env()?)
    }

    async fn embed_once(&self, text: &str) -> std::result::Result<Vec<f32>, CallError> {
        let body = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![TextPart { text }],
            },
        };
        let url = self.http.endpoint(&self.model, "embedContent");
        let resp: EmbedContentResponse = self.http.post(&url, &body).await?;
        Ok(resp.embedding.values)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        if text.trim().is_empty() {
            return Err(Error::Embedding("cannot embed empty text".into()));
        }

        let mut attempt = 0;
        let values = loop {
            match self.embed_once(text).await {
                Ok(values) => break values,
                Err(e) if e.transient && attempt < self.max_retries => {
                    let delay = RETRY_BASE_DELAY
                        .saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "embedding request failed, retrying: {}",
                        e.message
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(Error::Embedding(e.message)),
            }
        };

        let vector = EmbeddingVector::new(values);
        vector.check_dimension(self.dimension)?;
        Ok(vector)
    }
}

// -- Generation --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationSettings,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationSettings {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if it has any.
    fn text(self) -> Option<String> {
        let parts = self.candidates.into_iter().next()?.content?.parts;
        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

/// Generator backed by the Gemini `generateContent` endpoint.
pub struct GeminiGenerator {
    http: GeminiClient,
    model: String,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            http: GeminiClient::new(&config.base_url, api_key, config.timeout())?,
            model: config.model.clone(),
        })
    }

    pub fn from_env(config: &GenerationConfig) -> Result<Self> {
        Self::new(config, api_key_from_env()?)
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![TextPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationSettings {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };
        let url = self.http.endpoint(&self.model, "generateContent");

        let resp: GenerateContentResponse = self
            .http
            .post(&url, &body)
            .await
            .map_err(|e| Error::Generation(e.message))?;

        resp.text()
            .ok_or_else(|| Error::Generation("response contained no text".into()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use serde_json::json;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    use super::*;

    #[test]
    fn embed_request_shape() {
        let body = EmbedContentRequest {
            model: "models/text-embedding-004".into(),
            content: Content {
                parts: vec![TextPart { text: "theft" }],
            },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "model": "models/text-embedding-004",
                "content": { "parts": [{ "text": "theft" }] }
            })
        );
    }

    #[test]
    fn embed_response_parses_values() {
        let resp: EmbedContentResponse = serde_json::from_value(json!({
            "embedding": { "values": [0.25, -0.5, 1.0] }
        }))
        .unwrap();
        assert_eq!(resp.embedding.values, vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn generate_request_uses_camel_case_config() {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![TextPart { text: "prompt" }],
            }],
            generation_config: GenerationSettings {
                temperature: 0.5,
                max_output_tokens: 300,
            },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "contents": [{ "parts": [{ "text": "prompt" }] }],
                "generationConfig": { "temperature": 0.5, "maxOutputTokens": 300 }
            })
        );
    }

    #[test]
    fn generate_response_joins_first_candidate_parts() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [
                    { "text": "Theft is " },
                    { "text": "covered by Section 303." }
                ] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(resp.text().as_deref(), Some("Theft is covered by Section 303."));
    }

    #[test]
    fn generate_response_without_candidates_has_no_text() {
        let resp: GenerateContentResponse =
            serde_json::from_value(json!({ "promptFeedback": { "blockReason": "SAFETY" } }))
                .unwrap();
        assert_eq!(resp.text(), None);
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client = GeminiClient::new(
            "https://example.test/v1beta/",
            "key".into(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.endpoint("text-embedding-004", "embedContent"),
            "https://example.test/v1beta/models/text-embedding-004:embedContent"
        );
    }

    #[tokio::test]
    async fn embed_rejects_empty_text_without_network() {
        let embedder =
            GeminiEmbedder::new(&EmbeddingConfig::default(), "key".into()).unwrap();
        assert!(matches!(
            embedder.embed("   ").await,
            Err(Error::Embedding(_))
        ));
    }

    /// Serves `responses` in order, one per connection, then answers 500.
    /// Returns the base URL and a counter of requests received.
    async fn serve(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                read_request(&mut socket).await;
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let reply = responses
                    .get(n)
                    .cloned()
                    .unwrap_or_else(|| http_response(500, ""));
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}/v1beta"), hits)
    }

    /// Consume the request head and its body.
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            let Some(head_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let body_len = text[..head_end]
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + body_len {
                return;
            }
        }
    }

    fn http_response(status: u16, body: &str) -> String {
        format!(
            "HTTP/1.1 {status} Status\r\ncontent-type: application/json\r\n\
             content-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn embedding_body(values: &[f32]) -> String {
        json!({ "embedding": { "values": values } }).to_string()
    }

    fn embedder_at(
        base_url: &str,
        dimension: usize,
        max_retries: u32,
    ) -> GeminiEmbedder {
        let config = EmbeddingConfig {
            base_url: base_url.to_string(),
            dimension,
            max_retries,
            ..EmbeddingConfig::default()
        };
        GeminiEmbedder::new(&config, "key".into()).unwrap()
    }

    #[tokio::test]
    async fn embed_retries_server_errors_until_success() {
        let (url, hits) = serve(vec![
            http_response(503, ""),
            http_response(503, ""),
            http_response(200, &embedding_body(&[0.5, -1.0, 2.0])),
        ])
        .await;

        let vector = embedder_at(&url, 3, 2).embed("theft").await.unwrap();
        assert_eq!(vector.as_slice(), &[0.5, -1.0, 2.0]);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn embed_does_not_retry_client_errors() {
        let (url, hits) =
            serve(vec![http_response(403, r#"{"error":"forbidden"}"#)]).await;

        let err = embedder_at(&url, 3, 2).embed("theft").await.unwrap_err();
        match err {
            Error::Embedding(message) => assert!(message.contains("403")),
            other => panic!("expected Embedding error, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn embed_gives_up_after_max_retries() {
        let (url, hits) = serve(vec![
            http_response(503, ""),
            http_response(503, ""),
            http_response(503, ""),
        ])
        .await;

        let err = embedder_at(&url, 3, 1).embed("theft").await.unwrap_err();
        assert!(matches!(err, Error::Embedding(ref m) if m.contains("503")));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn embed_rejects_wrong_dimension() {
        let (url, hits) =
            serve(vec![http_response(200, &embedding_body(&[1.0, 2.0]))]).await;

        let err = embedder_at(&url, 3, 2).embed("theft").await.unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                found: 2
            }
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generate_returns_candidate_text() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Section 303." }] } }]
        })
        .to_string();
        let (url, hits) = serve(vec![http_response(200, &body)]).await;

        let config = GenerationConfig {
            base_url: url,
            ..GenerationConfig::default()
        };
        let generator = GeminiGenerator::new(&config, "key".into()).unwrap();
        let request = GenerationRequest {
            prompt: "What is theft?".into(),
            temperature: 0.5,
            max_output_tokens: 300,
        };
        assert_eq!(generator.generate(&request).await.unwrap(), "Section 303.");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generate_does_not_retry_server_errors() {
        let (url, hits) = serve(vec![http_response(500, "boom")]).await;

        let config = GenerationConfig {
            base_url: url,
            ..GenerationConfig::default()
        };
        let generator = GeminiGenerator::new(&config, "key".into()).unwrap();
        let request = GenerationRequest {
            prompt: "What is theft?".into(),
            temperature: 0.5,
            max_output_tokens: 300,
        };
        let err = generator.generate(&request).await.unwrap_err();
        assert!(matches!(err, Error::Generation(ref m) if m.contains("500")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
