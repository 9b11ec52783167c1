use async_trait::async_trait;

use crate::error::Result;

/// A single prompt plus sampling limits for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Produces text from a prompt through some external language model.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}
