//! Generative language model provider trait.
//!
//! Concrete implementations (OpenAI chat completions, Ollama, Gemini) live
//! in the `docqa` app crate.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;
    /// Generate a completion for `prompt`. A `temperature` of `0.0`
    /// requests deterministic decoding.
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String>;
}
