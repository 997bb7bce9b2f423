use async_trait::async_trait;

use crate::chat::ChatMessage;
use crate::errors::GatewayError;

/// Sampling parameters for a single generation call.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.0,
        }
    }
}

/// Trait implemented by each text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn generate(
        &self,
        system: &str,
        messages: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<String, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_options_defaults() {
        let opts = GenerateOptions::default();
        assert_eq!(opts.max_tokens, 1024);
        assert_eq!(opts.temperature, 0.0);
    }
}
