//! LLM client factory.

use crate::config::LlmConfig;
use crate::error::{DataVizError, Result};
use crate::llm::{LlmClient, LlmProvider, MockLlmClient, OpenAiClient, OpenAiConfig};

/// Creates an LLM client from configuration.
///
/// For OpenAI the key is resolved from `api_key`, then `OPENAI_API_KEY`.
pub fn create_client(config: &LlmConfig, api_key: Option<String>) -> Result<Box<dyn LlmClient>> {
    match config.provider.parse::<LlmProvider>()? {
        LlmProvider::OpenAi => {
            let key = api_key
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| DataVizError::config("No API key configured. Set OPENAI_API_KEY."))?;
            Ok(Box::new(OpenAiClient::new(OpenAiConfig::new(
                key,
                config.model.clone(),
            ))?))
        }
        LlmProvider::Mock => Ok(Box::new(MockLlmClient::new())),
    }
}
