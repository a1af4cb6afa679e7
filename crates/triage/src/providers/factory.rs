use super::{
    anthropic::AnthropicProvider, base::Provider, configs::ProviderConfig,
    ollama::OllamaProvider, openai::OpenAiProvider,
};
use anyhow::Result;
use std::sync::Arc;
use strum_macros::{Display, EnumIter};

#[derive(EnumIter, Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderType {
    OpenAi,
    Anthropic,
    Ollama,
}

impl From<&ProviderConfig> for ProviderType {
    fn from(config: &ProviderConfig) -> Self {
        match config {
            ProviderConfig::OpenAi(_) => ProviderType::OpenAi,
            ProviderConfig::Anthropic(_) => ProviderType::Anthropic,
            ProviderConfig::Ollama(_) => ProviderType::Ollama,
        }
    }
}

pub fn get_provider(config: ProviderConfig) -> Result<Arc<dyn Provider>> {
    config.validate()?;
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Arc::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Anthropic(anthropic_config) => {
            Ok(Arc::new(AnthropicProvider::new(anthropic_config)?))
        }
        ProviderConfig::Ollama(ollama_config) => Ok(Arc::new(OllamaProvider::new(ollama_config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::configs::{OllamaProviderConfig, DEFAULT_TIMEOUT_SECS};
    use strum::IntoEnumIterator;

    #[test]
    fn test_get_provider_binds_model() -> Result<()> {
        let provider = get_provider(ProviderConfig::Ollama(OllamaProviderConfig {
            host: "http://localhost:11434".to_string(),
            model: "qwen2.5".to_string(),
            max_tokens: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }))?;
        assert_eq!(provider.model(), "qwen2.5");
        Ok(())
    }

    #[test]
    fn test_provider_type_names() {
        let names: Vec<String> = ProviderType::iter().map(|t| t.to_string()).collect();
        assert_eq!(names, vec!["openai", "anthropic", "ollama"]);
    }
}
