use anyhow::{anyhow, Result};
use url::Url;

pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Unified enum to wrap different provider configurations
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    Anthropic(AnthropicProviderConfig),
    Ollama(OllamaProviderConfig),
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAi(c) => &c.model,
            ProviderConfig::Anthropic(c) => &c.model,
            ProviderConfig::Ollama(c) => &c.model,
        }
    }

    /// Reject configurations that could never produce a working client
    pub fn validate(&self) -> Result<()> {
        let (host, model) = match self {
            ProviderConfig::OpenAi(c) => {
                if matches!(&c.api_key, Some(key) if key.trim().is_empty()) {
                    return Err(anyhow!("OpenAI api_key for model '{}' is empty", c.model));
                }
                (&c.host, &c.model)
            }
            ProviderConfig::Anthropic(c) => {
                if c.api_key.trim().is_empty() {
                    return Err(anyhow!("Anthropic api_key for model '{}' is empty", c.model));
                }
                (&c.host, &c.model)
            }
            ProviderConfig::Ollama(c) => (&c.host, &c.model),
        };
        if model.trim().is_empty() {
            return Err(anyhow!("Provider model name must not be empty"));
        }
        Url::parse(host).map_err(|e| anyhow!("Invalid provider host '{}': {}", host, e))?;
        Ok(())
    }
}

/// Any OpenAI compatible chat completions endpoint (OpenAI, Groq, DeepSeek, vLLM, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: Option<i32>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnthropicProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: Option<i32>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OllamaProviderConfig {
    pub host: String,
    pub model: String,
    pub max_tokens: Option<i32>,
    pub timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai(host: &str, api_key: Option<&str>, model: &str) -> ProviderConfig {
        ProviderConfig::OpenAi(OpenAiProviderConfig {
            host: host.to_string(),
            api_key: api_key.map(String::from),
            model: model.to_string(),
            max_tokens: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(openai("https://api.openai.com", Some("sk-test"), "gpt-4o")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        assert!(openai("not a url", Some("sk-test"), "gpt-4o").validate().is_err());
        assert!(openai("https://api.openai.com", Some("  "), "gpt-4o").validate().is_err());
        assert!(openai("https://api.openai.com", None, "").validate().is_err());
    }
}
