//! Layered settings: built-in defaults, then an optional TOML file, then
//! `TRIAGE_*` environment variables.
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::errors::{TriageError, TriageResult};
use crate::orchestrator::Triage;
use crate::providers::anthropic::ANTHROPIC_HOST;
use crate::providers::base::Provider;
use crate::providers::configs::{
    AnthropicProviderConfig, OllamaProviderConfig, OpenAiProviderConfig, ProviderConfig,
    DEFAULT_TIMEOUT_SECS,
};
use crate::providers::factory;
use crate::providers::ollama::OLLAMA_HOST;
use crate::registry::{FileType, ModelDescriptor, ModelRegistry};
use crate::services::client::{ServiceClient, ServiceClientConfig, SERVICES_HOST};

pub const ENV_PREFIX: &str = "TRIAGE";
/// Environment variable naming an explicit settings file
pub const CONFIG_PATH_VAR: &str = "TRIAGE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "triage";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration, set {env_var} or add it to the settings file")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

impl From<ConfigError> for TriageError {
    fn from(err: ConfigError) -> Self {
        TriageError::Config(err.to_string())
    }
}

/// `services.api_key` becomes `TRIAGE_SERVICES__API_KEY`
pub fn to_env_var(field: &str) -> String {
    format!("{}_{}", ENV_PREFIX, field.replace('.', "__").to_uppercase())
}

/// The dotted path of a serde "missing field" message, when it is one
fn missing_field_path(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let (field, rest) = rest.split_once('`')?;
    let key = rest
        .split_once("for key `")
        .and_then(|(_, key)| key.split_once('`'))
        .map(|(key, _)| key)
        .filter(|key| !key.is_empty());
    Some(match key {
        Some(key) => format!("{}.{}", key, field),
        None => field.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        #[serde(default)]
        api_key: Option<String>,
        /// Provider side model name, the registry id when absent
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        max_tokens: Option<i32>,
        #[serde(default = "default_timeout")]
        timeout_secs: u64,
    },
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        api_key: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        max_tokens: Option<i32>,
        #[serde(default = "default_timeout")]
        timeout_secs: u64,
    },
    Ollama {
        #[serde(default = "default_ollama_host")]
        host: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        max_tokens: Option<i32>,
        #[serde(default = "default_timeout")]
        timeout_secs: u64,
    },
}

impl ProviderSettings {
    pub fn into_config(self, id: &str) -> ProviderConfig {
        let name = |model: Option<String>| model.unwrap_or_else(|| id.to_string());
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                max_tokens,
                timeout_secs,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model: name(model),
                max_tokens,
                timeout_secs,
            }),
            ProviderSettings::Anthropic {
                host,
                api_key,
                model,
                max_tokens,
                timeout_secs,
            } => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key,
                model: name(model),
                max_tokens,
                timeout_secs,
            }),
            ProviderSettings::Ollama {
                host,
                model,
                max_tokens,
                timeout_secs,
            } => ProviderConfig::Ollama(OllamaProviderConfig {
                host,
                model: name(model),
                max_tokens,
                timeout_secs,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelSettings {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_rank")]
    pub speed_rank: u32,
    #[serde(default = "default_rank")]
    pub capability_rank: u32,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default)]
    pub file_types: BTreeSet<FileType>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub fallback: Option<String>,
    pub provider: ProviderSettings,
}

impl ModelSettings {
    fn into_descriptor(self) -> TriageResult<ModelDescriptor> {
        let provider = factory::get_provider(self.provider.into_config(&self.id)).map_err(|e| {
            TriageError::Config(format!("model '{}': {:#}", self.id, e))
        })?;
        let mut descriptor = ModelDescriptor::new(self.id, provider)
            .with_description(self.description)
            .with_ranks(self.speed_rank, self.capability_rank)
            .with_context_window(self.context_window)
            .with_file_types(self.file_types)
            .with_tags(self.tags);
        if let Some(fallback) = self.fallback {
            descriptor = descriptor.with_fallback(fallback);
        }
        Ok(descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServicesSettings {
    #[serde(default = "default_services_host")]
    pub host: String,
    pub api_key: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Registry ids of a stage's model followed by its substitutes
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChainSettings {
    #[serde(default)]
    pub models: Vec<String>,
}

impl ChainSettings {
    fn resolve(&self, stage: &str, registry: &ModelRegistry) -> TriageResult<Vec<Arc<dyn Provider>>> {
        self.models
            .iter()
            .map(|id| {
                registry
                    .lookup(id)
                    .map(|model| Arc::clone(&model.provider))
                    .map_err(|_| {
                        TriageError::Config(format!("{} chain names unknown model '{}'", stage, id))
                    })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExecutionSettings {
    #[serde(default)]
    pub reasoning_default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub services: ServicesSettings,
    pub models: Vec<ModelSettings>,
    #[serde(default)]
    pub planner: ChainSettings,
    #[serde(default)]
    pub tools: ChainSettings,
    #[serde(default)]
    pub reasoning: ChainSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(&layered()?)
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let result: Result<Self, config::ConfigError> = config.clone().try_deserialize();
        result.map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            if let Some(field) = missing_field_path(&err.to_string()) {
                return ConfigError::MissingEnvVar {
                    env_var: to_env_var(&field),
                };
            }
            match err {
                config::ConfigError::NotFound(field) => ConfigError::MissingEnvVar {
                    env_var: to_env_var(&field),
                },
                other => ConfigError::Other(other),
            }
        })
    }

    pub fn registry(&self) -> TriageResult<ModelRegistry> {
        let models = self
            .models
            .iter()
            .cloned()
            .map(ModelSettings::into_descriptor)
            .collect::<TriageResult<Vec<_>>>()?;
        ModelRegistry::new(models)
    }

    /// Build the orchestrator: providers, registry, stage chains and the
    /// service client behind search, media and embeddings
    pub fn build(&self) -> TriageResult<Triage> {
        let registry = self.registry()?;
        let planner = self.planner.resolve("planner", &registry)?;
        let tools = self.tools.resolve("tools", &registry)?;
        let reasoning = self.reasoning.resolve("reasoning", &registry)?;

        let services = Arc::new(
            ServiceClient::new(ServiceClientConfig {
                host: self.services.host.clone(),
                api_key: self.services.api_key.clone(),
                timeout_secs: self.services.timeout_secs,
            })
            .map_err(|e| TriageError::Config(format!("{:#}", e)))?,
        );

        let mut builder = Triage::builder(registry)
            .planner(planner)
            .tool_models(tools)
            .reasoning_models(reasoning)
            .search(services.clone())
            .media(services.clone())
            .embeddings(services);
        if let Some(id) = &self.execution.reasoning_default {
            builder = builder.reasoning_default(id.clone());
        }
        builder.build()
    }
}

/// Defaults, then `$TRIAGE_CONFIG` (required when set) or `./triage.toml`
/// (optional), then the environment
pub fn layered() -> Result<Config, ConfigError> {
    let file = match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) => File::from(PathBuf::from(path)).required(true),
        Err(_) => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };
    let config = Config::builder()
        .set_default("services.host", SERVICES_HOST)?
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    Ok(config)
}

fn default_rank() -> u32 {
    1
}

fn default_context_window() -> u32 {
    128_000
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_services_host() -> String {
    SERVICES_HOST.to_string()
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_anthropic_host() -> String {
    ANTHROPIC_HOST.to_string()
}

fn default_ollama_host() -> String {
    OLLAMA_HOST.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    const SETTINGS: &str = r#"
[services]
api_key = "svc-key"

[[models]]
id = "fast"
speed_rank = 1
capability_rank = 3
context_window = 8000
fallback = "deep"
provider = { type = "ollama" }

[[models]]
id = "deep"
description = "Slow and thorough"
speed_rank = 3
capability_rank = 1
file_types = ["image", "pdf"]
provider = { type = "openai", api_key = "sk-test", model = "gpt-4o" }

[planner]
models = ["fast", "deep"]

[tools]
models = ["deep"]

[reasoning]
models = ["deep"]

[execution]
reasoning_default = "deep"
"#;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("TRIAGE_") {
                env::remove_var(&key);
            }
        }
    }

    fn settings_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_settings_from_file() {
        clean_env();
        let file = settings_file(SETTINGS);
        env::set_var(CONFIG_PATH_VAR, file.path());

        let settings = Settings::new().unwrap();
        assert_eq!(settings.services.host, SERVICES_HOST);
        assert_eq!(settings.services.api_key, "svc-key");
        assert_eq!(settings.models.len(), 2);
        assert_eq!(settings.models[0].fallback.as_deref(), Some("deep"));
        assert_eq!(
            settings.models[1].file_types,
            BTreeSet::from([FileType::Image, FileType::Pdf])
        );
        assert_eq!(settings.planner.models, vec!["fast", "deep"]);
        assert_eq!(settings.execution.reasoning_default.as_deref(), Some("deep"));

        let registry = settings.registry().unwrap();
        assert_eq!(registry.ids(), vec!["fast".to_string(), "deep".to_string()]);
        assert_eq!(registry.lookup("fast").unwrap().provider.model(), "fast");
        assert_eq!(registry.lookup("deep").unwrap().provider.model(), "gpt-4o");
        assert!(settings.build().is_ok());

        clean_env();
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        let file = settings_file(SETTINGS);
        env::set_var(CONFIG_PATH_VAR, file.path());
        env::set_var("TRIAGE_SERVICES__API_KEY", "from-env");
        env::set_var("TRIAGE_SERVICES__HOST", "http://localhost:9000");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.services.api_key, "from-env");
        assert_eq!(settings.services.host, "http://localhost:9000");

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_api_key_names_variable() {
        clean_env();
        let file = settings_file(&SETTINGS.replace("api_key = \"svc-key\"", ""));
        env::set_var(CONFIG_PATH_VAR, file.path());

        match Settings::new() {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert!(env_var.starts_with("TRIAGE_"));
                assert!(env_var.ends_with("API_KEY"));
            }
            other => panic!("expected a missing variable error, got {:?}", other),
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_chain_with_unknown_model_is_rejected() {
        clean_env();
        let file = settings_file(&SETTINGS.replace(
            "[tools]\nmodels = [\"deep\"]",
            "[tools]\nmodels = [\"missing\"]",
        ));
        env::set_var(CONFIG_PATH_VAR, file.path());

        let settings = Settings::new().unwrap();
        let err = settings.build().err().unwrap();
        assert!(matches!(err, TriageError::Config(msg) if msg.contains("missing")));

        clean_env();
    }

    #[test]
    fn test_missing_field_path() {
        assert_eq!(
            missing_field_path("missing field `api_key` for key `services`").as_deref(),
            Some("services.api_key")
        );
        assert_eq!(missing_field_path("missing field `models`").as_deref(), Some("models"));
        assert_eq!(missing_field_path("invalid type: string"), None);
        assert_eq!(to_env_var("services.api_key"), "TRIAGE_SERVICES__API_KEY");
    }
}
