//! The request entry point. `Triage::generate` plans the request, runs the
//! augmentation stages the plan (and the caller) asked for, then executes the
//! final completion on the chosen model's fallback chain.
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::conversation::Conversation;
use crate::errors::{TriageError, TriageResult};
use crate::execution::{execute_eager, execute_stream, select_final_model, FinalRequest};
use crate::files::FileReferences;
use crate::models::message::Message;
use crate::pipeline::{AugmentationPipeline, StageFlags};
use crate::planner::{PlanOverrides, Planner};
use crate::providers::base::{CompletionOptions, Provider};
use crate::registry::ModelRegistry;
use crate::result::RequestResult;
use crate::services::{
    EmbeddingCapability, EmbeddingParams, EmbeddingResponse, MediaCapability, SearchCapability,
};
use crate::tools::{ToolSpec, Toolbox};

/// What the caller wants answered
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    /// A single user turn
    Text(String),
    Messages(Vec<Message>),
}

impl Prompt {
    fn into_messages(self) -> Vec<Message> {
        match self {
            Prompt::Text(text) => vec![Message::user().with_text(text)],
            Prompt::Messages(messages) => messages,
        }
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

impl From<Vec<Message>> for Prompt {
    fn from(messages: Vec<Message>) -> Self {
        Prompt::Messages(messages)
    }
}

/// Parameters of one `generate` call. The optional flags override the
/// planner when set.
#[derive(Clone)]
pub struct GenerateParams {
    pub prompt: Prompt,
    pub system: Option<String>,
    pub schema: Option<Value>,
    pub stream: bool,
    pub reasoning: Option<bool>,
    pub use_web_search: Option<bool>,
    pub auto_tool: Option<bool>,
    pub multi_model: Option<bool>,
    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
    pub extra_tools: Vec<Arc<dyn ToolSpec>>,
}

impl GenerateParams {
    pub fn new<P: Into<Prompt>>(prompt: P) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            schema: None,
            stream: false,
            reasoning: None,
            use_web_search: None,
            auto_tool: None,
            multi_model: None,
            temperature: None,
            top_k: None,
            top_p: None,
            extra_tools: Vec::new(),
        }
    }

    pub fn with_system<S: Into<String>>(mut self, system: S) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn with_reasoning(mut self, enabled: bool) -> Self {
        self.reasoning = Some(enabled);
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.use_web_search = Some(enabled);
        self
    }

    pub fn with_auto_tool(mut self, enabled: bool) -> Self {
        self.auto_tool = Some(enabled);
        self
    }

    pub fn with_multi_model(mut self, enabled: bool) -> Self {
        self.multi_model = Some(enabled);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn ToolSpec>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    fn overrides(&self) -> PlanOverrides {
        PlanOverrides {
            web_search: self.use_web_search,
            reasoning: self.reasoning,
            tools: self.auto_tool,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            schema: self.schema.clone(),
            ..Default::default()
        }
    }
}

pub struct Triage {
    registry: Arc<ModelRegistry>,
    planner: Planner,
    pipeline: AugmentationPipeline,
    toolbox: Toolbox,
    embeddings: Arc<dyn EmbeddingCapability>,
    reasoning_default: Option<String>,
}

impl Triage {
    pub fn builder(registry: ModelRegistry) -> TriageBuilder {
        TriageBuilder {
            registry,
            planner_chain: Vec::new(),
            tool_chain: Vec::new(),
            reasoning_chain: Vec::new(),
            search: None,
            media: None,
            embeddings: None,
            reasoning_default: None,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn toolbox(&self) -> &Toolbox {
        &self.toolbox
    }

    pub async fn generate(&self, params: GenerateParams) -> TriageResult<RequestResult> {
        if let Some(schema) = &params.schema {
            jsonschema::validator_for(schema).map_err(|e| {
                TriageError::InvalidParameters(format!("Invalid JSON schema: {}", e))
            })?;
        }

        let overrides = params.overrides();
        let options = params.options();
        let system = params.system.unwrap_or_default();
        let toolbox = self.toolbox.extended(params.extra_tools);

        let mut conversation = Conversation::new(params.prompt.into_messages());
        let latest = conversation
            .last()
            .cloned()
            .ok_or_else(|| TriageError::InvalidParameters("prompt has no turns".to_string()))?;
        let files = FileReferences::from_message(&latest);

        let decision = self
            .planner
            .plan(&self.registry, &toolbox.names(), &latest)
            .await?
            .with_overrides(&overrides);
        let flags = StageFlags::resolve(&decision, params.multi_model, params.stream);
        debug!(target: "triage::pipeline", ?flags, "stages resolved");

        let augmentation = self
            .pipeline
            .run(&self.registry, &mut conversation, flags, &toolbox, &files, &system)
            .await?;

        let model = select_final_model(
            &self.registry,
            &decision.model,
            augmentation.reasoning_text.is_some(),
            self.reasoning_default.as_deref(),
        )?;
        let chain = self.registry.fallback_chain(&model)?;
        let request = FinalRequest {
            system: &system,
            messages: conversation.messages(),
            options,
        };

        let (model, output) = if params.stream {
            execute_stream(&chain, &request).await?
        } else {
            execute_eager(&chain, &request).await?
        };
        info!(
            target: "triage::execution",
            model = %model,
            stream = params.stream,
            tools = augmentation.tool_used.len(),
            "request answered"
        );

        RequestResult::builder(model)
            .augmentation(augmentation)
            .output(output)
            .build()
    }

    pub async fn embedding(&self, params: EmbeddingParams) -> TriageResult<EmbeddingResponse> {
        self.embeddings
            .embed(&params)
            .await
            .map_err(TriageError::service)
    }
}

pub struct TriageBuilder {
    registry: ModelRegistry,
    planner_chain: Vec<Arc<dyn Provider>>,
    tool_chain: Vec<Arc<dyn Provider>>,
    reasoning_chain: Vec<Arc<dyn Provider>>,
    search: Option<Arc<dyn SearchCapability>>,
    media: Option<Arc<dyn MediaCapability>>,
    embeddings: Option<Arc<dyn EmbeddingCapability>>,
    reasoning_default: Option<String>,
}

impl TriageBuilder {
    /// The planner model followed by its substitutes
    pub fn planner(mut self, chain: Vec<Arc<dyn Provider>>) -> Self {
        self.planner_chain = chain;
        self
    }

    pub fn tool_models(mut self, chain: Vec<Arc<dyn Provider>>) -> Self {
        self.tool_chain = chain;
        self
    }

    pub fn reasoning_models(mut self, chain: Vec<Arc<dyn Provider>>) -> Self {
        self.reasoning_chain = chain;
        self
    }

    pub fn search(mut self, search: Arc<dyn SearchCapability>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn media(mut self, media: Arc<dyn MediaCapability>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn embeddings(mut self, embeddings: Arc<dyn EmbeddingCapability>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Final model used when reasoning context is present and the planned
    /// model's context window is too small for it
    pub fn reasoning_default<S: Into<String>>(mut self, id: S) -> Self {
        self.reasoning_default = Some(id.into());
        self
    }

    pub fn build(self) -> TriageResult<Triage> {
        let missing = |what: &str| TriageError::Config(format!("{} is not configured", what));
        for (name, chain) in [
            ("planner", &self.planner_chain),
            ("tool sub-run", &self.tool_chain),
            ("reasoning", &self.reasoning_chain),
        ] {
            if chain.is_empty() {
                return Err(TriageError::Config(format!("{} model chain is empty", name)));
            }
        }
        if let Some(id) = &self.reasoning_default {
            self.registry.lookup(id)?;
        }

        let search = self.search.ok_or_else(|| missing("search"))?;
        let media = self.media.ok_or_else(|| missing("media"))?;
        let embeddings = self.embeddings.ok_or_else(|| missing("embeddings"))?;

        Ok(Triage {
            toolbox: Toolbox::builtin(Arc::clone(&search), media),
            pipeline: AugmentationPipeline::new(search, self.tool_chain, self.reasoning_chain),
            planner: Planner::new(self.planner_chain),
            registry: Arc::new(self.registry),
            embeddings,
            reasoning_default: self.reasoning_default,
        })
    }
}
