//! Augmentation stages that run between planning and final generation.
//!
//! Stages run strictly in order: web search, tool sub-run, reasoning, then the
//! multi-model cross-check. Each one that runs inserts a synthetic user turn
//! just before the caller's final turn, so later stages and the final model see
//! it as prior context.
pub mod cross_check;
pub mod reasoning;
pub mod tool_run;
pub mod web_search;

use std::sync::Arc;
use tracing::debug;

use crate::conversation::Conversation;
use crate::errors::TriageResult;
use crate::files::FileReferences;
use crate::planner::PlanDecision;
use crate::providers::base::Provider;
use crate::registry::ModelRegistry;
use crate::services::SearchCapability;
use crate::tools::{GeneratedArtifact, ToolInvocation, Toolbox};

/// Which stages run for one request, after caller overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageFlags {
    pub web_search: bool,
    pub tools: bool,
    pub reasoning: bool,
    pub cross_check: bool,
}

impl StageFlags {
    /// `decision` must already carry the caller overrides. The cross-check has
    /// no planner flag, it only runs when asked for and never while streaming.
    pub fn resolve(decision: &PlanDecision, multi_model: Option<bool>, streaming: bool) -> Self {
        Self {
            web_search: decision.web_search,
            tools: decision.tools,
            reasoning: decision.reasoning,
            cross_check: multi_model.unwrap_or(false) && !streaming,
        }
    }
}

/// What the stages produced besides conversation turns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Augmentation {
    pub tool_used: Vec<ToolInvocation>,
    pub generated_artifacts: Vec<GeneratedArtifact>,
    pub reasoning_text: Option<String>,
}

pub struct AugmentationPipeline {
    search: Arc<dyn SearchCapability>,
    tool_chain: Vec<Arc<dyn Provider>>,
    reasoning_chain: Vec<Arc<dyn Provider>>,
}

impl AugmentationPipeline {
    pub fn new(
        search: Arc<dyn SearchCapability>,
        tool_chain: Vec<Arc<dyn Provider>>,
        reasoning_chain: Vec<Arc<dyn Provider>>,
    ) -> Self {
        Self {
            search,
            tool_chain,
            reasoning_chain,
        }
    }

    pub async fn run(
        &self,
        registry: &ModelRegistry,
        conversation: &mut Conversation,
        flags: StageFlags,
        toolbox: &Toolbox,
        files: &FileReferences,
        system: &str,
    ) -> TriageResult<Augmentation> {
        let mut augmentation = Augmentation::default();

        if flags.web_search {
            match conversation.latest_text() {
                Some(query) => {
                    let record = web_search::run(self.search.as_ref(), &query).await?;
                    conversation.insert_context(format!("Web search result: {}", record.result));
                    augmentation.tool_used.push(record);
                }
                None => debug!(target: "triage::pipeline", "web search skipped, latest turn has no text"),
            }
        } else {
            debug!(target: "triage::pipeline", "web search disabled");
        }

        if flags.tools {
            let output = tool_run::run(&self.tool_chain, toolbox, conversation, files).await?;
            conversation.insert_context(format!("Tool result: {}", output.text));
            augmentation.tool_used.extend(output.records);
            augmentation.generated_artifacts.extend(output.artifacts);
        } else {
            debug!(target: "triage::pipeline", "tool sub-run disabled");
        }

        if flags.reasoning {
            let reasoning_text = reasoning::run(&self.reasoning_chain, conversation).await?;
            conversation.insert_context(format!("Reasoning context: {}", reasoning_text));
            augmentation.reasoning_text = Some(reasoning_text);
        } else {
            debug!(target: "triage::pipeline", "reasoning disabled");
        }

        if flags.cross_check {
            let texts = cross_check::run(registry, conversation, system).await;
            let joined = serde_json::to_string(&texts).unwrap_or_else(|_| "[]".to_string());
            conversation.insert_context(format!("Context from multiple LLMs: {}", joined));
        }

        Ok(augmentation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(web_search: bool, tools: bool, reasoning: bool) -> PlanDecision {
        PlanDecision {
            model: "m".into(),
            web_search,
            reasoning,
            tools,
        }
    }

    #[test]
    fn test_cross_check_needs_explicit_flag_and_no_stream() {
        let plan = decision(true, false, true);
        assert!(!StageFlags::resolve(&plan, None, false).cross_check);
        assert!(StageFlags::resolve(&plan, Some(true), false).cross_check);
        assert!(!StageFlags::resolve(&plan, Some(true), true).cross_check);

        let flags = StageFlags::resolve(&plan, None, true);
        assert!(flags.web_search && flags.reasoning && !flags.tools);
    }
}
