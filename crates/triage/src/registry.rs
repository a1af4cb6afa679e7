//! The catalog of models a request can be routed to.
//!
//! The registry is built once at start-up and never mutated. Registration order
//! is kept because the cross-check stage reports results in that order.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use strum_macros::{Display, EnumString};

use crate::errors::{TriageError, TriageResult};
use crate::providers::base::Provider;

/// Models with a smaller context window than this cannot take a
/// reasoning-augmented prompt as the final model.
pub const REASONING_MIN_CONTEXT: u32 = 32_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileType {
    Image,
    Pdf,
    Audio,
    Text,
}

/// A routable model. `provider` is the handle used to invoke it and is never
/// part of the serialized catalog.
#[derive(Clone, Serialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub description: String,
    /// 1 is the fastest
    pub speed_rank: u32,
    /// 1 is the most capable
    pub capability_rank: u32,
    pub context_window: u32,
    pub file_types: BTreeSet<FileType>,
    pub tags: BTreeSet<String>,
    pub fallback: Option<String>,
    #[serde(skip)]
    pub provider: Arc<dyn Provider>,
}

impl std::fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("id", &self.id)
            .field("speed_rank", &self.speed_rank)
            .field("capability_rank", &self.capability_rank)
            .field("context_window", &self.context_window)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl ModelDescriptor {
    pub fn new<S: Into<String>>(id: S, provider: Arc<dyn Provider>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            speed_rank: 1,
            capability_rank: 1,
            context_window: 128_000,
            file_types: BTreeSet::new(),
            tags: BTreeSet::new(),
            fallback: None,
            provider,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_ranks(mut self, speed_rank: u32, capability_rank: u32) -> Self {
        self.speed_rank = speed_rank;
        self.capability_rank = capability_rank;
        self
    }

    pub fn with_context_window(mut self, context_window: u32) -> Self {
        self.context_window = context_window;
        self
    }

    pub fn with_file_types<I: IntoIterator<Item = FileType>>(mut self, file_types: I) -> Self {
        self.file_types = file_types.into_iter().collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fallback<S: Into<String>>(mut self, fallback: S) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn is_reasoning_compatible(&self) -> bool {
        self.context_window >= REASONING_MIN_CONTEXT
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    /// Build a registry, rejecting duplicate ids and dangling or self-referencing fallbacks
    pub fn new(models: Vec<ModelDescriptor>) -> TriageResult<Self> {
        if models.is_empty() {
            return Err(TriageError::InvalidRegistry(
                "at least one model is required".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for model in &models {
            if !ids.insert(model.id.as_str()) {
                return Err(TriageError::InvalidRegistry(format!(
                    "duplicate model id '{}'",
                    model.id
                )));
            }
        }

        for model in &models {
            if let Some(fallback) = &model.fallback {
                if fallback == &model.id {
                    return Err(TriageError::InvalidRegistry(format!(
                        "model '{}' falls back to itself",
                        model.id
                    )));
                }
                if !ids.contains(fallback.as_str()) {
                    return Err(TriageError::InvalidRegistry(format!(
                        "model '{}' falls back to unknown model '{}'",
                        model.id, fallback
                    )));
                }
            }
        }

        Ok(Self { models })
    }

    pub fn lookup(&self, id: &str) -> TriageResult<&ModelDescriptor> {
        self.models
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| TriageError::UnknownModel(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.iter().any(|m| m.id == id)
    }

    /// Models in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.models.iter().map(|m| m.id.clone()).collect()
    }

    /// The catalog as JSON, without provider handles. This is what the planner sees.
    pub fn serialize(&self) -> Value {
        serde_json::to_value(&self.models).unwrap_or(Value::Null)
    }

    /// The model followed by its fallback pointers, stopping at the first repeat
    pub fn fallback_chain(&self, id: &str) -> TriageResult<Vec<&ModelDescriptor>> {
        let mut current = self.lookup(id)?;
        let mut chain = vec![current];
        let mut seen = HashSet::from([current.id.as_str()]);
        while let Some(next) = current.fallback.as_deref() {
            if !seen.insert(next) {
                break;
            }
            current = self.lookup(next)?;
            chain.push(current);
        }
        Ok(chain)
    }

    pub fn is_reasoning_compatible(&self, id: &str) -> TriageResult<bool> {
        Ok(self.lookup(id)?.is_reasoning_compatible())
    }

    /// The most capable model that can take a reasoning-augmented prompt
    pub fn most_capable_reasoning_model(&self) -> Option<&ModelDescriptor> {
        self.models
            .iter()
            .filter(|m| m.is_reasoning_compatible())
            .min_by_key(|m| m.capability_rank)
    }
}
