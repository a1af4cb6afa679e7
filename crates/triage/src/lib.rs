pub mod configuration;
pub mod conversation;
pub mod errors;
pub mod execution;
pub mod fallback;
pub mod files;
pub mod models;
pub mod orchestrator;
pub mod partial_json;
pub mod pipeline;
pub mod planner;
pub mod prompt_template;
pub mod providers;
pub mod registry;
pub mod result;
pub mod services;
pub mod tools;

pub use configuration::Settings;
pub use errors::{Stage, TriageError, TriageResult};
pub use orchestrator::{GenerateParams, Prompt, Triage, TriageBuilder};
pub use result::{RequestResult, StreamChunk};
