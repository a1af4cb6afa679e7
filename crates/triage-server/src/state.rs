use std::sync::Arc;
use triage::Triage;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub triage: Arc<Triage>,
}

impl AppState {
    pub fn new(triage: Triage) -> Self {
        Self {
            triage: Arc::new(triage),
        }
    }
}
