//! API server state

use std::sync::Arc;

use crate::service::VisaService;
use crate::storage::DocumentStore;

/// API server state
#[derive(Clone)]
pub struct AppState {
    /// Visa operations over the process-wide store session
    pub service: VisaService,
}

impl AppState {
    pub fn new(service: VisaService) -> Self {
        Self { service }
    }

    /// Create state directly over a store with default service settings
    pub fn from_store(store: Arc<dyn DocumentStore>) -> Self {
        Self::new(VisaService::new(store))
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        self.service.store()
    }
}
