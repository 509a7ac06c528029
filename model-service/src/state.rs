use std::sync::Arc;

use crate::service::ModelService;

type ServiceHandle = Arc<ModelService>;

#[derive(Clone)]
pub struct AppState {
    pub service: ServiceHandle,
}

impl AppState {
    pub fn new(service: ModelService) -> Self {
        AppState {
            service: Arc::new(service),
        }
    }

    /// State over a service the gRPC server also holds.
    pub fn shared(service: ServiceHandle) -> Self {
        AppState { service }
    }
}
