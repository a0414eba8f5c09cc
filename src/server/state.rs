use std::sync::Arc;

use crate::{config::AuthConfig, service::SpeechService};

/// Shared by every handler.  The service holds the one model instance, so
/// cloning the state never reloads anything.
#[derive(Clone)]
pub struct AppState {
    pub service: SpeechService,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(service: SpeechService, auth: AuthConfig) -> Self {
        Self { service, auth: Arc::new(auth) }
    }
}
