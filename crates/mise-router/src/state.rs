use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Settings;
use crate::services::RouterService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub router_service: Arc<RouterService>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(router_service: Arc<RouterService>, settings: Settings) -> Self {
        Self {
            router_service,
            settings: Arc::new(settings),
        }
    }
}

impl FromRef<AppState> for Arc<RouterService> {
    fn from_ref(state: &AppState) -> Self {
        state.router_service.clone()
    }
}

impl FromRef<AppState> for Arc<Settings> {
    fn from_ref(state: &AppState) -> Self {
        state.settings.clone()
    }
}
