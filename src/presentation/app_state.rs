// Application state for HTTP handlers
use crate::application::controller::DashboardController;
use crate::application::sources::SettingsStore;
use std::sync::Arc;

pub struct AppState {
    pub controller: DashboardController,
    pub settings: Arc<dyn SettingsStore>,
}
