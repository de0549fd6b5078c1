//! API shared state containing actor handles

use tokio::sync::broadcast;

use crate::actors::{messages::DashboardSnapshot, registry::RegistryHandle};

/// Shared state for all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub registry: RegistryHandle,

    /// Present only when the dashboard is enabled
    pub dashboard_tx: Option<broadcast::Sender<DashboardSnapshot>>,
}

impl ApiState {
    pub fn new(
        registry: RegistryHandle,
        dashboard_tx: Option<broadcast::Sender<DashboardSnapshot>>,
    ) -> Self {
        Self {
            registry,
            dashboard_tx,
        }
    }
}
