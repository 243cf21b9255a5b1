//! API shared state

use std::sync::Arc;

use crate::alerts::AlertEngine;
use crate::config::SettingsProvider;
use crate::store::SharedStore;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Local metric store
    pub store: SharedStore,

    /// Alert engine, read for the local device's alert statuses
    pub engine: AlertEngine,

    /// Settings, read on every request so token changes apply immediately
    pub settings: Arc<dyn SettingsProvider>,

    pub local_device_id: String,
}

impl ApiState {
    pub fn new(
        store: SharedStore,
        engine: AlertEngine,
        settings: Arc<dyn SettingsProvider>,
        local_device_id: &str,
    ) -> Self {
        Self {
            store,
            engine,
            settings,
            local_device_id: local_device_id.to_string(),
        }
    }
}
