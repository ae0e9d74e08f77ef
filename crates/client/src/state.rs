use std::sync::Arc;

use pantry_events::DispatchBus;

use crate::api::InventoryApi;
use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::notifications::Notifications;
use crate::wire::Message;

/// Everything a page needs to mount. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn InventoryApi>,
    pub connection: ConnectionManager,
    pub notifications: Notifications,
    pub config: Arc<ClientConfig>,
}

impl AppState {
    pub fn new(api: Arc<dyn InventoryApi>, connection: ConnectionManager, config: ClientConfig) -> Self {
        Self {
            api,
            connection,
            notifications: Notifications::new(),
            config: Arc::new(config),
        }
    }

    pub fn bus(&self) -> &DispatchBus<Message> {
        self.connection.bus()
    }
}

impl core::fmt::Debug for AppState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppState")
            .field("connection", &self.connection)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
