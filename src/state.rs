//! Shared application state for all routes. Built once at boot; read-only afterwards.

use crate::db::ConnectionProvider;
use crate::extension::ExtensionModule;
use crate::service::RecordStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: RecordStore,
    pub provider: Arc<dyn ConnectionProvider>,
    /// Extensions that loaded at boot, in discovery order.
    pub extensions: Arc<Vec<ExtensionModule>>,
}

impl AppState {
    pub fn new(provider: Arc<dyn ConnectionProvider>, extensions: Vec<ExtensionModule>) -> Self {
        AppState {
            store: RecordStore::new(provider.clone()),
            provider,
            extensions: Arc::new(extensions),
        }
    }
}
