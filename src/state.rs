use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::AuthKeys;
use crate::database::Database;
use crate::events::EventBus;

/// Shared application state: the pool, the process-wide change bus, and the
/// token keys. Cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub bus: Arc<EventBus>,
    pub auth_keys: AuthKeys,
}

impl FromRef<AppState> for AuthKeys {
    fn from_ref(state: &AppState) -> Self {
        state.auth_keys.clone()
    }
}
