use anyhow::{bail, Context, Result};
use axum::extract::FromRef;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{RemoteBackend, Settings};
use crate::logging::{Redactor, RequestLogger};
use crate::security::SessionManager;
use crate::services::{HttpRemoteStore, InMemoryStore, RemoteStore, TodoService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn RemoteStore>,
    pub sessions: Arc<SessionManager>,
    pub todos: Arc<TodoService>,
    pub request_logger: Arc<RequestLogger>,
}

impl AppState {
    pub fn new(settings: Settings, store: Arc<dyn RemoteStore>) -> Self {
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            settings.session.ttl_seconds,
        ));
        let todos = Arc::new(TodoService::new(store.clone()));
        let request_logger = Arc::new(RequestLogger::new(
            Redactor::from_config(&settings.logging),
            settings.logging.log_bodies,
        ));

        Self {
            settings: Arc::new(settings),
            store,
            sessions,
            todos,
            request_logger,
        }
    }

    /// Build the remote store selected by `remote.backend` and wire everything to it
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let store: Arc<dyn RemoteStore> = match settings.remote.backend {
            RemoteBackend::Http => {
                let missing = settings.remote.missing_fields();
                if !missing.is_empty() {
                    warn!("Remote store configuration incomplete, missing: {}", missing.join(", "));
                }
                let store = HttpRemoteStore::new(&settings.remote)
                    .context("Invalid remote store configuration")?;
                info!("✅ Remote store: {}", settings.remote.base_url);
                Arc::new(store)
            }
            RemoteBackend::Memory => {
                if settings.server.is_production() {
                    bail!("The in-memory remote store cannot be used in production");
                }
                warn!("Using in-memory remote store; data is lost on restart");
                Arc::new(InMemoryStore::new())
            }
        };

        Ok(Self::new(settings, store))
    }
}

impl FromRef<AppState> for Arc<Settings> {
    fn from_ref(state: &AppState) -> Self {
        state.settings.clone()
    }
}

impl FromRef<AppState> for Arc<SessionManager> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for Arc<TodoService> {
    fn from_ref(state: &AppState) -> Self {
        state.todos.clone()
    }
}
