use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::wizard::WizardSession;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Daemon state threaded through every handler. Generic over the registry
/// client so tests can drive the full IPC surface against a scripted
/// backend.
pub struct AppState<B> {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub backend: B,
    pub runtime: tokio::runtime::Runtime,
    pub enrollment: WizardSession,
    pub incident: WizardSession,
}

impl<B> AppState<B> {
    pub fn new(backend: B) -> anyhow::Result<Self> {
        Ok(Self {
            workspace: None,
            db: None,
            backend,
            runtime: tokio::runtime::Runtime::new()?,
            enrollment: WizardSession::new(),
            incident: WizardSession::new(),
        })
    }
}
