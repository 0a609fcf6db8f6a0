use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db;

/// Durable key-value view over one wizard's slice of the workspace
/// database. Keys are namespaced by the wizard name, so the enrollment and
/// incident drafts never collide.
pub struct DraftStore<'a> {
    conn: &'a Connection,
    wizard: &'static str,
}

impl<'a> DraftStore<'a> {
    pub fn new(conn: &'a Connection, wizard: &'static str) -> Self {
        Self { conn, wizard }
    }

    /// Saves a slot value. `None` removes the key instead of storing a
    /// literal null, so absent and cleared slots are indistinguishable.
    pub fn save<T: Serialize>(&self, key: &str, value: Option<&T>) -> anyhow::Result<()> {
        match value {
            Some(v) => db::draft_set_json(self.conn, self.wizard, key, &serde_json::to_value(v)?),
            None => db::draft_delete(self.conn, self.wizard, key),
        }
    }

    /// Loads a slot. Missing keys and rows that no longer deserialize both
    /// read as `None`; storage corruption never surfaces to the wizard.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = db::draft_get_json(self.conn, self.wizard, key).ok()??;
        serde_json::from_value(value).ok()
    }

    pub fn load_raw(&self, key: &str) -> Option<serde_json::Value> {
        db::draft_get_json(self.conn, self.wizard, key).ok()?
    }

    pub fn clear(&self, keys: &[&str]) -> anyhow::Result<()> {
        db::draft_clear_keys(self.conn, self.wizard, keys)
    }
}
