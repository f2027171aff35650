/*
 * SPDX-FileCopyrightText: 2026 OmniFlow Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// Persists "app" and "session" records for the frontend. Records are opaque
/// JSON blobs; only the envelope fields needed for keying and ordering are
/// parsed out and mirrored into columns.
#[derive(Clone)]
pub struct BridgeStore {
    path: PathBuf,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppEnvelope {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    updated_at: i64,
    #[serde(default)]
    is_pinned: bool,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionEnvelope {
    #[serde(default)]
    id: String,
    #[serde(default)]
    app_id: String,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    updated_at: i64,
    #[serde(default)]
    is_pinned: bool,
}

impl BridgeStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn =
            Connection::open(&path).with_context(|| format!("open db: {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS apps (
              id TEXT PRIMARY KEY,
              name TEXT NOT NULL DEFAULT '',
              updated_at INTEGER NOT NULL,
              is_pinned INTEGER NOT NULL DEFAULT 0,
              content TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_apps_updated ON apps(updated_at DESC);
            CREATE INDEX IF NOT EXISTS idx_apps_pinned ON apps(is_pinned DESC);

            CREATE TABLE IF NOT EXISTS sessions (
              id TEXT PRIMARY KEY,
              app_id TEXT NOT NULL DEFAULT '',
              name TEXT NOT NULL DEFAULT '',
              type TEXT NOT NULL DEFAULT '',
              updated_at INTEGER NOT NULL,
              is_pinned INTEGER NOT NULL DEFAULT 0,
              content TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_app ON sessions(app_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at DESC);
            "#,
        )
        .context("init store schema")?;
        Ok(Self { path })
    }

    /// Upserts an app record keyed by its `id` envelope field. The full JSON
    /// payload is stored verbatim as the record content.
    pub fn save_app(&self, app_json: &str) -> Result<()> {
        let envelope: AppEnvelope =
            serde_json::from_str(app_json).context("invalid app json")?;
        if envelope.id.is_empty() {
            bail!("app id is missing");
        }

        let conn = Connection::open(&self.path)?;
        conn.execute(
            "INSERT OR REPLACE INTO apps(id, name, updated_at, is_pinned, content)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                envelope.id,
                envelope.name,
                envelope.updated_at,
                envelope.is_pinned,
                app_json
            ],
        )?;
        Ok(())
    }

    /// Returns app payloads, pinned first, most recently updated first.
    pub fn list_apps(&self) -> Result<Vec<String>> {
        let conn = Connection::open(&self.path)?;
        let mut stmt =
            conn.prepare("SELECT content FROM apps ORDER BY is_pinned DESC, updated_at DESC")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn delete_app(&self, id: &str) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute("DELETE FROM apps WHERE id=?1", params![id])?;
        Ok(())
    }

    pub fn save_session(&self, session_json: &str) -> Result<()> {
        let envelope: SessionEnvelope =
            serde_json::from_str(session_json).context("invalid session json")?;
        if envelope.id.is_empty() {
            bail!("session id is missing");
        }

        let conn = Connection::open(&self.path)?;
        conn.execute(
            "INSERT OR REPLACE INTO sessions(id, app_id, name, type, updated_at, is_pinned, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                envelope.id,
                envelope.app_id,
                envelope.name,
                envelope.kind,
                envelope.updated_at,
                envelope.is_pinned,
                session_json
            ],
        )?;
        Ok(())
    }

    /// Returns session payloads, most recently updated first.
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let conn = Connection::open(&self.path)?;
        let mut stmt = conn.prepare("SELECT content FROM sessions ORDER BY updated_at DESC")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute("DELETE FROM sessions WHERE id=?1", params![id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store() -> (tempfile::TempDir, BridgeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BridgeStore::open(dir.path().join("omniflow.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn app_upsert_list_delete() {
        let (_dir, store) = temp_store();

        let a = json!({"id": "a", "name": "Alpha", "updatedAt": 10, "isPinned": false, "nodes": [1, 2]});
        let b = json!({"id": "b", "name": "Beta", "updatedAt": 20, "isPinned": false});
        let c = json!({"id": "c", "name": "Gamma", "updatedAt": 5, "isPinned": true});
        for app in [&a, &b, &c] {
            store.save_app(&app.to_string()).unwrap();
        }

        // Pinned first, then most recently updated.
        let listed = store.list_apps().unwrap();
        assert_eq!(listed, vec![c.to_string(), b.to_string(), a.to_string()]);

        // Upsert by id replaces the stored payload.
        let a2 = json!({"id": "a", "name": "Alpha2", "updatedAt": 30, "isPinned": false});
        store.save_app(&a2.to_string()).unwrap();
        let listed = store.list_apps().unwrap();
        assert_eq!(listed, vec![c.to_string(), a2.to_string(), b.to_string()]);

        store.delete_app("c").unwrap();
        assert_eq!(store.list_apps().unwrap().len(), 2);
    }

    #[test]
    fn app_validation() {
        let (_dir, store) = temp_store();
        assert!(store.save_app("not json").is_err());
        assert!(store
            .save_app(&json!({"name": "missing id"}).to_string())
            .is_err());
    }

    #[test]
    fn session_upsert_list_delete() {
        let (_dir, store) = temp_store();

        let s1 = json!({"id": "s1", "appId": "a", "type": "chat", "updatedAt": 1});
        let s2 = json!({"id": "s2", "appId": "a", "type": "run", "updatedAt": 2});
        store.save_session(&s1.to_string()).unwrap();
        store.save_session(&s2.to_string()).unwrap();

        let listed = store.list_sessions().unwrap();
        assert_eq!(listed, vec![s2.to_string(), s1.to_string()]);

        store.delete_session("s2").unwrap();
        assert_eq!(store.list_sessions().unwrap(), vec![s1.to_string()]);

        assert!(store.save_session(&json!({"appId": "a"}).to_string()).is_err());
    }
}
