//! SQLite document store
//!
//! One table per collection. Each row carries the columns we filter or sort
//! on plus the full document as JSON in `doc`.

use super::error::{PersistenceError, PersistenceResult};
use super::models::*;
use super::ProfileStore;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id          TEXT PRIMARY KEY,
    user_id     TEXT,
    created_at  TEXT NOT NULL,
    doc         TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS analysis_results (
    id          TEXT PRIMARY KEY,
    profile_id  TEXT NOT NULL,
    token       TEXT,
    created_at  TEXT NOT NULL,
    doc         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_analysis_profile ON analysis_results(profile_id);
CREATE INDEX IF NOT EXISTS idx_analysis_token ON analysis_results(token);
CREATE TABLE IF NOT EXISTS saved_graphs (
    id          TEXT PRIMARY KEY,
    profile_id  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    doc         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_graphs_profile ON saved_graphs(profile_id);
"#;

/// Fixed-width timestamps so text ordering matches time ordering
fn sort_key(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_all<T: DeserializeOwned>(docs: Vec<String>) -> PersistenceResult<Vec<T>> {
    docs.iter()
        .map(|doc| serde_json::from_str(doc).map_err(PersistenceError::from))
        .collect()
}

fn query_docs(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> PersistenceResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let docs = stmt
        .query_map(args, |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(docs)
}

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "SQLite store opened");
        Self::with_schema(conn)
    }

    pub fn open_in_memory() -> PersistenceResult<Self> {
        Self::with_schema(Connection::open_in_memory()?)
    }

    fn with_schema(conn: Connection) -> PersistenceResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on a blocking thread
    async fn with_conn<T, F>(&self, f: F) -> PersistenceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> PersistenceResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| PersistenceError::Database("connection lock poisoned".into()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| PersistenceError::Database(format!("task failed: {}", e)))?
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn create_profile(&self, profile: NewProfile) -> PersistenceResult<Profile> {
        let profile = profile.into_profile()?;
        let doc = serde_json::to_string(&profile)?;
        let row = profile.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO profiles (id, user_id, created_at, doc) VALUES (?1, ?2, ?3, ?4)",
                params![row.id, row.user_id, sort_key(&row.created_at), doc],
            )?;
            Ok(())
        })
        .await?;
        Ok(profile)
    }

    async fn list_profiles(&self, user_id: Option<&str>) -> PersistenceResult<Vec<Profile>> {
        let user_id = user_id.map(str::to_string);
        self.with_conn(move |conn| {
            let docs = match user_id {
                Some(user) => query_docs(
                    conn,
                    "SELECT doc FROM profiles WHERE user_id = ?1 ORDER BY created_at, rowid",
                    params![user],
                )?,
                None => query_docs(
                    conn,
                    "SELECT doc FROM profiles ORDER BY created_at, rowid",
                    [],
                )?,
            };
            decode_all(docs)
        })
        .await
    }

    async fn get_profile(&self, id: &str) -> PersistenceResult<Option<Profile>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let doc: Option<String> = conn
                .query_row("SELECT doc FROM profiles WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?;
            doc.map(|d| serde_json::from_str(&d).map_err(PersistenceError::from))
                .transpose()
        })
        .await
    }

    async fn delete_profile(&self, id: &str) -> PersistenceResult<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute("DELETE FROM profiles WHERE id = ?1", params![id])?;
            if removed > 0 {
                tx.execute("DELETE FROM saved_graphs WHERE profile_id = ?1", params![id])?;
                tx.execute(
                    "DELETE FROM analysis_results WHERE profile_id = ?1",
                    params![id],
                )?;
            }
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn save_analysis_result(&self, analysis: NewAnalysis) -> PersistenceResult<AnalysisRecord> {
        let record = analysis.into_record();
        let doc = serde_json::to_string(&record)?;
        let row = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO analysis_results (id, profile_id, token, created_at, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    row.id,
                    row.profile_id,
                    row.token,
                    sort_key(&row.created_at),
                    doc
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(record)
    }

    async fn get_analysis_results(&self, profile_id: &str) -> PersistenceResult<Vec<AnalysisRecord>> {
        let profile_id = profile_id.to_string();
        self.with_conn(move |conn| {
            let docs = query_docs(
                conn,
                "SELECT doc FROM analysis_results WHERE profile_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
                params![profile_id],
            )?;
            decode_all(docs)
        })
        .await
    }

    async fn get_analysis_by_token(&self, token: &str) -> PersistenceResult<Option<AnalysisRecord>> {
        let token = token.to_string();
        self.with_conn(move |conn| {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM analysis_results WHERE token = ?1 LIMIT 1",
                    params![token],
                    |row| row.get(0),
                )
                .optional()?;
            doc.map(|d| serde_json::from_str(&d).map_err(PersistenceError::from))
                .transpose()
        })
        .await
    }

    async fn save_graph(&self, graph: NewGraph) -> PersistenceResult<SavedGraph> {
        let graph = graph.into_graph()?;
        let doc = serde_json::to_string(&graph)?;
        let row = graph.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO saved_graphs (id, profile_id, created_at, doc) VALUES (?1, ?2, ?3, ?4)",
                params![row.id, row.profile_id, sort_key(&row.created_at), doc],
            )?;
            Ok(())
        })
        .await?;
        Ok(graph)
    }

    async fn get_saved_graphs(&self, profile_id: &str) -> PersistenceResult<Vec<SavedGraph>> {
        let profile_id = profile_id.to_string();
        self.with_conn(move |conn| {
            let docs = query_docs(
                conn,
                "SELECT doc FROM saved_graphs WHERE profile_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
                params![profile_id],
            )?;
            decode_all(docs)
        })
        .await
    }

    async fn delete_saved_graph(&self, id: &str) -> PersistenceResult<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            Ok(conn.execute("DELETE FROM saved_graphs WHERE id = ?1", params![id])? > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::tests::exercise_store;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sqlite_store_contract() {
        exercise_store(&SqliteStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("data").join("flightlens.db");

        let id = {
            let store = SqliteStore::open(&db).unwrap();
            store
                .create_profile(NewProfile::named("Wing"))
                .await
                .unwrap()
                .id
        };

        let store = SqliteStore::open(&db).unwrap();
        assert_eq!(store.get_profile(&id).await.unwrap().unwrap().name, "Wing");
    }

    #[test]
    fn test_sort_key_is_fixed_width() {
        let a = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let b = "2024-01-01T00:00:00.5Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(sort_key(&a).len(), sort_key(&b).len());
        assert!(sort_key(&a) < sort_key(&b));
    }
}
