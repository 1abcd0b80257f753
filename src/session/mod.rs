//! Analysis Sessions
//!
//! A session is what a client gets back after an upload has been decompressed
//! and indexed: an opaque token bound to the log file on disk and its
//! [`LogIndex`]. Sessions live for the life of the process; a token from a
//! previous process is simply unknown.

use crate::index::LogIndex;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A completed, queryable upload
#[derive(Debug)]
pub struct AnalysisSession {
    pub token: String,
    /// Scratch directory owning `file_path`
    pub work_dir: PathBuf,
    pub file_path: PathBuf,
    pub index: LogIndex,
    pub filename: String,
    /// Size of the decompressed log in bytes
    pub file_size: u64,
    /// Size the client reported for the original file
    pub original_size: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisSession {
    /// Create a session with a fresh token
    pub fn new(
        work_dir: PathBuf,
        file_path: PathBuf,
        index: LogIndex,
        file_size: u64,
        original_size: Option<u64>,
    ) -> Self {
        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            token: uuid::Uuid::new_v4().to_string(),
            work_dir,
            file_path,
            index,
            filename,
            file_size,
            original_size,
            created_at: Utc::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Token → session mapping
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, session: Arc<AnalysisSession>);

    async fn get(&self, token: &str) -> Option<Arc<AnalysisSession>>;

    /// Remove a session, returning it if present
    async fn delete(&self, token: &str) -> Option<Arc<AnalysisSession>>;

    async fn len(&self) -> usize;
}

/// Process-local session store
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Arc<AnalysisSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, session: Arc<AnalysisSession>) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.token.clone(), session);
    }

    async fn get(&self, token: &str) -> Option<Arc<AnalysisSession>> {
        self.sessions.read().await.get(token).cloned()
    }

    async fn delete(&self, token: &str) -> Option<Arc<AnalysisSession>> {
        self.sessions.write().await.remove(token)
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Arc<AnalysisSession> {
        Arc::new(AnalysisSession::new(
            PathBuf::from("/tmp/upload_x"),
            PathBuf::from("/tmp/upload_x/00000001.BIN"),
            LogIndex::default(),
            1024,
            Some(4096),
        ))
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemorySessionStore::new();
        let s = session();
        let token = s.token.clone();

        store.put(Arc::clone(&s)).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&token).await.unwrap().filename, "00000001.BIN");

        assert!(store.delete(&token).await.is_some());
        assert!(store.get(&token).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let store = InMemorySessionStore::new();
        assert!(store.get("no-such-token").await.is_none());
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(session().token, session().token);
    }
}
