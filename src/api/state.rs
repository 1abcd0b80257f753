//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ApiConfig, Config};
use crate::persistence::ProfileStore;
use crate::query::{QueryEngine, QueryResult};
use crate::session::{AnalysisSession, InMemorySessionStore, SessionStore};
use crate::telemetry::{DataflashSource, LogSource};
use crate::upload::UploadAssembler;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Chunked and single-shot upload handling
    pub assembler: Arc<UploadAssembler>,
    /// Token → analyzed log
    pub sessions: Arc<dyn SessionStore>,
    /// Re-scans logs for queries
    pub engine: QueryEngine,
    /// Profiles, saved analyses and graphs
    pub profiles: Arc<dyn ProfileStore>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Wire up the DataFlash decoder, an in-memory session store and the
    /// given profile store
    pub fn new(config: &Config, profiles: Arc<dyn ProfileStore>) -> Self {
        let source: Arc<dyn LogSource> = Arc::new(DataflashSource);
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        Self::with_parts(config, source, sessions, profiles)
    }

    /// Build state around an explicit decoder and session store
    pub fn with_parts(
        config: &Config,
        source: Arc<dyn LogSource>,
        sessions: Arc<dyn SessionStore>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        let assembler = UploadAssembler::new(
            &config.uploads,
            Arc::clone(&source),
            Arc::clone(&sessions),
        )
        .with_profiles(Arc::clone(&profiles));

        Self {
            assembler: Arc::new(assembler),
            sessions,
            engine: QueryEngine::new(source),
            profiles,
            config: Arc::new(config.api.clone()),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Resolve a query token, rejecting missing and unknown ones alike
    pub async fn session(&self, token: Option<&str>) -> ApiResult<Arc<AnalysisSession>> {
        let invalid = || ApiError::Validation("valid token required".to_string());
        let token = token.filter(|t| !t.is_empty()).ok_or_else(invalid)?;
        self.sessions.get(token).await.ok_or_else(invalid)
    }

    /// Run a query on a blocking thread
    pub async fn query<T, F>(&self, session: Arc<AnalysisSession>, f: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&QueryEngine, &AnalysisSession) -> QueryResult<T> + Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || f(&engine, &session))
            .await
            .map_err(|e| ApiError::Internal(format!("query task failed: {}", e)))?
            .map_err(ApiError::from)
    }
}
