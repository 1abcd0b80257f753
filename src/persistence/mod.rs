//! Profile Persistence
//!
//! Profiles, saved analysis results and saved graphs behind one
//! [`ProfileStore`] interface. The backend is chosen once at startup by
//! [`open_store`]; if the configured backend cannot be opened the next one in
//! line is tried (`sqlite` → `file` → `memory`), so the server always starts.

mod error;
mod file;
mod memory;
pub mod models;
mod sqlite;

pub use error::{PersistenceError, PersistenceResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use models::{
    AnalysisRecord, NewAnalysis, NewGraph, NewProfile, Profile, SavedGraph,
};
pub use sqlite::SqliteStore;

use crate::config::{PersistenceConfig, StoreBackend};
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for profiles and everything attached to them
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Short backend name for health output
    fn backend_name(&self) -> &'static str;

    async fn create_profile(&self, profile: NewProfile) -> PersistenceResult<Profile>;

    /// All profiles, or only those of `user_id`, oldest first
    async fn list_profiles(&self, user_id: Option<&str>) -> PersistenceResult<Vec<Profile>>;

    async fn get_profile(&self, id: &str) -> PersistenceResult<Option<Profile>>;

    /// Delete a profile and its analyses and graphs. `false` if it did not exist.
    async fn delete_profile(&self, id: &str) -> PersistenceResult<bool>;

    async fn save_analysis_result(&self, analysis: NewAnalysis) -> PersistenceResult<AnalysisRecord>;

    /// Analyses of a profile, newest first
    async fn get_analysis_results(&self, profile_id: &str) -> PersistenceResult<Vec<AnalysisRecord>>;

    async fn get_analysis_by_token(&self, token: &str) -> PersistenceResult<Option<AnalysisRecord>>;

    async fn save_graph(&self, graph: NewGraph) -> PersistenceResult<SavedGraph>;

    /// Graphs of a profile, newest first
    async fn get_saved_graphs(&self, profile_id: &str) -> PersistenceResult<Vec<SavedGraph>>;

    async fn delete_saved_graph(&self, id: &str) -> PersistenceResult<bool>;
}

fn try_open(backend: StoreBackend, config: &PersistenceConfig) -> PersistenceResult<Arc<dyn ProfileStore>> {
    Ok(match backend {
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(config.sqlite_path())?),
        StoreBackend::File => Arc::new(FileStore::open(&config.data_dir)?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    })
}

/// Open the configured store, falling back to the next backend on failure
pub fn open_store(config: &PersistenceConfig) -> Arc<dyn ProfileStore> {
    let chain: &[StoreBackend] = match config.backend {
        StoreBackend::Sqlite => &[StoreBackend::Sqlite, StoreBackend::File],
        StoreBackend::File => &[StoreBackend::File],
        StoreBackend::Memory => &[],
    };

    for backend in chain {
        match try_open(*backend, config) {
            Ok(store) => return store,
            Err(e) => tracing::warn!(
                backend = ?backend,
                data_dir = %config.data_dir.display(),
                error = %e,
                "Profile store unavailable, falling back"
            ),
        }
    }

    if config.backend != StoreBackend::Memory {
        tracing::warn!("Profiles will not survive a restart");
    }
    Arc::new(MemoryStore::new())
}
