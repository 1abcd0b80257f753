//! JSON file profile store
//!
//! Keeps the collections in memory and rewrites `profiles.json`,
//! `saved_graphs.json` and `analysis_results.json` after every mutation.

use super::error::PersistenceResult;
use super::memory::Collections;
use super::models::*;
use super::ProfileStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const PROFILES_FILE: &str = "profiles.json";
const GRAPHS_FILE: &str = "saved_graphs.json";
const ANALYSES_FILE: &str = "analysis_results.json";

pub struct FileStore {
    dir: PathBuf,
    inner: RwLock<Collections>,
}

impl FileStore {
    /// Open (or create) a store in `dir`
    pub fn open(dir: impl AsRef<Path>) -> PersistenceResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let collections = Collections {
            profiles: load(&dir.join(PROFILES_FILE))?,
            saved_graphs: load(&dir.join(GRAPHS_FILE))?,
            analysis_results: load(&dir.join(ANALYSES_FILE))?,
        };

        tracing::info!(
            dir = %dir.display(),
            profiles = collections.profiles.len(),
            "File store opened"
        );

        Ok(Self {
            dir,
            inner: RwLock::new(collections),
        })
    }

    fn flush(&self, collections: &Collections) -> PersistenceResult<()> {
        save(&self.dir.join(PROFILES_FILE), &collections.profiles)?;
        save(&self.dir.join(GRAPHS_FILE), &collections.saved_graphs)?;
        save(&self.dir.join(ANALYSES_FILE), &collections.analysis_results)?;
        Ok(())
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> PersistenceResult<HashMap<String, T>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = fs::read(path)?;
    if data.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(serde_json::from_slice(&data)?)
}

/// Replace `path` atomically via a sibling temp file
fn save<T: Serialize>(path: &Path, value: &HashMap<String, T>) -> PersistenceResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl ProfileStore for FileStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn create_profile(&self, profile: NewProfile) -> PersistenceResult<Profile> {
        let mut inner = self.inner.write().await;
        let profile = inner.create_profile(profile)?;
        self.flush(&inner)?;
        Ok(profile)
    }

    async fn list_profiles(&self, user_id: Option<&str>) -> PersistenceResult<Vec<Profile>> {
        Ok(self.inner.read().await.list_profiles(user_id))
    }

    async fn get_profile(&self, id: &str) -> PersistenceResult<Option<Profile>> {
        Ok(self.inner.read().await.profiles.get(id).cloned())
    }

    async fn delete_profile(&self, id: &str) -> PersistenceResult<bool> {
        let mut inner = self.inner.write().await;
        let removed = inner.delete_profile(id);
        if removed {
            self.flush(&inner)?;
        }
        Ok(removed)
    }

    async fn save_analysis_result(&self, analysis: NewAnalysis) -> PersistenceResult<AnalysisRecord> {
        let mut inner = self.inner.write().await;
        let record = inner.save_analysis(analysis);
        self.flush(&inner)?;
        Ok(record)
    }

    async fn get_analysis_results(&self, profile_id: &str) -> PersistenceResult<Vec<AnalysisRecord>> {
        Ok(self.inner.read().await.analyses_for(profile_id))
    }

    async fn get_analysis_by_token(&self, token: &str) -> PersistenceResult<Option<AnalysisRecord>> {
        Ok(self.inner.read().await.analysis_by_token(token))
    }

    async fn save_graph(&self, graph: NewGraph) -> PersistenceResult<SavedGraph> {
        let mut inner = self.inner.write().await;
        let graph = inner.save_graph(graph)?;
        self.flush(&inner)?;
        Ok(graph)
    }

    async fn get_saved_graphs(&self, profile_id: &str) -> PersistenceResult<Vec<SavedGraph>> {
        Ok(self.inner.read().await.graphs_for(profile_id))
    }

    async fn delete_saved_graph(&self, id: &str) -> PersistenceResult<bool> {
        let mut inner = self.inner.write().await;
        let removed = inner.saved_graphs.remove(id).is_some();
        if removed {
            self.flush(&inner)?;
        }
        Ok(removed)
    }
}
