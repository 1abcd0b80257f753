//! In-process profile store
//!
//! Also the document model behind [`FileStore`](super::FileStore), which
//! snapshots these collections to JSON after every change.

use super::error::PersistenceResult;
use super::models::*;
use super::ProfileStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// The three document collections, keyed by id
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Collections {
    pub profiles: HashMap<String, Profile>,
    pub saved_graphs: HashMap<String, SavedGraph>,
    pub analysis_results: HashMap<String, AnalysisRecord>,
}

impl Collections {
    pub fn create_profile(&mut self, new: NewProfile) -> PersistenceResult<Profile> {
        let profile = new.into_profile()?;
        self.profiles.insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    pub fn list_profiles(&self, user_id: Option<&str>) -> Vec<Profile> {
        let mut profiles: Vec<Profile> = self
            .profiles
            .values()
            .filter(|p| user_id.map_or(true, |u| p.user_id.as_deref() == Some(u)))
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        profiles
    }

    /// Remove a profile with its graphs and analyses
    pub fn delete_profile(&mut self, id: &str) -> bool {
        if self.profiles.remove(id).is_none() {
            return false;
        }
        self.saved_graphs.retain(|_, g| g.profile_id != id);
        self.analysis_results.retain(|_, a| a.profile_id != id);
        true
    }

    pub fn save_analysis(&mut self, new: NewAnalysis) -> AnalysisRecord {
        let record = new.into_record();
        self.analysis_results.insert(record.id.clone(), record.clone());
        record
    }

    pub fn analyses_for(&self, profile_id: &str) -> Vec<AnalysisRecord> {
        let mut records: Vec<AnalysisRecord> = self
            .analysis_results
            .values()
            .filter(|a| a.profile_id == profile_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    pub fn analysis_by_token(&self, token: &str) -> Option<AnalysisRecord> {
        self.analysis_results
            .values()
            .find(|a| a.token.as_deref() == Some(token))
            .cloned()
    }

    pub fn save_graph(&mut self, new: NewGraph) -> PersistenceResult<SavedGraph> {
        let graph = new.into_graph()?;
        self.saved_graphs.insert(graph.id.clone(), graph.clone());
        Ok(graph)
    }

    pub fn graphs_for(&self, profile_id: &str) -> Vec<SavedGraph> {
        let mut graphs: Vec<SavedGraph> = self
            .saved_graphs
            .values()
            .filter(|g| g.profile_id == profile_id)
            .cloned()
            .collect();
        graphs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        graphs
    }
}

/// Profile store that lives and dies with the process
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create_profile(&self, profile: NewProfile) -> PersistenceResult<Profile> {
        self.inner.write().await.create_profile(profile)
    }

    async fn list_profiles(&self, user_id: Option<&str>) -> PersistenceResult<Vec<Profile>> {
        Ok(self.inner.read().await.list_profiles(user_id))
    }

    async fn get_profile(&self, id: &str) -> PersistenceResult<Option<Profile>> {
        Ok(self.inner.read().await.profiles.get(id).cloned())
    }

    async fn delete_profile(&self, id: &str) -> PersistenceResult<bool> {
        Ok(self.inner.write().await.delete_profile(id))
    }

    async fn save_analysis_result(&self, analysis: NewAnalysis) -> PersistenceResult<AnalysisRecord> {
        Ok(self.inner.write().await.save_analysis(analysis))
    }

    async fn get_analysis_results(&self, profile_id: &str) -> PersistenceResult<Vec<AnalysisRecord>> {
        Ok(self.inner.read().await.analyses_for(profile_id))
    }

    async fn get_analysis_by_token(&self, token: &str) -> PersistenceResult<Option<AnalysisRecord>> {
        Ok(self.inner.read().await.analysis_by_token(token))
    }

    async fn save_graph(&self, graph: NewGraph) -> PersistenceResult<SavedGraph> {
        self.inner.write().await.save_graph(graph)
    }

    async fn get_saved_graphs(&self, profile_id: &str) -> PersistenceResult<Vec<SavedGraph>> {
        Ok(self.inner.read().await.graphs_for(profile_id))
    }

    async fn delete_saved_graph(&self, id: &str) -> PersistenceResult<bool> {
        Ok(self.inner.write().await.saved_graphs.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::tests::exercise_store;

    #[tokio::test]
    async fn test_memory_store_contract() {
        exercise_store(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_list_profiles_filters_by_user() {
        let store = MemoryStore::new();
        let mut mine = NewProfile::named("Quad");
        mine.user_id = Some("alice".into());
        store.create_profile(mine).await.unwrap();
        store.create_profile(NewProfile::named("Plane")).await.unwrap();

        assert_eq!(store.list_profiles(Some("alice")).await.unwrap().len(), 1);
        assert_eq!(store.list_profiles(None).await.unwrap().len(), 2);
    }
}
