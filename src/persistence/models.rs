//! Stored documents
//!
//! Profiles group analyses and saved graphs. Deleting a profile deletes both.

use super::error::{PersistenceError, PersistenceResult};
use crate::index::LogIndex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A user profile (usually one per vehicle)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub drone_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a profile
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProfile {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub drone_type: Option<String>,
}

impl NewProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub(crate) fn into_profile(self) -> PersistenceResult<Profile> {
        if self.name.trim().is_empty() {
            return Err(PersistenceError::Invalid("profile name is required".to_string()));
        }
        let now = Utc::now();
        Ok(Profile {
            id: new_id(),
            user_id: self.user_id,
            name: self.name,
            description: self.description,
            drone_type: self.drone_type,
            created_at: now,
            updated_at: now,
        })
    }
}

/// An analyzed log attached to a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub profile_id: String,
    pub filename: String,
    pub file_size: u64,
    #[serde(default)]
    pub original_size: Option<u64>,
    pub analysis_data: LogIndex,
    #[serde(default)]
    pub token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when saving an analysis
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub profile_id: String,
    pub filename: String,
    pub file_size: u64,
    pub original_size: Option<u64>,
    pub analysis_data: LogIndex,
    pub token: Option<String>,
}

impl NewAnalysis {
    pub(crate) fn into_record(self) -> AnalysisRecord {
        AnalysisRecord {
            id: new_id(),
            profile_id: self.profile_id,
            filename: self.filename,
            file_size: self.file_size,
            original_size: self.original_size,
            analysis_data: self.analysis_data,
            token: self.token,
            created_at: Utc::now(),
        }
    }
}

/// A graph a user pinned to a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedGraph {
    pub id: String,
    pub profile_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub graph_type: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub field_name: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub series_data: Option<serde_json::Value>,
    #[serde(default)]
    pub flight_modes: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

fn default_graph_type() -> String {
    "custom".to_string()
}

/// Fields supplied when saving a graph
#[derive(Debug, Clone, Deserialize)]
pub struct NewGraph {
    #[serde(skip)]
    pub profile_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_graph_type")]
    pub graph_type: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub field_name: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub series_data: Option<serde_json::Value>,
    #[serde(default)]
    pub flight_modes: Option<serde_json::Value>,
}

impl NewGraph {
    pub fn new(profile_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            name: name.into(),
            description: String::new(),
            graph_type: default_graph_type(),
            message_type: None,
            field_name: None,
            token: None,
            series_data: None,
            flight_modes: None,
        }
    }

    pub(crate) fn into_graph(self) -> PersistenceResult<SavedGraph> {
        if self.name.trim().is_empty() {
            return Err(PersistenceError::Invalid("graph name is required".to_string()));
        }
        Ok(SavedGraph {
            id: new_id(),
            profile_id: self.profile_id,
            name: self.name,
            description: self.description,
            graph_type: self.graph_type,
            message_type: self.message_type,
            field_name: self.field_name,
            token: self.token,
            series_data: self.series_data,
            flight_modes: self.flight_modes,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_requires_name() {
        assert!(NewProfile::named("  ").into_profile().is_err());
        let profile = NewProfile::named("Hexa").into_profile().unwrap();
        assert_eq!(profile.name, "Hexa");
        assert_eq!(profile.created_at, profile.updated_at);
    }

    #[test]
    fn test_graph_defaults_from_json() {
        let graph: NewGraph = serde_json::from_str(r#"{"name": "Altitude"}"#).unwrap();
        assert_eq!(graph.graph_type, "custom");
        assert!(graph.series_data.is_none());
    }
}
