//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! Query strings are taken as raw strings and parsed by hand so that bad
//! numbers come back as JSON errors rather than extractor rejections.

use crate::index::{LogIndex, MessageInfo};
use crate::persistence::{AnalysisRecord, Profile, SavedGraph};
use crate::query::{DumpEntry, SeriesPoint};
use crate::telemetry::{FieldValue, FlightMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::{ApiError, ApiResult};

// ============================================
// QUERY PARAMETERS
// ============================================

/// `?token=`
#[derive(Debug, Default, Deserialize)]
pub struct TokenParams {
    pub token: Option<String>,
}

/// `/download?token&msg`
#[derive(Debug, Default, Deserialize)]
pub struct DownloadParams {
    pub token: Option<String>,
    pub msg: Option<String>,
}

/// `/timeseries?token&msg&field&decimate`
#[derive(Debug, Default, Deserialize)]
pub struct TimeseriesParams {
    pub token: Option<String>,
    pub msg: Option<String>,
    pub field: Option<String>,
    pub decimate: Option<String>,
}

impl TimeseriesParams {
    /// Decimation factor, 1 when absent
    pub fn decimate(&self) -> ApiResult<usize> {
        match self.decimate.as_deref().filter(|d| !d.is_empty()) {
            None => Ok(1),
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(ApiError::Validation(
                    "decimate must be a positive integer".to_string(),
                )),
            },
        }
    }
}

/// Records returned by `/dump` when no limit is given
pub const DEFAULT_DUMP_LIMIT: usize = 100;

/// `/dump?token&type&limit`
#[derive(Debug, Default, Deserialize)]
pub struct DumpParams {
    pub token: Option<String>,
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub limit: Option<String>,
}

impl DumpParams {
    pub fn limit(&self) -> ApiResult<usize> {
        match self.limit.as_deref().filter(|l| !l.is_empty()) {
            None => Ok(DEFAULT_DUMP_LIMIT),
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                ApiError::Validation("limit must be a non-negative integer".to_string())
            }),
        }
    }
}

/// `/profiles?user_id=`
#[derive(Debug, Default, Deserialize)]
pub struct ProfileListParams {
    pub user_id: Option<String>,
}

// ============================================
// UPLOAD RESPONSES
// ============================================

/// Result of one `/upload_chunk` call
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkResponse {
    ChunkReceived {
        upload_id: String,
        received: usize,
        total: u32,
    },
    Complete {
        token: String,
        analysis: LogIndex,
    },
}

/// `/analyze` response
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub token: String,
    pub analysis: LogIndex,
}

// ============================================
// QUERY RESPONSES
// ============================================

#[derive(Debug, Serialize)]
pub struct TimeseriesResponse {
    pub msg: String,
    pub field: String,
    pub series: Vec<SeriesPoint>,
}

#[derive(Debug, Serialize)]
pub struct ParamsResponse {
    pub params: BTreeMap<String, FieldValue>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DumpResponse {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub messages: Vec<DumpEntry>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct FlightModesResponse {
    pub modes: Vec<FlightMode>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: BTreeMap<String, MessageInfo>,
}

// ============================================
// HEALTH
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok"
    pub status: String,
    /// Server version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Chunked uploads still collecting or assembling
    pub active_uploads: usize,
    /// Queryable sessions
    pub sessions: usize,
    /// Profile store backend name
    pub persistence: String,
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub ok: bool,
}

// ============================================
// PROFILES
// ============================================

#[derive(Debug, Serialize)]
pub struct ProfilesResponse {
    pub profiles: Vec<Profile>,
}

#[derive(Debug, Serialize)]
pub struct AnalysesResponse {
    pub analyses: Vec<AnalysisRecord>,
}

#[derive(Debug, Serialize)]
pub struct GraphsResponse {
    pub graphs: Vec<SavedGraph>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}
