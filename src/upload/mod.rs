//! Upload Assembler
//!
//! Accepts a log file either in one request ([`SingleUpload`]) or split into
//! chunks spread across many requests ([`ChunkUpload`]). Chunks may arrive in
//! any order and may be re-sent; each is written to its own file in the
//! upload's scratch directory. The request whose chunk completes the set
//! reassembles the chunks in index order, decompresses the result, indexes it
//! and registers an [`AnalysisSession`](crate::session::AnalysisSession).
//!
//! ```text
//! Collecting ──(last chunk)──▶ Assembling ──ok──▶ (entry removed, session issued)
//!                                   │
//!                                   └─err─▶ Failed ──(reaper)──▶ (entry + dir removed)
//! ```

mod assembler;
mod error;
mod reassemble;

pub use assembler::UploadAssembler;
pub use error::{UploadError, UploadResult};
pub use reassemble::sanitize_filename;

use crate::session::AnalysisSession;
use std::sync::Arc;

/// One chunk of a chunked upload
#[derive(Debug, Clone, Default)]
pub struct ChunkUpload {
    pub upload_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub data: Vec<u8>,
    pub original_filename: Option<String>,
    /// Size of the uncompressed file as reported by the client
    pub original_size: Option<u64>,
    /// Size of the compressed payload as reported by the client
    pub total_size: Option<u64>,
    /// Save the analysis under this profile once complete
    pub profile_id: Option<String>,
}

/// A whole file sent in one request
#[derive(Debug, Clone, Default)]
pub struct SingleUpload {
    pub filename: String,
    pub data: Vec<u8>,
    /// Client says the bytes are gzip-compressed
    pub compressed: bool,
    pub profile_id: Option<String>,
}

/// Result of accepting a chunk
#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    Progress {
        upload_id: String,
        received: usize,
        total: u32,
    },
    Complete(Arc<AnalysisSession>),
}

/// Where an in-flight upload stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Collecting,
    Assembling,
    Failed(String),
}
