use super::error::{UploadError, UploadResult};
use super::reassemble::{self, chunk_file_name, sanitize_filename, BLOB_NAME};
use super::{ChunkOutcome, ChunkUpload, SingleUpload, UploadState};
use crate::config::UploadConfig;
use crate::index::{build_index, LogIndex};
use crate::persistence::{NewAnalysis, ProfileStore};
use crate::session::{AnalysisSession, SessionStore};
use crate::telemetry::LogSource;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Tracking entry for one chunked upload
#[derive(Debug)]
struct UploadSession {
    total_chunks: u32,
    received: HashSet<u32>,
    /// Allocated on the first chunk write
    work_dir: Option<PathBuf>,
    original_filename: Option<String>,
    original_size: Option<u64>,
    total_size: Option<u64>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    state: UploadState,
}

impl UploadSession {
    fn new(total_chunks: u32) -> Self {
        let now = Utc::now();
        Self {
            total_chunks,
            received: HashSet::new(),
            work_dir: None,
            original_filename: None,
            original_size: None,
            total_size: None,
            created_at: now,
            last_activity: now,
            state: UploadState::Collecting,
        }
    }

    fn is_complete(&self) -> bool {
        self.received.len() == self.total_chunks as usize
    }

    fn is_reapable(&self, cutoff: DateTime<Utc>) -> bool {
        matches!(self.state, UploadState::Failed(_)) || self.last_activity < cutoff
    }
}

fn validate(chunk: &ChunkUpload) -> UploadResult<()> {
    if chunk.upload_id.trim().is_empty() {
        return Err(UploadError::Invalid("upload_id required".to_string()));
    }
    if chunk.total_chunks == 0 {
        return Err(UploadError::Invalid("total_chunks must be at least 1".to_string()));
    }
    if chunk.chunk_index >= chunk.total_chunks {
        return Err(UploadError::Invalid(format!(
            "chunk_index {} out of range for {} chunks",
            chunk.chunk_index, chunk.total_chunks
        )));
    }
    Ok(())
}

/// Blocking tail shared by both upload paths
fn unpack_and_index(
    source: &dyn LogSource,
    work_dir: &Path,
    blob: &Path,
    filename: &str,
    force_gzip: bool,
) -> UploadResult<(PathBuf, LogIndex, u64)> {
    let path = reassemble::unpack(blob, work_dir, filename, force_gzip)?;
    let file_size = std::fs::metadata(&path)?.len();
    let index = build_index(source, &path)?;
    Ok((path, index, file_size))
}

/// Tracks in-flight uploads and turns finished ones into analysis sessions
pub struct UploadAssembler {
    uploads: Mutex<HashMap<String, Arc<Mutex<UploadSession>>>>,
    work_root: PathBuf,
    stale_after: Duration,
    sweep_interval: std::time::Duration,
    source: Arc<dyn LogSource>,
    sessions: Arc<dyn SessionStore>,
    profiles: Option<Arc<dyn ProfileStore>>,
}

impl UploadAssembler {
    pub fn new(
        config: &UploadConfig,
        source: Arc<dyn LogSource>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            uploads: Mutex::new(HashMap::new()),
            work_root: config.work_dir.clone(),
            stale_after: Duration::seconds(config.stale_after_secs as i64),
            sweep_interval: std::time::Duration::from_secs(config.sweep_interval_secs.max(1)),
            source,
            sessions,
            profiles: None,
        }
    }

    /// Save completed analyses for uploads that name a profile
    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// Number of tracked uploads, failed ones included
    pub async fn active_uploads(&self) -> usize {
        self.uploads.lock().await.len()
    }

    pub async fn upload_state(&self, upload_id: &str) -> Option<UploadState> {
        let entry = self.uploads.lock().await.get(upload_id).cloned()?;
        let upload = entry.lock().await;
        Some(upload.state.clone())
    }

    async fn new_work_dir(&self) -> UploadResult<PathBuf> {
        let dir = self
            .work_root
            .join(format!("upload_{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Accept one chunk. The call that delivers the last missing chunk also
    /// reassembles, decompresses and indexes the upload.
    pub async fn receive_chunk(&self, chunk: ChunkUpload) -> UploadResult<ChunkOutcome> {
        validate(&chunk)?;
        let upload_id = chunk.upload_id.clone();

        let entry = {
            let mut uploads = self.uploads.lock().await;
            Arc::clone(uploads.entry(upload_id.clone()).or_insert_with(|| {
                tracing::info!(
                    upload_id = %upload_id,
                    total_chunks = chunk.total_chunks,
                    "Upload started"
                );
                Arc::new(Mutex::new(UploadSession::new(chunk.total_chunks)))
            }))
        };

        let mut upload = entry.lock().await;
        match &upload.state {
            UploadState::Collecting => {}
            UploadState::Assembling => {
                return Err(UploadError::Invalid(format!(
                    "upload {} is already complete",
                    upload_id
                )));
            }
            UploadState::Failed(reason) => {
                return Err(UploadError::Failed {
                    upload_id,
                    reason: reason.clone(),
                });
            }
        }
        if upload.total_chunks != chunk.total_chunks {
            return Err(UploadError::Invalid(format!(
                "total_chunks changed from {} to {}",
                upload.total_chunks, chunk.total_chunks
            )));
        }

        let work_dir = match upload.work_dir.clone() {
            Some(dir) => dir,
            None => {
                let dir = self.new_work_dir().await?;
                upload.work_dir = Some(dir.clone());
                dir
            }
        };

        tokio::fs::write(work_dir.join(chunk_file_name(chunk.chunk_index)), &chunk.data).await?;
        upload.received.insert(chunk.chunk_index);
        upload.last_activity = Utc::now();
        if chunk.original_filename.is_some() {
            upload.original_filename = chunk.original_filename;
        }
        if chunk.original_size.is_some() {
            upload.original_size = chunk.original_size;
        }
        if chunk.total_size.is_some() {
            upload.total_size = chunk.total_size;
        }

        tracing::debug!(
            upload_id = %upload_id,
            chunk_index = chunk.chunk_index,
            bytes = chunk.data.len(),
            received = upload.received.len(),
            total = upload.total_chunks,
            "Chunk stored"
        );

        if !upload.is_complete() {
            return Ok(ChunkOutcome::Progress {
                upload_id,
                received: upload.received.len(),
                total: upload.total_chunks,
            });
        }

        upload.state = UploadState::Assembling;
        let filename = sanitize_filename(upload.original_filename.as_deref().unwrap_or_default());
        let total_chunks = upload.total_chunks;
        let source = Arc::clone(&self.source);
        let dir = work_dir.clone();

        let result = tokio::task::spawn_blocking(move || {
            let (blob, blob_size) = reassemble::concat_chunks(&dir, total_chunks)?;
            tracing::debug!(blob_size, "Chunks reassembled");
            unpack_and_index(source.as_ref(), &dir, &blob, &filename, false)
        })
        .await
        .map_err(UploadError::from)
        .and_then(|r| r);

        match result {
            Ok((path, index, file_size)) => {
                let session = self
                    .register(
                        work_dir,
                        path,
                        index,
                        file_size,
                        upload.original_size,
                        chunk.profile_id,
                    )
                    .await;
                self.uploads.lock().await.remove(&upload_id);

                tracing::info!(
                    upload_id = %upload_id,
                    token = %session.token,
                    file_size,
                    declared_total_size = ?upload.total_size,
                    elapsed_ms = (Utc::now() - upload.created_at).num_milliseconds(),
                    "Upload complete"
                );
                Ok(ChunkOutcome::Complete(session))
            }
            Err(e) => {
                tracing::warn!(upload_id = %upload_id, error = %e, "Upload failed");
                upload.state = UploadState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Analyze a file sent in a single request
    pub async fn analyze_file(&self, upload: SingleUpload) -> UploadResult<Arc<AnalysisSession>> {
        let force_gzip = upload.compressed || upload.filename.to_ascii_lowercase().ends_with(".gz");
        let filename = sanitize_filename(&upload.filename);
        let work_dir = self.new_work_dir().await?;
        let blob = work_dir.join(BLOB_NAME);

        let result = match tokio::fs::write(&blob, &upload.data).await {
            Ok(()) => {
                let source = Arc::clone(&self.source);
                let dir = work_dir.clone();
                tokio::task::spawn_blocking(move || {
                    unpack_and_index(source.as_ref(), &dir, &blob, &filename, force_gzip)
                })
                .await
                .map_err(UploadError::from)
                .and_then(|r| r)
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok((path, index, file_size)) => {
                let session = self
                    .register(work_dir, path, index, file_size, None, upload.profile_id)
                    .await;
                tracing::info!(token = %session.token, file_size, "File analyzed");
                Ok(session)
            }
            Err(e) => {
                // Nothing tracks this directory, so it goes now
                if let Err(cleanup) = tokio::fs::remove_dir_all(&work_dir).await {
                    tracing::warn!(dir = %work_dir.display(), error = %cleanup, "Failed to remove work dir");
                }
                Err(e)
            }
        }
    }

    async fn register(
        &self,
        work_dir: PathBuf,
        path: PathBuf,
        index: LogIndex,
        file_size: u64,
        original_size: Option<u64>,
        profile_id: Option<String>,
    ) -> Arc<AnalysisSession> {
        let session = Arc::new(AnalysisSession::new(
            work_dir,
            path,
            index,
            file_size,
            original_size,
        ));
        self.sessions.put(Arc::clone(&session)).await;

        if let (Some(profile_id), Some(profiles)) = (profile_id, &self.profiles) {
            let analysis = NewAnalysis {
                profile_id: profile_id.clone(),
                filename: session.filename.clone(),
                file_size,
                original_size,
                analysis_data: session.index.clone(),
                token: Some(session.token.clone()),
            };
            if let Err(e) = profiles.save_analysis_result(analysis).await {
                tracing::warn!(
                    profile_id = %profile_id,
                    token = %session.token,
                    error = %e,
                    "Failed to save analysis result"
                );
            }
        }

        session
    }

    /// Drop failed uploads and uploads idle since before `now - stale_after`,
    /// deleting their work dirs. Uploads busy with a request are skipped.
    pub async fn reap_stale(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.stale_after;
        let mut dirs = Vec::new();
        let mut reaped = 0;

        {
            let mut uploads = self.uploads.lock().await;
            uploads.retain(|upload_id, entry| {
                let Ok(mut upload) = entry.try_lock() else {
                    return true;
                };
                if !upload.is_reapable(cutoff) {
                    return true;
                }
                tracing::info!(
                    upload_id = %upload_id,
                    state = ?upload.state,
                    received = upload.received.len(),
                    total = upload.total_chunks,
                    "Reaping upload"
                );
                // Requests already holding this entry must not resurrect it
                upload.state = UploadState::Failed("upload expired".to_string());
                dirs.extend(upload.work_dir.take());
                reaped += 1;
                false
            });
        }

        for dir in dirs {
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove work dir");
            }
        }
        reaped
    }

    /// Run [`reap_stale`](Self::reap_stale) on a fixed interval
    pub fn start_reaper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let assembler = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(assembler.sweep_interval);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let reaped = assembler.reap_stale(Utc::now()).await;
                if reaped > 0 {
                    tracing::info!(reaped, "Stale uploads removed");
                }
            }
        })
    }
}
