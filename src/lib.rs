//! # FlightLens
//!
//! Flight log explorer for ArduPilot DataFlash logs. Clients upload a log in
//! one request or in gzip-compressed chunks, receive a session token and then
//! query the indexed log over HTTP.
//!
//! ## Modules
//!
//! - [`telemetry`]: DataFlash decoding behind the [`LogSource`](telemetry::LogSource) seam
//! - [`index`]: One-pass summary of message types, numeric fields and flight modes
//! - [`upload`]: Chunk collection, reassembly, decompression and the stale-upload reaper
//! - [`session`]: Token → analyzed log
//! - [`query`]: Time series, CSV export, stats, dumps and parameters
//! - [`persistence`]: Profiles, saved analyses and graphs (SQLite, JSON files or memory)
//! - [`api`]: REST API server with Axum
//! - [`config`], [`logging`]: Ambient setup for the binaries
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flightlens::index::build_index;
//! use flightlens::telemetry::DataflashSource;
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let index = build_index(&DataflashSource, Path::new("00000042.BIN"))?;
//!
//!     for (name, info) in &index.messages {
//!         println!("{:<6} {:>8} records  {:?}", name, info.count, info.fields);
//!     }
//!     for mode in &index.flight_modes {
//!         println!("{} for {:.1}s", mode.mode, mode.duration);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod index;
pub mod logging;
pub mod persistence;
pub mod query;
pub mod session;
pub mod telemetry;
pub mod upload;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError};

pub use index::{build_index, LogIndex, MessageInfo};

pub use persistence::{open_store, PersistenceError, ProfileStore};

pub use query::{QueryEngine, QueryError};

pub use session::{AnalysisSession, InMemorySessionStore, SessionStore};

pub use telemetry::{DataflashSource, FieldValue, LogSource, Record, TelemetryError};

pub use upload::{UploadAssembler, UploadError};
