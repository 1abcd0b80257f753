//! Query Engine
//!
//! Answers questions about an analyzed log by re-scanning its file:
//!
//! - **Time series**: one field of one message type, optionally decimated
//! - **CSV export**: every indexed numeric field of one message type
//! - **Statistics**: record totals and the decoder time span
//! - **Dump**: the first N raw records of a type
//! - **Parameters**: the final value of every `PARM` name
//!
//! Flight modes and the message map are served from the index without
//! touching the file.

mod engine;
mod error;

pub use engine::{DumpEntry, LogStats, QueryEngine, SeriesPoint};
pub use error::{QueryError, QueryResult};
