//! API Routes
//!
//! Route handlers organized by functionality.

pub mod export;
pub mod health;
pub mod profiles;
pub mod query;
pub mod upload;
