//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Entity models

mod database;
mod models;

pub use database::{Database, is_unique_violation};
pub use models::*;
