//! Persistence layer — SQLite-backed append-only logs.

pub mod db;
pub mod emails;

pub use db::Database;
pub use emails::{ClassificationStore, ClassifiedEmail};
