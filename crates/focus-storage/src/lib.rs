//! Focus Guard Storage - SQLite persistence layer.
//!
//! This crate persists everything the engine needs across restarts:
//!
//! - Settings (JSON document in the `config` table)
//! - The active session record
//! - Installed network block rules (updated transactionally)
//! - Session history, subscription, and focus statistics
//!
//! [`Database`] implements the core collaborator traits (`SessionStore`,
//! `Entitlements`, `SessionAnalytics`, `RuleStore`, `SettingsSource`), so a
//! single handle can be shared by every component.
//!
//! # Example
//!
//! ```no_run
//! use focus_storage::Database;
//!
//! let db = Database::in_memory().unwrap();
//! let settings = db.load_settings().unwrap();
//! assert!(settings.always_block.is_empty());
//! ```

mod adapters;
mod database;
pub mod error;
pub mod models;
mod pool;
pub mod repository;
mod schema;

pub use database::Database;
pub use error::{Result, StorageError};
pub use models::{FocusStats, SessionHistoryEntry};
pub use pool::ConnectionPool;
