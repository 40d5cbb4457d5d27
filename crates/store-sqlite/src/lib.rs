// Taskmesh Infrastructure - SQLite Adapter
// Implements: taskmesh_core::port::{Store, StoreTransaction, ConfigLookup}

mod config;
mod connection;
mod error;
mod migration;
mod store;
mod transaction;

pub use config::SqliteConfig;
pub use connection::create_pool;
pub use migration::run_migrations;
pub use store::SqliteStore;
pub use transaction::SqliteTransaction;

// sqlx::Error conversion is handled by the helper in `error.rs` rather than
// a `From` impl, since `EngineError` lives in `taskmesh-core` and Rust's
// orphan rules forbid implementing a foreign trait on a foreign type here.
