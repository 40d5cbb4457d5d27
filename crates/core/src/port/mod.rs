// Port Layer - interfaces for external dependencies

pub mod config;
pub mod store;

pub use config::{queue_or_global, ConfigLookup};
pub use store::{keys, RawHash, Store, StoreTransaction};
