//! SQLite storage for the Marketgate market data cache.
//!
//! The market data core only knows the string-keyed [`BlobStore`] contract.
//! This crate provides the SQLite-backed implementation hosts plug in:
//!
//! ```text
//! market-data (Cache)
//!         │  BlobStore::get / set / delete
//!         ▼
//! storage-sqlite (this crate)
//!         │
//!         ▼
//!     SQLite DB
//! ```
//!
//! [`BlobStore`]: marketgate_market_data::BlobStore

pub mod blob_store;
pub mod db;
pub mod errors;

pub use blob_store::SqliteBlobStore;
pub use errors::{Result, StorageError};
