//! # Taskboard Shared Library
//!
//! Domain types, persistence and consistency logic used by the Taskboard API
//! server.
//!
//! ## Module Organization
//!
//! - `store`: document store trait, query language, schemas and backends
//! - `db`: PostgreSQL pool and migrations for the PostgreSQL backend
//! - `models`: typed Task and User records over the store
//! - `sync`: consistency engines keeping assignments and pending lists aligned

pub mod db;
pub mod models;
pub mod store;
pub mod sync;

/// Current version of the Taskboard shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
