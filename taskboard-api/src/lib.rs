//! # Taskboard API Server Library
//!
//! HTTP surface over the Taskboard document store and consistency engines.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `response`: The `{message, data}` response envelope
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod response;
pub mod routes;
