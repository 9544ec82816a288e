//! Shared plumbing for the rollcall services: configuration, logging,
//! database and cache connections, credential handling, HTTP middleware
//! and metrics.

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod server;

pub use error::Error;
