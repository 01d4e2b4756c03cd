//! visa-server - HTTP backend for visa listings and applications
//!
//! Visa listings and the applications made against them live in two
//! document collections. The service exposes:
//! - Create, browse, update and delete of visa listings
//! - Applications that reference a visa, joined back to it on read
//! - MongoDB storage, with an in-memory backend for tests and local runs

pub mod api;
pub mod config;
pub mod error;
pub mod service;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
