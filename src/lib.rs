//! Registry Cache - caching reverse proxy for public package registries.
//!
//! One server process per ecosystem (NPM, RubyGems, PyPI): artifact
//! downloads are cached on disk with single-flight downloads and atomic
//! installs; all other registry traffic is transparently proxied, with
//! metadata URLs rewritten so clients fetch artifacts through the proxy.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod ecosystem;
pub mod error;
pub mod server;
pub mod stats;

pub use config::Config;
pub use error::{AppError, Result};
