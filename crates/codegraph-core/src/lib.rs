//! Configuration loading and service bootstrap for codegraph.

pub mod bootstrap;
pub mod config;

pub use config::{Config, ConfigError};
