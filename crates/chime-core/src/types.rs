//! Core domain types for Chime.

pub mod config;
pub mod params;

pub use config::{EngineConfig, OutputFormat};
pub use params::{InstanceState, PlayParams};
