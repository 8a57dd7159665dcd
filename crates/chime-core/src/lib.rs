//! # chime-core
//!
//! Core types, configuration, and error handling for the Chime sound engine.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
