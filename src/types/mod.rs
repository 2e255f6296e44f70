//! Shared types for Keygate

pub mod error;

pub use error::{KeygateError, Result};
