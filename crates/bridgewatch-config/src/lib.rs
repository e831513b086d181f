//! # bridgewatch config
//!
//! Configuration management for the bridge monitor: threshold schema, TOML
//! loading with `${VAR}` expansion, and validation.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
