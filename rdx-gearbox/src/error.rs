//! Error types for the Gearbox library.
//!
//! The control loop itself never fails: shifting at a bound or starting an
//! already started controller simply reports `false`. Errors only come from
//! the edges of the system, which are configuration, the named registry and
//! the gear store.

use thiserror::Error;

/// Core error type for the Gearbox library.
#[derive(Error, Debug)]
pub enum GearboxError {
    /// The configuration was readable but describes an unusable controller.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration sources could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A registry already holds an instance under this name.
    #[error("a gearbox named '{0}' already exists")]
    NameTaken(String),

    /// A registry holds no instance under this name.
    #[error("no gearbox named '{0}'")]
    NotFound(String),

    /// A registry-wide operation name that does not exist.
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    /// The gear store failed for a reason other than IO or encoding.
    #[error("gear store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Gearbox operations.
pub type Result<T> = std::result::Result<T, GearboxError>;
