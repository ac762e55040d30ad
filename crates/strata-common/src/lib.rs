//! Common types for the Strata operator: CRDs, errors, labels and telemetry

#![deny(missing_docs)]

pub mod consts;
pub mod crd;
pub mod error;
pub mod events;
pub mod labels;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager name used for all server-side apply patches
pub const FIELD_MANAGER: &str = "strata-operator";
