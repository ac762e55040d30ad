//! Error types for the Strata operator
//!
//! Errors carry structured context (cluster, component, catalog path) so a
//! failing reconcile pass can be diagnosed from logs alone.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Strata operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for the StrataCluster spec
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Name of the cluster with invalid configuration
        cluster: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.masters.instance.replicas")
        field: Option<String>,
    },

    /// Cluster administrative catalog error
    #[error("catalog error at {path}: {message}")]
    Catalog {
        /// Catalog path the operation targeted (e.g., "/racks/r1")
        path: String,
        /// Description of what failed
        message: String,
        /// True when the failure was an object-already-exists race
        already_exists: bool,
    },

    /// Config generation error for a required artifact
    #[error("config generation error for {role}: {message}")]
    Config {
        /// Role whose config could not be produced
        role: String,
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "component")
        context: String,
    },
}

impl Error {
    /// Create a validation error without cluster context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with cluster context
    pub fn validation_for(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with cluster context and field path
    pub fn validation_for_field(
        cluster: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a catalog error for the given path
    pub fn catalog(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Catalog {
            path: path.into(),
            message: msg.into(),
            already_exists: false,
        }
    }

    /// Create a catalog error representing an object-already-exists race
    pub fn catalog_already_exists(path: impl Into<String>) -> Self {
        Self::Catalog {
            path: path.into(),
            message: "object already exists".to_string(),
            already_exists: true,
        }
    }

    /// Create a config generation error for the given role
    pub fn config(role: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            role: role.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error without specific context
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// True when the failure was an expected creation race.
    ///
    /// Callers creating catalog objects treat this as success: a concurrent
    /// pass (or a prior partial run) already created the object.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Error::Catalog {
                already_exists: true,
                ..
            }
        )
    }

    /// Check if this error is retryable
    ///
    /// Validation and config-generation errors are not retryable (the spec
    /// must be fixed). Transient platform and catalog errors are retried on
    /// the next reconcile pass.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // Retry on transient K8s errors (connection, timeout).
                // Don't retry on 4xx errors (validation, not found, etc.)
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::Validation { .. } => false,
            Error::Catalog { already_exists, .. } => !already_exists,
            Error::Config { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the cluster name if this error carries one
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Error::Validation { cluster, .. } => Some(cluster),
            _ => None,
        }
    }
}
