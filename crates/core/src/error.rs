//! Centralized error types for the Rise Scout infrastructure workspace.

use thiserror::Error;

/// Top-level error enum. Variants map to the failure points of a pass.
///
/// Every variant is fatal: a pass either completes or aborts with exactly one
/// of these.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScoutError {
    /// The dependency manifest could not be pinned.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Every applicable build strategy failed for an artifact.
    #[error("Packaging error [{target}]: {reason}")]
    Packaging { target: String, reason: String },

    /// A resource would be created before something it depends on.
    #[error("Ordering error: {0}")]
    Ordering(String),

    /// Dangling reference, duplicate id or cycle in the resource graph.
    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScoutError {
    pub fn packaging(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Packaging {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type ScoutResult<T> = Result<T, ScoutError>;
