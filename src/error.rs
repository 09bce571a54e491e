//! Error types for the Weft operator

use thiserror::Error;

/// Main error type for Weft operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for the Mesh spec
    #[error("validation error: {0}")]
    Validation(String),

    /// Mesh API definition registration error
    #[error("crd registration error: {0}")]
    CrdRegistration(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A component reconciler failed, aborting the pass at that step
    #[error("component {component} (step {step}) failed: {source}")]
    Component {
        /// Name of the failed component
        component: &'static str,
        /// Zero-based position of the failed step in the pipeline
        step: usize,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a CRD registration error with the given message
    pub fn crd_registration(msg: impl Into<String>) -> Self {
        Self::CrdRegistration(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Wrap a component failure with the step it originated from
    pub fn component(step: usize, component: &'static str, source: Error) -> Self {
        Self::Component {
            component,
            step,
            source: Box::new(source),
        }
    }
}
