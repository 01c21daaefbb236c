use thiserror::Error;

/// Invalid static configuration. Raised while building the updater, never mid-rebuild.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("mount '{mount}' did not conform to 'source:dest' format")]
    MalformedMount { mount: String },
}

/// Errors reported by a [`crate::runtime::ContainerRuntime`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The call failed in a way that may succeed when repeated (connection reset, daemon hiccup).
    #[error("transient runtime error: {0}")]
    Transient(String),
    #[error("runtime error: {0}")]
    Failed(String),
}

impl RuntimeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RuntimeError::Transient(_))
    }
}

/// A single image pull that did not complete.
#[derive(Debug, Error)]
pub enum PullError {
    #[error("pull of {image} did not complete within {seconds}s")]
    Timeout { image: String, seconds: u64 },
    #[error("pull of {image} failed")]
    Runtime {
        image: String,
        #[source]
        source: RuntimeError,
    },
}

/// Failures of a rebuild as a whole. Pull failures and non-zero updater exits are not among them.
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("updater container {container_id} did not exit before the wait deadline")]
    Timeout { container_id: String },
    #[error("updater container could not be {action}")]
    Runtime {
        action: &'static str,
        #[source]
        source: RuntimeError,
    },
    /// The updater container exists but a later step on it failed. It is not reclaimed.
    #[error("updater container {container_id} could not be {action}")]
    Container {
        container_id: String,
        action: &'static str,
        #[source]
        source: RuntimeError,
    },
}
