//! Error kinds for mathviz operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on ErrorKind to decide how to handle a failure. Outcomes that
/// the layout engine treats as normal (a full zone, an unsafe transform) are
/// not represented here; they are returned as values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // Scene errors
    // =========================================================================
    /// An element with the same name is already on screen
    DuplicateElement,

    /// The named element is not on screen
    ElementNotFound,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// LLM inference failed
    InferenceFailed,

    /// Provider not available
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    /// Failed to parse model output
    ParseFailed,

    // =========================================================================
    // Rendering errors
    // =========================================================================
    /// The renderer exited with an error or produced no artifact
    RenderFailed,

    /// The renderer exceeded its wall-clock budget
    RenderTimeout,

    // =========================================================================
    // Workflow errors
    // =========================================================================
    /// The run was cancelled by its owner
    Cancelled,

    /// The orchestrator visited more nodes than its hard budget allows
    StepBudgetExceeded,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,

    /// Serialization/deserialization failed
    SerializationFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Scene
            ErrorKind::DuplicateElement => "DuplicateElement",
            ErrorKind::ElementNotFound => "ElementNotFound",

            // Inference
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::ParseFailed => "ParseFailed",

            // Rendering
            ErrorKind::RenderFailed => "RenderFailed",
            ErrorKind::RenderTimeout => "RenderTimeout",

            // Workflow
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::StepBudgetExceeded => "StepBudgetExceeded",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::RenderTimeout
                | ErrorKind::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::DuplicateElement.to_string(), "DuplicateElement");
        assert_eq!(ErrorKind::RenderTimeout.to_string(), "RenderTimeout");
    }

    #[test]
    fn test_is_retryable() {
        assert!(ErrorKind::NetworkFailed.is_retryable());
        assert!(ErrorKind::RenderTimeout.is_retryable());
        assert!(!ErrorKind::DuplicateElement.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }
}
