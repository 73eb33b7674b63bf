//! Error types for WEFT.
//!
//! This module provides strongly-typed errors with actionable context.
//! Every error carries the identifiers (graph id, vector id, field, URL)
//! needed to locate the failure inside a traversal.
//!
//! The engine never lets one of these escape a vector boundary during a
//! traversal: failures are funneled into `error` events and the
//! traversal continues (see the scheduler). The only construction-time
//! failure is [`WeftError::GraphMissing`].

use thiserror::Error;

/// The main error type for WEFT operations.
#[derive(Error, Debug)]
pub enum WeftError {
    // =========================================================================
    // Construction Errors (E001-E099)
    // =========================================================================
    /// No graph was supplied to the scheduler constructor.
    #[error("E001: A graph is required to construct a scheduler")]
    GraphMissing,

    // =========================================================================
    // Loader Errors (E100-E199)
    // =========================================================================
    /// No fetch facility is available and the artifact is not cached.
    #[error("E101: Fetch is not defined for artifact URL '{url}'")]
    FetchUndefined {
        /// The artifact URL that could not be resolved.
        url: String,
    },

    /// The fetcher failed to retrieve an artifact.
    #[error("E102: Failed to fetch artifact at '{url}': {cause}")]
    FetchFailed {
        /// The artifact URL.
        url: String,
        /// Reason for the fetch failure.
        cause: String,
    },

    /// A fetched or listener-supplied artifact did not parse.
    #[error("E103: Failed to parse artifact at '{url}': {cause}")]
    ArtifactParse {
        /// The artifact URL.
        url: String,
        /// Reason for the parse failure.
        cause: String,
    },

    // =========================================================================
    // Link Resolution Errors (E200-E299)
    // =========================================================================
    /// The input field has no mapping into the linked graph.
    ///
    /// Failures to load a linked artifact surface through the loader
    /// errors above; the traversal then continues with the
    /// pre-resolution vector.
    #[error("E201: No input mapping for field '{field}' on linked graph '{id}'")]
    InputFieldUnmapped {
        /// The unmapped input field.
        field: String,
        /// The linked graph id.
        id: String,
    },

    // =========================================================================
    // Traversal Errors (E300-E399)
    // =========================================================================
    /// A connector or entry point referenced a vector that does not exist.
    #[error("E301: Vector '{vector_id}' not found in graph '{graph_id}'")]
    VectorNotFound {
        /// The missing vector id.
        vector_id: String,
        /// The graph that was searched.
        graph_id: String,
    },

    /// A vector has neither a set handler nor a linked graph.
    #[error("E302: No template for set found on vector '{vector_id}'")]
    TemplateMissing {
        /// The vector without a handler.
        vector_id: String,
    },

    /// The set handler failed to compile.
    #[error("E303: Handler for vector '{vector_id}' failed to compile: {cause}")]
    HandlerCompile {
        /// The vector whose handler failed.
        vector_id: String,
        /// The compiler diagnostic.
        cause: String,
    },

    /// The set handler threw during execution.
    #[error("E304: Handler for vector '{vector_id}' failed: {cause}")]
    HandlerFailed {
        /// The vector whose handler failed.
        vector_id: String,
        /// The runtime diagnostic.
        cause: String,
    },

    /// An edge write failed while fanning out to its connectors.
    #[error("E305: Edge setter error on '{vector_id}.{field}': {cause}")]
    EdgeSetter {
        /// The vector that owns the edge.
        vector_id: String,
        /// The edge field being written.
        field: String,
        /// The underlying failure.
        cause: String,
    },

    /// The URL entry pattern is not a valid regular expression.
    #[error("E306: Invalid URL pattern '{pattern}': {cause}")]
    PatternInvalid {
        /// The offending pattern.
        pattern: String,
        /// The regex diagnostic.
        cause: String,
    },

    // =========================================================================
    // Serialization Errors (E900-E999)
    // =========================================================================
    /// Serialization/deserialization error.
    #[error("E901: Serialization error: {0}")]
    Serialization(
        /// The serialization error message.
        String,
    ),
}

impl WeftError {
    /// Get the error code (e.g., "E001").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::GraphMissing => "E001",
            Self::FetchUndefined { .. } => "E101",
            Self::FetchFailed { .. } => "E102",
            Self::ArtifactParse { .. } => "E103",
            Self::InputFieldUnmapped { .. } => "E201",
            Self::VectorNotFound { .. } => "E301",
            Self::TemplateMissing { .. } => "E302",
            Self::HandlerCompile { .. } => "E303",
            Self::HandlerFailed { .. } => "E304",
            Self::EdgeSetter { .. } => "E305",
            Self::PatternInvalid { .. } => "E306",
            Self::Serialization(_) => "E901",
        }
    }

    /// Check if this error originates in artifact loading.
    #[must_use]
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::FetchUndefined { .. } | Self::FetchFailed { .. } | Self::ArtifactParse { .. }
        )
    }

    /// Check if this error originates in the set handler.
    #[must_use]
    pub fn is_handler_error(&self) -> bool {
        matches!(
            self,
            Self::HandlerCompile { .. } | Self::HandlerFailed { .. }
        )
    }
}

impl From<serde_json::Error> for WeftError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type alias using `WeftError`.
pub type Result<T> = std::result::Result<T, WeftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(WeftError::GraphMissing.code(), "E001");

        let err = WeftError::FetchUndefined {
            url: "artifacts/graph/g1.0".to_string(),
        };
        assert_eq!(err.code(), "E101");

        let err = WeftError::TemplateMissing {
            vector_id: "v1".to_string(),
        };
        assert_eq!(err.code(), "E302");
    }

    #[test]
    fn fetch_undefined_message() {
        let err = WeftError::FetchUndefined {
            url: "artifacts/vectors/n1.0".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Fetch is not defined"));
        assert!(msg.contains("artifacts/vectors/n1.0"));
    }

    #[test]
    fn template_missing_message() {
        let err = WeftError::TemplateMissing {
            vector_id: "v9".to_string(),
        };
        assert!(format!("{}", err).contains("No template for set found"));
    }

    #[test]
    fn edge_setter_message() {
        let err = WeftError::EdgeSetter {
            vector_id: "v1".to_string(),
            field: "out".to_string(),
            cause: "boom".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Edge setter error"));
        assert!(msg.contains("v1.out"));
    }

    #[test]
    fn classification() {
        assert!(
            WeftError::FetchFailed {
                url: "u".to_string(),
                cause: "timeout".to_string()
            }
            .is_load_error()
        );
        assert!(
            WeftError::HandlerFailed {
                vector_id: "v".to_string(),
                cause: "x".to_string()
            }
            .is_handler_error()
        );
        assert!(!WeftError::GraphMissing.is_load_error());
    }
}
