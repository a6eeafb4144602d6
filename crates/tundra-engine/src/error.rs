//! Error types for the Tundra engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and the batch run.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: tundra_core::ConfigError,
    },

    /// The batch could not be prepared or a site cohort failed.
    #[error("batch error: {source}")]
    Batch {
        /// The underlying batch error.
        #[from]
        source: tundra_core::BatchError,
    },

    /// The output sink failed to open or flush.
    #[error("output error: {source}")]
    Output {
        /// The underlying sink error.
        #[from]
        source: tundra_core::SinkError,
    },

    /// The batch report could not be written.
    #[error("report error: {message}")]
    Report {
        /// Description of the failure.
        message: String,
    },

    /// The blocking batch task panicked or was aborted.
    #[error("batch task failed: {message}")]
    Task {
        /// Description of the failure.
        message: String,
    },
}
