/// Daemon-internal errors.
///
/// Wire-visible errors are values on the response
/// ([`blued_common::ErrorCode`]); this type only covers failures of the
/// daemon's own plumbing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading or parsing the configuration file failed.
    #[error("cannot load configuration from {path}")]
    Config {
        /// Path of the offending file.
        path: String,
        /// What went wrong.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A filesystem operation under the storage root failed.
    #[error("storage operation failed at {path}")]
    Storage {
        /// Path of the offending entry.
        path: String,
        /// What went wrong.
        #[source]
        source: std::io::Error,
    },

    /// The display assignment file could not be read or written.
    #[error("cannot access display assignment file {path}")]
    DisplayAssignment {
        /// Path of the offending file.
        path: String,
        /// What went wrong.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
