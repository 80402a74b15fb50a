//! Error types for calmirror.

use thiserror::Error;

/// Errors that can occur while mirroring a feed into a destination.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Malformed identifier: UID '{0}' has no characters usable as an event id")]
    MalformedIdentifier(String),

    #[error("Unknown time zone '{tzid}' on event '{uid}'")]
    UnknownTimeZone { uid: String, tzid: String },

    #[error("Local time {datetime} does not exist in time zone '{tzid}'")]
    InvalidLocalTime { datetime: String, tzid: String },

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Failed to fetch feed {uri}: {message}")]
    Fetch { uri: String, message: String },

    #[error("ICS parse error: {0}")]
    Parse(String),

    #[error("Destination API error: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for calmirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;
