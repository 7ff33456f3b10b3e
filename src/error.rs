//! Error types for BathyImg

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// BathyImg error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Camera or GPS device cannot be opened
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Malformed NMEA sentence
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Checksum declared by the sentence
        expected: u8,
        /// Checksum computed over the sentence body
        actual: u8,
    },

    /// Sentence field could not be parsed
    #[error("Invalid sentence: {0}")]
    InvalidSentence(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}
