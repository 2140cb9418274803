use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors thay may occur in this library.
#[derive(Debug, Error, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub enum Error {
    /// Listing the available serial ports failed, or nothing suitable was found.
    #[error("Serial port discovery failed: {0}")]
    Discovery(String),

    /// Opening the serial port failed, or the connection broke afterwards.
    #[error("{0}")]
    Connection(String),

    /// A line from the instrument could not be decoded cleanly.
    #[error("Could not parse line: {0}")]
    Parse(String),

    /// The configuration is not usable.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// Bad json.
    #[error("The request `{request}` could not be deserialized. Problem: {problem}")]
    BadJson {
        /// The problematic request.
        request: String,

        /// The deserialization issue.
        problem: String,
    },

    /// The web server could not be started or stopped unexpectedly.
    #[error("Server problem: {0}")]
    Server(String),
}

impl Error {
    /// Get the message of a bad configuration, if this is one.
    pub fn try_into_bad_config(self) -> Option<String> {
        match self {
            Error::BadConfig(problem) => Some(problem),
            _ => None,
        }
    }
}
