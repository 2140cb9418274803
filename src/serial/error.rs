use std::io;

use thiserror::Error;

/// Errors from the serial transport.
#[derive(Debug, Error)]
pub enum SerialPortError {
    /// IO related errors.
    #[error("Underlying IO problem: {0}")]
    IO(#[from] io::Error),

    /// Serial port related errors, such as the port not existing.
    #[error("Serial port problem: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// The device stopped producing data and the stream ended.
    #[error("Serial port disconnected")]
    Disconnected,
}
