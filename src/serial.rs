/// Serial port related errors.
pub(crate) mod error;

/// Opening the serial port as a stream of lines.
pub(crate) mod serial_port;

/// Codecs for decoding messages from the wire.
pub(crate) mod codecs;

/// Finding the port the instrument is attached to.
pub mod discovery;

/// A line as it came off the wire, delimiter stripped.
pub type SerialLine = Vec<u8>;
