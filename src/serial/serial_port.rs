use futures::{stream::BoxStream, StreamExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::codec::FramedRead;
use tracing::{debug, info};

use crate::{
    error::Error,
    serial::{codecs::lines::LinesCodec, error::SerialPortError, SerialLine},
};

/// Lines read from a port, in order.
/// Dropping the stream closes the port.
pub type LineStream = BoxStream<'static, Result<SerialLine, SerialPortError>>;

/// The baud rate the instrument firmware talks at.
pub const DEFAULT_BAUD: u32 = 9600;

/// Builder for a [`LineStream`] reading from a serial port.
#[derive(Debug)]
pub struct SerialPortBuilder {
    baud: u32,
    path: String,
    line_codec: LinesCodec,
}

fn try_create_serial_port(baud: u32, path: &str) -> Result<SerialStream, Error> {
    tokio_serial::new(path, baud)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| Error::Connection(format!("Could not open port at {path}: {e}")))
}

impl SerialPortBuilder {
    /// Start a new builder.
    /// The tty should likely be along the lines of `/dev/ttyACMx` on unix, and `COMx` on Windows.
    pub(crate) fn new(tty: &str) -> Self {
        Self {
            path: tty.to_string(),
            baud: DEFAULT_BAUD,
            line_codec: LinesCodec::default(),
        }
    }

    /// Set the serial port builder's baud.
    pub(crate) fn set_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Set the [`LinesCodec`] to use.
    pub(crate) fn set_line_codec(mut self, codec: LinesCodec) -> Self {
        self.line_codec = codec;
        self
    }

    /// Open the port.
    ///
    /// The stream yields [`SerialPortError::Disconnected`] once if the port reaches end of file,
    /// and ends after any error.
    pub(crate) fn build(self) -> Result<LineStream, Error> {
        info!(%self.path, %self.baud, "Opening serial port");

        let serial_stream = try_create_serial_port(self.baud, &self.path)?;

        let lines = FramedRead::new(serial_stream, self.line_codec)
            .chain(futures::stream::once(async {
                debug!("Serial stream ended");
                Err(SerialPortError::Disconnected)
            }))
            .scan(false, |errored, line| {
                let stop = *errored;
                *errored = line.is_err();
                futures::future::ready((!stop).then_some(line))
            });

        Ok(lines.boxed())
    }
}
