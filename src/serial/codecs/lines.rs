use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::serial::error::SerialPortError;

/// This codec splits incoming bytes on a configurable delimiter,
/// which may be more than a single byte (such as `\r\n`).
#[derive(Debug, Clone)]
pub struct LinesCodec {
    /// How far we have looked for a delimiter into the buffer
    cursor: usize,

    /// How to delimit incoming byte streams.
    /// This delimiter is not included in the yielded frames.
    read_delimiter: Vec<u8>,
}

impl LinesCodec {
    /// Create a new codec.
    /// An empty delimiter falls back to `\n`.
    pub fn new<D: AsRef<[u8]>>(read_delimiter: D) -> Self {
        let read_delimiter = match read_delimiter.as_ref() {
            [] => b"\n".to_vec(),
            delimiter => delimiter.to_vec(),
        };

        Self {
            cursor: 0,
            read_delimiter,
        }
    }
}

impl Default for LinesCodec {
    fn default() -> Self {
        Self::new(b"\r\n")
    }
}

impl Decoder for LinesCodec {
    type Item = Vec<u8>;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let delimiter_len = self.read_delimiter.len();

        if src.len() < self.cursor + delimiter_len {
            return Ok(None);
        }

        let look_at = &src[self.cursor..];

        if let Some(position) = look_at
            .windows(delimiter_len)
            .position(|window| window == self.read_delimiter.as_slice())
        {
            // Since we might "start late" in the buffer (from the cursor),
            // the "global" position within the buffer has to be calculated.
            let actual_position = self.cursor + position;

            // Next time we need to start over.
            self.cursor = 0;

            let line = src.split_to(actual_position);

            // Discard the delimiter.
            src.advance(delimiter_len);

            Ok(Some(line.to_vec()))
        } else {
            // The tail might hold the first part of a delimiter,
            // so those bytes are looked at again next time.
            self.cursor = src.len() + 1 - delimiter_len;

            Ok(None)
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            None => {
                self.cursor = 0;
                Ok(Some(src.split().to_vec()))
            }
        }
    }
}
