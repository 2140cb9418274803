/// Splits the byte stream from the instrument into lines.
pub(crate) mod lines;
