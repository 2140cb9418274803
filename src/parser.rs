//! Classifying the lines the instrument prints.
//!
//! The firmware prints free text. Only two kinds of lines matter:
//! impedance measurements (`Z = 4.72 kΩ`) and notices that the test frequency changed.
//! Everything else is logged and dropped.

use std::fmt::Display;

use tracing::{debug, info, warn};

use crate::{error::Error, store::Reading};

/// Measurement lines contain this.
pub const MEASUREMENT_MARKER: &str = "Z = ";

/// The firmware prints this when a new test frequency was selected.
pub const FREQUENCY_CHANGE_MARKER: &str = "Nouvelle fréquence :";

/// What a line from the instrument turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// An impedance measurement.
    Measurement(Reading),

    /// The instrument switched test frequency.
    FrequencyChange(String),

    /// Anything else.
    Unrecognized(String),
}

impl Display for LineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineEvent::Measurement(reading) => write!(f, "measurement: {reading}"),
            LineEvent::FrequencyChange(line) => write!(f, "frequency change: {line}"),
            LineEvent::Unrecognized(line) => write!(f, "unrecognized: {line}"),
        }
    }
}

/// Classify a decoded line.
///
/// Markers are looked for in the line as received, only the payload is trimmed.
pub fn classify(line: &str) -> LineEvent {
    let payload = line.trim();

    if line.contains(MEASUREMENT_MARKER) {
        LineEvent::Measurement(Reading::new(payload))
    } else if line.contains(FREQUENCY_CHANGE_MARKER) {
        LineEvent::FrequencyChange(payload.into())
    } else {
        LineEvent::Unrecognized(payload.into())
    }
}

/// Classify a raw line off the wire.
///
/// Bytes which are not valid UTF-8 make the line [`LineEvent::Unrecognized`],
/// whatever they would have said.
pub fn classify_bytes(line: &[u8]) -> LineEvent {
    match std::str::from_utf8(line) {
        Ok(line) => classify(line),
        Err(e) => {
            let lossy = String::from_utf8_lossy(line);
            let problem = Error::Parse(format!("`{}`: {e}", lossy.trim()));
            warn!(%problem);

            LineEvent::Unrecognized(lossy.trim().into())
        }
    }
}

/// Log what a line was, at a level fitting its importance.
pub(crate) fn trace_event(event: &LineEvent) {
    match event {
        LineEvent::Measurement(_) => debug!(%event),
        LineEvent::FrequencyChange(_) => info!(%event, "Frequency changed"),
        LineEvent::Unrecognized(_) => debug!(%event, "Ignoring line"),
    }
}
