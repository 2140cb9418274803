//! The rolling history of readings and the connection status.

use std::{collections::VecDeque, fmt::Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many readings are kept.
pub const HISTORY_CAPACITY: usize = 5;

/// One measurement as formatted by the instrument, e.g. `Z = 4.72 kΩ`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading(String);

impl Reading {
    /// Create a reading from its text.
    pub fn new(text: &str) -> Self {
        Self(text.into())
    }

    /// Borrowed form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The state of the connection to the instrument.
///
/// On the wire this is the human readable form, see the [`Display`] impl.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceStatus {
    /// No port has been opened (yet).
    #[default]
    NotConnected,

    /// Connected to the port at this path.
    Connected(String),

    /// The connection failed or broke.
    Error(String),
}

impl DeviceStatus {
    /// Are we connected?
    pub fn is_connected(&self) -> bool {
        matches!(self, DeviceStatus::Connected(_))
    }
}

impl Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::NotConnected => write!(f, "Not Connected"),
            DeviceStatus::Connected(path) => write!(f, "PORT {path}"),
            DeviceStatus::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

impl From<DeviceStatus> for String {
    fn from(status: DeviceStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for DeviceStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        if value == "Not Connected" {
            Ok(DeviceStatus::NotConnected)
        } else if let Some(path) = value.strip_prefix("PORT ") {
            Ok(DeviceStatus::Connected(path.into()))
        } else if let Some(message) = value.strip_prefix("Error: ") {
            Ok(DeviceStatus::Error(message.into()))
        } else {
            Err(format!("`{value}` is not a device status"))
        }
    }
}

/// Everything clients get to know, in one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Connection status.
    #[serde(rename = "portInfo")]
    pub status: DeviceStatus,

    /// Readings, newest first.
    #[serde(rename = "resistanceValues")]
    pub history: VecDeque<Reading>,

    /// When a reading was last added.
    pub last_updated: DateTime<Utc>,
}

impl Snapshot {
    /// A fresh snapshot: not connected, no readings.
    pub fn new() -> Self {
        Self {
            status: DeviceStatus::NotConnected,
            history: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
            last_updated: Utc::now(),
        }
    }

    /// An example of a snapshot with some readings.
    pub fn example() -> Self {
        Self {
            status: DeviceStatus::Connected("/dev/ttyACM0".into()),
            history: ["Z = 4.72 kΩ", "Z = 4.70 kΩ", "Z = 512.33 Ω"]
                .into_iter()
                .map(Reading::new)
                .collect(),
            last_updated: Utc::now(),
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {} reading(s)", self.status, self.history.len())?;
        if let Some(latest) = self.history.front() {
            write!(f, ", latest: {latest}")?;
        }
        Ok(())
    }
}

/// Holds the current [`Snapshot`].
///
/// There is exactly one writer: whichever acquisition source owns the store.
/// Everyone else sees copies.
#[derive(Debug, Default)]
pub struct ReadingStore {
    snapshot: Snapshot,
}

impl ReadingStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a new reading at the front of the history.
    /// The oldest reading is evicted when over capacity.
    pub fn apply_measurement(&mut self, reading: Reading) -> Snapshot {
        self.snapshot.history.push_front(reading);
        self.snapshot.history.truncate(HISTORY_CAPACITY);
        self.snapshot.last_updated = Utc::now();

        self.current_snapshot()
    }

    /// Replace the status.
    /// Does not touch the history or when it was last updated.
    pub fn apply_status(&mut self, status: DeviceStatus) -> Snapshot {
        self.snapshot.status = status;

        self.current_snapshot()
    }

    /// Forget all readings, keeping the status.
    pub fn clear_history(&mut self) -> Snapshot {
        self.snapshot.history.clear();
        self.snapshot.last_updated = Utc::now();

        self.current_snapshot()
    }

    /// A copy of the current state.
    pub fn current_snapshot(&self) -> Snapshot {
        self.snapshot.clone()
    }

    /// Borrow the current status.
    pub fn status(&self) -> &DeviceStatus {
        &self.snapshot.status
    }
}
