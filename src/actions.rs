//! Messages exchanged over the websocket.
//!
//! Every frame is a JSON text frame of the form `{"event": <name>, "data": <payload>}`.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{error, source::Command, store::Snapshot};

/// Name of the event carrying snapshots.
pub const SNAPSHOT_EVENT: &str = "multimeter-data";

/// What users can send to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Action {
    /// Control the acquisition.
    #[serde(rename = "command")]
    Command(Command),
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Command(command) => write!(f, "command: {command}"),
        }
    }
}

impl Action {
    /// Create a start command.
    pub fn start() -> Self {
        Self::Command(Command::Start)
    }

    /// Create a stop command.
    pub fn stop() -> Self {
        Self::Command(Command::Stop)
    }

    /// Turn an action into serialized json.
    pub fn serialize(&self) -> Result<String, error::Error> {
        serde_json::to_string(self).map_err(|e| error::Error::Server(e.to_string()))
    }
}

/// What the server sends to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Response {
    /// The current state. Sent on connecting and after every change.
    #[serde(rename = "multimeter-data")]
    Snapshot(Snapshot),

    /// Something the user sent was not understood.
    #[serde(rename = "error")]
    Error(error::Error),
}

impl Response {
    /// An example of a snapshot response.
    pub fn example_snapshot() -> Self {
        Self::Snapshot(Snapshot::example())
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Snapshot(snapshot) => write!(f, "{SNAPSHOT_EVENT}: {snapshot}"),
            Response::Error(e) => write!(f, "error: {e}"),
        }
    }
}
