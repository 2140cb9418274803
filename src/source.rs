use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{hub::HubHandle, store::ReadingStore};

/// The instrument over a serial port.
pub mod serial;

/// A made up instrument, for running without hardware.
pub mod simulation;

/// Control commands subscribers may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Start producing readings.
    Start,

    /// Stop producing readings.
    Stop,

    /// Look for the instrument again, if not connected.
    Rediscover,
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Start => write!(f, "start"),
            Command::Stop => write!(f, "stop"),
            Command::Rediscover => write!(f, "rediscover"),
        }
    }
}

/// Something producing snapshots: the real instrument or a simulation of it.
pub trait Source: Send + 'static {
    /// Spawn the source as a task.
    ///
    /// The task owns the store and is its only writer.
    /// Every change is published to the hub.
    ///
    /// The hub holds the command sender and the task holds the hub,
    /// so the channel stays open and the task runs until aborted
    /// by [`SourceHandle::shutdown`].
    fn spawn(
        self,
        store: ReadingStore,
        hub: HubHandle,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> JoinHandle<()>;
}

/// A running source and the hub it publishes to.
#[derive(Debug)]
pub struct SourceHandle {
    /// Subscribe here.
    pub hub: HubHandle,

    join_handle: JoinHandle<()>,
}

impl SourceHandle {
    /// Create a store and a hub, and spawn the source feeding them.
    pub fn start<S: Source>(source: S) -> Self {
        let store = ReadingStore::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let hub = HubHandle::new(store.current_snapshot(), commands_tx);
        let join_handle = source.spawn(store, hub.clone(), commands_rx);

        Self { hub, join_handle }
    }

    /// Stop the source.
    /// Any open port or pending timer is dropped along with the task.
    pub async fn shutdown(self) {
        self.join_handle.abort();
        let _ = self.join_handle.await;
    }
}
