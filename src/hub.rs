//! The hub fans out snapshots to every subscriber.
//!
//! The hub is an actor: a task owning the latest snapshot and the broadcast sender.
//! Requests are handled in the order they arrive, so a new subscriber
//! gets the snapshot current at that point and then every later one.
//!
//! Subscribers that fall behind lag and skip snapshots,
//! the publisher is never held up.

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::{error::Error, source::Command, store::Snapshot};

/// How many snapshots a subscriber may fall behind before it starts skipping.
pub const UPDATE_BUFFER: usize = 64;

/// What a new subscriber gets.
#[derive(Debug)]
pub struct Subscription {
    /// The snapshot at the time of subscribing.
    pub initial: Snapshot,

    /// Every snapshot published after `initial`.
    pub updates: broadcast::Receiver<Snapshot>,
}

#[derive(Debug)]
enum HubMessage {
    Publish(Snapshot),
    Subscribe(oneshot::Sender<Subscription>),
    Latest(oneshot::Sender<Snapshot>),
    Command(Command),
}

struct Hub {
    latest: Snapshot,
    updates: broadcast::Sender<Snapshot>,
    commands: mpsc::UnboundedSender<Command>,
    requests: mpsc::UnboundedReceiver<HubMessage>,
}

impl Hub {
    async fn run(&mut self) {
        while let Some(message) = self.requests.recv().await {
            match message {
                HubMessage::Publish(snapshot) => {
                    trace!(%snapshot, "Publishing");
                    self.latest = snapshot.clone();

                    match self.updates.send(snapshot) {
                        Ok(subscribers) => trace!("Published to {subscribers} subscriber(s)"),
                        Err(_) => trace!("No subscribers"),
                    }
                }
                HubMessage::Subscribe(reply) => {
                    let subscription = Subscription {
                        initial: self.latest.clone(),
                        updates: self.updates.subscribe(),
                    };

                    if reply.send(subscription).is_err() {
                        debug!("Subscriber left before subscribing");
                    } else {
                        info!(total = self.updates.receiver_count(), "Subscriber added");
                    }
                }
                HubMessage::Latest(reply) => {
                    let _ = reply.send(self.latest.clone());
                }
                HubMessage::Command(command) => {
                    debug!(%command, "Forwarding command");
                    if self.commands.send(command).is_err() {
                        warn!(%command, "Acquisition source is gone, command dropped");
                    }
                }
            }
        }

        debug!("All hub handles dropped, stopping");
    }
}

/// A handle to the hub.
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct HubHandle(mpsc::UnboundedSender<HubMessage>);

impl HubHandle {
    /// Start a hub.
    ///
    /// `initial` is what subscribers get until something is published.
    /// Commands from subscribers are forwarded to `commands`.
    pub fn new(initial: Snapshot, commands: mpsc::UnboundedSender<Command>) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);

        let mut hub = Hub {
            latest: initial,
            updates,
            commands,
            requests: requests_rx,
        };

        tokio::spawn(async move { hub.run().await }.instrument(info_span!("Hub")));

        Self(requests_tx)
    }

    fn send(&self, message: HubMessage) -> Result<(), Error> {
        self.0
            .send(message)
            .map_err(|_| Error::Server("The hub has stopped".into()))
    }

    /// Make a snapshot the latest one and push it to every subscriber.
    pub fn publish(&self, snapshot: Snapshot) {
        if self.send(HubMessage::Publish(snapshot)).is_err() {
            warn!("Hub stopped, snapshot not published");
        }
    }

    /// Pass a command on to the acquisition source.
    pub fn command(&self, command: Command) {
        if self.send(HubMessage::Command(command)).is_err() {
            warn!(%command, "Hub stopped, command not forwarded");
        }
    }

    /// Subscribe to snapshots.
    pub async fn subscribe(&self) -> Result<Subscription, Error> {
        let (tx, rx) = oneshot::channel();
        self.send(HubMessage::Subscribe(tx))?;

        rx.await
            .map_err(|_| Error::Server("The hub stopped while subscribing".into()))
    }

    /// The latest snapshot.
    pub async fn latest(&self) -> Result<Snapshot, Error> {
        let (tx, rx) = oneshot::channel();
        self.send(HubMessage::Latest(tx))?;

        rx.await
            .map_err(|_| Error::Server("The hub stopped while asked for a snapshot".into()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::{DeviceStatus, Reading, ReadingStore};

    fn hub() -> (HubHandle, mpsc::UnboundedReceiver<Command>, ReadingStore) {
        let store = ReadingStore::new();
        let (tx, rx) = mpsc::unbounded_channel();

        (HubHandle::new(store.current_snapshot(), tx), rx, store)
    }

    #[tokio::test]
    async fn subscriber_gets_initial() {
        let (hub, _commands, store) = hub();

        let mut subscription = hub.subscribe().await.unwrap();

        assert_eq!(subscription.initial, store.current_snapshot());
        assert!(subscription.updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn published_snapshots_arrive_in_order() {
        let (hub, _commands, mut store) = hub();
        let mut subscription = hub.subscribe().await.unwrap();

        let mut published = vec![];
        for i in 0..10 {
            let snapshot = store.apply_measurement(Reading::new(&format!("Z = {i}.00 Ω")));
            hub.publish(snapshot.clone());
            published.push(snapshot);
        }

        for expected in published {
            assert_eq!(subscription.updates.recv().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn late_subscriber_gets_latest() {
        let (hub, _commands, mut store) = hub();

        store.apply_status(DeviceStatus::Connected("COM3".into()));
        hub.publish(store.apply_measurement(Reading::new("Z = 1.00 Ω")));

        let subscription = hub.subscribe().await.unwrap();

        assert_eq!(subscription.initial, store.current_snapshot());
        assert_eq!(hub.latest().await.unwrap(), store.current_snapshot());
    }

    #[tokio::test]
    async fn every_subscriber_gets_updates() {
        let (hub, _commands, mut store) = hub();

        let mut a = hub.subscribe().await.unwrap();
        let mut b = hub.subscribe().await.unwrap();

        let snapshot = store.apply_measurement(Reading::new("Z = 1.00 Ω"));
        hub.publish(snapshot.clone());

        assert_eq!(a.updates.recv().await.unwrap(), snapshot);
        assert_eq!(b.updates.recv().await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn slow_subscriber_lags_without_blocking() {
        let (hub, _commands, mut store) = hub();
        let mut slow = hub.subscribe().await.unwrap();

        for i in 0..(UPDATE_BUFFER * 2) {
            hub.publish(store.apply_measurement(Reading::new(&format!("Z = {i}.00 Ω"))));
        }

        // Round trip through the hub so every publish has been handled.
        assert_eq!(hub.latest().await.unwrap(), store.current_snapshot());

        assert!(matches!(
            slow.updates.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[tokio::test]
    async fn commands_are_forwarded() {
        let (hub, mut commands, _store) = hub();

        hub.command(Command::Start);
        hub.command(Command::Stop);

        assert_eq!(commands.recv().await, Some(Command::Start));
        assert_eq!(commands.recv().await, Some(Command::Stop));
    }

    #[tokio::test]
    async fn commands_without_source_are_dropped() {
        let (hub, commands, _store) = hub();
        drop(commands);

        hub.command(Command::Start);

        // The hub keeps serving.
        hub.latest().await.unwrap();
    }
}
