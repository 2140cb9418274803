//! The acquisition driver for the real instrument.
//!
//! Finds the port, reads lines from it, and keeps the store up to date.
//! There is no automatic reconnection: after an error a new discovery pass
//! is only made on [`Command::Rediscover`].

use std::{fmt::Display, time::Duration};

use futures::{future::BoxFuture, FutureExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::{Command, Source};
use crate::{
    config::SerialSettings,
    error::Error,
    hub::HubHandle,
    parser::{self, LineEvent},
    serial::{
        codecs::lines::LinesCodec,
        discovery::{self, PortDescriptor},
        error::SerialPortError,
        serial_port::{LineStream, SerialPortBuilder},
        SerialLine,
    },
    store::{DeviceStatus, ReadingStore},
};

/// An open connection to the instrument.
pub struct Connection {
    /// Which port.
    pub path: String,

    /// The lines coming from it.
    pub lines: LineStream,
}

/// Finds and opens the instrument's port.
pub trait Connector: Send + 'static {
    /// Make one attempt at connecting.
    ///
    /// [`Error::Discovery`] means no port was found to try,
    /// [`Error::Connection`] means a port was found but could not be opened.
    fn connect(&mut self) -> BoxFuture<'_, Result<Connection, Error>>;
}

/// Connects using the system's serial ports.
#[derive(Debug, Clone)]
pub struct SystemConnector {
    settings: SerialSettings,
}

impl SystemConnector {
    /// Create a connector using these settings.
    pub fn new(settings: &SerialSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    async fn find_port(&self) -> Result<PortDescriptor, Error> {
        if let Some(path) = &self.settings.path_override {
            debug!(%path, "Using configured path, skipping discovery");
            return Ok(PortDescriptor::new(path));
        }

        let timeout = Duration::from_millis(self.settings.discovery_timeout_ms);
        let candidates = discovery::list_candidate_ports(timeout).await?;

        discovery::select_port(&candidates)
            .ok_or_else(|| Error::Discovery("No port looks like the instrument".into()))
    }
}

impl Connector for SystemConnector {
    fn connect(&mut self) -> BoxFuture<'_, Result<Connection, Error>> {
        async move {
            let port = self.find_port().await?;
            info!(%port, "Attempting to connect");

            let lines = SerialPortBuilder::new(&port.path)
                .set_baud(self.settings.baud)
                .set_line_codec(LinesCodec::new(self.settings.delimiter.as_bytes()))
                .build()?;

            Ok(Connection {
                path: port.path,
                lines,
            })
        }
        .boxed()
    }
}

/// Where the driver is at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverState {
    /// Nothing attempted, or discovery found nothing.
    Idle,

    /// Looking for and opening a port.
    Discovering,

    /// Reading lines from the port at this path.
    Connected(String),

    /// The connection failed or broke.
    Disconnected(String),
}

impl Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverState::Idle => write!(f, "idle"),
            DriverState::Discovering => write!(f, "discovering"),
            DriverState::Connected(path) => write!(f, "connected to {path}"),
            DriverState::Disconnected(problem) => write!(f, "disconnected: {problem}"),
        }
    }
}

/// The instrument as a [`Source`].
pub struct SerialSource<C: Connector = SystemConnector> {
    connector: C,
}

impl SerialSource<SystemConnector> {
    /// A source using the system's serial ports.
    pub fn new(settings: &SerialSettings) -> Self {
        Self::with_connector(SystemConnector::new(settings))
    }
}

impl<C: Connector> SerialSource<C> {
    /// A source using the given way of connecting.
    pub fn with_connector(connector: C) -> Self {
        Self { connector }
    }
}

impl<C: Connector> Source for SerialSource<C> {
    fn spawn(
        self,
        store: ReadingStore,
        hub: HubHandle,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> JoinHandle<()> {
        let driver = Driver {
            connector: self.connector,
            store,
            hub,
            state: DriverState::Idle,
        };

        tokio::spawn(driver.run(commands).instrument(info_span!("Serial")))
    }
}

struct Driver<C> {
    connector: C,
    store: ReadingStore,
    hub: HubHandle,
    state: DriverState,
}

async fn next_line(lines: &mut Option<LineStream>) -> Result<SerialLine, SerialPortError> {
    match lines {
        Some(lines) => lines
            .next()
            .await
            .unwrap_or(Err(SerialPortError::Disconnected)),
        None => futures::future::pending().await,
    }
}

impl<C: Connector> Driver<C> {
    fn transition(&mut self, state: DriverState) {
        debug!(from = %self.state, to = %state, "Driver state");
        self.state = state;
    }

    fn set_status(&mut self, status: DeviceStatus) {
        self.hub.publish(self.store.apply_status(status));
    }

    async fn discover(&mut self) -> Option<LineStream> {
        self.transition(DriverState::Discovering);

        match self.connector.connect().await {
            Ok(Connection { path, lines }) => {
                info!(%path, "Serial port opened");
                self.transition(DriverState::Connected(path.clone()));
                self.set_status(DeviceStatus::Connected(path));

                Some(lines)
            }
            Err(Error::Discovery(problem)) => {
                error!(%problem, "Discovery failed, staying idle");
                self.transition(DriverState::Idle);

                None
            }
            Err(e) => {
                let problem = e.to_string();
                error!(%problem, "Could not connect");
                self.transition(DriverState::Disconnected(problem.clone()));
                self.set_status(DeviceStatus::Error(problem));

                None
            }
        }
    }

    fn handle_line(&mut self, line: SerialLine) {
        let event = parser::classify_bytes(&line);
        parser::trace_event(&event);

        if let LineEvent::Measurement(reading) = event {
            self.hub.publish(self.store.apply_measurement(reading));
        }
    }

    fn handle_command(&self, command: Command) -> bool {
        match command {
            Command::Rediscover => {
                if matches!(self.state, DriverState::Connected(_)) {
                    info!("Already connected, not rediscovering");
                    false
                } else {
                    true
                }
            }
            Command::Start | Command::Stop => {
                info!(%command, "Acquisition is continuous, command has no effect");
                false
            }
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut lines = self.discover().await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command) {
                            lines = self.discover().await;
                        }
                    }
                    None => {
                        debug!("Command channel closed, stopping");
                        break;
                    }
                },
                line = next_line(&mut lines) => match line {
                    Ok(line) => self.handle_line(line),
                    Err(e) => {
                        let problem = Error::Connection(e.to_string()).to_string();
                        warn!(%problem, "Serial port error, closing");

                        // Dropping the stream closes the port.
                        lines = None;

                        self.transition(DriverState::Disconnected(problem.clone()));
                        self.set_status(DeviceStatus::Error(problem));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use pretty_assertions::assert_eq;
    use tokio::sync::broadcast;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;
    use crate::{
        hub::Subscription,
        store::{Reading, Snapshot},
    };

    type LineSender = mpsc::UnboundedSender<Result<SerialLine, SerialPortError>>;

    /// Hands out scripted connection attempts, in order.
    struct ScriptedConnector {
        attempts: VecDeque<Result<Connection, Error>>,
        made: Arc<AtomicUsize>,
    }

    impl Connector for ScriptedConnector {
        fn connect(&mut self) -> BoxFuture<'_, Result<Connection, Error>> {
            self.made.fetch_add(1, Ordering::SeqCst);
            let attempt = self
                .attempts
                .pop_front()
                .unwrap_or_else(|| Err(Error::Discovery("script exhausted".into())));

            futures::future::ready(attempt).boxed()
        }
    }

    fn connection(path: &str) -> (Result<Connection, Error>, LineSender) {
        let (tx, rx) = mpsc::unbounded_channel();

        let connection = Connection {
            path: path.into(),
            lines: UnboundedReceiverStream::new(rx).boxed(),
        };

        (Ok(connection), tx)
    }

    struct Harness {
        hub: HubHandle,
        updates: broadcast::Receiver<Snapshot>,
        initial: Snapshot,
        attempts_made: Arc<AtomicUsize>,
    }

    async fn start(attempts: Vec<Result<Connection, Error>>) -> Harness {
        let store = ReadingStore::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let hub = HubHandle::new(store.current_snapshot(), commands_tx);

        let Subscription { initial, updates } = hub.subscribe().await.unwrap();

        let attempts_made = Arc::new(AtomicUsize::new(0));
        let connector = ScriptedConnector {
            attempts: attempts.into(),
            made: attempts_made.clone(),
        };

        SerialSource::with_connector(connector).spawn(store, hub.clone(), commands_rx);

        Harness {
            hub,
            updates,
            initial,
            attempts_made,
        }
    }

    fn history(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.history.iter().map(Reading::as_str).collect()
    }

    #[tokio::test]
    async fn connects_and_stores_measurements() {
        let (attempt, wire) = connection("/dev/ttyACM0");
        let mut h = start(vec![attempt]).await;

        assert_eq!(h.initial.status, DeviceStatus::NotConnected);

        let connected = h.updates.recv().await.unwrap();
        assert_eq!(connected.status, DeviceStatus::Connected("/dev/ttyACM0".into()));
        assert!(connected.history.is_empty());

        wire.send(Ok("Z = 4.72 kΩ".into())).unwrap();
        let snapshot = h.updates.recv().await.unwrap();
        assert_eq!(history(&snapshot), ["Z = 4.72 kΩ"]);

        wire.send(Ok("Z = 4.80 kΩ".into())).unwrap();
        let snapshot = h.updates.recv().await.unwrap();
        assert_eq!(history(&snapshot), ["Z = 4.80 kΩ", "Z = 4.72 kΩ"]);
    }

    #[tokio::test]
    async fn informational_lines_publish_nothing() {
        let (attempt, wire) = connection("COM3");
        let mut h = start(vec![attempt]).await;
        let _connected = h.updates.recv().await.unwrap();

        wire.send(Ok("Nouvelle fréquence : 2000 Hz".as_bytes().to_vec()))
            .unwrap();
        wire.send(Ok(b"Calibrating".to_vec())).unwrap();
        wire.send(Ok(b"\xff\xfe".to_vec())).unwrap();
        wire.send(Ok("Z = 1.00 MΩ".into())).unwrap();

        // The next update is the measurement: nothing came before it.
        let snapshot = h.updates.recv().await.unwrap();
        assert_eq!(history(&snapshot), ["Z = 1.00 MΩ"]);
    }

    #[tokio::test]
    async fn discovery_failure_stays_not_connected() {
        let mut h = start(vec![Err(Error::Discovery("no ports".into()))]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.attempts_made.load(Ordering::SeqCst), 1);

        let snapshot = h.hub.latest().await.unwrap();
        assert_eq!(snapshot.status, DeviceStatus::NotConnected);
        assert!(h.updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn open_failure_sets_error() {
        let mut h = start(vec![Err(Error::Connection(
            "Could not open port at COM3: busy".into(),
        ))])
        .await;

        let snapshot = h.updates.recv().await.unwrap();
        assert_eq!(
            snapshot.status,
            DeviceStatus::Error("Could not open port at COM3: busy".into())
        );
    }

    #[tokio::test]
    async fn io_error_disconnects_until_rediscover() {
        let (first, wire) = connection("/dev/ttyUSB0");
        let (second, wire_again) = connection("/dev/ttyUSB1");
        let mut h = start(vec![first, second]).await;
        let _connected = h.updates.recv().await.unwrap();

        wire.send(Ok("Z = 4.72 kΩ".into())).unwrap();
        let _reading = h.updates.recv().await.unwrap();

        wire.send(Err(SerialPortError::Disconnected)).unwrap();
        let snapshot = h.updates.recv().await.unwrap();
        assert!(matches!(snapshot.status, DeviceStatus::Error(_)));
        // The history survives the disconnect.
        assert_eq!(history(&snapshot), ["Z = 4.72 kΩ"]);
        assert_eq!(h.attempts_made.load(Ordering::SeqCst), 1);

        h.hub.command(Command::Rediscover);
        let snapshot = h.updates.recv().await.unwrap();
        assert_eq!(snapshot.status, DeviceStatus::Connected("/dev/ttyUSB1".into()));

        wire_again.send(Ok("Z = 5.00 kΩ".into())).unwrap();
        let snapshot = h.updates.recv().await.unwrap();
        assert_eq!(history(&snapshot), ["Z = 5.00 kΩ", "Z = 4.72 kΩ"]);
    }

    #[tokio::test]
    async fn end_of_stream_is_a_disconnect() {
        let (attempt, wire) = connection("/dev/ttyACM0");
        let mut h = start(vec![attempt]).await;
        let _connected = h.updates.recv().await.unwrap();

        drop(wire);

        let snapshot = h.updates.recv().await.unwrap();
        assert_eq!(
            snapshot.status,
            DeviceStatus::Error("Serial port disconnected".into())
        );
    }

    #[tokio::test]
    async fn commands_while_connected_change_nothing() {
        let (attempt, wire) = connection("/dev/ttyACM0");
        let mut h = start(vec![attempt]).await;
        let _connected = h.updates.recv().await.unwrap();

        h.hub.command(Command::Start);
        h.hub.command(Command::Stop);
        h.hub.command(Command::Rediscover);
        tokio::time::sleep(Duration::from_millis(50)).await;

        wire.send(Ok("Z = 1.00 Ω".into())).unwrap();
        let snapshot = h.updates.recv().await.unwrap();
        assert_eq!(history(&snapshot), ["Z = 1.00 Ω"]);

        assert_eq!(h.attempts_made.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rediscover_after_failed_discovery() {
        let (second, _wire) = connection("COM4");
        let mut h = start(vec![Err(Error::Discovery("no ports".into())), second]).await;

        h.hub.command(Command::Rediscover);

        let snapshot = h.updates.recv().await.unwrap();
        assert_eq!(snapshot.status, DeviceStatus::Connected("COM4".into()));
        assert_eq!(h.attempts_made.load(Ordering::SeqCst), 2);
    }
}
