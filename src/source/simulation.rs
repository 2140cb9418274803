//! A simulated instrument, useful to run the bridge without the actual hardware.
//!
//! Readings are only produced between a [`Command::Start`] and a [`Command::Stop`].

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, info, info_span, Instrument};

use super::{Command, Source};
use crate::{
    config::SimulationSettings,
    hub::HubHandle,
    store::{DeviceStatus, Reading, ReadingStore},
};

const UNITS: [&str; 3] = ["Ω", "kΩ", "MΩ"];

/// Make up a measurement line like the instrument would print.
pub fn random_reading<R: Rng>(rng: &mut R) -> Reading {
    let value: f64 = rng.random_range(100.0..1000.0);
    let unit = UNITS[rng.random_range(0..UNITS.len())];

    Reading::new(&format!("Z = {value:.2} {unit}"))
}

/// The simulated instrument as a [`Source`].
#[derive(Debug)]
pub struct Simulator {
    interval: Duration,
    port_label: String,
    rng: StdRng,
}

impl Simulator {
    /// Create a simulator from settings.
    /// Without a seed, readings differ from run to run.
    pub fn new(settings: &SimulationSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            interval: Duration::from_millis(settings.interval_ms),
            port_label: settings.port_label.clone(),
            rng,
        }
    }
}

impl Source for Simulator {
    fn spawn(
        self,
        mut store: ReadingStore,
        hub: HubHandle,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> JoinHandle<()> {
        let span = info_span!("Simulation", port = %self.port_label);

        // A simulation is connected from the very first snapshot.
        let status = DeviceStatus::Connected(self.port_label.clone());
        hub.publish(store.apply_status(status));

        let generator = Generator {
            simulator: self,
            store,
            hub,
            ticker: None,
        };

        tokio::spawn(generator.run(commands).instrument(span))
    }
}

struct Generator {
    simulator: Simulator,
    store: ReadingStore,
    hub: HubHandle,

    // Present while generating.
    ticker: Option<Interval>,
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => futures::future::pending().await,
    }
}

impl Generator {
    fn emit(&mut self) {
        let reading = random_reading(&mut self.simulator.rng);
        debug!(%reading, "Generated");

        self.hub.publish(self.store.apply_measurement(reading));
    }

    fn start(&mut self) {
        if self.ticker.is_some() {
            debug!("Already generating");
            return;
        }

        info!("Starting data generation");
        self.emit();

        let period = self.simulator.interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    fn stop(&mut self) {
        if self.ticker.take().is_none() {
            debug!("Not generating");
            return;
        }

        info!("Stopping data generation");
        self.hub.publish(self.store.clear_history());
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Start) => self.start(),
                    Some(Command::Stop) => self.stop(),
                    Some(Command::Rediscover) => debug!("Nothing to rediscover"),
                    None => {
                        debug!("Command channel closed, stopping");
                        break;
                    }
                },
                _ = tick(&mut self.ticker) => self.emit(),
            }
        }
    }
}
