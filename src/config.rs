use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{error::Error, serial::serial_port::DEFAULT_BAUD};

/// The port the web server listens on unless told otherwise.
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Environment variable overriding [`Config::http_port`].
pub const PORT_ENV: &str = "PORT";

/// Where snapshots come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SourceKind {
    /// The instrument on a serial port.
    #[default]
    Serial,

    /// A simulated instrument producing random readings on demand.
    Simulation,
}

/// How to talk to the instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Baud rate, must match the firmware.
    pub baud: u32,

    /// What separates lines coming from the instrument.
    pub delimiter: String,

    /// How long listing the serial ports may take, in milliseconds.
    pub discovery_timeout_ms: u64,

    /// Open this port instead of looking for one.
    pub path_override: Option<String>,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            delimiter: "\r\n".into(),
            discovery_timeout_ms: 5_000,
            path_override: None,
        }
    }
}

/// How the simulated instrument behaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Time between readings while generating, in milliseconds.
    pub interval_ms: u64,

    /// Reported as the port the simulated instrument is on.
    pub port_label: String,

    /// Seed for reproducible readings.
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            interval_ms: 3_000,
            port_label: "COM3 (Arduino Nano)".into(),
            seed: None,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// The level for stdout, such as `info` or `debug`.
    pub level: String,

    /// If set, also log to daily rotated files in this directory.
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file_dir: None,
        }
    }
}

/// The configuration used for running the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The port the web server listens on.
    pub http_port: u16,

    /// Real or simulated instrument.
    pub source: SourceKind,

    /// Used when the source is [`SourceKind::Serial`].
    pub serial: SerialSettings,

    /// Used when the source is [`SourceKind::Simulation`].
    pub simulation: SimulationSettings,

    /// Serve the files in this directory for any other path.
    pub static_dir: Option<PathBuf>,

    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            source: SourceKind::default(),
            serial: SerialSettings::default(),
            simulation: SimulationSettings::default(),
            static_dir: None,
            logging: LoggingSettings::default(),
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Self::ron()
            .from_str::<Config>(input)
            .map_err(|e| Error::BadConfig(format!("Not valid RON: {e}")))
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            source: SourceKind::Simulation,
            serial: SerialSettings {
                path_override: Some("/dev/ttyACM0".into()),
                ..Default::default()
            },
            simulation: SimulationSettings {
                seed: Some(42),
                ..Default::default()
            },
            static_dir: Some("public".into()),
            logging: LoggingSettings {
                level: "debug".into(),
                file_dir: Some("logs".into()),
            },
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> Result<String, Error> {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::BadConfig(e.to_string()))
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let path = p.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| Error::BadConfig(format!("Could not read {path:?}: {e}")))?;

        Self::deserialize(&s)
    }

    /// Let the environment override the HTTP port.
    /// An unparseable value leaves the port as it was and is returned as an error.
    pub fn apply_env_port(&mut self, value: Option<String>) -> Result<(), Error> {
        let Some(value) = value else { return Ok(()) };

        self.http_port = value
            .trim()
            .parse()
            .map_err(|e| Error::BadConfig(format!("{PORT_ENV}=`{value}` is not a port: {e}")))?;

        Ok(())
    }

    fn check_serial(&self) -> Result<(), Error> {
        if self.serial.baud == 0 {
            return Err(Error::BadConfig("The baud rate must be above zero".into()));
        }

        if self.serial.delimiter.is_empty() {
            return Err(Error::BadConfig("The line delimiter must not be empty".into()));
        }

        if self.serial.discovery_timeout_ms == 0 {
            return Err(Error::BadConfig(
                "The discovery timeout must be above zero".into(),
            ));
        }

        Ok(())
    }

    fn check_simulation(&self) -> Result<(), Error> {
        if self.simulation.interval_ms == 0 {
            return Err(Error::BadConfig(
                "The simulation interval must be above zero".into(),
            ));
        }

        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        match self.source {
            SourceKind::Serial => self.check_serial(),
            SourceKind::Simulation => self.check_simulation(),
        }
    }
}
