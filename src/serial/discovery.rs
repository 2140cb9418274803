//! Enumerating serial ports and picking the one the instrument is likely attached to.

use std::{fmt::Display, time::Duration};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Error;

/// Manufacturer string reported by the boards driving the meter.
pub const MANUFACTURER_HINT: &str = "Arduino";

/// Path fragments of ports that may have the instrument attached.
/// `ttyACM`/`ttyUSB` on unix, `COM` on Windows.
pub const PATH_HINTS: [&str; 3] = ["ttyACM", "ttyUSB", "COM"];

/// A serial port as seen during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// The path to the port, such as `/dev/ttyACM0` or `COM3`.
    pub path: String,

    /// The USB manufacturer, if the port is a USB device which reports one.
    pub manufacturer: Option<String>,
}

impl PortDescriptor {
    /// A port with no manufacturer information.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.into(),
            manufacturer: None,
        }
    }

    /// A port with a known manufacturer.
    pub fn with_manufacturer(path: &str, manufacturer: &str) -> Self {
        Self {
            path: path.into(),
            manufacturer: Some(manufacturer.into()),
        }
    }

    fn made_by_hint(&self) -> bool {
        self.manufacturer
            .as_deref()
            .map_or(false, |manufacturer| manufacturer.contains(MANUFACTURER_HINT))
    }

    /// Does this port look like it could be the instrument?
    pub fn is_candidate(&self) -> bool {
        self.made_by_hint() || PATH_HINTS.iter().any(|hint| self.path.contains(hint))
    }
}

impl Display for PortDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.manufacturer {
            Some(manufacturer) => write!(f, "{} ({manufacturer})", self.path),
            None => write!(f, "{}", self.path),
        }
    }
}

impl From<serialport::SerialPortInfo> for PortDescriptor {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let manufacturer = match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => usb.manufacturer,
            _ => None,
        };

        Self {
            path: info.port_name,
            manufacturer,
        }
    }
}

/// List every serial port on the system.
///
/// Enumeration may block on some platforms, so it runs on a blocking thread
/// and is given up on after `timeout`.
pub async fn list_ports(timeout: Duration) -> Result<Vec<PortDescriptor>, Error> {
    list_ports_with(timeout, serialport::available_ports).await
}

/// Like [`list_ports`], with the enumeration itself given.
pub async fn list_ports_with<F>(timeout: Duration, enumerate: F) -> Result<Vec<PortDescriptor>, Error>
where
    F: FnOnce() -> serialport::Result<Vec<serialport::SerialPortInfo>> + Send + 'static,
{
    let listing = tokio::time::timeout(timeout, tokio::task::spawn_blocking(enumerate))
        .await
        .map_err(|_| Error::Discovery(format!("listing ports took longer than {timeout:?}")))?
        .map_err(|e| Error::Discovery(format!("listing task failed: {e}")))?
        .map_err(|e| Error::Discovery(e.to_string()))?;

    let ports = listing.into_iter().map(PortDescriptor::from).collect_vec();

    info!(count = ports.len(), "Available ports");
    for port in &ports {
        debug!(%port);
    }

    Ok(ports)
}

/// List the ports which might have the instrument attached.
pub async fn list_candidate_ports(timeout: Duration) -> Result<Vec<PortDescriptor>, Error> {
    Ok(list_ports(timeout)
        .await?
        .into_iter()
        .filter(PortDescriptor::is_candidate)
        .collect())
}

/// Pick the single port to connect to.
///
/// Ports reporting the expected manufacturer win over ports only matching by path.
/// Otherwise the enumeration order is kept.
pub fn select_port(ports: &[PortDescriptor]) -> Option<PortDescriptor> {
    ports
        .iter()
        .filter(|port| port.is_candidate())
        .sorted_by_key(|port| !port.made_by_hint())
        .next()
        .cloned()
}
