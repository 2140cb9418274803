#![deny(missing_docs)]

//! This crate bridges an LCR meter on a serial port to web clients.
//!
//! The instrument prints lines of text.
//! Lines carrying a measurement (`Z = 4.72 kΩ`) are kept in a short rolling history,
//! together with the state of the connection.
//!
//! The state can be polled at `/api/resistance-data`,
//! or followed live by connecting a websocket to `/ws`.
//! Websocket users may send `start`/`stop` commands,
//! which control the simulated instrument used when no hardware is around.

/// The messages sent between users and the server over the websocket.
pub mod actions;

/// Code relating to setting up the server which sets up connections and spawns handlers for clients.
pub mod server;

/// A client following a server.
pub mod client;

/// The command line interface.
pub mod cli;

/// Fans out snapshots to subscribers.
pub mod hub;

/// Handles incoming websockets.
pub(crate) mod websocket;

/// Serial port access.
pub mod serial;

/// Telling measurement lines from the rest.
pub mod parser;

/// The rolling history of readings.
pub mod store;

/// Where snapshots come from: the instrument, or a simulation of it.
pub mod source;

/// Relates to config files.
pub mod config;

/// Possible errors in this library.
pub mod error;

/// Logging/tracing setup.
pub mod logging;
