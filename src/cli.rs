use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// The command line interface for LCR Bridge.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// Use a simulated instrument instead of a serial port
    #[arg(long)]
    pub simulate: bool,

    /// The port to serve on. Takes precedence over the config file and the `PORT` variable
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),

    /// List the serial ports, marking the one that would be connected to.
    Ports,
}

/// Helpful examples for users.
#[derive(Subcommand, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,

    /// Show an example JSON snapshot, as sent over the websocket.
    Snapshot,

    /// Show an example JSON request of starting the acquisition.
    Command,
}
