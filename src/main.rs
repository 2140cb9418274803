use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use lcr_bridge::{
    actions::{Action, Response},
    cli,
    config::{Config, SourceKind, PORT_ENV},
    logging, serial::discovery, server,
};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use tracing::{debug, error, info, warn};

async fn handle_command(command: cli::Commands) -> Result<()> {
    match command {
        cli::Commands::Examples(example) => match example {
            cli::Examples::Config => println!("{}", Config::example().serialize_pretty()?),
            cli::Examples::Snapshot => {
                println!("{}", serde_json::to_string_pretty(&Response::example_snapshot())?)
            }
            cli::Examples::Command => {
                println!("{}", serde_json::to_string_pretty(&Action::start())?)
            }
        },
        cli::Commands::Ports => {
            let timeout = Duration::from_millis(Config::default().serial.discovery_timeout_ms);
            let ports = discovery::list_ports(timeout).await?;
            let selected = discovery::select_port(&ports);

            for port in &ports {
                let marker = if Some(port) == selected.as_ref() { "*" } else { " " };
                println!("{marker} {port}");
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn hangup() -> Result<()> {
    let mut hangup = signal(SignalKind::hangup())?;
    hangup.recv().await;

    Ok(())
}

#[cfg(not(unix))]
async fn hangup() -> Result<()> {
    futures::future::pending().await
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        return handle_command(command).await;
    }

    let mut config = if let Some(config_path) = &cli.config {
        Config::new_from_path(config_path)?
    } else {
        Config::default()
    };

    logging::init(&config.logging.level, config.logging.file_dir.clone()).await;

    if let Err(e) = config.apply_env_port(std::env::var(PORT_ENV).ok()) {
        warn!(%e, "Ignoring {PORT_ENV}");
    }

    if cli.simulate {
        config.source = SourceKind::Simulation;
    }

    if let Some(port) = cli.port {
        config.http_port = port;
    }

    debug!(?cli.config, ?config, "Configuration");

    let port = config.http_port;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        _ = hangup() => {
            info!("Told to hang up, quitting")
        }
        served = server::run_on_port(config, port) => {
            error!(?served, "Server returned");
            logging::shutdown();
            served?;
            return Err(color_eyre::eyre::eyre!("Server stopped unexpectedly"));
        }
    }

    logging::shutdown();

    Ok(())
}
