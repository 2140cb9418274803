use clap::Parser;
use color_eyre::Result;
use lcr_bridge::{client::ClientHandle, source::Command};
use tracing::{error, info};

/// Follows a running server and prints every snapshot it pushes.
#[derive(Parser, Debug)]
struct Args {
    /// Server address.
    #[arg(short, long, default_value = "localhost")]
    address: String,

    /// Server port.
    #[arg(short, long, default_value_t = lcr_bridge::config::DEFAULT_HTTP_PORT)]
    port: u16,

    /// Send a start command after connecting.
    /// Makes a simulated instrument start producing readings.
    #[arg(short, long)]
    start: bool,
}

async fn run(args: Args) -> Result<()> {
    let mut client = ClientHandle::new(&args.address, args.port).await?;

    if args.start {
        client.command(Command::Start).await?;
    }

    while let Some(snapshot) = client.next_snapshot().await {
        let snapshot = snapshot?;

        println!("[{}] {}", snapshot.last_updated.to_rfc3339(), snapshot.status);
        for (index, reading) in snapshot.history.iter().enumerate() {
            println!("  {index}: {reading}");
        }
    }

    info!("Server closed the connection");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    lcr_bridge::logging::init("info", None).await;

    let args = Args::parse();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        result = run(args) => {
            if let Err(e) = &result {
                error!(%e, "Monitor stopped");
            }
            return result;
        }
    }

    Ok(())
}
