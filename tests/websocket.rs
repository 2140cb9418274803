use color_eyre::Result;
use common::*;
use lcr_bridge::{
    actions::Response,
    config::Config,
    source::Command,
    store::{DeviceStatus, Reading, ReadingStore},
};
use pretty_assertions::assert_eq;

mod common;

#[tokio::test]
async fn can_connect() -> Result<()> {
    let port = start_simulation_server().await;

    connect(port).await?;

    Ok(())
}

#[tokio::test]
async fn snapshot_pushed_on_connect() -> Result<()> {
    let port = start_simulation_server().await;
    let mut client = connect(port).await?;

    let pushed = next_snapshot(&mut client).await?;

    assert_eq!(pushed.status, DeviceStatus::Connected("SIMULATED".into()));
    assert!(pushed.history.is_empty());
    assert_eq!(pushed, get_snapshot(port).await?);

    Ok(())
}

#[tokio::test]
async fn start_broadcasts_to_everyone() -> Result<()> {
    let port = start_simulation_server().await;

    let mut alice = connect(port).await?;
    let mut bob = connect(port).await?;
    next_snapshot(&mut alice).await?;
    next_snapshot(&mut bob).await?;

    alice.command(Command::Start).await?;

    let for_alice = next_snapshot(&mut alice).await?;
    let for_bob = next_snapshot(&mut bob).await?;

    assert_eq!(for_alice, for_bob);
    assert_eq!(for_alice.history.len(), 1);
    assert!(for_alice.history[0].as_str().starts_with("Z = "));
    assert_eq!(for_alice, get_snapshot(port).await?);

    Ok(())
}

#[tokio::test]
async fn stop_clears_history() -> Result<()> {
    let port = start_simulation_server().await;
    let mut client = connect(port).await?;
    next_snapshot(&mut client).await?;

    client.command(Command::Start).await?;
    let started = next_snapshot(&mut client).await?;
    assert_eq!(started.history.len(), 1);

    client.command(Command::Stop).await?;
    let stopped = next_snapshot(&mut client).await?;

    assert!(stopped.history.is_empty());
    assert_eq!(stopped.status, DeviceStatus::Connected("SIMULATED".into()));
    assert!(stopped.last_updated >= started.last_updated);

    Ok(())
}

#[tokio::test]
async fn late_joiner_gets_current_history() -> Result<()> {
    let port = start_simulation_server().await;
    let mut early = connect(port).await?;
    next_snapshot(&mut early).await?;

    early.command(Command::Start).await?;
    let started = next_snapshot(&mut early).await?;

    let mut late = connect(port).await?;
    assert_eq!(next_snapshot(&mut late).await?, started);

    Ok(())
}

#[tokio::test]
async fn disconnecting_leaves_others_alone() -> Result<()> {
    let port = start_simulation_server().await;

    let mut stays = connect(port).await?;
    next_snapshot(&mut stays).await?;

    {
        let mut leaves = connect(port).await?;
        next_snapshot(&mut leaves).await?;
    }

    stays.command(Command::Start).await?;
    let snapshot = next_snapshot(&mut stays).await?;
    assert_eq!(snapshot.history.len(), 1);

    Ok(())
}

#[tokio::test]
async fn bad_json_is_answered_with_error() -> Result<()> {
    let port = start_simulation_server().await;
    let mut client = connect(port).await?;
    next_snapshot(&mut client).await?;

    client.send_text("{ not json").await?;

    let response = next_response_within(&mut client).await?;
    let Response::Error(problem) = response else {
        panic!("Expected an error, got {response:?}");
    };
    assert!(problem.to_string().contains("{ not json"), "{problem}");

    // Still usable afterwards.
    client.command(Command::Start).await?;
    assert_eq!(next_snapshot(&mut client).await?.history.len(), 1);

    Ok(())
}

#[tokio::test]
async fn published_snapshots_arrive_in_order() -> Result<()> {
    let (port, hub) = start_app(&Config::default()).await;
    let mut client = connect(port).await?;
    next_snapshot(&mut client).await?;

    let mut store = ReadingStore::new();
    store.apply_status(DeviceStatus::Connected("/dev/ttyUSB0".into()));

    let mut expected = vec![];
    for n in 1..=7 {
        let snapshot = store.apply_measurement(Reading::new(&format!("Z = {n}.00 Ω")));
        expected.push(snapshot.clone());
        hub.publish(snapshot);
    }

    for wanted in expected {
        assert_eq!(next_snapshot(&mut client).await?, wanted);
    }

    let last = get_snapshot(port).await?;
    assert_eq!(last.history.len(), 5);
    assert_eq!(last.history[0].as_str(), "Z = 7.00 Ω");
    assert_eq!(last.history[4].as_str(), "Z = 3.00 Ω");

    Ok(())
}

async fn next_response_within(
    client: &mut lcr_bridge::client::ClientHandle,
) -> Result<Response> {
    let response = tokio::time::timeout(std::time::Duration::from_secs(5), client.next_response())
        .await?
        .ok_or_else(|| color_eyre::eyre::eyre!("Stream closed"))??;

    Ok(response)
}
