use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, WebSocketUpgrade,
    },
    response::IntoResponse,
    Extension, TypedHeader,
};
use futures::{sink::Sink, stream::Stream, SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream, UnboundedReceiverStream};
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::{
    actions::{Action, Response},
    error,
    hub::{HubHandle, Subscription},
    store::Snapshot,
};

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(hub): Extension<HubHandle>,
) -> impl IntoResponse {
    if let Some(TypedHeader(user_agent)) = user_agent {
        info!("`{}`@`{addr}` connected", user_agent.as_str());
    } else {
        info!("`{addr}` connected");
    }

    ws.on_upgrade(move |socket| {
        let span = info_span!("Subscriber", %addr);

        handle_websocket(socket, hub).instrument(span)
    })
}

pub(crate) async fn read<S>(
    mut receiver: S,
    errors: mpsc::UnboundedSender<error::Error>,
    hub: HubHandle,
) where
    S: Unpin,
    S: Stream<Item = Result<Message, axum::Error>>,
{
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(request_text) => {
                trace!(%request_text, "subscriber request");
                match serde_json::from_str::<Action>(&request_text) {
                    Ok(Action::Command(command)) => {
                        info!(%command, "Command received");
                        hub.command(command);
                    }
                    Err(e) => {
                        let _ = errors.send(error::Error::BadJson {
                            request: request_text,
                            problem: e.to_string(),
                        });
                    }
                }
            }
            Message::Binary(_) => {
                debug!("client sent binary data");
            }
            Message::Ping(_) => {
                debug!("socket ping");
            }
            Message::Pong(_) => {
                debug!("socket pong");
            }
            Message::Close(_) => {
                debug!("client disconnected");
            }
        }
    }

    debug!("no more stuff");
}

enum Outgoing {
    Update(Result<Snapshot, BroadcastStreamRecvError>),
    Error(error::Error),
}

pub(crate) async fn write(
    mut sender: impl Sink<Message> + Unpin,
    initial: Snapshot,
    updates: broadcast::Receiver<Snapshot>,
    errors: mpsc::UnboundedReceiver<error::Error>,
) {
    let updates = BroadcastStream::new(updates).map(Outgoing::Update);
    let errors = UnboundedReceiverStream::new(errors).map(Outgoing::Error);

    let mut outgoing = futures::stream::iter([Outgoing::Update(Ok(initial))])
        .chain(futures::stream::select(updates, errors));

    while let Some(next) = outgoing.next().await {
        let response = match next {
            Outgoing::Update(Ok(snapshot)) => Response::Snapshot(snapshot),
            Outgoing::Update(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                warn!(%skipped, "Subscriber too slow, skipped snapshots");
                continue;
            }
            Outgoing::Error(e) => {
                info!("Error response: <{e}>");
                Response::Error(e)
            }
        };
        debug!("Response: <{response}>");

        let response = match serde_json::to_string(&response) {
            Ok(response) => response,
            Err(e) => {
                warn!(?e, "Could not serialize response");
                continue;
            }
        };

        if sender.send(Message::Text(response)).await.is_err() {
            debug!("client disconnected");
            return;
        }
        trace!("Reply flushed");
    }
}

pub(crate) async fn handle_websocket(websocket: WebSocket, hub: HubHandle) {
    let Subscription { initial, updates } = match hub.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!(%e, "Could not subscribe");
            return;
        }
    };

    let (stream_sender, stream_receiver) = websocket.split();
    let (error_sender, error_receiver) = mpsc::unbounded_channel();

    let read_handle = tokio::spawn(
        read(stream_receiver, error_sender, hub).instrument(info_span!("Read")),
    );
    let write_handle = tokio::spawn(
        write(stream_sender, initial, updates, error_receiver).instrument(info_span!("Write")),
    );

    match read_handle.await {
        Ok(()) => debug!("Read task joined"),
        Err(e) => warn!("Read task join error: {e:?}"),
    }

    debug!("Aborting write task");
    // This drops the subscription and closes the underlying TCP connection,
    // which signals the peer that the session is over.
    write_handle.abort();
}
