use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::{
    actions::{Action, Response},
    error::Error,
    server::WEBSOCKET_ROUTE,
    source::Command,
    store::Snapshot,
};

/// A websocket client following the snapshots of a running server.
pub struct ClientHandle {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ClientHandle {
    /// Connect to the server at the given address and port.
    ///
    /// The server pushes the current snapshot right away,
    /// so the first [`ClientHandle::next_snapshot`] returns without waiting.
    pub async fn new(address: &str, port: u16) -> Result<Self, Error> {
        let url = format!("ws://{address}:{port}{WEBSOCKET_ROUTE}");
        info!(%url, "Connecting");

        let (stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| Error::Connection(format!("Could not connect to {url}: {e}")))?;

        Ok(Self { stream })
    }

    /// Send a control command.
    pub async fn command(&mut self, command: Command) -> Result<(), Error> {
        let request = Action::Command(command).serialize()?;
        debug!(%request, "Sending");

        self.stream
            .send(tungstenite::Message::Text(request))
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }

    /// Wait for the next thing the server says.
    /// `None` when the connection closed.
    pub async fn next_response(&mut self) -> Option<Result<Response, Error>> {
        while let Some(message) = self.stream.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => return Some(Err(Error::Connection(e.to_string()))),
            };

            match message {
                tungstenite::Message::Text(text) => {
                    return Some(serde_json::from_str(&text).map_err(|e| Error::BadJson {
                        request: text,
                        problem: e.to_string(),
                    }));
                }
                tungstenite::Message::Close(_) => return None,
                other => debug!(?other, "Ignoring frame"),
            }
        }

        None
    }

    /// Wait for the next snapshot, skipping over anything else.
    pub async fn next_snapshot(&mut self) -> Option<Result<Snapshot, Error>> {
        loop {
            match self.next_response().await? {
                Ok(Response::Snapshot(snapshot)) => return Some(Ok(snapshot)),
                Ok(Response::Error(e)) => debug!(%e, "Server reported error"),
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Send raw text, for when the server's reaction to junk is of interest.
    pub async fn send_text(&mut self, text: &str) -> Result<(), Error> {
        self.stream
            .send(tungstenite::Message::Text(text.into()))
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }
}
