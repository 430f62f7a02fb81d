//! Transport socket abstraction and the WebSocket implementation.
//!
//! A [`TransportLink`] is one open full-duplex text channel. Dropping its
//! outbound sender closes the underlying socket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::shared::error::ClientError;

/// Something that happened on an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(String),
    Closed,
    Error(String),
}

/// An open transport socket.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens transport sockets.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, endpoint: &str) -> Result<TransportLink, ClientError>;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, endpoint: &str) -> Result<TransportLink, ClientError> {
        let (socket, _) = connect_async(endpoint)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let (mut write, mut read) = socket.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (events_tx, events) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    out = outbound_rx.recv() => match out {
                        Some(text) => {
                            if let Err(e) = write.send(Message::Text(text.into())).await {
                                let _ = events_tx.send(TransportEvent::Error(e.to_string()));
                                break;
                            }
                        }
                        // Link dropped by its owner
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if events_tx.send(TransportEvent::Message(text.as_str().to_owned())).is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            let _ = events_tx.send(TransportEvent::Closed);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = events_tx.send(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    },
                }
            }
            tracing::trace!("Transport pump stopped");
        });

        Ok(TransportLink { outbound, events })
    }
}
