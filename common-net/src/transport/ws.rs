use std::fmt::Display;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use super::{
    Connection, ConnectionSettings, Connector, TransportError, TransportErrorKind, TransportKind,
};
use crate::message::{self, ClientFrame, ServerFrame};

fn map_ws_error(err: impl Display) -> TransportError {
    TransportError::new(TransportErrorKind::Io, err.to_string())
}

/// Connects to the relay gateway over a WebSocket (`ws://host:port/ws`).
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn connect(&self, settings: ConnectionSettings) -> Result<Connection, TransportError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(map_ws_error)?;
        let (mut sink, mut source) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<ServerFrame>();

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let text = match message::encode_client(&frame) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(%err, "ws transport: encode failed");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(text)).await {
                    warn!(%err, "ws transport: send failed");
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("ws transport: writer stopped");
        });

        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let decoded = match message {
                    Ok(Message::Text(text)) => message::decode_server(text.as_bytes()),
                    Ok(Message::Binary(bytes)) => message::decode_server(&bytes),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(%err, "ws transport: read failed");
                        break;
                    }
                };
                match decoded {
                    Ok(frame) => {
                        if inbound_tx.send(frame).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(%err, "ws transport: undecodable frame dropped"),
                }
            }
            debug!("ws transport: reader stopped");
        });

        Ok(Connection::from_pipes(
            TransportKind::WebSocket,
            outbound_tx,
            inbound_rx,
            settings,
        ))
    }
}
