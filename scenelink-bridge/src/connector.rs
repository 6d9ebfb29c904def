//! Socket construction behind a seam the transport can be tested through.

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use crate::transport::{SocketEvent, SocketId, TransportInput};

/// Socket-level failures. None of them are fatal to the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("bridge URL empty")]
    EmptyUrl,
    #[error("invalid bridge URL: {0}")]
    InvalidUrl(String),
    #[error("socket closed")]
    SocketClosed,
}

/// Owner's end of one socket: an outbound text channel plus the task
/// driving the connection.
#[derive(Debug)]
pub struct SocketHandle {
    outbound: mpsc::UnboundedSender<String>,
    task: Option<JoinHandle<()>>,
}

impl SocketHandle {
    pub fn new(outbound: mpsc::UnboundedSender<String>, task: Option<JoinHandle<()>>) -> Self {
        Self { outbound, task }
    }

    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.outbound.send(text).map_err(|_| TransportError::SocketClosed)
    }

    /// Drop the outbound channel; the socket task sends a close frame and
    /// exits on its own.
    pub fn close(self) {
        drop(self.outbound);
        drop(self.task);
    }

    /// Stop the socket task without a close handshake.
    pub fn abort(self) {
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

/// Opens sockets that report back through `inputs`, tagged with `socket`.
///
/// Implementations must eventually deliver exactly one
/// [`SocketEvent::Closed`] for every handle they return.
pub trait Connector {
    fn open(
        &self,
        url: &str,
        socket: SocketId,
        inputs: mpsc::UnboundedSender<TransportInput>,
    ) -> Result<SocketHandle, TransportError>;
}

/// `tokio-tungstenite` websocket connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(
        &self,
        url: &str,
        socket: SocketId,
        inputs: mpsc::UnboundedSender<TransportInput>,
    ) -> Result<SocketHandle, TransportError> {
        if url.trim().is_empty() {
            return Err(TransportError::EmptyUrl);
        }
        let request = url
            .into_client_request()
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

        let task = tokio::spawn(async move {
            let notify = |event: SocketEvent| {
                let _ = inputs.send(TransportInput::Socket { socket, event });
            };

            match tokio_tungstenite::connect_async(request).await {
                Ok((stream, _)) => {
                    notify(SocketEvent::Opened);
                    let (mut writer, mut reader) = stream.split();
                    loop {
                        tokio::select! {
                            outbound = out_rx.recv() => match outbound {
                                Some(text) => {
                                    if let Err(err) = writer.send(Message::text(text)).await {
                                        notify(SocketEvent::Error(err.to_string()));
                                        break;
                                    }
                                }
                                None => {
                                    let _ = writer.send(Message::Close(None)).await;
                                    break;
                                }
                            },
                            inbound = reader.next() => match inbound {
                                Some(Ok(Message::Text(text))) => notify(SocketEvent::Frame(text.as_str().to_owned())),
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Ok(_)) => {}
                                Some(Err(err)) => {
                                    notify(SocketEvent::Error(err.to_string()));
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(err) => {
                    log::warn!("bridge socket {socket} failed to connect: {err}");
                    notify(SocketEvent::Error(err.to_string()));
                }
            }
            notify(SocketEvent::Closed);
        });

        Ok(SocketHandle::new(out_tx, Some(task)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_bad_urls() {
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(WsConnector.open("  ", 1, tx.clone()).unwrap_err(), TransportError::EmptyUrl);
        assert!(matches!(
            WsConnector.open("not a url", 1, tx),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_error_then_closed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = WsConnector.open(&format!("ws://127.0.0.1:{port}"), 7, tx).unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            TransportInput::Socket {
                socket: 7,
                event: SocketEvent::Error(_)
            }
        ));
        let second = rx.recv().await.unwrap();
        assert_eq!(
            second,
            TransportInput::Socket {
                socket: 7,
                event: SocketEvent::Closed
            }
        );
    }
}
