//! TCP relay for change notifications
//!
//! The host runs this server next to the database. Observers connect,
//! subscribe to a meeting, and receive every [`Message::Change`] for it.
//! `Ping` is answered at any time, which makes the relay double as the
//! reachability endpoint for health probes.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::WriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::Message;
use crate::realtime::{ChangeFeed, ChangeSource};
use stack_core::ChangeEvent;

/// Maximum number of concurrent observers
const MAX_SUBSCRIBERS: usize = 256;

/// Relay state shared across tasks
struct RelayState {
    api_key: Option<String>,
    connections: usize,
}

/// Relay server handle
pub struct RelayServer {
    addr: SocketAddr,
    state: Arc<RwLock<RelayState>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Bind and start accepting observers.
    ///
    /// With `api_key` set, subscriptions must present the same key.
    pub async fn start(bind: SocketAddr, feed: ChangeFeed, api_key: Option<String>) -> Result<Self> {
        let listener = TcpListener::bind(bind).await?;
        let addr = listener.local_addr()?;

        if api_key.is_none() {
            warn!("Relay started without an API key; any observer may subscribe");
        }
        info!(addr = %addr, "Relay started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let state = Arc::new(RwLock::new(RelayState {
            api_key,
            connections: 0,
        }));

        let state_clone = state.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(accept_loop(listener, state_clone, feed, shutdown_rx, shutdown_tx.clone()));

        Ok(RelayServer {
            addr,
            state,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of open observer connections
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections
    }

    /// Shutdown the relay
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Relay shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    state: Arc<RwLock<RelayState>>,
    feed: ChangeFeed,
    mut shutdown_rx: broadcast::Receiver<()>,
    shutdown_tx: broadcast::Sender<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        {
                            let mut s = state.write().await;
                            if s.connections >= MAX_SUBSCRIBERS {
                                warn!(addr = %addr, "Relay full, dropping connection");
                                continue;
                            }
                            s.connections += 1;
                        }
                        debug!(addr = %addr, "New connection");
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            state.clone(),
                            feed.clone(),
                            shutdown_tx.subscribe(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Handle a single observer connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<RwLock<RelayState>>,
    feed: ChangeFeed,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut reader, writer) = tokio::io::split(stream);
    let (msg_tx, msg_rx) = mpsc::channel(64);
    let writer_handle = tokio::spawn(writer_task(writer, msg_rx));
    let mut forwarder: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            result = read_frame(&mut reader) => {
                match result {
                    Ok(Message::Ping) => {
                        let _ = msg_tx.send(Message::Pong).await;
                    }
                    Ok(Message::Subscribe { meeting_id, api_key }) => {
                        let expected = state.read().await.api_key.clone();
                        if expected.is_some() && api_key != expected {
                            warn!(addr = %addr, "Subscription rejected: bad API key");
                            let _ = msg_tx
                                .send(Message::Rejected { reason: "Invalid API key".into() })
                                .await;
                            break;
                        }

                        if let Some(previous) = forwarder.take() {
                            previous.abort();
                        }
                        forwarder = Some(tokio::spawn(forward_changes(
                            feed.subscribe_changes(),
                            meeting_id,
                            msg_tx.clone(),
                        )));
                        let _ = msg_tx.send(Message::Subscribed { meeting_id }).await;
                        info!(addr = %addr, meeting_id = ?meeting_id, "Observer subscribed");
                    }
                    Ok(other) => {
                        warn!(addr = %addr, message = ?other, "Unexpected message from observer");
                    }
                    Err(Error::ConnectionClosed) => {
                        debug!(addr = %addr, "Connection closed");
                        break;
                    }
                    Err(e) => {
                        warn!(addr = %addr, error = %e, "Read error");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                let _ = msg_tx.send(Message::ServerShutdown).await;
                break;
            }
        }
    }

    // Cleanup: stop forwarding, then let the writer drain what is queued
    if let Some(forwarder) = forwarder {
        forwarder.abort();
        let _ = forwarder.await;
    }
    drop(msg_tx);
    let _ = writer_handle.await;

    state.write().await.connections -= 1;
    debug!(addr = %addr, "Observer disconnected");
}

/// Forward matching change events to one observer
async fn forward_changes(
    mut rx: broadcast::Receiver<ChangeEvent>,
    meeting_id: Option<Uuid>,
    tx: mpsc::Sender<Message>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if meeting_id.is_some_and(|id| id != event.meeting_id) {
                    continue;
                }
                if tx.send(Message::Change(event)).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Observer lagged behind change feed");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Writer task - sends messages to the observer
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}
