//! TCP client for the change relay
//!
//! Used by observers that watch a meeting from another process, and by
//! the health probe, which only needs a `Ping`/`Pong` exchange.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::Message;
use crate::realtime::{ChangeSource, DEFAULT_FEED_CAPACITY};
use stack_core::ChangeEvent;

/// State of the link to the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// Client handle for a relay subscription
pub struct RelayClient {
    state: Arc<RwLock<ClientState>>,
    events: broadcast::Sender<ChangeEvent>,
    cmd_tx: mpsc::Sender<ClientCommand>,
}

struct ClientState {
    link: LinkState,
    meeting_id: Option<Uuid>,
    pending_pongs: Vec<oneshot::Sender<()>>,
}

enum ClientCommand {
    Send(Message),
    Disconnect,
}

impl RelayClient {
    /// Connect and subscribe to changes for `meeting_id` (all meetings when
    /// `None`). Fails if the relay rejects the subscription.
    pub async fn connect(
        addr: SocketAddr,
        meeting_id: Option<Uuid>,
        api_key: Option<String>,
    ) -> Result<Self> {
        info!(addr = %addr, meeting_id = ?meeting_id, "Connecting to relay");

        let stream = TcpStream::connect(addr).await?;
        let (mut reader, mut writer) = tokio::io::split(stream);

        write_frame(&mut writer, &Message::Subscribe { meeting_id, api_key }).await?;

        match read_frame(&mut reader).await? {
            Message::Subscribed { .. } => {}
            Message::Rejected { reason } => {
                warn!(reason = %reason, "Subscription rejected");
                return Err(Error::Rejected(reason));
            }
            other => {
                return Err(Error::Protocol(format!(
                    "Expected Subscribed, got {:?}",
                    other
                )))
            }
        }

        let state = Arc::new(RwLock::new(ClientState {
            link: LinkState::Connected,
            meeting_id,
            pending_pongs: Vec::new(),
        }));

        let (events, _) = broadcast::channel(DEFAULT_FEED_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        tokio::spawn(connection_task(
            reader,
            writer,
            state.clone(),
            events.clone(),
            cmd_rx,
        ));

        Ok(RelayClient {
            state,
            events,
            cmd_tx,
        })
    }

    /// Round-trip a ping through the relay
    pub async fn ping(&self, timeout: Duration) -> Result<Duration> {
        let (tx, rx) = oneshot::channel();
        self.state.write().await.pending_pongs.push(tx);

        let started = Instant::now();
        self.cmd_tx
            .send(ClientCommand::Send(Message::Ping))
            .await
            .map_err(|_| Error::NotConnected)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => Ok(started.elapsed()),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Disconnect from the relay
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Disconnect).await;
    }

    /// Get current link state
    pub async fn link_state(&self) -> LinkState {
        self.state.read().await.link
    }

    /// Meeting this client is scoped to
    pub async fn meeting_id(&self) -> Option<Uuid> {
        self.state.read().await.meeting_id
    }
}

impl ChangeSource for RelayClient {
    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }
}

/// Main connection task
async fn connection_task(
    mut reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    state: Arc<RwLock<ClientState>>,
    events: broadcast::Sender<ChangeEvent>,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
) {
    loop {
        tokio::select! {
            result = read_frame(&mut reader) => {
                match result {
                    Ok(Message::Change(event)) => {
                        let _ = events.send(event);
                    }
                    Ok(Message::Pong) => {
                        let mut s = state.write().await;
                        for waiter in s.pending_pongs.drain(..) {
                            let _ = waiter.send(());
                        }
                    }
                    Ok(Message::ServerShutdown) => {
                        info!("Relay shutting down");
                        break;
                    }
                    Ok(other) => {
                        debug!(message = ?other, "Ignoring relay message");
                    }
                    Err(Error::ConnectionClosed) => {
                        info!("Relay closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Relay read error");
                        break;
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(msg)) => {
                        if let Err(e) = write_frame(&mut writer, &msg).await {
                            warn!(error = %e, "Relay write error");
                            break;
                        }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        debug!("Disconnecting from relay");
                        break;
                    }
                }
            }
        }
    }

    let mut s = state.write().await;
    s.link = LinkState::Disconnected;
    // Dropping the waiters wakes pending pings with an error
    s.pending_pongs.clear();
}

/// One-shot reachability check: connect, ping, expect pong, all within
/// `timeout`.
pub async fn probe(addr: SocketAddr, timeout: Duration) -> Result<()> {
    let attempt = async {
        let mut stream = TcpStream::connect(addr).await?;
        write_frame(&mut stream, &Message::Ping).await?;
        match read_frame(&mut stream).await? {
            Message::Pong => Ok::<(), Error>(()),
            other => Err(Error::Protocol(format!("Expected Pong, got {:?}", other))),
        }
    };

    tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| Error::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::ChangeFeed;
    use crate::server::RelayServer;
    use stack_core::{ChangeKind, Table};

    async fn start_relay(api_key: Option<&str>) -> (RelayServer, ChangeFeed) {
        let feed = ChangeFeed::default();
        let server = RelayServer::start(
            "127.0.0.1:0".parse().unwrap(),
            feed.clone(),
            api_key.map(str::to_string),
        )
        .await
        .unwrap();
        (server, feed)
    }

    async fn wait_for_subscribers(feed: &ChangeFeed, n: usize) {
        for _ in 0..100 {
            if feed.subscriber_count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("relay never subscribed to the feed");
    }

    #[tokio::test]
    async fn test_probe_gets_pong() {
        let (server, _feed) = start_relay(None).await;
        probe(server.addr(), Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_unreachable_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(probe(addr, Duration::from_millis(500)).await.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_scoped_changes() {
        let (server, feed) = start_relay(Some("public-key")).await;
        let meeting_id = Uuid::new_v4();

        let client = RelayClient::connect(server.addr(), Some(meeting_id), Some("public-key".into()))
            .await
            .unwrap();
        let mut rx = client.subscribe_changes();
        wait_for_subscribers(&feed, 1).await;

        feed.publish(ChangeEvent::new(Table::Meetings, ChangeKind::Update, Uuid::new_v4()));
        feed.publish(ChangeEvent::new(Table::QueueEntries, ChangeKind::Insert, meeting_id));

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.meeting_id, meeting_id);
        assert_eq!(event.table, Table::QueueEntries);

        assert!(client.ping(Duration::from_secs(2)).await.is_ok());
        assert_eq!(client.link_state().await, LinkState::Connected);
    }

    #[tokio::test]
    async fn test_bad_api_key_rejected() {
        let (server, _feed) = start_relay(Some("public-key")).await;
        let result = RelayClient::connect(server.addr(), None, Some("wrong".into())).await;
        assert!(matches!(result, Err(Error::Rejected(_))));
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_observers() {
        let (server, _feed) = start_relay(None).await;
        let client = RelayClient::connect(server.addr(), None, None).await.unwrap();

        server.shutdown();
        for _ in 0..100 {
            if client.link_state().await == LinkState::Disconnected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("client still connected after shutdown");
    }
}
