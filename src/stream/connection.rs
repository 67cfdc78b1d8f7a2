use crate::config::StreamConfig;
use crate::mcp::OutboundEvent;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Process-unique identifier of an accepted stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub heartbeat_interval: Duration,
    pub channel_capacity: usize,
}

impl From<&StreamConfig> for ConnectionSettings {
    fn from(config: &StreamConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            channel_capacity: config.channel_capacity,
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings::from(&StreamConfig::default())
    }
}

/// One client-facing event stream.
///
/// Owns the heartbeat task and the sending half of the outbound channel.
/// Call tasks hold an `Arc` only to [`emit`](Self::emit) their result; once
/// the connection is closed every emit is silently dropped.
pub struct StreamConnection {
    id: ConnectionId,
    tx: mpsc::Sender<OutboundEvent>,
    shutdown: CancellationToken,
    closed: AtomicBool,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    in_flight: AtomicUsize,
}

/// Receiving half of a connection: the events to write to the client.
pub struct Outbox {
    rx: mpsc::Receiver<OutboundEvent>,
    shutdown: CancellationToken,
}

impl Outbox {
    /// Next queued event, or `None` once the connection is closed.
    pub async fn next(&mut self) -> Option<OutboundEvent> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }
}

impl StreamConnection {
    /// Open a connection: queue `connection_established` and start the heartbeat.
    ///
    /// `parent` lets the server close every stream at once on shutdown.
    pub fn open(
        id: ConnectionId,
        settings: ConnectionSettings,
        parent: &CancellationToken,
    ) -> (Arc<Self>, Outbox) {
        let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
        let shutdown = parent.child_token();

        // Fresh channel with room for at least one event
        let _ = tx.try_send(OutboundEvent::ConnectionEstablished);

        let heartbeat = spawn_heartbeat(
            id,
            tx.clone(),
            shutdown.clone(),
            settings.heartbeat_interval,
        );

        let connection = Arc::new(Self {
            id,
            tx,
            shutdown: shutdown.clone(),
            closed: AtomicBool::new(false),
            heartbeat: Mutex::new(Some(heartbeat)),
            in_flight: AtomicUsize::new(0),
        });

        debug!(
            "Opened connection {} (heartbeat every {:?})",
            id, settings.heartbeat_interval
        );
        (connection, Outbox { rx, shutdown })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.shutdown.is_cancelled()
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    /// Queue one event for the client. Returns whether it was accepted.
    pub async fn emit(&self, event: OutboundEvent) -> bool {
        let kind = event.kind();
        if self.is_closed() {
            debug!("Dropping {} event for closed connection {}", kind, self.id);
            return false;
        }

        let sent = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            result = self.tx.send(event) => result.is_ok(),
        };
        if sent {
            trace!("Queued {} event on connection {}", kind, self.id);
        } else {
            debug!("Dropping {} event, connection {} went away", kind, self.id);
        }
        sent
    }

    /// Stop the heartbeat and end the outbox. Only the first call has any effect.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.shutdown.cancel();
        if let Some(heartbeat) = self.heartbeat_slot().take() {
            heartbeat.abort();
        }

        info!(
            "Connection {} closed ({} call(s) still in flight)",
            self.id,
            self.in_flight()
        );
        true
    }

    /// Whether the heartbeat task is still alive.
    pub fn heartbeat_active(&self) -> bool {
        self.heartbeat_slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Count a backend call against this connection until the guard drops.
    pub(crate) fn track_call(self: &Arc<Self>) -> InFlightCall {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlightCall {
            connection: Arc::clone(self),
        }
    }

    fn heartbeat_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

pub(crate) struct InFlightCall {
    connection: Arc<StreamConnection>,
}

impl InFlightCall {
    pub(crate) fn connection(&self) -> &StreamConnection {
        &self.connection
    }
}

impl Drop for InFlightCall {
    fn drop(&mut self) {
        self.connection.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

fn spawn_heartbeat(
    id: ConnectionId,
    tx: mpsc::Sender<OutboundEvent>,
    shutdown: CancellationToken,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if tx.send(OutboundEvent::Ping).await.is_err() {
                        break;
                    }
                    trace!("Heartbeat sent on connection {}", id);
                }
            }
        }

        debug!("Heartbeat stopped for connection {}", id);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(secs: u64) -> ConnectionSettings {
        ConnectionSettings {
            heartbeat_interval: Duration::from_secs(secs),
            channel_capacity: 16,
        }
    }

    fn assert_elapsed(start: Instant, secs: u64) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_secs(secs) && elapsed < Duration::from_secs(secs + 1),
            "expected ~{}s, got {:?}",
            secs,
            elapsed
        );
    }

    #[tokio::test]
    async fn test_open_sends_connection_established_first() {
        let root = CancellationToken::new();
        let (_conn, mut outbox) = StreamConnection::open(ConnectionId(1), settings(30), &root);

        assert_eq!(outbox.next().await, Some(OutboundEvent::ConnectionEstablished));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_fires_on_fixed_interval() {
        let root = CancellationToken::new();
        let start = Instant::now();
        let (conn, mut outbox) = StreamConnection::open(ConnectionId(1), settings(30), &root);

        assert_eq!(outbox.next().await, Some(OutboundEvent::ConnectionEstablished));

        assert_eq!(outbox.next().await, Some(OutboundEvent::Ping));
        assert_elapsed(start, 30);

        assert_eq!(outbox.next().await, Some(OutboundEvent::Ping));
        assert_elapsed(start, 60);

        assert!(conn.heartbeat_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_interleaves_with_responses() {
        let root = CancellationToken::new();
        let (conn, mut outbox) = StreamConnection::open(ConnectionId(1), settings(30), &root);

        let emitter = Arc::clone(&conn);
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(45)).await;
            emitter
                .emit(OutboundEvent::function_response(json!("r1"), json!({"ok": true})))
                .await;
        });

        let mut kinds = Vec::new();
        for _ in 0..4 {
            kinds.push(outbox.next().await.unwrap().kind());
        }
        assert_eq!(
            kinds,
            vec!["connection_established", "ping", "function_response", "ping"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_heartbeat_and_outbox() {
        let root = CancellationToken::new();
        let (conn, mut outbox) = StreamConnection::open(ConnectionId(1), settings(30), &root);
        assert_eq!(outbox.next().await, Some(OutboundEvent::ConnectionEstablished));

        assert!(conn.close());
        tokio::task::yield_now().await;

        assert!(conn.is_closed());
        assert!(!conn.heartbeat_active());

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(outbox.next().await, None);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let root = CancellationToken::new();
        let (conn, _outbox) = StreamConnection::open(ConnectionId(1), settings(30), &root);

        assert!(conn.close());
        assert!(!conn.close());
        assert!(!conn.close());
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_emit_after_close_is_dropped_quietly() {
        let root = CancellationToken::new();
        let (conn, _outbox) = StreamConnection::open(ConnectionId(1), settings(30), &root);
        conn.close();

        let accepted = conn
            .emit(OutboundEvent::function_response(json!(1), json!(null)))
            .await;
        assert!(!accepted);
    }

    #[tokio::test]
    async fn test_emit_after_client_gone_is_dropped_quietly() {
        let root = CancellationToken::new();
        let (conn, outbox) = StreamConnection::open(ConnectionId(1), settings(30), &root);
        drop(outbox);

        assert!(!conn.emit(OutboundEvent::error(None, "late")).await);
    }

    #[tokio::test]
    async fn test_parent_cancellation_closes_connection() {
        let root = CancellationToken::new();
        let (conn, mut outbox) = StreamConnection::open(ConnectionId(1), settings(30), &root);

        root.cancel();
        assert!(conn.is_closed());
        assert_eq!(outbox.next().await, None);
    }

    #[tokio::test]
    async fn test_in_flight_tracking() {
        let root = CancellationToken::new();
        let (conn, _outbox) = StreamConnection::open(ConnectionId(1), settings(30), &root);

        let first = conn.track_call();
        let second = conn.track_call();
        assert_eq!(conn.in_flight(), 2);
        drop(first);
        assert_eq!(conn.in_flight(), 1);
        assert_eq!(second.connection().id(), ConnectionId(1));
        drop(second);
        assert_eq!(conn.in_flight(), 0);
    }
}
