//! A registered connection as seen by the coordinator.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chatwire_auth::Identity;
use chatwire_database::{ConversationId, UserId};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Serialized frame queued for a connection's writer.
pub type OutboundFrame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The coordinator's side of a connection.
///
/// The handle owns the only sender of the outbound queue. Dropping it closes
/// the queue, after which the writer drains what is buffered and exits.
/// A writer blocked on the transport never observes that, so the session can
/// also subscribe to [`ConnectionHandle::on_close`].
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub identity: Identity,
    pub conversation_id: ConversationId,
    pub connected_at: Instant,
    outbound: mpsc::Sender<OutboundFrame>,
    close_signal: Option<oneshot::Sender<CloseReason>>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end of its bounded outbound queue.
    pub fn new(
        identity: Identity,
        conversation_id: ConversationId,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (outbound, receiver) = mpsc::channel(queue_capacity.max(1));
        let handle = Self {
            id: ConnectionId::new(),
            identity,
            conversation_id,
            connected_at: Instant::now(),
            outbound,
            close_signal: None,
        };
        (handle, receiver)
    }

    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    /// Resolves with the close reason once the coordinator lets go of this
    /// connection. Resolves with an error if the handle is dropped without
    /// [`ConnectionHandle::close`]. Subscribing again replaces the earlier
    /// receiver.
    pub fn on_close(&mut self) -> oneshot::Receiver<CloseReason> {
        let (signal, receiver) = oneshot::channel();
        self.close_signal = Some(signal);
        receiver
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Close the outbound queue and tell the session why.
    pub fn close(mut self, reason: CloseReason) {
        if let Some(signal) = self.close_signal.take() {
            let _ = signal.send(reason);
        }
    }

    /// Non-blocking enqueue.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<(), mpsc::error::TrySendError<OutboundFrame>> {
        self.outbound.try_send(frame)
    }
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Handshaking,
    Registered,
    Active,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Handshaking, Registered)
                | (Handshaking, Closed)
                | (Registered, Active)
                | (Registered, Closing)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }
}

/// Why a connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    ClientClosed,
    TransportError,
    IdleTimeout,
    SlowConsumer,
    WriterGone,
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ClientClosed => "client_closed",
            CloseReason::TransportError => "transport_error",
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::SlowConsumer => "slow_consumer",
            CloseReason::WriterGone => "writer_gone",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
