//! One accepted socket: a reader task, a writer task and their teardown.
//!
//! The writer drains the connection's outbound queue and sends heartbeat
//! pings. The reader classifies inbound frames and closes the session when
//! the client goes quiet for longer than the idle timeout. Whichever side
//! finishes first ends the session; the coordinator is told exactly once
//! through an idempotent unregister. When the coordinator drops the
//! connection itself (eviction or shutdown) both tasks are torn down, which
//! releases the socket.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chatwire_auth::Identity;
use chatwire_database::{ConversationId, MessageId};
use chatwire_delivery::{
    classify, classify_binary, CloseReason, ConnectionHandle, ConnectionId, ConnectionState,
    CoordinatorHandle, DeliveryError, DeliveryService, Inbound, OutboundFrame, ReadReceipt,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::state::GatewayState;

/// How long the writer may keep flushing after the reader is done.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the writer may keep flushing after the coordinator closed the
/// connection for any reason other than a slow consumer.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterOutcome {
    /// The coordinator dropped the connection (eviction, shutdown or unregister).
    QueueClosed,
    SendFailed,
}

struct Lifecycle {
    connection_id: ConnectionId,
    state: ConnectionState,
}

impl Lifecycle {
    fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            state: ConnectionState::Handshaking,
        }
    }

    fn advance(&mut self, next: ConnectionState) {
        if self.state.can_transition_to(next) {
            debug!(connection_id = %self.connection_id, from = ?self.state, to = ?next, "connection state changed");
            self.state = next;
        } else {
            warn!(connection_id = %self.connection_id, from = ?self.state, to = ?next, "ignoring invalid state transition");
        }
    }
}

/// Drive an upgraded socket until it closes.
pub async fn run(socket: WebSocket, state: Arc<GatewayState>, identity: Identity, conversation_id: ConversationId) {
    let realtime = state.realtime.clone();
    let coordinator = state.coordinator().clone();

    let (mut handle, outbound) = ConnectionHandle::new(identity, conversation_id, realtime.outbound_queue_capacity);
    let mut closed = handle.on_close();
    let connection_id = handle.id;
    let mut lifecycle = Lifecycle::new(connection_id);

    if let Err(err) = coordinator.register(handle).await {
        warn!(connection_id = %connection_id, error = %err, "could not register connection");
        lifecycle.advance(ConnectionState::Closed);
        return;
    }
    lifecycle.advance(ConnectionState::Registered);

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, outbound, realtime.ping_interval(), connection_id));
    let mut reader = tokio::spawn(read_loop(
        stream,
        Reader {
            connection_id,
            identity,
            conversation_id,
            idle_timeout: realtime.idle_timeout(),
            delivery: state.delivery.clone(),
        },
    ));
    lifecycle.advance(ConnectionState::Active);

    let reason = tokio::select! {
        outcome = &mut reader => {
            let reason = outcome.unwrap_or(CloseReason::TransportError);
            lifecycle.advance(ConnectionState::Closing);
            let _ = coordinator.unregister(connection_id, reason).await;

            // the writer flushes what is queued and sends a close frame
            if timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
                writer.abort();
            }
            reason
        }
        outcome = &mut writer => {
            reader.abort();
            lifecycle.advance(ConnectionState::Closing);
            let reason = match outcome {
                Ok(WriterOutcome::QueueClosed) => CloseReason::WriterGone,
                Ok(WriterOutcome::SendFailed) | Err(_) => CloseReason::TransportError,
            };
            let _ = coordinator.unregister(connection_id, reason).await;
            reason
        }
        signal = &mut closed => {
            // the coordinator already dropped us; stop classifying at once
            reader.abort();
            lifecycle.advance(ConnectionState::Closing);
            let reason = signal.unwrap_or(CloseReason::WriterGone);

            // a slow consumer's writer is stuck on the transport and would
            // never see the closed queue
            if reason == CloseReason::SlowConsumer
                || timeout(CLOSE_FLUSH_TIMEOUT, &mut writer).await.is_err()
            {
                writer.abort();
            }
            reason
        }
    };

    lifecycle.advance(ConnectionState::Closed);
    info!(
        connection_id = %connection_id,
        user_id = identity.user_id,
        conversation_id,
        reason = %reason,
        "websocket session closed"
    );
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    ping_interval: Duration,
    connection_id: ConnectionId,
) -> WriterOutcome {
    let mut heartbeat = interval_at(Instant::now() + ping_interval, ping_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.send(Message::Close(None)).await;
                    return WriterOutcome::QueueClosed;
                };

                if let Err(err) = sink.send(Message::Text(frame.to_string())).await {
                    debug!(connection_id = %connection_id, error = %err, "websocket send failed");
                    return WriterOutcome::SendFailed;
                }
            }
            _ = heartbeat.tick() => {
                if let Err(err) = sink.send(Message::Ping(Vec::new())).await {
                    debug!(connection_id = %connection_id, error = %err, "websocket ping failed");
                    return WriterOutcome::SendFailed;
                }
            }
        }
    }
}

struct Reader {
    connection_id: ConnectionId,
    identity: Identity,
    conversation_id: ConversationId,
    idle_timeout: Duration,
    delivery: DeliveryService,
}

impl Reader {
    fn coordinator(&self) -> &CoordinatorHandle {
        self.delivery.coordinator()
    }

    /// Returns `false` once the coordinator is gone.
    async fn acknowledge(&self, message_id: MessageId) -> bool {
        // identity and conversation come from the connection, never the frame
        let receipt = ReadReceipt {
            message_id,
            user_id: self.identity.user_id,
            conversation_id: self.conversation_id,
        };

        match self.delivery.acknowledge_read(receipt, Some(self.connection_id)).await {
            Ok(_) => true,
            Err(DeliveryError::CoordinatorUnavailable) => false,
            Err(err) => {
                warn!(
                    connection_id = %self.connection_id,
                    message_id,
                    error = %err,
                    "read receipt rejected"
                );
                true
            }
        }
    }
}

async fn read_loop(mut stream: SplitStream<WebSocket>, reader: Reader) -> CloseReason {
    loop {
        let next = match timeout(reader.idle_timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                info!(connection_id = %reader.connection_id, "connection idle for too long");
                return CloseReason::IdleTimeout;
            }
        };

        let message = match next {
            None => return CloseReason::ClientClosed,
            Some(Err(err)) => {
                let err = DeliveryError::Transport(err.to_string());
                debug!(connection_id = %reader.connection_id, error = %err, "websocket read failed");
                return CloseReason::TransportError;
            }
            Some(Ok(message)) => message,
        };

        let inbound = match message {
            Message::Text(text) => classify(&text),
            Message::Binary(bytes) => classify_binary(&bytes),
            Message::Close(_) => return CloseReason::ClientClosed,
            // pongs answer our heartbeat; receiving one already reset the deadline
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match inbound {
            Ok(Inbound::ReadReceipt { message_id }) => {
                if !reader.acknowledge(message_id).await {
                    return CloseReason::Shutdown;
                }
            }
            Ok(Inbound::Relay(payload)) => {
                if reader
                    .coordinator()
                    .relay(reader.connection_id, payload)
                    .await
                    .is_err()
                {
                    return CloseReason::Shutdown;
                }
            }
            Err(err) => {
                warn!(connection_id = %reader.connection_id, error = %err, "discarding malformed frame");
            }
        }
    }
}
