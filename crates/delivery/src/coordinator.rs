//! The coordinator: a single task that owns the registry and makes every
//! fan-out decision.
//!
//! Everything else talks to it through [`CoordinatorHandle`], which only
//! enqueues requests. The coordinator never awaits a connection: frames are
//! pushed with `try_send`, and a connection whose queue is full or closed is
//! evicted on the spot.

use std::sync::Arc;

use chatwire_config::RealtimeConfig;
use chatwire_database::{ConversationId, Message};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::connection::{CloseReason, ConnectionHandle, ConnectionId, OutboundFrame};
use crate::envelope::{MessageEnvelope, ReadReceipt};
use crate::error::{DeliveryError, DeliveryResult};
use crate::registry::Registry;

/// An event to fan out to a conversation.
#[derive(Debug, Clone)]
pub enum DeliveryEvent {
    /// A persisted message. Every connection of the conversation receives it,
    /// including the sender's own connections (with `is_mine: true`).
    ChatMessage(Message),
    /// A persisted read receipt. `origin` is the connection that acknowledged
    /// it, if any; it does not get its own receipt echoed back.
    ReadReceipt {
        receipt: ReadReceipt,
        origin: Option<ConnectionId>,
    },
}

impl DeliveryEvent {
    pub fn conversation_id(&self) -> ConversationId {
        match self {
            DeliveryEvent::ChatMessage(message) => message.conversation_id,
            DeliveryEvent::ReadReceipt { receipt, .. } => receipt.conversation_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CoordinatorStats {
    pub connections: usize,
    pub conversations: usize,
    pub frames_delivered: u64,
    pub connections_evicted: u64,
}

enum Command {
    Register {
        connection: ConnectionHandle,
        ack: oneshot::Sender<()>,
    },
    Unregister {
        id: ConnectionId,
        reason: CloseReason,
    },
    Deliver(DeliveryEvent),
    Relay {
        from: ConnectionId,
        payload: OutboundFrame,
    },
    Members {
        conversation_id: ConversationId,
        reply: oneshot::Sender<Vec<ConnectionId>>,
    },
    Stats {
        reply: oneshot::Sender<CoordinatorStats>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Cheap, cloneable front door to the coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    inbox: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    async fn send(&self, command: Command) -> DeliveryResult<()> {
        self.inbox
            .send(command)
            .await
            .map_err(|_| DeliveryError::CoordinatorUnavailable)
    }

    /// Register a connection. Resolves once the coordinator has added it, so
    /// any event submitted afterwards will reach it.
    pub async fn register(&self, connection: ConnectionHandle) -> DeliveryResult<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Register { connection, ack }).await?;
        done.await.map_err(|_| DeliveryError::CoordinatorUnavailable)
    }

    /// Remove a connection and close its outbound queue. Safe to call more
    /// than once for the same id.
    pub async fn unregister(&self, id: ConnectionId, reason: CloseReason) -> DeliveryResult<()> {
        self.send(Command::Unregister { id, reason }).await
    }

    /// Hand an already persisted event to the coordinator for fan-out.
    pub async fn submit_for_delivery(&self, event: DeliveryEvent) -> DeliveryResult<()> {
        self.send(Command::Deliver(event)).await
    }

    /// Forward an opaque payload from `from` to the other connections of its
    /// conversation.
    pub async fn relay(&self, from: ConnectionId, payload: impl Into<OutboundFrame>) -> DeliveryResult<()> {
        self.send(Command::Relay {
            from,
            payload: payload.into(),
        })
        .await
    }

    /// Connections currently bound to a conversation.
    pub async fn members(&self, conversation_id: ConversationId) -> DeliveryResult<Vec<ConnectionId>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Members {
            conversation_id,
            reply,
        })
        .await?;
        response.await.map_err(|_| DeliveryError::CoordinatorUnavailable)
    }

    pub async fn stats(&self) -> DeliveryResult<CoordinatorStats> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Stats { reply }).await?;
        response.await.map_err(|_| DeliveryError::CoordinatorUnavailable)
    }

    /// Close every connection and stop the coordinator task.
    pub async fn shutdown(&self) -> DeliveryResult<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Shutdown { ack }).await?;
        done.await.map_err(|_| DeliveryError::CoordinatorUnavailable)
    }

    pub fn is_running(&self) -> bool {
        !self.inbox.is_closed()
    }
}

pub struct Coordinator {
    registry: Registry,
    inbox: mpsc::Receiver<Command>,
    stats: CoordinatorStats,
}

impl Coordinator {
    /// Start the coordinator task.
    pub fn spawn(config: &RealtimeConfig) -> (CoordinatorHandle, JoinHandle<()>) {
        let (sender, inbox) = mpsc::channel(config.coordinator_inbox_capacity.max(1));
        let coordinator = Coordinator {
            registry: Registry::new(),
            inbox,
            stats: CoordinatorStats::default(),
        };

        let task = tokio::spawn(coordinator.run());
        (CoordinatorHandle { inbox: sender }, task)
    }

    async fn run(mut self) {
        info!("coordinator started");

        while let Some(command) = self.inbox.recv().await {
            match command {
                Command::Register { connection, ack } => {
                    self.register(connection);
                    let _ = ack.send(());
                }
                Command::Unregister { id, reason } => {
                    self.unregister(id, reason);
                }
                Command::Deliver(event) => self.deliver(event),
                Command::Relay { from, payload } => self.relay(from, payload),
                Command::Members {
                    conversation_id,
                    reply,
                } => {
                    let _ = reply.send(self.registry.member_ids(conversation_id));
                }
                Command::Stats { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                Command::Shutdown { ack } => {
                    self.close_all(CloseReason::Shutdown);
                    self.inbox.close();
                    let _ = ack.send(());
                    break;
                }
            }
        }

        self.close_all(CloseReason::Shutdown);
        info!(
            frames_delivered = self.stats.frames_delivered,
            connections_evicted = self.stats.connections_evicted,
            "coordinator stopped"
        );
    }

    fn snapshot(&self) -> CoordinatorStats {
        CoordinatorStats {
            connections: self.registry.len(),
            conversations: self.registry.conversation_count(),
            ..self.stats
        }
    }

    fn register(&mut self, connection: ConnectionHandle) {
        info!(
            connection_id = %connection.id,
            user_id = connection.user_id(),
            conversation_id = connection.conversation_id,
            "connection registered"
        );

        if let Some(previous) = self.registry.insert(connection) {
            warn!(connection_id = %previous.id, "connection id registered twice; replaced");
        }
    }

    fn unregister(&mut self, id: ConnectionId, reason: CloseReason) -> bool {
        match self.registry.remove(id) {
            Some(connection) => {
                info!(
                    connection_id = %id,
                    user_id = connection.user_id(),
                    conversation_id = connection.conversation_id,
                    reason = %reason,
                    connected_ms = connection.connected_for().as_millis() as u64,
                    "connection unregistered"
                );
                connection.close(reason);
                true
            }
            None => {
                debug!(connection_id = %id, reason = %reason, "connection already unregistered");
                false
            }
        }
    }

    fn close_all(&mut self, reason: CloseReason) {
        let drained = self.registry.drain();
        if !drained.is_empty() {
            info!(connections = drained.len(), reason = %reason, "closing all connections");
        }
        for connection in drained {
            connection.close(reason);
        }
    }

    fn deliver(&mut self, event: DeliveryEvent) {
        let conversation_id = event.conversation_id();
        if self.registry.members(conversation_id).next().is_none() {
            debug!(conversation_id, "no live connections; nothing to deliver");
            return;
        }

        match event {
            DeliveryEvent::ChatMessage(message) => self.deliver_message(&message),
            DeliveryEvent::ReadReceipt { receipt, origin } => self.deliver_receipt(&receipt, origin),
        }
    }

    fn deliver_message(&mut self, message: &Message) {
        let (Some(mine), Some(theirs)) = (
            render(&MessageEnvelope::new(message, true)),
            render(&MessageEnvelope::new(message, false)),
        ) else {
            return;
        };

        let delivered = self.fan_out(message.conversation_id, None, |connection| {
            if connection.user_id() == message.sender_id {
                mine.clone()
            } else {
                theirs.clone()
            }
        });

        debug!(
            message_id = message.id,
            conversation_id = message.conversation_id,
            delivered,
            "message delivered"
        );
    }

    fn deliver_receipt(&mut self, receipt: &ReadReceipt, origin: Option<ConnectionId>) {
        let Some(frame) = render(receipt) else {
            return;
        };

        let delivered = self.fan_out(receipt.conversation_id, origin, |_| frame.clone());

        debug!(
            message_id = receipt.message_id,
            user_id = receipt.user_id,
            conversation_id = receipt.conversation_id,
            delivered,
            "read receipt delivered"
        );
    }

    fn relay(&mut self, from: ConnectionId, payload: OutboundFrame) {
        let Some(conversation_id) = self.registry.get(from).map(|c| c.conversation_id) else {
            debug!(connection_id = %from, "relay from unregistered connection dropped");
            return;
        };

        let delivered = self.fan_out(conversation_id, Some(from), |_| payload.clone());
        debug!(connection_id = %from, conversation_id, delivered, "payload relayed");
    }

    /// Push a frame to every connection of `conversation_id` except `skip`.
    ///
    /// Returns how many connections accepted the frame. Connections that
    /// could not take it are evicted after the pass.
    fn fan_out<F>(&mut self, conversation_id: ConversationId, skip: Option<ConnectionId>, mut frame_for: F) -> usize
    where
        F: FnMut(&ConnectionHandle) -> OutboundFrame,
    {
        let mut delivered = 0;
        let mut evicted = Vec::new();

        for connection in self.registry.members(conversation_id) {
            if Some(connection.id) == skip {
                continue;
            }

            match connection.try_send(frame_for(connection)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        connection_id = %connection.id,
                        user_id = connection.user_id(),
                        conversation_id,
                        error = %DeliveryError::SlowConsumer(connection.id),
                        "evicting slow consumer"
                    );
                    evicted.push((connection.id, CloseReason::SlowConsumer));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    evicted.push((connection.id, CloseReason::WriterGone));
                }
            }
        }

        self.stats.frames_delivered += delivered as u64;
        for (id, reason) in evicted {
            if self.unregister(id, reason) {
                self.stats.connections_evicted += 1;
            }
        }

        delivered
    }
}

fn render<T: Serialize>(value: &T) -> Option<OutboundFrame> {
    match serde_json::to_string(value) {
        Ok(text) => Some(Arc::from(text)),
        Err(err) => {
            error!(error = %err, "failed to serialize outbound frame");
            None
        }
    }
}
