//! Real-time delivery core.
//!
//! A single [`Coordinator`] task owns every live connection and decides who
//! receives what. Connections are bound to one conversation; chat messages,
//! read receipts and relayed payloads only ever reach connections bound to
//! the conversation they belong to.
//!
//! The transport side (sockets, heartbeats) lives in the gateway; this crate
//! only sees [`ConnectionHandle`]s and their bounded outbound queues.

pub mod classifier;
pub mod connection;
pub mod coordinator;
pub mod delivery;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod store;

pub use classifier::{classify, classify_binary, Inbound};
pub use connection::{CloseReason, ConnectionHandle, ConnectionId, ConnectionState, OutboundFrame};
pub use coordinator::{Coordinator, CoordinatorHandle, CoordinatorStats, DeliveryEvent};
pub use delivery::DeliveryService;
pub use envelope::{MessageEnvelope, ReadReceipt};
pub use error::{DeliveryError, DeliveryResult};
pub use store::{MessageStore, SqliteMessageStore};
