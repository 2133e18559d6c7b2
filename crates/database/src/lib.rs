//! Chatwire Database Crate
//!
//! Connection management, migrations and the repositories that persist
//! conversations, messages and read receipts.

use chatwire_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::{ping, prepare_database};
pub use entities::{
    timestamp_now, Conversation, ConversationId, Message, MessageId, MessageKind, NewMessage,
    UserId,
};
pub use migrations::run_migrations;
pub use repos::{ChatRepository, MessageRepository};
pub use types::{DatabaseError, DatabaseResult};

pub use sqlx::SqlitePool as Pool;

/// Connect and bring the schema up to date
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::Connection(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::Migration(format!("{e:#}")))?;

    Ok(pool)
}
