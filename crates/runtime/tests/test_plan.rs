use std::path::Path;

use anyhow::Result;
use chatwire_auth::{Identity, IdentityVerifier};
use chatwire_config::AppConfig;
use chatwire_runtime::BackendServices;
use tempfile::TempDir;

fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.to_string_lossy())
}

fn build_config(database_url: String, max_connections: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = database_url;
    config.database.max_connections = max_connections;
    config.auth.jwt_secret = "runtime-test-secret".into();
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_runs_migrations_and_starts_coordinator() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("runtime/init.db");
    let config = build_config(sqlite_url(&db_path), 4);

    let services = BackendServices::initialise(&config).await?;
    let table: String = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'message_reads'",
    )
    .fetch_one(&services.db_pool)
    .await?;
    assert_eq!("message_reads", table);
    assert!(db_path.exists());

    let stats = services.coordinator().stats().await?;
    assert_eq!(stats.connections, 0);

    services.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_rejects_invalid_configuration() {
    let mut config = build_config("sqlite://:memory:".into(), 1);
    config.realtime.idle_timeout_seconds = config.realtime.ping_interval_seconds;

    let error = match BackendServices::initialise(&config).await {
        Ok(_) => panic!("expected invalid realtime settings to be rejected"),
        Err(error) => error,
    };
    assert!(format!("{error:?}").contains("invalid configuration"));
}

#[tokio::test(flavor = "multi_thread")]
async fn gateway_state_verifies_tokens_from_configured_secret() -> Result<()> {
    let config = build_config("sqlite://:memory:".into(), 1);
    let services = BackendServices::initialise(&config).await?;

    let token = services.authenticator.issue(&Identity::new(5, 2))?;
    let state = services.gateway_state();
    let identity = state.verifier.verify(&token)?;
    assert_eq!(identity.user_id, 5);
    assert_eq!(identity.role_id, 2);

    services.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_the_coordinator() -> Result<()> {
    let config = build_config("sqlite://:memory:".into(), 1);
    let services = BackendServices::initialise(&config).await?;
    let coordinator = services.coordinator().clone();

    services.shutdown().await;

    assert!(!coordinator.is_running());
    assert!(coordinator.stats().await.is_err());
    Ok(())
}
