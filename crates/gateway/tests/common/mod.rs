#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method, Request, StatusCode,
    },
    Router,
};
use chatwire_auth::{Identity, JwtAuthenticator};
use chatwire_config::{DatabaseConfig, RealtimeConfig};
use chatwire_database::{initialize_database, ChatRepository, Pool};
use chatwire_delivery::{Coordinator, DeliveryService, SqliteMessageStore};
use chatwire_gateway::{create_router, GatewayState};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "gateway-test-secret-that-is-long-enough";

pub struct TestApp {
    pub router: Router,
    pub state: GatewayState,
    pub pool: Pool,
    pub auth: JwtAuthenticator,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_realtime(RealtimeConfig::default()).await
    }

    pub async fn with_realtime(realtime: RealtimeConfig) -> Self {
        let db_dir = TempDir::new().expect("create temp dir");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_dir.path().join("gateway-test.db").display()),
            max_connections: 5,
        };
        let pool = initialize_database(&config).await.expect("initialise database");

        let auth = JwtAuthenticator::new(TEST_SECRET, chrono::Duration::hours(1));
        let (coordinator, _task) = Coordinator::spawn(&realtime);
        let delivery = DeliveryService::new(Arc::new(SqliteMessageStore::new(pool.clone())), coordinator);

        let state = GatewayState::new(pool.clone(), Arc::new(auth.clone()), delivery, realtime);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            pool,
            auth,
            _db_dir: db_dir,
        }
    }

    pub fn token(&self, user_id: i64) -> String {
        self.auth
            .issue(&Identity::new(user_id, 1))
            .expect("issue test token")
    }

    pub async fn create_chat(&self, participants: &[i64]) -> i64 {
        ChatRepository::new(self.pool.clone())
            .create(participants)
            .await
            .expect("create chat")
            .id
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let body = if let Some(json_body) = body {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json_body).expect("serialize request body"))
        } else {
            Body::empty()
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router response");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, value)
    }

    /// Serve the router on an ephemeral port.
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let router = self.router.clone();

        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve test router");
        });

        addr
    }

    /// Wait until the coordinator has `expected` connections bound to a conversation.
    pub async fn wait_for_members(&self, conversation_id: i64, expected: usize) {
        let coordinator = self.state.coordinator().clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            loop {
                let members = coordinator.members(conversation_id).await.expect("coordinator running");
                if members.len() == expected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("conversation {conversation_id} never reached {expected} connections"));
    }
}
