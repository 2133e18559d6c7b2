mod common;

use axum::http::{Method, StatusCode};
use chatwire_auth::Identity;
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/api/messages/1", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "401");

    let (status, _) = app
        .request(Method::GET, "/api/messages/1", None, Some("not-a-token"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let app = TestApp::new().await;
    let now = chrono::Utc::now().timestamp();
    let token = app
        .auth
        .issue_with_expiry(&Identity::new(1, 1), now - 7_200, now - 3_600)
        .unwrap();

    let (status, _) = app.request(Method::GET, "/api/messages/1", None, Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_message_returns_envelope_marked_as_mine() {
    let app = TestApp::new().await;
    let chat_id = app.create_chat(&[1, 2]).await;
    let token = app.token(1);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({"conversation_id": chat_id, "content": "hello"})),
            Some(&token),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["conversation_id"], chat_id);
    assert_eq!(body["sender_id"], 1);
    assert_eq!(body["kind"], "text");
    assert_eq!(body["content"], "hello");
    assert_eq!(body["read_by"], json!([]));
    assert_eq!(body["is_mine"], true);
    assert!(body["id"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn create_message_validates_input() {
    let app = TestApp::new().await;
    let chat_id = app.create_chat(&[1]).await;
    let token = app.token(1);

    let cases = [
        json!({"conversation_id": chat_id, "kind": "sticker", "content": "x"}),
        json!({"conversation_id": chat_id, "kind": "text", "content": "   "}),
        json!({"conversation_id": chat_id, "kind": "image"}),
    ];

    for payload in cases {
        let (status, _) = app
            .request(Method::POST, "/api/messages", Some(payload.clone()), Some(&token))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload} should be rejected");
    }

    let (status, body) = app
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({"conversation_id": chat_id, "kind": "image", "attachment_url": "/uploads/a.png"})),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["kind"], "image");
    assert_eq!(body["attachment_url"], "/uploads/a.png");
}

#[tokio::test]
async fn non_participants_are_forbidden() {
    let app = TestApp::new().await;
    let chat_id = app.create_chat(&[1, 2]).await;
    let outsider = app.token(3);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({"conversation_id": chat_id, "content": "let me in"})),
            Some(&outsider),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::GET, &format!("/api/messages/chat/{chat_id}"), None, Some(&outsider))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn history_is_ordered_and_relative_to_caller() {
    let app = TestApp::new().await;
    let chat_id = app.create_chat(&[1, 2]).await;
    let alice = app.token(1);
    let bob = app.token(2);

    for (token, content) in [(&alice, "first"), (&bob, "second"), (&alice, "third")] {
        let (status, _) = app
            .request(
                Method::POST,
                "/api/messages",
                Some(json!({"conversation_id": chat_id, "content": content})),
                Some(token),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app
        .request(Method::GET, &format!("/api/messages/chat/{chat_id}"), None, Some(&bob))
        .await;
    assert_eq!(status, StatusCode::OK);

    let messages = body.as_array().unwrap();
    let contents: Vec<_> = messages.iter().map(|m| m["content"].as_str().unwrap()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
    let mine: Vec<_> = messages.iter().map(|m| m["is_mine"].as_bool().unwrap()).collect();
    assert_eq!(mine, vec![false, true, false]);

    let (_, page) = app
        .request(
            Method::GET,
            &format!("/api/messages/chat/{chat_id}?limit=1&offset=1"),
            None,
            Some(&bob),
        )
        .await;
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["content"], "second");
}

#[tokio::test]
async fn get_message_checks_existence_and_membership() {
    let app = TestApp::new().await;
    let chat_id = app.create_chat(&[1, 2]).await;
    let token = app.token(1);

    let (_, created) = app
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({"conversation_id": chat_id, "content": "hi"})),
            Some(&token),
        )
        .await;
    let id = created["id"].as_i64().unwrap();

    let (status, body) = app
        .request(Method::GET, &format!("/api/messages/{id}"), None, Some(&app.token(2)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_mine"], false);

    let (status, _) = app
        .request(Method::GET, &format!("/api/messages/{id}"), None, Some(&app.token(9)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::GET, "/api/messages/999", None, Some(&token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mark_read_is_idempotent() {
    let app = TestApp::new().await;
    let chat_id = app.create_chat(&[1, 2]).await;

    let (_, created) = app
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({"conversation_id": chat_id, "content": "read me"})),
            Some(&app.token(1)),
        )
        .await;
    let id = created["id"].as_i64().unwrap();
    let reader = app.token(2);
    let uri = format!("/api/messages/read?message_id={id}");

    let (status, body) = app.request(Method::POST, &uri, None, Some(&reader)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"message_id": id, "user_id": 2, "conversation_id": chat_id, "newly_read": true})
    );

    let (status, body) = app.request(Method::POST, &uri, None, Some(&reader)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newly_read"], false);

    let (_, message) = app
        .request(Method::GET, &format!("/api/messages/{id}"), None, Some(&reader))
        .await;
    assert_eq!(message["read_by"], json!([2]));
}

#[tokio::test]
async fn mark_read_validates_query() {
    let app = TestApp::new().await;
    let token = app.token(1);

    for uri in ["/api/messages/read", "/api/messages/read?message_id=0"] {
        let (status, _) = app.request(Method::POST, uri, None, Some(&token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }

    let (status, _) = app
        .request(Method::POST, "/api/messages/read?message_id=77", None, Some(&token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_coordinator_stats() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
    assert_eq!(body["coordinator"]["connections"], 0);
}

#[tokio::test]
async fn health_degrades_when_coordinator_stops() {
    let app = TestApp::new().await;
    app.state.coordinator().shutdown().await.unwrap();

    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert!(body["coordinator"].is_null());
}

#[tokio::test]
async fn openapi_document_lists_rest_routes() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let paths = body["paths"].as_object().unwrap();
    for path in [
        "/api/messages",
        "/api/messages/chat/{chat_id}",
        "/api/messages/{message_id}",
        "/api/messages/read",
        "/api/chats",
        "/api/chats/{chat_id}",
        "/api/chats/{chat_id}/users",
        "/health",
    ] {
        assert!(paths.contains_key(path), "missing {path}");
    }
}

#[tokio::test]
async fn create_chat_always_includes_the_caller() {
    let app = TestApp::new().await;
    let token = app.token(4);

    let (status, body) = app
        .request(Method::POST, "/api/chats", Some(json!({"participants": [9, 2, 9]})), Some(&token))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["participants"], json!([2, 4, 9]));
    let chat_id = body["id"].as_i64().unwrap();

    // the new conversation is immediately usable for messaging
    let (status, _) = app
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({"conversation_id": chat_id, "content": "welcome"})),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.request(Method::POST, "/api/chats", Some(json!({})), Some(&token)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["participants"], json!([4]));

    let (status, _) = app
        .request(Method::POST, "/api/chats", Some(json!({"participants": [0]})), Some(&token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.request(Method::POST, "/api/chats", Some(json!({})), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn list_chats_returns_only_the_callers_conversations() {
    let app = TestApp::new().await;
    let first = app.create_chat(&[1, 2]).await;
    let second = app.create_chat(&[1, 3]).await;
    app.create_chat(&[2, 3]).await;

    let (status, body) = app.request(Method::GET, "/api/chats", None, Some(&app.token(1))).await;
    assert_eq!(status, StatusCode::OK);

    let mut ids: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|chat| chat["id"].as_i64().unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![first, second]);

    let (_, body) = app.request(Method::GET, "/api/chats", None, Some(&app.token(8))).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn get_chat_and_participants_check_membership() {
    let app = TestApp::new().await;
    let chat_id = app.create_chat(&[1, 2]).await;

    let (status, body) = app
        .request(Method::GET, &format!("/api/chats/{chat_id}"), None, Some(&app.token(2)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], chat_id);
    assert_eq!(body["participants"], json!([1, 2]));

    let (status, body) = app
        .request(Method::GET, &format!("/api/chats/{chat_id}/users"), None, Some(&app.token(1)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([1, 2]));

    for uri in [format!("/api/chats/{chat_id}"), format!("/api/chats/{chat_id}/users")] {
        let (status, _) = app.request(Method::GET, &uri, None, Some(&app.token(5))).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
    }

    let (status, _) = app.request(Method::GET, "/api/chats/999", None, Some(&app.token(1))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn participants_can_invite_other_users() {
    let app = TestApp::new().await;
    let chat_id = app.create_chat(&[1]).await;
    let uri = format!("/api/chats/{chat_id}/users");

    let (status, body) = app
        .request(Method::POST, &uri, Some(json!({"user_id": 6})), Some(&app.token(1)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"chat_id": chat_id, "user_id": 6, "added": true}));

    let (_, body) = app
        .request(Method::POST, &uri, Some(json!({"user_id": 6})), Some(&app.token(6)))
        .await;
    assert_eq!(body["added"], false);

    let (status, _) = app
        .request(Method::POST, &uri, Some(json!({"user_id": 7})), Some(&app.token(7)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::POST, &uri, Some(json!({"user_id": -1})), Some(&app.token(1)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.request(Method::GET, &uri, None, Some(&app.token(6))).await;
    assert_eq!(body, json!([1, 6]));
}
