//! Live push channel over a real socket.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use common::{expect_data, TestApp, ALICE, LEAD};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(app: &TestApp) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.app.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn connect(app: &TestApp, addr: SocketAddr, user: i64) -> Client {
    let url = format!("ws://{addr}/api/v1/notifications/ws?token={}", app.token(user));
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

/// Next text frame, skipping control frames.
async fn next_text(socket: &mut Client) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return text.to_string();
        }
    }
}

async fn next_json(socket: &mut Client) -> Value {
    serde_json::from_str(&next_text(socket).await).unwrap()
}

#[tokio::test]
async fn greeting_and_ping() {
    let app = TestApp::new().await;
    let addr = serve(&app).await;
    let mut socket = connect(&app, addr, ALICE).await;

    let greeting = next_json(&mut socket).await;
    assert_eq!(greeting["type"], "connection_established");
    assert_eq!(greeting["user_id"], ALICE);

    socket.send(Message::Text("ping".into())).await.unwrap();
    assert_eq!(next_text(&mut socket).await, "pong");

    assert_eq!(app.state.registry.connection_count().await, 1);
}

#[tokio::test]
async fn committed_notification_is_pushed_and_can_be_marked_read() {
    let app = TestApp::new().await;
    let addr = serve(&app).await;
    let mut lead = connect(&app, addr, LEAD).await;
    next_json(&mut lead).await;

    let body = json!({
        "title": "Write the launch plan",
        "kind": "INDIVIDUAL",
        "assignee_ids": [ALICE],
        "due_date": (chrono::Utc::now() + chrono::Duration::days(3)).to_rfc3339(),
    });
    expect_data(app.post("/api/v1/initiatives", ALICE, body).await, StatusCode::CREATED).await;

    let pushed = next_json(&mut lead).await;
    assert_eq!(pushed["type"], "new_notification");
    assert_eq!(pushed["notification"]["type"], "initiative_submitted_for_approval");
    assert_eq!(pushed["notification"]["recipient_id"], LEAD);
    let id = pushed["notification"]["id"].as_i64().unwrap();

    lead.send(Message::Text(format!("mark_read:{id}"))).await.unwrap();
    let ack = next_json(&mut lead).await;
    assert_eq!(ack["type"], "marked_read");
    assert_eq!(ack["notification_id"], id);

    let count = expect_data(app.get("/api/v1/notifications/unread-count", LEAD).await, StatusCode::OK).await;
    assert_eq!(count["count"], 0);
}

#[tokio::test]
async fn every_channel_of_the_recipient_receives_the_push() {
    let app = TestApp::new().await;
    let addr = serve(&app).await;
    let mut first = connect(&app, addr, LEAD).await;
    let mut second = connect(&app, addr, LEAD).await;
    next_json(&mut first).await;
    next_json(&mut second).await;
    assert_eq!(app.state.registry.user_count().await, 1);

    let body = json!({
        "title": "Review budget",
        "kind": "INDIVIDUAL",
        "assignee_ids": [ALICE],
        "due_date": (chrono::Utc::now() + chrono::Duration::days(3)).to_rfc3339(),
    });
    expect_data(app.post("/api/v1/initiatives", ALICE, body).await, StatusCode::CREATED).await;

    assert_eq!(next_json(&mut first).await["type"], "new_notification");
    assert_eq!(next_json(&mut second).await["type"], "new_notification");
}

#[tokio::test]
async fn handshake_without_valid_token_is_refused() {
    let app = TestApp::new().await;
    let addr = serve(&app).await;

    assert!(connect_async(format!("ws://{addr}/api/v1/notifications/ws")).await.is_err());
    assert!(connect_async(format!("ws://{addr}/api/v1/notifications/ws?token=garbage"))
        .await
        .is_err());
    assert_eq!(app.state.registry.connection_count().await, 0);
}
