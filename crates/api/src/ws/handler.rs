use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use stride_core::error::CoreError;
use stride_core::types::DbId;

use crate::auth::jwt::authenticate;
use crate::error::AppResult;
use crate::state::AppState;
use crate::ws::registry::ChannelHandle;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /api/v1/notifications/ws?token=<jwt>
///
/// Browsers cannot set headers on a WebSocket handshake, so the access token
/// travels in the query string. The user must exist and be active.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
) -> AppResult<Response> {
    let token = query
        .token
        .ok_or_else(|| CoreError::Unauthorized("Missing token".into()))?;
    let claims = authenticate(&token, &state.config.jwt)?;

    let user_id = state.engine.resolve_actor(claims.sub).await?.user_id;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user_id, state)))
}

/// Run one channel until either side goes away.
///
/// A writer task drains the registry queue into the socket, bounding every
/// write by the configured timeout. The current task reads inbound frames.
/// Whichever finishes first ends the channel.
async fn handle_socket(socket: WebSocket, user_id: DbId, state: AppState) {
    let registry = state.registry.clone();
    let (handle, mut rx) = registry.register(user_id).await;
    tracing::info!(channel = %handle, user_id, "Notification channel connected");

    let greeting = json!({
        "type": "connection_established",
        "user_id": user_id,
        "message": "Connected to notification service",
    });
    let _ = registry
        .try_send(handle, Message::Text(greeting.to_string().into()))
        .await;

    let (mut sink, mut stream) = socket.split();

    let send_timeout = state.config.delivery.send_timeout();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            match tokio::time::timeout(send_timeout, sink.send(msg)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(channel = %handle, error = %e, "Socket write failed");
                    break;
                }
                Err(_) => {
                    tracing::warn!(channel = %handle, "Socket write timed out, dropping channel");
                    break;
                }
            }
            if closing {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let receive = async {
        while let Some(result) = stream.next().await {
            match result {
                Ok(msg) => {
                    registry.touch(handle).await;
                    match msg {
                        Message::Text(text) => {
                            handle_text(&state, user_id, handle, text.as_str()).await
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                Err(e) => {
                    tracing::debug!(channel = %handle, error = %e, "Socket receive error");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = &mut send_task => {}
        () = receive => {}
    }

    registry.unregister(handle).await;
    send_task.abort();
    tracing::info!(channel = %handle, user_id, "Notification channel disconnected");
}

/// Client commands: `ping` and `mark_read:<id>`.
async fn handle_text(state: &AppState, user_id: DbId, handle: ChannelHandle, text: &str) {
    let text = text.trim();
    if text == "ping" {
        let _ = state
            .registry
            .try_send(handle, Message::Text("pong".into()))
            .await;
        return;
    }

    let Some(raw_id) = text.strip_prefix("mark_read:") else {
        tracing::debug!(channel = %handle, "Ignoring unknown client message");
        return;
    };
    let Ok(notification_id) = raw_id.trim().parse::<DbId>() else {
        tracing::debug!(channel = %handle, raw_id, "Malformed mark_read id");
        return;
    };

    match state
        .store
        .mark_notification_read(notification_id, user_id, chrono::Utc::now())
        .await
    {
        Ok(Some(_)) => {
            let reply = json!({ "type": "marked_read", "notification_id": notification_id });
            let _ = state
                .registry
                .try_send(handle, Message::Text(reply.to_string().into()))
                .await;
        }
        Ok(None) => {
            tracing::debug!(notification_id, user_id, "mark_read for a foreign or missing notification");
        }
        Err(e) => {
            tracing::error!(error = %e, notification_id, "Failed to mark notification read");
        }
    }
}
