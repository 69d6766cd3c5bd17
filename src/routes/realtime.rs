use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{sink::SinkExt, stream::StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message as BrokerMessage;

use crate::state::AppState;

/// Proxies a client WebSocket connection through to the internal realtime
/// broker, attaching the caller's user context as query parameters on the
/// upstream connection since the broker itself never sees a client-supplied
/// JWT. Anonymous connections are allowed through — the broker enforces
/// per-channel authorization against whatever `user_id`/`role` it was
/// handed (empty string for anonymous).
pub async fn socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let token = params.get("token").map(|s| s.as_str());
    let user = crate::auth::resolve_ws_token(&state.pool, &state.config, token).await;

    ws.on_upgrade(move |socket| proxy(socket, state, user))
}

async fn proxy(client_socket: WebSocket, state: Arc<AppState>, user: Option<(uuid::Uuid, String)>) {
    let (user_id, role) = user.map(|(id, role)| (id.to_string(), role)).unwrap_or_default();
    let broker_url = format!("{}?user_id={}&role={}", state.config.realtime_ws_url(), user_id, role);

    let broker_stream = match tokio_tungstenite::connect_async(&broker_url).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            let mut client_socket = client_socket;
            let _ = client_socket
                .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                    code: 1011,
                    reason: format!("realtime broker connection failed: {e}").into(),
                })))
                .await;
            return;
        }
    };

    let (mut client_sink, mut client_stream) = client_socket.split();
    let (mut broker_sink, mut broker_stream) = broker_stream.split();

    let client_to_broker = async {
        while let Some(Ok(msg)) = client_stream.next().await {
            let forwarded = match msg {
                Message::Text(text) => BrokerMessage::Text(text),
                Message::Binary(data) => BrokerMessage::Binary(data),
                Message::Ping(data) => BrokerMessage::Ping(data),
                Message::Pong(data) => BrokerMessage::Pong(data),
                Message::Close(_) => break,
            };
            if broker_sink.send(forwarded).await.is_err() {
                break;
            }
        }
    };

    let broker_to_client = async {
        while let Some(Ok(msg)) = broker_stream.next().await {
            let forwarded = match msg {
                BrokerMessage::Text(text) => Message::Text(text),
                BrokerMessage::Binary(data) => Message::Binary(data),
                BrokerMessage::Ping(data) => Message::Ping(data),
                BrokerMessage::Pong(data) => Message::Pong(data),
                BrokerMessage::Close(_) | BrokerMessage::Frame(_) => break,
            };
            if client_sink.send(forwarded).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        _ = client_to_broker => {},
        _ = broker_to_client => {},
    }
}
