use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, MissedTickBehavior};

use crate::api::{round_weight, with_scale};
use crate::AppState;

/// Sample the scale once per interval and fan the reading out to every
/// connected weight stream. Idles while nobody is subscribed.
pub async fn run_weight_sampler(state: Arc<AppState>) {
    let mut ticker = interval(state.config.weight_push_interval);
    // a slow conversion batch delays the next push instead of bursting
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if state.weight_broadcast.receiver_count() == 0 {
            continue;
        }

        let message = match with_scale(&state, |scale| scale.get_weight()).await {
            Ok(reading) => json!({
                "type": "weight",
                "weight": round_weight(reading.value),
                "connected": reading.device_available,
                "timestamp": Utc::now(),
            }),
            Err(err) => json!({
                "type": "error",
                "kind": err.kind(),
                "error": err.to_string(),
            }),
        };

        // every subscriber may have left during the read
        let _ = state.weight_broadcast.send(message.to_string());
    }
}

/// WebSocket endpoint pushing the smoothed weight to display clients
pub async fn weight_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_weight_socket(socket, state))
}

async fn handle_weight_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.weight_broadcast.subscribe();

    tracing::debug!("weight stream client connected");

    // Task forwarding sampled readings to this client
    let send_task = tokio::spawn(async move {
        loop {
            let msg = match rx.recv().await {
                Ok(msg) => msg,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "weight stream client lagging");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Ping(data) => {
                // Pong is handled automatically by axum
                tracing::trace!("Ping received: {:?}", data);
            }
            Message::Close(_) => {
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    tracing::debug!("weight stream client disconnected");
}
