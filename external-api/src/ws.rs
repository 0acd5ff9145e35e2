//! Live push channel.
//!
//! On connect the client gets a snapshot (`init` with the last 20 alerts,
//! `init_stats` with the last minute of every metric), then a stream of
//! `{type, payload}` frames for each push. The socket task owns one
//! subscriber receiver; when either side of the connection goes away the
//! subscriber is removed.
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Extension;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, trace};

use std::sync::Arc;

use vigil_core::event::Metric;
use vigil_core::store::EventStore;

pub(crate) async fn alerts_ws(
    ws: WebSocketUpgrade,
    Extension(store): Extension<Arc<EventStore>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, store))
}

async fn handle_socket(socket: WebSocket, store: Arc<EventStore>) {
    let (mut sink, mut stream) = socket.split();

    let init = json!({ "type": "init", "alerts": store.get_alerts(20) });
    if sink.send(Message::Text(init.to_string())).await.is_err() {
        return;
    }

    let mut stats = Vec::new();
    for metric in Metric::ALL {
        stats.extend(store.get_stats(metric, 60.0));
    }
    let init_stats = json!({ "type": "init_stats", "stats": stats });
    if sink.send(Message::Text(init_stats.to_string())).await.is_err() {
        return;
    }

    let (id, mut rx) = store.subscribe();
    debug!(subscriber = id, "websocket client connected");

    loop {
        tokio::select! {
            payload = rx.recv() => {
                match payload {
                    Some(payload) => {
                        if sink.send(Message::Text(payload.to_string())).await.is_err() {
                            break;
                        }
                    }
                    // store dropped us already
                    None => break,
                }
            }
            msg = stream.next() => {
                match msg {
                    // clients only ever send keepalives
                    Some(Ok(msg)) => trace!(subscriber = id, ?msg, "client message"),
                    Some(Err(_)) | None => break,
                }
            }
        }
    }

    store.unsubscribe(id);
    debug!(subscriber = id, "websocket client disconnected");
}
