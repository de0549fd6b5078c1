//! WebSocket handler for the dashboard stream

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, stream::StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::{actors::messages::DashboardSnapshot, api::state::ApiState};

/// WebSocket upgrade handler
///
/// GET /dashws
pub async fn dashboard_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    let Some(dashboard_tx) = state.dashboard_tx else {
        return axum::http::StatusCode::NOT_FOUND.into_response();
    };

    let snapshots = dashboard_tx.subscribe();
    ws.on_upgrade(|socket| handle_websocket(socket, snapshots))
}

/// Forward every dashboard snapshot as a JSON text frame until either side goes away
async fn handle_websocket(socket: WebSocket, mut snapshots: broadcast::Receiver<DashboardSnapshot>) {
    info!("dashboard client connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        loop {
            match snapshots.recv().await {
                Ok(snapshot) => {
                    let Ok(text) = serde_json::to_string(&snapshot) else {
                        continue;
                    };

                    if sender.send(Message::Text(text)).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }

                Err(RecvError::Lagged(skipped)) => {
                    warn!("dashboard client lagging, skipped {skipped} snapshot(s)");
                }

                Err(RecvError::Closed) => {
                    debug!("dashboard channel closed");
                    break;
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("dashboard client disconnected");
}
