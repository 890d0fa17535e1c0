//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::outbox::ConnId;
use crate::ws::protocol::ClientMsg;
use crate::ws::router::LoopEvent;

/// WebSocket upgrade handler. Any client may connect; its role is decided
/// by the first message it sends.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn = ConnId::new();
    info!(conn = %conn, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let outbound = state.connections.register(conn);

    run_session(conn, &state, ws_sink, ws_stream, outbound).await;

    // Unregister first; the router may still broadcast while handling the disconnect
    state.connections.unregister(conn);
    let _ = state.events.send(LoopEvent::Disconnected { conn });

    info!(conn = %conn, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    conn: ConnId,
    state: &AppState,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);

    // Writer task: outbound queue -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(text)).await {
                debug!(conn = %conn, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> router
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(conn = %conn, "Rate limited client message");
                    continue;
                }

                match ClientMsg::decode(&text) {
                    Ok(msg) => {
                        if state.events.send(LoopEvent::Inbound { conn, msg }).is_err() {
                            error!(conn = %conn, "Router loop is gone");
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(conn = %conn, error = %e, "Dropping malformed client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                debug!(conn = %conn, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!(conn = %conn, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(conn = %conn, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}
