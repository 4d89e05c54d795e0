use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use crate::auth::identity;
use crate::engine::session::Session;
use crate::error::AppError;
use crate::models::events::{ClientEvent, ServerEvent};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state, query.token))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, token: Option<String>) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<ServerEvent>(state.session_buffer_size);
    let mut session = Session::new(outbound_tx);

    state.metrics.active_sessions.inc();
    info!(session_id = %session.id(), "websocket client connected");

    if let Some(token) = token {
        let result = identity::authenticate(&state, &token).and_then(|actor| session.authenticate(actor));
        if let Err(err) = result {
            session.report_error(&err);
        }
    }

    let session_id = session.id();
    let mut send_task = tokio::spawn(async move {
        let mut outbound = ReceiverStream::new(outbound_rx);

        while let Some(event) = outbound.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_frame(&state, &mut session, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(session_id = %session_id, error = %err, "websocket receive failed");
                    break;
                }
            },
            _ = &mut send_task => break,
        }
    }

    session.close(&state);
    send_task.abort();
    state.metrics.active_sessions.dec();

    info!(session_id = %session_id, "websocket client disconnected");
}

fn handle_frame(state: &AppState, session: &mut Session, text: &str) {
    let result = serde_json::from_str::<ClientEvent>(text)
        .map_err(|err| AppError::Validation(format!("malformed frame: {err}")))
        .and_then(|event| session.handle(state, event));

    if let Err(err) = result {
        if let AppError::Internal(detail) = &err {
            error!(session_id = %session.id(), error = %detail, "socket request failed");
        }
        session.report_error(&err);
    }
}
