//! WebSocket upgrade + message loop. Each connection owns one form-fill
//! session: field-change events stream through the Progression Engine and
//! the reply carries the regenerated configuration when one was produced.

use axum::{
  extract::{
    ws::{Message, WebSocket},
    Query, State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{error, info, instrument};

use crate::progression::{completion_percentage, section_completion, submission_readiness, SharedSession};
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[derive(Debug, serde::Deserialize)]
pub struct WsQuery {
  #[serde(default, rename = "userId")]
  pub user_id: Option<String>,
}

#[instrument(level = "info", skip(state, ws))]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  Query(q): Query<WsQuery>,
  State(state): State<AppState>,
) -> impl IntoResponse {
  info!(target: "formforge_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state, q.user_id))
}

#[instrument(level = "info", skip(socket, state, user_id))]
async fn handle_ws(mut socket: WebSocket, state: AppState, user_id: Option<String>) {
  let (session_id, session) = state.open_session(user_id).await;
  info!(target: "formforge_backend", %session_id, "WebSocket connected");

  // The client gets its configuration up front.
  let opened = {
    let guard = session.read().await;
    ServerWsMessage::SessionOpened {
      session_id: session_id.clone(),
      config: guard.config.clone(),
      phase: guard.phase,
    }
  };
  if send(&mut socket, &opened).await.is_err() {
    state.close_session(&session_id).await;
    return;
  }

  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => handle_client_ws(incoming, &state, &session).await,
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };
        if send(&mut socket, &reply).await.is_err() {
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }

  state.close_session(&session_id).await;
  info!(target: "formforge_backend", %session_id, "WebSocket disconnected");
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), ()> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await.map_err(|e| {
    error!(target: "formforge_backend", error = %e, "WS send error");
  })
}

#[instrument(level = "info", skip(state, session))]
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  session: &SharedSession,
) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::FieldChange { field_id, value } => {
      let outcome = state.engine.on_field_change(session, &field_id, value).await;
      tracing::info!(
        target: "progression",
        %field_id,
        config_updated = outcome.config_updated,
        phase = ?outcome.phase,
        "WS field_change handled"
      );
      ServerWsMessage::FieldChangeResult { outcome }
    }

    ClientWsMessage::Completion => {
      let guard = session.read().await;
      ServerWsMessage::Completion {
        completion_percentage: completion_percentage(&guard.form_data, &guard.config),
      }
    }

    ClientWsMessage::SectionCompletion { section_id } => {
      let guard = session.read().await;
      let completion = section_completion(&guard.form_data, &guard.config, &section_id);
      ServerWsMessage::SectionCompletion { section_id, completion }
    }

    ClientWsMessage::Readiness => {
      let guard = session.read().await;
      ServerWsMessage::Readiness {
        readiness: submission_readiness(&guard.form_data, &guard.config),
      }
    }
  }
}
