//! WebSocket upgrade + message loop. Each client message is parsed as JSON
//! and forwarded to core logic. We reply with a single JSON message per
//! request; no session state lives on the socket.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::logic::{render_question, score_question};
use crate::protocol::{ClientWsMessage, PartsToScore, ServerWsMessage, Submission};
use crate::state::AppState;
use crate::util::trunc_for_log;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "assess_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "assess_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "assess_backend", "WS received: {}", trunc_for_log(&txt, 200));
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "assess_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => {
        let _ = socket.send(Message::Pong(payload)).await;
      }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "assess_backend", "WebSocket disconnected");
}

#[instrument(level = "info", skip_all)]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Render { state: session, qn, options } => {
      let qdata = match state.question_sets_for(&session).await {
        Ok(qdata) => qdata,
        Err(e) => return ServerWsMessage::Error { message: e.to_string() },
      };
      match render_question(
        &qdata,
        state.generator.as_ref(),
        &session,
        qn,
        &options,
        &state.file_base_url,
      ) {
        Ok(question) => {
          tracing::info!(target: "question", qn, errors = question.errors.len(), "WS render served");
          ServerWsMessage::Question { question }
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::Score { state: mut session, qn, answers, parts, caller } => {
      let qdata = match state.question_sets_for(&session).await {
        Ok(qdata) => qdata,
        Err(e) => return ServerWsMessage::Error { message: e.to_string() },
      };
      let submission: Submission = answers.into_iter().collect();
      let parts_to_score = match parts {
        Some(map) => PartsToScore::Selected(map),
        None => PartsToScore::All,
      };
      match score_question(
        &qdata,
        state.scorer.as_ref(),
        &mut session,
        qn,
        &submission,
        &parts_to_score,
        &caller,
      ) {
        Ok(outcome) => {
          tracing::info!(target: "question", qn, all_parts_scored = outcome.all_parts_scored, "WS submission scored");
          ServerWsMessage::ScoreResult { state: session, outcome }
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }
  }
}
