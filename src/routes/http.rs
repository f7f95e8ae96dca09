//! HTTP endpoint handlers. Thin wrappers that resolve question sets and
//! forward to the core logic; session state travels in the request and
//! response bodies, never on the server.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{info, instrument};

use crate::error::AssessError;
use crate::logic::{render_question, score_question};
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

fn error_status(e: &AssessError) -> StatusCode {
  match e {
    AssessError::MissingQuestionState { .. } => StatusCode::BAD_REQUEST,
    AssessError::UnknownQuestionSet { .. } => StatusCode::NOT_FOUND,
    AssessError::Store(_) => StatusCode::BAD_GATEWAY,
  }
}

#[instrument(level = "info", skip(state, body), fields(qn = body.qn))]
pub async fn http_post_render(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RenderIn>,
) -> Result<Json<RenderedQuestion>, (StatusCode, String)> {
  let qdata = state
    .question_sets_for(&body.state)
    .await
    .map_err(|e| (error_status(&e), e.to_string()))?;
  let rendered = render_question(
    &qdata,
    state.generator.as_ref(),
    &body.state,
    body.qn,
    &body.options,
    &state.file_base_url,
  )
  .map_err(|e| (error_status(&e), e.to_string()))?;
  info!(target: "question", qn = body.qn, errors = rendered.errors.len(), "HTTP render served");
  Ok(Json(rendered))
}

#[instrument(level = "info", skip(state, body), fields(qn = body.qn, answer_fields = body.answers.len()))]
pub async fn http_post_score(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ScoreIn>,
) -> Result<Json<ScoreOut>, (StatusCode, String)> {
  let ScoreIn { state: mut session, qn, answers, parts, caller } = body;
  let qdata = state
    .question_sets_for(&session)
    .await
    .map_err(|e| (error_status(&e), e.to_string()))?;
  let submission: Submission = answers.into_iter().collect();
  let parts_to_score = match parts {
    Some(map) => PartsToScore::Selected(map),
    None => PartsToScore::All,
  };
  let outcome = score_question(
    &qdata,
    state.scorer.as_ref(),
    &mut session,
    qn,
    &submission,
    &parts_to_score,
    &caller,
  )
  .map_err(|e| (error_status(&e), e.to_string()))?;
  info!(target: "question", qn, all_parts_scored = outcome.all_parts_scored, "HTTP submission scored");
  Ok(Json(ScoreOut { state: session, outcome }))
}
