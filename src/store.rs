//! Remote question-set store client.
//!
//! One batched POST resolves every set id a session references. Calls are
//! instrumented and log id counts and latencies, never payload contents.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::domain::QuestionSet;
use crate::error::StoreError;

#[derive(Clone)]
pub struct RemoteStore {
  client: reqwest::Client,
  pub base_url: String,
  token: Option<String>,
}

#[derive(Serialize)]
struct FetchRequest<'a> {
  ids: &'a [String],
}

#[derive(Deserialize)]
struct FetchResponse {
  questionsets: BTreeMap<String, QuestionSet>,
}

impl RemoteStore {
  /// Construct the client if QSET_STORE_URL is set; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let base_url = std::env::var("QSET_STORE_URL").ok()?;
    let token = std::env::var("QSET_STORE_TOKEN").ok();

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, base_url, token })
  }

  /// Batch-fetch definitions for `ids`. Ids unknown to the store are simply
  /// absent from the returned map; the caller decides whether that is fatal.
  #[instrument(level = "info", skip(self, ids), fields(count = ids.len(), base_url = %self.base_url))]
  pub async fn fetch(&self, ids: &[String]) -> Result<BTreeMap<String, QuestionSet>, StoreError> {
    let url = format!("{}/questionsets/batch", self.base_url.trim_end_matches('/'));
    let start = std::time::Instant::now();

    let mut req = self
      .client
      .post(&url)
      .header(USER_AGENT, "assess-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&FetchRequest { ids });
    if let Some(token) = &self.token {
      req = req.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    let res = req.send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_store_error(&body).unwrap_or(body);
      return Err(StoreError::BadStatus { status, message });
    }

    let body: FetchResponse = res
      .json()
      .await
      .map_err(|e| StoreError::Decode(e.to_string()))?;
    info!(elapsed = ?start.elapsed(), resolved = body.questionsets.len(), "Question-set store batch resolved");
    Ok(body.questionsets)
  }
}

/// Try to extract a clean error message from a store error body.
fn extract_store_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
