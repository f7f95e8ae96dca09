//! Public protocol structs shared by the library API and the HTTP/WS
//! endpoints (serde ready). The score path is state-in/state-out: callers
//! send the Session State Record with the request and receive the mutated
//! record back for persistence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::field_name;
use crate::scripts::ScriptEntry;
use crate::session::{SessionState, ValueSlot};

/// Display configuration for one render call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    /// Bypass sequential unlock and force every part visible.
    pub show_all_parts: bool,
    /// Suppress score-derived markers; unlock falls back to attempt counts.
    pub hide_score_markers: bool,
    /// Include correct answers and the student's recorded answer (review).
    pub show_answer: bool,
    /// Hint budget.
    pub show_hints: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_all_parts: false,
            hide_score_markers: false,
            show_answer: false,
            show_hints: 3,
        }
    }
}

/// Per-input-control client parameters, keyed by field id in `ClientParams`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputParams {
    /// Entry-guidance text shown next to the control.
    pub tip: String,
    /// Element id of the control's preview affordance, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, serde_json::Value>,
}

/// Structured client directives accompanying the rendered markup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientParams {
    /// Extracted scripts, in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<ScriptEntry>,
    /// External helper assets to load.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub helps: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, InputParams>,
    /// Per-part correct answers; present only in review mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<BTreeMap<usize, String>>,
    /// The student's recorded answer for the rendered question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_answer: Option<ValueSlot<String>>,
}

/// Result of one render call. `errors` carries non-fatal display and
/// generation errors; markup may be partial and never contains script tags.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderedQuestion {
    pub html: String,
    pub client_params: ClientParams,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl RenderedQuestion {
    /// Placeholder shown when a question has no seed or set reference yet.
    /// Rendering carries on; the session is not aborted.
    pub fn placeholder(qn: usize) -> Self {
        RenderedQuestion {
            html: format!(
                "<p class=\"noticetext\">Question {} is not available.</p>",
                qn + 1
            ),
            client_params: ClientParams::default(),
            errors: vec![format!(
                "question {} has no seed or question set reference in session state",
                qn
            )],
        }
    }
}

/// Raw submitted form fields, keyed by the stable per-part field ids. This
/// replaces any ambient form-data source: callers pass exactly what was
/// posted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Submission {
    fields: BTreeMap<String, String>,
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The posted value for a part's input control, if any.
    pub fn answer_for(&self, qn: usize, multi: bool, part: usize) -> Option<&str> {
        self.field(&field_name(qn, multi, part))
    }
}

impl FromIterator<(String, String)> for Submission {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Which parts a score call records. Computed scores are always returned for
/// every gradable part; this only gates what is written into the record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartsToScore {
    All,
    Selected(BTreeMap<usize, bool>),
}

impl Default for PartsToScore {
    fn default() -> Self {
        PartsToScore::All
    }
}

impl PartsToScore {
    pub fn selects(&self, part: usize) -> bool {
        match self {
            PartsToScore::All => true,
            PartsToScore::Selected(map) => map.get(&part).copied().unwrap_or(false),
        }
    }
}

/// Identity/permission context for score calls, passed through to the score
/// engine. Explicit on purpose: nothing here comes from process-wide state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallerContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Elevated rights, e.g. an instructor regrading server-side.
    #[serde(default)]
    pub instructor: bool,
}

/// Result of one score call. The caller must also persist the mutated
/// Session State Record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    /// Per-part credit (raw score times part weight).
    pub scores: BTreeMap<usize, f64>,
    /// Per-part raw scores as returned by the engine.
    pub raw: BTreeMap<usize, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// True once every defined part has at least one recorded attempt.
    pub all_parts_scored: bool,
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct RenderIn {
    pub state: SessionState,
    pub qn: usize,
    #[serde(default)]
    pub options: RenderOptions,
}

#[derive(Debug, Deserialize)]
pub struct ScoreIn {
    pub state: SessionState,
    pub qn: usize,
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    /// Omitted = record every part.
    #[serde(default)]
    pub parts: Option<BTreeMap<usize, bool>>,
    #[serde(default)]
    pub caller: CallerContext,
}

#[derive(Debug, Serialize)]
pub struct ScoreOut {
    pub state: SessionState,
    #[serde(flatten)]
    pub outcome: ScoreOutcome,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

//
// WebSocket messages
//

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Render {
        state: SessionState,
        qn: usize,
        #[serde(default)]
        options: RenderOptions,
    },
    Score {
        state: SessionState,
        qn: usize,
        #[serde(default)]
        answers: BTreeMap<String, String>,
        #[serde(default)]
        parts: Option<BTreeMap<usize, bool>>,
        #[serde(default)]
        caller: CallerContext,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Question {
        question: RenderedQuestion,
    },
    ScoreResult {
        state: SessionState,
        outcome: ScoreOutcome,
    },
    Error {
        message: String,
    },
}
