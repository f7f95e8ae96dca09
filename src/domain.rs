//! Domain models: question-set definitions, answer kinds, and the fixed
//! scoring thresholds shared by the render and score pipelines.

use serde::{Deserialize, Serialize};

/// Raw scores strictly above this display and record as "correct".
pub const CORRECT_THRESHOLD: f64 = 0.98;
/// Raw scores strictly above this count as "non-zero" credit.
pub const NONZERO_THRESHOLD: f64 = 0.0;

/// How a part captures its answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
  Number,
  Text,
  Choice,
  FileUpload,
}

impl Default for AnswerType {
  fn default() -> Self { AnswerType::Number }
}

/// One randomized variable: an integer drawn uniformly from [min, max].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VarDef {
  pub name: String,
  pub min: i64,
  pub max: i64,
}

/// A gradable part of a question.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartDef {
  /// Prompt markup shown above the input control (templated).
  #[serde(default)] pub text: String,
  #[serde(default)] pub answer_type: AnswerType,
  /// Answer-key template. Number parts: an arithmetic expression over the
  /// variables. Choice parts: an expression evaluating to the correct option
  /// index. Text/file parts: the literal expected or model answer.
  #[serde(default)] pub answer: String,
  /// Options for choice parts (templated).
  #[serde(default)] pub choices: Vec<String>,
  #[serde(default = "default_weight")] pub weight: f64,
  /// Relative tolerance override for numeric comparison.
  #[serde(default)] pub tolerance: Option<f64>,
  /// Entry label placed before the control.
  #[serde(default)] pub prompt: Option<String>,
}

fn default_weight() -> f64 { 1.0 }

impl Default for PartDef {
  fn default() -> Self {
    Self {
      text: String::new(),
      answer_type: AnswerType::Number,
      answer: String::new(),
      choices: Vec::new(),
      weight: default_weight(),
      tolerance: None,
      prompt: None,
    }
  }
}

/// Question-set definition blob: everything needed to generate and grade one
/// randomized question from a seed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuestionSet {
  pub id: String,
  #[serde(default)] pub title: String,
  /// Intro markup (templated). May contain script blocks; those are pulled
  /// out into client parameters at render time.
  #[serde(default)] pub text: String,
  #[serde(default)] pub variables: Vec<VarDef>,
  #[serde(default)] pub parts: Vec<PartDef>,
  #[serde(default)] pub hints: Vec<String>,
  /// External helper assets the client should load (delivered as `helps`).
  #[serde(default)] pub resources: Vec<String>,
}

impl QuestionSet {
  pub fn is_multipart(&self) -> bool {
    self.parts.len() > 1
  }
}

/// Stable form-field identifier for a part's input control. Multi-part
/// questions use a composite of question index and part number; the encoding
/// is load-bearing for stored submissions and must not change.
pub fn field_name(qn: usize, multi: bool, part: usize) -> String {
  if multi {
    format!("qn{}", (qn + 1) * 1000 + part)
  } else {
    format!("qn{}", qn)
  }
}

/// Companion hidden-field name carrying a previously uploaded file token.
pub fn prior_file_field(qn: usize, multi: bool, part: usize) -> String {
  let base = field_name(qn, multi, part);
  format!("lf{}", &base[2..])
}
