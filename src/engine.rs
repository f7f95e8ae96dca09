//! Question Generator and Score Engine collaborator contracts, plus the
//! built-in deterministic engines used when no external engine is wired in.
//!
//! Flow for the built-in pair:
//! 1) `realize` derives variable values from the seed and substitutes them
//!    (plus cross-question answer references) into the text and key
//!    templates.
//! 2) `BuiltinGenerator` renders intro + unlocked part blocks with answer
//!    boxes.
//! 3) `BuiltinScorer` re-realizes from the same seed and grades submissions
//!    against the derived keys.
//!
//! Contract note for scorers: a part that cannot be graded at all (nothing
//! submitted, unusable format) must be omitted from the per-part result maps
//! and reported in `errors`. The scoring pipeline only mutates state for
//! parts present in the result, so omission is what makes "no state change
//! for the affected part" hold.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::answerbox::{answer_box_for, AnswerBoxParams};
use crate::domain::{
  field_name, prior_file_field, AnswerType, PartDef, QuestionSet, CORRECT_THRESHOLD,
  NONZERO_THRESHOLD,
};
use crate::protocol::{CallerContext, InputParams, Submission};
use crate::session::{ScoreFlag, ValueSlot};
use crate::util::fill_template;

/// Default relative tolerance for numeric grading, scaled by the key
/// magnitude with a floor of 1.
const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Derived done-state: which parts display as completed/unlocked. Computed
/// fresh on every render, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartDone {
  All,
  Parts(BTreeMap<usize, bool>),
}

impl PartDone {
  pub fn is_done(&self, part: usize) -> bool {
    match self {
      PartDone::All => true,
      PartDone::Parts(map) => map.get(&part).copied().unwrap_or(false),
    }
  }
}

/// Everything a Question Generator receives: the definition blob plus the
/// session-derived history and display flags for one question.
pub struct GenerateRequest<'a> {
  pub qset: &'a QuestionSet,
  pub qn: usize,
  pub seed: i64,
  pub show_hints: u32,
  pub show_answer: bool,
  pub attempt_number: u32,
  pub part_attempts: BTreeMap<usize, u32>,
  /// Cross-question answer history, keyed `qn + 1`. Later questions may
  /// reference earlier answers.
  pub answers: &'a BTreeMap<usize, ValueSlot<String>>,
  pub answers_numeric: &'a BTreeMap<usize, ValueSlot<Option<f64>>>,
  pub nonzero: &'a BTreeMap<usize, ValueSlot<ScoreFlag>>,
  pub correct: &'a BTreeMap<usize, ValueSlot<ScoreFlag>>,
  /// Raw-score view selected by the caller; empty when markers are hidden.
  pub raw_scores: BTreeMap<usize, f64>,
  pub part_done: PartDone,
  pub file_base_url: &'a str,
}

/// Generator response. `errors` is non-fatal: markup may be partial and the
/// caller decides what to display.
pub struct GeneratedQuestion {
  pub html: String,
  pub inputs: BTreeMap<String, InputParams>,
  pub external_refs: Vec<String>,
  pub correct_answers: BTreeMap<usize, String>,
  pub answer_weights: BTreeMap<usize, f64>,
  pub errors: Vec<String>,
}

/// Everything a Score Engine receives for one submission.
pub struct ScoreRequest<'a> {
  pub qset: &'a QuestionSet,
  pub qn: usize,
  pub seed: i64,
  pub submission: &'a Submission,
  pub attempt_number: u32,
  pub answers: &'a BTreeMap<usize, ValueSlot<String>>,
  pub answers_numeric: &'a BTreeMap<usize, ValueSlot<Option<f64>>>,
  pub caller: &'a CallerContext,
}

/// Scorer response, keyed by part. `answer_weights` always covers every
/// defined part; the other maps cover only parts that were actually graded.
pub struct ScoredQuestion {
  /// Credit per part (raw score times weight).
  pub scores: BTreeMap<usize, f64>,
  pub raw_scores: BTreeMap<usize, f64>,
  /// The submission normalized to stored text form.
  pub last_answers: BTreeMap<usize, String>,
  /// The submission normalized to numeric form, when one exists.
  pub last_answers_numeric: BTreeMap<usize, Option<f64>>,
  pub answer_weights: BTreeMap<usize, f64>,
  pub errors: Vec<String>,
}

pub trait QuestionGenerator: Send + Sync {
  fn generate(&self, req: &GenerateRequest<'_>) -> GeneratedQuestion;
}

pub trait ScoreEngine: Send + Sync {
  fn score(&self, req: &ScoreRequest<'_>) -> ScoredQuestion;
}

// ---- seeded realization shared by the built-in engines ----

struct Realized {
  pairs: Vec<(String, String)>,
  /// Grading keys per part (choice keys are option indices).
  keys: BTreeMap<usize, String>,
  /// Review-mode display form (choice keys become the option text).
  display: BTreeMap<usize, String>,
  choices: BTreeMap<usize, Vec<String>>,
  errors: Vec<String>,
}

impl Realized {
  fn substitute(&self, tpl: &str) -> String {
    let borrowed: Vec<(&str, &str)> =
      self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    fill_template(tpl, &borrowed)
  }
}

/// Derive the question instance a seed denotes: variable values, realized
/// choice options, and per-part answer keys. Same seed, same instance.
fn realize(
  qset: &QuestionSet,
  seed: i64,
  answers: &BTreeMap<usize, ValueSlot<String>>,
  answers_numeric: &BTreeMap<usize, ValueSlot<Option<f64>>>,
) -> Realized {
  let mut rng = StdRng::seed_from_u64(seed as u64);
  let mut pairs: Vec<(String, String)> = Vec::new();
  for var in &qset.variables {
    let (lo, hi) = if var.min <= var.max {
      (var.min, var.max)
    } else {
      (var.max, var.min)
    };
    let value: i64 = rng.gen_range(lo..=hi);
    pairs.push((var.name.clone(), value.to_string()));
  }

  // Cross-question references use the stored history's 1-offset keys:
  // {answer3} is question 3's recorded answer, {answer3p1} part 1 of it.
  // Numeric forms win when present so keys can do arithmetic on them.
  for (&idx, slot) in answers {
    match slot {
      ValueSlot::Single(text) => {
        let value = match answers_numeric.get(&idx) {
          Some(ValueSlot::Single(Some(n))) => fmt_num(*n),
          _ => text.clone(),
        };
        pairs.push((format!("answer{}", idx), value));
      }
      ValueSlot::PerPart(parts) => {
        for (&pn, text) in parts {
          let value = match answers_numeric.get(&idx) {
            Some(ValueSlot::PerPart(nums)) => match nums.get(&pn) {
              Some(Some(n)) => fmt_num(*n),
              _ => text.clone(),
            },
            _ => text.clone(),
          };
          pairs.push((format!("answer{}p{}", idx, pn), value));
        }
      }
    }
  }

  let borrowed: Vec<(&str, &str)> =
    pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
  let mut keys = BTreeMap::new();
  let mut display = BTreeMap::new();
  let mut choices = BTreeMap::new();
  let mut errors = Vec::new();
  for (pn, part) in qset.parts.iter().enumerate() {
    let substituted = fill_template(&part.answer, &borrowed);
    let key = match part.answer_type {
      AnswerType::Number | AnswerType::Choice => match eval_expr(&substituted) {
        Ok(v) => fmt_num(v),
        Err(e) => {
          errors.push(format!(
            "part {}: unusable answer key '{}': {}",
            pn, part.answer, e
          ));
          substituted.clone()
        }
      },
      AnswerType::Text | AnswerType::FileUpload => substituted.clone(),
    };
    if part.answer_type == AnswerType::Choice {
      let opts: Vec<String> = part
        .choices
        .iter()
        .map(|c| fill_template(c, &borrowed))
        .collect();
      match key.parse::<usize>().ok().and_then(|i| opts.get(i).cloned()) {
        Some(text) => {
          display.insert(pn, text);
        }
        None => {
          errors.push(format!(
            "part {}: correct choice index '{}' is out of range",
            pn, key
          ));
          display.insert(pn, key.clone());
        }
      }
      choices.insert(pn, opts);
    } else {
      display.insert(pn, key.clone());
    }
    keys.insert(pn, key);
  }

  Realized { pairs, keys, display, choices, errors }
}

fn fmt_num(v: f64) -> String {
  if v.fract() == 0.0 && v.abs() < 1e15 {
    format!("{}", v as i64)
  } else {
    format!("{}", v)
  }
}

// ---- tiny arithmetic evaluator for answer-key templates ----

/// Evaluate a small arithmetic expression: numbers, `+ - * /`, unary minus
/// and parentheses. Enough for keys like `2*{w}+2*{h}` after substitution.
fn eval_expr(src: &str) -> Result<f64, String> {
  let mut p = ExprParser { src: src.as_bytes(), pos: 0 };
  let v = p.expr()?;
  p.skip_ws();
  if p.pos != p.src.len() {
    return Err(format!("unexpected input at byte {}", p.pos));
  }
  Ok(v)
}

struct ExprParser<'a> {
  src: &'a [u8],
  pos: usize,
}

impl<'a> ExprParser<'a> {
  fn skip_ws(&mut self) {
    while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
      self.pos += 1;
    }
  }

  fn peek(&mut self) -> Option<u8> {
    self.skip_ws();
    self.src.get(self.pos).copied()
  }

  fn expr(&mut self) -> Result<f64, String> {
    let mut v = self.term()?;
    loop {
      match self.peek() {
        Some(b'+') => {
          self.pos += 1;
          v += self.term()?;
        }
        Some(b'-') => {
          self.pos += 1;
          v -= self.term()?;
        }
        _ => break,
      }
    }
    Ok(v)
  }

  fn term(&mut self) -> Result<f64, String> {
    let mut v = self.factor()?;
    loop {
      match self.peek() {
        Some(b'*') => {
          self.pos += 1;
          v *= self.factor()?;
        }
        Some(b'/') => {
          self.pos += 1;
          let d = self.factor()?;
          if d == 0.0 {
            return Err("division by zero".into());
          }
          v /= d;
        }
        _ => break,
      }
    }
    Ok(v)
  }

  fn factor(&mut self) -> Result<f64, String> {
    match self.peek() {
      Some(b'-') => {
        self.pos += 1;
        Ok(-self.factor()?)
      }
      Some(b'(') => {
        self.pos += 1;
        let v = self.expr()?;
        if self.peek() != Some(b')') {
          return Err("missing closing parenthesis".into());
        }
        self.pos += 1;
        Ok(v)
      }
      Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
      Some(c) => Err(format!("unexpected character '{}'", c as char)),
      None => Err("unexpected end of expression".into()),
    }
  }

  fn number(&mut self) -> Result<f64, String> {
    let start = self.pos;
    while self.pos < self.src.len()
      && (self.src[self.pos].is_ascii_digit() || self.src[self.pos] == b'.')
    {
      self.pos += 1;
    }
    let text = std::str::from_utf8(&self.src[start..self.pos]).expect("digits are ascii");
    text.parse::<f64>().map_err(|_| format!("bad number '{}'", text))
  }
}

// ---- built-in generator ----

/// Deterministic template-driven generator: same seed, same question.
pub struct BuiltinGenerator;

impl QuestionGenerator for BuiltinGenerator {
  fn generate(&self, req: &GenerateRequest<'_>) -> GeneratedQuestion {
    let qset = req.qset;
    let realized = realize(qset, req.seed, req.answers, req.answers_numeric);
    let mut errors = realized.errors.clone();
    let multi = qset.is_multipart();

    let mut html = String::new();
    html.push_str(&realized.substitute(&qset.text));
    if req.attempt_number > 0 {
      html.push_str(&format!(
        "<p class=\"attempts\">Attempts so far: {}</p>",
        req.attempt_number
      ));
    }

    let mut inputs = BTreeMap::new();
    for (pn, part) in qset.parts.iter().enumerate() {
      // Sequential unlock: a part renders once the one before it is done.
      let unlocked = pn == 0 || req.part_done.is_done(pn - 1);
      if multi && !unlocked {
        html.push_str(&format!(
          "<div class=\"part locked\" id=\"part-{}-{}\">Complete the previous part to continue.</div>",
          req.qn, pn
        ));
        continue;
      }

      html.push_str("<div class=\"part\">");
      if multi {
        html.push_str(&format!("<h4>Part {}</h4>", pn + 1));
      }
      if !part.text.is_empty() {
        html.push_str(&realized.substitute(&part.text));
      }
      if let Some(&sc) = req.raw_scores.get(&pn) {
        let class = if sc > CORRECT_THRESHOLD {
          "correct"
        } else if sc > NONZERO_THRESHOLD {
          "partial"
        } else {
          "incorrect"
        };
        html.push_str(&format!("<span class=\"scoremarker {}\"></span>", class));
      }

      let last = last_answer_for(req.answers, req.qn, pn);
      let correct = realized.display.get(&pn).cloned().unwrap_or_default();
      let choice_opts = realized.choices.get(&pn).map(Vec::as_slice).unwrap_or(&[]);
      let rendered = answer_box_for(part.answer_type).generate(&AnswerBoxParams {
        qn: req.qn,
        part: pn,
        multi,
        last_answer: &last,
        prompt: part.prompt.as_deref(),
        correct_answer: &correct,
        choices: choice_opts,
        file_base_url: req.file_base_url,
      });
      html.push_str(&rendered.control);
      if req.show_answer {
        html.push_str(&format!(
          "<div class=\"answer\">Answer: {}</div>",
          rendered.correct_answer
        ));
      }
      html.push_str("</div>");

      let preview = if rendered.preview.is_empty() {
        None
      } else {
        Some(rendered.preview)
      };
      inputs.insert(
        field_name(req.qn, multi, pn),
        InputParams {
          tip: rendered.tip,
          preview,
          extras: rendered.client_params,
        },
      );
    }

    let budget = req.show_hints as usize;
    if budget > 0 && !qset.hints.is_empty() {
      html.push_str("<div class=\"hints\"><ul>");
      for hint in qset.hints.iter().take(budget) {
        html.push_str(&format!("<li>{}</li>", realized.substitute(hint)));
      }
      html.push_str("</ul></div>");
    }

    if qset.parts.is_empty() {
      errors.push(format!("question set '{}' defines no parts", qset.id));
    }

    GeneratedQuestion {
      html,
      inputs,
      external_refs: qset.resources.clone(),
      correct_answers: realized.display,
      answer_weights: qset
        .parts
        .iter()
        .enumerate()
        .map(|(pn, p)| (pn, p.weight))
        .collect(),
      errors,
    }
  }
}

fn last_answer_for(
  answers: &BTreeMap<usize, ValueSlot<String>>,
  qn: usize,
  part: usize,
) -> String {
  match answers.get(&(qn + 1)) {
    Some(ValueSlot::Single(text)) => text.clone(),
    Some(ValueSlot::PerPart(map)) => map.get(&part).cloned().unwrap_or_default(),
    None => String::new(),
  }
}

// ---- built-in scorer ----

/// Key-based grader matching the built-in generator's realization.
pub struct BuiltinScorer;

impl ScoreEngine for BuiltinScorer {
  fn score(&self, req: &ScoreRequest<'_>) -> ScoredQuestion {
    let qset = req.qset;
    let realized = realize(qset, req.seed, req.answers, req.answers_numeric);
    let multi = qset.is_multipart();
    debug!(
      target: "question",
      qn = req.qn,
      attempt = req.attempt_number,
      instructor = req.caller.instructor,
      "grading submission"
    );

    let mut out = ScoredQuestion {
      scores: BTreeMap::new(),
      raw_scores: BTreeMap::new(),
      last_answers: BTreeMap::new(),
      last_answers_numeric: BTreeMap::new(),
      answer_weights: qset
        .parts
        .iter()
        .enumerate()
        .map(|(pn, p)| (pn, p.weight))
        .collect(),
      errors: realized.errors.clone(),
    };

    for (pn, part) in qset.parts.iter().enumerate() {
      let mut given = req
        .submission
        .answer_for(req.qn, multi, pn)
        .unwrap_or("")
        .to_string();
      if part.answer_type == AnswerType::FileUpload && given.trim().is_empty() {
        // No new upload; fall back to the prior-file hidden field.
        if let Some(prior) = req.submission.field(&prior_file_field(req.qn, multi, pn)) {
          if !prior.is_empty() {
            given = format!("@FILE:{}@", prior);
          }
        }
      }
      if given.trim().is_empty() {
        out.errors.push(format!("part {}: no answer submitted", pn));
        continue;
      }
      let key = match realized.keys.get(&pn) {
        Some(k) => k,
        None => continue,
      };
      match grade_part(pn, part, key, &given) {
        Ok((raw, numeric, recorded)) => {
          out.raw_scores.insert(pn, raw);
          out.scores.insert(pn, raw * part.weight);
          out.last_answers.insert(pn, recorded);
          out.last_answers_numeric.insert(pn, numeric);
        }
        Err(e) => out.errors.push(e),
      }
    }

    out
  }
}

/// Grade one part against its realized key. Returns
/// (raw score, numeric form, recorded text form), or an error when the
/// submission is ungradable, in which case the part stays out of the result.
fn grade_part(
  pn: usize,
  part: &PartDef,
  key: &str,
  given: &str,
) -> Result<(f64, Option<f64>, String), String> {
  let trimmed = given.trim();
  match part.answer_type {
    AnswerType::Number => {
      let submitted = trimmed
        .replace(',', "")
        .parse::<f64>()
        .map_err(|_| format!("part {}: submitted answer '{}' is not a number", pn, trimmed))?;
      let expected = key
        .parse::<f64>()
        .map_err(|_| format!("part {}: answer key '{}' is not a number", pn, key))?;
      let tol = part.tolerance.unwrap_or(DEFAULT_TOLERANCE) * expected.abs().max(1.0);
      let raw = if (submitted - expected).abs() <= tol { 1.0 } else { 0.0 };
      Ok((raw, Some(submitted), trimmed.to_string()))
    }
    AnswerType::Text => {
      let raw = if normalize_text(trimmed) == normalize_text(key) { 1.0 } else { 0.0 };
      Ok((raw, trimmed.replace(',', "").parse::<f64>().ok(), trimmed.to_string()))
    }
    AnswerType::Choice => {
      let selected = trimmed.parse::<usize>().map_err(|_| {
        format!("part {}: selected option '{}' is not an option index", pn, trimmed)
      })?;
      let expected = key.parse::<usize>().map_err(|_| {
        format!("part {}: answer key '{}' is not an option index", pn, key)
      })?;
      let raw = if selected == expected { 1.0 } else { 0.0 };
      Ok((raw, Some(selected as f64), trimmed.to_string()))
    }
    AnswerType::FileUpload => {
      // Uploads are graded by hand later; record the token (or error
      // marker) as given and leave the raw score at zero for now.
      Ok((0.0, None, trimmed.to_string()))
    }
  }
}

fn normalize_text(s: &str) -> String {
  s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
