//! The two state transitions at the heart of the crate: rendering a question
//! for display (read-only) and applying a scored submission to the session
//! record (in-place mutation). Both are synchronous; the engine collaborators
//! and resolved question-set definitions are passed in by the caller.
//!
//! Concurrency contract: a Session State Record must not be shared across
//! concurrent score calls. The merge rules below are only safe when the
//! caller serializes submissions against the same record.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::domain::{QuestionSet, CORRECT_THRESHOLD, NONZERO_THRESHOLD};
use crate::engine::{GenerateRequest, PartDone, QuestionGenerator, ScoreEngine, ScoreRequest};
use crate::error::AssessError;
use crate::protocol::{
  CallerContext, ClientParams, PartsToScore, RenderOptions, RenderedQuestion, ScoreOutcome,
  Submission,
};
use crate::scripts;
use crate::session::{ScoreFlag, SessionState, ValueSlot};

/// Render question `qn` from `state` for display. Never mutates the record;
/// re-rendering the same state yields the same result.
///
/// A question with no seed or set reference yields a placeholder result
/// carrying a display error. A set reference missing from `qdata` is fatal:
/// the caller failed to resolve the stores.
#[instrument(level = "debug", skip_all, fields(%qn))]
pub fn render_question(
  qdata: &BTreeMap<String, QuestionSet>,
  generator: &dyn QuestionGenerator,
  state: &SessionState,
  qn: usize,
  options: &RenderOptions,
  file_base_url: &str,
) -> Result<RenderedQuestion, AssessError> {
  let (seed, qsid) = match (state.seeds.get(&qn), state.question_sets.get(&qn)) {
    (Some(&seed), Some(qsid)) => (seed, qsid),
    _ => {
      debug!(target: "question", qn, "render requested for a question with no state");
      return Ok(RenderedQuestion::placeholder(qn));
    }
  };
  let qset = qdata
    .get(qsid)
    .ok_or_else(|| AssessError::UnknownQuestionSet { id: qsid.clone() })?;

  let attempt_number = state.attempt_number(qn);

  // Done-state is derived fresh on every render: a part counts as done when
  // its raw score clears the correct threshold, or, with score markers
  // hidden, once it has been attempted at all.
  let part_done = if options.show_all_parts {
    PartDone::All
  } else {
    let mut done = BTreeMap::new();
    if let Some(scores) = state.raw_scores.get(&qn) {
      for (&pn, &sc) in scores {
        let d = if options.hide_score_markers {
          state
            .part_attempts
            .get(&qn)
            .and_then(|parts| parts.get(&pn))
            .copied()
            .unwrap_or(0)
            > 0
        } else {
          sc > CORRECT_THRESHOLD
        };
        done.insert(pn, d);
      }
    }
    PartDone::Parts(done)
  };

  let raw_view = if options.hide_score_markers {
    BTreeMap::new()
  } else {
    state.raw_scores.get(&qn).cloned().unwrap_or_default()
  };

  let request = GenerateRequest {
    qset,
    qn,
    seed,
    show_hints: options.show_hints,
    show_answer: options.show_answer,
    attempt_number,
    part_attempts: state.part_attempts.get(&qn).cloned().unwrap_or_default(),
    answers: &state.answers,
    answers_numeric: &state.answers_numeric,
    nonzero: &state.nonzero,
    correct: &state.correct,
    raw_scores: raw_view,
    part_done,
    file_base_url,
  };
  let generated = generator.generate(&request);

  let (html, extracted) = scripts::extract(&generated.html);
  let mut client_params = ClientParams {
    scripts: extracted,
    helps: generated.external_refs,
    inputs: generated.inputs,
    answers: None,
    student_answer: None,
  };
  if options.show_answer {
    client_params.answers = Some(generated.correct_answers);
    client_params.student_answer = state.answers.get(&(qn + 1)).cloned();
  }

  Ok(RenderedQuestion {
    html,
    client_params,
    errors: generated.errors,
  })
}

/// Apply a scored submission for question `qn` to `state` in place.
///
/// The merge rules are deliberately asymmetric: answer history and attempt
/// counts update only for parts selected by `parts_to_score`, while a raw
/// score also refreshes whenever a previous raw score >= 0 exists for the
/// part. Callers rely on this to regrade a subset of parts without
/// disturbing the attempt bookkeeping of the others.
#[instrument(level = "debug", skip_all, fields(%qn))]
pub fn score_question(
  qdata: &BTreeMap<String, QuestionSet>,
  scorer: &dyn ScoreEngine,
  state: &mut SessionState,
  qn: usize,
  submission: &Submission,
  parts_to_score: &PartsToScore,
  caller: &CallerContext,
) -> Result<ScoreOutcome, AssessError> {
  let (seed, qsid) = match (state.seeds.get(&qn), state.question_sets.get(&qn)) {
    (Some(&seed), Some(qsid)) => (seed, qsid.clone()),
    _ => return Err(AssessError::MissingQuestionState { qn }),
  };
  let qset = qdata
    .get(&qsid)
    .ok_or(AssessError::UnknownQuestionSet { id: qsid })?;

  let attempt_number = state.attempt_number(qn);
  let request = ScoreRequest {
    qset,
    qn,
    seed,
    submission,
    attempt_number,
    answers: &state.answers,
    answers_numeric: &state.answers_numeric,
    caller,
  };
  let scored = scorer.score(&request);

  // The shape of the stored history follows the question's defined part
  // count, not how many parts this submission happened to grade.
  let multi = scored.answer_weights.len() > 1;

  for (&part, given) in &scored.last_answers {
    let selected = parts_to_score.selects(part);
    if selected {
      state.record_attempt(qn, part);
      let numeric = scored.last_answers_numeric.get(&part).copied().flatten();
      state.record_answer(qn, multi, part, given.clone(), numeric);
    }
    let refresh_existing = state.raw_score(qn, part).map_or(false, |sc| sc >= 0.0);
    if selected || refresh_existing {
      if let Some(&raw) = scored.raw_scores.get(&part) {
        state.record_raw_score(qn, part, raw);
      }
    }
  }

  let attempted = state.part_attempts.get(&qn).map(BTreeMap::len).unwrap_or(0);
  let all_parts_scored = attempted == scored.answer_weights.len();
  let total: f64 = scored.scores.values().sum();

  if multi {
    let mut nonzero = BTreeMap::new();
    let mut correct = BTreeMap::new();
    for &part in scored.last_answers.keys() {
      match state.raw_score(qn, part) {
        None => {
          nonzero.insert(part, ScoreFlag::Unscored);
          correct.insert(part, ScoreFlag::Unscored);
        }
        Some(sc) => {
          nonzero.insert(part, ScoreFlag::Known(sc > NONZERO_THRESHOLD));
          correct.insert(part, ScoreFlag::Known(sc > CORRECT_THRESHOLD));
        }
      }
    }
    state.nonzero.insert(qn + 1, ValueSlot::PerPart(nonzero));
    state.correct.insert(qn + 1, ValueSlot::PerPart(correct));
  } else {
    state
      .nonzero
      .insert(qn + 1, ValueSlot::Single(ScoreFlag::Known(total > NONZERO_THRESHOLD)));
    state
      .correct
      .insert(qn + 1, ValueSlot::Single(ScoreFlag::Known(total > CORRECT_THRESHOLD)));
  }

  debug!(target: "question", qn, total, all_parts_scored, "submission scored");

  Ok(ScoreOutcome {
    scores: scored.scores,
    raw: scored.raw_scores,
    errors: scored.errors,
    all_parts_scored,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{PartDef, VarDef};
  use crate::engine::{BuiltinGenerator, BuiltinScorer};

  // Pinned variable ranges make the built-in engines fully predictable.
  fn single_part_set() -> QuestionSet {
    QuestionSet {
      id: "s1".into(),
      text: "<p>Compute {a} + {b}.</p>".into(),
      variables: vec![
        VarDef { name: "a".into(), min: 2, max: 2 },
        VarDef { name: "b".into(), min: 3, max: 3 },
      ],
      parts: vec![PartDef { answer: "{a}+{b}".into(), ..Default::default() }],
      ..Default::default()
    }
  }

  fn two_part_set() -> QuestionSet {
    QuestionSet {
      id: "m1".into(),
      text: "<p>A rectangle is {w} by {h}.</p>".into(),
      variables: vec![
        VarDef { name: "w".into(), min: 4, max: 4 },
        VarDef { name: "h".into(), min: 3, max: 3 },
      ],
      parts: vec![
        PartDef { answer: "2*{w}+2*{h}".into(), ..Default::default() }, // 14
        PartDef { answer: "{w}*{h}".into(), ..Default::default() },     // 12
      ],
      ..Default::default()
    }
  }

  fn scripted_set() -> QuestionSet {
    QuestionSet {
      id: "scripted".into(),
      text: concat!(
        "<p>Watch the animation, then answer.</p>",
        "<script src=\"/js/anim.js\"></script>",
        "<script>document.write('<script src=\"/js/extra.js\"></scr'+'ipt>');start();</script>",
      )
      .into(),
      variables: vec![VarDef { name: "k".into(), min: 6, max: 6 }],
      parts: vec![PartDef { answer: "{k}".into(), ..Default::default() }],
      resources: vec!["/help/animations.html".into()],
      ..Default::default()
    }
  }

  fn qdata() -> BTreeMap<String, QuestionSet> {
    [single_part_set(), two_part_set(), scripted_set()]
      .into_iter()
      .map(|q| (q.id.clone(), q))
      .collect()
  }

  fn session(qsid: &str) -> SessionState {
    let mut state = SessionState::default();
    state.seeds.insert(0, 42);
    state.question_sets.insert(0, qsid.into());
    state
  }

  fn submit(fields: &[(&str, &str)]) -> Submission {
    let mut s = Submission::new();
    for (k, v) in fields {
      s.insert(*k, *v);
    }
    s
  }

  fn render(state: &SessionState, options: &RenderOptions) -> RenderedQuestion {
    render_question(&qdata(), &BuiltinGenerator, state, 0, options, "/files").expect("render")
  }

  fn score(state: &mut SessionState, fields: &[(&str, &str)], parts: &PartsToScore) -> ScoreOutcome {
    score_question(
      &qdata(),
      &BuiltinScorer,
      state,
      0,
      &submit(fields),
      parts,
      &CallerContext::default(),
    )
    .expect("score")
  }

  #[test]
  fn rendering_is_idempotent_and_read_only() {
    let state = session("s1");
    let before = state.clone();
    let first = render(&state, &RenderOptions::default());
    let second = render(&state, &RenderOptions::default());
    assert_eq!(first, second);
    assert_eq!(state, before);
  }

  #[test]
  fn missing_state_renders_a_placeholder_with_a_display_error() {
    let state = SessionState::default();
    let rendered = render_question(
      &qdata(),
      &BuiltinGenerator,
      &state,
      7,
      &RenderOptions::default(),
      "/files",
    )
    .expect("placeholder, not failure");
    assert!(rendered.html.contains("not available"));
    assert_eq!(rendered.errors.len(), 1);
  }

  #[test]
  fn unresolvable_set_reference_is_fatal() {
    let state = session("no-such-set");
    let err = render_question(
      &qdata(),
      &BuiltinGenerator,
      &state,
      0,
      &RenderOptions::default(),
      "/files",
    )
    .unwrap_err();
    assert!(matches!(err, AssessError::UnknownQuestionSet { .. }));

    let mut state = session("no-such-set");
    let err = score_question(
      &qdata(),
      &BuiltinScorer,
      &mut state,
      0,
      &Submission::new(),
      &PartsToScore::All,
      &CallerContext::default(),
    )
    .unwrap_err();
    assert!(matches!(err, AssessError::UnknownQuestionSet { .. }));
  }

  #[test]
  fn scoring_a_question_without_state_is_fatal() {
    let mut state = SessionState::default();
    let err = score_question(
      &qdata(),
      &BuiltinScorer,
      &mut state,
      0,
      &Submission::new(),
      &PartsToScore::All,
      &CallerContext::default(),
    )
    .unwrap_err();
    assert!(matches!(err, AssessError::MissingQuestionState { qn: 0 }));
  }

  #[test]
  fn rendered_markup_never_contains_script_tags() {
    let state = session("scripted");
    let rendered = render(&state, &RenderOptions::default());
    assert!(!rendered.html.contains("<script"));
    let kinds: Vec<_> = rendered
      .client_params
      .scripts
      .iter()
      .map(|s| (s.kind, s.value.clone()))
      .collect();
    assert_eq!(kinds.len(), 3);
    assert_eq!(kinds[0].1, "/js/anim.js");
    assert_eq!(kinds[1].1, "/js/extra.js");
    assert!(kinds[2].1.contains("start();"));
    assert_eq!(rendered.client_params.helps, vec!["/help/animations.html"]);
  }

  #[test]
  fn single_part_seed42_example() {
    // seed=42, answer key 5, submitted "5": full credit everywhere.
    let mut state = session("s1");
    let outcome = score(&mut state, &[("qn0", "5")], &PartsToScore::All);
    assert_eq!(outcome.raw[&0], 1.0);
    assert_eq!(outcome.scores[&0], 1.0);
    assert!(outcome.all_parts_scored);
    assert!(outcome.errors.is_empty());
    assert_eq!(state.raw_score(0, 0), Some(1.0));
    assert_eq!(state.part_attempts[&0][&0], 1);
    assert_eq!(state.answers[&1], ValueSlot::Single("5".to_string()));
    assert_eq!(state.answers_numeric[&1], ValueSlot::Single(Some(5.0)));
    assert_eq!(state.correct[&1], ValueSlot::Single(ScoreFlag::Known(true)));
    assert_eq!(state.nonzero[&1], ValueSlot::Single(ScoreFlag::Known(true)));
  }

  #[test]
  fn correct_flag_tracks_the_threshold_exactly() {
    let mut state = session("s1");
    score(&mut state, &[("qn0", "4")], &PartsToScore::All);
    assert_eq!(state.correct[&1], ValueSlot::Single(ScoreFlag::Known(false)));
    assert_eq!(state.nonzero[&1], ValueSlot::Single(ScoreFlag::Known(false)));

    score(&mut state, &[("qn0", "5")], &PartsToScore::All);
    assert_eq!(state.correct[&1], ValueSlot::Single(ScoreFlag::Known(true)));
    // Review mode reflects the recorded answer after the re-score.
    let rendered = render(
      &state,
      &RenderOptions { show_answer: true, ..Default::default() },
    );
    assert_eq!(
      rendered.client_params.student_answer,
      Some(ValueSlot::Single("5".to_string()))
    );
    assert_eq!(rendered.client_params.answers.as_ref().unwrap()[&0], "5");
  }

  #[test]
  fn multi_part_history_uses_part_keyed_maps() {
    let mut state = session("m1");
    let outcome = score(
      &mut state,
      &[("qn1000", "14"), ("qn1001", "12")],
      &PartsToScore::All,
    );
    assert!(outcome.all_parts_scored);
    assert_eq!(
      state.answers[&1],
      ValueSlot::PerPart(
        [(0, "14".to_string()), (1, "12".to_string())].into_iter().collect()
      )
    );
    match &state.correct[&1] {
      ValueSlot::PerPart(map) => {
        assert_eq!(map[&0], ScoreFlag::Known(true));
        assert_eq!(map[&1], ScoreFlag::Known(true));
      }
      other => panic!("expected part-keyed flags, got {:?}", other),
    }
  }

  #[test]
  fn all_parts_scored_requires_every_part_attempted() {
    let mut state = session("m1");
    // Only part 0 submitted; part 1 is reported, not recorded.
    let outcome = score(&mut state, &[("qn1000", "14")], &PartsToScore::All);
    assert!(!outcome.all_parts_scored);
    assert!(outcome.errors.iter().any(|e| e.contains("part 1")));
    assert_eq!(state.part_attempts[&0].len(), 1);
    // Part 1 was never scored: its flag carries the sentinel.
    match &state.correct[&1] {
      ValueSlot::PerPart(map) => {
        assert_eq!(map[&0], ScoreFlag::Known(true));
        assert!(map.get(&1).is_none());
      }
      other => panic!("expected part-keyed flags, got {:?}", other),
    }

    // Even a perfect part 0 does not complete the question until part 1
    // has been attempted once.
    let outcome = score(&mut state, &[("qn1000", "14"), ("qn1001", "999")], &PartsToScore::All);
    assert!(outcome.all_parts_scored);
    match &state.correct[&1] {
      ValueSlot::PerPart(map) => {
        assert_eq!(map[&1], ScoreFlag::Known(false));
      }
      other => panic!("expected part-keyed flags, got {:?}", other),
    }
  }

  #[test]
  fn subset_rescore_refreshes_existing_scores_only() {
    let mut state = session("m1");
    // First submission records both parts: part 0 right, part 1 wrong.
    score(
      &mut state,
      &[("qn1000", "14"), ("qn1001", "999")],
      &PartsToScore::All,
    );
    assert_eq!(state.raw_score(0, 1), Some(0.0));
    assert_eq!(state.part_attempts[&0][&1], 1);

    // Regrade selecting only part 0. Part 1 now has the right answer in the
    // submission, but is not selected: its attempt count and recorded answer
    // must not move, while its raw score refreshes because one existed.
    let parts = PartsToScore::Selected([(0, true)].into_iter().collect());
    score(
      &mut state,
      &[("qn1000", "14"), ("qn1001", "12")],
      &parts,
    );
    assert_eq!(state.part_attempts[&0][&0], 2);
    assert_eq!(state.part_attempts[&0][&1], 1, "unselected attempt count moved");
    assert_eq!(state.raw_score(0, 1), Some(1.0), "existing raw score not refreshed");
    match &state.answers[&1] {
      ValueSlot::PerPart(map) => {
        assert_eq!(map[&1], "999", "unselected answer history moved");
      }
      other => panic!("expected part-keyed answers, got {:?}", other),
    }
  }

  #[test]
  fn subset_score_does_not_create_scores_for_untouched_parts() {
    let mut state = session("m1");
    // Fresh record, select only part 0: part 1 has no prior raw score, so
    // nothing may appear for it even though the engine graded it.
    let parts = PartsToScore::Selected([(0, true)].into_iter().collect());
    let outcome = score(
      &mut state,
      &[("qn1000", "14"), ("qn1001", "12")],
      &parts,
    );
    assert_eq!(outcome.raw[&1], 1.0, "engine still returns the computed score");
    assert_eq!(state.raw_score(0, 1), None);
    assert!(state.part_attempts[&0].get(&1).is_none());
    match &state.correct[&1] {
      ValueSlot::PerPart(map) => {
        assert_eq!(map[&1], ScoreFlag::Unscored);
      }
      other => panic!("expected part-keyed flags, got {:?}", other),
    }
  }

  #[test]
  fn sequential_unlock_follows_scores_then_attempts() {
    let mut state = session("m1");
    // Nothing scored: part 1 is locked.
    let rendered = render(&state, &RenderOptions::default());
    assert!(rendered.html.contains("part locked"));

    // Part 0 wrong: still locked under score-based unlock...
    score(&mut state, &[("qn1000", "7")], &PartsToScore::All);
    let rendered = render(&state, &RenderOptions::default());
    assert!(rendered.html.contains("part locked"));
    // ...but unlocked when score markers are hidden (attempt-based).
    let rendered = render(
      &state,
      &RenderOptions { hide_score_markers: true, ..Default::default() },
    );
    assert!(!rendered.html.contains("part locked"));
    // Hidden markers also blank the raw-score view.
    assert!(!rendered.html.contains("scoremarker"));

    // Part 0 correct: unlocked under score-based unlock.
    score(&mut state, &[("qn1000", "14")], &PartsToScore::All);
    let rendered = render(&state, &RenderOptions::default());
    assert!(!rendered.html.contains("part locked"));
    assert!(rendered.html.contains("scoremarker correct"));

    // showAllParts bypasses the whole mechanism on a fresh record.
    let fresh = session("m1");
    let rendered = render(
      &fresh,
      &RenderOptions { show_all_parts: true, ..Default::default() },
    );
    assert!(!rendered.html.contains("part locked"));
  }

  #[test]
  fn scoring_errors_leave_the_affected_part_untouched() {
    let mut state = session("s1");
    let outcome = score(&mut state, &[("qn0", "not a number")], &PartsToScore::All);
    assert!(outcome.errors.iter().any(|e| e.contains("not a number")));
    assert!(outcome.scores.is_empty());
    assert_eq!(state.attempt_number(0), 0);
    assert!(state.answers.get(&1).is_none());
    assert_eq!(state.raw_score(0, 0), None);
  }
}
