//! Built-in question sets so the backend is useful without external config
//! or a remote store.

use crate::domain::{AnswerType, PartDef, QuestionSet, VarDef};

/// Minimal bank guaranteeing every answer type and the sequential-unlock
/// path are exercisable out of the box.
pub fn seed_question_sets() -> Vec<QuestionSet> {
  vec![
    QuestionSet {
      id: "seed-sum".into(),
      title: "Integer addition".into(),
      text: "<p>Compute {a} + {b}.</p>".into(),
      variables: vec![
        VarDef { name: "a".into(), min: 2, max: 19 },
        VarDef { name: "b".into(), min: 3, max: 17 },
      ],
      parts: vec![PartDef {
        answer: "{a}+{b}".into(),
        prompt: Some("Sum".into()),
        ..Default::default()
      }],
      hints: vec![
        "Line up the digits.".into(),
        "Add the ones first, then the tens.".into(),
      ],
      ..Default::default()
    },
    QuestionSet {
      id: "seed-rect".into(),
      title: "Rectangle, two steps".into(),
      text: "<p>A rectangle is {w} cm wide and {h} cm tall.</p>".into(),
      variables: vec![
        VarDef { name: "w".into(), min: 4, max: 12 },
        VarDef { name: "h".into(), min: 3, max: 9 },
      ],
      parts: vec![
        PartDef {
          text: "<p>Find its perimeter, in cm.</p>".into(),
          answer: "2*{w}+2*{h}".into(),
          ..Default::default()
        },
        PartDef {
          text: "<p>Find its area, in square cm.</p>".into(),
          answer: "{w}*{h}".into(),
          ..Default::default()
        },
      ],
      hints: vec!["The perimeter walks the full boundary once.".into()],
      ..Default::default()
    },
    QuestionSet {
      id: "seed-slope".into(),
      title: "Reading a plotted line".into(),
      text: concat!(
        "<p>The graph below plots y = {m}x. Which option gives the slope?</p>",
        "<script src=\"/js/plot-helper.js\"></script>",
        "<script>drawLine('plot', {m});</script>",
      )
      .into(),
      variables: vec![VarDef { name: "m".into(), min: 2, max: 6 }],
      parts: vec![PartDef {
        answer_type: AnswerType::Choice,
        answer: "1".into(),
        choices: vec!["The y-intercept".into(), "{m}".into(), "x + {m}".into()],
        ..Default::default()
      }],
      resources: vec!["/help/reading-graphs.html".into()],
      ..Default::default()
    },
    QuestionSet {
      id: "seed-worksheet".into(),
      title: "Worked solution upload".into(),
      text: "<p>Solve {a}x = {c} on paper and upload a photo of your work.</p>".into(),
      variables: vec![
        VarDef { name: "a".into(), min: 2, max: 9 },
        VarDef { name: "c".into(), min: 10, max: 90 },
      ],
      parts: vec![PartDef {
        answer_type: AnswerType::FileUpload,
        answer: "A photo or scan of the worked solution".into(),
        ..Default::default()
      }],
      ..Default::default()
    },
  ]
}
