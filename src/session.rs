//! The externalized Session State Record: every per-question, per-part piece
//! of history for one assessment attempt. The record is owned by the caller,
//! threaded through render/score calls, and persisted wherever the caller
//! likes; this crate never creates or stores one on its own.
//!
//! Two storage quirks are preserved verbatim for round-trip compatibility
//! with already-persisted records:
//!   - answer history and aggregate flags are keyed by `qn + 1`, not `qn`
//!   - single-part questions store scalars where multi-part questions store
//!     part-keyed maps (see `ValueSlot`)
//! Both are part of the wire format. Do not normalize them.

use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Scalar-or-per-part union used by answer history and aggregate flags.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ValueSlot<T> {
    Single(T),
    PerPart(BTreeMap<usize, T>),
}

// Untagged serialization round-trips by shape (scalar vs object), but the
// derived untagged *deserializer* cannot reconstruct the integer-keyed
// `PerPart` map: serde's untagged content buffer rejects `usize` map keys
// read from JSON string keys. Reconstruct the two variants by JSON shape
// instead, which reproduces the exact wire format documented above.
impl<'de, T> Deserialize<'de> for ValueSlot<T>
where
    T: serde::de::DeserializeOwned,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Object(_) => serde_json::from_value(value)
                .map(ValueSlot::PerPart)
                .map_err(de::Error::custom),
            other => serde_json::from_value(other)
                .map(ValueSlot::Single)
                .map_err(de::Error::custom),
        }
    }
}

impl<T> ValueSlot<T> {
    /// Write a per-part value, replacing a scalar slot with a fresh map the
    /// way the legacy format did (the scalar is discarded, not migrated).
    pub fn set_part(&mut self, part: usize, value: T) {
        match self {
            ValueSlot::PerPart(map) => {
                map.insert(part, value);
            }
            ValueSlot::Single(_) => {
                let mut map = BTreeMap::new();
                map.insert(part, value);
                *self = ValueSlot::PerPart(map);
            }
        }
    }
}

/// Tri-state scoring flag: a boolean once the part has been scored, or the
/// `-1` sentinel when it has not. Serializes as `true`/`false`/`-1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoreFlag {
    Unscored,
    Known(bool),
}

impl From<bool> for ScoreFlag {
    fn from(b: bool) -> Self {
        ScoreFlag::Known(b)
    }
}

impl Serialize for ScoreFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScoreFlag::Unscored => serializer.serialize_i64(-1),
            ScoreFlag::Known(b) => serializer.serialize_bool(*b),
        }
    }
}

impl<'de> Deserialize<'de> for ScoreFlag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bool(bool),
            Int(i64),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Bool(b) => Ok(ScoreFlag::Known(b)),
            Repr::Int(-1) => Ok(ScoreFlag::Unscored),
            Repr::Int(n) => Err(de::Error::custom(format!(
                "score flag must be a bool or -1, got {}",
                n
            ))),
        }
    }
}

/// One assessment attempt's full history. Missing keys mean "no data yet"
/// and are never an error, so a freshly created record is just `default()`
/// plus seeds and question-set references.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Deterministic generation seed per question. Immutable once set.
    #[serde(default)]
    pub seeds: BTreeMap<usize, i64>,
    /// Question-set reference per question. Immutable once set.
    #[serde(default)]
    pub question_sets: BTreeMap<usize, String>,
    /// Last submitted answer text, keyed by `qn + 1`.
    #[serde(default)]
    pub answers: BTreeMap<usize, ValueSlot<String>>,
    /// Numeric/normalized form of the same, keyed by `qn + 1`. `None` when
    /// the submission had no numeric form.
    #[serde(default)]
    pub answers_numeric: BTreeMap<usize, ValueSlot<Option<f64>>>,
    /// Non-zero-credit flags, keyed by `qn + 1`.
    #[serde(default)]
    pub nonzero: BTreeMap<usize, ValueSlot<ScoreFlag>>,
    /// Full-credit flags, keyed by `qn + 1`.
    #[serde(default)]
    pub correct: BTreeMap<usize, ValueSlot<ScoreFlag>>,
    /// Times each part has actually been scored, keyed by `qn`. Only bumped
    /// when a submission records that part.
    #[serde(default)]
    pub part_attempts: BTreeMap<usize, BTreeMap<usize, u32>>,
    /// Most recent raw score per part, keyed by `qn`. Sticky until re-scored.
    #[serde(default)]
    pub raw_scores: BTreeMap<usize, BTreeMap<usize, f64>>,
}

impl SessionState {
    /// Highest per-part attempt count recorded for a question, 0 if none.
    pub fn attempt_number(&self, qn: usize) -> u32 {
        self.part_attempts
            .get(&qn)
            .and_then(|parts| parts.values().copied().max())
            .unwrap_or(0)
    }

    pub fn raw_score(&self, qn: usize, part: usize) -> Option<f64> {
        self.raw_scores.get(&qn).and_then(|m| m.get(&part)).copied()
    }

    /// True when the question has both a seed and a set reference.
    pub fn has_question(&self, qn: usize) -> bool {
        self.seeds.contains_key(&qn) && self.question_sets.contains_key(&qn)
    }

    pub(crate) fn record_attempt(&mut self, qn: usize, part: usize) {
        *self
            .part_attempts
            .entry(qn)
            .or_default()
            .entry(part)
            .or_insert(0) += 1;
    }

    /// Record the as-given and numeric answer forms, honoring the
    /// scalar-vs-map shape rule for single- vs multi-part questions.
    pub(crate) fn record_answer(
        &mut self,
        qn: usize,
        multi: bool,
        part: usize,
        text: String,
        numeric: Option<f64>,
    ) {
        if multi {
            self.answers
                .entry(qn + 1)
                .or_insert_with(|| ValueSlot::PerPart(BTreeMap::new()))
                .set_part(part, text);
            self.answers_numeric
                .entry(qn + 1)
                .or_insert_with(|| ValueSlot::PerPart(BTreeMap::new()))
                .set_part(part, numeric);
        } else {
            self.answers.insert(qn + 1, ValueSlot::Single(text));
            self.answers_numeric
                .insert(qn + 1, ValueSlot::Single(numeric));
        }
    }

    pub(crate) fn record_raw_score(&mut self, qn: usize, part: usize, raw: f64) {
        self.raw_scores.entry(qn).or_default().insert(part, raw);
    }
}
