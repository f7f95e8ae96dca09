//! Crate error types. Only conditions fatal for a whole call surface here;
//! generation and scoring problems ride along in result error lists so
//! partial output is never thrown away.

use thiserror::Error;

/// A question-set store request failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store returned HTTP {status}: {message}")]
    BadStatus { status: u16, message: String },
    #[error("store response could not be decoded: {0}")]
    Decode(String),
}

/// Fatal errors for a single render/score call.
#[derive(Debug, Error)]
pub enum AssessError {
    /// Scoring was requested for a question the session has no seed or
    /// question-set reference for. (The render path reports this condition
    /// inside its result and shows a placeholder instead.)
    #[error("question {qn} has no seed or question set reference in session state")]
    MissingQuestionState { qn: usize },
    /// A referenced question set could not be resolved from any store.
    #[error("question set '{id}' is not available")]
    UnknownQuestionSet { id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}
