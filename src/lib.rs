//! Standalone assessment rendering and scoring.
//!
//! The core of the crate is an externalized session model: callers own the
//! [`session::SessionState`] record, and the two operations in [`logic`]
//! transform it. [`logic::render_question`] reads it to produce a display
//! payload; [`logic::score_question`] merges a graded submission back into
//! it. Question generation and answer grading sit behind the trait contracts
//! in [`engine`], with deterministic built-in implementations. The binary
//! serves both operations over HTTP and WebSocket, state-in/state-out.

pub mod answerbox;
pub mod bank;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod logic;
pub mod protocol;
pub mod routes;
pub mod scripts;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;

// Re-export the types a library caller needs for the two core operations.
pub use error::{AssessError, StoreError};
pub use logic::{render_question, score_question};
pub use protocol::{
    CallerContext, PartsToScore, RenderOptions, RenderedQuestion, ScoreOutcome, Submission,
};
pub use session::{ScoreFlag, SessionState, ValueSlot};
