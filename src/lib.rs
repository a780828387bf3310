//! Search chat client
//!
//! Reconciles a search agent's event stream into an append-only transcript.
//! Each turn opens one stream, folds its frames into the turn's assistant
//! record, and infers a progress stage list (searching, reading, writing).

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod config;
pub mod protocol;
pub mod render;
pub mod runtime;
pub mod stage;
pub mod state_machine;
pub mod transcript;
pub mod transport;

pub use config::ClientConfig;
pub use runtime::{ChatHandle, SessionSnapshot, SubmitOutcome};
