//! Typed errors that callers need to tell apart.
//!
//! Everything else flows through `anyhow`; these types are recovered with
//! `downcast_ref` where the distinction matters (retry decisions, exit codes).

use std::time::Duration;

use thiserror::Error;

/// Failure of an assistant-side collaborator (plan, recovery plan, commit message).
///
/// The engine never recovers from these; they terminate the run.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The last attempt hit the per-call timeout.
    #[error("{call} timed out after {attempts} attempt(s) of {timeout:?} each")]
    TimedOut {
        call: &'static str,
        attempts: u32,
        timeout: Duration,
    },
    /// The backend kept failing (spawn error, non-zero exit, missing output).
    #[error("{call} failed after {attempts} attempt(s): {message}")]
    Failed {
        call: &'static str,
        attempts: u32,
        message: String,
    },
    /// The backend answered but the answer did not match the expected shape.
    #[error("{call} returned malformed output: {message}")]
    Malformed { call: &'static str, message: String },
}

/// Raised by an agent backend when a single attempt exceeds its timeout.
#[derive(Debug, Error)]
#[error("agent timed out after {0:?}")]
pub struct AgentTimeout(pub Duration);
