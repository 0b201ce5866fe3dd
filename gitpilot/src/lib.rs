//! Natural-language git assistant with approval-gated execution.
//!
//! A request such as "undo my last commit but keep the changes" is turned into
//! a [`core::types::Plan`] by an external agent, then walked one step at a time
//! by the [`engine::ExecutionEngine`]. Every step needs human approval, every
//! command passes through the [`core::safety`] gate, and a failing command
//! triggers a recovery plan through [`recovery::RecoveryCoordinator`].
//!
//! The architecture keeps the same split throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (classification, safety rules,
//!   educational notes, run state). No I/O.
//! - **[`io`]**: Side-effecting adapters (git subprocesses, agent backend,
//!   configuration, prompt rendering).
//! - **[`agents`]**: Plan and commit-message providers built on the agent backend.
//!
//! Orchestration ([`engine`], [`recovery`], [`session`]) talks to the outside
//! world only through traits, and [`ui`] supplies the terminal implementation
//! of the interaction and display ports.

pub mod agents;
pub mod core;
pub mod engine;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod recovery;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod ui;
