//! Side-effecting adapters: git, agent backend, configuration, prompts.

pub mod agent;
pub mod config;
pub mod git;
pub mod process;
pub mod prompt;
