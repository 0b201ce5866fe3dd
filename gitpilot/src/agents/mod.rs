//! Providers built on the agent backend.
//!
//! [`AgentClient`] bundles the backend, its scratch workspace, the prompt
//! templates, and the retry policy. [`planner::AgentPlanner`] and
//! [`committer::AgentCommitWriter`] borrow one client each.

pub mod committer;
pub mod planner;

use anyhow::Result;
use serde::de::DeserializeOwned;

use crate::io::agent::{Agent, AgentWorkspace, RetryPolicy, call_json};
use crate::io::config::ProviderConfig;
use crate::io::prompt::PromptEngine;

pub struct AgentClient {
    agent: Box<dyn Agent>,
    workspace: AgentWorkspace,
    prompts: PromptEngine,
    config: ProviderConfig,
}

impl AgentClient {
    pub fn new(agent: Box<dyn Agent>, workspace: AgentWorkspace, config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            agent,
            workspace,
            prompts: PromptEngine::new()?,
            config,
        })
    }

    pub fn prompts(&self) -> &PromptEngine {
        &self.prompts
    }

    /// One schema-validated agent call. Failures surface as `ProviderError`
    /// inside the returned `anyhow::Error`.
    pub(crate) fn call<T: DeserializeOwned>(
        &self,
        call: &'static str,
        prompt: String,
        schema: &str,
    ) -> Result<T> {
        let request = self.workspace.request(call, prompt, schema, &self.config)?;
        let answer = call_json(
            self.agent.as_ref(),
            call,
            &request,
            schema,
            RetryPolicy::from_config(&self.config),
        )?;
        Ok(answer)
    }
}
