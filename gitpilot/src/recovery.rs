//! Assembles failure context and asks the plan provider for a way forward.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::agents::planner::PlanProvider;
use crate::core::state::RunState;
use crate::core::types::{GitStatusSnapshot, Plan, RecoveryContext, StepResult};

pub struct RecoveryCoordinator<'a> {
    provider: &'a dyn PlanProvider,
}

impl<'a> RecoveryCoordinator<'a> {
    pub fn new(provider: &'a dyn PlanProvider) -> Self {
        Self { provider }
    }

    /// No retries and no shape checks here; provider errors end the run.
    #[instrument(skip_all, fields(failed = %failed.command))]
    pub fn build_recovery_plan(
        &self,
        state: &RunState,
        failed: &StepResult,
        fresh_status: &GitStatusSnapshot,
        completed: &[StepResult],
    ) -> Result<Plan> {
        let context = RecoveryContext {
            task: state.task.clone(),
            original_plan: state.plan.clone(),
            failed: failed.clone(),
            status: fresh_status.clone(),
            completed: completed.to_vec(),
        };
        let plan = self
            .provider
            .generate_recovery_plan(&context)
            .context("generate recovery plan")?;
        info!(steps = plan.steps.len(), "recovery plan ready");
        Ok(plan)
    }
}
