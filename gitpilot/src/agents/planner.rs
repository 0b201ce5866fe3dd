//! Plan generation for new tasks and for recovery after a failed step.

use anyhow::Result;
use tracing::{info, instrument};

use crate::agents::AgentClient;
use crate::core::classifier::{GitOperation, classify};
use crate::core::types::{GitStatusSnapshot, Plan, RecoveryContext};
use crate::error::ProviderError;
use crate::io::prompt::PLAN_SCHEMA;

/// Source of initial and recovery plans.
pub trait PlanProvider {
    fn generate_plan(&self, task: &str, status: &GitStatusSnapshot) -> Result<Plan>;

    fn generate_recovery_plan(&self, context: &RecoveryContext) -> Result<Plan>;
}

/// [`PlanProvider`] backed by the agent backend.
pub struct AgentPlanner<'a> {
    client: &'a AgentClient,
}

impl<'a> AgentPlanner<'a> {
    pub fn new(client: &'a AgentClient) -> Self {
        Self { client }
    }
}

impl PlanProvider for AgentPlanner<'_> {
    #[instrument(skip_all)]
    fn generate_plan(&self, task: &str, status: &GitStatusSnapshot) -> Result<Plan> {
        let prompt = self.client.prompts().render_plan(task, status)?;
        let plan: Plan = self.client.call("plan", prompt, PLAN_SCHEMA)?;
        reject_non_git_steps("plan", &plan)?;
        info!(steps = plan.steps.len(), safety = %plan.overall_safety, "plan generated");
        Ok(plan)
    }

    #[instrument(skip_all)]
    fn generate_recovery_plan(&self, context: &RecoveryContext) -> Result<Plan> {
        let prompt = self.client.prompts().render_recovery(context)?;
        let plan: Plan = self.client.call("recovery", prompt, PLAN_SCHEMA)?;
        reject_non_git_steps("recovery", &plan)?;
        info!(steps = plan.steps.len(), "recovery plan generated");
        Ok(plan)
    }
}

/// A plan with steps that do not invoke git counts as a malformed answer.
fn reject_non_git_steps(call: &'static str, plan: &Plan) -> Result<()> {
    let offending: Vec<&str> = plan
        .steps
        .iter()
        .filter(|step| classify(&step.command) == GitOperation::NotGit)
        .map(|step| step.command.as_str())
        .collect();
    if offending.is_empty() {
        return Ok(());
    }
    Err(ProviderError::Malformed {
        call,
        message: format!("plan contains non-git commands: {}", offending.join(", ")),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SafetyLevel;
    use crate::test_support::{ScriptedAgent, agent_client, plan_json};

    #[test]
    fn parses_agent_plan() {
        let agent = ScriptedAgent::answering(vec![plan_json(&["git add -A", "git commit"])]);
        let client = agent_client(agent.clone());
        let planner = AgentPlanner::new(&client);

        let plan = planner
            .generate_plan("commit everything", &GitStatusSnapshot::default())
            .expect("plan");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].command, "git commit");
        assert_eq!(plan.overall_safety, SafetyLevel::Safe);
        assert!(agent.prompts()[0].contains("commit everything"));
    }

    #[test]
    fn non_git_plan_is_malformed() {
        let agent = ScriptedAgent::answering(vec![plan_json(&["rm -rf .git"])]);
        let client = agent_client(agent);
        let planner = AgentPlanner::new(&client);

        let err = planner
            .generate_plan("start over", &GitStatusSnapshot::default())
            .expect_err("should reject");
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::Malformed { .. })
        ));
    }

    #[test]
    fn schema_violation_is_malformed() {
        let agent = ScriptedAgent::answering(vec![r#"{"steps": []}"#.to_string()]);
        let client = agent_client(agent);
        let planner = AgentPlanner::new(&client);

        let err = planner
            .generate_plan("anything", &GitStatusSnapshot::default())
            .expect_err("should reject");
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::Malformed { call: "plan", .. })
        ));
    }
}
