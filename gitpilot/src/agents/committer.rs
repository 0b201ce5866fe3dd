//! Commit messages written from the staged diff.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::agents::AgentClient;
use crate::io::prompt::COMMIT_MESSAGE_SCHEMA;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMessage {
    pub message: String,
    /// Why the message fits the change; shown to the user, never committed.
    pub explanation: String,
}

pub trait CommitMessageWriter {
    fn generate(&self, diff: &str) -> Result<CommitMessage>;
}

/// [`CommitMessageWriter`] backed by the agent backend.
pub struct AgentCommitWriter<'a> {
    client: &'a AgentClient,
    diff_limit_bytes: usize,
}

impl<'a> AgentCommitWriter<'a> {
    pub fn new(client: &'a AgentClient, diff_limit_bytes: usize) -> Self {
        Self {
            client,
            diff_limit_bytes,
        }
    }
}

impl CommitMessageWriter for AgentCommitWriter<'_> {
    #[instrument(skip_all, fields(diff_bytes = diff.len()))]
    fn generate(&self, diff: &str) -> Result<CommitMessage> {
        let (shown, truncated) = truncate_at_char_boundary(diff, self.diff_limit_bytes);
        if truncated {
            debug!(limit = self.diff_limit_bytes, "diff truncated for commit message");
        }
        let prompt = self
            .client
            .prompts()
            .render_commit_message(shown, truncated)?;
        let mut answer: CommitMessage =
            self.client.call("commit_message", prompt, COMMIT_MESSAGE_SCHEMA)?;
        answer.message = answer.message.trim().to_string();
        Ok(answer)
    }
}

fn truncate_at_char_boundary(text: &str, limit: usize) -> (&str, bool) {
    if text.len() <= limit {
        return (text, false);
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedAgent, agent_client};

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_at_char_boundary("abc", 10), ("abc", false));
        assert_eq!(truncate_at_char_boundary("abcdef", 3), ("abc", true));
        // "é" is two bytes; cutting inside it backs off to the previous boundary.
        assert_eq!(truncate_at_char_boundary("aé", 2), ("a", true));
    }

    #[test]
    fn generates_trimmed_message_from_truncated_diff() {
        let agent = ScriptedAgent::answering(vec![
            r#"{"message": "  Add greeting\n", "explanation": "adds a file"}"#.to_string(),
        ]);
        let client = agent_client(agent.clone());
        let writer = AgentCommitWriter::new(&client, 8);

        let answer = writer.generate("+hello world\n+more\n").expect("message");
        assert_eq!(answer.message, "Add greeting");
        assert_eq!(answer.explanation, "adds a file");

        let prompt = &agent.prompts()[0];
        assert!(prompt.contains("+hello w"));
        assert!(!prompt.contains("+more"));
        assert!(prompt.contains("cut short"));
    }
}
