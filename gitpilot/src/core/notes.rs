//! Fixed educational notes and lessons attached to executed steps.

use crate::core::classifier::GitOperation;

pub const COMMIT_NOTE_SUFFIX: &str = "this creates a permanent snapshot in git history";
pub const COMMIT_LESSON: &str = "commits create permanent snapshots of your staged changes";
pub const PUSH_NOTE_SUFFIX: &str = "this shares your commits with the remote repository";
pub const PUSH_LESSON: &str = "pushing makes your commits available to collaborators";

/// A note suffix and the lesson it teaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lesson {
    pub note_suffix: &'static str,
    pub lesson: &'static str,
}

/// Lesson taught by a successful operation, if any.
pub fn lesson_for(operation: &GitOperation) -> Option<Lesson> {
    match operation {
        GitOperation::Commit { .. } => Some(Lesson {
            note_suffix: COMMIT_NOTE_SUFFIX,
            lesson: COMMIT_LESSON,
        }),
        GitOperation::Push { .. } => Some(Lesson {
            note_suffix: PUSH_NOTE_SUFFIX,
            lesson: PUSH_LESSON,
        }),
        _ => None,
    }
}

/// Append `suffix` to a pre-authored note, separated by one space.
pub fn extend_note(note: &str, suffix: &str) -> String {
    let note = note.trim_end();
    if note.is_empty() {
        return suffix.to_string();
    }
    format!("{note} {suffix}")
}

/// Lesson recorded when a command fails and recovery is attempted.
pub fn recovery_lesson(error: &str) -> String {
    format!("learned to recover from: {}", error.trim())
}
