//! Deterministic classification of git command lines.
//!
//! Every command the engine handles is classified exactly once into a closed
//! [`GitOperation`]. The safety gate, the commit-message rewrite, and the
//! educational notes all branch on the variant instead of searching the raw
//! text, so `git log --grep=commit` is never mistaken for a commit.

/// Recognized git operation kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitOperation {
    /// Empty input or a program other than `git`.
    NotGit,
    Commit {
        /// `-m`, `-F`, `-C`, `--fixup`, `--no-edit` and friends.
        has_message: bool,
    },
    Push {
        /// `--force`, `-f`, `--force-with-lease`, or a `+refspec`.
        force: bool,
        /// Remote and refspec given, or `--all`/`--tags`/`--mirror`.
        explicit_refspec: bool,
        /// Branch names on the remote side of each explicit refspec, with
        /// `refs/heads/` stripped. `HEAD` is kept as written.
        destinations: Vec<String>,
    },
    Pull,
    Fetch,
    Merge {
        /// `--continue`, `--abort`, `--skip`, or `--quit`.
        control: bool,
    },
    Rebase {
        control: bool,
    },
    CherryPick {
        control: bool,
    },
    Reset {
        hard: bool,
    },
    Checkout {
        /// Restores files (`--`, `.`, `--ours`, `--theirs`) instead of
        /// switching branches.
        paths_only: bool,
        /// `checkout -- <paths>` or `checkout .` throws away worktree edits.
        /// Taking one side of a conflict with `--ours`/`--theirs` does not count.
        discards_worktree: bool,
    },
    Switch,
    Restore {
        /// False for `--staged`-only restores, which just unstage.
        worktree: bool,
    },
    Clean {
        force: bool,
    },
    Add,
    /// Any other git subcommand (`status`, `log`, `stash`, ...).
    Other(String),
}

impl GitOperation {
    /// Commands that move or rewrite the checked-out branch.
    pub fn changes_branch_state(&self) -> bool {
        matches!(
            self,
            GitOperation::Pull
                | GitOperation::Switch
                | GitOperation::Checkout {
                    paths_only: false,
                    ..
                }
                | GitOperation::Merge { control: false }
                | GitOperation::Rebase { control: false }
                | GitOperation::CherryPick { control: false }
        )
    }

    /// Commands that talk to a remote.
    pub fn needs_remote(&self) -> bool {
        matches!(
            self,
            GitOperation::Push { .. } | GitOperation::Pull | GitOperation::Fetch
        )
    }
}

/// Options of `git` itself that consume the following token.
const GLOBAL_OPTIONS_WITH_VALUE: &[&str] = &["-C", "-c", "--git-dir", "--work-tree", "--namespace"];

const CONTROL_FLAGS: &[&str] = &["--continue", "--abort", "--skip", "--quit"];

const COMMIT_MESSAGE_FLAGS: &[&str] = &[
    "-m",
    "--message",
    "-F",
    "--file",
    "-C",
    "--reuse-message",
    "-c",
    "--reedit-message",
    "--fixup",
    "--squash",
    "--no-edit",
];

/// Classify a command line.
///
/// Tokenization is shell-aware; input that cannot be split (an unbalanced
/// quote) falls back to whitespace splitting so a malformed command still gets
/// a best-effort classification instead of passing the gate unexamined.
pub fn classify(command: &str) -> GitOperation {
    let tokens = tokenize(command);
    let Some((program, rest)) = tokens.split_first() else {
        return GitOperation::NotGit;
    };
    if !is_git_program(program) {
        return GitOperation::NotGit;
    }

    let Some((subcommand, args)) = split_subcommand(rest) else {
        return GitOperation::Other(String::new());
    };

    match subcommand {
        "commit" => GitOperation::Commit {
            has_message: args.iter().any(|arg| is_commit_message_flag(arg)),
        },
        "push" => GitOperation::Push {
            force: args.iter().any(|arg| is_force_push_arg(arg)),
            explicit_refspec: positional(args).count() >= 2
                || args
                    .iter()
                    .any(|arg| matches!(arg.as_str(), "--all" | "--tags" | "--mirror")),
            destinations: positional(args)
                .skip(1)
                .filter_map(|refspec| refspec_destination(refspec))
                .collect(),
        },
        "pull" => GitOperation::Pull,
        "fetch" => GitOperation::Fetch,
        "merge" => GitOperation::Merge {
            control: has_control_flag(args),
        },
        "rebase" => GitOperation::Rebase {
            control: has_control_flag(args),
        },
        "cherry-pick" => GitOperation::CherryPick {
            control: has_control_flag(args),
        },
        "reset" => GitOperation::Reset {
            hard: args.iter().any(|arg| arg == "--hard"),
        },
        "checkout" => GitOperation::Checkout {
            paths_only: checkout_paths_only(args),
            discards_worktree: !takes_conflict_side(args) && checkout_discards_worktree(args),
        },
        "switch" => GitOperation::Switch,
        "restore" => GitOperation::Restore {
            worktree: restore_touches_worktree(args),
        },
        "clean" => GitOperation::Clean {
            force: args
                .iter()
                .any(|arg| arg == "--force" || short_cluster_has(arg, 'f'))
                && !args
                    .iter()
                    .any(|arg| arg == "--dry-run" || short_cluster_has(arg, 'n')),
        },
        "add" => GitOperation::Add,
        other => GitOperation::Other(other.to_string()),
    }
}

/// Add an explicit message to a commit command, quoting it for the shell.
///
/// The message goes before a `--` separator so it is never read as a pathspec.
pub fn with_commit_message(command: &str, message: &str) -> String {
    let mut tokens = tokenize(command);
    let Some(separator) = tokens.iter().position(|token| token == "--") else {
        return format!(
            "{} -m {}",
            command.trim_end(),
            shell_words::quote(message.trim())
        );
    };
    tokens.insert(separator, message.trim().to_string());
    tokens.insert(separator, "-m".to_string());
    shell_words::join(tokens)
}

/// Split a command line into argv tokens.
pub fn tokenize(command: &str) -> Vec<String> {
    match shell_words::split(command) {
        Ok(tokens) => tokens,
        Err(_) => command.split_whitespace().map(str::to_string).collect(),
    }
}

/// The only program gitpilot classifies as git and is willing to run.
pub fn is_git_program(program: &str) -> bool {
    program == "git"
}

fn split_subcommand(rest: &[String]) -> Option<(&str, &[String])> {
    let mut idx = 0;
    while idx < rest.len() {
        let token = rest[idx].as_str();
        if GLOBAL_OPTIONS_WITH_VALUE.contains(&token) {
            idx += 2;
            continue;
        }
        if token.starts_with('-') {
            idx += 1;
            continue;
        }
        return Some((token, &rest[idx + 1..]));
    }
    None
}

fn positional(args: &[String]) -> impl Iterator<Item = &String> {
    args.iter()
        .take_while(|arg| arg.as_str() != "--")
        .filter(|arg| !arg.starts_with('-'))
}

/// `-am` is `-a -m`; a cluster is any single-dash token.
fn short_cluster_has(arg: &str, flag: char) -> bool {
    arg.starts_with('-') && !arg.starts_with("--") && arg[1..].contains(flag)
}

fn is_commit_message_flag(arg: &str) -> bool {
    let name = arg.split_once('=').map_or(arg, |(name, _)| name);
    if COMMIT_MESSAGE_FLAGS.contains(&name) {
        return true;
    }
    ['m', 'F', 'C', 'c']
        .iter()
        .any(|flag| short_cluster_has(arg, *flag))
}

fn is_force_push_arg(arg: &str) -> bool {
    arg == "--force"
        || arg.starts_with("--force-with-lease")
        || arg == "--force-if-includes"
        || short_cluster_has(arg, 'f')
        || (arg.starts_with('+') && arg.len() > 1)
}

fn has_control_flag(args: &[String]) -> bool {
    args.iter().any(|arg| CONTROL_FLAGS.contains(&arg.as_str()))
}

fn checkout_discards_worktree(args: &[String]) -> bool {
    if let Some(sep) = args.iter().position(|arg| arg == "--") {
        return sep + 1 < args.len();
    }
    positional(args).any(|arg| arg == ".")
}

fn takes_conflict_side(args: &[String]) -> bool {
    args.iter().any(|arg| arg == "--ours" || arg == "--theirs")
}

fn checkout_paths_only(args: &[String]) -> bool {
    takes_conflict_side(args)
        || args.iter().any(|arg| arg == "--")
        || positional(args).any(|arg| arg == ".")
}

/// Remote-side branch of a push refspec; `None` when it is empty (`main:`).
fn refspec_destination(refspec: &str) -> Option<String> {
    let refspec = refspec.strip_prefix('+').unwrap_or(refspec);
    let destination = refspec
        .split_once(':')
        .map_or(refspec, |(_, destination)| destination);
    let destination = destination
        .strip_prefix("refs/heads/")
        .unwrap_or(destination);
    (!destination.is_empty()).then(|| destination.to_string())
}

fn restore_touches_worktree(args: &[String]) -> bool {
    let staged = args
        .iter()
        .any(|arg| arg == "--staged" || short_cluster_has(arg, 'S'));
    let worktree = args
        .iter()
        .any(|arg| arg == "--worktree" || short_cluster_has(arg, 'W'));
    worktree || !staged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_git_commands_are_rejected() {
        assert_eq!(classify(""), GitOperation::NotGit);
        assert_eq!(classify("rm -rf ."), GitOperation::NotGit);
        assert_eq!(classify("gitk --all"), GitOperation::NotGit);
    }

    #[test]
    fn commit_message_detection() {
        assert_eq!(
            classify("git commit"),
            GitOperation::Commit { has_message: false }
        );
        assert_eq!(
            classify("git commit -m 'fix: typo'"),
            GitOperation::Commit { has_message: true }
        );
        assert_eq!(
            classify("git commit -am wip"),
            GitOperation::Commit { has_message: true }
        );
        assert_eq!(
            classify("git commit --message=wip"),
            GitOperation::Commit { has_message: true }
        );
        assert_eq!(
            classify("git commit --amend --no-edit"),
            GitOperation::Commit { has_message: true }
        );
        assert_eq!(
            classify("git commit -a"),
            GitOperation::Commit { has_message: false }
        );
    }

    #[test]
    fn commit_word_in_arguments_is_not_a_commit() {
        assert_eq!(
            classify("git log --grep=commit"),
            GitOperation::Other("log".to_string())
        );
        assert_eq!(
            classify("git checkout commit-fixes"),
            GitOperation::Checkout {
                paths_only: false,
                discards_worktree: false
            }
        );
    }

    #[test]
    fn global_options_are_skipped() {
        assert_eq!(
            classify("git -C repo -c user.name=x push"),
            GitOperation::Push {
                force: false,
                explicit_refspec: false,
                destinations: vec![],
            }
        );
        assert_eq!(
            classify("git --no-pager log"),
            GitOperation::Other("log".to_string())
        );
    }

    #[test]
    fn push_flags() {
        assert_eq!(
            classify("git push --force-with-lease origin main"),
            GitOperation::Push {
                force: true,
                explicit_refspec: true,
                destinations: vec!["main".to_string()],
            }
        );
        assert_eq!(
            classify("git push origin +main"),
            GitOperation::Push {
                force: true,
                explicit_refspec: true,
                destinations: vec!["main".to_string()],
            }
        );
        assert_eq!(
            classify("git push -u origin feature"),
            GitOperation::Push {
                force: false,
                explicit_refspec: true,
                destinations: vec!["feature".to_string()],
            }
        );
        assert_eq!(
            classify("git push origin"),
            GitOperation::Push {
                force: false,
                explicit_refspec: false,
                destinations: vec![],
            }
        );
    }

    #[test]
    fn push_destinations_come_from_the_remote_side_of_refspecs() {
        let GitOperation::Push { destinations, .. } =
            classify("git push -f origin feature:main HEAD:refs/heads/release topic:")
        else {
            panic!("expected push");
        };
        assert_eq!(destinations, vec!["main", "release"]);
    }

    #[test]
    fn control_flags_mark_in_progress_operations() {
        assert_eq!(
            classify("git rebase --continue"),
            GitOperation::Rebase { control: true }
        );
        assert_eq!(
            classify("git merge main"),
            GitOperation::Merge { control: false }
        );
        assert_eq!(
            classify("git cherry-pick --abort"),
            GitOperation::CherryPick { control: true }
        );
    }

    #[test]
    fn destructive_worktree_operations() {
        assert_eq!(classify("git reset --hard HEAD~1"), GitOperation::Reset { hard: true });
        assert_eq!(classify("git reset --soft HEAD~1"), GitOperation::Reset { hard: false });
        assert_eq!(
            classify("git checkout -- src/main.rs"),
            GitOperation::Checkout {
                paths_only: true,
                discards_worktree: true
            }
        );
        assert_eq!(
            classify("git checkout ."),
            GitOperation::Checkout {
                paths_only: true,
                discards_worktree: true
            }
        );
        assert_eq!(
            classify("git restore --staged a.txt"),
            GitOperation::Restore { worktree: false }
        );
        assert_eq!(
            classify("git restore a.txt"),
            GitOperation::Restore { worktree: true }
        );
        assert_eq!(classify("git clean -fd"), GitOperation::Clean { force: true });
        assert_eq!(classify("git clean -nd"), GitOperation::Clean { force: false });
    }

    #[test]
    fn conflict_side_checkouts_only_touch_paths() {
        assert_eq!(
            classify("git checkout --theirs src/lib.rs"),
            GitOperation::Checkout {
                paths_only: true,
                discards_worktree: false
            }
        );
        assert_eq!(
            classify("git checkout --ours -- src/lib.rs"),
            GitOperation::Checkout {
                paths_only: true,
                discards_worktree: false
            }
        );
        assert!(!classify("git checkout --theirs src/lib.rs").changes_branch_state());
        assert!(!classify("git checkout -- src/lib.rs").changes_branch_state());
        assert!(classify("git checkout main").changes_branch_state());
        assert!(classify("git checkout -b topic").changes_branch_state());
    }

    #[test]
    fn only_bare_git_counts_as_git() {
        assert!(is_git_program("git"));
        assert!(!is_git_program("/usr/bin/git"));
        assert_eq!(classify("/usr/bin/git status"), GitOperation::NotGit);
    }

    #[test]
    fn amend_without_message_still_needs_one() {
        assert_eq!(
            classify("git commit --amend"),
            GitOperation::Commit { has_message: false }
        );
    }

    #[test]
    fn unbalanced_quotes_fall_back_to_whitespace() {
        assert_eq!(
            classify("git commit -m \"oops"),
            GitOperation::Commit { has_message: true }
        );
    }

    #[test]
    fn appended_message_is_shell_quoted() {
        let rewritten = with_commit_message("git commit -a ", "fix: handle user's input");
        assert!(rewritten.starts_with("git commit -a -m '"));
        assert_eq!(
            classify(&rewritten),
            GitOperation::Commit { has_message: true }
        );
        let tokens = tokenize(&rewritten);
        assert_eq!(tokens.last().map(String::as_str), Some("fix: handle user's input"));
    }

    #[test]
    fn message_goes_before_pathspec_separator() {
        let rewritten = with_commit_message("git commit -- notes.txt", "Add notes");
        assert_eq!(
            tokenize(&rewritten),
            vec!["git", "commit", "-m", "Add notes", "--", "notes.txt"]
        );
        assert_eq!(
            classify(&rewritten),
            GitOperation::Commit { has_message: true }
        );
    }
}
