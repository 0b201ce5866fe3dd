//! gitpilot: natural-language git tasks with approval-gated execution.
//!
//! Exit codes are defined in `gitpilot::exit_codes`.

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use gitpilot::agents::AgentClient;
use gitpilot::agents::committer::AgentCommitWriter;
use gitpilot::agents::planner::AgentPlanner;
use gitpilot::core::{classifier, safety};
use gitpilot::engine::{DisplayPort, EnginePorts};
use gitpilot::error::ProviderError;
use gitpilot::exit_codes;
use gitpilot::io::agent::{AgentWorkspace, CommandAgent};
use gitpilot::io::config::{AssistantConfig, load_config, resolve_config_path, write_config};
use gitpilot::io::git::{Git, GitRunner};
use gitpilot::logging;
use gitpilot::session::{Session, SessionOptions, TaskOutcome};
use gitpilot::ui::TerminalUi;

#[derive(Parser)]
#[command(
    name = "gitpilot",
    version,
    about = "Turn plain-language git requests into approved, step-by-step plans"
)]
struct Cli {
    /// Debug-level diagnostics on stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Config file (default: $GITPILOT_CONFIG or ~/.config/gitpilot/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Plan and run a single task.
    Run {
        /// What you want git to do, in plain words.
        #[arg(required = true, num_args = 1..)]
        task: Vec<String>,
        /// Skip the whole-plan confirmation. Each step is still confirmed.
        #[arg(long)]
        yes_plan: bool,
        /// Write the final run state as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Interactive loop (the default).
    Shell,
    /// Show the repository status gitpilot plans against.
    Status,
    /// Check one git command against the safety rules without running it.
    Check {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Manage the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default config.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the effective config.
    Show,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            process::exit(exit_code_for(&err));
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config_path = resolve_config_path(cli.config.as_deref());
    match cli.command.unwrap_or(Command::Shell) {
        Command::Run {
            task,
            yes_plan,
            report,
        } => {
            let options = SessionOptions {
                auto_approve_plan: yes_plan,
                report_path: report,
            };
            cmd_run(
                &effective_config(config_path.as_deref())?,
                &current_dir()?,
                &task.join(" "),
                &options,
            )
        }
        Command::Shell => cmd_shell(&effective_config(config_path.as_deref())?, &current_dir()?),
        Command::Status => cmd_status(&effective_config(config_path.as_deref())?, &current_dir()?),
        Command::Check { command } => cmd_check(
            &effective_config(config_path.as_deref())?,
            &current_dir()?,
            &command.join(" "),
        ),
        Command::Config { action } => {
            let path = config_path.context("cannot locate config dir: set HOME or --config")?;
            match action {
                ConfigAction::Init { force } => cmd_config_init(&path, force),
                ConfigAction::Show => cmd_config_show(&path),
            }
        }
    }
}

fn effective_config(path: Option<&Path>) -> Result<AssistantConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(AssistantConfig::default()),
    }
}

fn current_dir() -> Result<PathBuf> {
    env::current_dir().context("resolve current directory")
}

/// Live collaborators for one process. The terminal UI borrows stdin for the
/// whole run.
struct Runtime {
    git: Git,
    client: AgentClient,
    cfg: AssistantConfig,
}

impl Runtime {
    fn new(cfg: &AssistantConfig, workdir: &Path) -> Result<Self> {
        let workspace = AgentWorkspace::new(workdir)?;
        let agent = Box::new(CommandAgent::from_config(&cfg.provider));
        Ok(Self {
            git: Git::new(workdir, &cfg.git),
            client: AgentClient::new(agent, workspace, cfg.provider.clone())?,
            cfg: cfg.clone(),
        })
    }

    fn run_task<R: BufRead, W: Write>(
        &self,
        ui: &TerminalUi<R, W>,
        task: &str,
        options: &SessionOptions,
    ) -> Result<TaskOutcome> {
        let planner = AgentPlanner::new(&self.client);
        let committer = AgentCommitWriter::new(&self.client, self.cfg.git.diff_limit_bytes);
        let ports = EnginePorts {
            interaction: ui,
            display: ui,
            git: &self.git,
            diffs: &self.git,
            planner: &planner,
            committer: &committer,
        };
        Session::new(ports, ui).run_task(task, options)
    }
}

fn cmd_run(
    cfg: &AssistantConfig,
    workdir: &Path,
    task: &str,
    options: &SessionOptions,
) -> Result<i32> {
    let runtime = Runtime::new(cfg, workdir)?;
    let ui = TerminalUi::new(io::stdin().lock(), io::stdout(), cfg.display.clone());
    Ok(match runtime.run_task(&ui, task, options)? {
        TaskOutcome::Completed { success: true } => exit_codes::OK,
        TaskOutcome::Completed { success: false } => exit_codes::FAILED,
        TaskOutcome::PlanDeclined => exit_codes::DECLINED,
    })
}

fn cmd_shell(cfg: &AssistantConfig, workdir: &Path) -> Result<i32> {
    let runtime = Runtime::new(cfg, workdir)?;
    let ui = TerminalUi::new(io::stdin().lock(), io::stdout(), cfg.display.clone());
    ui.show_welcome();
    let options = SessionOptions::default();
    loop {
        let Some(input) = ui.read_task()? else {
            return Ok(exit_codes::OK);
        };
        match input.to_lowercase().as_str() {
            "" => {}
            "h" | "help" => ui.show_help(),
            "q" | "quit" | "exit" => {
                if ui.confirm_exit()? {
                    return Ok(exit_codes::OK);
                }
            }
            _ => {
                if let Err(err) = runtime.run_task(&ui, &input, &options) {
                    eprintln!("{} {err:#}", "error:".red().bold());
                }
            }
        }
    }
}

fn cmd_status(cfg: &AssistantConfig, workdir: &Path) -> Result<i32> {
    let git = Git::new(workdir, &cfg.git);
    let status = git.status().context("capture git status")?;
    let ui = TerminalUi::new(io::empty(), io::stdout(), cfg.display.clone());
    ui.show_status(&status);
    Ok(exit_codes::OK)
}

fn cmd_check(cfg: &AssistantConfig, workdir: &Path, command: &str) -> Result<i32> {
    let git = Git::new(workdir, &cfg.git);
    let status = git.status().context("capture git status")?;
    let operation = classifier::classify(command);
    debug!(?operation, "classified");
    let report = safety::check_operation(&operation, &status);
    if report.is_clear() {
        println!("{} {command}", "ok:".green().bold());
        return Ok(exit_codes::OK);
    }
    println!("{} {command}", "blocked:".red().bold());
    for message in report.messages() {
        println!("  - {message}");
    }
    Ok(exit_codes::FAILED)
}

fn cmd_config_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    write_config(path, &AssistantConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_config_show(path: &Path) -> Result<i32> {
    let cfg = load_config(path)?;
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config toml")?);
    Ok(exit_codes::OK)
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err
        .chain()
        .any(|cause| cause.downcast_ref::<ProviderError>().is_some())
    {
        exit_codes::PROVIDER
    } else {
        exit_codes::INVALID
    }
}
