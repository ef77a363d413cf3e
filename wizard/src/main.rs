//! Wizard execution engine CLI.
//!
//! Every traversal command takes the current state as `--path` (empty means
//! "start the flow"), applies one operation and prints the resulting path.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use wizard::exit_codes;
use wizard::io::config::load_config;
use wizard::io::init::{InitOptions, WizardPaths, init_wizard};
use wizard::logging;
use wizard::session::{Operation, Session};

#[derive(Parser)]
#[command(name = "wizard", version, about = "Wizard flow execution engine")]
struct Cli {
    /// Project root containing `.wizard/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Flow document to use instead of the configured one.
    #[arg(long, global = true)]
    flow: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.wizard/config.toml` and a sample flow if missing.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Compile the flow document and report problems.
    Validate,
    /// Print a JSON summary of the state at `--path`.
    Show {
        #[arg(long, default_value = "")]
        path: String,
    },
    /// Print the execute ids reachable from `--path`, one per line.
    Next {
        #[arg(long, default_value = "")]
        path: String,
    },
    /// Move to the next allowed action, optionally merging context first.
    Advance {
        #[arg(long, default_value = "")]
        path: String,
        /// Execute id to move to.
        #[arg(long)]
        action: Option<String>,
        /// Context update as `key=value` (value in path encoding).
        #[arg(long = "set")]
        set: Vec<String>,
    },
    /// Run a command on the current action, then advance.
    Exec {
        #[arg(long, default_value = "")]
        path: String,
        command: String,
        /// Arguments in their path encoding.
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Drop a position (default: the current one) and everything after it.
    Close {
        #[arg(long, default_value = "")]
        path: String,
        key_path: Option<String>,
    },
    /// Keep the trace up to and including a position.
    ReturnTo {
        #[arg(long, default_value = "")]
        path: String,
        key_path: String,
    },
    /// Swap a position for another action.
    Replace {
        #[arg(long, default_value = "")]
        path: String,
        key_path: String,
        next: String,
        /// Do not take a default step after landing.
        #[arg(long)]
        no_advance: bool,
    },
    /// Replace an entity everywhere in the trace.
    UpdateEntity {
        #[arg(long, default_value = "")]
        path: String,
        /// Entity as `type:id[!state,...]`.
        prev: String,
        next: String,
    },
    /// Set UI scratch state on a position.
    SetState {
        #[arg(long, default_value = "")]
        path: String,
        #[arg(long)]
        key_path: Option<String>,
        /// Entries as `key=value`.
        #[arg(long = "set")]
        set: Vec<String>,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let paths = WizardPaths::new(&cli.root);
    let config = load_config(&paths.config_path)?;
    logging::init(&config.log_filter);

    let flow = cli.flow.as_deref();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Validate => cmd_validate(&cli.root, flow),
        Command::Show { path } => cmd_show(&cli.root, flow, &path),
        Command::Next { path } => cmd_next(&cli.root, flow, &path),
        Command::Advance { path, action, set } => {
            cmd_apply(&cli.root, flow, &path, Operation::Advance { action, set })
        }
        Command::Exec {
            path,
            command,
            args,
        } => cmd_apply(&cli.root, flow, &path, Operation::Exec { command, args }),
        Command::Close { path, key_path } => {
            cmd_apply(&cli.root, flow, &path, Operation::Close { key_path })
        }
        Command::ReturnTo { path, key_path } => {
            cmd_apply(&cli.root, flow, &path, Operation::ReturnTo { key_path })
        }
        Command::Replace {
            path,
            key_path,
            next,
            no_advance,
        } => cmd_apply(
            &cli.root,
            flow,
            &path,
            Operation::Replace {
                key_path,
                next,
                try_advance: no_advance.then_some(false),
            },
        ),
        Command::UpdateEntity { path, prev, next } => cmd_apply(
            &cli.root,
            flow,
            &path,
            Operation::UpdateEntity { prev, next },
        ),
        Command::SetState {
            path,
            key_path,
            set,
        } => cmd_apply(&cli.root, flow, &path, Operation::SetState { key_path, set }),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_wizard(root, &InitOptions { force })?;
    println!("{}", paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(root: &Path, flow: Option<&Path>) -> Result<i32> {
    let session = Session::open(root, flow)?;
    println!(
        "ok: {} actions, {} instructions",
        session.program.actions().count(),
        session.program.len()
    );
    Ok(exit_codes::OK)
}

fn cmd_show(root: &Path, flow: Option<&Path>, path: &str) -> Result<i32> {
    let session = Session::open(root, flow)?;
    let graph = session.replay(path)?;
    let summary = session.summarize(&graph)?;
    let payload = serde_json::to_string_pretty(&summary).context("serialize summary")?;
    println!("{payload}");
    Ok(exit_codes::OK)
}

fn cmd_next(root: &Path, flow: Option<&Path>, path: &str) -> Result<i32> {
    let session = Session::open(root, flow)?;
    let graph = session.replay(path)?;
    let next = graph.next_actions()?;
    if next.is_empty() {
        return Ok(exit_codes::COMPLETE);
    }
    for candidate in &next {
        println!("{}", candidate.execute_id());
    }
    Ok(exit_codes::OK)
}

fn cmd_apply(root: &Path, flow: Option<&Path>, path: &str, operation: Operation) -> Result<i32> {
    let session = Session::open(root, flow)?;
    let graph = session.replay(path)?;
    let next = session.apply(&graph, &operation)?;
    let summary = session.summarize(&next)?;
    println!("{}", summary.path);
    Ok(exit_codes::OK)
}
