//! `gxp` command-line front end.
//!
//! Talks to the core through the same Op/Event channels a graphical client
//! would use.

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use colored::Colorize;
use gxp_core::config::loader::{load_settings, load_settings_file};
use gxp_core::init::{generate_structure, InitOptions};
use gxp_core::logging::{init_tracing, init_verbose_tracing};
use gxp_core::orchestrator::{run_service, StageManager};
use gxp_core::project::{discover_projects, ProjectConfig, ProjectRegistry};
use gxp_core::stages::StageCatalog;
use gxp_protocol::ipc::{Event, Op};
use gxp_protocol::settings_models::Settings;
use gxp_protocol::stage_models::CompletionStatus;
use gxp_protocol::task_models::FailureKind;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Exit code for missing or invalid stage parameters.
const EXIT_VALIDATION: i32 = 2;

/// Exit code for a cancelled run, as after SIGINT.
const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Parser)]
#[command(name = "gxp", version, about = "Run genomics analysis stages")]
struct Cli {
    /// Log debug output unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write .gxp/settings.toml from the built-in template
    Init {
        /// Directory to initialize
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,

        /// Also write a project.properties template
        #[arg(long)]
        project: bool,
    },

    /// List the available stages and their parameters
    Stages {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show which stages of a project are completed
    Status {
        #[arg(short, long)]
        project: PathBuf,
    },

    /// Run one stage of a project
    Run {
        /// Stage code, e.g. align
        stage: String,

        #[arg(short, long)]
        project: PathBuf,

        /// Settings file (default: ./.gxp/settings.toml)
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Override a parameter, e.g. --set threads=8
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        overrides: Vec<(String, String)>,
    },

    /// Find project directories below a root directory
    Projects {
        #[arg(default_value = ".")]
        root: PathBuf,
    },
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    if cli.verbose {
        init_verbose_tracing();
    } else {
        init_tracing();
    }

    let code = match cli.command {
        Command::Init {
            dir,
            force,
            project,
        } => init(dir, force, project).await?,
        Command::Stages { json } => stages(json)?,
        Command::Status { project } => status(&project)?,
        Command::Run {
            stage,
            project,
            settings,
            overrides,
        } => run(stage, project, settings, overrides).await?,
        Command::Projects { root } => projects(&root)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn init(dir: PathBuf, force: bool, project: bool) -> Result<i32> {
    let options = InitOptions::new(dir).force(force).with_project(project);
    let written = generate_structure(options).await?;

    for path in written {
        println!("{} {}", "created".green(), path.display());
    }
    Ok(0)
}

fn stages(json: bool) -> Result<i32> {
    let infos = StageCatalog::standard().infos();

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(0);
    }

    for info in infos {
        println!("{:<8} {}", info.code.as_str().bold(), info.title);
        println!("         required: {}", info.required.join(", "));
        if !info.optional.is_empty() {
            println!("         optional: {}", info.optional.join(", ").dimmed());
        }
    }
    Ok(0)
}

fn status(project: &Path) -> Result<i32> {
    let config = ProjectConfig::open(project)?;

    for stage in StageCatalog::standard().iter() {
        let state = match config.completion(&stage.code()) {
            CompletionStatus::Completed(date) => format!("completed {date}").green(),
            CompletionStatus::Pending => "pending".yellow(),
        };
        println!("{:<8} {:<28} {}", stage.code, stage.title, state);
    }
    Ok(0)
}

fn projects(root: &Path) -> Result<i32> {
    let catalog = StageCatalog::standard();

    for dir in discover_projects(root)? {
        let config = ProjectConfig::open(&dir)?;
        let completed: Vec<&str> = catalog
            .iter()
            .filter(|stage| matches!(config.completion(&stage.code()), CompletionStatus::Completed(_)))
            .map(|stage| stage.code)
            .collect();

        let summary = if completed.is_empty() {
            "no stages completed".dimmed().to_string()
        } else {
            completed.join(", ")
        };
        println!("{}  {}", dir.display(), summary);
    }
    Ok(0)
}

fn load_run_settings(explicit: Option<&Path>) -> Result<Settings> {
    let settings = match explicit {
        Some(path) => load_settings_file(path)?,
        None => load_settings(&std::env::current_dir()?)?,
    };
    Ok(settings)
}

/// Run one stage through the service loop and return the process exit code.
async fn run(
    stage: String,
    project: PathBuf,
    settings: Option<PathBuf>,
    overrides: Vec<(String, String)>,
) -> Result<i32> {
    let settings = load_run_settings(settings.as_deref())?;

    let (ops_tx, ops_rx) = mpsc::channel::<Op>(32);
    let (events_tx, mut events_rx) = mpsc::channel::<Event>(256);

    let manager = Arc::new(StageManager::new(settings, events_tx.clone()));
    let registry = Arc::new(ProjectRegistry::new());
    let service = tokio::spawn(run_service(manager, registry, ops_rx, events_tx));

    let params: BTreeMap<String, String> = overrides.into_iter().collect();
    ops_tx
        .send(Op::StartStage {
            project: project.clone(),
            stage: stage.clone(),
            params,
        })
        .await
        .wrap_err("stage service stopped")?;

    let mut task_id = None;
    let mut cancel_requested = false;
    let mut progress: Option<f64> = Some(0.0);
    let mut stdout = std::io::stdout();

    let code = loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else {
                    break 1;
                };
                match event {
                    Event::TaskStarted { task_id: id, project, stage } => {
                        task_id = Some(id);
                        println!("{} {} for {}", "starting".cyan().bold(), stage, project);
                        if cancel_requested {
                            let _ = ops_tx.send(Op::CancelTask { task_id: id }).await;
                        }
                    }
                    Event::TaskProgress { progress: value, .. } => progress = value,
                    Event::TaskMessage { message, .. } => {
                        let percent = match progress {
                            Some(p) => format!("{:>3.0}%", p * 100.0),
                            None => " ...".to_string(),
                        };
                        println!("{} {}", format!("[{percent}]").blue(), message);
                    }
                    Event::TaskOutput { content, .. } => {
                        print!("{content}");
                        let _ = stdout.flush();
                    }
                    Event::TaskSucceeded { completed_at, .. } => {
                        println!("{} {} completed at {}", "done".green().bold(), stage, completed_at);
                        break 0;
                    }
                    Event::TaskFailed { kind, result_code, error, .. } => {
                        eprintln!("{} {}", "failed:".red().bold(), error);
                        if kind == FailureKind::ToolNotFound {
                            eprintln!("{}", "check the tool paths in .gxp/settings.toml".dimmed());
                        }
                        break result_code.filter(|c| *c != 0).unwrap_or(1);
                    }
                    Event::TaskCancelled { .. } => {
                        eprintln!("{} {}", "cancelled".yellow().bold(), stage);
                        break EXIT_CANCELLED;
                    }
                    Event::ValidationFailed { missing, .. } => {
                        eprintln!(
                            "{} missing or invalid parameters: {}",
                            "error:".red().bold(),
                            missing.join(", ")
                        );
                        break EXIT_VALIDATION;
                    }
                    Event::StageRejected { reason, .. } => {
                        eprintln!("{} {}", "error:".red().bold(), reason);
                        break 1;
                    }
                    Event::TaskSnapshot { .. } | Event::ActiveTasks { .. } => {}
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                cancel_requested = true;
                eprintln!("{}", "cancelling...".yellow());
                if let Some(id) = task_id {
                    let _ = ops_tx.send(Op::CancelTask { task_id: id }).await;
                }
            }
        }
    };

    let _ = ops_tx.send(Op::Shutdown).await;
    service
        .await
        .wrap_err("stage service panicked")?
        .map_err(|e| eyre!(e))?;

    Ok(code)
}
