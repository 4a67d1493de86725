//! Neura - AI tutor
//!
//! CLI entry point: goal management, feasibility checks and the interactive
//! tutoring session.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result, bail};
use tracing::{debug, info};

use neura::cli::{Cli, Command, GoalCommand, generate_after_help, get_log_path};
use neura::config::Config;
use neura::domain::{ClassifiedResource, Feasibility, GoalFormPayload, days_until, find_goal, merge_found_resources};
use neura::llm::create_client;
use neura::prompts::PromptLoader;
use neura::repl::{ChatRepl, render};
use neura::state::{Action, Applied, StateManager, Store};
use neura::tutor::{ResourceFinder, Tutor};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(model = %config.llm.model, data_dir = %config.storage.data_dir.display(), "Neura loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Check {
            deadline,
            hours,
            days,
            resources,
        }) => cmd_check(deadline, hours, days, resources),
        Some(Command::Goal { command }) => match command {
            GoalCommand::New {
                subject,
                goal,
                deadline,
                hours,
                days,
                resources,
                find_resources,
            } => {
                let form = GoalForm {
                    subject,
                    goal,
                    deadline,
                    hours,
                    days,
                    resources,
                    find_resources,
                };
                cmd_goal_new(&config, form).await
            }
            GoalCommand::List => cmd_goal_list(&config),
            GoalCommand::Show { id } => cmd_goal_show(&config, &id),
            GoalCommand::Select { id } => cmd_goal_select(&config, &id).await,
        },
        Some(Command::Chat { goal }) => cmd_chat(&config, goal.as_deref()).await,
        None => cmd_chat(&config, None).await,
        Some(Command::Profile) => cmd_profile(&config),
        Some(Command::Logs { lines }) => cmd_logs(lines),
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Quick feasibility check (no LLM)
fn cmd_check(deadline: NaiveDate, hours: f64, days: u32, resources: usize) -> Result<()> {
    debug!(%deadline, hours, days, resources, "cmd_check: called");
    let today = today();
    let check = Feasibility::assess(deadline, hours, days, resources, today);

    println!("Days until deadline: {}", days_until(deadline, today));
    println!("Available hours:     {:.1}", check.available_hours);
    println!("Estimated hours:     {:.1}", check.estimated_hours);
    match check.nudge {
        Some(nudge) => println!("{}", nudge.yellow()),
        None => println!("{}", "This timeline looks comfortable.".green()),
    }
    Ok(())
}

struct GoalForm {
    subject: String,
    goal: String,
    deadline: NaiveDate,
    hours: f64,
    days: u32,
    resources: Vec<PathBuf>,
    find_resources: bool,
}

fn build_tutor(config: &Config, state: StateManager) -> Result<(Tutor, ResourceFinder)> {
    config.validate()?;
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let root = std::env::current_dir().context("Failed to read current directory")?;
    let prompts = Arc::new(PromptLoader::new(root));
    let finder = ResourceFinder::new(llm.clone(), prompts.clone(), &config.llm.fast_model);
    Ok((Tutor::new(llm, prompts, state, &config.tutor), finder))
}

async fn cmd_goal_new(config: &Config, form: GoalForm) -> Result<()> {
    debug!(subject = %form.subject, goal = %form.goal, "cmd_goal_new: called");
    if form.subject.trim().is_empty() || form.goal.trim().is_empty() {
        bail!("Both --subject and --goal are required");
    }

    let state = StateManager::spawn(&config.storage.data_dir)?;
    let (tutor, finder) = build_tutor(config, state.clone())?;

    let mut resources: Vec<ClassifiedResource> = form
        .resources
        .iter()
        .map(|path| {
            let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            ClassifiedResource::from_file_name(&name)
        })
        .collect();

    if form.find_resources {
        println!("{}", "Looking for official resources...".dimmed());
        let profile = state.snapshot().await?.profile;
        let found = finder.find(&form.subject, &form.goal, &profile).await;
        let added = merge_found_resources(&mut resources, &found);
        for resource in &found {
            println!("  {} <{}>", resource.title, resource.uri);
        }
        println!("Added {} resource(s).", added);
    }

    let payload = GoalFormPayload::new(
        form.subject,
        form.goal,
        form.deadline,
        form.hours,
        form.days,
        resources,
        today(),
    );
    if let Some(nudge) = &payload.feasibility.nudge {
        println!("{}", nudge.yellow());
    }

    ChatRepl::new(tutor).run(Some(payload)).await?;
    state.shutdown().await?;
    Ok(())
}

fn cmd_goal_list(config: &Config) -> Result<()> {
    debug!("cmd_goal_list: called");
    let snapshot = Store::open(&config.storage.data_dir)?.load()?;
    println!(
        "{}",
        render::goal_list(&snapshot.subjects, snapshot.active_goal_id.as_deref())
    );
    Ok(())
}

fn cmd_goal_show(config: &Config, id: &str) -> Result<()> {
    debug!(%id, "cmd_goal_show: called");
    let snapshot = Store::open(&config.storage.data_dir)?.load()?;
    let Some((subject, goal)) = find_goal(&snapshot.subjects, id) else {
        bail!("No goal with ID {}", id);
    };
    println!("{}", subject.dimmed());
    println!("{}", render::timeline(goal));
    Ok(())
}

async fn cmd_goal_select(config: &Config, id: &str) -> Result<()> {
    debug!(%id, "cmd_goal_select: called");
    let state = StateManager::spawn(&config.storage.data_dir)?;
    let applied = state
        .dispatch(Action::GoalSelected { goal_id: id.to_string() })
        .await?;
    state.shutdown().await?;
    if applied == Applied::Ignored {
        bail!("No goal with ID {}", id);
    }
    println!("Active goal: {}", id);
    Ok(())
}

async fn cmd_chat(config: &Config, goal: Option<&str>) -> Result<()> {
    debug!(?goal, "cmd_chat: called");
    let state = StateManager::spawn(&config.storage.data_dir)?;
    if let Some(id) = goal {
        let applied = state
            .dispatch(Action::GoalSelected { goal_id: id.to_string() })
            .await?;
        if applied == Applied::Ignored {
            bail!("No goal with ID {}", id);
        }
    }
    let (tutor, _) = build_tutor(config, state.clone())?;
    ChatRepl::new(tutor).run(None).await?;
    state.shutdown().await?;
    Ok(())
}

fn cmd_profile(config: &Config) -> Result<()> {
    debug!("cmd_profile: called");
    let snapshot = Store::open(&config.storage.data_dir)?.load()?;
    let json = serde_json::to_string_pretty(&snapshot.profile).context("Failed to serialize profile")?;
    println!("{}", json);
    Ok(())
}

fn cmd_logs(lines: usize) -> Result<()> {
    debug!(lines, "cmd_logs: called");
    let log_path = get_log_path();

    if !log_path.exists() {
        debug!(?log_path, "cmd_logs: log file does not exist");
        println!("No log file found at: {}", log_path.display());
        return Ok(());
    }

    let file = fs::File::open(&log_path).context("Failed to open log file")?;
    let reader = BufReader::new(file);
    let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

    let start = all_lines.len().saturating_sub(lines);
    for line in &all_lines[start..] {
        println!("{}", line);
    }
    Ok(())
}
