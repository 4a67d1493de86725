//! CLI command definitions and subcommands

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Neura - neuroscience-backed AI tutor
#[derive(Parser)]
#[command(
    name = "neura",
    about = "AI tutor: strategy simulation, milestone plans and adaptive teaching chat",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Quick feasibility check for a goal (no LLM)
    Check {
        /// Deadline (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        deadline: NaiveDate,

        /// Study hours per day
        #[arg(long)]
        hours: f64,

        /// Study days per week
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=7))]
        days: u32,

        /// Number of attached resources
        #[arg(long, default_value = "0")]
        resources: usize,
    },

    /// Manage goals
    Goal {
        #[command(subcommand)]
        command: GoalCommand,
    },

    /// Interactive session on the active goal
    Chat {
        /// Select this goal first
        #[arg(short, long)]
        goal: Option<String>,
    },

    /// Print the stored profile
    Profile,

    /// Show logs
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
}

/// Goal management subcommands
#[derive(Debug, Subcommand)]
pub enum GoalCommand {
    /// Create a goal, formulate its strategy and start the session
    New {
        /// Subject, e.g. "IGCSE Chemistry"
        #[arg(long)]
        subject: String,

        /// What you want to achieve
        #[arg(long)]
        goal: String,

        /// Deadline (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        deadline: NaiveDate,

        /// Study hours per day
        #[arg(long)]
        hours: f64,

        /// Study days per week
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=7))]
        days: u32,

        /// Attach a resource by file name (repeatable)
        #[arg(long = "resource", value_name = "PATH")]
        resources: Vec<PathBuf>,

        /// Look up official resources before formulating
        #[arg(long)]
        find_resources: bool,
    },

    /// List goals by subject
    List,

    /// Show a goal's timeline
    Show {
        /// Goal ID
        id: String,
    },

    /// Make a goal the active one
    Select {
        /// Goal ID
        id: String,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("neura")
        .join("logs")
        .join("neura.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// The after_help text pointing at the log file
pub fn generate_after_help() -> String {
    format!("Logs are written to: {}\n", get_log_path().display())
}
