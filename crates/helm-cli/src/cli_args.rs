//! Command-line surface. Kept intentionally thin (SPEC_FULL §1.1): it
//! exists so the crate is runnable, not as a deliverable surface in its
//! own right.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "helm")]
#[command(about = "Drives Chromium over CDP and lets an LLM plan and execute multi-step browser/file/shell tasks")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to ~/.helm/config.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Workspace directory (defaults to the configured agent workspace)
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Named browser profile to use
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Override the configured provider
    #[arg(long)]
    pub provider: Option<String>,

    /// Override the configured model
    #[arg(long)]
    pub model: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Task to run in single-shot mode when no subcommand is given
    pub task: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one task and print the final answer
    Run {
        task: String,
        /// Force the task decomposer on, regardless of config
        #[arg(long)]
        decompose: bool,
    },
    /// Start an interactive multi-turn session
    Repl,
    /// Deep-research a query into a compiled report
    Research {
        query: String,
        #[arg(long, default_value_t = 5)]
        topics: usize,
    },
    /// Session store operations
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Scheduled task operations
    Cron {
        #[command(subcommand)]
        action: CronAction,
    },
    /// Print the resolved configuration
    Config,
}

#[derive(Subcommand)]
pub enum SessionAction {
    List,
    Show { id: String },
}

#[derive(Subcommand)]
pub enum CronAction {
    Create {
        name: String,
        task: String,
        #[arg(long)]
        interval_minutes: Option<u64>,
        #[arg(long)]
        cron: Option<String>,
    },
    List,
    Pause { id: String },
    Resume { id: String },
    Delete { id: String },
}
