//! leadflow: operator CLI for the lead assignment engine
//!
//! Runs the caller-facing operations against the SQLite store. Suitable for
//! cron: `leadflow sweep --limit 200` assigns whatever is still unowned.

mod commands;
mod output;
mod seed;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use leadflow_assignment_engine::logging::setup_logging;
use leadflow_assignment_engine::EngineConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Lead assignment, routing and SLA tracking", long_about = None)]
struct Cli {
    /// Configuration file (TOML); `LEADFLOW__*` variables override it
    #[arg(short, long, env = "LEADFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL, overriding the configuration
    #[arg(short, long, env = "LEADFLOW_DATABASE_URL")]
    database: Option<String>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or upgrade the database schema
    Migrate,

    /// Load calendars, holidays, agents, rules and leads from a JSON file
    Seed {
        file: PathBuf,
    },

    /// Assign one unowned lead
    Assign {
        lead_id: String,

        /// Accept agents who are currently off shift
        #[arg(long)]
        ignore_working_hours: bool,
    },

    /// Hand a lead to another agent
    Reassign {
        lead_id: String,
        agent_id: String,

        #[arg(short, long)]
        reason: String,

        /// Agent performing the change
        #[arg(short, long)]
        actor: String,
    },

    /// SLA status of one lead
    Sla {
        lead_id: String,
    },

    /// Overdue leads, earliest deadline first
    Overdue {
        #[arg(long)]
        agent: Option<String>,

        #[arg(long)]
        min_level: Option<u8>,
    },

    /// Open-lead load per agent
    Workloads,

    /// Assignment and compliance summary
    Stats,

    /// Assign unowned open leads, oldest first
    Sweep {
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },

    /// Assignment rule tools
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// Evaluate each condition of a rule against a lead
    Test {
        rule_id: String,
        lead_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(url) = &cli.database {
        config.database.url = url.clone();
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    config.logging.stderr = true;
    setup_logging(&config.logging)?;

    commands::run(cli.command, config, cli.json).await
}
