pub mod manage;
pub mod process;
pub mod report;

use std::{env, path::PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use manage::{ProjectCommand, ResolveCommand, RuleCommand, TokenCommand};
use process::{kill_running_daemons, restart_daemon};
use report::{process_report_command, ReportCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::start_daemon,
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Whereabouts", version, long_about = None)]
#[command(about = "Local time tracker that attributes your activity to projects", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts the daemon for the application")]
    Init {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(
        about = "Run the daemon directly in the current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Stop the currently running daemon.")]
    Stop {},
    #[command(about = "Summarize attributed activity over a date range")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(about = "Manage projects")]
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    #[command(about = "Manage assignment rules")]
    Rule {
        #[command(subcommand)]
        command: RuleCommand,
    },
    #[command(about = "Dry-run the matcher against the current rules")]
    Resolve {
        #[command(subcommand)]
        command: ResolveCommand,
    },
    #[command(
        about = "Re-run assignment over already stored observations. Needed after rules change"
    )]
    Reassign {},
    #[command(about = "Store or read encrypted scanner tokens")]
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(
        CLI_PREFIX,
        &create_application_default_path()?,
        logging_level,
        args.log,
    )?;

    match args.commands {
        Commands::Init { .. } => {
            restart_daemon()?;
            Ok(())
        }
        Commands::Stop {} => {
            let process_name = env::current_exe()?;
            kill_running_daemons(&process_name);
            Ok(())
        }
        Commands::Serve { dir } => {
            start_daemon(dir.map_or_else(create_application_default_path, Ok)?).await?;
            Ok(())
        }
        Commands::Report { command } => process_report_command(command).await,
        Commands::Project { command } => manage::process_project_command(command),
        Commands::Rule { command } => manage::process_rule_command(command),
        Commands::Resolve { command } => manage::process_resolve_command(command),
        Commands::Reassign {} => manage::process_reassign().await,
        Commands::Token { command } => manage::process_token_command(command),
    }
}
