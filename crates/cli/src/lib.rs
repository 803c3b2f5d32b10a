pub mod commands;

use std::io;
use std::process::ExitCode;

use aide_core::config::{AppConfig, LogFormat};
use clap::{Parser, Subcommand};

use crate::commands::review::ReviewRequest;

#[derive(Debug, Parser)]
#[command(
    name = "aide",
    about = "Personal assistant operator CLI",
    long_about = "Inspect configuration, check readiness, and review gated assistant actions.",
    after_help = "Examples:\n  aide doctor --json\n  aide gates\n  aide review --tool send_email --args '{\"to\":[\"bob@example.com\"],\"subject\":\"Hi\",\"body\":\"Hello\"}'"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Google OAuth files, and review gate wiring")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List the tools that require human review before they run")]
    Gates,
    #[command(about = "Review one tool call interactively and run it against dry-run services")]
    Review {
        #[arg(long, help = "Tool name, e.g. send_email")]
        tool: String,
        #[arg(long, help = "Tool arguments as a JSON object")]
        args: String,
        #[arg(long, help = "Description shown to the reviewer instead of the default")]
        description: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Gates => commands::gates::run(),
        Command::Review { tool, args, description } => {
            commands::review::run(ReviewRequest { tool, args, description })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays reserved for prompts and JSON results.
pub fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder =
        tracing_subscriber::fmt().with_target(false).with_max_level(log_level).with_writer(io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
