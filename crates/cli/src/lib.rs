pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tagwatch",
    about = "Tagwatch operator CLI",
    long_about = "Operate tagwatch migrations, runtime configuration, and readiness checks.",
    after_help = "Examples:\n  tagwatch migrate\n  tagwatch config set zendesk_subdomain acme\n  tagwatch doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Inspect or edit the runtime configuration table")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    #[command(about = "Validate process config, database connectivity, and runtime keys")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    #[command(about = "List all configuration keys (secrets redacted)")]
    List,
    #[command(about = "Print one configuration value (secrets redacted)")]
    Get { key: String },
    #[command(about = "Set a configuration value")]
    Set { key: String, value: String },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config { action } => match action {
            ConfigAction::List => commands::config::list(),
            ConfigAction::Get { key } => commands::config::get(&key),
            ConfigAction::Set { key, value } => commands::config::set(&key, &value),
        },
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
