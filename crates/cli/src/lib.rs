pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "pagebot",
    about = "Pagebot operator CLI",
    long_about = "Inspect pagebot configuration, check Cloud SQL and vector store readiness, and ask the retrieval QA chain a question without going through Slack.",
    after_help = "Examples:\n  pagebot doctor --json\n  pagebot config\n  pagebot ask \"What is the VPN policy?\""
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
    #[command(about = "Validate config, database connectivity and vector collection presence")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Answer a question with the retrieval QA chain, as a mention would")]
    Ask {
        #[arg(help = "Question text; the Japanese answer instruction is appended")]
        question: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Ask { question } => commands::ask::run(&question),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
