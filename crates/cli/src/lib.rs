pub mod commands;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::report::ReportArgs;

#[derive(Debug, Parser)]
#[command(
    name = "tripdesk",
    about = "Tripdesk operator CLI",
    long_about = "Operate the travel desk database: migrations, demo data, config inspection, readiness checks and spend reports.",
    after_help = "Examples:\n  tripdesk doctor --json\n  tripdesk seed\n  tripdesk report --from 2024-04-01 --to 2024-04-30"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the idempotent demo dataset (employees, requests, reimbursements)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity and price lookup readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Compute the spend dashboard and reimbursement summary as JSON")]
    Report {
        #[arg(long, help = "Restrict requests and reimbursements to one user id")]
        user: Option<String>,
        #[arg(long, help = "First local day to include (YYYY-MM-DD)")]
        from: Option<NaiveDate>,
        #[arg(long, help = "Last local day to include (YYYY-MM-DD)")]
        to: Option<NaiveDate>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Report { user, from, to } => {
            commands::report::run(ReportArgs { user, from, to })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
