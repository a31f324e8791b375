pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "krishi",
    about = "Krishi operator CLI",
    long_about = "Inspect Krishi configuration, check readiness, and run offline spoilage and market lookups.",
    after_help = "Examples:\n  krishi doctor --json\n  krishi config\n  krishi spoilage --crop Wheat --temp 28 --humidity 75 --days 30\n  krishi market --crop Rice --region \"Azadpur (Delhi)\""
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
    #[command(about = "Validate config, model credentials, and static asset readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Estimate spoilage risk from the built-in crop table")]
    Spoilage {
        #[arg(long, help = "Crop name, matched against the built-in table")]
        crop: String,
        #[arg(long, allow_negative_numbers = true, help = "Storage temperature in °C")]
        temp: f64,
        #[arg(long, help = "Relative humidity in percent")]
        humidity: f64,
        #[arg(long, help = "Days in storage")]
        days: f64,
    },
    #[command(about = "Show the deterministic daily market snapshot for a static baseline")]
    Market {
        #[arg(long)]
        crop: String,
        #[arg(long)]
        region: String,
        #[arg(long, help = "Snapshot date as YYYY-MM-DD; defaults to today (UTC)")]
        date: Option<String>,
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
        Command::Spoilage { crop, temp, humidity, days } => {
            commands::spoilage::run(&crop, temp, humidity, days)
        }
        Command::Market { crop, region, date } => {
            commands::market::run(&crop, &region, date.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
