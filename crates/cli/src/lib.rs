pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "deptflow",
    about = "Department workflow orchestration CLI",
    long_about = "Classify requests, run cross-department workflows, inspect departments and \
                  configuration, and manage the campus database.",
    after_help = "Examples:\n  deptflow classify \"I need to request leave for next week\"\n  \
                  deptflow run --in-memory \"Change the subjects for students going on internship\"\n  \
                  deptflow seed"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Classify a request and show the routing decision")]
    Classify { text: String },
    #[command(about = "Handle a request end to end, executing any synthesized workflow")]
    Run {
        text: String,
        #[arg(long, help = "Use the built-in campus seed instead of the configured database")]
        in_memory: bool,
    },
    #[command(about = "List department agents with their capabilities and status")]
    Departments,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load and verify the campus seed dataset")]
    Seed,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Classify { text } => commands::classify::run(&text),
        Command::Run { text, in_memory } => commands::run::run(&text, in_memory),
        Command::Departments => commands::departments::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
