//! ChatSheet command-line interface
//!
//! Load CSV files into an embedded DuckDB database and ask questions about
//! them in plain language.

use anyhow::Result;
use chatsheet_logging::LogConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

use cli::{CsvSpec, GlobalOptions};

#[derive(Parser, Debug)]
#[command(name = "chatsheet", version, about = "Query CSV files in natural language")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// DuckDB database file (default: in-memory)
    #[arg(long, global = true, env = "CHATSHEET_DB")]
    db: Option<PathBuf>,

    /// Config file (default: ~/.chatsheet/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API key for the translation model
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Also allow INSERT, UPDATE and DELETE
    #[arg(long, global = true)]
    allow_writes: bool,

    /// Skip the translation model; questions are read as SQL
    #[arg(long, global = true)]
    offline: bool,

    /// Load a CSV before running the command, as path[:table]. Repeatable.
    #[arg(long = "csv", global = true, value_parser = cli::parse_csv_spec)]
    csv: Vec<CsvSpec>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a CSV file as a table and print its inferred schema
    Load {
        /// CSV file (header row first)
        csv: PathBuf,

        /// Table name (default: derived from the file name)
        #[arg(short, long)]
        table: Option<String>,

        /// Field delimiter
        #[arg(short, long)]
        delimiter: Option<char>,
    },

    /// Show loaded tables
    Schema {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask a question about the loaded tables
    Ask {
        question: String,

        /// Print the SQL that was run
        #[arg(long)]
        show_sql: bool,

        /// Print a natural-language summary
        #[arg(long)]
        summary: bool,

        /// Skip the summary even when the config enables it
        #[arg(long, conflicts_with = "summary")]
        no_summary: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate and run a SQL statement
    Sql {
        statement: String,

        /// Print a summary of the result
        #[arg(long)]
        summary: bool,

        /// Skip the summary even when the config enables it
        #[arg(long, conflicts_with = "summary")]
        no_summary: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive session
    Chat,
}

impl Commands {
    fn wants_json(&self) -> bool {
        match self {
            Commands::Schema { json } => *json,
            Commands::Ask { json, .. } | Commands::Sql { json, .. } => *json,
            Commands::Load { .. } | Commands::Chat => false,
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let options = GlobalOptions {
        db: cli.db,
        config: cli.config,
        api_key: cli.api_key,
        allow_writes: cli.allow_writes,
        offline: cli.offline,
        csv: cli.csv,
    };

    match cli.command {
        Commands::Load {
            csv,
            table,
            delimiter,
        } => cli::load(&options, &csv, table, delimiter),
        Commands::Schema { json } => cli::schema(&options, json),
        Commands::Ask {
            question,
            show_sql,
            summary,
            no_summary,
            json,
        } => cli::ask(
            &options,
            &question,
            show_sql,
            cli::flag_override(summary, no_summary),
            json,
        ),
        Commands::Sql {
            statement,
            summary,
            no_summary,
            json,
        } => cli::sql(
            &options,
            &statement,
            cli::flag_override(summary, no_summary),
            json,
        ),
        Commands::Chat => cli::chat(&options),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = cli.command.wants_json();

    if let Err(err) = chatsheet_logging::init_logging(LogConfig {
        app_name: "chatsheet",
        verbose: cli.verbose,
        log_to_file: true,
    }) {
        eprintln!("warning: logging setup incomplete: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:#}", err);
            }
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_summary_flag() {
        let cli = Cli::try_parse_from(["chatsheet", "sql", "SELECT 1", "--no-summary"]).unwrap();
        match cli.command {
            Commands::Sql {
                summary,
                no_summary,
                ..
            } => assert_eq!(cli::flag_override(summary, no_summary), Some(false)),
            _ => panic!("expected sql"),
        }

        let cli = Cli::try_parse_from(["chatsheet", "ask", "how many?"]).unwrap();
        match cli.command {
            Commands::Ask {
                summary,
                no_summary,
                ..
            } => assert_eq!(cli::flag_override(summary, no_summary), None),
            _ => panic!("expected ask"),
        }

        assert!(
            Cli::try_parse_from(["chatsheet", "sql", "SELECT 1", "--summary", "--no-summary"])
                .is_err()
        );
    }
}
