mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use grader::{exit_codes, logging};

#[derive(Parser)]
#[command(
    name = "grader",
    version,
    about = "Batch grader for student compiler submissions"
)]
struct Cli {
    /// Grader config (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "grader.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List submissions: valid instances and invalid ones with their reason.
    Instances {
        #[arg(long)]
        json: bool,
    },
    /// List test suites under the testcases directory.
    Suites {
        #[arg(long)]
        json: bool,
    },
    /// List test cases across all suites.
    Cases {
        /// Keep cases whose name contains this text (repeatable).
        #[arg(long = "match", value_name = "TEXT")]
        patterns: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Extract valid instances into the cache.
    Extract {
        /// Instance name, archive file name or archive path (repeatable).
        #[arg(long = "compiler", value_name = "NAME")]
        compilers: Vec<String>,
        /// Single archive to extract, inside or outside the archives directory.
        #[arg(long, value_name = "ZIP", conflicts_with = "compilers")]
        project: Option<PathBuf>,
    },
    /// Scaffold the next `testcaseN/` directory in a suite.
    NewCase {
        /// Suite directory, relative to the testcases directory.
        suite: PathBuf,
    },
    /// Remove the extraction cache.
    Clean,
    /// Write a config file with every default spelled out.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = || grader::io::config::load_config(&cli.config);
    match cli.command {
        Command::Instances { json } => cli::list_instances(&config()?, json),
        Command::Suites { json } => cli::list_suites(&config()?, json),
        Command::Cases { patterns, json } => cli::list_cases(&config()?, &patterns, json),
        Command::Extract { compilers, project } => {
            cli::extract(&config()?, &compilers, project.as_deref())
        }
        Command::NewCase { suite } => cli::new_case(&config()?, &suite),
        Command::Clean => cli::clean(&config()?),
        Command::InitConfig { force } => cli::init_config(&cli.config, force),
    }
}
