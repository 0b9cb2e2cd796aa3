#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use isolate_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "isolate")]
#[command(author, version, about = "Bundle unpublished workspace dependencies into standalone package archives", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// npm executable used for pack, install and run
    #[arg(long, global = true, env = "ISOLATE_NPM", value_name = "PATH")]
    npm: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Isolate packages and write their archives
    Bundle {
        /// Packages to isolate (default: every package, narrowed by --scope)
        packages: Vec<String>,

        /// Only packages in this registry scope
        #[arg(long)]
        scope: Option<String>,

        /// Also store the extracted package tree
        #[arg(short, long)]
        extract: bool,

        /// Version-neutral artifact names
        #[arg(short, long)]
        neutral: bool,

        /// Also store a zip of the package tree
        #[arg(short, long)]
        zip: bool,
    },

    /// List every workspace package
    List,

    /// List workspace packages, optionally filtered
    Packages {
        /// Only packages in this registry scope (prints unscoped names)
        #[arg(long)]
        scope: Option<String>,

        /// Only packages declaring this script
        #[arg(long)]
        with_script: Option<String>,
    },

    /// List the registry scopes used in the workspace
    Scopes {
        /// Only packages declaring this script
        #[arg(long)]
        with_script: Option<String>,
    },

    /// Remove generated archives
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json)
        .with_npm(cli.npm);

    // Listing commands write only to stdout, no logging
    match &cli.command {
        None | Some(Commands::Version) => return commands::version::run(cli.json),
        Some(Commands::List) => return commands::list::run(&config),
        Some(Commands::Packages { scope, with_script }) => {
            return commands::packages::run(&config, scope.as_deref(), with_script.as_deref());
        }
        Some(Commands::Scopes { with_script }) => {
            return commands::scopes::run(&config, with_script.as_deref());
        }
        _ => {}
    }

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Bundle {
            packages,
            scope,
            extract,
            neutral,
            zip,
        }) => {
            let options = isolate_core::BundleOptions {
                extract,
                neutral,
                zip,
            };
            commands::bundle::run(&config, &packages, scope.as_deref(), options)
        }
        Some(Commands::Clean) => commands::clean::run(&config),
        _ => Ok(()),
    }
}
