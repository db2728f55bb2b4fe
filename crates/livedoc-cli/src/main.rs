#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod commands;
mod logging;

use clap::Parser;
use livedoc_core::paths::vault_root;
use livedoc_core::{Config, Settings};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "livedoc")]
#[command(author, version, about = "Live code fragments for markdown vaults", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Vault root (default: nearest directory holding .livedoc or .obsidian)
    #[arg(long, global = true, value_name = "PATH", env = "LIVEDOC_VAULT")]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Transpile one file and print the resulting module code
    Transpile {
        /// File to transpile; its extension picks the dialect
        file: PathBuf,

        /// Rewrite free identifiers against this scope id
        #[arg(long, value_name = "ID")]
        scope: Option<String>,

        /// Keep bare imports as they are
        #[arg(long)]
        no_rewrite_imports: bool,
    },

    /// Bundle the components folder into a single module
    Bundle {
        /// Vault-relative entry file (default: the components index)
        #[arg(long, value_name = "PATH")]
        entry: Option<String>,
    },

    /// Show the editor pass for a document
    Plan {
        /// Vault-relative markdown document
        document: String,

        /// Cursor position, 1-based
        #[arg(long, value_name = "LINE:COL")]
        cursor: Option<String>,
    },

    /// Evaluate every fragment of a document as reading mode would
    Preview {
        /// Vault-relative markdown document
        document: String,
    },

    /// Load the components module once
    Refresh,

    /// Watch the vault and reload components on change
    Watch,

    /// Print the last load's diagnostic report
    Report,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Transpile { .. } => "transpile",
            Self::Bundle { .. } => "bundle",
            Self::Plan { .. } => "plan",
            Self::Preview { .. } => "preview",
            Self::Refresh => "refresh",
            Self::Watch => "watch",
            Self::Report => "report",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let vault = cli
        .vault
        .clone()
        .or_else(|| vault_root(&cwd))
        .unwrap_or(cwd);

    let config = Config::new(vault)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);
    let settings = Settings::load(&config.settings_path()).into_diagnostic()?;

    logging::init(config.verbosity, config.json_logs, settings.debug_logging_enabled);

    let span = tracing::info_span!("livedoc", cmd = cli.command.name(), vault = %config.vault.display());
    let _guard = span.enter();

    match cli.command {
        Commands::Transpile {
            file,
            scope,
            no_rewrite_imports,
        } => commands::transpile::run(
            commands::transpile::TranspileAction {
                file,
                scope,
                rewrite_imports: !no_rewrite_imports,
            },
            cli.json,
        ),
        Commands::Bundle { entry } => commands::bundle::run(&config, &settings, entry, cli.json),
        Commands::Plan { document, cursor } => {
            commands::plan::run(&config, &document, cursor.as_deref(), cli.json)
        }
        Commands::Preview { document } => commands::preview::run(&config, &settings, &document, cli.json),
        Commands::Refresh => commands::refresh::run(&config, &settings, cli.json),
        Commands::Watch => commands::watch::run(&config, settings),
        Commands::Report => commands::report::run(&config, cli.json),
    }
}
