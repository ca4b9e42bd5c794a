mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use orphansweep_core::domain::MembershipStrategy;
use orphansweep_core::{Library, SweepOverrides};

/// orphansweep — remove images no album references
#[derive(Parser)]
#[command(name = "orphansweep", version, about)]
struct Cli {
    /// Path to the document store
    #[arg(long, default_value_t = default_store_path())]
    store: String,

    /// Log every image checked (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pass: delete every image no album references
    Sweep {
        /// Images fetched per cursor batch (default: configured value, else 100)
        #[arg(long)]
        batch_size: Option<usize>,

        /// How album membership is tested
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Report orphans without deleting them
        #[arg(long)]
        dry_run: bool,
    },
    /// Show store counts and the last sweep
    Status,
    /// Show or change stored sweep settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show or set the cursor batch size
    BatchSize {
        /// New batch size (omit to show the current one)
        value: Option<usize>,
    },
    /// Show or set the membership strategy
    Strategy {
        /// New strategy (omit to show the current one)
        #[arg(value_enum)]
        value: Option<StrategyArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// One album query per image
    PerImage,
    /// Load all album references once per pass
    Snapshot,
}

impl From<StrategyArg> for MembershipStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::PerImage => MembershipStrategy::PerImage,
            StrategyArg::Snapshot => MembershipStrategy::Snapshot,
        }
    }
}

fn default_store_path() -> String {
    dirs_path().to_string_lossy().to_string()
}

fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".orphansweep").join("store.db")
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "orphansweep_core=debug"
    } else {
        "orphansweep_core=warn"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let store_path = PathBuf::from(&cli.store);
    let library = Library::open(&store_path)?;

    match cli.command {
        Commands::Sweep {
            batch_size,
            strategy,
            dry_run,
        } => {
            let overrides = SweepOverrides {
                batch_size,
                strategy: strategy.map(Into::into),
                dry_run,
            };
            commands::sweep::run(&library, &overrides, cli.verbose)?
        }
        Commands::Status => commands::status::run(&library)?,
        Commands::Config { action } => match action {
            ConfigAction::BatchSize { value } => commands::config::batch_size(&library, value)?,
            ConfigAction::Strategy { value } => {
                commands::config::strategy(&library, value.map(Into::into))?
            }
        },
    }

    Ok(())
}
