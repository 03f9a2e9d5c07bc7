use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "focusguard-cli", version, about = "FocusGuard CLI")]
struct Cli {
    /// Data directory (defaults to ~/.config/focusguard)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Persisted daily usage counter
    Usage {
        #[command(subcommand)]
        action: commands::usage::UsageAction,
    },
    /// Evaluate the blocking rule for given inputs
    Evaluate(commands::evaluate::EvaluateArgs),
    /// Replay a scripted scenario against the engine in virtual time
    Simulate {
        /// Scenario file (JSON)
        scenario: PathBuf,
    },
    /// Print shell completions
    Completions {
        shell: Shell,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("FOCUSGUARD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let data_dir = cli.data_dir;
    let result = match cli.command {
        Commands::Config { action } => commands::config::run(action, data_dir),
        Commands::Usage { action } => commands::usage::run(action, data_dir),
        Commands::Evaluate(args) => commands::evaluate::run(args),
        Commands::Simulate { scenario } => commands::simulate::run(&scenario),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "focusguard-cli", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
