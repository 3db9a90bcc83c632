//! CLI for inspecting and benchmarking networks on the libann backend.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{bench, config, inspect, run};

/// Load, inspect and benchmark networks on the libann backend
#[derive(Parser)]
#[command(name = "annlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a model and report its tensor shapes
    Inspect(inspect::InspectArgs),

    /// Measure load and per-inference times for a model
    Bench(bench::BenchArgs),

    /// Run one forward pass over raw f32 buffers
    Run(run::RunArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Execute command
    match cli.command {
        Commands::Inspect(args) => inspect::run(args, cli.config.as_deref()),
        Commands::Bench(args) => bench::run(args, cli.config.as_deref()),
        Commands::Run(args) => run::run(args, cli.config.as_deref()),
        Commands::Config(args) => config::run(args),
    }
}
