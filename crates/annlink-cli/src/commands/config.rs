//! Config command - manage the annlink configuration file.

use std::fs;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use console::style;

use annlink_engine::AnnlinkConfig;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Write a configuration file with the defaults
    Init(InitArgs),

    /// Show the configuration file path
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Where to write the file instead of the default location
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => show(),
        ConfigCommand::Init(args) => init(args),
        ConfigCommand::Path => path(),
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("annlink")
        .join("config.json")
}

fn show() -> anyhow::Result<()> {
    let config_path = default_config_path();
    let config = if config_path.exists() {
        AnnlinkConfig::from_file(&config_path)?
    } else {
        println!(
            "{} No config file found, showing defaults.",
            style("ℹ").blue()
        );
        AnnlinkConfig::default()
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn init(args: InitArgs) -> anyhow::Result<()> {
    let output_path = args.output.unwrap_or_else(default_config_path);
    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            output_path.display()
        );
    }
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    AnnlinkConfig::default().save(&output_path)?;
    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        output_path.display()
    );
    Ok(())
}

fn path() -> anyhow::Result<()> {
    let config_path = default_config_path();
    println!("Configuration file: {}", config_path.display());
    if config_path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
        println!();
        println!("Run 'annlink config init' to create one.");
    }
    Ok(())
}
