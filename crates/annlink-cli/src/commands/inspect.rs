//! Inspect command - load a model and report its tensor shapes.

use std::path::PathBuf;

use clap::Args;
use console::style;
use serde_json::json;

use annlink_engine::{EngineSingleton, ModelFormat};

use super::{BackendKind, acquire_engine, load_config};

/// Arguments for the inspect command.
#[derive(Args)]
pub struct InspectArgs {
    /// Model file (.armnn, .tflite or .onnx)
    model: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Input tensor name
    #[arg(long)]
    input_name: Option<String>,

    /// Output tensor name
    #[arg(long)]
    output_name: Option<String>,

    /// Backend to run against
    #[arg(long, value_enum, default_value = "native")]
    backend: BackendKind,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON object
    Json,
}

pub fn run(args: InspectArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let mut load_options = config.load.clone();
    if let Some(name) = &args.input_name {
        load_options = load_options.with_input_name(name);
    }
    if let Some(name) = &args.output_name {
        load_options = load_options.with_output_name(name);
    }

    let holder = EngineSingleton::new();
    let engine = acquire_engine(args.backend, config.engine.clone(), &args.model, &holder)?;

    let id = engine.load(&args.model, &load_options)?;
    let input = engine.input_shape(id)?;
    let output = engine.output_shape(id)?;

    match args.format {
        OutputFormat::Json => {
            let report = json!({
                "model": args.model.display().to_string(),
                "format": ModelFormat::from_path(&args.model).map(|f| f.to_string()),
                "network_id": id.raw(),
                "input": {
                    "name": load_options.input_name,
                    "shape": input.dims(),
                    "elements": input.element_count(),
                },
                "output": {
                    "name": load_options.output_name,
                    "shape": output.dims(),
                    "elements": output.element_count(),
                },
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("{} {}", style("Model:").bold(), args.model.display());
            if let Some(format) = ModelFormat::from_path(&args.model) {
                println!("{} {}", style("Format:").bold(), format);
            }
            println!("{} {}", style("Network id:").bold(), id);
            println!(
                "  input  {:<16} {} ({} elements)",
                load_options.input_name,
                input,
                input.element_count()
            );
            println!(
                "  output {:<16} {} ({} elements)",
                load_options.output_name,
                output,
                output.element_count()
            );
        }
    }

    engine.unload(id)?;
    holder.shutdown()?;

    Ok(())
}
