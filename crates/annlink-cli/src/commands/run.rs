//! Run command - one forward pass over raw f32 buffers.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use ndarray::{ArrayD, IxDyn};
use tracing::debug;

use annlink_engine::{EngineSingleton, TensorShape};

use super::{BackendKind, acquire_engine, load_config};

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Model file (.armnn, .tflite or .onnx)
    model: PathBuf,

    /// Raw little-endian f32 input file, zero-filled when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Write the output tensor as raw little-endian f32
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Backend to run against
    #[arg(long, value_enum, default_value = "native")]
    backend: BackendKind,
}

pub fn run(args: RunArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let holder = EngineSingleton::new();
    let engine = acquire_engine(args.backend, config.engine.clone(), &args.model, &holder)?;
    let id = engine.load(&args.model, &config.load)?;

    let input_shape = engine.input_shape(id)?;
    let input = match &args.input {
        Some(path) => read_tensor(path, &input_shape)?,
        None => {
            debug!("no input file given, running over zeros");
            ArrayD::zeros(IxDyn(input_shape.dims()))
        }
    };

    let output = engine.infer(id, input.view())?;

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let mut sum = 0.0f64;
    for value in output.iter() {
        min = min.min(*value);
        max = max.max(*value);
        sum += f64::from(*value);
    }
    let mean = sum / output.len() as f64;

    println!(
        "{} {} ({} elements)",
        style("Output:").bold(),
        engine.output_shape(id)?,
        output.len()
    );
    println!("  min {min:.6}  mean {mean:.6}  max {max:.6}");

    if let Some(path) = &args.output {
        let flat: Vec<f32> = output.iter().copied().collect();
        write_tensor(path, &flat)?;
        println!("{} Output written to {}", style("✓").green(), path.display());
    }

    engine.unload(id)?;
    holder.shutdown()?;

    Ok(())
}

fn read_tensor(path: &Path, shape: &TensorShape) -> anyhow::Result<ArrayD<f32>> {
    let bytes = fs::read(path)?;
    if bytes.len() % 4 != 0 {
        anyhow::bail!(
            "{} is not a raw f32 file (length {} is not a multiple of 4)",
            path.display(),
            bytes.len()
        );
    }
    let count = bytes.len() / 4;
    if count != shape.element_count() {
        anyhow::bail!(
            "{} holds {} f32 values, but the network input {} needs {}",
            path.display(),
            count,
            shape,
            shape.element_count()
        );
    }
    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok(ArrayD::from_shape_vec(IxDyn(shape.dims()), values)?)
}

fn write_tensor(path: &Path, values: &[f32]) -> anyhow::Result<()> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    fs::write(path, bytes)?;
    Ok(())
}
