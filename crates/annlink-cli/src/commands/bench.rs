//! Bench command - load and per-inference timings for a model.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{ArrayD, IxDyn};
use tracing::info;

use annlink_engine::{EngineSingleton, TuningLevel};

use super::{BackendKind, acquire_engine, load_config};

/// Arguments for the bench command.
#[derive(Args)]
pub struct BenchArgs {
    /// Model file (.armnn, .tflite or .onnx)
    model: PathBuf,

    /// Number of timed inference passes
    #[arg(short, long, default_value_t = 128)]
    iterations: usize,

    /// Tuning effort at engine init (0-3)
    #[arg(long)]
    tuning_level: Option<u8>,

    /// Tuning data file, created empty when missing
    #[arg(long)]
    tuning_file: Option<PathBuf>,

    /// Optimized-network cache file, created empty when missing
    #[arg(long)]
    cache_path: Option<PathBuf>,

    /// Save the optimized network to the cache file
    #[arg(long)]
    save_cache: bool,

    /// Backend to run against
    #[arg(long, value_enum, default_value = "native")]
    backend: BackendKind,
}

pub fn run(args: BenchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let mut engine_options = config.engine.clone();
    if let Some(level) = args.tuning_level {
        engine_options = engine_options.with_tuning_level(TuningLevel::try_from(level)?);
    }
    if let Some(tuning_file) = &args.tuning_file {
        ensure_file(tuning_file)?;
        engine_options = engine_options.with_tuning_file(tuning_file);
    }

    let mut load_options = config.load.clone().with_save_cache(args.save_cache);
    if let Some(cache_path) = &args.cache_path {
        ensure_file(cache_path)?;
        load_options = load_options.with_cache_path(cache_path);
    }

    let holder = EngineSingleton::new();

    // A populated cache file shortcuts graph optimization, so init and
    // load are timed together.
    let started = Instant::now();
    let engine = acquire_engine(args.backend, engine_options, &args.model, &holder)?;
    let id = engine.load(&args.model, &load_options)?;
    let load_ms = started.elapsed().as_secs_f64() * 1000.0;

    let input_shape = engine.input_shape(id)?;
    let input = ArrayD::<f32>::zeros(IxDyn(input_shape.dims()));

    // The first pass pays for deferred backend setup; keep it out of the
    // measurement.
    let started = Instant::now();
    let mut output = engine.infer(id, input.view())?;
    let warmup_ms = started.elapsed().as_secs_f64() * 1000.0;

    let progress = ProgressBar::new(args.iterations as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}")
            .unwrap()
            .progress_chars("##-"),
    );

    let started = Instant::now();
    for _ in 0..args.iterations {
        engine.run(id, input.view(), output.view_mut())?;
        progress.inc(1);
    }
    let per_sample_ms = started.elapsed().as_secs_f64() * 1000.0 / args.iterations.max(1) as f64;
    progress.finish_and_clear();

    println!("{} {}", style("Model:").bold(), args.model.display());
    println!("  input shape    {input_shape}");
    println!("  loading took   {load_ms:>10.3} ms");
    println!("  warmup took    {warmup_ms:>10.3} ms");
    println!(
        "  inference took {per_sample_ms:>10.3} ms per sample ({} iterations)",
        args.iterations
    );

    engine.unload(id)?;
    // Shutdown persists tuning data when a tuning file is set.
    holder.shutdown()?;

    Ok(())
}

fn ensure_file(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, b"")?;
    info!("created empty file {}", path.display());
    Ok(())
}
