//! CLI subcommands.

pub mod bench;
pub mod config;
pub mod inspect;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use annlink_engine::{AnnlinkConfig, Engine, EngineOptions, EngineSingleton, StubDriver};

/// Shapes the stub backend reports for any registered model.
const STUB_INPUT: &[usize] = &[1, 3, 224, 224];
const STUB_OUTPUT: &[usize] = &[1, 512];

/// Which driver sits behind the engine.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum BackendKind {
    /// The libann shared library
    Native,
    /// In-process stand-in serving any model as 1x3x224x224 -> 1x512
    Stub,
}

pub(crate) fn load_config(path: Option<&str>) -> anyhow::Result<AnnlinkConfig> {
    match path {
        Some(path) => Ok(AnnlinkConfig::from_file(Path::new(path))?),
        None => Ok(AnnlinkConfig::default()),
    }
}

/// Acquire an engine through `holder`, so the command tears it down with
/// one `holder.shutdown()` at the end.
pub(crate) fn acquire_engine(
    backend: BackendKind,
    options: EngineOptions,
    model: &Path,
    holder: &EngineSingleton,
) -> anyhow::Result<Arc<Engine>> {
    match backend {
        BackendKind::Native => Ok(holder.acquire(options)?),
        BackendKind::Stub => {
            let driver = StubDriver::new();
            driver.register(model, STUB_INPUT, STUB_OUTPUT)?;
            let engine = holder
                .acquire_with(options, move |options| Engine::with_driver(driver, options))?;
            Ok(engine)
        }
    }
}
