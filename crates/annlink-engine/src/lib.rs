//! Engine and network-handle lifecycle for the `libann` native inference
//! backend.
//!
//! `libann` executes compiled model graphs (`.armnn`, `.tflite`, `.onnx`)
//! on device accelerators and is driven through a six-call C ABI. This
//! crate owns that unsafe boundary and the lifecycle around it:
//!
//! - one engine instance per process, created lazily through
//!   [`EngineSingleton`] and destroyed exactly once, which is when the
//!   backend persists its tuning data
//! - numbered network handles whose input and output shapes are decoded
//!   from the packed wire format and cached at load time
//! - synchronous forward passes over borrowed `f32` buffers, with every
//!   argument validated locally before it crosses the C boundary
//!
//! Backends plug in through [`EngineDriver`]: [`LibAnnDriver`] binds the
//! shared library at runtime, [`StubDriver`] is a deterministic
//! in-process stand-in for tests and development.
//!
//! ```no_run
//! use annlink_engine::{Engine, EngineOptions, LoadOptions};
//! use ndarray::{ArrayD, IxDyn};
//!
//! # fn main() -> annlink_engine::Result<()> {
//! let engine = Engine::new(EngineOptions::new())?;
//! let id = engine.load("model.tflite", &LoadOptions::new())?;
//!
//! let input = ArrayD::<f32>::zeros(IxDyn(engine.input_shape(id)?.dims()));
//! let embedding = engine.infer(id, input.view())?;
//!
//! engine.unload(id)?;
//! engine.destroy()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod handles;
pub mod shape;
pub mod singleton;

pub use config::{AnnlinkConfig, EngineOptions, LoadOptions, LogLevel, ModelFormat, TuningLevel};
#[cfg(feature = "libann")]
pub use driver::libann::LibAnnDriver;
pub use driver::stub::StubDriver;
pub use driver::{EngineDriver, LoadRequest, RawEngine};
pub use engine::Engine;
pub use error::{DriverError, EngineError, Result};
pub use handles::{HandleTable, NetworkId, NetworkShapes};
pub use shape::{MAX_RANK, TensorRole, TensorShape};
#[cfg(feature = "libann")]
pub use singleton::acquire;
pub use singleton::{EngineSingleton, shutdown};
