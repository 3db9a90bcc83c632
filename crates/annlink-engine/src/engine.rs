//! The engine binding: load, shape, run, unload, destroy.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, IxDyn};
use tracing::{debug, error, warn};

use crate::config::{EngineOptions, LoadOptions};
use crate::driver::{EngineDriver, LoadRequest, RawEngine};
#[cfg(feature = "libann")]
use crate::driver::libann::LibAnnDriver;
use crate::error::{DriverError, EngineError, Result};
use crate::handles::{HandleTable, NetworkId};
use crate::shape::{TensorRole, TensorShape};

/// The process's binding to one backend engine instance.
///
/// Every operation is serialized through one internal lock, so at most
/// one load, shape query, inference or unload is in flight at a time,
/// which is the exclusive access the backend requires. Arguments are
/// validated before anything crosses the C boundary: bad options, unknown
/// ids and mis-sized buffers all fail locally.
///
/// Destruction is explicit. [`Engine::destroy`] (or the singleton's
/// shutdown) tears the backend down and flushes its tuning data; after
/// that every operation fails with [`EngineError::UseAfterDestroy`]. Drop
/// covers a missed call so the backend is never leaked.
pub struct Engine {
    driver: Box<dyn EngineDriver>,
    options: EngineOptions,
    state: Mutex<Option<ActiveEngine>>,
}

struct ActiveEngine {
    raw: RawEngine,
    handles: HandleTable,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine over the `libann` shared library.
    #[cfg(feature = "libann")]
    pub fn new(options: EngineOptions) -> Result<Self> {
        Self::with_driver(LibAnnDriver::new()?, options)
    }

    /// Create an engine over an explicit driver.
    pub fn with_driver<D>(driver: D, options: EngineOptions) -> Result<Self>
    where
        D: EngineDriver + 'static,
    {
        options.validate()?;
        let driver: Box<dyn EngineDriver> = Box::new(driver);
        let raw = driver.init(&options)?;
        debug!(
            "engine initialized (log_level {:?}, tuning_level {:?})",
            options.log_level, options.tuning_level
        );
        Ok(Engine {
            driver,
            options,
            state: Mutex::new(Some(ActiveEngine { raw, handles: HandleTable::new() })),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<ActiveEngine>>> {
        self.state.lock().map_err(|e| EngineError::Poisoned(e.to_string()))
    }

    /// Load a compiled graph and cache both of its tensor shapes.
    pub fn load(&self, model_path: impl AsRef<Path>, options: &LoadOptions) -> Result<NetworkId> {
        let model_path = model_path.as_ref();
        options.validate(model_path)?;

        let mut guard = self.lock()?;
        let active = guard.as_mut().ok_or(EngineError::UseAfterDestroy)?;

        let request = LoadRequest {
            model_path,
            input_name: &options.input_name,
            output_name: &options.output_name,
            fast_math: options.fast_math,
            save_cache: options.save_cache,
            cache_path: options.cache_path.as_deref(),
        };
        let id = self.driver.load(active.raw, &request).map_err(|e| match e {
            DriverError::LoadRejected(detail) => {
                EngineError::LoadFailed(format!("{}: {detail}", model_path.display()))
            }
            other => EngineError::Driver(other),
        })?;

        let (input, output) = match self.query_shapes(active, id) {
            Ok(shapes) => shapes,
            Err(e) => {
                // Do not keep a network around whose shapes are unusable.
                self.driver.unload(active.raw, id);
                return Err(e);
            }
        };

        debug!("loaded network {id} ({input} -> {output})");
        active.handles.record(id, input, output);
        Ok(id)
    }

    fn query_shapes(
        &self,
        active: &ActiveEngine,
        id: NetworkId,
    ) -> Result<(TensorShape, TensorShape)> {
        let input = TensorShape::unpack(self.driver.packed_shape(active.raw, id, TensorRole::Input))?;
        let output =
            TensorShape::unpack(self.driver.packed_shape(active.raw, id, TensorRole::Output))?;
        Ok((input, output))
    }

    /// Query the backend for a network tensor shape.
    ///
    /// The cached [`Engine::input_shape`] and [`Engine::output_shape`]
    /// lookups are usually what callers want; this goes back to the
    /// backend and must agree with them.
    pub fn shape(&self, id: NetworkId, role: TensorRole) -> Result<TensorShape> {
        let guard = self.lock()?;
        let active = guard.as_ref().ok_or(EngineError::UseAfterDestroy)?;
        if !active.handles.contains(id) {
            return Err(EngineError::UnknownNetwork(id));
        }
        TensorShape::unpack(self.driver.packed_shape(active.raw, id, role))
    }

    /// The input shape cached when the network was loaded.
    pub fn input_shape(&self, id: NetworkId) -> Result<TensorShape> {
        let guard = self.lock()?;
        let active = guard.as_ref().ok_or(EngineError::UseAfterDestroy)?;
        active.handles.input_shape(id).map(|s| s.clone())
    }

    /// The output shape cached when the network was loaded.
    pub fn output_shape(&self, id: NetworkId) -> Result<TensorShape> {
        let guard = self.lock()?;
        let active = guard.as_ref().ok_or(EngineError::UseAfterDestroy)?;
        active.handles.output_shape(id).map(|s| s.clone())
    }

    /// Run one synchronous forward pass over caller-owned buffers.
    ///
    /// Both views must match the network's shapes exactly and be
    /// contiguous in standard layout; the buffers are borrowed for the
    /// duration of the call only. Blocks until the pass completes.
    pub fn run(
        &self,
        id: NetworkId,
        input: ArrayViewD<'_, f32>,
        mut output: ArrayViewMutD<'_, f32>,
    ) -> Result<()> {
        let guard = self.lock()?;
        let active = guard.as_ref().ok_or(EngineError::UseAfterDestroy)?;

        let shapes = active.handles.get(id)?;
        if input.shape() != shapes.input.dims() {
            return Err(EngineError::ShapeMismatch {
                id,
                role: TensorRole::Input,
                expected: shapes.input.clone(),
                actual: TensorShape::from(input.shape()),
            });
        }
        if output.shape() != shapes.output.dims() {
            return Err(EngineError::ShapeMismatch {
                id,
                role: TensorRole::Output,
                expected: shapes.output.clone(),
                actual: TensorShape::from(output.shape()),
            });
        }
        let input_data = input.as_slice().ok_or_else(|| {
            EngineError::InvalidBuffer("input view is not contiguous in standard layout".to_string())
        })?;
        let output_data = output.as_slice_mut().ok_or_else(|| {
            EngineError::InvalidBuffer("output view is not contiguous in standard layout".to_string())
        })?;

        self.driver.execute(active.raw, id, input_data, output_data);
        Ok(())
    }

    /// Run one forward pass, allocating the output array.
    pub fn infer(&self, id: NetworkId, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        let shape = self.output_shape(id)?;
        let mut output = ArrayD::zeros(IxDyn(shape.dims()));
        self.run(id, input, output.view_mut())?;
        Ok(output)
    }

    /// Unload a network, invalidating its id and cached shapes.
    ///
    /// The handle entry goes first, so a repeated unload of the same id
    /// fails with [`EngineError::UnknownNetwork`] without reaching the
    /// backend.
    pub fn unload(&self, id: NetworkId) -> Result<()> {
        let mut guard = self.lock()?;
        let active = guard.as_mut().ok_or(EngineError::UseAfterDestroy)?;
        active.handles.remove(id)?;
        self.driver.unload(active.raw, id);
        debug!("unloaded network {id}");
        Ok(())
    }

    /// Destroy the engine instance, flushing any accumulated tuning data.
    ///
    /// A teardown failure is returned to the caller, but the engine is
    /// gone either way; no second destroy ever reaches the backend.
    pub fn destroy(&self) -> Result<()> {
        let mut guard = self.lock()?;
        let active = guard.take().ok_or(EngineError::UseAfterDestroy)?;
        if !active.handles.is_empty() {
            warn!("destroying engine with {} loaded networks", active.handles.len());
        }
        if let Err(e) = self.driver.destroy(active.raw) {
            error!("engine teardown failed: {e}");
            return Err(e.into());
        }
        debug!("engine destroyed");
        Ok(())
    }

    /// Ids of currently loaded networks, sorted.
    pub fn loaded_networks(&self) -> Result<Vec<NetworkId>> {
        let guard = self.lock()?;
        let active = guard.as_ref().ok_or(EngineError::UseAfterDestroy)?;
        Ok(active.handles.ids())
    }

    /// The options the engine was created with.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Whether the engine has already been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.state.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }
}

impl Drop for Engine {
    // Covers a missed explicit destroy; errors are only logged here.
    fn drop(&mut self) {
        let Ok(mut guard) = self.state.lock() else {
            return;
        };
        if let Some(active) = guard.take() {
            if let Err(e) = self.driver.destroy(active.raw) {
                error!("engine teardown failed during drop: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::driver::stub::StubDriver;

    const INPUT: &[usize] = &[1, 3, 224, 224];
    const OUTPUT: &[usize] = &[1, 512];

    fn stub_engine() -> (StubDriver, Engine, tempfile::NamedTempFile) {
        let model = tempfile::Builder::new().suffix(".armnn").tempfile().unwrap();
        let driver = StubDriver::new();
        driver.register(model.path(), INPUT, OUTPUT).unwrap();
        let engine = Engine::with_driver(driver.clone(), EngineOptions::new()).unwrap();
        (driver, engine, model)
    }

    #[test]
    fn test_load_caches_both_shapes() {
        let (driver, engine, model) = stub_engine();

        let id = engine.load(model.path(), &LoadOptions::new()).unwrap();

        assert_eq!(id, NetworkId::from_raw(0));
        assert_eq!(engine.input_shape(id).unwrap().dims(), INPUT);
        assert_eq!(engine.output_shape(id).unwrap().dims(), OUTPUT);
        // The backend agrees with the cache.
        assert_eq!(engine.shape(id, TensorRole::Input).unwrap().dims(), INPUT);
        assert_eq!(engine.shape(id, TensorRole::Output).unwrap().dims(), OUTPUT);
        assert_eq!(driver.load_calls(), 1);
    }

    #[test]
    fn test_load_unregistered_model_fails() {
        let model = tempfile::Builder::new().suffix(".armnn").tempfile().unwrap();
        let driver = StubDriver::new();
        let engine = Engine::with_driver(driver.clone(), EngineOptions::new()).unwrap();

        let err = engine.load(model.path(), &LoadOptions::new()).unwrap_err();

        assert!(matches!(err, EngineError::LoadFailed(_)));
        assert!(err.to_string().contains(model.path().to_str().unwrap()));
        assert_eq!(driver.load_calls(), 1);
    }

    #[test]
    fn test_invalid_load_options_never_reach_driver() {
        let (driver, engine, model) = stub_engine();

        let options = LoadOptions::new().with_save_cache(true);
        let err = engine.load(model.path(), &options).unwrap_err();

        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(driver.load_calls(), 0);
    }

    #[test]
    fn test_missing_model_path_never_reaches_driver() {
        let (driver, engine, _model) = stub_engine();

        let err = engine.load("/definitely/not/here.armnn", &LoadOptions::new()).unwrap_err();

        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(driver.load_calls(), 0);
    }

    #[test]
    fn test_run_writes_placeholder_output() {
        let (driver, engine, model) = stub_engine();
        let id = engine.load(model.path(), &LoadOptions::new()).unwrap();

        let input = ArrayD::<f32>::zeros(IxDyn(INPUT));
        let mut output = ArrayD::<f32>::zeros(IxDyn(OUTPUT));
        engine.run(id, input.view(), output.view_mut()).unwrap();

        assert!(output.iter().all(|v| *v != 0.0));
        assert_eq!(driver.execute_calls(), 1);
    }

    #[test]
    fn test_infer_allocates_matching_output() {
        let (_driver, engine, model) = stub_engine();
        let id = engine.load(model.path(), &LoadOptions::new()).unwrap();

        let input = ArrayD::<f32>::zeros(IxDyn(INPUT));
        let output = engine.infer(id, input.view()).unwrap();

        assert_eq!(output.shape(), OUTPUT);
        assert!(output.iter().all(|v| *v != 0.0));
    }

    #[test]
    fn test_input_shape_mismatch_fails_before_backend() {
        let (driver, engine, model) = stub_engine();
        let id = engine.load(model.path(), &LoadOptions::new()).unwrap();

        let input = ArrayD::<f32>::zeros(IxDyn(&[1, 3, 224, 223]));
        let mut output = ArrayD::<f32>::zeros(IxDyn(OUTPUT));
        let err = engine.run(id, input.view(), output.view_mut()).unwrap_err();

        assert!(matches!(
            err,
            EngineError::ShapeMismatch { role: TensorRole::Input, .. }
        ));
        assert_eq!(driver.execute_calls(), 0);
    }

    #[test]
    fn test_output_shape_mismatch_fails_before_backend() {
        let (driver, engine, model) = stub_engine();
        let id = engine.load(model.path(), &LoadOptions::new()).unwrap();

        let input = ArrayD::<f32>::zeros(IxDyn(INPUT));
        let mut output = ArrayD::<f32>::zeros(IxDyn(&[512]));
        let err = engine.run(id, input.view(), output.view_mut()).unwrap_err();

        assert!(matches!(
            err,
            EngineError::ShapeMismatch { role: TensorRole::Output, .. }
        ));
        assert_eq!(driver.execute_calls(), 0);
    }

    #[test]
    fn test_non_contiguous_input_is_rejected() {
        let model = tempfile::Builder::new().suffix(".armnn").tempfile().unwrap();
        let driver = StubDriver::new();
        driver.register(model.path(), &[8, 8], &[1, 4]).unwrap();
        let engine = Engine::with_driver(driver.clone(), EngineOptions::new()).unwrap();
        let id = engine.load(model.path(), &LoadOptions::new()).unwrap();

        // A transposed square view keeps the shape but not the layout.
        let square = ArrayD::<f32>::zeros(IxDyn(&[8, 8]));
        let transposed = square.t();
        let mut output = ArrayD::<f32>::zeros(IxDyn(&[1, 4]));
        let err = engine.run(id, transposed, output.view_mut()).unwrap_err();

        assert!(matches!(err, EngineError::InvalidBuffer(_)));
        assert_eq!(driver.execute_calls(), 0);
    }

    #[test]
    fn test_run_with_unknown_id_fails_locally() {
        let (driver, engine, model) = stub_engine();
        engine.load(model.path(), &LoadOptions::new()).unwrap();

        let input = ArrayD::<f32>::zeros(IxDyn(INPUT));
        let mut output = ArrayD::<f32>::zeros(IxDyn(OUTPUT));
        let err = engine.run(NetworkId::from_raw(7), input.view(), output.view_mut()).unwrap_err();

        assert!(matches!(err, EngineError::UnknownNetwork(id) if id.raw() == 7));
        assert_eq!(driver.execute_calls(), 0);
    }

    #[test]
    fn test_unload_twice_fails_locally() {
        let (driver, engine, model) = stub_engine();
        let id = engine.load(model.path(), &LoadOptions::new()).unwrap();

        engine.unload(id).unwrap();
        let err = engine.unload(id).unwrap_err();

        assert!(matches!(err, EngineError::UnknownNetwork(_)));
        assert_eq!(driver.unload_calls(), 1);
    }

    #[test]
    fn test_ids_stay_fresh_after_unload() {
        let (_driver, engine, model) = stub_engine();

        let first = engine.load(model.path(), &LoadOptions::new()).unwrap();
        engine.unload(first).unwrap();
        let second = engine.load(model.path(), &LoadOptions::new()).unwrap();

        assert_eq!(first.raw(), 0);
        assert_eq!(second.raw(), 1);
        assert_eq!(engine.loaded_networks().unwrap(), vec![second]);
    }

    #[test]
    fn test_operations_after_destroy_fail() {
        let (driver, engine, model) = stub_engine();

        engine.destroy().unwrap();

        assert!(engine.is_destroyed());
        assert!(matches!(
            engine.load(model.path(), &LoadOptions::new()),
            Err(EngineError::UseAfterDestroy)
        ));
        let input = ArrayD::<f32>::zeros(IxDyn(INPUT));
        let mut output = ArrayD::<f32>::zeros(IxDyn(OUTPUT));
        assert!(matches!(
            engine.run(NetworkId::from_raw(0), input.view(), output.view_mut()),
            Err(EngineError::UseAfterDestroy)
        ));
        assert!(matches!(engine.destroy(), Err(EngineError::UseAfterDestroy)));
        assert_eq!(driver.destroy_calls(), 1);
    }

    #[test]
    fn test_drop_destroys_exactly_once() {
        let (driver, engine, _model) = stub_engine();

        drop(engine);
        assert_eq!(driver.destroy_calls(), 1);

        let engine = Engine::with_driver(driver.clone(), EngineOptions::new()).unwrap();
        engine.destroy().unwrap();
        drop(engine);
        // Explicit destroy already ran; drop must not call again.
        assert_eq!(driver.destroy_calls(), 2);
    }
}
