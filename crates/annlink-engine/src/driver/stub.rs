//! Deterministic in-process driver for tests and development.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::config::EngineOptions;
use crate::error::DriverError;
use crate::handles::NetworkId;
use crate::shape::{TensorRole, TensorShape};

use super::{EngineDriver, LoadRequest, RawEngine};

/// Backend stand-in with a registered-model catalog and call counters.
///
/// It behaves like the native driver: ids are handed out from zero and
/// never reused, shapes are reported in the packed wire format, loading an
/// unregistered path is rejected, and `execute` writes a deterministic
/// non-zero pattern. Destroy writes a marker to the configured tuning
/// file, standing in for the backend's tuning flush.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the engine owns another.
#[derive(Clone)]
pub struct StubDriver {
    state: Arc<StubState>,
}

#[derive(Clone, Copy)]
struct PackedShapes {
    input: u64,
    output: u64,
}

#[derive(Default)]
struct StubNetworks {
    next_id: i32,
    live: HashMap<i32, PackedShapes>,
}

#[derive(Default)]
struct StubState {
    catalog: Mutex<HashMap<PathBuf, PackedShapes>>,
    networks: Mutex<StubNetworks>,
    tuning_file: Mutex<Option<PathBuf>>,
    fail_destroy: AtomicBool,
    init_calls: AtomicUsize,
    load_calls: AtomicUsize,
    shape_calls: AtomicUsize,
    execute_calls: AtomicUsize,
    unload_calls: AtomicUsize,
    destroy_calls: AtomicUsize,
}

// Keeps the stub usable for assertions even after a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StubDriver {
    pub fn new() -> Self {
        StubDriver { state: Arc::new(StubState::default()) }
    }

    /// Make every destroy call report a backend failure.
    pub fn with_failing_destroy(self) -> Self {
        self.state.fail_destroy.store(true, Ordering::SeqCst);
        self
    }

    /// Register a model path and the shapes its network will report.
    ///
    /// Shapes are packed here, so anything the wire format cannot carry
    /// is rejected up front.
    pub fn register(
        &self,
        path: impl Into<PathBuf>,
        input: &[usize],
        output: &[usize],
    ) -> crate::error::Result<()> {
        let shapes = PackedShapes {
            input: TensorShape::from(input).pack()?,
            output: TensorShape::from(output).pack()?,
        };
        lock(&self.state.catalog).insert(path.into(), shapes);
        Ok(())
    }

    /// The tuning file captured at init, if any.
    pub fn tuning_file(&self) -> Option<PathBuf> {
        lock(&self.state.tuning_file).clone()
    }

    pub fn init_calls(&self) -> usize {
        self.state.init_calls.load(Ordering::SeqCst)
    }

    pub fn load_calls(&self) -> usize {
        self.state.load_calls.load(Ordering::SeqCst)
    }

    pub fn shape_calls(&self) -> usize {
        self.state.shape_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> usize {
        self.state.execute_calls.load(Ordering::SeqCst)
    }

    pub fn unload_calls(&self) -> usize {
        self.state.unload_calls.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.state.destroy_calls.load(Ordering::SeqCst)
    }
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineDriver for StubDriver {
    fn init(&self, options: &EngineOptions) -> Result<RawEngine, DriverError> {
        self.state.init_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.state.tuning_file) = options.tuning_file.clone();
        Ok(RawEngine::from_ptr(std::ptr::dangling_mut()))
    }

    fn load(
        &self,
        _engine: RawEngine,
        request: &LoadRequest<'_>,
    ) -> Result<NetworkId, DriverError> {
        self.state.load_calls.fetch_add(1, Ordering::SeqCst);
        let shapes = lock(&self.state.catalog)
            .get(request.model_path)
            .copied()
            .ok_or_else(|| {
                DriverError::LoadRejected(format!(
                    "no graph registered for {}",
                    request.model_path.display()
                ))
            })?;

        let mut networks = lock(&self.state.networks);
        let id = networks.next_id;
        networks.next_id += 1;
        networks.live.insert(id, shapes);
        debug!("stub loaded network {id}");
        Ok(NetworkId::from_raw(id))
    }

    fn packed_shape(&self, _engine: RawEngine, id: NetworkId, role: TensorRole) -> u64 {
        self.state.shape_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.state.networks).live.get(&id.raw()) {
            Some(shapes) if role.is_input() => shapes.input,
            Some(shapes) => shapes.output,
            // An unknown id yields garbage, like the real backend.
            None => 0,
        }
    }

    fn execute(&self, _engine: RawEngine, _id: NetworkId, input: &[f32], output: &mut [f32]) {
        self.state.execute_calls.fetch_add(1, Ordering::SeqCst);
        let bias = input.first().copied().unwrap_or_default();
        for (i, value) in output.iter_mut().enumerate() {
            *value = bias + (i % 7) as f32 + 1.0;
        }
    }

    fn unload(&self, _engine: RawEngine, id: NetworkId) {
        self.state.unload_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.networks).live.remove(&id.raw());
    }

    fn destroy(&self, _engine: RawEngine) -> Result<(), DriverError> {
        self.state.destroy_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_destroy.load(Ordering::SeqCst) {
            return Err(DriverError::DestroyFailed("stub configured to fail teardown".to_string()));
        }
        if let Some(path) = lock(&self.state.tuning_file).as_ref() {
            std::fs::write(path, b"stub tuning data\n").map_err(|e| {
                DriverError::DestroyFailed(format!("failed to write tuning data: {e}"))
            })?;
        }
        Ok(())
    }
}
