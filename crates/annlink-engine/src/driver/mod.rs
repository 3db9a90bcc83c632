//! Backend driver implementations.

pub mod stub;

#[cfg(feature = "libann")]
pub mod libann;

use std::ffi::c_void;
use std::fmt;
use std::path::Path;

use crate::config::EngineOptions;
use crate::error::DriverError;
use crate::handles::NetworkId;
use crate::shape::TensorRole;

/// Opaque backend engine handle.
///
/// Stored as an integer so driver types stay `Send + Sync`; only driver
/// implementations turn it back into a pointer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawEngine(usize);

impl RawEngine {
    /// Wrap the pointer returned by the backend's init call.
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        RawEngine(ptr as usize)
    }

    /// The backend pointer, for handing back across the C boundary.
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }
}

impl fmt::Debug for RawEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawEngine({:#x})", self.0)
    }
}

/// Borrowed arguments for a driver load call.
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    pub model_path: &'a Path,
    pub input_name: &'a str,
    pub output_name: &'a str,
    pub fast_math: bool,
    pub save_cache: bool,
    pub cache_path: Option<&'a Path>,
}

/// One backend behind the six-call `libann` ABI.
///
/// Everything above this trait is safe code; implementations own whatever
/// unsafety their backend requires. Argument validation is the caller's
/// job: the engine never passes an unknown id or a mis-sized buffer down
/// here, because the backend does not check either.
pub trait EngineDriver: Send + Sync {
    /// Create one backend engine instance.
    fn init(&self, options: &EngineOptions) -> Result<RawEngine, DriverError>;

    /// Load a compiled graph, returning its backend-assigned id.
    fn load(&self, engine: RawEngine, request: &LoadRequest<'_>)
    -> Result<NetworkId, DriverError>;

    /// The packed shape of a network tensor, exactly as the backend
    /// reports it.
    fn packed_shape(&self, engine: RawEngine, id: NetworkId, role: TensorRole) -> u64;

    /// Run one forward pass over caller-owned buffers.
    ///
    /// The backend reads `input`, writes `output`, and retains neither
    /// pointer past the call.
    fn execute(&self, engine: RawEngine, id: NetworkId, input: &[f32], output: &mut [f32]);

    /// Release backend resources for a loaded network.
    fn unload(&self, engine: RawEngine, id: NetworkId);

    /// Destroy the engine instance, flushing tuning data if configured.
    fn destroy(&self, engine: RawEngine) -> Result<(), DriverError>;
}
