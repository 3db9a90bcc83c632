//! Driver over the `libann` shared library.
//!
//! The backend exports six unprefixed C symbols. Their exact signatures:
//!
//! ```c
//! void*         init(int log_level, int tuning_level, const char* tuning_file);
//! int           load(void* engine, const char* path, const char* input_name,
//!                    const char* output_name, bool fast_math, bool save_cache,
//!                    const char* cache_path);
//! unsigned long shape(void* engine, int net_id, bool is_input);
//! void          embed(void* engine, int net_id, const void* input, void* output);
//! void          unload(void* engine, int net_id);
//! void          destroy(void* engine);
//! ```
//!
//! Null means "not set" for the optional `tuning_file` and `cache_path`
//! strings, a null engine from `init` means failure, and a negative id
//! from `load` means the graph was rejected.

use std::ffi::{CString, c_char, c_int, c_ulong, c_void};
use std::path::Path;

use libloading::Library;
use tracing::debug;

use crate::config::EngineOptions;
use crate::error::DriverError;
use crate::handles::NetworkId;
use crate::shape::TensorRole;

use super::{EngineDriver, LoadRequest, RawEngine};

/// Overrides the library search when set to a path.
pub const LIBRARY_ENV: &str = "ANNLINK_LIBRARY";

/// Sonames probed in order when [`LIBRARY_ENV`] is unset.
const LIBRARY_CANDIDATES: [&str; 3] = ["libann.so", "libann.so.1", "libann.dylib"];

type InitFn = unsafe extern "C" fn(
    log_level: c_int,
    tuning_level: c_int,
    tuning_file: *const c_char,
) -> *mut c_void;
type LoadFn = unsafe extern "C" fn(
    engine: *mut c_void,
    path: *const c_char,
    input_name: *const c_char,
    output_name: *const c_char,
    fast_math: bool,
    save_cache: bool,
    cache_path: *const c_char,
) -> c_int;
type ShapeFn = unsafe extern "C" fn(engine: *mut c_void, net_id: c_int, is_input: bool) -> c_ulong;
type EmbedFn =
    unsafe extern "C" fn(engine: *mut c_void, net_id: c_int, input: *const c_void, output: *mut c_void);
type UnloadFn = unsafe extern "C" fn(engine: *mut c_void, net_id: c_int);
type DestroyFn = unsafe extern "C" fn(engine: *mut c_void);

struct LibAnnFns {
    init: InitFn,
    load: LoadFn,
    shape: ShapeFn,
    embed: EmbedFn,
    unload: UnloadFn,
    destroy: DestroyFn,
}

/// Driver that binds the `libann` shared library at runtime.
pub struct LibAnnDriver {
    fns: LibAnnFns,
    // Keeps the mapping alive for as long as the resolved fn pointers.
    _library: Library,
}

impl LibAnnDriver {
    /// Open the backend library and resolve its six symbols.
    ///
    /// `ANNLINK_LIBRARY` takes precedence when set; otherwise the usual
    /// sonames are probed through the system loader.
    pub fn new() -> Result<Self, DriverError> {
        let library = open_library()?;
        let fns = LibAnnFns {
            init: load_symbol(&library, b"init\0")?,
            load: load_symbol(&library, b"load\0")?,
            shape: load_symbol(&library, b"shape\0")?,
            embed: load_symbol(&library, b"embed\0")?,
            unload: load_symbol(&library, b"unload\0")?,
            destroy: load_symbol(&library, b"destroy\0")?,
        };
        Ok(LibAnnDriver { fns, _library: library })
    }
}

fn open_library() -> Result<Library, DriverError> {
    if let Ok(path) = std::env::var(LIBRARY_ENV) {
        // SAFETY: opening the library runs no backend code beyond its
        // loader-invoked initializers.
        let library = unsafe { Library::new(&path) }
            .map_err(|e| DriverError::Library(format!("{path}: {e}")))?;
        debug!("loaded backend library from {LIBRARY_ENV}={path}");
        return Ok(library);
    }
    for candidate in LIBRARY_CANDIDATES {
        // SAFETY: as above.
        if let Ok(library) = unsafe { Library::new(candidate) } {
            debug!("loaded backend library {candidate}");
            return Ok(library);
        }
    }
    Err(DriverError::Library(format!(
        "no backend library found (tried {}); set {LIBRARY_ENV} to override",
        LIBRARY_CANDIDATES.join(", ")
    )))
}

fn load_symbol<T: Copy>(library: &Library, name: &'static [u8]) -> Result<T, DriverError> {
    // SAFETY: the caller supplies the function type matching the ABI
    // declaration for `name`.
    let symbol = unsafe { library.get::<T>(name) }.map_err(|e| {
        let name = String::from_utf8_lossy(&name[..name.len() - 1]);
        DriverError::MissingSymbol(format!("{name}: {e}"))
    })?;
    Ok(*symbol)
}

fn c_string(value: &str) -> Result<CString, DriverError> {
    CString::new(value)
        .map_err(|_| DriverError::InvalidArgument(format!("string contains NUL: {value:?}")))
}

fn c_path(path: &Path) -> Result<CString, DriverError> {
    let value = path.to_str().ok_or_else(|| {
        DriverError::InvalidArgument(format!("path is not valid UTF-8: {}", path.display()))
    })?;
    c_string(value)
}

impl EngineDriver for LibAnnDriver {
    fn init(&self, options: &EngineOptions) -> Result<RawEngine, DriverError> {
        let tuning_file = options.tuning_file.as_deref().map(c_path).transpose()?;
        let tuning_ptr: *const c_char =
            tuning_file.as_ref().map_or(std::ptr::null(), |s| s.as_ptr());

        // SAFETY: the tuning string outlives the call and the backend
        // copies what it keeps; null means "no tuning file".
        let ptr = unsafe {
            (self.fns.init)(options.log_level.raw(), options.tuning_level.raw(), tuning_ptr)
        };
        if ptr.is_null() {
            return Err(DriverError::InitFailed("backend returned a null engine".to_string()));
        }
        debug!("backend engine created");
        Ok(RawEngine::from_ptr(ptr))
    }

    fn load(
        &self,
        engine: RawEngine,
        request: &LoadRequest<'_>,
    ) -> Result<NetworkId, DriverError> {
        let path = c_path(request.model_path)?;
        let input_name = c_string(request.input_name)?;
        let output_name = c_string(request.output_name)?;
        let cache_path = request.cache_path.map(c_path).transpose()?;
        let cache_ptr: *const c_char = cache_path.as_ref().map_or(std::ptr::null(), |s| s.as_ptr());

        // SAFETY: engine is a live pointer from init and every string
        // outlives the call.
        let id = unsafe {
            (self.fns.load)(
                engine.as_ptr(),
                path.as_ptr(),
                input_name.as_ptr(),
                output_name.as_ptr(),
                request.fast_math,
                request.save_cache,
                cache_ptr,
            )
        };
        if id < 0 {
            return Err(DriverError::LoadRejected(format!("backend returned id {id}")));
        }
        Ok(NetworkId::from_raw(id))
    }

    fn packed_shape(&self, engine: RawEngine, id: NetworkId, role: TensorRole) -> u64 {
        // SAFETY: engine is live and id names a loaded network, both
        // guaranteed by the calling engine.
        let packed = unsafe { (self.fns.shape)(engine.as_ptr(), id.raw(), role.is_input()) };
        u64::from(packed)
    }

    fn execute(&self, engine: RawEngine, id: NetworkId, input: &[f32], output: &mut [f32]) {
        // SAFETY: both buffer lengths were proven against the cached
        // shapes by the caller; the backend reads input, writes output,
        // and keeps neither pointer.
        unsafe {
            (self.fns.embed)(
                engine.as_ptr(),
                id.raw(),
                input.as_ptr() as *const c_void,
                output.as_mut_ptr() as *mut c_void,
            );
        }
    }

    fn unload(&self, engine: RawEngine, id: NetworkId) {
        // SAFETY: engine is live and id names a loaded network.
        unsafe { (self.fns.unload)(engine.as_ptr(), id.raw()) };
    }

    fn destroy(&self, engine: RawEngine) -> Result<(), DriverError> {
        // SAFETY: engine came from init and is destroyed exactly once;
        // the backend flushes tuning data during this call.
        unsafe { (self.fns.destroy)(engine.as_ptr()) };
        Ok(())
    }
}
