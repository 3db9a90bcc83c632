//! Process-wide engine lifecycle.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::EngineOptions;
use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// Lifecycle holder guaranteeing one engine and one teardown.
///
/// The holder moves through three states: uninitialized, active after the
/// first acquisition, destroyed after shutdown. Destroyed is terminal.
/// Acquiring while active returns the existing engine and ignores any
/// differing options; acquiring or shutting down after shutdown fails
/// with [`EngineError::UseAfterDestroy`]. The backend's tuning flush
/// therefore runs at most once per holder.
///
/// A private static backs [`acquire`] and [`shutdown`] for the common
/// process-global case; tests and embedders can hold their own.
pub struct EngineSingleton {
    slot: Mutex<SingletonState>,
}

enum SingletonState {
    Uninitialized,
    Active(Arc<Engine>),
    Destroyed,
}

impl EngineSingleton {
    /// A holder in the uninitialized state.
    pub const fn new() -> Self {
        EngineSingleton { slot: Mutex::new(SingletonState::Uninitialized) }
    }

    /// Get the engine, constructing it through `init` on first use.
    ///
    /// A failed construction leaves the holder uninitialized, so a later
    /// acquisition can retry.
    pub fn acquire_with<F>(&self, options: EngineOptions, init: F) -> Result<Arc<Engine>>
    where
        F: FnOnce(EngineOptions) -> Result<Engine>,
    {
        let mut slot = self.slot.lock().map_err(|e| EngineError::Poisoned(e.to_string()))?;
        match &*slot {
            SingletonState::Active(engine) => {
                if engine.options() != &options {
                    debug!("engine already initialized; differing options ignored");
                }
                Ok(Arc::clone(engine))
            }
            SingletonState::Destroyed => Err(EngineError::UseAfterDestroy),
            SingletonState::Uninitialized => {
                let engine = Arc::new(init(options)?);
                *slot = SingletonState::Active(Arc::clone(&engine));
                Ok(engine)
            }
        }
    }

    /// Get the engine over the `libann` shared library.
    #[cfg(feature = "libann")]
    pub fn acquire(&self, options: EngineOptions) -> Result<Arc<Engine>> {
        self.acquire_with(options, Engine::new)
    }

    /// Tear the engine down. Terminal: a second shutdown fails.
    ///
    /// The holder moves to destroyed even when the underlying teardown
    /// reports a failure, so the backend is never destroyed twice.
    /// Shutting down a holder that was never acquired succeeds and still
    /// seals it.
    pub fn shutdown(&self) -> Result<()> {
        let mut slot = self.slot.lock().map_err(|e| EngineError::Poisoned(e.to_string()))?;
        match std::mem::replace(&mut *slot, SingletonState::Destroyed) {
            SingletonState::Active(engine) => engine.destroy(),
            SingletonState::Uninitialized => Ok(()),
            SingletonState::Destroyed => Err(EngineError::UseAfterDestroy),
        }
    }

    /// Whether shutdown has already happened.
    pub fn is_destroyed(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| matches!(&*slot, SingletonState::Destroyed))
            .unwrap_or(true)
    }
}

impl Default for EngineSingleton {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: EngineSingleton = EngineSingleton::new();

/// Get the process-wide engine, initializing it on first use.
#[cfg(feature = "libann")]
pub fn acquire(options: EngineOptions) -> Result<Arc<Engine>> {
    GLOBAL.acquire(options)
}

/// Tear the process-wide engine down. Callable exactly once.
pub fn shutdown() -> Result<()> {
    GLOBAL.shutdown()
}
