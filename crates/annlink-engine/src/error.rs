//! Error types for the annlink engine.

use thiserror::Error;

use crate::handles::NetworkId;
use crate::shape::{TensorRole, TensorShape};

/// Errors that can occur while operating the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid init/load arguments, rejected before any foreign call.
    #[error("configuration error: {0}")]
    Config(String),

    /// The backend rejected a model graph.
    #[error("failed to load network: {0}")]
    LoadFailed(String),

    /// A tensor buffer's shape differs from the shape cached for the network.
    #[error("tensor shape {actual} != network {id} {role} shape {expected}")]
    ShapeMismatch {
        id: NetworkId,
        role: TensorRole,
        expected: TensorShape,
        actual: TensorShape,
    },

    /// A tensor buffer cannot be handed to the backend as-is.
    #[error("invalid tensor buffer: {0}")]
    InvalidBuffer(String),

    /// Operation on a network id that is not currently loaded.
    #[error("unknown network id: {0}")]
    UnknownNetwork(NetworkId),

    /// A packed shape value decodes to an implausible dimension list.
    #[error("malformed packed shape {packed:#x}: {detail}")]
    MalformedShape { packed: u64, detail: String },

    /// Operation on an engine that has already been destroyed.
    #[error("engine has already been destroyed")]
    UseAfterDestroy,

    /// The engine lock was poisoned by a panicking holder.
    #[error("engine lock poisoned: {0}")]
    Poisoned(String),

    /// Failure reported by the backend driver layer.
    #[error("backend driver error: {0}")]
    Driver(#[from] DriverError),
}

/// Errors reported by a backend driver.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The backend shared library could not be opened.
    #[error("failed to load backend library: {0}")]
    Library(String),

    /// A required symbol is missing from the backend library.
    #[error("failed to resolve backend symbol {0}")]
    MissingSymbol(String),

    /// The backend failed to create an engine instance.
    #[error("backend init failed: {0}")]
    InitFailed(String),

    /// The backend refused to load a network.
    #[error("backend rejected the network: {0}")]
    LoadRejected(String),

    /// The backend failed to tear the engine down cleanly.
    #[error("backend teardown failed: {0}")]
    DestroyFailed(String),

    /// An argument cannot be marshalled across the C boundary.
    #[error("invalid backend argument: {0}")]
    InvalidArgument(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
