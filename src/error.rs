//! Bridge Errors

use thiserror::Error;

use crate::config::ConfigError;
use crate::tag::ElementType;

/// Error type for bridge operations.
///
/// Data-class variants are recoverable and describe the offending shape or
/// size. `Misaligned` is a defect: the caller asked for an element type that
/// does not fit the engine's bytes, which is a programming error.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// In-place update larger than the existing buffer
    #[error("{operation}: typed array too small to fit provided data ({available} bytes available, {requested} bytes provided)")]
    TooSmall {
        operation: &'static str,
        available: usize,
        requested: usize,
    },

    /// No byte pointer could be obtained
    #[error("{operation}: invalid typed array data (engine reports {engine_type})")]
    InvalidData {
        operation: &'static str,
        engine_type: ElementType,
    },

    /// The host value is not an object
    #[error("{operation}: value is not an object")]
    NotAnObject { operation: &'static str },

    /// The host object was not produced by this bridge
    #[error("{operation}: object is not backed by an engine handle")]
    ForeignObject { operation: &'static str },

    /// Byte span not a multiple of the element width
    #[error("defect in {operation}: byte length {byte_length} is not a multiple of element size {element_size}")]
    Misaligned {
        operation: &'static str,
        byte_length: usize,
        element_size: usize,
    },

    /// The engine refused to build an object
    #[error("{operation}: engine returned no object for {element_type}")]
    EngineRefused {
        operation: &'static str,
        element_type: ElementType,
    },

    /// Failed to load the engine library
    #[error("Load error: {0}")]
    Load(String),

    /// Engine library lacks a required entry point
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// Check if this error is a programming defect rather than bad input
    pub fn is_defect(&self) -> bool {
        matches!(self, BridgeError::Misaligned { .. })
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
