//! Typed Array Bridge
//!
//! Exchanges raw binary buffers (integer and float arrays, opaque byte
//! buffers) between a host application and a JavaScriptCore-style scripting
//! engine, keeping engine object lifetimes tied to host values and surviving
//! engine context teardown.
//!
//! # Features
//!
//! - **Zero-copy construction**: host bytes are allocated once and adopted by
//!   the engine, which frees them through a registered deallocator
//! - **Typed reads**: typed arrays, offset views and array buffers are copied
//!   out as `Vec<T>` with element-width checks
//! - **In-place update**: overwrite the leading bytes of an existing array
//! - **Type detection**: total mapping from engine values to [`ElementType`]
//! - **Teardown-safe lifetimes**: protect on wrap, release on dispose, no
//!   release after the context is gone
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   Host code          │  create / from_value / update_with_data / type_from_value
//! └─────────┬────────────┘
//!           ▼
//! ┌──────────────────────┐
//! │   convert            │  TypedArrayBridge
//! └──┬────────┬──────────┘
//!    ▼        ▼
//! ┌──────┐ ┌──────────────────┐
//! │ tag  │ │ lifetime + shim  │  EngineObjectHandle, recover_context
//! └──────┘ └────────┬─────────┘
//!                   ▼
//! ┌──────────────────────┐
//! │   ffi::Engine        │  JscLibrary (libloading) or SimEngine
//! └──────────────────────┘
//! ```
//!
//! # Threading
//!
//! All engine calls happen on the thread that owns the engine context; the
//! bridge does no locking of its own. Host values may be disposed on another
//! thread: the release they issue is skipped once the context is torn down.

#![warn(clippy::all)]

pub mod config;
pub mod convert;
pub mod error;
pub mod ffi;
pub mod host;
pub mod lifetime;
pub mod shim;
pub mod tag;

// Re-export commonly used types
pub use config::{BridgeConfig, ConfigError, CreateStrategy};
pub use convert::TypedArrayBridge;
pub use error::{BridgeError, BridgeResult};
pub use ffi::{Engine, JscLibrary, SimEngine};
pub use host::{HostObject, HostRuntime, HostValue, PointerValue};
pub use lifetime::{engine_object, wrap_value, EngineObjectHandle};
pub use shim::{mark_context_torn_down, EngineContext, EngineRuntime, RUNTIME_LAYOUT_VERSION};
pub use tag::{
    ArrayBuffer, ArrayKind, Element, ElementType, EngineTypedArrayType, Float32Array,
    Float64Array, Int16Array, Int32Array, Int8Array, Uint16Array, Uint32Array, Uint8Array,
    Uint8ClampedArray,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
