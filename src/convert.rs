//! Conversion Engine
//!
//! Moves element data between host vectors and engine typed arrays:
//! construction (zero-copy adoption or engine copy), in-place byte overwrite,
//! typed reads, and runtime type detection.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use typed_array_bridge::convert::TypedArrayBridge;
//! use typed_array_bridge::ffi::SimEngine;
//! use typed_array_bridge::shim::EngineRuntime;
//! use typed_array_bridge::tag::{ElementType, Int32Array};
//!
//! let sim = Arc::new(SimEngine::new());
//! let runtime = EngineRuntime::new(sim.create_context());
//! let bridge = TypedArrayBridge::new(sim.clone());
//! let rt = runtime.as_host();
//!
//! let value = bridge.create::<Int32Array>(rt, &[1, 2, 3]).unwrap();
//! assert_eq!(bridge.from_value::<Int32Array>(rt, &value).unwrap(), vec![1, 2, 3]);
//!
//! bridge.update_with_data(rt, &value, &9i32.to_ne_bytes()).unwrap();
//! assert_eq!(bridge.from_value::<Int32Array>(rt, &value).unwrap(), vec![9, 2, 3]);
//! assert_eq!(bridge.type_from_value(rt, &value), ElementType::Int32Array);
//! ```

use std::alloc::{self, Layout};
use std::ffi::c_void;
use std::mem::size_of;
use std::sync::Arc;

use crate::config::{BridgeConfig, CreateStrategy};
use crate::error::{BridgeError, BridgeResult};
use crate::ffi::{Engine, JSObjectRef, JscLibrary, RawByteRegion};
use crate::host::{HostRuntime, HostValue};
use crate::lifetime::{engine_handle, engine_object, wrap_object};
use crate::shim::{recover_context, EngineContext};
use crate::tag::{ArrayKind, Element, ElementType};

/// Alignment of host buffers handed to the engine; enough for any element
const ADOPTED_ALIGN: usize = 16;

/// Deallocator registered with the engine for adopted host buffers.
///
/// The byte length travels in the deallocator context.
unsafe extern "C" fn free_adopted_bytes(bytes: *mut c_void, deallocator_context: *mut c_void) {
    let byte_length = deallocator_context as usize;
    if bytes.is_null() || byte_length == 0 {
        return;
    }
    // Safety: allocated by `alloc_adopted` with this exact layout.
    unsafe {
        let layout = Layout::from_size_align_unchecked(byte_length, ADOPTED_ALIGN);
        alloc::dealloc(bytes.cast::<u8>(), layout);
    }
}

/// Allocate `src.len()` bytes for adoption and copy `src` in
fn alloc_adopted(src: &[u8]) -> *mut u8 {
    debug_assert!(!src.is_empty(), "adopted buffers are never empty");
    let layout = match Layout::from_size_align(src.len(), ADOPTED_ALIGN) {
        Ok(layout) => layout,
        Err(_) => alloc::handle_alloc_error(Layout::new::<u8>()),
    };
    // Safety: layout has non-zero size.
    let ptr = unsafe { alloc::alloc(layout) };
    if ptr.is_null() {
        alloc::handle_alloc_error(layout);
    }
    unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), ptr, src.len()) };
    ptr
}

/// View a slice of elements as its bytes
fn element_bytes<T: Element>(data: &[T]) -> &[u8] {
    // Safety: `Element` types are plain old data with no padding.
    unsafe { std::slice::from_raw_parts(data.as_ptr().cast::<u8>(), std::mem::size_of_val(data)) }
}

/// Converts between host element vectors and engine typed arrays
pub struct TypedArrayBridge {
    engine: Arc<dyn Engine>,
    strategy: CreateStrategy,
}

impl TypedArrayBridge {
    /// Create a bridge over an engine with the default strategy
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            strategy: CreateStrategy::default(),
        }
    }

    /// Create a bridge over an engine using configured settings
    pub fn with_config(engine: Arc<dyn Engine>, config: &BridgeConfig) -> Self {
        Self::new(engine).with_strategy(config.create.strategy)
    }

    /// Load the engine library named by `config` and build a bridge on it
    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        let library = JscLibrary::open_default(config)?;
        log::debug!("[Bridge] Using engine library {}", library.path().display());
        Ok(Self::with_config(Arc::new(library), config))
    }

    /// Set the construction strategy
    pub fn with_strategy(mut self, strategy: CreateStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The engine this bridge talks to
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Current construction strategy
    pub fn strategy(&self) -> CreateStrategy {
        self.strategy
    }

    /// Build an engine typed array holding `data` and wrap it as a host value
    pub fn create<K: ArrayKind>(
        &self,
        runtime: &HostRuntime,
        data: &[K::Content],
    ) -> BridgeResult<HostValue> {
        const OP: &str = "create";
        let context = recover_context(runtime);
        let bytes = element_bytes(data);

        let object = if bytes.is_empty() {
            self.make_empty(&context, K::TYPE)
        } else {
            match (self.strategy, K::TYPE) {
                (CreateStrategy::EngineCopy, ty) if ty.is_typed_array() => {
                    self.make_engine_copy(&context, ty, data.len(), bytes)?
                }
                (CreateStrategy::EngineCopy, ty) => {
                    log::debug!("[Bridge] {} has no engine allocator, adopting host bytes", ty);
                    self.make_adopted(&context, ty, bytes)
                }
                (CreateStrategy::NoCopy, ty) => self.make_adopted(&context, ty, bytes),
            }
        };

        if object.is_null() {
            return Err(BridgeError::EngineRefused {
                operation: OP,
                element_type: K::TYPE,
            });
        }
        // Safety: fresh object of this context, owned by nobody else yet.
        Ok(unsafe { wrap_object(&self.engine, context, object) })
    }

    /// Overwrite the leading bytes of an existing typed array.
    ///
    /// Writing starts at offset 0 of the view, which is the view's byte
    /// offset inside its backing buffer, not the start of that buffer. Never
    /// grows the array. Bytes past `data.len()` keep their old values.
    pub fn update_with_data(
        &self,
        runtime: &HostRuntime,
        value: &HostValue,
        data: &[u8],
    ) -> BridgeResult<()> {
        const OP: &str = "update_with_data";
        let object = engine_object(value, OP)?;
        let context = recover_context(runtime);
        let ctx = context.ctx();

        let byte_length = unsafe { self.engine.typed_array_byte_length(ctx, object) };
        if byte_length < data.len() {
            return Err(BridgeError::TooSmall {
                operation: OP,
                available: byte_length,
                requested: data.len(),
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let base = unsafe { self.engine.typed_array_bytes_ptr(ctx, object) }.cast::<u8>();
        if base.is_null() {
            return Err(BridgeError::InvalidData {
                operation: OP,
                engine_type: self.detect(&context, object),
            });
        }
        let byte_offset = unsafe { self.engine.typed_array_byte_offset(ctx, object) };
        // Safety: the view spans `byte_length >= data.len()` bytes from
        // `base + byte_offset`, and the handle keeps it alive.
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), base.add(byte_offset), data.len()) };
        Ok(())
    }

    /// Copy the elements of a typed array or array buffer out of the engine
    pub fn from_value<K: ArrayKind>(
        &self,
        runtime: &HostRuntime,
        value: &HostValue,
    ) -> BridgeResult<Vec<K::Content>> {
        self.read_elements::<K::Content>(runtime, value, "from_value")
    }

    /// Copy the raw bytes of a typed array or array buffer out of the engine
    pub fn raw_from_value(&self, runtime: &HostRuntime, value: &HostValue) -> BridgeResult<Vec<u8>> {
        self.read_elements::<u8>(runtime, value, "raw_from_value")
    }

    /// Element type of a host value. Never fails: anything that is not an
    /// engine typed array or array buffer is `None`.
    pub fn type_from_value(&self, runtime: &HostRuntime, value: &HostValue) -> ElementType {
        match engine_handle(value, "type_from_value") {
            Ok(handle) => self.detect(&recover_context(runtime), handle.object()),
            Err(_) => ElementType::None,
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn detect(&self, context: &EngineContext, object: JSObjectRef) -> ElementType {
        let raw = unsafe {
            self.engine
                .value_get_typed_array_type(context.ctx(), object.cast_const())
        };
        ElementType::from_engine_raw(raw)
    }

    fn make_empty(&self, context: &EngineContext, ty: ElementType) -> JSObjectRef {
        let ctx = context.ctx();
        if ty == ElementType::ArrayBuffer {
            unsafe {
                self.engine.object_make_array_buffer_with_bytes_no_copy(
                    ctx,
                    std::ptr::null_mut(),
                    0,
                    None,
                    std::ptr::null_mut(),
                )
            }
        } else {
            unsafe { self.engine.object_make_typed_array(ctx, ty.engine_type().raw(), 0) }
        }
    }

    /// Hand a host copy of `bytes` to the engine; the engine frees it
    fn make_adopted(&self, context: &EngineContext, ty: ElementType, bytes: &[u8]) -> JSObjectRef {
        let ctx = context.ctx();
        let ptr = alloc_adopted(bytes).cast::<c_void>();
        let byte_length = bytes.len();
        let dealloc_ctx = byte_length as *mut c_void;

        // If the engine refuses (null) ownership is unclear; leaking is the
        // only outcome that cannot double free.
        unsafe {
            if ty == ElementType::ArrayBuffer {
                self.engine.object_make_array_buffer_with_bytes_no_copy(
                    ctx,
                    ptr,
                    byte_length,
                    Some(free_adopted_bytes),
                    dealloc_ctx,
                )
            } else {
                self.engine.object_make_typed_array_with_bytes_no_copy(
                    ctx,
                    ty.engine_type().raw(),
                    ptr,
                    byte_length,
                    Some(free_adopted_bytes),
                    dealloc_ctx,
                )
            }
        }
    }

    /// Let the engine allocate, then copy `bytes` into its store
    fn make_engine_copy(
        &self,
        context: &EngineContext,
        ty: ElementType,
        count: usize,
        bytes: &[u8],
    ) -> BridgeResult<JSObjectRef> {
        let ctx = context.ctx();
        let object = unsafe { self.engine.object_make_typed_array(ctx, ty.engine_type().raw(), count) };
        if object.is_null() {
            return Ok(object);
        }

        let region = unsafe { self.typed_region(context, object) };
        if region.is_null() || region.byte_length < bytes.len() {
            return Err(BridgeError::InvalidData {
                operation: "create",
                engine_type: ty,
            });
        }
        // Safety: the region is the fresh array's own store and nothing
        // else can reach the object yet.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                region.base.add(region.byte_offset),
                bytes.len(),
            )
        };
        Ok(object)
    }

    unsafe fn typed_region(&self, context: &EngineContext, object: JSObjectRef) -> RawByteRegion {
        let ctx = context.ctx();
        unsafe {
            RawByteRegion {
                base: self.engine.typed_array_bytes_ptr(ctx, object).cast::<u8>(),
                byte_offset: self.engine.typed_array_byte_offset(ctx, object),
                byte_length: self.engine.typed_array_byte_length(ctx, object),
            }
        }
    }

    /// Locate the bytes behind an object: whole buffer for an array buffer,
    /// offset view for a typed array, nothing otherwise.
    fn byte_region(&self, context: &EngineContext, object: JSObjectRef) -> (ElementType, RawByteRegion) {
        let ty = self.detect(context, object);
        let ctx = context.ctx();
        let region = match ty {
            ElementType::ArrayBuffer => unsafe {
                RawByteRegion {
                    base: self.engine.array_buffer_bytes_ptr(ctx, object).cast::<u8>(),
                    byte_offset: 0,
                    byte_length: self.engine.array_buffer_byte_length(ctx, object),
                }
            },
            ElementType::None => RawByteRegion {
                base: std::ptr::null_mut(),
                byte_offset: 0,
                byte_length: 0,
            },
            _ => unsafe { self.typed_region(context, object) },
        };
        (ty, region)
    }

    fn read_elements<T: Element>(
        &self,
        runtime: &HostRuntime,
        value: &HostValue,
        operation: &'static str,
    ) -> BridgeResult<Vec<T>> {
        let object = engine_object(value, operation)?;
        let context = recover_context(runtime);
        let (ty, region) = self.byte_region(&context, object);

        if region.is_null() {
            // Empty arrays may legitimately have no store
            if ty != ElementType::None && region.byte_length == 0 {
                return Ok(Vec::new());
            }
            return Err(BridgeError::InvalidData {
                operation,
                engine_type: ty,
            });
        }

        let element_size = size_of::<T>();
        if region.byte_length % element_size != 0 {
            log::error!(
                "[Bridge] {}: {} bytes of {} cannot be read as {}-byte elements",
                operation,
                region.byte_length,
                ty,
                element_size
            );
            return Err(BridgeError::Misaligned {
                operation,
                byte_length: region.byte_length,
                element_size,
            });
        }

        let count = region.byte_length / element_size;
        let mut out: Vec<T> = Vec::with_capacity(count);
        // Safety: the region is live while `value` holds its handle, and
        // `out` has room for exactly `byte_length` bytes. Bytewise copy, so
        // the engine store needs no particular alignment; every bit pattern
        // is a valid `Element`.
        unsafe {
            let src = region.as_bytes();
            std::ptr::copy_nonoverlapping(src.as_ptr(), out.as_mut_ptr().cast::<u8>(), src.len());
            out.set_len(count);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for TypedArrayBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedArrayBridge")
            .field("engine", &self.engine.name())
            .field("strategy", &self.strategy)
            .finish()
    }
}
