//! Engine FFI Module
//!
//! The fixed set of scripting-engine calls the bridge consumes, isolated behind
//! the [`Engine`] trait so that every version-sensitive entry point lives in
//! exactly one place.
//!
//! # Architecture
//!
//! ```text
//! convert (create / read / update / detect)
//!       │
//!       ▼
//! shim + lifetime (context recovery, protect/release)
//!       │
//!       ▼
//! Engine trait
//!   ├── JscLibrary  (JavaScriptCore, resolved through libloading)
//!   └── SimEngine   (in-process model used by tests and `tab-probe selftest`)
//! ```
//!
//! # Threading
//!
//! Every call must happen on the thread that owns the engine context. The
//! one exception is [`Engine::value_unprotect`], which a host may issue from
//! a collector thread; it is only ever reached through the teardown guard in
//! [`crate::shim::EngineContext::release`].

mod loader;
pub mod sim;
mod types;

pub use loader::{JscLibrary, DEFAULT_LIBRARY_CANDIDATES, REQUIRED_SYMBOLS};
pub use sim::SimEngine;
pub use types::{
    JSClassRef, JSContextRef, JSGlobalContextRef, JSObjectRef, JSTypedArrayBytesDeallocator,
    JSValueRef, OpaqueJSContext, OpaqueJSValue, RawByteRegion, RawTypedArrayType,
};

/// Downstream contract with the scripting engine.
///
/// Method names follow the engine's C API one-to-one. Exceptions are never
/// requested; failures surface as null pointers or zero lengths, which is how
/// the engine reports them when no exception slot is supplied.
///
/// # Safety
///
/// Implementors must treat `ctx` and every object argument as handles owned
/// by the engine. Callers must pass handles that belong to `ctx` and must be
/// on the context's owning thread (see module docs for the release exception).
pub unsafe trait Engine: Send + Sync + 'static {
    /// Short human-readable name for logs and diagnostics
    fn name(&self) -> &str;

    /// `JSValueProtect`: increment the value's external retain count
    unsafe fn value_protect(&self, ctx: JSContextRef, value: JSValueRef);

    /// `JSValueUnprotect`: decrement the value's external retain count
    unsafe fn value_unprotect(&self, ctx: JSContextRef, value: JSValueRef);

    /// `JSValueToObject`: null when the value cannot be converted
    unsafe fn value_to_object(&self, ctx: JSContextRef, value: JSValueRef) -> JSObjectRef;

    /// `JSObjectMake` with no class and no private data
    unsafe fn object_make(&self, ctx: JSContextRef) -> JSObjectRef;

    /// `JSValueGetTypedArrayType`
    unsafe fn value_get_typed_array_type(
        &self,
        ctx: JSContextRef,
        value: JSValueRef,
    ) -> RawTypedArrayType;

    /// `JSObjectMakeTypedArray`: engine-allocated, zero-filled
    unsafe fn object_make_typed_array(
        &self,
        ctx: JSContextRef,
        array_type: RawTypedArrayType,
        length: usize,
    ) -> JSObjectRef;

    /// `JSObjectMakeTypedArrayWithBytesNoCopy`: the engine adopts `bytes`
    /// and calls `deallocator(bytes, deallocator_context)` when it frees them.
    unsafe fn object_make_typed_array_with_bytes_no_copy(
        &self,
        ctx: JSContextRef,
        array_type: RawTypedArrayType,
        bytes: *mut std::ffi::c_void,
        byte_length: usize,
        deallocator: JSTypedArrayBytesDeallocator,
        deallocator_context: *mut std::ffi::c_void,
    ) -> JSObjectRef;

    /// `JSObjectMakeArrayBufferWithBytesNoCopy`: same adoption rules as above
    unsafe fn object_make_array_buffer_with_bytes_no_copy(
        &self,
        ctx: JSContextRef,
        bytes: *mut std::ffi::c_void,
        byte_length: usize,
        deallocator: JSTypedArrayBytesDeallocator,
        deallocator_context: *mut std::ffi::c_void,
    ) -> JSObjectRef;

    /// `JSObjectGetTypedArrayByteLength`
    unsafe fn typed_array_byte_length(&self, ctx: JSContextRef, object: JSObjectRef) -> usize;

    /// `JSObjectGetTypedArrayByteOffset`
    unsafe fn typed_array_byte_offset(&self, ctx: JSContextRef, object: JSObjectRef) -> usize;

    /// `JSObjectGetTypedArrayBytesPtr`: start of the backing store, not the view
    unsafe fn typed_array_bytes_ptr(
        &self,
        ctx: JSContextRef,
        object: JSObjectRef,
    ) -> *mut std::ffi::c_void;

    /// `JSObjectGetArrayBufferByteLength`
    unsafe fn array_buffer_byte_length(&self, ctx: JSContextRef, object: JSObjectRef) -> usize;

    /// `JSObjectGetArrayBufferBytesPtr`
    unsafe fn array_buffer_bytes_ptr(
        &self,
        ctx: JSContextRef,
        object: JSObjectRef,
    ) -> *mut std::ffi::c_void;
}
