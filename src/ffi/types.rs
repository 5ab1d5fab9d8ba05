//! Engine ABI Types
//!
//! Raw handle and callback types of the engine's C API. These mirror the
//! JavaScriptCore public headers (`JSBase.h`, `JSTypedArray.h`) and are only
//! ever passed through; the bridge never dereferences them itself.

use std::ffi::{c_uint, c_void};
use std::fmt;

/// Opaque engine context structure
#[repr(C)]
pub struct OpaqueJSContext {
    _data: [u8; 0],
    _marker: core::marker::PhantomData<(*mut u8, core::marker::PhantomPinned)>,
}

/// Opaque engine value structure
#[repr(C)]
pub struct OpaqueJSValue {
    _data: [u8; 0],
    _marker: core::marker::PhantomData<(*mut u8, core::marker::PhantomPinned)>,
}

/// Opaque engine class structure (only ever null here)
#[repr(C)]
pub struct OpaqueJSClass {
    _data: [u8; 0],
    _marker: core::marker::PhantomData<(*mut u8, core::marker::PhantomPinned)>,
}

/// Execution context handle
pub type JSContextRef = *const OpaqueJSContext;
/// Global execution context handle (same object, mutable by contract)
pub type JSGlobalContextRef = *mut OpaqueJSContext;
/// Any engine value
pub type JSValueRef = *const OpaqueJSValue;
/// An engine value known to be an object
pub type JSObjectRef = *mut OpaqueJSValue;
/// Class handle for `JSObjectMake`
pub type JSClassRef = *mut OpaqueJSClass;

/// Raw typed array type discriminant as the engine returns it
pub type RawTypedArrayType = c_uint;

/// Deallocator the engine invokes when it frees adopted bytes
pub type JSTypedArrayBytesDeallocator =
    Option<unsafe extern "C" fn(bytes: *mut c_void, deallocator_context: *mut c_void)>;

/// A non-owning view into engine-managed bytes.
///
/// Valid only for the duration of the call that produced it.
#[derive(Clone, Copy)]
pub struct RawByteRegion {
    /// Start of the backing store (before `byte_offset` is applied)
    pub base: *mut u8,
    /// Offset of the view into the backing store
    pub byte_offset: usize,
    /// Length of the view in bytes
    pub byte_length: usize,
}

impl RawByteRegion {
    /// Check whether the engine handed back a usable pointer
    pub fn is_null(&self) -> bool {
        self.base.is_null()
    }

    /// Borrow the region as a byte slice.
    ///
    /// # Safety
    ///
    /// `base + byte_offset .. + byte_length` must be readable engine memory
    /// that stays alive and unmodified for `'a`.
    pub unsafe fn as_bytes<'a>(&self) -> &'a [u8] {
        if self.byte_length == 0 {
            return &[];
        }
        // SAFETY: upheld by caller.
        unsafe { std::slice::from_raw_parts(self.base.add(self.byte_offset), self.byte_length) }
    }
}

impl fmt::Debug for RawByteRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawByteRegion")
            .field("base", &self.base)
            .field("byte_offset", &self.byte_offset)
            .field("byte_length", &self.byte_length)
            .finish()
    }
}
