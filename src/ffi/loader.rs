//! Engine Library Loader
//!
//! Opens the JavaScriptCore shared library with libloading and resolves every
//! entry point the bridge needs up front, so a missing symbol is reported at
//! load time rather than in the middle of a conversion.

use std::ffi::{c_void, CString};
use std::path::{Path, PathBuf};

use libloading::Library;

use super::types::{
    JSClassRef, JSContextRef, JSObjectRef, JSTypedArrayBytesDeallocator, JSValueRef,
    RawTypedArrayType,
};
use super::Engine;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};

/// Symbols resolved by [`JscLibrary::load`], in resolution order
pub const REQUIRED_SYMBOLS: &[&str] = &[
    "JSValueProtect",
    "JSValueUnprotect",
    "JSValueToObject",
    "JSObjectMake",
    "JSValueGetTypedArrayType",
    "JSObjectMakeTypedArray",
    "JSObjectMakeTypedArrayWithBytesNoCopy",
    "JSObjectMakeArrayBufferWithBytesNoCopy",
    "JSObjectGetTypedArrayByteLength",
    "JSObjectGetTypedArrayByteOffset",
    "JSObjectGetTypedArrayBytesPtr",
    "JSObjectGetArrayBufferByteLength",
    "JSObjectGetArrayBufferBytesPtr",
];

/// Platform locations tried when nothing is configured
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY_CANDIDATES: &[&str] = &[
    "/System/Library/Frameworks/JavaScriptCore.framework/JavaScriptCore",
];

/// Platform locations tried when nothing is configured
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_LIBRARY_CANDIDATES: &[&str] = &[
    "libjavascriptcoregtk-4.1.so.0",
    "libjavascriptcoregtk-6.0.so.1",
    "libjavascriptcoregtk-4.0.so.18",
];

type ExceptionOut = *mut JSValueRef;

type ValueProtectFn = unsafe extern "C" fn(JSContextRef, JSValueRef);
type ValueToObjectFn = unsafe extern "C" fn(JSContextRef, JSValueRef, ExceptionOut) -> JSObjectRef;
type ObjectMakeFn = unsafe extern "C" fn(JSContextRef, JSClassRef, *mut c_void) -> JSObjectRef;
type GetTypedArrayTypeFn =
    unsafe extern "C" fn(JSContextRef, JSValueRef, ExceptionOut) -> RawTypedArrayType;
type MakeTypedArrayFn =
    unsafe extern "C" fn(JSContextRef, RawTypedArrayType, usize, ExceptionOut) -> JSObjectRef;
type MakeTypedArrayNoCopyFn = unsafe extern "C" fn(
    JSContextRef,
    RawTypedArrayType,
    *mut c_void,
    usize,
    JSTypedArrayBytesDeallocator,
    *mut c_void,
    ExceptionOut,
) -> JSObjectRef;
type MakeArrayBufferNoCopyFn = unsafe extern "C" fn(
    JSContextRef,
    *mut c_void,
    usize,
    JSTypedArrayBytesDeallocator,
    *mut c_void,
    ExceptionOut,
) -> JSObjectRef;
type ObjectSizeFn = unsafe extern "C" fn(JSContextRef, JSObjectRef, ExceptionOut) -> usize;
type ObjectBytesFn = unsafe extern "C" fn(JSContextRef, JSObjectRef, ExceptionOut) -> *mut c_void;

/// Resolved entry points. Copied out of their `Symbol`s; valid while the
/// owning `Library` is alive.
struct JscFunctions {
    value_protect: ValueProtectFn,
    value_unprotect: ValueProtectFn,
    value_to_object: ValueToObjectFn,
    object_make: ObjectMakeFn,
    get_typed_array_type: GetTypedArrayTypeFn,
    make_typed_array: MakeTypedArrayFn,
    make_typed_array_no_copy: MakeTypedArrayNoCopyFn,
    make_array_buffer_no_copy: MakeArrayBufferNoCopyFn,
    typed_array_byte_length: ObjectSizeFn,
    typed_array_byte_offset: ObjectSizeFn,
    typed_array_bytes_ptr: ObjectBytesFn,
    array_buffer_byte_length: ObjectSizeFn,
    array_buffer_bytes_ptr: ObjectBytesFn,
}

/// A loaded JavaScriptCore library
pub struct JscLibrary {
    /// Path the library was opened from
    path: PathBuf,
    /// Resolved entry points
    fns: JscFunctions,
    /// Keeps the code mapped; must outlive `fns`
    _library: Library,
}

impl JscLibrary {
    /// Load the engine library from the given path or soname
    pub fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Safety: loading runs the library's initializers. We trust the
        // caller to point us at a genuine JavaScriptCore build.
        let library = unsafe {
            Library::new(&path).map_err(|e| {
                BridgeError::Load(format!(
                    "Failed to load engine library '{}': {}",
                    path.display(),
                    e
                ))
            })?
        };

        let fns = unsafe { resolve_all(&library, &path)? };
        log::debug!("[Loader] Resolved {} engine symbols from {}", REQUIRED_SYMBOLS.len(), path.display());

        Ok(Self {
            path,
            fns,
            _library: library,
        })
    }

    /// Load using the configured path, then search paths, then platform defaults
    pub fn open_default(config: &BridgeConfig) -> BridgeResult<Self> {
        let mut attempts = Vec::new();

        for candidate in candidate_paths(config) {
            match Self::load(&candidate) {
                Ok(lib) => return Ok(lib),
                Err(e) => {
                    log::debug!("[Loader] {} unavailable: {}", candidate.display(), e);
                    attempts.push(candidate.display().to_string());
                }
            }
        }

        Err(BridgeError::Load(format!(
            "No engine library found (tried: {})",
            attempts.join(", ")
        )))
    }

    /// Get the path to this library
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Report which required symbols a library exports without keeping it loaded
    pub fn probe(path: impl AsRef<Path>) -> BridgeResult<Vec<(&'static str, bool)>> {
        let path = path.as_ref();
        let library = unsafe {
            Library::new(path).map_err(|e| {
                BridgeError::Load(format!("Failed to load engine library '{}': {}", path.display(), e))
            })?
        };

        let mut report = Vec::with_capacity(REQUIRED_SYMBOLS.len());
        for &name in REQUIRED_SYMBOLS {
            let c_name = symbol_name(name)?;
            // Safety: we only test for presence; the symbol is never called.
            let found = unsafe { library.get::<*const ()>(c_name.as_bytes_with_nul()).is_ok() };
            report.push((name, found));
        }
        Ok(report)
    }
}

/// Ordered list of places to look for the engine library
pub(crate) fn candidate_paths(config: &BridgeConfig) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(library) = &config.engine.library {
        paths.push(library.clone());
        // A bare file name is also tried inside each search path
        if library.components().count() == 1 {
            for dir in &config.engine.search_paths {
                paths.push(dir.join(library));
            }
        }
    }

    for dir in &config.engine.search_paths {
        for candidate in DEFAULT_LIBRARY_CANDIDATES {
            paths.push(dir.join(candidate));
        }
    }

    paths.extend(DEFAULT_LIBRARY_CANDIDATES.iter().map(PathBuf::from));
    paths
}

fn symbol_name(name: &str) -> BridgeResult<CString> {
    CString::new(name).map_err(|_| BridgeError::SymbolNotFound(format!("Invalid symbol name: {}", name)))
}

/// Resolve one symbol as a function pointer of type `T`.
///
/// # Safety
///
/// `T` must be the exact C signature of the named symbol.
unsafe fn resolve<T: Copy>(library: &Library, path: &Path, name: &str) -> BridgeResult<T> {
    let c_name = symbol_name(name)?;
    let symbol = unsafe {
        library.get::<T>(c_name.as_bytes_with_nul()).map_err(|e| {
            BridgeError::SymbolNotFound(format!(
                "Symbol '{}' not found in '{}': {}",
                name,
                path.display(),
                e
            ))
        })?
    };
    Ok(*symbol)
}

/// # Safety
///
/// The library must be a JavaScriptCore build exporting the public C API.
unsafe fn resolve_all(library: &Library, path: &Path) -> BridgeResult<JscFunctions> {
    unsafe {
        Ok(JscFunctions {
            value_protect: resolve(library, path, "JSValueProtect")?,
            value_unprotect: resolve(library, path, "JSValueUnprotect")?,
            value_to_object: resolve(library, path, "JSValueToObject")?,
            object_make: resolve(library, path, "JSObjectMake")?,
            get_typed_array_type: resolve(library, path, "JSValueGetTypedArrayType")?,
            make_typed_array: resolve(library, path, "JSObjectMakeTypedArray")?,
            make_typed_array_no_copy: resolve(library, path, "JSObjectMakeTypedArrayWithBytesNoCopy")?,
            make_array_buffer_no_copy: resolve(library, path, "JSObjectMakeArrayBufferWithBytesNoCopy")?,
            typed_array_byte_length: resolve(library, path, "JSObjectGetTypedArrayByteLength")?,
            typed_array_byte_offset: resolve(library, path, "JSObjectGetTypedArrayByteOffset")?,
            typed_array_bytes_ptr: resolve(library, path, "JSObjectGetTypedArrayBytesPtr")?,
            array_buffer_byte_length: resolve(library, path, "JSObjectGetArrayBufferByteLength")?,
            array_buffer_bytes_ptr: resolve(library, path, "JSObjectGetArrayBufferBytesPtr")?,
        })
    }
}

// Safety: the function table is immutable after load and the engine's own
// threading contract is enforced by callers, not by this handle.
unsafe impl Send for JscLibrary {}
unsafe impl Sync for JscLibrary {}

unsafe impl Engine for JscLibrary {
    fn name(&self) -> &str {
        "JavaScriptCore"
    }

    unsafe fn value_protect(&self, ctx: JSContextRef, value: JSValueRef) {
        unsafe { (self.fns.value_protect)(ctx, value) }
    }

    unsafe fn value_unprotect(&self, ctx: JSContextRef, value: JSValueRef) {
        unsafe { (self.fns.value_unprotect)(ctx, value) }
    }

    unsafe fn value_to_object(&self, ctx: JSContextRef, value: JSValueRef) -> JSObjectRef {
        if value.is_null() {
            return std::ptr::null_mut();
        }
        unsafe { (self.fns.value_to_object)(ctx, value, std::ptr::null_mut()) }
    }

    unsafe fn object_make(&self, ctx: JSContextRef) -> JSObjectRef {
        unsafe { (self.fns.object_make)(ctx, std::ptr::null_mut(), std::ptr::null_mut()) }
    }

    unsafe fn value_get_typed_array_type(
        &self,
        ctx: JSContextRef,
        value: JSValueRef,
    ) -> RawTypedArrayType {
        unsafe { (self.fns.get_typed_array_type)(ctx, value, std::ptr::null_mut()) }
    }

    unsafe fn object_make_typed_array(
        &self,
        ctx: JSContextRef,
        array_type: RawTypedArrayType,
        length: usize,
    ) -> JSObjectRef {
        unsafe { (self.fns.make_typed_array)(ctx, array_type, length, std::ptr::null_mut()) }
    }

    unsafe fn object_make_typed_array_with_bytes_no_copy(
        &self,
        ctx: JSContextRef,
        array_type: RawTypedArrayType,
        bytes: *mut c_void,
        byte_length: usize,
        deallocator: JSTypedArrayBytesDeallocator,
        deallocator_context: *mut c_void,
    ) -> JSObjectRef {
        unsafe {
            (self.fns.make_typed_array_no_copy)(
                ctx,
                array_type,
                bytes,
                byte_length,
                deallocator,
                deallocator_context,
                std::ptr::null_mut(),
            )
        }
    }

    unsafe fn object_make_array_buffer_with_bytes_no_copy(
        &self,
        ctx: JSContextRef,
        bytes: *mut c_void,
        byte_length: usize,
        deallocator: JSTypedArrayBytesDeallocator,
        deallocator_context: *mut c_void,
    ) -> JSObjectRef {
        unsafe {
            (self.fns.make_array_buffer_no_copy)(
                ctx,
                bytes,
                byte_length,
                deallocator,
                deallocator_context,
                std::ptr::null_mut(),
            )
        }
    }

    unsafe fn typed_array_byte_length(&self, ctx: JSContextRef, object: JSObjectRef) -> usize {
        unsafe { (self.fns.typed_array_byte_length)(ctx, object, std::ptr::null_mut()) }
    }

    unsafe fn typed_array_byte_offset(&self, ctx: JSContextRef, object: JSObjectRef) -> usize {
        unsafe { (self.fns.typed_array_byte_offset)(ctx, object, std::ptr::null_mut()) }
    }

    unsafe fn typed_array_bytes_ptr(&self, ctx: JSContextRef, object: JSObjectRef) -> *mut c_void {
        unsafe { (self.fns.typed_array_bytes_ptr)(ctx, object, std::ptr::null_mut()) }
    }

    unsafe fn array_buffer_byte_length(&self, ctx: JSContextRef, object: JSObjectRef) -> usize {
        unsafe { (self.fns.array_buffer_byte_length)(ctx, object, std::ptr::null_mut()) }
    }

    unsafe fn array_buffer_bytes_ptr(&self, ctx: JSContextRef, object: JSObjectRef) -> *mut c_void {
        unsafe { (self.fns.array_buffer_bytes_ptr)(ctx, object, std::ptr::null_mut()) }
    }
}

impl std::fmt::Debug for JscLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JscLibrary").field("path", &self.path).finish_non_exhaustive()
    }
}
