//! Simulated Engine
//!
//! An in-process model of the engine's C API, used by the test suite and by
//! `tab-probe selftest`. It tracks protect counts, adopted host buffers and
//! their deallocators, array buffers and typed views with byte offsets, so
//! ownership mistakes in the bridge show up as counter mismatches instead of
//! crashes.

use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::types::{
    JSContextRef, JSGlobalContextRef, JSObjectRef, JSTypedArrayBytesDeallocator, JSValueRef,
    RawTypedArrayType,
};
use super::Engine;
use crate::tag::EngineTypedArrayType;

/// Call counters observed by the simulated engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    /// Successful `JSValueProtect` calls
    pub protect_calls: usize,
    /// Successful `JSValueUnprotect` calls
    pub unprotect_calls: usize,
    /// Protect/unprotect calls on a dead context or unknown value
    pub invalid_calls: usize,
    /// Objects created since the engine was built
    pub objects_created: usize,
    /// Host deallocators invoked for adopted buffers
    pub deallocator_calls: usize,
    /// Adopted host buffers not yet handed back
    pub live_adopted_buffers: usize,
}

#[derive(Default)]
struct SharedCounters {
    deallocator_calls: AtomicUsize,
    live_adopted: AtomicUsize,
}

enum StoreRelease {
    /// Allocated by the engine itself
    Owned,
    /// Adopted from the host; handed back through the deallocator
    Adopted {
        deallocator: JSTypedArrayBytesDeallocator,
        context: *mut c_void,
    },
}

/// A backing store, shared between an array buffer and its views
struct SimStore {
    ptr: *mut u8,
    len: usize,
    release: StoreRelease,
    counters: Arc<SharedCounters>,
}

impl SimStore {
    fn zeroed(len: usize, counters: &Arc<SharedCounters>) -> Self {
        let boxed = vec![0u8; len].into_boxed_slice();
        Self {
            ptr: Box::into_raw(boxed).cast::<u8>(),
            len,
            release: StoreRelease::Owned,
            counters: Arc::clone(counters),
        }
    }

    fn from_bytes(bytes: &[u8], counters: &Arc<SharedCounters>) -> Self {
        let store = Self::zeroed(bytes.len(), counters);
        if !bytes.is_empty() {
            unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), store.ptr, bytes.len()) };
        }
        store
    }

    fn adopted(
        ptr: *mut u8,
        len: usize,
        deallocator: JSTypedArrayBytesDeallocator,
        context: *mut c_void,
        counters: &Arc<SharedCounters>,
    ) -> Self {
        counters.live_adopted.fetch_add(1, Ordering::Relaxed);
        Self {
            ptr,
            len,
            release: StoreRelease::Adopted {
                deallocator,
                context,
            },
            counters: Arc::clone(counters),
        }
    }
}

impl Drop for SimStore {
    fn drop(&mut self) {
        match self.release {
            StoreRelease::Owned => {
                let slice = std::ptr::slice_from_raw_parts_mut(self.ptr, self.len);
                // Safety: produced by Box::into_raw in `zeroed`.
                drop(unsafe { Box::from_raw(slice) });
            }
            StoreRelease::Adopted {
                deallocator,
                context,
            } => {
                self.counters.live_adopted.fetch_sub(1, Ordering::Relaxed);
                if let Some(dealloc) = deallocator {
                    unsafe { dealloc(self.ptr.cast::<c_void>(), context) };
                    self.counters.deallocator_calls.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

enum SimKind {
    /// `undefined`: a value that is not convertible to an object
    Undefined,
    Plain,
    ArrayBuffer(Arc<SimStore>),
    TypedArray {
        array_type: RawTypedArrayType,
        store: Arc<SimStore>,
        byte_offset: usize,
        byte_length: usize,
    },
}

struct SimObject {
    ctx: usize,
    kind: SimKind,
    protect_count: usize,
}

/// Fake addresses are unique across every engine in the process, the way
/// real context and object addresses are.
static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Default)]
struct SimState {
    contexts: HashSet<usize>,
    objects: HashMap<usize, SimObject>,
    stats: SimStats,
}

impl SimState {
    fn insert(&mut self, ctx: JSContextRef, kind: SimKind) -> JSObjectRef {
        let ctx = ctx as usize;
        if !self.contexts.contains(&ctx) {
            return std::ptr::null_mut();
        }
        let id = self.alloc_id();
        self.objects.insert(
            id,
            SimObject {
                ctx,
                kind,
                protect_count: 0,
            },
        );
        self.stats.objects_created += 1;
        id as JSObjectRef
    }

    fn alloc_id(&mut self) -> usize {
        // Non-null, pointer-aligned fake addresses
        NEXT_ID.fetch_add(1, Ordering::Relaxed) << 4
    }

    fn object(&self, ctx: JSContextRef, value: JSValueRef) -> Option<&SimObject> {
        let obj = self.objects.get(&(value as usize))?;
        (obj.ctx == ctx as usize).then_some(obj)
    }
}

/// Bytes per element for every typed array type the model can build,
/// including the 64-bit BigInt arrays the bridge does not support.
fn element_width(array_type: RawTypedArrayType) -> Option<usize> {
    match array_type {
        0 | 3 | 4 => Some(1),
        1 | 5 => Some(2),
        2 | 6 | 7 => Some(4),
        8 | 11 | 12 => Some(8),
        _ => None,
    }
}

/// In-process engine model
pub struct SimEngine {
    state: Mutex<SimState>,
    counters: Arc<SharedCounters>,
}

impl SimEngine {
    /// Create an engine with no contexts
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            counters: Arc::new(SharedCounters::default()),
        }
    }

    /// Create a fresh global context
    pub fn create_context(&self) -> JSGlobalContextRef {
        let mut state = self.state.lock();
        let id = state.alloc_id();
        state.contexts.insert(id);
        id as JSGlobalContextRef
    }

    /// Tear a context down, freeing every object it owns regardless of
    /// protect counts. Adopted buffers are handed back to the host.
    pub fn destroy_context(&self, ctx: JSGlobalContextRef) {
        let freed: Vec<SimObject> = {
            let mut state = self.state.lock();
            let ctx = ctx as usize;
            if !state.contexts.remove(&ctx) {
                return;
            }
            let ids: Vec<usize> = state
                .objects
                .iter()
                .filter(|(_, obj)| obj.ctx == ctx)
                .map(|(&id, _)| id)
                .collect();
            ids.into_iter()
                .filter_map(|id| state.objects.remove(&id))
                .collect()
        };
        log::debug!("[SimEngine] Context destroyed, {} objects freed", freed.len());
        drop(freed);
    }

    /// Free every object whose protect count is zero. Returns how many were freed.
    pub fn collect_garbage(&self) -> usize {
        let freed: Vec<SimObject> = {
            let mut state = self.state.lock();
            let ids: Vec<usize> = state
                .objects
                .iter()
                .filter(|(_, obj)| obj.protect_count == 0)
                .map(|(&id, _)| id)
                .collect();
            ids.into_iter()
                .filter_map(|id| state.objects.remove(&id))
                .collect()
        };
        freed.len()
    }

    /// Make an engine-owned array buffer holding a copy of `bytes`
    pub fn make_array_buffer(&self, ctx: JSContextRef, bytes: &[u8]) -> JSObjectRef {
        let store = Arc::new(SimStore::from_bytes(bytes, &self.counters));
        self.state.lock().insert(ctx, SimKind::ArrayBuffer(store))
    }

    /// Make a typed view over an existing array buffer. Returns null when the
    /// buffer is not an array buffer or the range does not fit.
    pub fn make_typed_view(
        &self,
        ctx: JSContextRef,
        array_type: EngineTypedArrayType,
        buffer: JSObjectRef,
        byte_offset: usize,
        byte_length: usize,
    ) -> JSObjectRef {
        let mut state = self.state.lock();
        let store = match state.object(ctx, buffer).map(|obj| &obj.kind) {
            Some(SimKind::ArrayBuffer(store)) => Arc::clone(store),
            _ => return std::ptr::null_mut(),
        };
        let fits = byte_offset
            .checked_add(byte_length)
            .is_some_and(|end| end <= store.len);
        if !fits || element_width(array_type.raw()).is_none() {
            return std::ptr::null_mut();
        }
        state.insert(
            ctx,
            SimKind::TypedArray {
                array_type: array_type.raw(),
                store,
                byte_offset,
                byte_length,
            },
        )
    }

    /// Make the `undefined` value
    pub fn make_undefined(&self, ctx: JSContextRef) -> JSValueRef {
        self.state.lock().insert(ctx, SimKind::Undefined).cast_const()
    }

    /// Current external retain count of a value, if it is still alive
    pub fn protect_count(&self, value: JSValueRef) -> Option<usize> {
        self.state
            .lock()
            .objects
            .get(&(value as usize))
            .map(|obj| obj.protect_count)
    }

    /// Whether the value has not been freed yet
    pub fn is_alive(&self, value: JSValueRef) -> bool {
        self.state.lock().objects.contains_key(&(value as usize))
    }

    /// Number of live objects across all contexts
    pub fn live_objects(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// Snapshot of the call counters
    pub fn stats(&self) -> SimStats {
        let mut stats = self.state.lock().stats;
        stats.deallocator_calls = self.counters.deallocator_calls.load(Ordering::Relaxed);
        stats.live_adopted_buffers = self.counters.live_adopted.load(Ordering::Relaxed);
        stats
    }
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimEngine {
    fn drop(&mut self) {
        let contexts: Vec<usize> = self.state.lock().contexts.iter().copied().collect();
        for ctx in contexts {
            self.destroy_context(ctx as JSGlobalContextRef);
        }
    }
}

// Safety: all state sits behind the mutex; raw pointers inside are fake
// addresses or host allocations whose ownership the model tracks.
unsafe impl Send for SimEngine {}
unsafe impl Sync for SimEngine {}

unsafe impl Engine for SimEngine {
    fn name(&self) -> &str {
        "SimEngine"
    }

    unsafe fn value_protect(&self, ctx: JSContextRef, value: JSValueRef) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let live = state.contexts.contains(&(ctx as usize));
        match state.objects.get_mut(&(value as usize)) {
            Some(obj) if live && obj.ctx == ctx as usize => {
                obj.protect_count += 1;
                state.stats.protect_calls += 1;
            }
            _ => state.stats.invalid_calls += 1,
        }
    }

    unsafe fn value_unprotect(&self, ctx: JSContextRef, value: JSValueRef) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let live = state.contexts.contains(&(ctx as usize));
        match state.objects.get_mut(&(value as usize)) {
            Some(obj) if live && obj.ctx == ctx as usize && obj.protect_count > 0 => {
                obj.protect_count -= 1;
                state.stats.unprotect_calls += 1;
            }
            _ => state.stats.invalid_calls += 1,
        }
    }

    unsafe fn value_to_object(&self, ctx: JSContextRef, value: JSValueRef) -> JSObjectRef {
        match self.state.lock().object(ctx, value).map(|obj| &obj.kind) {
            None | Some(SimKind::Undefined) => std::ptr::null_mut(),
            Some(_) => value.cast_mut(),
        }
    }

    unsafe fn object_make(&self, ctx: JSContextRef) -> JSObjectRef {
        self.state.lock().insert(ctx, SimKind::Plain)
    }

    unsafe fn value_get_typed_array_type(
        &self,
        ctx: JSContextRef,
        value: JSValueRef,
    ) -> RawTypedArrayType {
        match self.state.lock().object(ctx, value).map(|obj| &obj.kind) {
            Some(SimKind::TypedArray { array_type, .. }) => *array_type,
            Some(SimKind::ArrayBuffer(_)) => EngineTypedArrayType::ArrayBuffer.raw(),
            _ => EngineTypedArrayType::None.raw(),
        }
    }

    unsafe fn object_make_typed_array(
        &self,
        ctx: JSContextRef,
        array_type: RawTypedArrayType,
        length: usize,
    ) -> JSObjectRef {
        let Some(byte_length) = element_width(array_type).and_then(|w| w.checked_mul(length))
        else {
            return std::ptr::null_mut();
        };
        let store = Arc::new(SimStore::zeroed(byte_length, &self.counters));
        self.state.lock().insert(
            ctx,
            SimKind::TypedArray {
                array_type,
                store,
                byte_offset: 0,
                byte_length,
            },
        )
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
        if element_width(array_type).is_none() {
            return std::ptr::null_mut();
        }
        let store = Arc::new(SimStore::adopted(
            bytes.cast::<u8>(),
            byte_length,
            deallocator,
            deallocator_context,
            &self.counters,
        ));
        self.state.lock().insert(
            ctx,
            SimKind::TypedArray {
                array_type,
                store,
                byte_offset: 0,
                byte_length,
            },
        )
    }

    unsafe fn object_make_array_buffer_with_bytes_no_copy(
        &self,
        ctx: JSContextRef,
        bytes: *mut c_void,
        byte_length: usize,
        deallocator: JSTypedArrayBytesDeallocator,
        deallocator_context: *mut c_void,
    ) -> JSObjectRef {
        let store = Arc::new(SimStore::adopted(
            bytes.cast::<u8>(),
            byte_length,
            deallocator,
            deallocator_context,
            &self.counters,
        ));
        self.state.lock().insert(ctx, SimKind::ArrayBuffer(store))
    }

    unsafe fn typed_array_byte_length(&self, ctx: JSContextRef, object: JSObjectRef) -> usize {
        match self.state.lock().object(ctx, object).map(|obj| &obj.kind) {
            Some(SimKind::TypedArray { byte_length, .. }) => *byte_length,
            _ => 0,
        }
    }

    unsafe fn typed_array_byte_offset(&self, ctx: JSContextRef, object: JSObjectRef) -> usize {
        match self.state.lock().object(ctx, object).map(|obj| &obj.kind) {
            Some(SimKind::TypedArray { byte_offset, .. }) => *byte_offset,
            _ => 0,
        }
    }

    unsafe fn typed_array_bytes_ptr(&self, ctx: JSContextRef, object: JSObjectRef) -> *mut c_void {
        match self.state.lock().object(ctx, object).map(|obj| &obj.kind) {
            Some(SimKind::TypedArray { store, .. }) => store.ptr.cast::<c_void>(),
            _ => std::ptr::null_mut(),
        }
    }

    unsafe fn array_buffer_byte_length(&self, ctx: JSContextRef, object: JSObjectRef) -> usize {
        match self.state.lock().object(ctx, object).map(|obj| &obj.kind) {
            Some(SimKind::ArrayBuffer(store)) => store.len,
            _ => 0,
        }
    }

    unsafe fn array_buffer_bytes_ptr(&self, ctx: JSContextRef, object: JSObjectRef) -> *mut c_void {
        match self.state.lock().object(ctx, object).map(|obj| &obj.kind) {
            Some(SimKind::ArrayBuffer(store)) => store.ptr.cast::<c_void>(),
            _ => std::ptr::null_mut(),
        }
    }
}

impl std::fmt::Debug for SimEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEngine")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
