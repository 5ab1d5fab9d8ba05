//! Handle Recovery Shim
//!
//! Recovers the engine context from the host's runtime object by
//! reinterpreting its memory.
//!
//! WARNING: this relies on the host runtime being byte-compatible with
//! [`RuntimeLayout`] (layout version 1, see [`RUNTIME_LAYOUT_VERSION`]). Layout
//! version 1 is the private state of `facebook::jsc::JSCRuntime` from
//! React Native's `ReactCommon/jsi/JSCRuntime.cpp` as shipped with React
//! Native 0.59 (Expo SDK 33, `ABI33_0_0`):
//!
//! ```text
//! offset 0          vtable pointer (never read)
//! offset 1 * ptr    JSGlobalContextRef ctx
//! offset 2 * ptr    std::atomic<bool> ctxInvalid  (inline, one byte)
//! ```
//!
//! Any other React Native release, any other JSI runtime (Hermes, V8) and
//! any JavaScriptCore host with different private fields is not covered.
//! Hosts built against such a runtime must not enable `runtime-layout-v1`,
//! and without a layout feature the crate does not build.
//!
//! Handles outlive the runtime object, so they never point at its inline
//! flag. Each live context instead has a shared flag in a process-wide
//! table keyed by context address. The host's teardown path must call
//! [`mark_context_torn_down`] (as [`EngineRuntime::teardown`] does) before
//! the engine context is released.

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::fmt;
use std::mem::{offset_of, size_of};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{const_mutex, Mutex};

use crate::ffi::{Engine, JSContextRef, JSGlobalContextRef, JSObjectRef};
use crate::host::HostRuntime;

#[cfg(not(feature = "runtime-layout-v1"))]
compile_error!(
    "typed-array-bridge: no verified host runtime layout; enable the `runtime-layout-v1` feature \
     only if the host runtime matches shim::RuntimeLayout"
);

/// Version of the host runtime layout this build reinterprets
pub const RUNTIME_LAYOUT_VERSION: u32 = 1;

/// Prefix of the host runtime object, as laid out by layout version 1
#[repr(C)]
pub struct RuntimeLayout {
    #[allow(dead_code)]
    vtable: *const c_void,
    ctx: JSGlobalContextRef,
    ctx_invalid: AtomicBool,
}

const _: () = {
    assert!(offset_of!(RuntimeLayout, vtable) == 0);
    assert!(offset_of!(RuntimeLayout, ctx) == size_of::<usize>());
    assert!(offset_of!(RuntimeLayout, ctx_invalid) == 2 * size_of::<usize>());
    assert!(size_of::<AtomicBool>() == 1);
};

/// Stands in for the dispatch table of runtimes built on the Rust side
static RUST_RUNTIME_VTABLE: [usize; 1] = [0];

/// Teardown flags shared by every handle of a live context
static CONTEXT_FLAGS: Mutex<BTreeMap<usize, Arc<AtomicBool>>> = const_mutex(BTreeMap::new());

/// Shared teardown flag for a live context, created on first use
fn context_flag(ctx: JSGlobalContextRef) -> Arc<AtomicBool> {
    let mut flags = CONTEXT_FLAGS.lock();
    Arc::clone(
        flags
            .entry(ctx as usize)
            .or_insert_with(|| Arc::new(AtomicBool::new(false))),
    )
}

/// Mark a context as torn down for every handle recovered from it.
///
/// Hosts call this from their teardown path before the engine releases the
/// context. Idempotent. A context created later at the same address starts
/// with a fresh flag.
pub fn mark_context_torn_down(ctx: JSGlobalContextRef) {
    if let Some(flag) = CONTEXT_FLAGS.lock().remove(&(ctx as usize)) {
        flag.store(true, Ordering::Release);
        log::debug!("[Shim] context {:p} torn down", ctx);
    }
}

/// Recover the engine context behind a host runtime.
///
/// Cannot fail structurally. The result is meaningful because every
/// `&HostRuntime` is either an [`EngineRuntime`] or came through
/// [`HostRuntime::from_ptr`], whose contract requires layout version 1
/// (the React Native 0.59 `JSCRuntime` listed in the module docs). JSI
/// runtimes of other releases are not supported.
pub(crate) fn recover_context(runtime: &HostRuntime) -> EngineContext {
    let layout = runtime.as_ptr().cast::<RuntimeLayout>();
    // SAFETY: layout version 1 is guaranteed by how `runtime` was obtained
    // (see above), and the runtime is borrowed for the whole read.
    let (ctx, torn_down) = unsafe {
        (
            (*layout).ctx,
            (*layout).ctx_invalid.load(Ordering::Acquire),
        )
    };

    let ctx_invalid = if torn_down {
        Arc::new(AtomicBool::new(true))
    } else {
        context_flag(ctx)
    };
    EngineContext { ctx, ctx_invalid }
}

/// An engine context plus the shared teardown flag
#[derive(Clone)]
pub struct EngineContext {
    ctx: JSGlobalContextRef,
    ctx_invalid: Arc<AtomicBool>,
}

impl EngineContext {
    /// Raw context handle
    pub fn ctx(&self) -> JSContextRef {
        self.ctx.cast_const()
    }

    /// Whether the context has been torn down
    pub fn is_invalid(&self) -> bool {
        self.ctx_invalid.load(Ordering::Acquire)
    }

    /// Take an external retain on `object`.
    ///
    /// # Safety
    ///
    /// `object` must belong to this context and the context must be live.
    pub unsafe fn protect(&self, engine: &dyn Engine, object: JSObjectRef) {
        log::trace!("[Shim] protect {:p}", object);
        unsafe { engine.value_protect(self.ctx(), object.cast_const()) };
    }

    /// Drop an external retain on `object`, unless the context is gone.
    ///
    /// After teardown the engine has already reclaimed the object and any
    /// unprotect call is undefined behaviour on its side. Returns whether
    /// the release was issued.
    ///
    /// # Safety
    ///
    /// `object` must have been protected through this context.
    pub unsafe fn release(&self, engine: &dyn Engine, object: JSObjectRef) -> bool {
        if self.is_invalid() {
            log::debug!("[Shim] context torn down, skipping release of {:p}", object);
            return false;
        }
        log::trace!("[Shim] release {:p}", object);
        unsafe { engine.value_unprotect(self.ctx(), object.cast_const()) };
        true
    }
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("ctx", &self.ctx)
            .field("invalid", &self.is_invalid())
            .finish()
    }
}

// Safety: `ctx` is only an address. Engine calls through it happen on the
// owning thread, except `release`, which is gated on the atomic flag.
unsafe impl Send for EngineContext {}
unsafe impl Sync for EngineContext {}

/// A host runtime built on the Rust side, laid out as [`RuntimeLayout`].
///
/// Useful for Rust hosts that own the engine context themselves, and for
/// tests. Dropping it marks the context as torn down.
#[repr(C)]
pub struct EngineRuntime {
    layout: RuntimeLayout,
}

impl EngineRuntime {
    /// Wrap an engine global context
    pub fn new(ctx: JSGlobalContextRef) -> Self {
        Self {
            layout: RuntimeLayout {
                vtable: RUST_RUNTIME_VTABLE.as_ptr().cast::<c_void>(),
                ctx,
                ctx_invalid: AtomicBool::new(false),
            },
        }
    }

    /// View as the host runtime the bridge operations accept
    pub fn as_host(&self) -> &HostRuntime {
        // SAFETY: `EngineRuntime` is repr(C) with `RuntimeLayout` first.
        unsafe { HostRuntime::from_ptr((self as *const EngineRuntime).cast::<c_void>()) }
    }

    /// Raw engine context
    pub fn ctx(&self) -> JSGlobalContextRef {
        self.layout.ctx
    }

    /// Mark the context as torn down. Handles disposed afterwards skip
    /// their release call. Idempotent.
    pub fn teardown(&self) {
        if !self.layout.ctx_invalid.swap(true, Ordering::AcqRel) {
            mark_context_torn_down(self.layout.ctx);
        }
    }

    /// Whether [`teardown`](Self::teardown) has run
    pub fn is_torn_down(&self) -> bool {
        self.layout.ctx_invalid.load(Ordering::Acquire)
    }
}

impl Drop for EngineRuntime {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for EngineRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRuntime")
            .field("ctx", &self.layout.ctx)
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
