//! Lifetime Discipline Tests
//!
//! Every host value that wraps an engine object protects it once and
//! releases it once on dispose, and never touches the engine after the
//! context has been torn down.

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use typed_array_bridge::ffi::JSGlobalContextRef;
use typed_array_bridge::{
    mark_context_torn_down, wrap_value, ArrayBuffer, CreateStrategy, Engine, EngineRuntime,
    Float64Array, HostRuntime, HostValue, Int16Array, Int32Array, SimEngine, TypedArrayBridge,
    Uint8Array,
};

/// A host runtime that owns its state the way the C++ `JSCRuntime` does:
/// vtable, context, inline teardown flag, then private fields.
#[repr(C)]
#[allow(dead_code)]
struct InlineFlagRuntime {
    vtable: *const c_void,
    ctx: JSGlobalContextRef,
    ctx_invalid: AtomicBool,
    private: [usize; 6],
}

impl InlineFlagRuntime {
    fn new(ctx: JSGlobalContextRef) -> Box<Self> {
        static VTABLE: [usize; 2] = [0, 0];
        Box::new(Self {
            vtable: VTABLE.as_ptr().cast::<c_void>(),
            ctx,
            ctx_invalid: AtomicBool::new(false),
            private: [0x5A5A; 6],
        })
    }

    fn as_host(&self) -> &HostRuntime {
        unsafe { HostRuntime::from_ptr((self as *const Self).cast::<c_void>()) }
    }

    fn teardown(&self) {
        self.ctx_invalid.store(true, Ordering::Release);
        mark_context_torn_down(self.ctx);
    }
}

fn setup(strategy: CreateStrategy) -> (Arc<SimEngine>, EngineRuntime, TypedArrayBridge) {
    let sim = Arc::new(SimEngine::new());
    let runtime = EngineRuntime::new(sim.create_context());
    let bridge = TypedArrayBridge::new(sim.clone()).with_strategy(strategy);
    (sim, runtime, bridge)
}

fn make_values(bridge: &TypedArrayBridge, runtime: &EngineRuntime, n: usize) -> Vec<HostValue> {
    let rt = runtime.as_host();
    let mut values = Vec::with_capacity(n * 3);
    for i in 0..n {
        values.push(bridge.create::<Uint8Array>(rt, &[i as u8; 5]).unwrap());
        values.push(bridge.create::<Float64Array>(rt, &[i as f64, 0.5]).unwrap());
        values.push(bridge.create::<ArrayBuffer>(rt, &[1, 2, 3]).unwrap());
    }
    values
}

// ============================================================================
// Dispose while the context is alive
// ============================================================================

#[test]
fn test_one_release_per_dispose() {
    let (sim, runtime, bridge) = setup(CreateStrategy::NoCopy);
    let values = make_values(&bridge, &runtime, 10);

    let stats = sim.stats();
    assert_eq!(stats.protect_calls, 30);
    assert_eq!(stats.unprotect_calls, 0);

    drop(values);
    let stats = sim.stats();
    assert_eq!(stats.unprotect_calls, 30);
    assert_eq!(stats.invalid_calls, 0);
}

#[test]
fn test_disposed_objects_become_collectable() {
    let (sim, runtime, bridge) = setup(CreateStrategy::NoCopy);
    let rt = runtime.as_host();

    let value = bridge.create::<Int16Array>(rt, &[7; 64]).unwrap();
    assert_eq!(sim.collect_garbage(), 0);
    assert_eq!(sim.stats().live_adopted_buffers, 1);

    drop(value);
    assert!(sim.collect_garbage() > 0);
    assert_eq!(sim.live_objects(), 0);

    let stats = sim.stats();
    assert_eq!(stats.live_adopted_buffers, 0);
    assert_eq!(stats.deallocator_calls, 1);
}

#[test]
fn test_zero_length_cycles_leak_nothing() {
    for strategy in [CreateStrategy::NoCopy, CreateStrategy::EngineCopy] {
        let (sim, runtime, bridge) = setup(strategy);
        let rt = runtime.as_host();

        for _ in 0..100 {
            let a = bridge.create::<Uint8Array>(rt, &[]).unwrap();
            let b = bridge.create::<ArrayBuffer>(rt, &[]).unwrap();
            drop((a, b));
        }
        sim.collect_garbage();

        let stats = sim.stats();
        assert_eq!(stats.protect_calls, stats.unprotect_calls);
        assert_eq!(stats.live_adopted_buffers, 0);
        assert_eq!(sim.live_objects(), 0);
    }
}

#[test]
fn test_wrap_value_protects_existing_object() {
    let (sim, runtime, bridge) = setup(CreateStrategy::NoCopy);
    let buffer = sim.make_array_buffer(runtime.ctx(), &[9; 8]);

    let value = unsafe { wrap_value(bridge.engine(), runtime.as_host(), buffer) }.unwrap();
    assert_eq!(sim.protect_count(buffer), Some(1));
    assert_eq!(bridge.raw_from_value(runtime.as_host(), &value).unwrap(), vec![9; 8]);

    drop(value);
    assert_eq!(sim.protect_count(buffer), Some(0));
}

#[test]
fn test_wrap_value_non_object_yields_object() {
    let (sim, runtime, bridge) = setup(CreateStrategy::NoCopy);
    let undefined = sim.make_undefined(runtime.ctx());

    let value = unsafe { wrap_value(bridge.engine(), runtime.as_host(), undefined) }.unwrap();
    assert!(value.is_object());
    assert_eq!(
        bridge.type_from_value(runtime.as_host(), &value),
        typed_array_bridge::ElementType::None
    );
}

// ============================================================================
// Dispose after teardown
// ============================================================================

#[test]
fn test_no_release_after_teardown() {
    let (sim, runtime, bridge) = setup(CreateStrategy::NoCopy);
    let values = make_values(&bridge, &runtime, 5);

    runtime.teardown();
    sim.destroy_context(runtime.ctx());
    drop(values);

    let stats = sim.stats();
    assert_eq!(stats.unprotect_calls, 0);
    assert_eq!(stats.invalid_calls, 0);
    assert_eq!(stats.live_adopted_buffers, 0);
}

#[test]
fn test_teardown_idempotent() {
    let (_sim, runtime, _bridge) = setup(CreateStrategy::NoCopy);
    assert!(!runtime.is_torn_down());
    runtime.teardown();
    runtime.teardown();
    assert!(runtime.is_torn_down());
}

#[test]
fn test_values_outlive_runtime() {
    let (sim, runtime, bridge) = setup(CreateStrategy::EngineCopy);
    let ctx = runtime.ctx();
    let values = make_values(&bridge, &runtime, 3);

    // Dropping the runtime marks its context invalid
    drop(runtime);
    sim.destroy_context(ctx);
    drop(values);

    let stats = sim.stats();
    assert_eq!(stats.unprotect_calls, 0);
    assert_eq!(stats.invalid_calls, 0);
}

// ============================================================================
// Hosts with an inline teardown flag
// ============================================================================

#[test]
fn test_inline_flag_runtime_round_trip() {
    let sim = Arc::new(SimEngine::new());
    let runtime = InlineFlagRuntime::new(sim.create_context());
    let bridge = TypedArrayBridge::new(sim.clone());
    let rt = runtime.as_host();

    let value = bridge.create::<Int32Array>(rt, &[4, 5, 6]).unwrap();
    assert_eq!(bridge.from_value::<Int32Array>(rt, &value).unwrap(), vec![4, 5, 6]);
    drop(value);

    let stats = sim.stats();
    assert_eq!(stats.protect_calls, 1);
    assert_eq!(stats.unprotect_calls, 1);
    assert_eq!(stats.invalid_calls, 0);
    assert_eq!(runtime.private, [0x5A5A; 6]);
}

#[test]
fn test_inline_flag_runtime_teardown_skips_release() {
    let sim = Arc::new(SimEngine::new());
    let runtime = InlineFlagRuntime::new(sim.create_context());
    let bridge = TypedArrayBridge::new(sim.clone());
    let ctx = runtime.ctx;

    let value = bridge.create::<Uint8Array>(runtime.as_host(), &[1, 2]).unwrap();
    runtime.teardown();
    drop(runtime);
    sim.destroy_context(ctx);
    drop(value);

    let stats = sim.stats();
    assert_eq!(stats.unprotect_calls, 0);
    assert_eq!(stats.invalid_calls, 0);
}

// ============================================================================
// Cross-thread dispose
// ============================================================================

#[test]
fn test_dispose_on_other_thread() {
    let (sim, runtime, bridge) = setup(CreateStrategy::NoCopy);
    let values = make_values(&bridge, &runtime, 4);

    thread::spawn(move || drop(values)).join().unwrap();

    let stats = sim.stats();
    assert_eq!(stats.unprotect_calls, 12);
    assert_eq!(stats.invalid_calls, 0);
}

#[test]
fn test_dispose_on_other_thread_after_teardown() {
    let (sim, runtime, bridge) = setup(CreateStrategy::NoCopy);
    let values = make_values(&bridge, &runtime, 4);

    runtime.teardown();
    sim.destroy_context(runtime.ctx());
    thread::spawn(move || drop(values)).join().unwrap();

    assert_eq!(sim.stats().unprotect_calls, 0);
    assert_eq!(sim.stats().invalid_calls, 0);
}

#[test]
fn test_engine_name() {
    let sim = SimEngine::new();
    assert!(!sim.name().is_empty());
}
