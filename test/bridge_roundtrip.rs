//! Bridge Round-Trip Tests
//!
//! End-to-end conversions through the public API against the simulated
//! engine: every element kind, both construction strategies, and the
//! partial-overwrite behaviour of in-place updates.

use rand::distributions::{Distribution, Standard};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use typed_array_bridge::{
    ArrayBuffer, ArrayKind, BridgeError, CreateStrategy, ElementType, EngineRuntime, Float32Array,
    Float64Array, HostRuntime, Int16Array, Int32Array, Int8Array, SimEngine, TypedArrayBridge,
    Uint16Array, Uint32Array, Uint8Array, Uint8ClampedArray,
};

/// Helper to build an engine, a runtime and a bridge over them
fn setup(strategy: CreateStrategy) -> (Arc<SimEngine>, EngineRuntime, TypedArrayBridge) {
    let sim = Arc::new(SimEngine::new());
    let runtime = EngineRuntime::new(sim.create_context());
    let bridge = TypedArrayBridge::new(sim.clone()).with_strategy(strategy);
    (sim, runtime, bridge)
}

fn random_vec<T>(rng: &mut ChaCha8Rng, len: usize) -> Vec<T>
where
    Standard: Distribution<T>,
{
    (0..len).map(|_| rng.gen()).collect()
}

fn check_kind<K: ArrayKind>(bridge: &TypedArrayBridge, rt: &HostRuntime, rng: &mut ChaCha8Rng)
where
    Standard: Distribution<K::Content>,
{
    for _ in 0..32 {
        let len = rng.gen_range(0..300);
        let data: Vec<K::Content> = random_vec(rng, len);
        let value = bridge.create::<K>(rt, &data).unwrap();

        assert_eq!(bridge.from_value::<K>(rt, &value).unwrap(), data);
        assert_eq!(bridge.type_from_value(rt, &value), K::TYPE);
        assert_eq!(
            bridge.raw_from_value(rt, &value).unwrap().len(),
            len * std::mem::size_of::<K::Content>()
        );
    }
}

fn check_all_kinds(strategy: CreateStrategy, seed: u64) {
    let (_sim, runtime, bridge) = setup(strategy);
    let rt = runtime.as_host();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    check_kind::<Int8Array>(&bridge, rt, &mut rng);
    check_kind::<Int16Array>(&bridge, rt, &mut rng);
    check_kind::<Int32Array>(&bridge, rt, &mut rng);
    check_kind::<Uint8Array>(&bridge, rt, &mut rng);
    check_kind::<Uint8ClampedArray>(&bridge, rt, &mut rng);
    check_kind::<Uint16Array>(&bridge, rt, &mut rng);
    check_kind::<Uint32Array>(&bridge, rt, &mut rng);
    check_kind::<Float32Array>(&bridge, rt, &mut rng);
    check_kind::<Float64Array>(&bridge, rt, &mut rng);
    check_kind::<ArrayBuffer>(&bridge, rt, &mut rng);
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_roundtrip_every_kind_no_copy() {
    check_all_kinds(CreateStrategy::NoCopy, 1);
}

#[test]
fn test_roundtrip_every_kind_engine_copy() {
    check_all_kinds(CreateStrategy::EngineCopy, 2);
}

#[test]
fn test_float_bit_patterns_survive() {
    let (_sim, runtime, bridge) = setup(CreateStrategy::NoCopy);
    let rt = runtime.as_host();
    let data = [
        f64::NAN,
        f64::INFINITY,
        f64::NEG_INFINITY,
        -0.0,
        f64::MIN_POSITIVE,
        f64::from_bits(1),
    ];

    let value = bridge.create::<Float64Array>(rt, &data).unwrap();
    let read = bridge.from_value::<Float64Array>(rt, &value).unwrap();
    let bits = |v: &[f64]| v.iter().map(|f| f.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&read), bits(&data));
}

#[test]
fn test_concrete_int32_scenario() {
    let (_sim, runtime, bridge) = setup(CreateStrategy::NoCopy);
    let rt = runtime.as_host();

    let h = bridge.create::<Int32Array>(rt, &[1, 2, 3]).unwrap();
    assert_eq!(bridge.from_value::<Int32Array>(rt, &h).unwrap(), vec![1, 2, 3]);

    bridge.update_with_data(rt, &h, &9i32.to_ne_bytes()).unwrap();
    assert_eq!(bridge.from_value::<Int32Array>(rt, &h).unwrap(), vec![9, 2, 3]);
}

#[test]
fn test_concrete_empty_float32_scenario() {
    let (_sim, runtime, bridge) = setup(CreateStrategy::NoCopy);
    let rt = runtime.as_host();

    let h = bridge.create::<Float32Array>(rt, &[]).unwrap();
    assert_eq!(bridge.type_from_value(rt, &h), ElementType::Float32Array);
    assert_eq!(bridge.from_value::<Float32Array>(rt, &h).unwrap(), Vec::<f32>::new());
}

// ============================================================================
// In-place updates
// ============================================================================

#[test]
fn test_update_shrink_safe_overwrite() {
    let (_sim, runtime, bridge) = setup(CreateStrategy::NoCopy);
    let rt = runtime.as_host();
    let mut rng = ChaCha8Rng::seed_from_u64(3);

    for _ in 0..50 {
        let len = rng.gen_range(1..128);
        let original: Vec<u8> = random_vec(&mut rng, len);
        let value = bridge.create::<Uint8Array>(rt, &original).unwrap();

        let m = rng.gen_range(0..=len + 4);
        let update: Vec<u8> = random_vec(&mut rng, m);
        let result = bridge.update_with_data(rt, &value, &update);
        let after = bridge.raw_from_value(rt, &value).unwrap();

        if m <= len {
            result.unwrap();
            assert_eq!(&after[..m], &update[..]);
            assert_eq!(&after[m..], &original[m..]);
        } else {
            assert!(matches!(result, Err(BridgeError::TooSmall { .. })));
            assert_eq!(after, original);
        }
    }
}

#[test]
fn test_update_error_names_operation_and_sizes() {
    let (_sim, runtime, bridge) = setup(CreateStrategy::NoCopy);
    let rt = runtime.as_host();
    let value = bridge.create::<Uint32Array>(rt, &[1]).unwrap();

    let err = bridge.update_with_data(rt, &value, &[0; 8]).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("update_with_data"), "message: {}", msg);
    assert!(msg.contains('4') && msg.contains('8'), "message: {}", msg);
}
