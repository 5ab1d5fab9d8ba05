//! Buffer Lifetime Adapter
//!
//! Ties an engine object's lifetime to a host value. Construction protects
//! the object; disposal releases it, unless the engine context has already
//! been torn down. Nothing else in the crate holds an engine object across a
//! call boundary.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::ffi::{Engine, JSObjectRef, JSValueRef};
use crate::host::{HostObject, HostRuntime, HostValue, PointerValue};
use crate::shim::{recover_context, EngineContext};
use crate::tag::ElementType;

/// Host-side owner of exactly one protected engine object
pub struct EngineObjectHandle {
    engine: Arc<dyn Engine>,
    context: EngineContext,
    object: JSObjectRef,
}

impl EngineObjectHandle {
    /// Protect `object` and take ownership of that retain.
    ///
    /// # Safety
    ///
    /// `object` must be a live, non-null object of `context`, and no other
    /// handle may own it.
    pub(crate) unsafe fn new(
        engine: Arc<dyn Engine>,
        context: EngineContext,
        object: JSObjectRef,
    ) -> Self {
        unsafe { context.protect(engine.as_ref(), object) };
        Self {
            engine,
            context,
            object,
        }
    }

    /// The wrapped engine object
    pub fn object(&self) -> JSObjectRef {
        self.object
    }

    /// The context the object belongs to
    pub fn context(&self) -> &EngineContext {
        &self.context
    }
}

impl Drop for EngineObjectHandle {
    fn drop(&mut self) {
        // Safety: protected exactly once in `new`.
        unsafe { self.context.release(self.engine.as_ref(), self.object) };
    }
}

impl PointerValue for EngineObjectHandle {
    fn invalidate(self: Box<Self>) {
        drop(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for EngineObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineObjectHandle")
            .field("engine", &self.engine.name())
            .field("context", &self.context)
            .field("object", &self.object)
            .finish()
    }
}

// Safety: the host may dispose values on a collector thread. The only engine
// call made from `drop` is the release, which is gated on the teardown flag.
unsafe impl Send for EngineObjectHandle {}

/// Wrap a freshly obtained engine object as a host value.
///
/// # Safety
///
/// Same contract as [`EngineObjectHandle::new`].
pub(crate) unsafe fn wrap_object(
    engine: &Arc<dyn Engine>,
    context: EngineContext,
    object: JSObjectRef,
) -> HostValue {
    let handle = unsafe { EngineObjectHandle::new(Arc::clone(engine), context, object) };
    HostValue::Object(HostObject::new(Box::new(handle)))
}

/// Wrap an arbitrary engine value as a host object.
///
/// Values the engine cannot convert to an object are replaced by a fresh
/// empty object, so the result is always an object.
///
/// # Safety
///
/// `value` must be null or a live value of the runtime's context.
pub unsafe fn wrap_value(
    engine: &Arc<dyn Engine>,
    runtime: &HostRuntime,
    value: JSValueRef,
) -> BridgeResult<HostValue> {
    let context = recover_context(runtime);
    let mut object = unsafe { engine.value_to_object(context.ctx(), value) };
    if object.is_null() {
        object = unsafe { engine.object_make(context.ctx()) };
    }
    if object.is_null() {
        return Err(BridgeError::EngineRefused {
            operation: "wrap_value",
            element_type: ElementType::None,
        });
    }
    Ok(unsafe { wrap_object(engine, context, object) })
}

/// Borrow the engine handle behind a host value
pub fn engine_handle<'v>(
    value: &'v HostValue,
    operation: &'static str,
) -> BridgeResult<&'v EngineObjectHandle> {
    let object = value
        .as_object()
        .ok_or(BridgeError::NotAnObject { operation })?;
    object
        .downcast_ref::<EngineObjectHandle>()
        .ok_or(BridgeError::ForeignObject { operation })
}

/// The engine object behind a host value
pub fn engine_object(value: &HostValue, operation: &'static str) -> BridgeResult<JSObjectRef> {
    engine_handle(value, operation).map(EngineObjectHandle::object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::SimEngine;
    use crate::shim::EngineRuntime;

    fn setup() -> (Arc<SimEngine>, Arc<dyn Engine>, EngineRuntime) {
        let sim = Arc::new(SimEngine::new());
        let engine: Arc<dyn Engine> = sim.clone();
        let runtime = EngineRuntime::new(sim.create_context());
        (sim, engine, runtime)
    }

    #[test]
    fn test_wrap_protects_and_drop_releases() {
        let (sim, engine, runtime) = setup();
        let context = recover_context(runtime.as_host());
        let obj = unsafe { engine.object_make(context.ctx()) };

        let value = unsafe { wrap_object(&engine, context, obj) };
        assert_eq!(sim.protect_count(obj), Some(1));
        assert_eq!(engine_object(&value, "test").unwrap(), obj);

        drop(value);
        assert_eq!(sim.protect_count(obj), Some(0));
        assert_eq!(sim.stats().protect_calls, 1);
        assert_eq!(sim.stats().unprotect_calls, 1);
    }

    #[test]
    fn test_no_release_after_teardown() {
        let (sim, engine, runtime) = setup();
        let context = recover_context(runtime.as_host());
        let obj = unsafe { engine.object_make(context.ctx()) };
        let value = unsafe { wrap_object(&engine, context, obj) };

        runtime.teardown();
        sim.destroy_context(runtime.ctx());
        drop(value);

        let stats = sim.stats();
        assert_eq!(stats.unprotect_calls, 0);
        assert_eq!(stats.invalid_calls, 0);
    }

    #[test]
    fn test_wrap_value_replaces_non_objects() {
        let (sim, engine, runtime) = setup();
        let undefined = sim.make_undefined(runtime.ctx());

        let value = unsafe { wrap_value(&engine, runtime.as_host(), undefined) }.unwrap();
        let obj = engine_object(&value, "test").unwrap();
        assert_ne!(obj.cast_const(), undefined);
        assert_eq!(sim.protect_count(obj), Some(1));
    }

    #[test]
    fn test_wrap_value_keeps_objects() {
        let (sim, engine, runtime) = setup();
        let buffer = sim.make_array_buffer(runtime.ctx(), &[1, 2, 3]);

        let value = unsafe { wrap_value(&engine, runtime.as_host(), buffer.cast_const()) }.unwrap();
        assert_eq!(engine_object(&value, "test").unwrap(), buffer);
    }

    #[test]
    fn test_engine_object_rejects_non_objects() {
        let err = engine_object(&HostValue::Number(3.0), "from_value").unwrap_err();
        assert!(matches!(err, BridgeError::NotAnObject { operation: "from_value" }));
    }

    #[test]
    fn test_handle_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<EngineObjectHandle>();
    }
}
