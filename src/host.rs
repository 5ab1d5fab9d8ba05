//! Host Value Model
//!
//! The slice of the host's scripting-value abstraction the bridge relies on:
//! an opaque runtime, values that may hold an object, and the pointer-value
//! contract through which objects carry engine handles. Hosts own these
//! values; the bridge only creates and inspects them.

use std::any::Any;
use std::ffi::c_void;
use std::fmt;
use std::marker::{PhantomData, PhantomPinned};

/// The host's runtime object.
///
/// Never constructed in Rust; only seen behind a reference. Its memory
/// layout is recovered by [`crate::shim::recover_context`].
#[repr(C)]
pub struct HostRuntime {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

impl HostRuntime {
    /// Borrow a runtime from a raw pointer handed over by the host.
    ///
    /// # Safety
    ///
    /// `ptr` must be non-null and point to a live host runtime for `'a`
    /// whose memory starts with [`crate::shim::RuntimeLayout`] (layout
    /// version [`crate::shim::RUNTIME_LAYOUT_VERSION`], the React Native 0.59
    /// `JSCRuntime`). The host must call
    /// [`crate::shim::mark_context_torn_down`] when it tears the context down.
    pub unsafe fn from_ptr<'a>(ptr: *const c_void) -> &'a HostRuntime {
        unsafe { &*ptr.cast::<HostRuntime>() }
    }

    /// Raw address of this runtime
    pub fn as_ptr(&self) -> *const c_void {
        (self as *const HostRuntime).cast::<c_void>()
    }
}

impl fmt::Debug for HostRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostRuntime({:p})", self.as_ptr())
    }
}

/// Payload of a host object.
///
/// `invalidate` is the single disposal point; the host calls it exactly once
/// when the object's last reference goes away.
pub trait PointerValue: Any + Send {
    /// Dispose of the payload
    fn invalidate(self: Box<Self>);

    /// Downcasting support
    fn as_any(&self) -> &dyn Any;
}

/// A host object: owns exactly one pointer value.
pub struct HostObject {
    ptr: Option<Box<dyn PointerValue>>,
}

impl HostObject {
    /// Take ownership of a pointer value
    pub fn new(ptr: Box<dyn PointerValue>) -> Self {
        Self { ptr: Some(ptr) }
    }

    /// Borrow the pointer value
    pub fn pointer_value(&self) -> Option<&dyn PointerValue> {
        self.ptr.as_deref()
    }

    /// Downcast the pointer value to a concrete type
    pub fn downcast_ref<T: PointerValue>(&self) -> Option<&T> {
        self.ptr.as_deref()?.as_any().downcast_ref::<T>()
    }
}

impl Drop for HostObject {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            ptr.invalidate();
        }
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("live", &self.ptr.is_some())
            .finish()
    }
}

/// A host value
#[derive(Debug)]
pub enum HostValue {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number
    Number(f64),
    /// Object
    Object(HostObject),
}

impl HostValue {
    /// Borrow the object, if this value is one
    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            HostValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Check if this value is an object
    pub fn is_object(&self) -> bool {
        matches!(self, HostValue::Object(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting(Arc<AtomicUsize>);

    impl PointerValue for Counting {
        fn invalidate(self: Box<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_object_invalidates_once_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let value = HostValue::Object(HostObject::new(Box::new(Counting(count.clone()))));
        assert!(value.is_object());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(value);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_downcast() {
        let count = Arc::new(AtomicUsize::new(0));
        let obj = HostObject::new(Box::new(Counting(count)));
        assert!(obj.downcast_ref::<Counting>().is_some());
        assert!(HostValue::Number(1.0).as_object().is_none());
    }
}
