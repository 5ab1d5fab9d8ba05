//! Type Tag Table
//!
//! Bidirectional mapping between the host-neutral [`ElementType`] and the
//! engine's typed array type discriminant, plus the compile-time array kinds
//! that select element width and signedness for the conversion functions.

use std::fmt;

use crate::ffi::RawTypedArrayType;

/// Host-side element type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Signed 8-bit integers
    Int8Array,
    /// Signed 16-bit integers
    Int16Array,
    /// Signed 32-bit integers
    Int32Array,
    /// Unsigned 8-bit integers
    Uint8Array,
    /// Unsigned 8-bit integers, clamped on store
    Uint8ClampedArray,
    /// Unsigned 16-bit integers
    Uint16Array,
    /// Unsigned 32-bit integers
    Uint32Array,
    /// 32-bit floats
    Float32Array,
    /// 64-bit floats
    Float64Array,
    /// Untyped byte buffer
    ArrayBuffer,
    /// Not a typed array or array buffer
    None,
}

/// The engine's own typed array type enumeration.
///
/// Discriminants are the raw values of `JSTypedArrayType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EngineTypedArrayType {
    Int8Array = 0,
    Int16Array = 1,
    Int32Array = 2,
    Uint8Array = 3,
    Uint8ClampedArray = 4,
    Uint16Array = 5,
    Uint32Array = 6,
    Float32Array = 7,
    Float64Array = 8,
    ArrayBuffer = 9,
    None = 10,
}

/// Every element type, in engine discriminant order
pub const ALL_ELEMENT_TYPES: [ElementType; 11] = [
    ElementType::Int8Array,
    ElementType::Int16Array,
    ElementType::Int32Array,
    ElementType::Uint8Array,
    ElementType::Uint8ClampedArray,
    ElementType::Uint16Array,
    ElementType::Uint32Array,
    ElementType::Float32Array,
    ElementType::Float64Array,
    ElementType::ArrayBuffer,
    ElementType::None,
];

impl EngineTypedArrayType {
    /// Decode a raw discriminant. Total: anything the bridge does not know
    /// (BigInt arrays from newer engines, garbage) is `None`.
    pub fn from_raw(raw: RawTypedArrayType) -> Self {
        match raw {
            0 => Self::Int8Array,
            1 => Self::Int16Array,
            2 => Self::Int32Array,
            3 => Self::Uint8Array,
            4 => Self::Uint8ClampedArray,
            5 => Self::Uint16Array,
            6 => Self::Uint32Array,
            7 => Self::Float32Array,
            8 => Self::Float64Array,
            9 => Self::ArrayBuffer,
            _ => Self::None,
        }
    }

    /// Raw discriminant as passed to the engine
    pub fn raw(self) -> RawTypedArrayType {
        self as RawTypedArrayType
    }

    /// Host tag for this engine type
    pub fn element_type(self) -> ElementType {
        match self {
            Self::Int8Array => ElementType::Int8Array,
            Self::Int16Array => ElementType::Int16Array,
            Self::Int32Array => ElementType::Int32Array,
            Self::Uint8Array => ElementType::Uint8Array,
            Self::Uint8ClampedArray => ElementType::Uint8ClampedArray,
            Self::Uint16Array => ElementType::Uint16Array,
            Self::Uint32Array => ElementType::Uint32Array,
            Self::Float32Array => ElementType::Float32Array,
            Self::Float64Array => ElementType::Float64Array,
            Self::ArrayBuffer => ElementType::ArrayBuffer,
            Self::None => ElementType::None,
        }
    }
}

impl ElementType {
    /// Engine type for this host tag
    pub fn engine_type(self) -> EngineTypedArrayType {
        match self {
            Self::Int8Array => EngineTypedArrayType::Int8Array,
            Self::Int16Array => EngineTypedArrayType::Int16Array,
            Self::Int32Array => EngineTypedArrayType::Int32Array,
            Self::Uint8Array => EngineTypedArrayType::Uint8Array,
            Self::Uint8ClampedArray => EngineTypedArrayType::Uint8ClampedArray,
            Self::Uint16Array => EngineTypedArrayType::Uint16Array,
            Self::Uint32Array => EngineTypedArrayType::Uint32Array,
            Self::Float32Array => EngineTypedArrayType::Float32Array,
            Self::Float64Array => EngineTypedArrayType::Float64Array,
            Self::ArrayBuffer => EngineTypedArrayType::ArrayBuffer,
            Self::None => EngineTypedArrayType::None,
        }
    }

    /// Map a raw engine discriminant straight to a host tag
    pub fn from_engine_raw(raw: RawTypedArrayType) -> Self {
        EngineTypedArrayType::from_raw(raw).element_type()
    }

    /// Size in bytes of one element (0 for `None`)
    pub fn element_size(self) -> usize {
        match self {
            Self::Int8Array | Self::Uint8Array | Self::Uint8ClampedArray | Self::ArrayBuffer => 1,
            Self::Int16Array | Self::Uint16Array => 2,
            Self::Int32Array | Self::Uint32Array | Self::Float32Array => 4,
            Self::Float64Array => 8,
            Self::None => 0,
        }
    }

    /// Check if this is a typed view (not a raw buffer, not `None`)
    pub fn is_typed_array(self) -> bool {
        !matches!(self, Self::ArrayBuffer | Self::None)
    }

    /// Parse from a name, accepting the engine spelling and short forms
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "int8array" | "int8" | "i8" => Some(Self::Int8Array),
            "int16array" | "int16" | "i16" => Some(Self::Int16Array),
            "int32array" | "int32" | "i32" => Some(Self::Int32Array),
            "uint8array" | "uint8" | "u8" => Some(Self::Uint8Array),
            "uint8clampedarray" | "uint8clamped" | "u8c" => Some(Self::Uint8ClampedArray),
            "uint16array" | "uint16" | "u16" => Some(Self::Uint16Array),
            "uint32array" | "uint32" | "u32" => Some(Self::Uint32Array),
            "float32array" | "float32" | "f32" => Some(Self::Float32Array),
            "float64array" | "float64" | "f64" => Some(Self::Float64Array),
            "arraybuffer" | "buffer" | "bytes" => Some(Self::ArrayBuffer),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int8Array => "Int8Array",
            Self::Int16Array => "Int16Array",
            Self::Int32Array => "Int32Array",
            Self::Uint8Array => "Uint8Array",
            Self::Uint8ClampedArray => "Uint8ClampedArray",
            Self::Uint16Array => "Uint16Array",
            Self::Uint32Array => "Uint32Array",
            Self::Float32Array => "Float32Array",
            Self::Float64Array => "Float64Array",
            Self::ArrayBuffer => "ArrayBuffer",
            Self::None => "None",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Compile-time element kinds
// =============================================================================

mod sealed {
    pub trait Sealed {}
}

/// A plain-old-data element that may be reinterpreted from raw bytes.
///
/// Sealed: every bit pattern of every implementor is a valid value.
pub trait Element: sealed::Sealed + Copy + Default + PartialEq + fmt::Debug + 'static {}

macro_rules! impl_element {
    ($($ty:ty),*) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Element for $ty {}
        )*
    };
}

impl_element!(i8, i16, i32, u8, u16, u32, f32, f64);

/// Compile-time array kind: pairs a host tag with its element type
pub trait ArrayKind {
    /// Native element type
    type Content: Element;
    /// Runtime tag
    const TYPE: ElementType;
}

macro_rules! array_kind {
    ($($(#[$doc:meta])* $name:ident => $content:ty;)*) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $name;

            impl ArrayKind for $name {
                type Content = $content;
                const TYPE: ElementType = ElementType::$name;
            }
        )*
    };
}

array_kind! {
    /// `Int8Array` of `i8`
    Int8Array => i8;
    /// `Int16Array` of `i16`
    Int16Array => i16;
    /// `Int32Array` of `i32`
    Int32Array => i32;
    /// `Uint8Array` of `u8`
    Uint8Array => u8;
    /// `Uint8ClampedArray` of `u8`
    Uint8ClampedArray => u8;
    /// `Uint16Array` of `u16`
    Uint16Array => u16;
    /// `Uint32Array` of `u32`
    Uint32Array => u32;
    /// `Float32Array` of `f32`
    Float32Array => f32;
    /// `Float64Array` of `f64`
    Float64Array => f64;
    /// Untyped `ArrayBuffer`, read and written as bytes
    ArrayBuffer => u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_is_bijective() {
        for ty in ALL_ELEMENT_TYPES {
            assert_eq!(ty.engine_type().element_type(), ty);
            assert_eq!(ElementType::from_engine_raw(ty.engine_type().raw()), ty);
        }
    }

    #[test]
    fn test_engine_discriminants() {
        assert_eq!(EngineTypedArrayType::Int8Array.raw(), 0);
        assert_eq!(EngineTypedArrayType::Float64Array.raw(), 8);
        assert_eq!(EngineTypedArrayType::ArrayBuffer.raw(), 9);
        assert_eq!(EngineTypedArrayType::None.raw(), 10);
    }

    #[test]
    fn test_unknown_engine_ids_map_to_none() {
        // BigInt64Array / BigUint64Array on newer engines
        assert_eq!(ElementType::from_engine_raw(11), ElementType::None);
        assert_eq!(ElementType::from_engine_raw(12), ElementType::None);
        assert_eq!(ElementType::from_engine_raw(u32::MAX), ElementType::None);
    }

    #[test]
    fn test_element_sizes_match_kinds() {
        fn width<K: ArrayKind>() -> usize {
            std::mem::size_of::<K::Content>()
        }
        assert_eq!(width::<Int8Array>(), Int8Array::TYPE.element_size());
        assert_eq!(width::<Int16Array>(), Int16Array::TYPE.element_size());
        assert_eq!(width::<Int32Array>(), Int32Array::TYPE.element_size());
        assert_eq!(width::<Uint8Array>(), Uint8Array::TYPE.element_size());
        assert_eq!(width::<Uint8ClampedArray>(), Uint8ClampedArray::TYPE.element_size());
        assert_eq!(width::<Uint16Array>(), Uint16Array::TYPE.element_size());
        assert_eq!(width::<Uint32Array>(), Uint32Array::TYPE.element_size());
        assert_eq!(width::<Float32Array>(), Float32Array::TYPE.element_size());
        assert_eq!(width::<Float64Array>(), Float64Array::TYPE.element_size());
        assert_eq!(width::<ArrayBuffer>(), ArrayBuffer::TYPE.element_size());
        assert_eq!(ElementType::None.element_size(), 0);
    }

    #[test]
    fn test_parse_and_display() {
        for ty in ALL_ELEMENT_TYPES {
            assert_eq!(ElementType::parse(&ty.to_string()), Some(ty));
        }
        assert_eq!(ElementType::parse("f32"), Some(ElementType::Float32Array));
        assert_eq!(ElementType::parse("BYTES"), Some(ElementType::ArrayBuffer));
        assert_eq!(ElementType::parse("bigint64array"), None);
    }

    #[test]
    fn test_typed_array_predicate() {
        assert!(ElementType::Uint8ClampedArray.is_typed_array());
        assert!(!ElementType::ArrayBuffer.is_typed_array());
        assert!(!ElementType::None.is_typed_array());
    }
}
