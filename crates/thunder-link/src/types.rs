//! Types resolved against a unit.
//!
//! A [`QualifiedType`](thunder_ir::QualifiedType) names structs by an atom
//! index of the function that declared them. Once linked, structs are
//! named by their aggregate instead, so types from different functions
//! compare directly.

use std::fmt;

use thunder_ir::{ImageType, PrimitiveType, SamplerType};

/// A value type: primitive or unit aggregate.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum DataType {
    Primitive(PrimitiveType),
    Aggregate(usize),
}

impl DataType {
    pub fn primitive(&self) -> Option<PrimitiveType> {
        match self {
            Self::Primitive(p) => Some(*p),
            Self::Aggregate(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum UnitType {
    Nil,
    Data(DataType),
    /// Element type and count; negative counts are runtime sized.
    Array { element: DataType, size: i32 },
    Image(ImageType),
    Sampler(SamplerType),
    BufferReference { base: DataType, id: i32 },
}

impl UnitType {
    pub fn primitive(p: PrimitiveType) -> Self {
        if p == PrimitiveType::Nil {
            Self::Nil
        } else {
            Self::Data(DataType::Primitive(p))
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// The value type, for plain data.
    pub fn data(&self) -> Option<DataType> {
        match self {
            Self::Data(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => write!(f, "{p}"),
            Self::Aggregate(i) => write!(f, "aggregate#{i}"),
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Data(d) => write!(f, "{d}"),
            Self::Array { element, size } if *size < 0 => write!(f, "{element}[]"),
            Self::Array { element, size } => write!(f, "{element}[{size}]"),
            Self::Image(i) => write!(f, "image{}d<{}>", i.dimension, i.result),
            Self::Sampler(s) => write!(f, "sampler{}d<{}>", s.dimension, s.result),
            Self::BufferReference { base, id } => write!(f, "ref#{id}<{base}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_primitive_is_nil() {
        assert!(UnitType::primitive(PrimitiveType::Nil).is_nil());
        assert_eq!(
            UnitType::primitive(PrimitiveType::F32).data(),
            Some(DataType::Primitive(PrimitiveType::F32))
        );
    }

    #[test]
    fn display() {
        let runtime = UnitType::Array {
            element: DataType::Aggregate(2),
            size: -1,
        };
        assert_eq!(runtime.to_string(), "aggregate#2[]");
        let fixed = UnitType::Array {
            element: DataType::Primitive(PrimitiveType::F32),
            size: 4,
        };
        assert_eq!(fixed.to_string(), "f32[4]");
    }
}
