//! Type system for the Thunder IR.

use std::fmt;

use crate::index::Index;

code_enum! {
    /// Built-in scalar, vector and matrix types.
    pub enum PrimitiveType {
        Nil => "nil",
        Boolean => "boolean",
        I32 => "i32",
        U32 => "u32",
        F32 => "f32",
        F64 => "f64",
        U64 => "u64",
        Vec2 => "vec2",
        Vec3 => "vec3",
        Vec4 => "vec4",
        IVec2 => "ivec2",
        IVec3 => "ivec3",
        IVec4 => "ivec4",
        UVec2 => "uvec2",
        UVec3 => "uvec3",
        UVec4 => "uvec4",
        Mat2 => "mat2",
        Mat3 => "mat3",
        Mat4 => "mat4",
        AccelerationStructure => "acceleration_structure",
    }
}

impl PrimitiveType {
    /// Number of scalar components (columns times rows for matrices).
    pub fn components(self) -> usize {
        use PrimitiveType as P;
        match self {
            P::Nil | P::AccelerationStructure => 0,
            P::Boolean | P::I32 | P::U32 | P::F32 | P::F64 | P::U64 => 1,
            P::Vec2 | P::IVec2 | P::UVec2 => 2,
            P::Vec3 | P::IVec3 | P::UVec3 => 3,
            P::Vec4 | P::IVec4 | P::UVec4 => 4,
            P::Mat2 => 4,
            P::Mat3 => 9,
            P::Mat4 => 16,
        }
    }

    /// Scalar component type; scalars return themselves.
    pub fn scalar(self) -> PrimitiveType {
        use PrimitiveType as P;
        match self {
            P::Vec2 | P::Vec3 | P::Vec4 | P::Mat2 | P::Mat3 | P::Mat4 => P::F32,
            P::IVec2 | P::IVec3 | P::IVec4 => P::I32,
            P::UVec2 | P::UVec3 | P::UVec4 => P::U32,
            other => other,
        }
    }

    /// The vector of `size` components of `scalar`. Size 1 is the scalar.
    pub fn vector(scalar: PrimitiveType, size: usize) -> Option<PrimitiveType> {
        use PrimitiveType as P;
        Some(match (scalar, size) {
            (s, 1) if s.is_scalar() => s,
            (P::F32, 2) => P::Vec2,
            (P::F32, 3) => P::Vec3,
            (P::F32, 4) => P::Vec4,
            (P::I32, 2) => P::IVec2,
            (P::I32, 3) => P::IVec3,
            (P::I32, 4) => P::IVec4,
            (P::U32, 2) => P::UVec2,
            (P::U32, 3) => P::UVec3,
            (P::U32, 4) => P::UVec4,
            _ => return None,
        })
    }

    /// Number of rows in a vector or matrix column.
    pub fn rows(self) -> usize {
        match self {
            PrimitiveType::Mat2 => 2,
            PrimitiveType::Mat3 => 3,
            PrimitiveType::Mat4 => 4,
            other => other.components(),
        }
    }

    /// Column type of a matrix.
    pub fn matrix_column(self) -> Option<PrimitiveType> {
        match self {
            PrimitiveType::Mat2 => Some(PrimitiveType::Vec2),
            PrimitiveType::Mat3 => Some(PrimitiveType::Vec3),
            PrimitiveType::Mat4 => Some(PrimitiveType::Vec4),
            _ => None,
        }
    }

    pub fn is_scalar(self) -> bool {
        self.components() == 1
    }

    pub fn is_vector(self) -> bool {
        !self.is_matrix() && matches!(self.components(), 2..=4)
    }

    pub fn is_matrix(self) -> bool {
        self.matrix_column().is_some()
    }

    pub fn is_float(self) -> bool {
        matches!(self.scalar(), PrimitiveType::F32 | PrimitiveType::F64)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self.scalar(),
            PrimitiveType::I32 | PrimitiveType::U32 | PrimitiveType::U64
        )
    }

    /// Size in bytes of one scalar component.
    pub fn scalar_size(self) -> usize {
        match self.scalar() {
            PrimitiveType::F64 | PrimitiveType::U64 | PrimitiveType::AccelerationStructure => 8,
            PrimitiveType::Nil => 0,
            _ => 4,
        }
    }

    /// GLSL keyword.
    pub fn glsl(self) -> &'static str {
        use PrimitiveType as P;
        match self {
            P::Nil => "void",
            P::Boolean => "bool",
            P::I32 => "int",
            P::U32 => "uint",
            P::F32 => "float",
            P::F64 => "double",
            P::U64 => "uint64_t",
            P::Vec2 => "vec2",
            P::Vec3 => "vec3",
            P::Vec4 => "vec4",
            P::IVec2 => "ivec2",
            P::IVec3 => "ivec3",
            P::IVec4 => "ivec4",
            P::UVec2 => "uvec2",
            P::UVec3 => "uvec3",
            P::UVec4 => "uvec4",
            P::Mat2 => "mat2",
            P::Mat3 => "mat3",
            P::Mat4 => "mat4",
            P::AccelerationStructure => "accelerationStructureEXT",
        }
    }
}

/// A value type: a primitive or a struct whose field chain starts at the
/// given atom.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum PlainDataType {
    Primitive(PrimitiveType),
    /// Head of a `TypeInformation` field chain.
    Concrete(Index),
}

impl From<PrimitiveType> for PlainDataType {
    fn from(p: PrimitiveType) -> Self {
        Self::Primitive(p)
    }
}

/// One link of a struct's field chain.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct StructFieldType {
    pub base: PlainDataType,
    /// Next field, or null after the last one.
    pub next: Index,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ArrayType {
    pub base: PlainDataType,
    /// Element count; negative for runtime-sized arrays.
    pub size: i32,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ImageType {
    pub result: PrimitiveType,
    pub dimension: u8,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct SamplerType {
    pub result: PrimitiveType,
    pub dimension: u8,
}

/// A device address to a value of `base`; `id` keeps otherwise identical
/// references apart.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct BufferReferenceType {
    pub base: PlainDataType,
    pub id: i32,
}

/// Semantic type of an atom.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub enum QualifiedType {
    #[default]
    Nil,
    PlainData(PlainDataType),
    StructField(StructFieldType),
    Array(ArrayType),
    Image(ImageType),
    Sampler(SamplerType),
    BufferReference(BufferReferenceType),
    InArg(Box<QualifiedType>),
    OutArg(Box<QualifiedType>),
    InOutArg(Box<QualifiedType>),
}

impl QualifiedType {
    pub fn primitive(p: PrimitiveType) -> Self {
        Self::PlainData(PlainDataType::Primitive(p))
    }

    pub fn plain(base: PlainDataType) -> Self {
        Self::PlainData(base)
    }

    pub fn is_nil(&self) -> bool {
        matches!(
            self,
            Self::Nil | Self::PlainData(PlainDataType::Primitive(PrimitiveType::Nil))
        )
    }

    /// Removes parameter-direction wrappers and reduces a field link to its
    /// value type.
    pub fn bare(&self) -> QualifiedType {
        match self {
            Self::InArg(inner) | Self::OutArg(inner) | Self::InOutArg(inner) => inner.bare(),
            Self::StructField(field) => Self::PlainData(field.base),
            other => other.clone(),
        }
    }

    /// The value type carried by a plain or field type.
    pub fn plain_data(&self) -> Option<PlainDataType> {
        match self.bare() {
            Self::PlainData(p) => Some(p),
            _ => None,
        }
    }

    /// The primitive carried by a plain or field type.
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self.plain_data() {
            Some(PlainDataType::Primitive(p)) => Some(p),
            _ => None,
        }
    }

    /// Struct chain head carried by a plain, field, array or reference type.
    pub fn concrete(&self) -> Option<Index> {
        match self.bare() {
            Self::PlainData(PlainDataType::Concrete(i))
            | Self::Array(ArrayType {
                base: PlainDataType::Concrete(i),
                ..
            })
            | Self::BufferReference(BufferReferenceType {
                base: PlainDataType::Concrete(i),
                ..
            }) => Some(i),
            _ => None,
        }
    }

    /// True for direction-wrapped parameter types.
    pub fn is_argument(&self) -> bool {
        matches!(self, Self::InArg(_) | Self::OutArg(_) | Self::InOutArg(_))
    }
}

impl fmt::Display for PlainDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => write!(f, "{p}"),
            Self::Concrete(i) => write!(f, "struct@{}", i.raw()),
        }
    }
}

impl fmt::Display for QualifiedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::PlainData(p) => write!(f, "{p}"),
            Self::StructField(s) => write!(f, "field<{}>", s.base),
            Self::Array(a) if a.size < 0 => write!(f, "{}[]", a.base),
            Self::Array(a) => write!(f, "{}[{}]", a.base, a.size),
            Self::Image(i) => write!(f, "image{}d<{}>", i.dimension, i.result),
            Self::Sampler(s) => write!(f, "sampler{}d<{}>", s.dimension, s.result),
            Self::BufferReference(r) => write!(f, "ref#{}<{}>", r.id, r.base),
            Self::InArg(t) => write!(f, "in {t}"),
            Self::OutArg(t) => write!(f, "out {t}"),
            Self::InOutArg(t) => write!(f, "inout {t}"),
        }
    }
}
