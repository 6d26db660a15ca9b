//! Thunder intermediate representation.
//!
//! A flat, pointer-free instruction stream for shader and GPU-kernel
//! functions. Every instruction ([`Atom`]) lives in a per-function
//! [`Buffer`] and refers to its operands by [`Index`]. On top of the raw
//! stream this crate provides semantic type analysis with operator and
//! intrinsic overload resolution, liveness marking, and the persisted
//! binary/assembly formats.

#[macro_use]
mod macros;

mod atom;
mod buffer;
mod codes;
mod context;
mod display;
mod error;
mod function;
mod index;
pub mod marking;
pub mod overload;
pub mod semalz;
pub mod stream;
mod types;

pub use atom::{
    ArrayAccess, Atom, Branch, Call, Construct, Intrinsic, List, Load, Operation, Primitive,
    PrimitiveValue, Qualifier, Return, Store, Swizzle, TypeInformation,
};
pub use buffer::{Buffer, Decoration};
pub use codes::{
    BranchKind, ConstructorMode, IntrinsicCode, Interpolation, OperationCode, QualifierKind,
    SwizzleCode,
};
pub use context::Context;
pub use display::{dump_buffer, dump_function, graphviz};
pub use error::IrError;
pub use function::{CallableId, Function};
pub use index::{Index, Reindex};
pub use types::{
    ArrayType, BufferReferenceType, ImageType, PlainDataType, PrimitiveType, QualifiedType,
    SamplerType, StructFieldType,
};
