//! IR instructions.

use std::hash::{Hash, Hasher};

use crate::codes::{
    BranchKind, ConstructorMode, IntrinsicCode, OperationCode, QualifierKind, SwizzleCode,
};
use crate::function::CallableId;
use crate::index::Index;
use crate::types::PrimitiveType;

/// A named external binding or a function parameter.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Qualifier {
    /// Type node, or the qualifier this one refines.
    pub underlying: Index,
    /// Location, binding, offset, size or position, depending on `kind`.
    pub numerical: i32,
    pub kind: QualifierKind,
}

/// A type node. With `next` set it is one link of a struct's field chain;
/// without it, it denotes a whole type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct TypeInformation {
    pub item: PrimitiveType,
    /// Head of a nested struct's field chain.
    pub down: Index,
    pub next: Index,
}

/// Literal value. Floats compare and hash by bit pattern.
#[derive(Clone, Copy, Debug)]
pub enum PrimitiveValue {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    F64(f64),
    U64(u64),
}

impl PrimitiveValue {
    pub fn ty(self) -> PrimitiveType {
        match self {
            Self::Bool(_) => PrimitiveType::Boolean,
            Self::I32(_) => PrimitiveType::I32,
            Self::U32(_) => PrimitiveType::U32,
            Self::F32(_) => PrimitiveType::F32,
            Self::F64(_) => PrimitiveType::F64,
            Self::U64(_) => PrimitiveType::U64,
        }
    }

    /// Integer value of an integer or boolean literal.
    pub fn as_integer(self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(b as i64),
            Self::I32(v) => Some(v as i64),
            Self::U32(v) => Some(v as i64),
            Self::U64(v) => i64::try_from(v).ok(),
            Self::F32(_) | Self::F64(_) => None,
        }
    }

    /// Bit pattern, widened to 64 bits.
    pub fn bits(self) -> u64 {
        match self {
            Self::Bool(b) => b as u64,
            Self::I32(v) => v as u32 as u64,
            Self::U32(v) => v as u64,
            Self::F32(v) => v.to_bits() as u64,
            Self::F64(v) => v.to_bits(),
            Self::U64(v) => v,
        }
    }
}

impl PartialEq for PrimitiveValue {
    fn eq(&self, other: &Self) -> bool {
        self.ty() == other.ty() && self.bits() == other.bits()
    }
}

impl Eq for PrimitiveValue {}

impl Hash for PrimitiveValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty().hash(state);
        self.bits().hash(state);
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Primitive {
    pub value: PrimitiveValue,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Swizzle {
    pub src: Index,
    pub code: SwizzleCode,
}

/// Binary operator; unary operators leave `b` null.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Operation {
    pub a: Index,
    pub b: Index,
    pub code: OperationCode,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Intrinsic {
    /// Head of a `List` chain, or null.
    pub args: Index,
    pub code: IntrinsicCode,
}

/// Cons cell of an argument list.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct List {
    pub item: Index,
    pub next: Index,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Construct {
    pub ty: Index,
    /// Head of a `List` chain, or null for a default-initialized value.
    pub args: Index,
    pub mode: ConstructorMode,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Call {
    pub callee: CallableId,
    /// Return type node.
    pub ty: Index,
    pub args: Index,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Store {
    pub dst: Index,
    pub src: Index,
}

/// Field read; a negative `idx` reads the whole value.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Load {
    pub src: Index,
    pub idx: i32,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ArrayAccess {
    pub src: Index,
    pub loc: Index,
}

/// Control-flow marker. `failto` is the next branch of the same
/// construct and is the only address allowed to point forward.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Branch {
    pub cond: Index,
    pub failto: Index,
    pub kind: BranchKind,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Return {
    pub value: Index,
}

/// One IR instruction.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Atom {
    Qualifier(Qualifier),
    TypeInformation(TypeInformation),
    Primitive(Primitive),
    Swizzle(Swizzle),
    Operation(Operation),
    Intrinsic(Intrinsic),
    List(List),
    Construct(Construct),
    Call(Call),
    Store(Store),
    Load(Load),
    ArrayAccess(ArrayAccess),
    Branch(Branch),
    Return(Return),
}

impl Atom {
    /// Both operand addresses; unused slots are null.
    pub fn addresses(&self) -> [Index; 2] {
        match self {
            Atom::Qualifier(q) => [q.underlying, Index::NULL],
            Atom::TypeInformation(t) => [t.down, t.next],
            Atom::Primitive(_) => [Index::NULL; 2],
            Atom::Swizzle(s) => [s.src, Index::NULL],
            Atom::Operation(o) => [o.a, o.b],
            Atom::Intrinsic(i) => [i.args, Index::NULL],
            Atom::List(l) => [l.item, l.next],
            Atom::Construct(c) => [c.ty, c.args],
            Atom::Call(c) => [c.ty, c.args],
            Atom::Store(s) => [s.dst, s.src],
            Atom::Load(l) => [l.src, Index::NULL],
            Atom::ArrayAccess(a) => [a.src, a.loc],
            Atom::Branch(b) => [b.cond, b.failto],
            Atom::Return(r) => [r.value, Index::NULL],
        }
    }

    /// Mutable access to every address slot the atom has.
    pub fn addresses_mut(&mut self) -> impl Iterator<Item = &mut Index> {
        let slots: [Option<&mut Index>; 2] = match self {
            Atom::Qualifier(q) => [Some(&mut q.underlying), None],
            Atom::TypeInformation(t) => [Some(&mut t.down), Some(&mut t.next)],
            Atom::Primitive(_) => [None, None],
            Atom::Swizzle(s) => [Some(&mut s.src), None],
            Atom::Operation(o) => [Some(&mut o.a), Some(&mut o.b)],
            Atom::Intrinsic(i) => [Some(&mut i.args), None],
            Atom::List(l) => [Some(&mut l.item), Some(&mut l.next)],
            Atom::Construct(c) => [Some(&mut c.ty), Some(&mut c.args)],
            Atom::Call(c) => [Some(&mut c.ty), Some(&mut c.args)],
            Atom::Store(s) => [Some(&mut s.dst), Some(&mut s.src)],
            Atom::Load(l) => [Some(&mut l.src), None],
            Atom::ArrayAccess(a) => [Some(&mut a.src), Some(&mut a.loc)],
            Atom::Branch(b) => [Some(&mut b.cond), Some(&mut b.failto)],
            Atom::Return(r) => [Some(&mut r.value), None],
        };
        slots.into_iter().flatten()
    }

    /// Non-null data dependencies. A branch's `failto` is control flow,
    /// not data, and is excluded.
    pub fn operands(&self) -> impl Iterator<Item = Index> {
        let [a, b] = self.addresses();
        let b = if matches!(self, Atom::Branch(_)) { Index::NULL } else { b };
        [a, b].into_iter().filter(|i| !i.is_null())
    }

    /// Mnemonic used by assembly listings.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Atom::Qualifier(_) => "qualifier",
            Atom::TypeInformation(_) => "type",
            Atom::Primitive(_) => "primitive",
            Atom::Swizzle(_) => "swizzle",
            Atom::Operation(_) => "operation",
            Atom::Intrinsic(_) => "intrinsic",
            Atom::List(_) => "list",
            Atom::Construct(_) => "construct",
            Atom::Call(_) => "call",
            Atom::Store(_) => "store",
            Atom::Load(_) => "load",
            Atom::ArrayAccess(_) => "access",
            Atom::Branch(_) => "branch",
            Atom::Return(_) => "return",
        }
    }

    /// Atoms whose execution is observable regardless of their uses.
    pub fn is_side_effect(&self) -> bool {
        match self {
            Atom::Store(_) | Atom::Return(_) | Atom::Branch(_) | Atom::Call(_) => true,
            Atom::Intrinsic(i) => i.code.is_side_effect() || i.code.is_layout(),
            _ => false,
        }
    }

    /// Literal value, if this is a primitive.
    pub fn literal(&self) -> Option<PrimitiveValue> {
        match self {
            Atom::Primitive(p) => Some(p.value),
            _ => None,
        }
    }
}

macro_rules! atom_from {
    ($($payload:ident),* $(,)?) => {
        $(
            impl From<$payload> for Atom {
                fn from(payload: $payload) -> Self {
                    Atom::$payload(payload)
                }
            }
        )*
    };
}

atom_from!(
    Qualifier,
    TypeInformation,
    Primitive,
    Swizzle,
    Operation,
    Intrinsic,
    List,
    Construct,
    Call,
    Store,
    Load,
    ArrayAccess,
    Branch,
    Return,
);
