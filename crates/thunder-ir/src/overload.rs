//! Operator and intrinsic overload tables.
//!
//! Every candidate is an exact signature; broadcasting (`vecN op scalar`,
//! `mat * vec`, ...) is spelled out in the tables rather than derived at
//! lookup time. Resource intrinsics (textures, images, ray tracing) depend
//! on the sampler/image dimension and are resolved by [`resolve_resource`].

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use crate::codes::{IntrinsicCode, OperationCode};
use crate::error::IrError;
use crate::types::{PrimitiveType, QualifiedType};

/// One candidate signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Overload {
    pub result: QualifiedType,
    pub args: Vec<QualifiedType>,
}

impl Overload {
    fn matches(&self, args: &[QualifiedType]) -> bool {
        self.args.len() == args.len() && self.args.iter().zip(args).all(|(a, b)| *a == b.bare())
    }
}

impl fmt::Display for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ") -> {}", self.result)
    }
}

use PrimitiveType as P;

const FLOAT_GEN: [P; 4] = [P::F32, P::Vec2, P::Vec3, P::Vec4];
const INT_GEN: [P; 4] = [P::I32, P::IVec2, P::IVec3, P::IVec4];
const UINT_GEN: [P; 4] = [P::U32, P::UVec2, P::UVec3, P::UVec4];
const MATRICES: [P; 3] = [P::Mat2, P::Mat3, P::Mat4];
const NUMERIC_SCALARS: [P; 5] = [P::I32, P::U32, P::F32, P::F64, P::U64];
const INTEGER_SCALARS: [P; 3] = [P::I32, P::U32, P::U64];

struct Table<K> {
    entries: HashMap<K, Vec<Overload>>,
}

impl<K: Copy + Eq + Hash> Table<K> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn add(&mut self, key: K, result: P, args: &[P]) {
        self.entries.entry(key).or_default().push(Overload {
            result: QualifiedType::primitive(result),
            args: args.iter().copied().map(QualifiedType::primitive).collect(),
        });
    }

    /// `(n, ..) -> nil` for every arity in `arities` and every mix of
    /// `i32` and `u32` sizes.
    fn sizes(&mut self, key: K, arities: RangeInclusive<usize>) {
        for arity in arities {
            for mask in 0..1u32 << arity {
                let args: Vec<P> = (0..arity)
                    .map(|i| if mask >> i & 1 == 0 { P::I32 } else { P::U32 })
                    .collect();
                self.add(key, P::Nil, &args);
            }
        }
    }

    /// `(v, v) -> v`, `(v, s) -> v` and `(s, v) -> v` across a family.
    fn broadcast(&mut self, key: K, family: &[P; 4], scalar_first: bool) {
        let s = family[0];
        self.add(key, s, &[s, s]);
        for &v in &family[1..] {
            self.add(key, v, &[v, v]);
            self.add(key, v, &[v, s]);
            if scalar_first {
                self.add(key, v, &[s, v]);
            }
        }
    }

    /// `(t) -> t` for each type.
    fn unary(&mut self, key: K, types: &[P]) {
        for &t in types {
            self.add(key, t, &[t]);
        }
    }
}

static OPERATIONS: LazyLock<HashMap<OperationCode, Vec<Overload>>> = LazyLock::new(|| {
    use OperationCode as O;
    let mut t = Table::new();

    for code in [O::Addition, O::Subtraction, O::Multiplication, O::Division] {
        for s in [P::F64, P::U64] {
            t.add(code, s, &[s, s]);
        }
        for family in [&FLOAT_GEN, &INT_GEN, &UINT_GEN] {
            t.broadcast(code, family, true);
        }
        for m in MATRICES {
            t.add(code, m, &[m, m]);
            t.add(code, m, &[m, P::F32]);
            t.add(code, m, &[P::F32, m]);
        }
    }
    for m in MATRICES {
        let column = m.matrix_column().unwrap_or(m);
        t.add(O::Multiplication, column, &[m, column]);
        t.add(O::Multiplication, column, &[column, m]);
    }

    for code in [
        O::Modulus,
        O::BitAnd,
        O::BitOr,
        O::BitXor,
        O::BitShiftLeft,
        O::BitShiftRight,
    ] {
        t.add(code, P::U64, &[P::U64, P::U64]);
        t.broadcast(code, &INT_GEN, false);
        t.broadcast(code, &UINT_GEN, false);
    }

    for code in [O::LogicalAnd, O::LogicalOr] {
        t.add(code, P::Boolean, &[P::Boolean, P::Boolean]);
    }

    for code in [O::Equals, O::NotEquals] {
        let comparable = NUMERIC_SCALARS
            .iter()
            .chain(&[P::Boolean])
            .chain(&FLOAT_GEN[1..])
            .chain(&INT_GEN[1..])
            .chain(&UINT_GEN[1..])
            .chain(&MATRICES);
        for &ty in comparable {
            t.add(code, P::Boolean, &[ty, ty]);
        }
    }
    for code in [O::Less, O::LessEqual, O::Greater, O::GreaterEqual] {
        for s in NUMERIC_SCALARS {
            t.add(code, P::Boolean, &[s, s]);
        }
    }

    t.unary(O::Negation, &NUMERIC_SCALARS);
    t.unary(O::Negation, &FLOAT_GEN[1..]);
    t.unary(O::Negation, &INT_GEN[1..]);
    t.unary(O::Negation, &MATRICES);
    t.unary(O::LogicalNot, &[P::Boolean]);
    t.unary(O::BitNot, &INTEGER_SCALARS);
    t.unary(O::BitNot, &INT_GEN[1..]);
    t.unary(O::BitNot, &UINT_GEN[1..]);

    t.entries
});

static INTRINSICS: LazyLock<HashMap<IntrinsicCode, Vec<Overload>>> = LazyLock::new(|| {
    use IntrinsicCode as I;
    let mut t = Table::new();

    for code in [
        I::Floor,
        I::Ceil,
        I::Fract,
        I::Sqrt,
        I::InverseSqrt,
        I::Exp,
        I::Log,
        I::Exp2,
        I::Log2,
        I::Sin,
        I::Cos,
        I::Tan,
        I::Asin,
        I::Acos,
        I::Atan,
        I::Normalize,
        I::Dfdx,
        I::Dfdy,
        I::Fwidth,
    ] {
        t.unary(code, &FLOAT_GEN);
    }
    for code in [I::Abs, I::Sign] {
        t.unary(code, &FLOAT_GEN);
        t.unary(code, &INT_GEN);
    }

    for g in FLOAT_GEN {
        t.add(I::Length, P::F32, &[g]);
        t.add(I::Distance, P::F32, &[g, g]);
        t.add(I::Dot, P::F32, &[g, g]);
        t.add(I::Reflect, g, &[g, g]);
        t.add(I::Pow, g, &[g, g]);
        t.add(I::Step, g, &[g, g]);
        t.add(I::Smoothstep, g, &[g, g, g]);
        t.add(I::Mix, g, &[g, g, g]);
    }
    for &v in &FLOAT_GEN[1..] {
        t.add(I::Step, v, &[P::F32, v]);
        t.add(I::Smoothstep, v, &[P::F32, P::F32, v]);
        t.add(I::Mix, v, &[v, v, P::F32]);
    }
    t.add(I::Cross, P::Vec3, &[P::Vec3, P::Vec3]);

    for family in [&FLOAT_GEN, &INT_GEN, &UINT_GEN] {
        let s = family[0];
        for code in [I::Min, I::Max] {
            t.broadcast(code, family, false);
        }
        t.add(I::Clamp, s, &[s, s, s]);
        for &v in &family[1..] {
            t.add(I::Clamp, v, &[v, v, v]);
            t.add(I::Clamp, v, &[v, s, s]);
        }
    }
    t.broadcast(I::Mod, &FLOAT_GEN, false);

    for m in MATRICES {
        t.add(I::Transpose, m, &[m]);
        t.add(I::Inverse, m, &[m]);
        t.add(I::Determinant, P::F32, &[m]);
    }

    for code in [
        I::Discard,
        I::Barrier,
        I::MemoryBarrier,
        I::SubgroupBarrier,
        I::TerminateRay,
        I::IgnoreIntersection,
    ] {
        t.add(code, P::Nil, &[]);
    }
    t.add(I::SubgroupElect, P::Boolean, &[]);
    for code in [I::SubgroupAdd, I::SubgroupBroadcastFirst] {
        t.unary(code, &FLOAT_GEN);
        t.unary(code, &INT_GEN);
        t.unary(code, &UINT_GEN);
    }
    t.add(I::AtomicAdd, P::I32, &[P::I32, P::I32]);
    t.add(I::AtomicAdd, P::U32, &[P::U32, P::U32]);
    for s in [P::I32, P::U32] {
        t.add(I::EmitMeshTasks, P::Nil, &[s, s, s]);
        t.add(I::SetMeshOutputs, P::Nil, &[s, s]);
    }
    t.sizes(I::LayoutLocalSize, 1..=3);
    t.sizes(I::LayoutMeshShaderSizes, 2..=2);

    t.entries
});

/// Candidate list of an operator.
pub fn operation_overloads(code: OperationCode) -> &'static [Overload] {
    OPERATIONS.get(&code).map(Vec::as_slice).unwrap_or(&[])
}

/// Candidate list of a table-resolved intrinsic.
pub fn intrinsic_overloads(code: IntrinsicCode) -> &'static [Overload] {
    INTRINSICS.get(&code).map(Vec::as_slice).unwrap_or(&[])
}

/// Result type of `code` applied to `args`.
pub fn lookup_operation(
    code: OperationCode,
    args: &[QualifiedType],
) -> Result<QualifiedType, IrError> {
    select(code.name(), operation_overloads(code), args)
}

/// Result type of a table-resolved intrinsic applied to `args`.
pub fn lookup_intrinsic(
    code: IntrinsicCode,
    args: &[QualifiedType],
) -> Result<QualifiedType, IrError> {
    if code.is_resource_access() {
        return resolve_resource(code, args);
    }
    select(code.name(), intrinsic_overloads(code), args)
}

fn select(
    target: &str,
    candidates: &[Overload],
    args: &[QualifiedType],
) -> Result<QualifiedType, IrError> {
    candidates
        .iter()
        .find(|o| o.matches(args))
        .map(|o| o.result.clone())
        .ok_or_else(|| failure(target, args, candidates.iter().map(ToString::to_string)))
}

fn failure(
    target: &str,
    args: &[QualifiedType],
    candidates: impl Iterator<Item = String>,
) -> IrError {
    IrError::OverloadResolution {
        target: target.to_string(),
        attempted: args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
        candidates: candidates.collect(),
    }
}

fn float_coord(dimension: u8) -> P {
    P::vector(P::F32, dimension as usize).unwrap_or(P::F32)
}

fn int_coord(dimension: u8) -> P {
    P::vector(P::I32, dimension as usize).unwrap_or(P::I32)
}

/// Expected signatures of a resource intrinsic for a given resource.
fn resource_signatures(code: IntrinsicCode, resource: &QualifiedType) -> Vec<Overload> {
    use IntrinsicCode as I;
    let plain = |args: &[P]| -> Vec<QualifiedType> {
        std::iter::once(resource.clone())
            .chain(args.iter().copied().map(QualifiedType::primitive))
            .collect()
    };
    let overload = |result: P, args: &[P]| Overload {
        result: QualifiedType::primitive(result),
        args: plain(args),
    };
    match (code, resource) {
        (I::Texture, QualifiedType::Sampler(s)) => {
            vec![overload(s.result, &[float_coord(s.dimension)])]
        }
        (I::TextureLod, QualifiedType::Sampler(s)) => {
            vec![overload(s.result, &[float_coord(s.dimension), P::F32])]
        }
        (I::TexelFetch, QualifiedType::Sampler(s)) => {
            vec![overload(s.result, &[int_coord(s.dimension), P::I32])]
        }
        (I::TextureSize, QualifiedType::Sampler(s)) => {
            vec![overload(int_coord(s.dimension), &[P::I32])]
        }
        (I::ImageLoad, QualifiedType::Image(i)) => {
            vec![overload(i.result, &[int_coord(i.dimension)])]
        }
        (I::ImageStore, QualifiedType::Image(i)) => {
            vec![overload(P::Nil, &[int_coord(i.dimension), i.result])]
        }
        (I::ImageSize, QualifiedType::Image(i)) => vec![overload(int_coord(i.dimension), &[])],
        (I::TraceRay, _) => {
            let accel = QualifiedType::primitive(P::AccelerationStructure);
            let args = [
                P::U32,
                P::U32,
                P::U32,
                P::U32,
                P::U32,
                P::Vec3,
                P::F32,
                P::Vec3,
                P::F32,
                P::I32,
            ];
            vec![Overload {
                result: QualifiedType::Nil,
                args: std::iter::once(accel)
                    .chain(args.into_iter().map(QualifiedType::primitive))
                    .collect(),
            }]
        }
        _ => Vec::new(),
    }
}

/// Resolves texture, image and ray-tracing intrinsics by the dimension of
/// their first argument.
pub fn resolve_resource(
    code: IntrinsicCode,
    args: &[QualifiedType],
) -> Result<QualifiedType, IrError> {
    let resource = args.first().map(QualifiedType::bare).unwrap_or_default();
    let candidates = resource_signatures(code, &resource);
    if candidates.is_empty() {
        let expected = match code {
            IntrinsicCode::ImageLoad | IntrinsicCode::ImageStore | IntrinsicCode::ImageSize => {
                "image"
            }
            _ => "sampler",
        };
        return Err(failure(
            code.name(),
            args,
            std::iter::once(format!("first argument must be a {expected}")),
        ));
    }
    select(code.name(), &candidates, args)
}
