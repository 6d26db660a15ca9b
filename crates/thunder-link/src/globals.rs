//! Unit-level global resource tables.
//!
//! Qualifiers that name external bindings are collected here while
//! functions are added. Two functions may declare the same binding; when
//! the declarations disagree the later one replaces the earlier with a
//! warning.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thunder_ir::{CallableId, ImageType, Index, Interpolation, QualifierKind, SamplerType};

use crate::types::{DataType, UnitType};

/// The qualifier atom a global was declared by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Origin {
    pub function: CallableId,
    pub atom: Index,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}{}", self.function, self.atom)
    }
}

#[derive(Clone, Debug)]
pub struct LayoutVariable {
    pub ty: UnitType,
    pub interpolation: Interpolation,
    pub origin: Origin,
}

#[derive(Clone, Debug)]
pub struct PushConstant {
    pub ty: UnitType,
    /// Byte offset of the block within the push constant range.
    pub offset: i32,
    pub origin: Origin,
}

/// A uniform or storage buffer block.
#[derive(Clone, Debug)]
pub struct BufferBinding {
    pub ty: UnitType,
    pub read_only: bool,
    pub write_only: bool,
    pub scalar: bool,
    pub origin: Origin,
}

#[derive(Clone, Debug)]
pub struct BufferReferenceDecl {
    pub base: DataType,
    pub scalar: bool,
    pub origin: Origin,
}

#[derive(Clone, Debug)]
pub struct SharedVariable {
    pub ty: UnitType,
    pub origin: Origin,
}

#[derive(Clone, Debug)]
pub struct SamplerBinding {
    pub sampler: SamplerType,
    /// Array length for arrays of samplers.
    pub count: Option<i32>,
    pub origin: Origin,
}

#[derive(Clone, Debug)]
pub struct ImageBinding {
    pub image: ImageType,
    pub format: Option<&'static str>,
    pub read_only: bool,
    pub write_only: bool,
    pub count: Option<i32>,
    pub origin: Origin,
}

/// Stage-specific globals.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum SpecialKind {
    TaskPayload,
    HitAttribute,
    AccelerationStructure,
    RayPayload,
    RayPayloadIn,
}

impl SpecialKind {
    pub fn from_qualifier(kind: QualifierKind) -> Option<Self> {
        Some(match kind {
            QualifierKind::TaskPayload => Self::TaskPayload,
            QualifierKind::HitAttribute => Self::HitAttribute,
            QualifierKind::AccelerationStructure => Self::AccelerationStructure,
            QualifierKind::RayPayload => Self::RayPayload,
            QualifierKind::RayPayloadIn => Self::RayPayloadIn,
            _ => return None,
        })
    }
}

impl fmt::Display for SpecialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TaskPayload => "task payload",
            Self::HitAttribute => "hit attribute",
            Self::AccelerationStructure => "acceleration structure",
            Self::RayPayload => "ray payload",
            Self::RayPayloadIn => "incoming ray payload",
        })
    }
}

/// Key of one entry in [`Globals`].
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum GlobalRef {
    Input(i32),
    Output(i32),
    PushConstant,
    Uniform(i32),
    Buffer(i32),
    Shared(i32),
    Sampler(i32),
    Image(i32),
    Special(SpecialKind, i32),
    Builtin(QualifierKind),
}

#[derive(Clone, Debug)]
pub struct SpecialGlobal {
    pub ty: UnitType,
    pub origin: Origin,
}

/// Declarations whose shape can be compared regardless of origin.
pub trait Declaration {
    fn same_shape(&self, other: &Self) -> bool;
}

impl Declaration for LayoutVariable {
    fn same_shape(&self, other: &Self) -> bool {
        self.ty == other.ty && self.interpolation == other.interpolation
    }
}

impl Declaration for PushConstant {
    fn same_shape(&self, other: &Self) -> bool {
        self.ty == other.ty && self.offset == other.offset
    }
}

impl Declaration for BufferBinding {
    fn same_shape(&self, other: &Self) -> bool {
        self.ty == other.ty
    }
}

impl Declaration for BufferReferenceDecl {
    fn same_shape(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl Declaration for SharedVariable {
    fn same_shape(&self, other: &Self) -> bool {
        self.ty == other.ty
    }
}

impl Declaration for SamplerBinding {
    fn same_shape(&self, other: &Self) -> bool {
        self.sampler == other.sampler
    }
}

impl Declaration for ImageBinding {
    fn same_shape(&self, other: &Self) -> bool {
        self.image == other.image
    }
}

impl Declaration for SpecialGlobal {
    fn same_shape(&self, other: &Self) -> bool {
        self.ty == other.ty
    }
}

/// Inserts `value` at `key`. A matching declaration keeps the first one
/// (and its modifiers); a different one replaces it with a warning.
pub(crate) fn define<K, V>(table: &mut BTreeMap<K, V>, category: &str, key: K, value: V)
where
    K: Ord + fmt::Debug,
    V: Declaration,
{
    match table.get(&key) {
        Some(existing) if existing.same_shape(&value) => {}
        Some(_) => {
            log::warn!("{category} {key:?} redefined with a different type; last definition wins");
            table.insert(key, value);
        }
        None => {
            table.insert(key, value);
        }
    }
}

/// Every global resource a unit's functions declare.
#[derive(Clone, Debug, Default)]
pub struct Globals {
    /// Layout inputs by location.
    pub inputs: BTreeMap<i32, LayoutVariable>,
    /// Layout outputs by location.
    pub outputs: BTreeMap<i32, LayoutVariable>,
    pub push_constant: Option<PushConstant>,
    /// Uniform blocks by binding.
    pub uniforms: BTreeMap<i32, BufferBinding>,
    /// Storage blocks by binding.
    pub buffers: BTreeMap<i32, BufferBinding>,
    /// Buffer reference types by uniqueness id.
    pub buffer_references: BTreeMap<i32, BufferReferenceDecl>,
    /// Workgroup-shared variables by id.
    pub shared: BTreeMap<i32, SharedVariable>,
    pub samplers: BTreeMap<i32, SamplerBinding>,
    pub images: BTreeMap<i32, ImageBinding>,
    pub special: BTreeMap<(SpecialKind, i32), SpecialGlobal>,
    /// Builtin variables read or written anywhere in the unit.
    pub builtins: BTreeSet<QualifierKind>,
}

impl Globals {
    pub fn set_push_constant(&mut self, value: PushConstant) {
        if let Some(existing) = &self.push_constant {
            if existing.same_shape(&value) {
                return;
            }
            log::warn!("push constant block redefined; last definition wins");
        }
        self.push_constant = Some(value);
    }

    /// Applies a `read_only`, `write_only` or `scalar_layout` modifier to
    /// the resource declared by `target`.
    pub fn apply_modifier(&mut self, modifier: QualifierKind, target: QualifierKind, binding: i32) {
        let flag = |read_only: &mut bool, write_only: &mut bool, scalar: Option<&mut bool>| {
            match modifier {
                QualifierKind::ReadOnly => *read_only = true,
                QualifierKind::WriteOnly => *write_only = true,
                QualifierKind::ScalarLayout => {
                    if let Some(scalar) = scalar {
                        *scalar = true;
                    }
                }
                _ => {}
            }
        };
        match target {
            QualifierKind::StorageBuffer | QualifierKind::UniformBuffer => {
                let table = if target == QualifierKind::StorageBuffer {
                    &mut self.buffers
                } else {
                    &mut self.uniforms
                };
                if let Some(b) = table.get_mut(&binding) {
                    flag(&mut b.read_only, &mut b.write_only, Some(&mut b.scalar));
                }
            }
            QualifierKind::BufferReference => {
                if let (QualifierKind::ScalarLayout, Some(r)) =
                    (modifier, self.buffer_references.get_mut(&binding))
                {
                    r.scalar = true;
                }
            }
            kind if kind.image_info().is_some() => {
                if let Some(image) = self.images.get_mut(&binding) {
                    flag(&mut image.read_only, &mut image.write_only, None);
                }
            }
            _ => log::warn!("{modifier} has no effect on {target}"),
        }
    }

    /// Sets the array length of the sampler or image at `binding`.
    pub fn resize(&mut self, target: QualifierKind, binding: i32, count: i32) {
        let slot = if target.sampler_info().is_some() {
            self.samplers.get_mut(&binding).map(|s| &mut s.count)
        } else {
            self.images.get_mut(&binding).map(|i| &mut i.count)
        };
        let Some(slot) = slot else {
            return;
        };
        if let Some(previous) = *slot {
            if previous != count {
                log::warn!(
                    "{target} array at binding {binding} resized from {previous} to {count}"
                );
            }
        }
        *slot = Some(count);
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
            && self.outputs.is_empty()
            && self.push_constant.is_none()
            && self.uniforms.is_empty()
            && self.buffers.is_empty()
            && self.buffer_references.is_empty()
            && self.shared.is_empty()
            && self.samplers.is_empty()
            && self.images.is_empty()
            && self.special.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunder_ir::PrimitiveType;

    fn origin(f: u32) -> Origin {
        Origin {
            function: CallableId(f),
            atom: Index::new(0),
        }
    }

    fn storage(ty: PrimitiveType, f: u32) -> BufferBinding {
        BufferBinding {
            ty: UnitType::primitive(ty),
            read_only: false,
            write_only: false,
            scalar: false,
            origin: origin(f),
        }
    }

    #[test]
    fn matching_redefinition_keeps_first() {
        let mut globals = Globals::default();
        define(&mut globals.buffers, "buffer", 0, storage(PrimitiveType::F32, 0));
        globals.apply_modifier(QualifierKind::ReadOnly, QualifierKind::StorageBuffer, 0);
        define(&mut globals.buffers, "buffer", 0, storage(PrimitiveType::F32, 1));
        let binding = &globals.buffers[&0];
        assert_eq!(binding.origin.function, CallableId(0));
        assert!(binding.read_only);
    }

    #[test]
    fn conflicting_redefinition_last_wins() {
        let mut globals = Globals::default();
        define(&mut globals.buffers, "buffer", 2, storage(PrimitiveType::F32, 0));
        define(&mut globals.buffers, "buffer", 2, storage(PrimitiveType::Vec4, 1));
        assert_eq!(globals.buffers[&2].ty, UnitType::primitive(PrimitiveType::Vec4));
        assert_eq!(globals.buffers.len(), 1);
    }

    #[test]
    fn sampler_arrays_resize() {
        let mut globals = Globals::default();
        let sampler = SamplerType {
            result: PrimitiveType::Vec4,
            dimension: 2,
        };
        globals.samplers.insert(
            1,
            SamplerBinding {
                sampler,
                count: None,
                origin: origin(0),
            },
        );
        globals.resize(QualifierKind::Sampler2D, 1, 4);
        globals.resize(QualifierKind::Sampler2D, 1, 16);
        assert_eq!(globals.samplers[&1].count, Some(16));
        // Unknown bindings are ignored.
        globals.resize(QualifierKind::Sampler2D, 9, 3);
        assert!(!globals.samplers.contains_key(&9));
    }

    #[test]
    fn push_constant_replaced() {
        let mut globals = Globals::default();
        assert!(globals.is_empty());
        globals.set_push_constant(PushConstant {
            ty: UnitType::primitive(PrimitiveType::Mat4),
            offset: 0,
            origin: origin(0),
        });
        globals.set_push_constant(PushConstant {
            ty: UnitType::primitive(PrimitiveType::Vec4),
            offset: 64,
            origin: origin(1),
        });
        assert_eq!(globals.push_constant.as_ref().map(|p| p.offset), Some(64));
        assert!(!globals.is_empty());
    }
}
