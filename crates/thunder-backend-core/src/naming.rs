//! Names of globals, parameters and locals in generated source.
//!
//! Every text backend uses the same names so that generated GLSL and C++
//! read alike and a global keeps its name across functions.

use thunder_ir::{Buffer, Index, QualifierKind};
use thunder_link::{GlobalRef, SpecialKind};

/// Name of a local value.
pub fn local(n: usize) -> String {
    format!("s{n}")
}

/// Name of the parameter at `position`.
pub fn argument(position: usize) -> String {
    format!("_arg{position}")
}

/// Name of the global a unit-level table entry declares.
pub fn global(global: GlobalRef) -> String {
    match global {
        GlobalRef::Input(location) => format!("_lin{location}"),
        GlobalRef::Output(location) => format!("_lout{location}"),
        GlobalRef::PushConstant => "_pc".into(),
        GlobalRef::Uniform(binding) => format!("_uniform{binding}"),
        GlobalRef::Buffer(binding) => format!("_buffer{binding}"),
        GlobalRef::Shared(id) => format!("_shared{id}"),
        GlobalRef::Sampler(binding) => format!("_sampler{binding}"),
        GlobalRef::Image(binding) => format!("_image{binding}"),
        GlobalRef::Special(kind, binding) => match kind {
            SpecialKind::TaskPayload => "_task_payload".into(),
            SpecialKind::HitAttribute => "_hit_attribute".into(),
            SpecialKind::AccelerationStructure => format!("_accel{binding}"),
            SpecialKind::RayPayload => format!("_payload{binding}"),
            SpecialKind::RayPayloadIn => format!("_payload_in{binding}"),
        },
        GlobalRef::Builtin(kind) => kind.name().into(),
    }
}

/// Block type name of a uniform or storage buffer, push constant or
/// buffer reference.
pub fn block(target: GlobalRef) -> String {
    match target {
        GlobalRef::Uniform(binding) => format!("_Uniform{binding}"),
        GlobalRef::Buffer(binding) => format!("_Buffer{binding}"),
        GlobalRef::PushConstant => "_PushConstant".into(),
        other => format!("_Block{}", global(other)),
    }
}

/// Type name of the buffer reference with uniqueness id `id`.
pub fn buffer_reference(id: i32) -> String {
    format!("_Ref{id}")
}

/// The unit-level global a qualifier kind and number declare, if any.
pub fn global_ref(kind: QualifierKind, numerical: i32) -> Option<GlobalRef> {
    if kind.builtin().is_some() {
        return Some(GlobalRef::Builtin(kind));
    }
    if kind.layout_in().is_some() {
        return Some(GlobalRef::Input(numerical));
    }
    if kind.layout_out().is_some() {
        return Some(GlobalRef::Output(numerical));
    }
    if let Some(special) = SpecialKind::from_qualifier(kind) {
        return Some(GlobalRef::Special(special, numerical));
    }
    if kind.sampler_info().is_some() {
        return Some(GlobalRef::Sampler(numerical));
    }
    if kind.image_info().is_some() {
        return Some(GlobalRef::Image(numerical));
    }
    Some(match kind {
        QualifierKind::PushConstant => GlobalRef::PushConstant,
        QualifierKind::UniformBuffer => GlobalRef::Uniform(numerical),
        QualifierKind::StorageBuffer => GlobalRef::Buffer(numerical),
        QualifierKind::Shared => GlobalRef::Shared(numerical),
        _ => return None,
    })
}

/// The global declared by the qualifier at `index`, looking through
/// modifier, format and array wrappers.
pub fn resolve_global(buffer: &Buffer, mut index: Index) -> Option<GlobalRef> {
    loop {
        let thunder_ir::Atom::Qualifier(q) = buffer.get(index)? else {
            return None;
        };
        if q.kind.is_modifier() || q.kind.format().is_some() || q.kind == QualifierKind::Arrays {
            index = q.underlying;
            continue;
        }
        return global_ref(q.kind, q.numerical);
    }
}
