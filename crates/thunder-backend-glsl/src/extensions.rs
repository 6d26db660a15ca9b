//! `#extension` directives a unit needs.

use std::collections::BTreeSet;
use std::fmt;

use thunder_backend_core::Stage;
use thunder_ir::{Atom, IntrinsicCode, PrimitiveType, QualifiedType};
use thunder_link::{DataType, LinkageUnit, UnitType};

/// GLSL extensions the generator may require.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Extension {
    BufferReference,
    ScalarBlockLayout,
    Int64,
    MeshShader,
    RayTracing,
    SubgroupBasic,
    SubgroupArithmetic,
    SubgroupBallot,
}

impl Extension {
    pub fn name(self) -> &'static str {
        match self {
            Self::BufferReference => "GL_EXT_buffer_reference",
            Self::ScalarBlockLayout => "GL_EXT_scalar_block_layout",
            Self::Int64 => "GL_EXT_shader_explicit_arithmetic_types_int64",
            Self::MeshShader => "GL_EXT_mesh_shader",
            Self::RayTracing => "GL_EXT_ray_tracing",
            Self::SubgroupBasic => "GL_KHR_shader_subgroup_basic",
            Self::SubgroupArithmetic => "GL_KHR_shader_subgroup_arithmetic",
            Self::SubgroupBallot => "GL_KHR_shader_subgroup_ballot",
        }
    }

    fn of_intrinsic(code: IntrinsicCode) -> Option<Self> {
        use IntrinsicCode as I;
        Some(match code {
            I::EmitMeshTasks | I::SetMeshOutputs | I::LayoutMeshShaderSizes => Self::MeshShader,
            I::TraceRay | I::TerminateRay | I::IgnoreIntersection => Self::RayTracing,
            I::SubgroupBarrier | I::SubgroupElect => Self::SubgroupBasic,
            I::SubgroupAdd => Self::SubgroupArithmetic,
            I::SubgroupBroadcastFirst => Self::SubgroupBallot,
            _ => return None,
        })
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn is_u64(ty: &QualifiedType) -> bool {
    ty.primitive_type() == Some(PrimitiveType::U64)
        || matches!(
            ty.bare(),
            QualifiedType::Array(a) if a.base == PrimitiveType::U64.into()
        )
}

fn unit_type_is_u64(ty: &UnitType) -> bool {
    let u64 = DataType::Primitive(PrimitiveType::U64);
    match ty {
        UnitType::Data(d) => *d == u64,
        UnitType::Array { element, .. } => *element == u64,
        _ => false,
    }
}

/// Every extension the unit's globals, atoms and stage call for.
pub fn required(unit: &LinkageUnit<'_>, stage: Stage) -> BTreeSet<Extension> {
    let mut required = BTreeSet::new();
    let globals = unit.globals();

    if !globals.buffer_references.is_empty() {
        required.insert(Extension::BufferReference);
        required.insert(Extension::Int64);
    }
    let scalar = globals.buffer_references.values().any(|r| r.scalar)
        || globals
            .uniforms
            .values()
            .chain(globals.buffers.values())
            .any(|b| b.scalar);
    if scalar {
        required.insert(Extension::ScalarBlockLayout);
    }
    if matches!(stage, Stage::Task | Stage::Mesh) || unit.control().mesh_shader_size.is_some() {
        required.insert(Extension::MeshShader);
    }
    if stage.is_ray_tracing() {
        required.insert(Extension::RayTracing);
    }
    for (kind, _) in globals.special.keys() {
        required.insert(match kind {
            thunder_link::SpecialKind::TaskPayload => Extension::MeshShader,
            _ => Extension::RayTracing,
        });
    }

    let aggregate_u64 = unit
        .aggregates()
        .iter()
        .flat_map(|a| a.fields.iter())
        .any(|f| f.ty == DataType::Primitive(PrimitiveType::U64));
    let global_u64 = globals
        .uniforms
        .values()
        .chain(globals.buffers.values())
        .any(|b| unit_type_is_u64(&b.ty));
    if aggregate_u64 || global_u64 {
        required.insert(Extension::Int64);
    }

    for function in unit.functions() {
        let buffer = &function.buffer;
        for (index, atom) in buffer.iter() {
            if let Atom::Intrinsic(i) = atom {
                if let Some(extension) = Extension::of_intrinsic(i.code) {
                    required.insert(extension);
                }
            }
            if buffer.is_marked(index) && buffer.type_of(index).is_ok_and(|ty| is_u64(&ty)) {
                required.insert(Extension::Int64);
            }
        }
    }
    required
}
