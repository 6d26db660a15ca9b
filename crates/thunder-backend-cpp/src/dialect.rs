//! C++ spelling of types, literals and built-in calls.

use thunder_backend_core::{BackendError, Dialect, Direction, data_name, naming, type_name};
use thunder_ir::{
    CallableId, ImageType, IntrinsicCode, PrimitiveType, PrimitiveValue, SamplerType, SwizzleCode,
};
use thunder_link::{DataType, GlobalRef, LinkageUnit, SpecialKind, UnitType};

/// The C++ dialect. Vectors and matrices come from the `tsl` preamble.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cpp;

fn float(value: f64, suffix: &str) -> String {
    if value.is_nan() {
        return "NAN".into();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-INFINITY" } else { "INFINITY" }.into();
    }
    format!("{value:?}{suffix}")
}

/// Positions of a multi-component selection, comma separated.
fn positions(code: SwizzleCode) -> String {
    code.components()
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Cpp {
    /// Type of the parameter a global resource is passed through.
    fn global_type(&self, unit: &LinkageUnit<'_>, global: GlobalRef) -> Result<UnitType, BackendError> {
        let globals = unit.globals();
        let missing = || BackendError::Other(format!("{global:?} is used but not declared"));
        Ok(match global {
            GlobalRef::Input(location) => globals.inputs.get(&location).ok_or_else(missing)?.ty,
            GlobalRef::Output(location) => globals.outputs.get(&location).ok_or_else(missing)?.ty,
            GlobalRef::PushConstant => globals.push_constant.as_ref().ok_or_else(missing)?.ty,
            GlobalRef::Uniform(binding) => globals.uniforms.get(&binding).ok_or_else(missing)?.ty,
            GlobalRef::Buffer(binding) => globals.buffers.get(&binding).ok_or_else(missing)?.ty,
            GlobalRef::Shared(id) => globals.shared.get(&id).ok_or_else(missing)?.ty,
            GlobalRef::Special(SpecialKind::AccelerationStructure, _) => {
                UnitType::primitive(PrimitiveType::AccelerationStructure)
            }
            GlobalRef::Special(kind, number) => {
                globals.special.get(&(kind, number)).ok_or_else(missing)?.ty
            }
            GlobalRef::Builtin(kind) => {
                let (_, ty) = kind.builtin().ok_or_else(missing)?;
                UnitType::primitive(ty)
            }
            GlobalRef::Sampler(_) | GlobalRef::Image(_) => {
                return Err(BackendError::Unsupported(format!(
                    "{} has no C++ equivalent",
                    naming::global(global)
                )));
            }
        })
    }

    /// Parameters carrying the globals `function` and its callees use.
    pub fn resource_parameters(
        &self,
        unit: &LinkageUnit<'_>,
        function: CallableId,
    ) -> Result<Vec<String>, BackendError> {
        unit.globals_used(function)
            .into_iter()
            .map(|global| {
                let ty = self.global_type(unit, global)?;
                let name = naming::global(global);
                Ok(match ty {
                    UnitType::Array { element, size } if size < 0 => {
                        format!("{} *{name}", data_name(unit, self, element)?)
                    }
                    other => format!("{} &{name}", type_name(unit, self, &other)?),
                })
            })
            .collect()
    }
}

impl Dialect for Cpp {
    fn primitive(&self, p: PrimitiveType) -> String {
        use PrimitiveType as P;
        match p {
            P::Nil => "void".into(),
            P::Boolean => "bool".into(),
            P::I32 => "int32_t".into(),
            P::U32 => "uint32_t".into(),
            P::F32 => "float".into(),
            P::F64 => "double".into(),
            P::U64 | P::AccelerationStructure => "uint64_t".into(),
            other => format!("tsl::{}", other.glsl()),
        }
    }

    fn array(&self, element: &str, size: i32) -> String {
        if size < 0 {
            format!("{element} *")
        } else {
            format!("std::array<{element}, {size}>")
        }
    }

    fn image(&self, image: ImageType) -> Result<String, BackendError> {
        Err(BackendError::Unsupported(format!(
            "{}D images have no C++ equivalent",
            image.dimension
        )))
    }

    fn sampler(&self, sampler: SamplerType) -> Result<String, BackendError> {
        Err(BackendError::Unsupported(format!(
            "{}D samplers have no C++ equivalent",
            sampler.dimension
        )))
    }

    fn buffer_reference(&self, base: &str, _id: i32) -> String {
        format!("{base} *")
    }

    fn literal(&self, value: PrimitiveValue) -> String {
        match value {
            PrimitiveValue::Bool(v) => v.to_string(),
            PrimitiveValue::I32(v) => v.to_string(),
            PrimitiveValue::U32(v) => format!("{v}u"),
            PrimitiveValue::F32(v) => {
                if v.is_finite() {
                    format!("{v:?}f")
                } else {
                    float(v as f64, "f")
                }
            }
            PrimitiveValue::F64(v) => float(v, ""),
            PrimitiveValue::U64(v) => format!("{v}ull"),
        }
    }

    fn construct(&self, ty: &UnitType, name: &str, args: &[String]) -> String {
        match ty {
            UnitType::Data(DataType::Aggregate(_)) | UnitType::Array { .. } => {
                format!("{name}{{{}}}", args.join(", "))
            }
            _ => format!("{name}({})", args.join(", ")),
        }
    }

    fn address_cast(&self, name: &str, address: &str) -> String {
        format!("reinterpret_cast<{name}>({address})")
    }

    fn swizzle(&self, src: &str, code: SwizzleCode) -> String {
        match code.components() {
            [single] => format!("{src}[{single}]"),
            many => format!("tsl::swizzle<{}>({src}, {})", many.len(), positions(code)),
        }
    }

    fn swizzle_target(&self, src: &str, code: SwizzleCode) -> String {
        match code.components() {
            [single] => format!("{src}[{single}]"),
            many => format!("tsl::select<{}>({src}, {})", many.len(), positions(code)),
        }
    }

    fn intrinsic(&self, code: IntrinsicCode, args: &[String]) -> Result<String, BackendError> {
        use IntrinsicCode as I;
        match code {
            I::Dfdx
            | I::Dfdy
            | I::Fwidth
            | I::Texture
            | I::TextureLod
            | I::TexelFetch
            | I::TextureSize
            | I::ImageLoad
            | I::ImageStore
            | I::ImageSize
            | I::Discard
            | I::Barrier
            | I::MemoryBarrier
            | I::EmitMeshTasks
            | I::SetMeshOutputs
            | I::SubgroupBarrier
            | I::SubgroupElect
            | I::SubgroupAdd
            | I::SubgroupBroadcastFirst
            | I::AtomicAdd
            | I::TraceRay
            | I::TerminateRay
            | I::IgnoreIntersection
            | I::LayoutLocalSize
            | I::LayoutMeshShaderSizes => Err(BackendError::Unsupported(format!(
                "intrinsic `{code}` has no C++ equivalent"
            ))),
            _ => Ok(format!("tsl::{}({})", code.glsl_name(), args.join(", "))),
        }
    }

    fn block_member(&self, block: &str, _phantom: bool) -> String {
        block.to_string()
    }

    fn dereference(&self, reference: &str, _phantom: bool) -> String {
        format!("(*{reference})")
    }

    fn parameter(&self, ty: &str, name: &str, direction: Direction) -> String {
        if direction.writes() {
            format!("{ty} &{name}")
        } else {
            format!("{ty} {name}")
        }
    }

    fn call(
        &self,
        unit: &LinkageUnit<'_>,
        callee: CallableId,
        symbol: &str,
        args: &[String],
    ) -> String {
        let mut all = args.to_vec();
        all.extend(unit.globals_used(callee).into_iter().map(naming::global));
        format!("{symbol}({})", all.join(", "))
    }

    fn extra_parameters(
        &self,
        unit: &LinkageUnit<'_>,
        function: CallableId,
    ) -> Result<Vec<String>, BackendError> {
        self.resource_parameters(unit, function)
    }
}
