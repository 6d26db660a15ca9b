//! GLSL 4.60 backend for Thunder.
//!
//! Emits one translation unit per linkage unit: the version pragma, the
//! extensions the unit needs, execution layout, struct and buffer
//! reference declarations, every global resource, then each function in
//! callee-first order.

mod dialect;
mod extensions;

pub use dialect::Glsl;
pub use extensions::{Extension, required as required_extensions};

use thunder_backend_core::{
    Backend, BackendError, BackendOptions, BackendOutput, Diagnostic, DiagnosticLevel,
    OutputContent, OutputFile, StatementGenerator, data_name, naming, type_name,
};
use thunder_link::{DataType, GlobalRef, LinkageUnit, SpecialKind, UnitType};

/// GLSL text backend.
#[derive(Debug)]
pub struct GlslBackend;

impl Backend for GlslBackend {
    fn name(&self) -> &str {
        "GLSL"
    }

    fn targets(&self) -> &[&str] {
        &["glsl"]
    }

    fn compile(
        &self,
        unit: &LinkageUnit<'_>,
        opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        let source = generate(unit, opts)?;
        log::debug!(
            "generated {} bytes of GLSL for {} function(s)",
            source.len(),
            unit.functions().len()
        );
        Ok(BackendOutput {
            files: vec![OutputFile {
                name: "unit.glsl".into(),
                content: OutputContent::Text(source),
            }],
            diagnostics: vec![Diagnostic {
                level: DiagnosticLevel::Info,
                message: format!(
                    "{} function(s), {} aggregate(s) for stage {}",
                    unit.functions().len(),
                    unit.aggregates().len(),
                    opts.stage
                ),
            }],
        })
    }
}

/// GLSL source for a whole unit.
pub fn generate(unit: &LinkageUnit<'_>, opts: &BackendOptions) -> Result<String, BackendError> {
    let mut out = String::new();
    out.push_str(&format!("#version {}\n", opts.glsl_version));
    for extension in required_extensions(unit, opts.stage) {
        out.push_str(&format!("#extension {extension} : require\n"));
    }
    out.push('\n');

    let control = unit.control();
    if let Some([x, y, z]) = control.local_size {
        out.push_str(&format!(
            "layout(local_size_x = {x}, local_size_y = {y}, local_size_z = {z}) in;\n"
        ));
    }
    if let Some(mesh) = control.mesh_shader_size {
        out.push_str(&format!(
            "layout(max_vertices = {}, max_primitives = {}) out;\n",
            mesh.max_vertices, mesh.max_primitives
        ));
        out.push_str("layout(triangles) out;\n");
    }

    for aggregate in unit.aggregates().iter().filter(|a| !a.phantom) {
        out.push_str(&format!("struct {} {{\n", aggregate.name));
        for field in &aggregate.fields {
            out.push_str(&format!(
                "    {} {};\n",
                data_name(unit, &Glsl, field.ty)?,
                field.name
            ));
        }
        out.push_str("};\n\n");
    }

    declare_buffer_references(unit, &mut out)?;
    declare_globals(unit, &mut out)?;

    for function in unit.functions() {
        out.push('\n');
        out.push_str(&StatementGenerator::new(unit, function, &Glsl).generate()?);
    }
    Ok(out)
}

/// `T name` or `T name[N]`.
fn declarator(unit: &LinkageUnit<'_>, ty: &UnitType, name: &str) -> Result<String, BackendError> {
    Ok(match *ty {
        UnitType::Array { element, size } if size < 0 => {
            format!("{} {name}[]", data_name(unit, &Glsl, element)?)
        }
        UnitType::Array { element, size } => {
            format!("{} {name}[{size}]", data_name(unit, &Glsl, element)?)
        }
        ref other => format!("{} {name}", type_name(unit, &Glsl, other)?),
    })
}

/// Members of a block holding `ty`: the fields of a phantom struct, or a
/// single `data` member. `offset` lays out the first member.
fn block_members(
    unit: &LinkageUnit<'_>,
    ty: &UnitType,
    offset: Option<i32>,
) -> Result<String, BackendError> {
    let prefix = |first: bool| match offset {
        Some(offset) if first => format!("layout(offset = {offset}) "),
        _ => String::new(),
    };
    if let UnitType::Data(DataType::Aggregate(index)) = *ty {
        if let Some(aggregate) = unit.aggregate(index).filter(|a| a.phantom) {
            let mut members = String::new();
            for (k, field) in aggregate.fields.iter().enumerate() {
                members.push_str(&format!(
                    " {}{} {};",
                    prefix(k == 0),
                    data_name(unit, &Glsl, field.ty)?,
                    field.name
                ));
            }
            return Ok(members);
        }
    }
    Ok(format!(" {}{};", prefix(true), declarator(unit, ty, "data")?))
}

fn packing(scalar: bool, default: &'static str) -> &'static str {
    if scalar { "scalar" } else { default }
}

fn access(read_only: bool, write_only: bool) -> String {
    let mut text = String::new();
    if read_only {
        text.push_str("readonly ");
    }
    if write_only {
        text.push_str("writeonly ");
    }
    text
}

fn declare_buffer_references(unit: &LinkageUnit<'_>, out: &mut String) -> Result<(), BackendError> {
    let references = &unit.globals().buffer_references;
    for (&id, reference) in references {
        out.push_str(&format!(
            "layout(buffer_reference, {}) buffer {} {{{} }};\n",
            packing(reference.scalar, "std430"),
            naming::buffer_reference(id),
            block_members(unit, &UnitType::Data(reference.base), None)?
        ));
    }
    if !references.is_empty() {
        out.push('\n');
    }
    Ok(())
}

fn declare_globals(unit: &LinkageUnit<'_>, out: &mut String) -> Result<(), BackendError> {
    let globals = unit.globals();

    for (&location, input) in &globals.inputs {
        out.push_str(&format!(
            "layout(location = {location}) {}in {};\n",
            input.interpolation.glsl(),
            declarator(unit, &input.ty, &naming::global(GlobalRef::Input(location)))?
        ));
    }
    for (&location, output) in &globals.outputs {
        out.push_str(&format!(
            "layout(location = {location}) {}out {};\n",
            output.interpolation.glsl(),
            declarator(unit, &output.ty, &naming::global(GlobalRef::Output(location)))?
        ));
    }
    if let Some(push) = &globals.push_constant {
        out.push_str(&format!(
            "layout(push_constant) uniform {} {{{} }} {};\n",
            naming::block(GlobalRef::PushConstant),
            block_members(unit, &push.ty, Some(push.offset))?,
            naming::global(GlobalRef::PushConstant)
        ));
    }
    for (&binding, block) in &globals.uniforms {
        let global = GlobalRef::Uniform(binding);
        out.push_str(&format!(
            "layout(binding = {binding}, {}) uniform {} {{{} }} {};\n",
            packing(block.scalar, "std140"),
            naming::block(global),
            block_members(unit, &block.ty, None)?,
            naming::global(global)
        ));
    }
    for (&binding, block) in &globals.buffers {
        let global = GlobalRef::Buffer(binding);
        out.push_str(&format!(
            "layout(binding = {binding}, {}) {}buffer {} {{{} }} {};\n",
            packing(block.scalar, "std430"),
            access(block.read_only, block.write_only),
            naming::block(global),
            block_members(unit, &block.ty, None)?,
            naming::global(global)
        ));
    }
    for (&id, shared) in &globals.shared {
        out.push_str(&format!(
            "shared {};\n",
            declarator(unit, &shared.ty, &naming::global(GlobalRef::Shared(id)))?
        ));
    }
    for (&binding, sampler) in &globals.samplers {
        let name = naming::global(GlobalRef::Sampler(binding));
        out.push_str(&format!(
            "layout(binding = {binding}) uniform {} {name}{};\n",
            type_name(unit, &Glsl, &UnitType::Sampler(sampler.sampler))?,
            count_suffix(sampler.count)
        ));
    }
    for (&binding, image) in &globals.images {
        let name = naming::global(GlobalRef::Image(binding));
        let format = image
            .format
            .map(|f| format!(", {f}"))
            .unwrap_or_default();
        out.push_str(&format!(
            "layout(binding = {binding}{format}) uniform {}{} {name}{};\n",
            access(image.read_only, image.write_only),
            type_name(unit, &Glsl, &UnitType::Image(image.image))?,
            count_suffix(image.count)
        ));
    }
    for (&(kind, number), special) in &globals.special {
        let name = naming::global(GlobalRef::Special(kind, number));
        let declared = declarator(unit, &special.ty, &name)?;
        out.push_str(&match kind {
            SpecialKind::AccelerationStructure => format!(
                "layout(binding = {number}) uniform accelerationStructureEXT {name};\n"
            ),
            SpecialKind::RayPayload => {
                format!("layout(location = {number}) rayPayloadEXT {declared};\n")
            }
            SpecialKind::RayPayloadIn => {
                format!("layout(location = {number}) rayPayloadInEXT {declared};\n")
            }
            SpecialKind::HitAttribute => format!("hitAttributeEXT {declared};\n"),
            SpecialKind::TaskPayload => format!("taskPayloadSharedEXT {declared};\n"),
        });
    }
    Ok(())
}

fn count_suffix(count: Option<i32>) -> String {
    match count {
        Some(n) if n < 0 => "[]".into(),
        Some(n) => format!("[{n}]"),
        None => String::new(),
    }
}
