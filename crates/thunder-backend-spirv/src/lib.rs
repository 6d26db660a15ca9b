//! SPIR-V backend for Thunder.
//!
//! Generates GLSL with the GLSL backend and hands it to a
//! [`ShaderCompiler`]; by default naga. A failed compile is fatal and the
//! error carries both the compiler log and the GLSL it was given.

mod compiler;

pub use compiler::{ENTRY_POINT, NagaCompiler, naga_stage};

use std::fmt::Debug;

use thunder_backend_core::{
    Backend, BackendError, BackendOptions, BackendOutput, OutputContent, OutputFile,
    ShaderCompiler, Stage,
};
use thunder_link::LinkageUnit;

/// SPIR-V backend over a shader compiler.
#[derive(Debug, Default)]
pub struct SpirvBackend<C = NagaCompiler> {
    compiler: C,
}

impl SpirvBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: ShaderCompiler> SpirvBackend<C> {
    pub fn with_compiler(compiler: C) -> Self {
        Self { compiler }
    }
}

/// The unit's GLSL with a placeholder `main` appended when the unit has
/// none.
pub fn entry_source(unit: &LinkageUnit<'_>, opts: &BackendOptions) -> Result<String, BackendError> {
    let mut source = thunder_backend_glsl::generate(unit, opts)?;
    if !unit.functions().iter().any(|f| f.name == ENTRY_POINT) {
        source.push('\n');
        source.push_str(&placeholder_main(opts.stage));
    }
    Ok(source)
}

/// A `main` that does nothing observable. Vertex shaders must still
/// write a position.
fn placeholder_main(stage: Stage) -> String {
    match stage {
        Stage::Vertex => format!("void {ENTRY_POINT}() {{\n    gl_Position = vec4(0.0);\n}}\n"),
        _ => format!("void {ENTRY_POINT}() {{}}\n"),
    }
}

impl<C: ShaderCompiler + Debug + Send + Sync> Backend for SpirvBackend<C> {
    fn name(&self) -> &str {
        "SPIR-V"
    }

    fn targets(&self) -> &[&str] {
        &["spirv", "spv"]
    }

    fn compile(
        &self,
        unit: &LinkageUnit<'_>,
        opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        if naga_stage(opts.stage).is_none() {
            return Err(BackendError::Unsupported(format!(
                "SPIR-V for {} shaders",
                opts.stage
            )));
        }
        let generated = entry_source(unit, opts)?;
        let words = self
            .compiler
            .compile(&generated, opts.stage, opts.spirv_version)
            .map_err(|log| BackendError::Compiler { log, generated })?;
        log::debug!("compiled {} SPIR-V word(s) for {}", words.len(), opts.stage);
        Ok(BackendOutput {
            files: vec![OutputFile {
                name: format!("unit.{}.spv", opts.stage),
                content: OutputContent::Spirv {
                    stage: opts.stage,
                    words,
                },
            }],
            diagnostics: vec![],
        })
    }
}
