//! GLSL to SPIR-V through naga.

use naga::back::spv;
use naga::front::glsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use thunder_backend_core::{ShaderCompiler, Stage};

/// Name of the entry point every compiled module exports.
pub const ENTRY_POINT: &str = "main";

/// [`ShaderCompiler`] backed by naga's GLSL front end, validator and
/// SPIR-V writer.
#[derive(Clone, Copy, Debug, Default)]
pub struct NagaCompiler;

/// The naga stage for a pipeline stage naga can compile.
pub fn naga_stage(stage: Stage) -> Option<naga::ShaderStage> {
    match stage {
        Stage::Vertex => Some(naga::ShaderStage::Vertex),
        Stage::Fragment => Some(naga::ShaderStage::Fragment),
        Stage::Compute => Some(naga::ShaderStage::Compute),
        _ => None,
    }
}

impl ShaderCompiler for NagaCompiler {
    fn compile(&self, source: &str, stage: Stage, version: (u8, u8)) -> Result<Vec<u32>, String> {
        let shader_stage =
            naga_stage(stage).ok_or_else(|| format!("naga cannot compile {stage} shaders"))?;

        let mut frontend = glsl::Frontend::default();
        let module = frontend
            .parse(&glsl::Options::from(shader_stage), source)
            .map_err(|errors| errors.emit_to_string(source))?;

        let info = Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|error| error.emit_to_string(source))?;

        let options = spv::Options {
            lang_version: version,
            ..spv::Options::default()
        };
        let pipeline = spv::PipelineOptions {
            shader_stage,
            entry_point: ENTRY_POINT.into(),
        };
        spv::write_vec(&module, &info, &options, Some(&pipeline)).map_err(|error| error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_minimal_vertex_shader() {
        let source = "#version 460\n\nvoid main() {\n    gl_Position = vec4(0.0);\n}\n";
        let words = NagaCompiler
            .compile(source, Stage::Vertex, (1, 0))
            .unwrap();
        assert_eq!(words[0], 0x0723_0203);
        assert_eq!(words[1], 0x0001_0000);
    }

    #[test]
    fn reports_parse_errors() {
        let log = NagaCompiler
            .compile("#version 460\nvoid main( {\n", Stage::Fragment, (1, 0))
            .unwrap_err();
        assert!(!log.is_empty());
    }

    #[test]
    fn rejects_stages_naga_lacks() {
        let log = NagaCompiler
            .compile("#version 460\nvoid main() {}\n", Stage::Mesh, (1, 0))
            .unwrap_err();
        assert!(log.contains("mesh"));
    }
}
