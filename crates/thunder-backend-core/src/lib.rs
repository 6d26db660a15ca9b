#![warn(missing_docs)]
//! Backend trait and plugin architecture for Thunder.
//!
//! Defines the [`Backend`] trait that every code generator implements,
//! along with supporting types ([`BackendOptions`], [`BackendOutput`],
//! [`BackendError`]), a [`BackendRegistry`] for dispatch by target name,
//! the capability traits external toolchains are bound through, and the
//! [`StatementGenerator`] shared by the text backends.

mod generator;
pub mod naming;

pub use generator::{Dialect, Direction, StatementGenerator, data_name, type_name};

use std::fmt::{self, Debug};
use std::str::FromStr;

use thunder_link::{LinkError, LinkageUnit};

/// Output language of a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    /// GLSL 4.60 text.
    Glsl,
    /// Self-contained C++ text.
    Cpp,
    /// SPIR-V binary words.
    Spirv,
    /// Native code compiled in-process.
    Jit,
    /// Assembly listing of the unit.
    Asm,
}

impl Target {
    /// Every target, in registry order.
    pub const ALL: [Target; 5] = [
        Target::Glsl,
        Target::Cpp,
        Target::Spirv,
        Target::Jit,
        Target::Asm,
    ];

    /// Identifier used for `--target` dispatch.
    pub fn name(self) -> &'static str {
        match self {
            Self::Glsl => "glsl",
            Self::Cpp => "cpp",
            Self::Spirv => "spirv",
            Self::Jit => "jit",
            Self::Asm => "asm",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Target {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| BackendError::Unsupported(format!("unknown target '{s}'")))
    }
}

/// Pipeline stage a unit is generated for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Vertex shader.
    #[default]
    Vertex,
    /// Fragment shader.
    Fragment,
    /// Compute kernel.
    Compute,
    /// Mesh task shader.
    Task,
    /// Mesh shader.
    Mesh,
    /// Ray generation shader.
    RayGeneration,
    /// Closest-hit shader.
    ClosestHit,
    /// Any-hit shader.
    AnyHit,
    /// Miss shader.
    Miss,
    /// Intersection shader.
    Intersection,
}

impl Stage {
    /// Every stage.
    pub const ALL: [Stage; 10] = [
        Stage::Vertex,
        Stage::Fragment,
        Stage::Compute,
        Stage::Task,
        Stage::Mesh,
        Stage::RayGeneration,
        Stage::ClosestHit,
        Stage::AnyHit,
        Stage::Miss,
        Stage::Intersection,
    ];

    /// Conventional file extension of the stage's GLSL source.
    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
            Self::Compute => "comp",
            Self::Task => "task",
            Self::Mesh => "mesh",
            Self::RayGeneration => "rgen",
            Self::ClosestHit => "rchit",
            Self::AnyHit => "rahit",
            Self::Miss => "rmiss",
            Self::Intersection => "rint",
        }
    }

    /// Whether the stage belongs to the ray tracing pipeline.
    pub fn is_ray_tracing(self) -> bool {
        matches!(
            self,
            Self::RayGeneration | Self::ClosestHit | Self::AnyHit | Self::Miss | Self::Intersection
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vertex" => Ok(Self::Vertex),
            "fragment" => Ok(Self::Fragment),
            "compute" => Ok(Self::Compute),
            _ => Self::ALL
                .into_iter()
                .find(|stage| stage.name() == s)
                .ok_or_else(|| BackendError::Unsupported(format!("unknown stage '{s}'"))),
        }
    }
}

/// A backend that generates target-specific output for a linkage unit.
pub trait Backend: Debug + Send + Sync {
    /// Human-readable name (e.g. "GLSL").
    fn name(&self) -> &str;

    /// Target identifiers this backend handles (for `--target` dispatch).
    fn targets(&self) -> &[&str];

    /// Generate output for every function of a linked unit.
    fn compile(
        &self,
        unit: &LinkageUnit<'_>,
        opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError>;
}

/// Options passed to a backend during generation.
#[derive(Clone, Debug)]
pub struct BackendOptions {
    /// Pipeline stage of the unit.
    pub stage: Stage,
    /// `#version` of generated GLSL.
    pub glsl_version: u32,
    /// SPIR-V version as (major, minor).
    pub spirv_version: (u8, u8),
    /// Optimization level the unit was optimized at (0, 1 or 2).
    pub opt_level: u8,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            stage: Stage::default(),
            glsl_version: 460,
            spirv_version: (1, 0),
            opt_level: 1,
        }
    }
}

impl fmt::Display for BackendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BackendOptions {{ stage: {}, glsl: {}, spirv: {}.{}, opt_level: {} }}",
            self.stage,
            self.glsl_version,
            self.spirv_version.0,
            self.spirv_version.1,
            self.opt_level
        )
    }
}

/// Artifacts of one generation request.
#[derive(Debug)]
pub struct BackendOutput {
    /// One or more output files.
    pub files: Vec<OutputFile>,
    /// Non-fatal diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for BackendOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file(s), {} diagnostic(s)",
            self.files.len(),
            self.diagnostics.len()
        )
    }
}

/// A single output artifact.
#[derive(Debug)]
pub struct OutputFile {
    /// Suggested filename (e.g. "unit.glsl", "unit.vert.spv").
    pub name: String,
    /// The artifact.
    pub content: OutputContent,
}

impl fmt::Display for OutputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Content of an output artifact.
#[derive(Debug)]
pub enum OutputContent {
    /// UTF-8 text.
    Text(String),
    /// Raw binary data.
    Binary(Vec<u8>),
    /// SPIR-V words for one pipeline stage.
    Spirv {
        /// Stage the module was compiled for.
        stage: Stage,
        /// The module.
        words: Vec<u32>,
    },
    /// In-process native code.
    Native(Box<dyn NativeCode>),
}

impl OutputContent {
    /// Bytes to write to disk, if the artifact can be persisted.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Text(text) => Some(text.clone().into_bytes()),
            Self::Binary(data) => Some(data.clone()),
            Self::Spirv { words, .. } => {
                Some(words.iter().flat_map(|w| w.to_le_bytes()).collect())
            }
            Self::Native(_) => None,
        }
    }
}

impl fmt::Display for OutputContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "Text({} chars)", s.len()),
            Self::Binary(b) => write!(f, "Binary({} bytes)", b.len()),
            Self::Spirv { stage, words } => write!(f, "Spirv({stage}, {} words)", words.len()),
            Self::Native(code) => write!(f, "Native({} functions)", code.symbols().len()),
        }
    }
}

/// Non-fatal note attached to an output.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Severity level.
    pub level: DiagnosticLevel,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Severity level for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticLevel {
    /// A warning that does not prevent generation.
    Warning,
    /// An informational note.
    Info,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "Warning",
            Self::Info => "Info",
        })
    }
}

/// Errors that can occur during generation.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The request or an IR feature is not supported by this backend.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// An external compiler rejected the generated source.
    #[error("external compiler failed:\n{log}\n--- generated source ---\n{generated}")]
    Compiler {
        /// Diagnostics reported by the compiler.
        log: String,
        /// The source handed to it.
        generated: String,
    },
    /// Linkage information needed for generation is missing.
    #[error(transparent)]
    Link(#[from] LinkError),
    /// A general backend error.
    #[error("{0}")]
    Other(String),
}

impl From<thunder_ir::IrError> for BackendError {
    fn from(err: thunder_ir::IrError) -> Self {
        Self::Link(LinkError::Ir(err))
    }
}

/// Compiles shader source to SPIR-V.
pub trait ShaderCompiler {
    /// Compile `source` for `stage`. On failure, returns the compiler log.
    fn compile(&self, source: &str, stage: Stage, version: (u8, u8)) -> Result<Vec<u32>, String>;
}

/// Native code produced by a JIT. Memory is released when dropped.
pub trait NativeCode: Debug {
    /// Entry address of the exported function `name`.
    fn function(&self, name: &str) -> Option<*const u8>;

    /// Names of every exported function.
    fn symbols(&self) -> Vec<String>;
}

/// Registry of available backends, used for `--target` dispatch.
pub struct BackendRegistry {
    backends: Vec<Box<dyn Backend>>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Registry holding only the assembly listing backend.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(Box::new(AssemblyBackend));
        reg
    }

    /// Registers a backend.
    pub fn register(&mut self, backend: Box<dyn Backend>) {
        self.backends.push(backend);
    }

    /// Backend serving `target`, matched against every alias it lists.
    pub fn find(&self, target: &str) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.targets().contains(&target))
            .map(|b| &**b)
    }

    /// Every target alias, in registration order.
    pub fn list_targets(&self) -> Vec<&str> {
        self.backends
            .iter()
            .flat_map(|b| b.targets().iter().copied())
            .collect()
    }
}

/// Built-in backend that lists the unit with
/// [`LinkageUnit::write_assembly`].
#[derive(Debug)]
pub struct AssemblyBackend;

impl Backend for AssemblyBackend {
    fn name(&self) -> &str {
        "Assembly"
    }

    fn targets(&self) -> &[&str] {
        &["asm"]
    }

    fn compile(
        &self,
        unit: &LinkageUnit<'_>,
        _opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        Ok(BackendOutput {
            files: vec![OutputFile {
                name: "unit.asm".into(),
                content: OutputContent::Text(unit.write_assembly()),
            }],
            diagnostics: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunder_ir::{Buffer, Context, Return};

    fn unit_context() -> (Context, thunder_ir::CallableId) {
        let mut ctx = Context::new();
        let mut b = Buffer::new();
        b.emit(Return {
            value: thunder_ir::Index::NULL,
        });
        let id = ctx.register("main", b).unwrap();
        (ctx, id)
    }

    #[test]
    fn assembly_backend_targets() {
        let backend = AssemblyBackend;
        assert_eq!(backend.name(), "Assembly");
        assert!(backend.targets().contains(&"asm"));
    }

    #[test]
    fn assembly_backend_compile() {
        let (ctx, id) = unit_context();
        let mut unit = LinkageUnit::new(&ctx);
        unit.add_callable(id).unwrap();
        let output = AssemblyBackend
            .compile(&unit, &BackendOptions::default())
            .unwrap();
        assert_eq!(output.files.len(), 1);
        assert_eq!(output.files[0].name, "unit.asm");
        match &output.files[0].content {
            OutputContent::Text(text) => assert!(text.starts_with("main.0:")),
            _ => panic!("expected text output"),
        }
    }

    #[test]
    fn registry_find_builtin() {
        let reg = BackendRegistry::with_builtins();
        assert!(reg.find("asm").is_some());
        assert!(reg.find("nonexistent").is_none());
        assert_eq!(reg.list_targets(), vec!["asm"]);
    }

    #[test]
    fn registry_custom_backend() {
        #[derive(Debug)]
        struct TestBackend;
        impl Backend for TestBackend {
            fn name(&self) -> &str {
                "test"
            }
            fn targets(&self) -> &[&str] {
                &["test-target"]
            }
            fn compile(
                &self,
                _unit: &LinkageUnit<'_>,
                _opts: &BackendOptions,
            ) -> Result<BackendOutput, BackendError> {
                Ok(BackendOutput {
                    files: vec![],
                    diagnostics: vec![],
                })
            }
        }

        let mut reg = BackendRegistry::new();
        reg.register(Box::new(TestBackend));
        assert!(reg.find("test-target").is_some());
    }

    #[test]
    fn targets_and_stages_parse() {
        assert_eq!("spirv".parse::<Target>().unwrap(), Target::Spirv);
        assert!("hlsl".parse::<Target>().is_err());
        assert_eq!("frag".parse::<Stage>().unwrap(), Stage::Fragment);
        assert_eq!("compute".parse::<Stage>().unwrap(), Stage::Compute);
        assert!(Stage::Miss.is_ray_tracing());
        assert!(!Stage::Mesh.is_ray_tracing());
    }

    #[test]
    fn display_backend_options() {
        let s = BackendOptions::default().to_string();
        assert!(s.contains("glsl: 460"));
        assert!(s.contains("spirv: 1.0"));
        assert!(s.contains("stage: vert"));
    }

    #[test]
    fn display_backend_output() {
        let output = BackendOutput {
            files: vec![
                OutputFile {
                    name: "a.spv".into(),
                    content: OutputContent::Spirv {
                        stage: Stage::Vertex,
                        words: vec![0x0723_0203],
                    },
                },
                OutputFile {
                    name: "b.txt".into(),
                    content: OutputContent::Text("hello".into()),
                },
            ],
            diagnostics: vec![Diagnostic {
                level: DiagnosticLevel::Info,
                message: "done".into(),
            }],
        };
        assert_eq!(format!("{output}"), "2 file(s), 1 diagnostic(s)");
        assert_eq!(format!("{}", output.files[0]), "a.spv");
        assert_eq!(format!("{}", output.files[0].content), "Spirv(vert, 1 words)");
        assert_eq!(
            output.files[0].content.to_bytes().unwrap(),
            vec![0x03, 0x02, 0x23, 0x07]
        );
    }

    #[test]
    fn compiler_errors_carry_source() {
        let err = BackendError::Compiler {
            log: "0:1: syntax error".into(),
            generated: "void main() {".into(),
        };
        let text = err.to_string();
        assert!(text.contains("syntax error"));
        assert!(text.contains("void main() {"));
    }
}
