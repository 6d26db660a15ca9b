//! Thunder shader IR cross-compiler.
//!
//! Functions traced into a [`Context`] are optimized, closed into a
//! [`LinkageUnit`] and generated for one of the [`Target`]s:
//!
//! ```no_run
//! use thunder::{Generate, Stage, Target};
//! # fn run(ctx: &mut thunder::ir::Context, entry: thunder::ir::CallableId) -> Result<(), Box<dyn std::error::Error>> {
//! thunder::optimize(ctx, thunder::OptLevel::O1)?;
//! let unit = thunder::link(ctx, [entry])?;
//! let output = unit.generate(Target::Glsl, Stage::Vertex)?;
//! if let thunder::OutputContent::Text(glsl) = &output.files[0].content {
//!     println!("{glsl}");
//! }
//! # Ok(())
//! # }
//! ```

pub use thunder_ir as ir;

pub use thunder_backend_core::{
    Backend, BackendError, BackendOptions, BackendOutput, BackendRegistry, Diagnostic,
    DiagnosticLevel, NativeCode, OutputContent, OutputFile, Stage, Target,
};
pub use thunder_backend_cpp::CppBackend;
pub use thunder_backend_glsl::GlslBackend;
pub use thunder_backend_jit::{EntryPoint, JitBackend, NativeModule, compile_unit};
pub use thunder_backend_spirv::SpirvBackend;
pub use thunder_link::{LinkError, LinkageUnit};
pub use thunder_opt::{OptLevel, PassManager};

use thunder_ir::{CallableId, Context, IrError};

/// Registry holding every backend: GLSL, C++, SPIR-V, JIT and the
/// assembly listing.
pub fn registry() -> BackendRegistry {
    let mut registry = BackendRegistry::with_builtins();
    registry.register(Box::new(GlslBackend));
    registry.register(Box::new(CppBackend));
    registry.register(Box::new(SpirvBackend::new()));
    registry.register(Box::new(JitBackend));
    registry
}

/// Optimizes every function of `ctx` at `level`.
pub fn optimize(ctx: &mut Context, level: OptLevel) -> Result<(), IrError> {
    let passes = PassManager::for_level(level);
    for function in ctx.functions_mut() {
        let before = function.buffer.len();
        passes.run_on_function(function)?;
        log::debug!(
            "optimized `{}`: {before} -> {} atoms",
            function.name,
            function.buffer.len()
        );
    }
    Ok(())
}

/// Links the call closure of `entries`.
pub fn link(
    ctx: &Context,
    entries: impl IntoIterator<Item = CallableId>,
) -> Result<LinkageUnit<'_>, LinkError> {
    let mut unit = LinkageUnit::new(ctx);
    for id in entries {
        unit.add_callable(id)?;
    }
    Ok(unit)
}

/// Generation entry point on a linked unit.
pub trait Generate {
    /// Generates the unit for `target` at `stage` with default options.
    fn generate(&self, target: Target, stage: Stage) -> Result<BackendOutput, BackendError> {
        let opts = BackendOptions {
            stage,
            ..BackendOptions::default()
        };
        self.generate_with(target, &opts)
    }

    /// Generates the unit for `target` with explicit options.
    fn generate_with(
        &self,
        target: Target,
        opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError>;
}

impl Generate for LinkageUnit<'_> {
    fn generate_with(
        &self,
        target: Target,
        opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        let registry = registry();
        let backend = registry.find(target.name()).ok_or_else(|| {
            BackendError::Unsupported(format!("no backend for target '{target}'"))
        })?;
        log::debug!("generating {target} with the {} backend ({opts})", backend.name());
        backend.compile(self, opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunder_ir::{
        Buffer, Index, Operation, OperationCode, PrimitiveType, Qualifier, QualifierKind, Return,
        TypeInformation,
    };

    fn vector_plus_scalar(ctx: &mut Context) -> CallableId {
        let mut b = Buffer::new();
        let vec3 = b.emit(TypeInformation {
            item: PrimitiveType::Vec3,
            down: Index::NULL,
            next: Index::NULL,
        });
        let f32 = b.emit(TypeInformation {
            item: PrimitiveType::F32,
            down: Index::NULL,
            next: Index::NULL,
        });
        let a = b.emit(Qualifier {
            underlying: vec3,
            numerical: 0,
            kind: QualifierKind::Parameter,
        });
        let s = b.emit(Qualifier {
            underlying: f32,
            numerical: 1,
            kind: QualifierKind::Parameter,
        });
        let sum = b.emit(Operation {
            a,
            b: s,
            code: OperationCode::Addition,
        });
        b.synthesize(sum);
        b.emit(Return { value: sum });
        ctx.register("f", b).unwrap()
    }

    #[test]
    fn registry_covers_every_target() {
        let registry = registry();
        for target in Target::ALL {
            assert!(registry.find(target.name()).is_some(), "{target}");
        }
    }

    #[test]
    fn generates_glsl_after_optimizing() {
        let mut ctx = Context::new();
        let id = vector_plus_scalar(&mut ctx);
        optimize(&mut ctx, OptLevel::O1).unwrap();
        let unit = link(&ctx, [id]).unwrap();
        let output = unit.generate(Target::Glsl, Stage::Vertex).unwrap();
        let OutputContent::Text(text) = &output.files[0].content else {
            panic!("expected GLSL text");
        };
        assert!(text.contains("vec3 f(vec3 _arg0, float _arg1) {"));
    }

    #[test]
    fn unknown_callable_fails_to_link() {
        let mut ctx = Context::new();
        let id = ctx.next_callable_id();
        assert!(matches!(
            link(&ctx, [id]),
            Err(LinkError::UnknownCallable(missing)) if missing == id
        ));
    }
}
