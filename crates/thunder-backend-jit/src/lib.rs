//! Native backend for Thunder.
//!
//! Translates every function of a unit to Cranelift IR and compiles it in
//! process. Each function is exported as
//! `extern "C" fn(args: *const u8, ret: *mut u8)`; [`Layout`] describes how
//! arguments and results are packed. The supported subset is plain values
//! (scalars, vectors, matrices and aggregates of them), operators,
//! structured control flow, calls between unit functions and a short list
//! of math intrinsics bound to host functions. Anything else, including
//! every shader resource, is [`BackendError::Unsupported`].

mod host;
mod layout;
mod translate;

pub use layout::{Layout, field_range, scalars};

use std::collections::BTreeMap;
use std::fmt;

use cranelift::prelude::*;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module, ModuleError, default_libcall_names};
use thunder_backend_core::{
    Backend, BackendError, BackendOptions, BackendOutput, Diagnostic, DiagnosticLevel,
    NativeCode, OutputContent, OutputFile,
};
use thunder_link::{LinkError, LinkageUnit};

use translate::Translator;

/// Signature every exported function has.
pub type EntryPoint = unsafe extern "C" fn(args: *const u8, ret: *mut u8);

/// Cranelift JIT backend.
#[derive(Debug, Default)]
pub struct JitBackend;

impl Backend for JitBackend {
    fn name(&self) -> &str {
        "JIT"
    }

    fn targets(&self) -> &[&str] {
        &["jit"]
    }

    fn compile(
        &self,
        unit: &LinkageUnit<'_>,
        opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        let code = compile_unit(unit, opts.opt_level)?;
        let symbols = code.symbols();
        log::debug!("compiled {} native function(s)", symbols.len());
        Ok(BackendOutput {
            files: vec![OutputFile {
                name: "unit.jit".into(),
                content: OutputContent::Native(Box::new(code)),
            }],
            diagnostics: vec![Diagnostic {
                level: DiagnosticLevel::Info,
                message: format!("native entry points: {}", symbols.join(", ")),
            }],
        })
    }
}

/// Compiled native code of a unit. The code is released when this is
/// dropped; entry points obtained from it must not outlive it.
pub struct NativeModule {
    module: Option<JITModule>,
    functions: BTreeMap<String, *const u8>,
}

impl NativeModule {
    fn new(module: JITModule) -> Self {
        Self {
            module: Some(module),
            functions: BTreeMap::new(),
        }
    }

    /// Typed entry point of the function exported as `name`, the unit's
    /// symbol for it.
    pub fn entry(&self, name: &str) -> Option<EntryPoint> {
        let address = *self.functions.get(name)?;
        // SAFETY: every address recorded in `functions` is a finalized
        // function compiled with the `EntryPoint` signature.
        Some(unsafe { std::mem::transmute::<*const u8, EntryPoint>(address) })
    }

    fn define(&mut self, unit: &LinkageUnit<'_>) -> Result<(), BackendError> {
        let Some(module) = self.module.as_mut() else {
            return Err(BackendError::Other("native module already released".into()));
        };
        let pointer = module.target_config().pointer_type();
        let mut signature = module.make_signature();
        signature.params.push(AbiParam::new(pointer));
        signature.params.push(AbiParam::new(pointer));

        let mut ids = BTreeMap::new();
        let mut exports = Vec::with_capacity(unit.functions().len());
        for function in unit.functions() {
            let symbol = unit
                .symbol(function.id)
                .ok_or(LinkError::UnknownCallable(function.id))?;
            let id = module
                .declare_function(&symbol, Linkage::Export, &signature)
                .map_err(module_error)?;
            ids.insert(function.id, id);
            exports.push((symbol, id));
        }

        let mut ctx = module.make_context();
        let mut builder_context = FunctionBuilderContext::new();
        for function in unit.functions() {
            let id = *ids
                .get(&function.id)
                .ok_or(LinkError::UnknownCallable(function.id))?;
            ctx.func.signature = signature.clone();
            Translator::new(unit, function, module, &ids, &mut ctx.func, &mut builder_context)
                .translate()?;
            if let Err(err) = module.define_function(id, &mut ctx) {
                return Err(BackendError::Compiler {
                    log: format!("{err:?}"),
                    generated: ctx.func.display().to_string(),
                });
            }
            log::debug!("translated `{}` to native code", function.name);
            module.clear_context(&mut ctx);
        }
        module.finalize_definitions().map_err(module_error)?;

        for (symbol, id) in exports {
            self.functions.insert(symbol, module.get_finalized_function(id));
        }
        Ok(())
    }
}

impl NativeCode for NativeModule {
    fn function(&self, name: &str) -> Option<*const u8> {
        self.functions.get(name).copied()
    }

    fn symbols(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }
}

impl fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModule")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("live", &self.module.is_some())
            .finish()
    }
}

impl Drop for NativeModule {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            // SAFETY: entry points are only reachable through `self`, which
            // is going away.
            unsafe { module.free_memory() };
        }
    }
}

/// Compiles every function of `unit` to native code. Partially built
/// modules are released on failure.
pub fn compile_unit(unit: &LinkageUnit<'_>, opt_level: u8) -> Result<NativeModule, BackendError> {
    let mut builder = JITBuilder::with_isa(host_isa(opt_level)?, default_libcall_names());
    host::register(&mut builder);
    let mut code = NativeModule::new(JITModule::new(builder));
    code.define(unit)?;
    Ok(code)
}

fn host_isa(opt_level: u8) -> Result<isa::OwnedTargetIsa, BackendError> {
    let setting = |err: settings::SetError| BackendError::Other(format!("cranelift setting: {err}"));
    let mut flags = settings::builder();
    flags.set("use_colocated_libcalls", "false").map_err(setting)?;
    flags.set("is_pic", "false").map_err(setting)?;
    flags
        .set("opt_level", if opt_level == 0 { "none" } else { "speed" })
        .map_err(setting)?;
    cranelift_native::builder()
        .map_err(|err| BackendError::Unsupported(format!("host machine: {err}")))?
        .finish(settings::Flags::new(flags))
        .map_err(|err| BackendError::Other(format!("host machine: {err}")))
}

pub(crate) fn module_error(err: ModuleError) -> BackendError {
    BackendError::Other(format!("native module: {err}"))
}
