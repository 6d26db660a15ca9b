//! C++ backend for Thunder.
//!
//! Generates a self-contained translation unit: the `tsl` vector and
//! matrix preamble, one struct per unit aggregate, then every function in
//! callee-first order inside `namespace unit`. There are no global
//! resource declarations; each function takes the resources it uses
//! (directly or through its callees) as trailing reference parameters.

mod dialect;

pub use dialect::Cpp;

use thunder_backend_core::{
    Backend, BackendError, BackendOptions, BackendOutput, OutputContent, OutputFile,
    StatementGenerator, data_name,
};
use thunder_link::LinkageUnit;

/// Vector, matrix and math helpers every generated unit includes.
pub const PREAMBLE: &str = include_str!("preamble.hpp");

/// C++ text backend.
#[derive(Debug)]
pub struct CppBackend;

impl Backend for CppBackend {
    fn name(&self) -> &str {
        "C++"
    }

    fn targets(&self) -> &[&str] {
        &["cpp", "c++"]
    }

    fn compile(
        &self,
        unit: &LinkageUnit<'_>,
        _opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        let source = generate(unit)?;
        log::debug!(
            "generated {} bytes of C++ for {} function(s)",
            source.len(),
            unit.functions().len()
        );
        Ok(BackendOutput {
            files: vec![OutputFile {
                name: "unit.cpp".into(),
                content: OutputContent::Text(source),
            }],
            diagnostics: vec![],
        })
    }
}

/// C++ source for a whole unit.
pub fn generate(unit: &LinkageUnit<'_>) -> Result<String, BackendError> {
    let mut out = String::from(PREAMBLE);
    out.push('\n');

    for aggregate in unit.aggregates().iter() {
        out.push_str(&format!("struct {} {{\n", aggregate.name));
        for field in &aggregate.fields {
            out.push_str(&format!(
                "    {} {};\n",
                data_name(unit, &Cpp, field.ty)?,
                field.name
            ));
        }
        out.push_str("};\n\n");
    }

    out.push_str("namespace unit {\n");
    for function in unit.functions() {
        out.push('\n');
        out.push_str(&StatementGenerator::new(unit, function, &Cpp).generate()?);
    }
    out.push_str("\n} // namespace unit\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunder_ir::{
        ArrayAccess, Buffer, Call, CallableId, Context, Index, Operation, OperationCode,
        Primitive, PrimitiveType, PrimitiveValue, Qualifier, QualifierKind, Return, Store,
        Swizzle, SwizzleCode, TypeInformation,
    };

    fn ty(b: &mut Buffer, p: PrimitiveType) -> Index {
        b.emit(TypeInformation {
            item: p,
            down: Index::NULL,
            next: Index::NULL,
        })
    }

    fn qualifier(b: &mut Buffer, kind: QualifierKind, underlying: Index, numerical: i32) -> Index {
        b.emit(Qualifier {
            underlying,
            numerical,
            kind,
        })
    }

    fn float(b: &mut Buffer, v: f32) -> Index {
        b.emit(Primitive {
            value: PrimitiveValue::F32(v),
        })
    }

    fn generate_entry(ctx: &Context, entry: CallableId) -> String {
        let mut unit = LinkageUnit::new(ctx);
        unit.add_callable(entry).unwrap();
        generate(&unit).unwrap()
    }

    #[test]
    fn backend_metadata() {
        let backend = CppBackend;
        assert_eq!(backend.name(), "C++");
        assert!(backend.targets().contains(&"cpp"));
    }

    #[test]
    fn vector_plus_scalar() {
        let mut b = Buffer::new();
        let vec3 = ty(&mut b, PrimitiveType::Vec3);
        let f32 = ty(&mut b, PrimitiveType::F32);
        let a = qualifier(&mut b, QualifierKind::Parameter, vec3, 0);
        let s = qualifier(&mut b, QualifierKind::Parameter, f32, 1);
        let sum = b.emit(Operation {
            a,
            b: s,
            code: OperationCode::Addition,
        });
        b.synthesize(sum);
        b.emit(Return { value: sum });
        let mut ctx = Context::new();
        let id = ctx.register("f", b).unwrap();

        let text = generate_entry(&ctx, id);
        assert!(text.starts_with("#include <array>\n"));
        assert!(text.contains("namespace tsl {"));
        assert!(text.contains(
            "tsl::vec3 f(tsl::vec3 _arg0, float _arg1) {\n    tsl::vec3 s0 = (_arg0 + _arg1);\n    return s0;\n}\n"
        ));
        assert!(text.ends_with("} // namespace unit\n"));
    }

    #[test]
    fn resources_become_parameters() {
        let mut b = Buffer::new();
        let gid = qualifier(&mut b, QualifierKind::GlGlobalInvocationId, Index::NULL, 0);
        let f32 = ty(&mut b, PrimitiveType::F32);
        let runtime = qualifier(&mut b, QualifierKind::Arrays, f32, -1);
        let data = qualifier(&mut b, QualifierKind::StorageBuffer, runtime, 0);
        let x = b.emit(Swizzle {
            src: gid,
            code: SwizzleCode::X,
        });
        let element = b.emit(ArrayAccess { src: data, loc: x });
        let two = float(&mut b, 2.0);
        let doubled = b.emit(Operation {
            a: element,
            b: two,
            code: OperationCode::Multiplication,
        });
        b.emit(Store {
            dst: element,
            src: doubled,
        });
        b.emit(Return { value: Index::NULL });
        let mut ctx = Context::new();
        let id = ctx.register("main", b).unwrap();

        let text = generate_entry(&ctx, id);
        assert!(text.contains("void main(float *_buffer0, tsl::uvec3 &gl_GlobalInvocationID) {\n"));
        assert!(text.contains(
            "    _buffer0[gl_GlobalInvocationID[0]] = (_buffer0[gl_GlobalInvocationID[0]] * 2.0f);\n"
        ));
    }

    #[test]
    fn callers_forward_callee_resources() {
        let mut ctx = Context::new();

        let mut helper = Buffer::new();
        let f32 = ty(&mut helper, PrimitiveType::F32);
        let out = qualifier(&mut helper, QualifierKind::LayoutOutSmooth, f32, 0);
        let one = float(&mut helper, 1.0);
        helper.emit(Store { dst: out, src: one });
        helper.emit(Return { value: Index::NULL });
        let helper_id = ctx.register("helper", helper).unwrap();

        let mut main = Buffer::new();
        main.emit(Call {
            callee: helper_id,
            ty: Index::NULL,
            args: Index::NULL,
        });
        main.emit(Return { value: Index::NULL });
        let main_id = ctx.register("main", main).unwrap();

        let text = generate_entry(&ctx, main_id);
        let helper_at = text.find("void helper(float &_lout0) {").unwrap();
        let main_at = text.find("void main(float &_lout0) {\n    helper(_lout0);\n").unwrap();
        assert!(helper_at < main_at);
    }

    #[test]
    fn samplers_are_unsupported() {
        let mut b = Buffer::new();
        let sampler = qualifier(&mut b, QualifierKind::Sampler2D, Index::NULL, 0);
        b.synthesize(sampler);
        b.emit(Return { value: Index::NULL });
        let mut ctx = Context::new();
        let id = ctx.register("main", b).unwrap();
        let mut unit = LinkageUnit::new(&ctx);
        unit.add_callable(id).unwrap();
        let err = CppBackend
            .compile(&unit, &BackendOptions::default())
            .unwrap_err();
        assert!(matches!(err, BackendError::Unsupported(_)));
    }
}
