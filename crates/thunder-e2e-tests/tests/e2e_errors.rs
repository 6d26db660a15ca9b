mod common;

use common::{Builder, try_generate, vector_plus_scalar};
use thunder::{BackendError, LinkError, Stage, Target};
use thunder_ir::{
    BranchKind, Call, Context, Function, Index, IrError, OperationCode, PrimitiveType, Return,
};

#[test]
fn overload_failure_reports_types_and_candidates() {
    let mut ctx = Context::new();
    let mut b = Builder::new();
    let x = b.param(PrimitiveType::Boolean, 0);
    let y = b.param(PrimitiveType::Boolean, 1);
    let sum = b.op(OperationCode::Addition, x, y);
    b.ret(sum);

    match ctx.register("bad", b.buffer) {
        Err(IrError::OverloadResolution {
            target,
            attempted,
            candidates,
        }) => {
            assert_eq!(target, "addition");
            assert_eq!(attempted, "boolean, boolean");
            assert!(!candidates.is_empty());
        }
        other => panic!("expected an overload error, got {other:?}"),
    }
}

#[test]
fn dangling_index_is_structural() {
    let mut ctx = Context::new();
    let mut b = Builder::new();
    let x = b.param(PrimitiveType::F32, 0);
    let sum = b.op(OperationCode::Addition, x, Index::new(40));
    b.ret(sum);

    match ctx.register("dangling", b.buffer) {
        Err(IrError::Structural { message, dump }) => {
            assert!(!message.is_empty());
            assert!(!dump.is_empty());
        }
        other => panic!("expected a structural error, got {other:?}"),
    }
}

#[test]
fn recursion_is_a_link_error() {
    let mut ctx = Context::new();
    let ping = ctx.next_callable_id();
    let pong = ctx.next_callable_id();
    for (name, id, callee) in [("ping", ping, pong), ("pong", pong, ping)] {
        let mut b = thunder_ir::Buffer::new();
        b.emit(Call {
            callee,
            ty: Index::NULL,
            args: Index::NULL,
        });
        b.emit(Return { value: Index::NULL });
        ctx.insert(Function::new(name, id, b).unwrap());
    }

    match thunder::link(&ctx, [ping]) {
        Err(LinkError::Cycle { functions }) => {
            assert!(functions.contains(&"ping".to_string()));
            assert!(functions.contains(&"pong".to_string()));
        }
        Err(other) => panic!("expected a cycle, got {other}"),
        Ok(_) => panic!("expected a cycle"),
    }
}

#[test]
fn unclosed_block_fails_generation() {
    let mut ctx = Context::new();
    let mut b = thunder_ir::Buffer::new();
    let t = b.emit(thunder_ir::Primitive {
        value: thunder_ir::PrimitiveValue::Bool(true),
    });
    b.emit(thunder_ir::Branch {
        cond: t,
        failto: Index::NULL,
        kind: BranchKind::If,
    });
    b.emit(Return { value: Index::NULL });
    let main = ctx.register("main", b).unwrap();

    let err = try_generate(&mut ctx, &[main], Target::Glsl, Stage::Vertex).unwrap_err();
    assert!(err.to_string().contains("leaves a block open"), "{err}");
}

#[test]
fn unknown_names_are_rejected() {
    assert!("geometry".parse::<Stage>().is_err());
    assert!("hlsl".parse::<Target>().is_err());
    assert!(thunder::registry().find("hlsl").is_none());
}

#[test]
fn native_code_needs_plain_parameters() {
    let mut ctx = Context::new();
    let mut b = Builder::new();
    let f32 = b.ty(PrimitiveType::F32);
    let out = b.qualifier(thunder_ir::QualifierKind::OutArg, f32, 0);
    let param = b.typed_param(out, 0);
    let one = b.float(1.0);
    b.store(param, one);
    b.ret(Index::NULL);
    let set = b.register(&mut ctx, "set_one");

    let err = try_generate(&mut ctx, &[set], Target::Jit, Stage::Compute).unwrap_err();
    assert!(matches!(err, BackendError::Unsupported(_)), "{err}");

    // The same unit is fine as text.
    let f = vector_plus_scalar(&mut ctx);
    assert!(try_generate(&mut ctx, &[set, f], Target::Glsl, Stage::Vertex).is_ok());
}
