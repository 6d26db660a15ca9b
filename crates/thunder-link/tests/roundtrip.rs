use thunder_ir::{
    Buffer, Context, Decoration, Index, Operation, OperationCode, PrimitiveType, Qualifier,
    QualifierKind, Return, TypeInformation,
};
use thunder_link::LinkageUnit;

fn ty(b: &mut Buffer, p: PrimitiveType) -> Index {
    b.emit(TypeInformation {
        item: p,
        down: Index::NULL,
        next: Index::NULL,
    })
}

fn scale() -> Buffer {
    let mut b = Buffer::new();
    let vec3 = ty(&mut b, PrimitiveType::Vec3);
    let f32 = ty(&mut b, PrimitiveType::F32);
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
    let product = b.emit(Operation {
        a,
        b: s,
        code: OperationCode::Multiplication,
    });
    b.synthesize(product);
    b.decorate(a, Decoration::new("direction"));
    b.emit(Return { value: product });
    b
}

#[test]
fn write_then_read_reproduces_atoms() {
    let mut ctx = Context::new();
    let id = ctx.register("scale", scale()).unwrap();
    let mut unit = LinkageUnit::new(&ctx);
    unit.add_callable(id).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unit.thunder");
    unit.write(&path).unwrap();

    let loaded = LinkageUnit::read(&path).unwrap();
    let original = ctx.function(id).unwrap();
    let back = loaded.function(id).unwrap();
    assert_eq!(back.name, "scale");
    assert_eq!(back.buffer, original.buffer);
    assert_eq!(back.args, original.args);
    assert_eq!(back.returns, original.returns);

    // The loaded context links the same way.
    let mut relinked = LinkageUnit::new(&loaded);
    relinked.add_callable(id).unwrap();
    assert_eq!(relinked.write_stream(), unit.write_stream());
}

#[test]
fn reading_a_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        LinkageUnit::read(dir.path().join("absent.thunder")),
        Err(thunder_link::LinkError::Io(_))
    ));
}

#[test]
fn truncated_stream_is_rejected() {
    let mut ctx = Context::new();
    let id = ctx.register("scale", scale()).unwrap();
    let mut unit = LinkageUnit::new(&ctx);
    unit.add_callable(id).unwrap();

    let bytes = unit.write_stream();
    assert!(LinkageUnit::read_stream(&bytes[..bytes.len() - 3]).is_err());
}

#[test]
fn assembly_listing_names_each_function() {
    let mut ctx = Context::new();
    let id = ctx.register("scale", scale()).unwrap();
    let mut unit = LinkageUnit::new(&ctx);
    unit.add_callable(id).unwrap();

    let listing = unit.write_assembly();
    assert!(listing.starts_with("scale.0:"));
    assert!(listing.contains("operation multiplication"));
}
