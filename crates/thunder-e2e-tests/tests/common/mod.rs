use thunder::{BackendOptions, BackendOutput, Generate, OutputContent, Stage, Target};
use thunder_ir::{
    Branch, BranchKind, Buffer, Call, CallableId, Construct, ConstructorMode, Context, Decoration,
    Index, Intrinsic, IntrinsicCode, List, Load, Operation, OperationCode, Primitive,
    PrimitiveType, PrimitiveValue, Qualifier, QualifierKind, Return, Store, Swizzle, SwizzleCode,
    TypeInformation,
};

/// Emits atoms the way a tracing front end would.
pub struct Builder {
    pub buffer: Buffer,
    open: Vec<Index>,
}

#[allow(dead_code)]
impl Builder {
    pub fn new() -> Self {
        Self {
            buffer: Buffer::new(),
            open: Vec::new(),
        }
    }

    pub fn ty(&mut self, item: PrimitiveType) -> Index {
        self.buffer.emit(TypeInformation {
            item,
            down: Index::NULL,
            next: Index::NULL,
        })
    }

    /// A struct type with the given named fields; returns the whole-type node.
    pub fn struct_ty(&mut self, name: &str, fields: &[(&str, PrimitiveType)]) -> Index {
        let mut next = self.ty(PrimitiveType::Nil);
        for &(_, item) in fields.iter().rev() {
            next = self.buffer.emit(TypeInformation {
                item,
                down: Index::NULL,
                next,
            });
        }
        let node = self.buffer.emit(TypeInformation {
            item: PrimitiveType::Nil,
            down: next,
            next: Index::NULL,
        });
        self.buffer.decorate(
            node,
            Decoration::new(name).with_fields(fields.iter().map(|(field, _)| *field)),
        );
        node
    }

    pub fn qualifier(&mut self, kind: QualifierKind, underlying: Index, numerical: i32) -> Index {
        self.buffer.emit(Qualifier {
            underlying,
            numerical,
            kind,
        })
    }

    pub fn param(&mut self, item: PrimitiveType, position: i32) -> Index {
        let ty = self.ty(item);
        self.qualifier(QualifierKind::Parameter, ty, position)
    }

    pub fn typed_param(&mut self, ty: Index, position: i32) -> Index {
        self.qualifier(QualifierKind::Parameter, ty, position)
    }

    pub fn literal(&mut self, value: PrimitiveValue) -> Index {
        self.buffer.emit(Primitive { value })
    }

    pub fn float(&mut self, v: f32) -> Index {
        self.literal(PrimitiveValue::F32(v))
    }

    pub fn int(&mut self, v: i32) -> Index {
        self.literal(PrimitiveValue::I32(v))
    }

    pub fn op(&mut self, code: OperationCode, a: Index, b: Index) -> Index {
        self.buffer.emit(Operation { a, b, code })
    }

    pub fn unary(&mut self, code: OperationCode, a: Index) -> Index {
        self.op(code, a, Index::NULL)
    }

    pub fn list(&mut self, items: &[Index]) -> Index {
        let mut next = Index::NULL;
        for &item in items.iter().rev() {
            next = self.buffer.emit(List { item, next });
        }
        next
    }

    pub fn intrinsic(&mut self, code: IntrinsicCode, args: &[Index]) -> Index {
        let args = self.list(args);
        self.buffer.emit(Intrinsic { args, code })
    }

    pub fn swizzle(&mut self, src: Index, code: SwizzleCode) -> Index {
        self.buffer.emit(Swizzle { src, code })
    }

    pub fn load(&mut self, src: Index, idx: i32) -> Index {
        self.buffer.emit(Load { src, idx })
    }

    /// A mutable local of type `ty`.
    pub fn local(&mut self, ty: Index) -> Index {
        self.buffer.emit(Construct {
            ty,
            args: Index::NULL,
            mode: ConstructorMode::Normal,
        })
    }

    pub fn construct(&mut self, ty: Index, args: &[Index]) -> Index {
        let args = self.list(args);
        self.buffer.emit(Construct {
            ty,
            args,
            mode: ConstructorMode::Normal,
        })
    }

    pub fn call(&mut self, callee: CallableId, ty: Index, args: &[Index]) -> Index {
        let args = self.list(args);
        let call = self.buffer.emit(Call { callee, ty, args });
        if !ty.is_null() {
            self.buffer.synthesize(call);
        }
        call
    }

    pub fn store(&mut self, dst: Index, src: Index) -> Index {
        self.buffer.emit(Store { dst, src })
    }

    /// Snapshots `value` into its own statement.
    pub fn keep(&mut self, value: Index) -> Index {
        self.buffer.synthesize(value);
        value
    }

    pub fn ret(&mut self, value: Index) -> Index {
        self.buffer.emit(Return { value })
    }

    /// Opens an `if`, `while` or `for` block.
    pub fn open(&mut self, kind: BranchKind, cond: Index) -> Index {
        let branch = self.buffer.emit(Branch {
            cond,
            failto: Index::NULL,
            kind,
        });
        self.open.push(branch);
        branch
    }

    /// Continues the innermost conditional with an `else if` or `else`.
    pub fn otherwise(&mut self, kind: BranchKind, cond: Index) -> Index {
        let branch = self.buffer.emit(Branch {
            cond,
            failto: Index::NULL,
            kind,
        });
        self.patch(branch);
        self.open.push(branch);
        branch
    }

    pub fn end(&mut self) -> Index {
        let end = self.buffer.emit(Branch {
            cond: Index::NULL,
            failto: Index::NULL,
            kind: BranchKind::End,
        });
        self.patch(end);
        end
    }

    fn patch(&mut self, to: Index) {
        let from = self.open.pop().expect("no open block");
        if let thunder_ir::Atom::Branch(branch) = self.buffer.atom_mut(from).unwrap() {
            branch.failto = to;
        }
    }

    pub fn register(self, ctx: &mut Context, name: &str) -> CallableId {
        assert!(self.open.is_empty(), "unterminated block in {name}");
        ctx.register(name, self.buffer).expect("function failed analysis")
    }
}

/// `f(vec3 a, f32 b) -> vec3 { return a + b; }`
#[allow(dead_code)]
pub fn vector_plus_scalar(ctx: &mut Context) -> CallableId {
    let mut b = Builder::new();
    let a = b.param(PrimitiveType::Vec3, 0);
    let s = b.param(PrimitiveType::F32, 1);
    let sum = b.op(OperationCode::Addition, a, s);
    b.keep(sum);
    b.ret(sum);
    b.register(ctx, "f")
}

/// Optimizes every function, links `entries` and generates for `target`.
#[allow(dead_code)]
pub fn generate(
    ctx: &mut Context,
    entries: &[CallableId],
    target: Target,
    stage: Stage,
) -> BackendOutput {
    try_generate(ctx, entries, target, stage).expect("generation failed")
}

/// Like `generate` but returns the backend error instead of panicking.
#[allow(dead_code)]
pub fn try_generate(
    ctx: &mut Context,
    entries: &[CallableId],
    target: Target,
    stage: Stage,
) -> Result<BackendOutput, thunder::BackendError> {
    thunder::optimize(ctx, thunder::OptLevel::O1)?;
    let unit = thunder::link(ctx, entries.iter().copied())?;
    unit.generate_with(
        target,
        &BackendOptions {
            stage,
            ..BackendOptions::default()
        },
    )
}

/// Extract the first text output from a `BackendOutput`.
#[allow(dead_code)]
pub fn first_text(output: &BackendOutput) -> &str {
    match &output.files[0].content {
        OutputContent::Text(t) => t,
        other => panic!("expected text output, got {other}"),
    }
}

/// Extract the first SPIR-V module from a `BackendOutput`.
#[allow(dead_code)]
pub fn first_words(output: &BackendOutput) -> (Stage, &[u32]) {
    match &output.files[0].content {
        OutputContent::Spirv { stage, words } => (*stage, words),
        other => panic!("expected SPIR-V output, got {other}"),
    }
}
