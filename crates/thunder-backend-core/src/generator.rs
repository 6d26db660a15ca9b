//! Statement generation shared by the text backends.
//!
//! A [`StatementGenerator`] walks the marked atoms of one linked function
//! in order and prints each as a statement: a local declaration for
//! values, an assignment for stores, structured control flow for
//! branches. Unmarked pure sub-expressions are inlined where they are
//! used. Everything that differs between target languages goes through
//! the [`Dialect`] hooks.

use std::collections::BTreeMap;

use thunder_ir::{
    Atom, Branch, BranchKind, CallableId, Construct, ConstructorMode, Function, ImageType, Index,
    Intrinsic, IntrinsicCode, Load, OperationCode, PlainDataType, PrimitiveType, PrimitiveValue,
    QualifiedType, Qualifier, QualifierKind, SamplerType, SwizzleCode,
};
use thunder_link::{DataType, GlobalRef, LinkError, LinkageUnit, UnitType};

use crate::BackendError;
use crate::naming;

/// How a parameter is passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Passed by value without a qualifier.
    Value,
    /// Explicit `in` parameter.
    In,
    /// Written by the callee.
    Out,
    /// Read and written by the callee.
    InOut,
}

impl Direction {
    /// Direction of a parameter of type `ty`.
    pub fn of(ty: &QualifiedType) -> Self {
        match ty {
            QualifiedType::InArg(_) => Self::In,
            QualifiedType::OutArg(_) => Self::Out,
            QualifiedType::InOutArg(_) => Self::InOut,
            _ => Self::Value,
        }
    }

    /// Whether the callee writes through the parameter.
    pub fn writes(self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

/// Target-language hooks of a text backend.
pub trait Dialect {
    /// Keyword of a primitive type; `Nil` is the void type.
    fn primitive(&self, p: PrimitiveType) -> String;

    /// Array of `element`; negative sizes are runtime sized.
    fn array(&self, element: &str, size: i32) -> String;

    /// Storage image type.
    fn image(&self, image: ImageType) -> Result<String, BackendError>;

    /// Combined image sampler type.
    fn sampler(&self, sampler: SamplerType) -> Result<String, BackendError>;

    /// Device-address reference to `base`.
    fn buffer_reference(&self, base: &str, id: i32) -> String;

    /// Literal constant.
    fn literal(&self, value: PrimitiveValue) -> String;

    /// Value construction of `ty`, spelled `name`.
    fn construct(&self, ty: &UnitType, name: &str, args: &[String]) -> String {
        let _ = ty;
        format!("{name}({})", args.join(", "))
    }

    /// Reference constructed from a raw device address.
    fn address_cast(&self, name: &str, address: &str) -> String {
        format!("{name}({address})")
    }

    /// Component selection.
    fn swizzle(&self, src: &str, code: SwizzleCode) -> String {
        format!("{src}.{code}")
    }

    /// Component selection that is stored to.
    fn swizzle_target(&self, src: &str, code: SwizzleCode) -> String {
        self.swizzle(src, code)
    }

    /// Unary (`b` absent) or binary operator application.
    fn operation(&self, code: OperationCode, a: &str, b: Option<&str>) -> String {
        match b {
            Some(b) => format!("({a} {} {b})", code.symbol()),
            None => format!("({}{a})", code.symbol()),
        }
    }

    /// Built-in function application. Keyword intrinsics return the bare
    /// keyword.
    fn intrinsic(&self, code: IntrinsicCode, args: &[String]) -> Result<String, BackendError>;

    /// Contents of a uniform, storage or push-constant block named
    /// `block`. Phantom struct contents are the block's own members.
    fn block_member(&self, block: &str, phantom: bool) -> String;

    /// Value a buffer reference points to.
    fn dereference(&self, reference: &str, phantom: bool) -> String;

    /// One entry of a parameter list.
    fn parameter(&self, ty: &str, name: &str, direction: Direction) -> String;

    /// Local variable declaration statement.
    fn declaration(&self, ty: &str, name: &str, init: Option<&str>) -> String {
        match init {
            Some(init) => format!("{ty} {name} = {init};"),
            None => format!("{ty} {name};"),
        }
    }

    /// Call of the unit function `callee`.
    fn call(
        &self,
        unit: &LinkageUnit<'_>,
        callee: CallableId,
        symbol: &str,
        args: &[String],
    ) -> String {
        let _ = (unit, callee);
        format!("{symbol}({})", args.join(", "))
    }

    /// Parameters appended to the declared ones.
    fn extra_parameters(
        &self,
        unit: &LinkageUnit<'_>,
        function: CallableId,
    ) -> Result<Vec<String>, BackendError> {
        let _ = (unit, function);
        Ok(Vec::new())
    }
}

/// Spells a unit type in `dialect`.
pub fn type_name<D: Dialect + ?Sized>(
    unit: &LinkageUnit<'_>,
    dialect: &D,
    ty: &UnitType,
) -> Result<String, BackendError> {
    Ok(match *ty {
        UnitType::Nil => dialect.primitive(PrimitiveType::Nil),
        UnitType::Data(data) => data_name(unit, dialect, data)?,
        UnitType::Array { element, size } => {
            dialect.array(&data_name(unit, dialect, element)?, size)
        }
        UnitType::Image(image) => dialect.image(image)?,
        UnitType::Sampler(sampler) => dialect.sampler(sampler)?,
        UnitType::BufferReference { base, id } => {
            dialect.buffer_reference(&data_name(unit, dialect, base)?, id)
        }
    })
}

/// Spells a value type in `dialect`.
pub fn data_name<D: Dialect + ?Sized>(
    unit: &LinkageUnit<'_>,
    dialect: &D,
    data: DataType,
) -> Result<String, BackendError> {
    match data {
        DataType::Primitive(p) => Ok(dialect.primitive(p)),
        DataType::Aggregate(index) => unit
            .aggregate(index)
            .map(|a| a.name.clone())
            .ok_or_else(|| BackendError::Other(format!("aggregate {index} is not registered"))),
    }
}

/// Prints one function of a linkage unit.
pub struct StatementGenerator<'g, D: Dialect + ?Sized> {
    unit: &'g LinkageUnit<'g>,
    function: &'g Function,
    dialect: &'g D,
    locals: BTreeMap<Index, String>,
    depth: usize,
    out: String,
}

impl<'g, D: Dialect + ?Sized> StatementGenerator<'g, D> {
    /// Generator for `function`, which must belong to `unit`.
    pub fn new(unit: &'g LinkageUnit<'g>, function: &'g Function, dialect: &'g D) -> Self {
        Self {
            unit,
            function,
            dialect,
            locals: BTreeMap::new(),
            depth: 1,
            out: String::new(),
        }
    }

    /// Definition of the function: signature and body.
    pub fn generate(mut self) -> Result<String, BackendError> {
        let signature = self.signature()?;
        let body = self.body()?;
        log::debug!(
            "generated `{}` with {} local(s)",
            self.function.name,
            self.locals.len()
        );
        Ok(format!("{signature} {{\n{body}}}\n"))
    }

    /// `returns name(parameters)`.
    pub fn signature(&self) -> Result<String, BackendError> {
        let buffer = &self.function.buffer;
        let returns = self.local_type(&self.function.returns)?;
        let symbol = self.symbol(self.function.id)?;
        let mut parameters = Vec::new();
        for (index, position) in self.function.parameters() {
            let ty = buffer.type_of(index)?;
            parameters.push(self.dialect.parameter(
                &self.local_type(&ty)?,
                &naming::argument(position),
                Direction::of(&ty),
            ));
        }
        parameters.extend(self.dialect.extra_parameters(self.unit, self.function.id)?);
        Ok(format!("{returns} {symbol}({})", parameters.join(", ")))
    }

    /// Statements of the function body, indented one level.
    pub fn body(&mut self) -> Result<String, BackendError> {
        let marked: Vec<Index> = self.function.buffer.marked().iter().copied().collect();
        for index in marked {
            self.statement(index)?;
        }
        if self.depth != 1 {
            return Err(self
                .function
                .buffer
                .structural_error(format!("`{}` leaves a block open", self.function.name))
                .into());
        }
        Ok(std::mem::take(&mut self.out))
    }

    /// Spells a function-local type.
    pub fn local_type(&self, ty: &QualifiedType) -> Result<String, BackendError> {
        let resolved = self.unit.resolve(self.function.id, ty)?;
        type_name(self.unit, self.dialect, &resolved)
    }

    /// The expression for `index`: its local if it has one, otherwise the
    /// inlined expression tree.
    pub fn inlined(&self, index: Index) -> Result<String, BackendError> {
        match self.locals.get(&index) {
            Some(name) => Ok(name.clone()),
            None => self.expression(index),
        }
    }

    /// An assignable expression for `index`. Snapshots of loads,
    /// swizzles and array accesses are bypassed so that the storage
    /// itself is named.
    pub fn reference(&self, index: Index) -> Result<String, BackendError> {
        let buffer = &self.function.buffer;
        match buffer.atom(index)? {
            Atom::Swizzle(s) => Ok(self.dialect.swizzle_target(&self.reference(s.src)?, s.code)),
            Atom::Load(l) => self.load(l, true),
            Atom::ArrayAccess(a) => Ok(format!(
                "{}[{}]",
                self.operand(a.src, true)?,
                self.inlined(a.loc)?
            )),
            Atom::Construct(c) if self.is_placeholder(c) => self.reference(c.ty),
            _ => self.inlined(index),
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn statement(&mut self, index: Index) -> Result<(), BackendError> {
        let function = self.function;
        let buffer = &function.buffer;
        let atom = buffer.atom(index)?;
        match atom {
            Atom::Qualifier(_) | Atom::TypeInformation(_) | Atom::List(_) => {}
            Atom::Intrinsic(i) if i.code.is_layout() => {}
            Atom::Construct(c) if c.mode == ConstructorMode::Transient => {}
            Atom::Store(s) => {
                let text = format!("{} = {};", self.reference(s.dst)?, self.inlined(s.src)?);
                self.line(&text);
            }
            Atom::Return(r) if r.value.is_null() => self.line("return;"),
            Atom::Return(r) => {
                let text = format!("return {};", self.inlined(r.value)?);
                self.line(&text);
            }
            Atom::Branch(b) => self.branch(index, b)?,
            Atom::Intrinsic(_) | Atom::Call(_) if buffer.type_of(index)?.is_nil() => {
                let text = format!("{};", self.expression(index)?);
                self.line(&text);
            }
            Atom::Construct(c)
                if c.args.is_null()
                    && !matches!(buffer.type_of(index)?, QualifiedType::BufferReference(_)) =>
            {
                let ty = self.local_type(&buffer.type_of(index)?)?;
                let name = naming::local(self.locals.len());
                let text = self.dialect.declaration(&ty, &name, None);
                self.line(&text);
                self.locals.insert(index, name);
            }
            _ => {
                let ty = self.local_type(&buffer.type_of(index)?)?;
                let init = self.expression(index)?;
                let name = naming::local(self.locals.len());
                let text = self.dialect.declaration(&ty, &name, Some(&init));
                self.line(&text);
                self.locals.insert(index, name);
            }
        }
        Ok(())
    }

    fn branch(&mut self, index: Index, branch: &Branch) -> Result<(), BackendError> {
        let condition = if branch.kind.has_condition() {
            self.inlined(branch.cond)?
        } else {
            String::new()
        };
        let closes = matches!(
            branch.kind,
            BranchKind::ElseIf | BranchKind::Else | BranchKind::End
        );
        if closes {
            if self.depth <= 1 {
                return Err(self
                    .function
                    .buffer
                    .structural_error(format!("{} at {index} closes no block", branch.kind))
                    .into());
            }
            self.depth -= 1;
        }
        let text = match branch.kind {
            BranchKind::If => format!("if ({condition}) {{"),
            BranchKind::ElseIf => format!("}} else if ({condition}) {{"),
            BranchKind::Else => "} else {".to_string(),
            BranchKind::While => format!("while ({condition}) {{"),
            BranchKind::For => format!("for (; {condition};) {{"),
            BranchKind::Continue => "continue;".to_string(),
            BranchKind::Break => "break;".to_string(),
            BranchKind::End => "}".to_string(),
        };
        self.line(&text);
        if branch.kind.opens_block() {
            self.depth += 1;
        }
        Ok(())
    }

    /// The expression an atom computes, ignoring any local it was given.
    fn expression(&self, index: Index) -> Result<String, BackendError> {
        let buffer = &self.function.buffer;
        Ok(match buffer.atom(index)? {
            Atom::Qualifier(q) => self.qualifier(index, q)?,
            Atom::Primitive(p) => self.dialect.literal(p.value),
            Atom::Swizzle(s) => self.dialect.swizzle(&self.inlined(s.src)?, s.code),
            Atom::Operation(o) => {
                let a = self.inlined(o.a)?;
                let b = if o.b.is_null() {
                    None
                } else {
                    Some(self.inlined(o.b)?)
                };
                self.dialect.operation(o.code, &a, b.as_deref())
            }
            Atom::Intrinsic(i) => self.intrinsic(i)?,
            Atom::Construct(c) => self.construct(index, c)?,
            Atom::Call(c) => {
                let parameters = self
                    .unit
                    .function(c.callee)
                    .map(|f| f.args.clone())
                    .unwrap_or_default();
                let mut args = Vec::new();
                for (k, item) in buffer.expand_list(c.args)?.into_iter().enumerate() {
                    let writes = parameters
                        .get(k)
                        .is_some_and(|ty| Direction::of(ty).writes());
                    args.push(if writes {
                        self.reference(item)?
                    } else {
                        self.inlined(item)?
                    });
                }
                let symbol = self.symbol(c.callee)?;
                self.dialect.call(self.unit, c.callee, &symbol, &args)
            }
            Atom::Load(l) => self.load(l, false)?,
            Atom::ArrayAccess(a) => {
                format!("{}[{}]", self.operand(a.src, false)?, self.inlined(a.loc)?)
            }
            other => {
                return Err(buffer
                    .structural_error(format!("{} at {index} is not a value", other.kind_name()))
                    .into());
            }
        })
    }

    fn symbol(&self, id: CallableId) -> Result<String, BackendError> {
        self.unit
            .symbol(id)
            .ok_or(BackendError::Link(LinkError::UnknownCallable(id)))
    }

    fn arguments(&self, head: Index) -> Result<Vec<String>, BackendError> {
        self.function
            .buffer
            .expand_list(head)?
            .into_iter()
            .map(|item| self.inlined(item))
            .collect()
    }

    fn intrinsic(&self, intrinsic: &Intrinsic) -> Result<String, BackendError> {
        let args = self.arguments(intrinsic.args)?;
        self.dialect.intrinsic(intrinsic.code, &args)
    }

    fn qualifier(&self, index: Index, q: &Qualifier) -> Result<String, BackendError> {
        let buffer = &self.function.buffer;
        if q.kind == QualifierKind::Parameter {
            return Ok(naming::argument(q.numerical.max(0) as usize));
        }
        match naming::resolve_global(buffer, index) {
            Some(global @ (GlobalRef::Uniform(_) | GlobalRef::Buffer(_) | GlobalRef::PushConstant)) => {
                let phantom = match buffer.type_of(index)?.bare() {
                    QualifiedType::PlainData(PlainDataType::Concrete(head)) => self.is_phantom(head)?,
                    QualifiedType::BufferReference(r) => match r.base {
                        PlainDataType::Concrete(head) => self.is_phantom(head)?,
                        PlainDataType::Primitive(_) => false,
                    },
                    _ => false,
                };
                Ok(self.dialect.block_member(&naming::global(global), phantom))
            }
            Some(global) => Ok(naming::global(global)),
            None => Err(buffer
                .structural_error(format!("{} qualifier at {index} is not a value", q.kind))
                .into()),
        }
    }

    /// Whether a construct only carries the value of a qualifier.
    fn is_placeholder(&self, c: &Construct) -> bool {
        c.mode == ConstructorMode::Transient
            && matches!(self.function.buffer.get(c.ty), Some(Atom::Qualifier(_)))
    }

    fn construct(&self, index: Index, c: &Construct) -> Result<String, BackendError> {
        if self.is_placeholder(c) {
            return self.inlined(c.ty);
        }
        let buffer = &self.function.buffer;
        let ty = self.unit.resolve(self.function.id, &buffer.type_of(index)?)?;
        let name = type_name(self.unit, self.dialect, &ty)?;
        let args = self.arguments(c.args)?;
        if let UnitType::BufferReference { .. } = ty {
            let [address] = args.as_slice() else {
                return Err(buffer
                    .structural_error(format!(
                        "buffer reference at {index} takes one address, got {}",
                        args.len()
                    ))
                    .into());
            };
            return Ok(self.dialect.address_cast(&name, address));
        }
        Ok(self.dialect.construct(&ty, &name, &args))
    }

    /// `src` as a value, dereferenced when it is a buffer reference that
    /// is not itself a declared block.
    fn operand(&self, src: Index, assignable: bool) -> Result<String, BackendError> {
        let buffer = &self.function.buffer;
        let text = if assignable {
            self.reference(src)?
        } else {
            self.inlined(src)?
        };
        if let QualifiedType::BufferReference(r) = buffer.type_of(src)?.bare() {
            if naming::resolve_global(buffer, src).is_none() {
                let phantom = match r.base {
                    PlainDataType::Concrete(head) => self.is_phantom(head)?,
                    PlainDataType::Primitive(_) => false,
                };
                return Ok(self.dialect.dereference(&text, phantom));
            }
        }
        Ok(text)
    }

    fn load(&self, load: &Load, assignable: bool) -> Result<String, BackendError> {
        let buffer = &self.function.buffer;
        let base = self.operand(load.src, assignable)?;
        if load.idx < 0 {
            return Ok(base);
        }
        let head = match buffer.type_of(load.src)?.bare() {
            QualifiedType::PlainData(PlainDataType::Concrete(head)) => head,
            QualifiedType::BufferReference(r) => match r.base {
                PlainDataType::Concrete(head) => head,
                PlainDataType::Primitive(_) => Index::NULL,
            },
            _ => Index::NULL,
        };
        let aggregate = self.unit.aggregate_index(self.function.id, head)?;
        let field = self
            .unit
            .aggregate(aggregate)
            .and_then(|a| a.fields.get(load.idx as usize))
            .ok_or_else(|| {
                buffer.structural_error(format!(
                    "load of field {} from aggregate {aggregate}",
                    load.idx
                ))
            })?;
        Ok(format!("{base}.{}", field.name))
    }

    fn is_phantom(&self, head: Index) -> Result<bool, BackendError> {
        let aggregate = self.unit.aggregate_index(self.function.id, head)?;
        Ok(self.unit.aggregate(aggregate).is_some_and(|a| a.phantom))
    }
}
