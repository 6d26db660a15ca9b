//! Translation of one linked function into Cranelift IR.
//!
//! Marked atoms are visited in order, like the text backends do. Every
//! marked value and every parameter owns one Cranelift variable per
//! scalar component; stores redefine those variables, so loops and
//! conditionals get their block parameters from the SSA builder.
//! Unmarked pure expressions are re-evaluated at each use.

use std::collections::BTreeMap;
use std::ops::Range;

use cranelift::codegen::ir;
use cranelift::prelude::*;
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Linkage, Module};
use thunder_backend_core::BackendError;
use thunder_ir::{
    Atom, Branch, BranchKind, Call, CallableId, Construct, ConstructorMode, Function, Index,
    Intrinsic, IntrinsicCode, Load, Operation, OperationCode, PlainDataType, PrimitiveType,
    PrimitiveValue, QualifiedType,
};
use thunder_link::{DataType, LinkError, LinkageUnit, UnitType};

use crate::layout::{self, Layout, value_type};
use crate::{host, module_error};

/// An open block of structured control flow.
enum Frame {
    Conditional { merge: Block, next: Option<Block> },
    Loop { header: Block, exit: Block },
}

pub struct Translator<'t, 'b> {
    unit: &'t LinkageUnit<'t>,
    function: &'t Function,
    module: &'t mut JITModule,
    ids: &'t BTreeMap<CallableId, FuncId>,
    builder: FunctionBuilder<'b>,
    variables: BTreeMap<Index, Vec<Variable>>,
    next_variable: usize,
    frames: Vec<Frame>,
    args: Value,
    result: Value,
    /// The current block already ends in a terminator.
    filled: bool,
}

impl<'t, 'b> Translator<'t, 'b> {
    pub fn new(
        unit: &'t LinkageUnit<'t>,
        function: &'t Function,
        module: &'t mut JITModule,
        ids: &'t BTreeMap<CallableId, FuncId>,
        func: &'b mut ir::Function,
        context: &'b mut FunctionBuilderContext,
    ) -> Self {
        let mut builder = FunctionBuilder::new(func, context);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let params = builder.block_params(entry).to_vec();
        Self {
            unit,
            function,
            module,
            ids,
            builder,
            variables: BTreeMap::new(),
            next_variable: 0,
            frames: Vec::new(),
            args: params[0],
            result: params[1],
            filled: false,
        }
    }

    pub fn translate(mut self) -> Result<(), BackendError> {
        self.parameters()?;
        let marked: Vec<Index> = self.function.buffer.marked().iter().copied().collect();
        for index in marked {
            self.statement(index)?;
        }
        if !self.frames.is_empty() {
            return Err(self
                .function
                .buffer
                .structural_error(format!("`{}` leaves a block open", self.function.name))
                .into());
        }
        if !self.filled {
            self.builder.ins().return_(&[]);
        }
        self.builder.seal_all_blocks();
        self.builder.finalize();
        Ok(())
    }

    fn parameters(&mut self) -> Result<(), BackendError> {
        let function = self.function;
        let mut parameters = Vec::new();
        for (index, position) in function.parameters() {
            let ty = function.buffer.type_of(index)?;
            if matches!(ty, QualifiedType::OutArg(_) | QualifiedType::InOutArg(_)) {
                return Err(BackendError::Unsupported(format!(
                    "`{}` writes through parameter {position}",
                    function.name
                )));
            }
            parameters.push((index, self.unit.resolve(function.id, &ty)?));
        }
        let types: Vec<UnitType> = parameters.iter().map(|(_, ty)| *ty).collect();
        let values = Layout::concat(self.unit, &types)?.load(&mut self.builder, self.args, 0);
        let mut at = 0;
        for (index, ty) in parameters {
            let count = layout::scalars(self.unit, &ty)?.len();
            self.bind(index, &values[at..at + count])?;
            at += count;
        }
        Ok(())
    }

    fn statement(&mut self, index: Index) -> Result<(), BackendError> {
        let function = self.function;
        let buffer = &function.buffer;
        match buffer.atom(index)? {
            Atom::Qualifier(_) | Atom::TypeInformation(_) | Atom::List(_) => {}
            Atom::Intrinsic(i) if i.code.is_layout() => {}
            Atom::Construct(c) if c.mode == ConstructorMode::Transient => {}
            Atom::Store(s) => {
                self.open();
                let (root, positions) = self.target(s.dst)?;
                let values = self.value(s.src)?;
                if values.len() != positions.len() {
                    return Err(buffer
                        .structural_error(format!(
                            "store at {index} writes {} components into {}",
                            values.len(),
                            positions.len()
                        ))
                        .into());
                }
                let variables = self.variables.get(&root).cloned().unwrap_or_default();
                for (position, value) in positions.into_iter().zip(values) {
                    if let Some(&variable) = variables.get(position) {
                        self.builder.def_var(variable, value);
                    }
                }
            }
            Atom::Return(r) => {
                self.open();
                if !r.value.is_null() {
                    let values = self.value(r.value)?;
                    let returns = self.unit.resolve(function.id, &function.returns)?;
                    Layout::of(self.unit, &returns)?.store(&mut self.builder, self.result, 0, &values);
                }
                self.builder.ins().return_(&[]);
                self.filled = true;
            }
            Atom::Branch(b) => self.branch(index, b)?,
            Atom::Intrinsic(_) | Atom::Call(_) if buffer.type_of(index)?.is_nil() => {
                self.open();
                self.expression(index)?;
            }
            Atom::Construct(c) if c.args.is_null() => {
                self.open();
                let zeros: Vec<Value> = self
                    .scalars_of(index)?
                    .into_iter()
                    .map(|s| self.zero(s))
                    .collect();
                self.bind(index, &zeros)?;
            }
            _ => {
                self.open();
                let values = self.expression(index)?;
                self.bind(index, &values)?;
            }
        }
        Ok(())
    }

    fn branch(&mut self, index: Index, branch: &Branch) -> Result<(), BackendError> {
        match branch.kind {
            BranchKind::If => {
                self.open();
                let condition = self.condition(branch.cond)?;
                let then = self.builder.create_block();
                let next = self.builder.create_block();
                let merge = self.builder.create_block();
                self.builder.ins().brif(condition, then, &[], next, &[]);
                self.switch(then);
                self.frames.push(Frame::Conditional {
                    merge,
                    next: Some(next),
                });
            }
            BranchKind::ElseIf => {
                let (merge, next) = self.alternative(index, branch.kind)?;
                self.jump(merge);
                self.switch(next);
                let condition = self.condition(branch.cond)?;
                let then = self.builder.create_block();
                let following = self.builder.create_block();
                self.builder.ins().brif(condition, then, &[], following, &[]);
                self.switch(then);
                if let Some(Frame::Conditional { next, .. }) = self.frames.last_mut() {
                    *next = Some(following);
                }
            }
            BranchKind::Else => {
                let (merge, next) = self.alternative(index, branch.kind)?;
                self.jump(merge);
                self.switch(next);
            }
            BranchKind::While | BranchKind::For => {
                self.open();
                let header = self.builder.create_block();
                let body = self.builder.create_block();
                let exit = self.builder.create_block();
                self.jump(header);
                self.switch(header);
                let condition = self.condition(branch.cond)?;
                self.builder.ins().brif(condition, body, &[], exit, &[]);
                self.switch(body);
                self.frames.push(Frame::Loop { header, exit });
            }
            BranchKind::Continue | BranchKind::Break => {
                self.open();
                let target = self
                    .frames
                    .iter()
                    .rev()
                    .find_map(|frame| match *frame {
                        Frame::Loop { header, exit } => Some(if branch.kind == BranchKind::Continue {
                            header
                        } else {
                            exit
                        }),
                        Frame::Conditional { .. } => None,
                    })
                    .ok_or_else(|| {
                        self.function
                            .buffer
                            .structural_error(format!("{} at {index} is outside a loop", branch.kind))
                    })?;
                self.jump(target);
            }
            BranchKind::End => match self.frames.pop() {
                Some(Frame::Conditional { merge, next }) => {
                    self.jump(merge);
                    if let Some(next) = next {
                        self.switch(next);
                        self.jump(merge);
                    }
                    self.switch(merge);
                }
                Some(Frame::Loop { header, exit }) => {
                    self.jump(header);
                    self.switch(exit);
                }
                None => {
                    return Err(self
                        .function
                        .buffer
                        .structural_error(format!("end at {index} closes no block"))
                        .into());
                }
            },
        }
        Ok(())
    }

    /// Merge block and pending alternative of the innermost conditional.
    fn alternative(&mut self, index: Index, kind: BranchKind) -> Result<(Block, Block), BackendError> {
        match self.frames.last_mut() {
            Some(Frame::Conditional {
                merge,
                next: next @ Some(_),
            }) => {
                let merge = *merge;
                next.take()
                    .map(|next| (merge, next))
                    .ok_or_else(|| BackendError::Other(format!("{kind} at {index} lost its block")))
            }
            _ => Err(self
                .function
                .buffer
                .structural_error(format!("{kind} at {index} follows no open conditional"))
                .into()),
        }
    }

    /// Starts an unreachable block when the current one is terminated, so
    /// that code after a `return`, `break` or `continue` still has a home.
    fn open(&mut self) {
        if self.filled {
            let block = self.builder.create_block();
            self.switch(block);
        }
    }

    fn switch(&mut self, block: Block) {
        self.builder.switch_to_block(block);
        self.filled = false;
    }

    fn jump(&mut self, block: Block) {
        if !self.filled {
            self.builder.ins().jump(block, &[]);
        }
        self.filled = true;
    }

    fn condition(&mut self, index: Index) -> Result<Value, BackendError> {
        match self.value(index)?.as_slice() {
            [condition] => Ok(*condition),
            other => Err(self
                .function
                .buffer
                .structural_error(format!(
                    "condition at {index} has {} components",
                    other.len()
                ))
                .into()),
        }
    }

    fn bind(&mut self, index: Index, values: &[Value]) -> Result<(), BackendError> {
        let scalars = self.scalars_of(index)?;
        let mut variables = Vec::with_capacity(scalars.len());
        for (&scalar, &value) in scalars.iter().zip(values) {
            let variable = Variable::new(self.next_variable);
            self.next_variable += 1;
            self.builder.declare_var(variable, value_type(scalar));
            self.builder.def_var(variable, value);
            variables.push(variable);
        }
        self.variables.insert(index, variables);
        Ok(())
    }

    fn unit_type(&self, index: Index) -> Result<UnitType, BackendError> {
        let ty = self.function.buffer.type_of(index)?;
        Ok(self.unit.resolve(self.function.id, &ty)?)
    }

    fn scalars_of(&self, index: Index) -> Result<Vec<PrimitiveType>, BackendError> {
        layout::scalars(self.unit, &self.unit_type(index)?)
    }

    fn primitive_of(&self, index: Index) -> Result<PrimitiveType, BackendError> {
        let ty = self.function.buffer.type_of(index)?;
        ty.primitive_type().ok_or_else(|| {
            BackendError::Unsupported(format!("operands of type {ty} in native code"))
        })
    }

    /// The scalars of `index`: its variables if it has any, otherwise the
    /// freshly evaluated expression.
    fn value(&mut self, index: Index) -> Result<Vec<Value>, BackendError> {
        if let Some(variables) = self.variables.get(&index).cloned() {
            return Ok(variables
                .into_iter()
                .map(|variable| self.builder.use_var(variable))
                .collect());
        }
        self.expression(index)
    }

    fn expression(&mut self, index: Index) -> Result<Vec<Value>, BackendError> {
        let function = self.function;
        let buffer = &function.buffer;
        match buffer.atom(index)? {
            Atom::Qualifier(q) => Err(BackendError::Unsupported(format!(
                "{} qualifier at {index} has no native counterpart",
                q.kind
            ))),
            Atom::Primitive(p) => Ok(vec![self.literal(p.value)]),
            Atom::Swizzle(s) => {
                let source = self.value(s.src)?;
                s.code
                    .components()
                    .iter()
                    .map(|&c| {
                        source.get(c).copied().ok_or_else(|| {
                            BackendError::from(buffer.structural_error(format!(
                                "swizzle {} at {index} out of range",
                                s.code
                            )))
                        })
                    })
                    .collect()
            }
            Atom::Operation(o) => self.operation(index, o),
            Atom::Intrinsic(i) => self.intrinsic(index, i),
            Atom::Construct(c) => self.construct(index, c),
            Atom::Call(c) => self.call(index, c),
            Atom::Load(l) => self.load(l),
            Atom::ArrayAccess(a) => {
                let source = self.value(a.src)?;
                let columns = match self.primitive_of(a.src)? {
                    p if p.is_matrix() => p.rows(),
                    _ => 1,
                };
                let Some(Atom::Primitive(location)) = buffer.get(a.loc) else {
                    return Err(BackendError::Unsupported(format!(
                        "dynamic array access at {index} in native code"
                    )));
                };
                let at = match location.value {
                    PrimitiveValue::I32(v) => v.max(0) as usize,
                    PrimitiveValue::U32(v) => v as usize,
                    other => {
                        return Err(buffer
                            .structural_error(format!("array access at {index} by {other}"))
                            .into());
                    }
                };
                source
                    .get(at * columns..(at + 1) * columns)
                    .map(<[Value]>::to_vec)
                    .ok_or_else(|| {
                        BackendError::from(
                            buffer.structural_error(format!("array access at {index} out of range")),
                        )
                    })
            }
            other => Err(buffer
                .structural_error(format!("{} at {index} is not a value", other.kind_name()))
                .into()),
        }
    }

    /// Variable owner and scalar positions a store through `index` writes.
    fn target(&self, index: Index) -> Result<(Index, Vec<usize>), BackendError> {
        let buffer = &self.function.buffer;
        match buffer.atom(index)? {
            Atom::Swizzle(s) => {
                let (root, positions) = self.target(s.src)?;
                let picked = s
                    .code
                    .components()
                    .iter()
                    .map(|&c| positions.get(c).copied())
                    .collect::<Option<Vec<usize>>>()
                    .ok_or_else(|| {
                        buffer.structural_error(format!("swizzle {} at {index} out of range", s.code))
                    })?;
                Ok((root, picked))
            }
            Atom::Load(l) => {
                let (root, positions) = self.target(l.src)?;
                if l.idx < 0 {
                    return Ok((root, positions));
                }
                let range = self.field(l)?;
                let picked = positions.get(range).map(<[usize]>::to_vec).ok_or_else(|| {
                    buffer.structural_error(format!("field {} at {index} out of range", l.idx))
                })?;
                Ok((root, picked))
            }
            Atom::Construct(c) if self.is_placeholder(c) => self.target(c.ty),
            other => match self.variables.get(&index) {
                Some(variables) => Ok((index, (0..variables.len()).collect())),
                None => Err(BackendError::Unsupported(format!(
                    "stores to {} at {index} in native code",
                    other.kind_name()
                ))),
            },
        }
    }

    fn is_placeholder(&self, c: &Construct) -> bool {
        c.mode == ConstructorMode::Transient
            && matches!(self.function.buffer.get(c.ty), Some(Atom::Qualifier(_)))
    }

    /// Scalar range a field load selects from its struct value.
    fn field(&self, load: &Load) -> Result<Range<usize>, BackendError> {
        let buffer = &self.function.buffer;
        let head = match buffer.type_of(load.src)?.bare() {
            QualifiedType::PlainData(PlainDataType::Concrete(head)) => head,
            other => {
                return Err(BackendError::Unsupported(format!(
                    "field loads from {other} in native code"
                )));
            }
        };
        let aggregate = self.unit.aggregate_index(self.function.id, head)?;
        layout::field_range(self.unit, aggregate, load.idx as usize)
    }

    fn load(&mut self, load: &Load) -> Result<Vec<Value>, BackendError> {
        let base = self.value(load.src)?;
        if load.idx < 0 {
            return Ok(base);
        }
        let range = self.field(load)?;
        base.get(range).map(<[Value]>::to_vec).ok_or_else(|| {
            BackendError::from(
                self.function
                    .buffer
                    .structural_error(format!("field {} out of range", load.idx)),
            )
        })
    }

    fn literal(&mut self, value: PrimitiveValue) -> Value {
        let ins = self.builder.ins();
        match value {
            PrimitiveValue::Bool(v) => ins.iconst(types::I8, i64::from(v)),
            PrimitiveValue::I32(v) => ins.iconst(types::I32, i64::from(v as u32)),
            PrimitiveValue::U32(v) => ins.iconst(types::I32, i64::from(v)),
            PrimitiveValue::F32(v) => ins.f32const(v),
            PrimitiveValue::F64(v) => ins.f64const(v),
            PrimitiveValue::U64(v) => ins.iconst(types::I64, v as i64),
        }
    }

    fn zero(&mut self, scalar: PrimitiveType) -> Value {
        let ins = self.builder.ins();
        match scalar {
            PrimitiveType::F32 => ins.f32const(0.0),
            PrimitiveType::F64 => ins.f64const(0.0),
            other => ins.iconst(value_type(other), 0),
        }
    }

    fn operation(&mut self, index: Index, o: &Operation) -> Result<Vec<Value>, BackendError> {
        let a = self.value(o.a)?;
        let left = self.primitive_of(o.a)?;
        if o.b.is_null() {
            return a
                .into_iter()
                .map(|x| self.unary(o.code, left.scalar(), x))
                .collect();
        }
        let b = self.value(o.b)?;
        let right = self.primitive_of(o.b)?;
        if o.code == OperationCode::Multiplication
            && (left.is_matrix() || right.is_matrix())
            && !left.is_scalar()
            && !right.is_scalar()
        {
            return Err(BackendError::Unsupported(
                "matrix products in native code".into(),
            ));
        }
        let width = broadcast_width(&[a.len(), b.len()]).ok_or_else(|| {
            self.function.buffer.structural_error(format!(
                "operation at {index} mixes {} and {} components",
                a.len(),
                b.len()
            ))
        })?;
        let mut out = Vec::with_capacity(width);
        for k in 0..width {
            out.push(self.binary(o.code, left.scalar(), lane(&a, k), lane(&b, k))?);
        }
        match o.code {
            OperationCode::Equals => Ok(vec![self.reduce(&out, true)]),
            OperationCode::NotEquals => Ok(vec![self.reduce(&out, false)]),
            _ => Ok(out),
        }
    }

    /// Folds per-component comparisons: all of them, or any of them.
    fn reduce(&mut self, parts: &[Value], all: bool) -> Value {
        let mut acc = parts[0];
        for &part in &parts[1..] {
            acc = if all {
                self.builder.ins().band(acc, part)
            } else {
                self.builder.ins().bor(acc, part)
            };
        }
        acc
    }

    fn unary(&mut self, code: OperationCode, scalar: PrimitiveType, x: Value) -> Result<Value, BackendError> {
        let ins = self.builder.ins();
        Ok(match code {
            OperationCode::Negation if scalar.is_float() => ins.fneg(x),
            OperationCode::Negation => ins.ineg(x),
            OperationCode::LogicalNot => ins.bxor_imm(x, 1),
            OperationCode::BitNot => ins.bnot(x),
            other => {
                return Err(BackendError::Other(format!(
                    "operator `{other}` applied to one operand"
                )));
            }
        })
    }

    fn binary(
        &mut self,
        code: OperationCode,
        scalar: PrimitiveType,
        x: Value,
        y: Value,
    ) -> Result<Value, BackendError> {
        use OperationCode as O;
        let float = scalar.is_float();
        let signed = scalar == PrimitiveType::I32;
        let ins = self.builder.ins();
        Ok(match code {
            O::Addition if float => ins.fadd(x, y),
            O::Addition => ins.iadd(x, y),
            O::Subtraction if float => ins.fsub(x, y),
            O::Subtraction => ins.isub(x, y),
            O::Multiplication if float => ins.fmul(x, y),
            O::Multiplication => ins.imul(x, y),
            O::Division if float => ins.fdiv(x, y),
            O::Division if signed => ins.sdiv(x, y),
            O::Division => ins.udiv(x, y),
            O::Modulus if float => {
                return Err(BackendError::Unsupported(
                    "floating point `%` in native code".into(),
                ));
            }
            O::Modulus if signed => ins.srem(x, y),
            O::Modulus => ins.urem(x, y),
            O::BitAnd | O::LogicalAnd => ins.band(x, y),
            O::BitOr | O::LogicalOr => ins.bor(x, y),
            O::BitXor => ins.bxor(x, y),
            O::BitShiftLeft => ins.ishl(x, y),
            O::BitShiftRight if signed => ins.sshr(x, y),
            O::BitShiftRight => ins.ushr(x, y),
            O::Equals | O::NotEquals | O::Less | O::LessEqual | O::Greater | O::GreaterEqual
                if float =>
            {
                ins.fcmp(float_condition(code), x, y)
            }
            O::Equals | O::NotEquals | O::Less | O::LessEqual | O::Greater | O::GreaterEqual => {
                ins.icmp(int_condition(code, signed), x, y)
            }
            O::Negation | O::LogicalNot | O::BitNot => {
                return Err(BackendError::Other(format!(
                    "operator `{code}` applied to two operands"
                )));
            }
        })
    }

    fn intrinsic(&mut self, index: Index, intrinsic: &Intrinsic) -> Result<Vec<Value>, BackendError> {
        use IntrinsicCode as I;
        let code = intrinsic.code;
        let items = self.function.buffer.expand_list(intrinsic.args)?;
        let Some(&first) = items.first() else {
            return Err(unsupported_intrinsic(code));
        };
        let scalar = self.primitive_of(first)?.scalar();
        let mut args = Vec::with_capacity(items.len());
        for &item in &items {
            args.push(self.value(item)?);
        }
        let widths: Vec<usize> = args.iter().map(Vec::len).collect();
        let width = broadcast_width(&widths).ok_or_else(|| {
            self.function
                .buffer
                .structural_error(format!("intrinsic `{code}` at {index} mixes widths {widths:?}"))
        })?;
        let float = scalar.is_float();
        let signed = scalar == PrimitiveType::I32;

        if matches!(code, I::Dot | I::Length) {
            if !float {
                return Err(unsupported_intrinsic(code));
            }
            let other = if code == I::Dot { args.get(1) } else { args.first() };
            let Some(other) = other.cloned() else {
                return Err(unsupported_intrinsic(code));
            };
            let mut sum = self.builder.ins().fmul(args[0][0], other[0]);
            for k in 1..width {
                let product = self.builder.ins().fmul(lane(&args[0], k), lane(&other, k));
                sum = self.builder.ins().fadd(sum, product);
            }
            if code == I::Length {
                sum = self.builder.ins().sqrt(sum);
            }
            return Ok(vec![sum]);
        }

        let mut out = Vec::with_capacity(width);
        for k in 0..width {
            let lanes: Vec<Value> = args.iter().map(|a| lane(a, k)).collect();
            let value = match (code, lanes.as_slice()) {
                (I::Abs, &[x]) if float => self.builder.ins().fabs(x),
                (I::Abs, &[x]) if signed => self.builder.ins().iabs(x),
                (I::Abs, &[x]) => x,
                (I::Floor, &[x]) if float => self.builder.ins().floor(x),
                (I::Ceil, &[x]) if float => self.builder.ins().ceil(x),
                (I::Sqrt, &[x]) if float => self.builder.ins().sqrt(x),
                (I::Min, &[x, y]) => self.min(scalar, x, y),
                (I::Max, &[x, y]) => self.max(scalar, x, y),
                (I::Clamp, &[x, lo, hi]) => {
                    let low = self.max(scalar, x, lo);
                    self.min(scalar, low, hi)
                }
                (code, &[x]) if scalar == PrimitiveType::F32 && host::unary(code).is_some() => {
                    self.host_call(code, &[x])?
                }
                (code, &[x, y]) if scalar == PrimitiveType::F32 && host::binary(code).is_some() => {
                    self.host_call(code, &[x, y])?
                }
                _ => return Err(unsupported_intrinsic(code)),
            };
            out.push(value);
        }
        Ok(out)
    }

    fn min(&mut self, scalar: PrimitiveType, x: Value, y: Value) -> Value {
        let ins = self.builder.ins();
        if scalar.is_float() {
            ins.fmin(x, y)
        } else if scalar == PrimitiveType::I32 {
            ins.smin(x, y)
        } else {
            ins.umin(x, y)
        }
    }

    fn max(&mut self, scalar: PrimitiveType, x: Value, y: Value) -> Value {
        let ins = self.builder.ins();
        if scalar.is_float() {
            ins.fmax(x, y)
        } else if scalar == PrimitiveType::I32 {
            ins.smax(x, y)
        } else {
            ins.umax(x, y)
        }
    }

    fn host_call(&mut self, code: IntrinsicCode, args: &[Value]) -> Result<Value, BackendError> {
        let symbol = match args.len() {
            1 => host::unary(code).map(|(symbol, _)| symbol),
            _ => host::binary(code).map(|(symbol, _)| symbol),
        }
        .ok_or_else(|| unsupported_intrinsic(code))?;
        let mut signature = self.module.make_signature();
        for _ in args {
            signature.params.push(AbiParam::new(types::F32));
        }
        signature.returns.push(AbiParam::new(types::F32));
        let id = self
            .module
            .declare_function(symbol, Linkage::Import, &signature)
            .map_err(module_error)?;
        let callee = self.module.declare_func_in_func(id, self.builder.func);
        let call = self.builder.ins().call(callee, args);
        Ok(self.builder.inst_results(call)[0])
    }

    fn construct(&mut self, index: Index, c: &Construct) -> Result<Vec<Value>, BackendError> {
        if self.is_placeholder(c) {
            return self.value(c.ty);
        }
        let function = self.function;
        let buffer = &function.buffer;
        let target = self.scalars_of(index)?;
        let mut parts = Vec::new();
        for item in buffer.expand_list(c.args)? {
            let values = self.value(item)?;
            let scalars = self.scalars_of(item)?;
            parts.extend(scalars.into_iter().zip(values));
        }

        if let [(from, value)] = parts[..] {
            if target.len() > 1 {
                let value = self.convert(value, from, target[0]);
                let rows = match self.unit_type(index)? {
                    UnitType::Data(DataType::Primitive(p)) if p.is_matrix() => Some(p.rows()),
                    _ => None,
                };
                let Some(rows) = rows else {
                    return Ok(vec![value; target.len()]);
                };
                let zero = self.zero(target[0]);
                return Ok((0..target.len())
                    .map(|k| if k % (rows + 1) == 0 { value } else { zero })
                    .collect());
            }
        }
        if parts.len() < target.len() {
            return Err(buffer
                .structural_error(format!(
                    "construct at {index} supplies {} of {} components",
                    parts.len(),
                    target.len()
                ))
                .into());
        }
        Ok(parts
            .into_iter()
            .zip(target)
            .map(|((from, value), to)| self.convert(value, from, to))
            .collect())
    }

    fn convert(&mut self, value: Value, from: PrimitiveType, to: PrimitiveType) -> Value {
        use PrimitiveType as P;
        if from == to {
            return value;
        }
        if from == P::Boolean {
            let int = if to == P::U64 {
                self.builder.ins().uextend(types::I64, value)
            } else {
                self.builder.ins().uextend(types::I32, value)
            };
            return if to.is_float() {
                self.builder.ins().fcvt_from_uint(value_type(to), int)
            } else {
                int
            };
        }
        if to == P::Boolean {
            return if from.is_float() {
                let zero = self.zero(from);
                self.builder.ins().fcmp(FloatCC::NotEqual, value, zero)
            } else {
                self.builder.ins().icmp_imm(IntCC::NotEqual, value, 0)
            };
        }
        let ins = self.builder.ins();
        match (from, to) {
            (P::F32, P::F64) => ins.fpromote(types::F64, value),
            (P::F64, P::F32) => ins.fdemote(types::F32, value),
            (f, P::I32) if f.is_float() => ins.fcvt_to_sint_sat(types::I32, value),
            (f, t) if f.is_float() => ins.fcvt_to_uint_sat(value_type(t), value),
            (P::I32, t) if t.is_float() => ins.fcvt_from_sint(value_type(t), value),
            (_, t) if t.is_float() => ins.fcvt_from_uint(value_type(t), value),
            (P::I32, P::U64) => ins.sextend(types::I64, value),
            (_, P::U64) => ins.uextend(types::I64, value),
            (P::U64, _) => ins.ireduce(types::I32, value),
            _ => value,
        }
    }

    fn call(&mut self, index: Index, call: &Call) -> Result<Vec<Value>, BackendError> {
        let unit = self.unit;
        let callee = unit
            .function(call.callee)
            .ok_or(LinkError::UnknownCallable(call.callee))?;
        let id = *self
            .ids
            .get(&call.callee)
            .ok_or(LinkError::UnknownCallable(call.callee))?;
        let parameters = callee
            .args
            .iter()
            .map(|ty| unit.resolve(callee.id, ty))
            .collect::<Result<Vec<_>, _>>()?;
        let packed = Layout::concat(unit, &parameters)?;
        let returns = Layout::of(unit, &unit.resolve(callee.id, &callee.returns)?)?;

        let mut values = Vec::new();
        for item in self.function.buffer.expand_list(call.args)? {
            values.extend(self.value(item)?);
        }
        if values.len() != packed.scalars.len() {
            return Err(self
                .function
                .buffer
                .structural_error(format!(
                    "call at {index} passes {} components to `{}`, which takes {}",
                    values.len(),
                    callee.name,
                    packed.scalars.len()
                ))
                .into());
        }

        let pointer = self.module.target_config().pointer_type();
        let args = self.stack(packed.size);
        let result = self.stack(returns.size);
        let args = self.builder.ins().stack_addr(pointer, args, 0);
        let result = self.builder.ins().stack_addr(pointer, result, 0);
        packed.store(&mut self.builder, args, 0, &values);
        let target = self.module.declare_func_in_func(id, self.builder.func);
        self.builder.ins().call(target, &[args, result]);
        Ok(returns.load(&mut self.builder, result, 0))
    }

    fn stack(&mut self, size: u32) -> ir::StackSlot {
        self.builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            size.max(8),
            3,
        ))
    }
}

/// Common width of operands where single components broadcast.
fn broadcast_width(widths: &[usize]) -> Option<usize> {
    let width = widths.iter().copied().max()?;
    widths
        .iter()
        .all(|&w| w == 1 || w == width)
        .then_some(width)
}

fn lane(values: &[Value], k: usize) -> Value {
    if values.len() == 1 { values[0] } else { values[k] }
}

fn unsupported_intrinsic(code: IntrinsicCode) -> BackendError {
    BackendError::Unsupported(format!("intrinsic `{code}` has no native counterpart"))
}

fn float_condition(code: OperationCode) -> FloatCC {
    match code {
        OperationCode::Equals => FloatCC::Equal,
        OperationCode::NotEquals => FloatCC::NotEqual,
        OperationCode::Less => FloatCC::LessThan,
        OperationCode::LessEqual => FloatCC::LessThanOrEqual,
        OperationCode::Greater => FloatCC::GreaterThan,
        _ => FloatCC::GreaterThanOrEqual,
    }
}

fn int_condition(code: OperationCode, signed: bool) -> IntCC {
    match (code, signed) {
        (OperationCode::Equals, _) => IntCC::Equal,
        (OperationCode::NotEquals, _) => IntCC::NotEqual,
        (OperationCode::Less, true) => IntCC::SignedLessThan,
        (OperationCode::Less, false) => IntCC::UnsignedLessThan,
        (OperationCode::LessEqual, true) => IntCC::SignedLessThanOrEqual,
        (OperationCode::LessEqual, false) => IntCC::UnsignedLessThanOrEqual,
        (OperationCode::Greater, true) => IntCC::SignedGreaterThan,
        (OperationCode::Greater, false) => IntCC::UnsignedGreaterThan,
        (_, true) => IntCC::SignedGreaterThanOrEqual,
        (_, false) => IntCC::UnsignedGreaterThanOrEqual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcasting() {
        assert_eq!(broadcast_width(&[3, 1]), Some(3));
        assert_eq!(broadcast_width(&[1, 1]), Some(1));
        assert_eq!(broadcast_width(&[2, 3]), None);
    }

    #[test]
    fn conditions() {
        assert_eq!(float_condition(OperationCode::Less), FloatCC::LessThan);
        assert_eq!(
            int_condition(OperationCode::Less, false),
            IntCC::UnsignedLessThan
        );
        assert_eq!(
            int_condition(OperationCode::GreaterEqual, true),
            IntCC::SignedGreaterThanOrEqual
        );
    }
}
