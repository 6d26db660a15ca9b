//! Linkage units for Thunder.
//!
//! A [`LinkageUnit`] collects a function and everything it calls, resolves
//! the global resources those functions declare into unit-wide tables,
//! deduplicates their struct types into [`Aggregate`]s and orders the
//! functions so that callees are generated before callers.

mod aggregate;
mod control;
mod error;
mod globals;
mod order;
mod types;

pub use aggregate::{Aggregate, AggregateKey, Aggregates, Field, TypeMap};
pub use control::{ControlState, MeshShaderSize};
pub use error::LinkError;
pub use globals::{
    BufferBinding, BufferReferenceDecl, Declaration, GlobalRef, Globals, ImageBinding,
    LayoutVariable, Origin, PushConstant, SamplerBinding, SharedVariable, SpecialGlobal,
    SpecialKind,
};
pub use order::callee_first;
pub use types::{DataType, UnitType};

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;

use thunder_ir::{
    Atom, CallableId, Context, Function, Index, IrError, PlainDataType, QualifiedType, Qualifier,
    QualifierKind, dump_function, stream,
};

use globals::define;

/// The closure of one or more functions under calls, with merged global
/// tables. A unit borrows the [`Context`] its call targets resolve in.
#[derive(Debug)]
pub struct LinkageUnit<'a> {
    ctx: &'a Context,
    functions: Vec<Function>,
    aggregates: Aggregates,
    type_maps: BTreeMap<CallableId, TypeMap>,
    dependencies: BTreeMap<CallableId, BTreeSet<CallableId>>,
    uses: BTreeMap<CallableId, BTreeSet<GlobalRef>>,
    globals: Globals,
    control: ControlState,
}

impl<'a> LinkageUnit<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            functions: Vec::new(),
            aggregates: Aggregates::new(),
            type_maps: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            uses: BTreeMap::new(),
            globals: Globals::default(),
            control: ControlState::default(),
        }
    }

    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    /// Adds `function` and, transitively, every function it calls, breadth
    /// first in ascending id order. Adding a function twice has no effect.
    pub fn add(&mut self, function: &Function) -> Result<(), LinkError> {
        let mut pending = VecDeque::from([function.clone()]);
        let mut added = false;
        while let Some(mut next) = pending.pop_front() {
            if self.contains(next.id) {
                continue;
            }
            next.prepare()?;
            let callees = self.process_function(&next)?;
            for &callee in &callees {
                if !self.contains(callee) {
                    let target = self
                        .ctx
                        .function(callee)
                        .ok_or(LinkError::UnknownCallable(callee))?;
                    pending.push_back(target.clone());
                }
            }
            log::debug!(
                "linked `{}` (${}) with {} callee(s)",
                next.name,
                next.id,
                callees.len()
            );
            self.dependencies.insert(next.id, callees);
            self.functions.push(next);
            added = true;
        }
        if added {
            self.sort()?;
        }
        Ok(())
    }

    /// Adds the function registered under `id` in the context.
    pub fn add_callable(&mut self, id: CallableId) -> Result<(), LinkError> {
        let function = self.ctx.function(id).ok_or(LinkError::UnknownCallable(id))?;
        self.add(function)
    }

    pub fn contains(&self, id: CallableId) -> bool {
        self.dependencies.contains_key(&id)
    }

    fn sort(&mut self) -> Result<(), LinkError> {
        let order = callee_first(&self.dependencies).map_err(|stuck| LinkError::Cycle {
            functions: stuck
                .iter()
                .filter_map(|&id| self.function(id).map(|f| f.name.clone()))
                .collect(),
        })?;
        let mut by_id: BTreeMap<CallableId, Function> =
            self.functions.drain(..).map(|f| (f.id, f)).collect();
        self.functions = order.iter().filter_map(|id| by_id.remove(id)).collect();
        Ok(())
    }

    /// Scans a function's atoms once: registers aggregates, records
    /// globals, layout state and call targets. Returns the callees.
    fn process_function(&mut self, function: &Function) -> Result<BTreeSet<CallableId>, LinkError> {
        let buffer = &function.buffer;
        let visible = visible_atoms(function);
        let mut map = TypeMap::new();
        let mut callees = BTreeSet::new();

        for &index in &visible {
            let ty = buffer.type_of(index)?;
            if let Some(head) = ty.concrete() {
                let aggregate = self.aggregates.register(function, head, &mut map)?;
                map.insert(index, aggregate);
            }
            match buffer.atom(index)? {
                Atom::Call(call) => {
                    callees.insert(call.callee);
                }
                Atom::Intrinsic(layout) if layout.code.is_layout() => {
                    self.control.apply(buffer, index, layout)?;
                }
                _ => {}
            }
        }
        self.type_maps.insert(function.id, map);

        let mut uses = BTreeSet::new();
        for &index in &visible {
            if let Atom::Qualifier(q) = buffer.atom(index)? {
                if let Some(global) = self.declare(function, index, q)? {
                    uses.insert(global);
                }
            }
        }
        self.uses.insert(function.id, uses);
        Ok(callees)
    }

    /// Records the global a qualifier declares.
    fn declare(
        &mut self,
        function: &Function,
        index: Index,
        q: &Qualifier,
    ) -> Result<Option<GlobalRef>, LinkError> {
        use QualifierKind as K;

        let buffer = &function.buffer;
        let origin = Origin {
            function: function.id,
            atom: index,
        };
        let kind = q.kind;
        let binding = q.numerical;

        if kind.builtin().is_some() {
            self.globals.builtins.insert(kind);
            return Ok(Some(GlobalRef::Builtin(kind)));
        }
        if let Some(interpolation) = kind.layout_in() {
            let ty = self.resolve(function.id, &buffer.type_of(index)?)?;
            let variable = LayoutVariable {
                ty,
                interpolation,
                origin,
            };
            define(&mut self.globals.inputs, "layout input", binding, variable);
            return Ok(Some(GlobalRef::Input(binding)));
        }
        if let Some(interpolation) = kind.layout_out() {
            let ty = self.resolve(function.id, &buffer.type_of(index)?)?;
            let variable = LayoutVariable {
                ty,
                interpolation,
                origin,
            };
            define(&mut self.globals.outputs, "layout output", binding, variable);
            return Ok(Some(GlobalRef::Output(binding)));
        }
        if let Some(special) = SpecialKind::from_qualifier(kind) {
            let ty = self.resolve(function.id, &buffer.type_of(index)?)?;
            define(
                &mut self.globals.special,
                "special global",
                (special, binding),
                SpecialGlobal { ty, origin },
            );
            return Ok(Some(GlobalRef::Special(special, binding)));
        }
        if let Some((result, dimension)) = kind.sampler_info() {
            let sampler = thunder_ir::SamplerType { result, dimension };
            let declared = SamplerBinding {
                sampler,
                count: None,
                origin,
            };
            define(&mut self.globals.samplers, "sampler", binding, declared);
            return Ok(Some(GlobalRef::Sampler(binding)));
        }
        if let Some((result, dimension)) = kind.image_info() {
            let image = thunder_ir::ImageType { result, dimension };
            let declared = ImageBinding {
                image,
                format: None,
                read_only: false,
                write_only: false,
                count: None,
                origin,
            };
            define(&mut self.globals.images, "image", binding, declared);
            return Ok(Some(GlobalRef::Image(binding)));
        }
        if kind.is_modifier() || kind.format().is_some() {
            let (target, target_binding) = resource_of(function, q.underlying)?;
            match kind.format() {
                Some(format) => match self.globals.images.get_mut(&target_binding) {
                    Some(image) if target.image_info().is_some() => image.format = Some(format),
                    _ => log::warn!("{kind} at {index} does not wrap an image"),
                },
                None => self.globals.apply_modifier(kind, target, target_binding),
            }
            return Ok(None);
        }

        Ok(match kind {
            K::PushConstant => {
                let ty = self.resolve(function.id, &buffer.type_of(q.underlying)?)?;
                self.globals.set_push_constant(PushConstant {
                    ty,
                    offset: binding,
                    origin,
                });
                Some(GlobalRef::PushConstant)
            }
            K::UniformBuffer | K::StorageBuffer => {
                let ty = self.resolve(function.id, &buffer.type_of(q.underlying)?)?;
                let block = BufferBinding {
                    ty,
                    read_only: false,
                    write_only: false,
                    scalar: false,
                    origin,
                };
                if kind == K::UniformBuffer {
                    define(&mut self.globals.uniforms, "uniform buffer", binding, block);
                    Some(GlobalRef::Uniform(binding))
                } else {
                    define(&mut self.globals.buffers, "storage buffer", binding, block);
                    Some(GlobalRef::Buffer(binding))
                }
            }
            K::BufferReference => {
                let base = self
                    .resolve(function.id, &buffer.type_of(q.underlying)?)?
                    .data()
                    .ok_or_else(|| {
                        buffer.structural_error(format!(
                            "buffer reference {index} does not wrap plain data"
                        ))
                    })?;
                let declared = BufferReferenceDecl {
                    base,
                    scalar: false,
                    origin,
                };
                define(
                    &mut self.globals.buffer_references,
                    "buffer reference",
                    binding,
                    declared,
                );
                None
            }
            K::Shared => {
                let ty = self.resolve(function.id, &buffer.type_of(q.underlying)?)?;
                define(
                    &mut self.globals.shared,
                    "shared variable",
                    binding,
                    SharedVariable { ty, origin },
                );
                Some(GlobalRef::Shared(binding))
            }
            K::Arrays => {
                if let Some(Atom::Qualifier(inner)) = buffer.get(q.underlying) {
                    if inner.kind.sampler_info().is_some() || inner.kind.image_info().is_some() {
                        self.globals.resize(inner.kind, inner.numerical, binding);
                    }
                }
                None
            }
            _ => None,
        })
    }

    /// Resolves a function-local type against the unit's aggregates.
    pub fn resolve(&self, function: CallableId, ty: &QualifiedType) -> Result<UnitType, LinkError> {
        let data = |plain: PlainDataType| -> Result<DataType, LinkError> {
            match plain {
                PlainDataType::Primitive(p) => Ok(DataType::Primitive(p)),
                PlainDataType::Concrete(head) => self
                    .aggregate_index(function, head)
                    .map(DataType::Aggregate),
            }
        };
        Ok(match ty.bare() {
            QualifiedType::Nil => UnitType::Nil,
            QualifiedType::PlainData(PlainDataType::Primitive(p)) => UnitType::primitive(p),
            QualifiedType::PlainData(plain) => UnitType::Data(data(plain)?),
            QualifiedType::StructField(field) => UnitType::Data(data(field.base)?),
            QualifiedType::Array(array) => UnitType::Array {
                element: data(array.base)?,
                size: array.size,
            },
            QualifiedType::Image(image) => UnitType::Image(image),
            QualifiedType::Sampler(sampler) => UnitType::Sampler(sampler),
            QualifiedType::BufferReference(reference) => UnitType::BufferReference {
                base: data(reference.base)?,
                id: reference.id,
            },
            QualifiedType::InArg(inner)
            | QualifiedType::OutArg(inner)
            | QualifiedType::InOutArg(inner) => self.resolve(function, &inner)?,
        })
    }

    /// Aggregate registered for `index` (a chain head or a struct-typed
    /// atom) of `function`.
    pub fn aggregate_index(&self, function: CallableId, index: Index) -> Result<usize, LinkError> {
        self.type_maps
            .get(&function)
            .and_then(|map| map.get(&index))
            .copied()
            .ok_or(LinkError::MissingAggregate { function, index })
    }

    pub fn aggregate(&self, index: usize) -> Option<&Aggregate> {
        self.aggregates.get(index)
    }

    /// Functions in generation order: callees before callers.
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function(&self, id: CallableId) -> Option<&Function> {
        self.functions.iter().find(|f| f.id == id)
    }

    /// Name a function is emitted under. Functions sharing a name are
    /// told apart by their id.
    pub fn symbol(&self, id: CallableId) -> Option<String> {
        let function = self.function(id)?;
        let shared = self
            .functions
            .iter()
            .filter(|f| f.name == function.name)
            .count()
            > 1;
        Some(if shared {
            format!("{}_{}", function.name, id)
        } else {
            function.name.clone()
        })
    }

    pub fn aggregates(&self) -> &Aggregates {
        &self.aggregates
    }

    pub fn type_map(&self, function: CallableId) -> Option<&TypeMap> {
        self.type_maps.get(&function)
    }

    pub fn dependencies(&self) -> &BTreeMap<CallableId, BTreeSet<CallableId>> {
        &self.dependencies
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn control(&self) -> &ControlState {
        &self.control
    }

    /// Globals touched by `function` or anything it calls.
    pub fn globals_used(&self, function: CallableId) -> BTreeSet<GlobalRef> {
        let mut used = BTreeSet::new();
        let mut seen = BTreeSet::new();
        let mut stack = vec![function];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(direct) = self.uses.get(&id) {
                used.extend(direct.iter().copied());
            }
            if let Some(callees) = self.dependencies.get(&id) {
                stack.extend(callees.iter().copied());
            }
        }
        used
    }

    /// Binary function stream of the unit, in generation order.
    pub fn write_stream(&self) -> Vec<u8> {
        stream::write_functions(&self.functions)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), LinkError> {
        std::fs::write(path, self.write_stream())?;
        Ok(())
    }

    /// Assembly listing of every function in the unit.
    pub fn write_assembly(&self) -> String {
        self.functions
            .iter()
            .map(dump_function)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Loads a function stream written by [`LinkageUnit::write`].
    pub fn read(path: impl AsRef<Path>) -> Result<Context, LinkError> {
        let bytes = std::fs::read(path)?;
        Self::read_stream(&bytes)
    }

    pub fn read_stream(bytes: &[u8]) -> Result<Context, LinkError> {
        let mut ctx = Context::new();
        for function in stream::read_functions(bytes)? {
            ctx.insert(function);
        }
        Ok(ctx)
    }
}

/// Marked atoms plus every atom they reach through operands: everything a
/// generator may print, either as a statement or inlined.
fn visible_atoms(function: &Function) -> BTreeSet<Index> {
    let buffer = &function.buffer;
    let mut visible: BTreeSet<Index> = buffer.marked().clone();
    for position in (0..buffer.len()).rev() {
        let index = Index::new(position);
        if !visible.contains(&index) {
            continue;
        }
        if let Some(atom) = buffer.get(index) {
            visible.extend(atom.operands());
        }
    }
    visible
}

/// Follows modifier, format and array qualifiers down to the resource
/// qualifier they wrap.
fn resource_of(function: &Function, mut at: Index) -> Result<(QualifierKind, i32), IrError> {
    let buffer = &function.buffer;
    loop {
        match buffer.atom(at)? {
            Atom::Qualifier(q)
                if q.kind.is_modifier() || q.kind.format().is_some() || q.kind == QualifierKind::Arrays =>
            {
                at = q.underlying;
            }
            Atom::Qualifier(q) => return Ok((q.kind, q.numerical)),
            other => {
                return Err(buffer.structural_error(format!(
                    "modifier wraps {} at {at} instead of a resource",
                    other.kind_name()
                )));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use thunder_ir::{
        Buffer, Call, CallableId, Construct, ConstructorMode, Index, PrimitiveType, Qualifier,
        QualifierKind, Return, TypeInformation,
    };

    pub fn ty(b: &mut Buffer, p: PrimitiveType) -> Index {
        b.emit(TypeInformation {
            item: p,
            down: Index::NULL,
            next: Index::NULL,
        })
    }

    pub fn qualifier(b: &mut Buffer, kind: QualifierKind, underlying: Index, numerical: i32) -> Index {
        b.emit(Qualifier {
            underlying,
            numerical,
            kind,
        })
    }

    pub fn param(b: &mut Buffer, p: PrimitiveType, n: i32) -> Index {
        let t = ty(b, p);
        qualifier(b, QualifierKind::Parameter, t, n)
    }

    /// Struct node for a struct with primitive fields.
    pub fn struct_type(b: &mut Buffer, fields: &[PrimitiveType]) -> Index {
        let mut next = ty(b, PrimitiveType::Nil);
        for &item in fields.iter().rev() {
            next = b.emit(TypeInformation {
                item,
                down: Index::NULL,
                next,
            });
        }
        b.emit(TypeInformation {
            item: PrimitiveType::Nil,
            down: next,
            next: Index::NULL,
        })
    }

    /// Struct node for `{ inner; tail }`.
    pub fn nested_struct_type(b: &mut Buffer, inner_head: Index, tail: PrimitiveType) -> Index {
        let end = ty(b, PrimitiveType::Nil);
        let last = b.emit(TypeInformation {
            item: tail,
            down: Index::NULL,
            next: end,
        });
        let first = b.emit(TypeInformation {
            item: PrimitiveType::Nil,
            down: inner_head,
            next: last,
        });
        b.emit(TypeInformation {
            item: PrimitiveType::Nil,
            down: first,
            next: Index::NULL,
        })
    }

    pub fn construct(b: &mut Buffer, ty: Index) -> Index {
        b.emit(Construct {
            ty,
            args: Index::NULL,
            mode: ConstructorMode::Normal,
        })
    }

    /// A procedure that calls each of `callees` once.
    pub fn caller(callees: &[CallableId]) -> Buffer {
        let mut b = Buffer::new();
        for &callee in callees {
            b.emit(Call {
                callee,
                ty: Index::NULL,
                args: Index::NULL,
            });
        }
        b.emit(Return { value: Index::NULL });
        b
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use thunder_ir::{
        ArrayAccess, Buffer, Decoration, Intrinsic, IntrinsicCode, List, Load, Primitive,
        PrimitiveType, PrimitiveValue, Return, Store,
    };

    fn names<'u>(unit: &'u LinkageUnit<'_>) -> Vec<&'u str> {
        unit.functions().iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn closes_call_graph_callee_first() {
        let mut ctx = Context::new();
        let leaf = ctx.register("leaf", caller(&[])).unwrap();
        let middle = ctx.register("middle", caller(&[leaf])).unwrap();
        let top = ctx.register("top", caller(&[middle, leaf])).unwrap();
        let unused = ctx.register("unused", caller(&[])).unwrap();

        let mut unit = LinkageUnit::new(&ctx);
        unit.add_callable(top).unwrap();
        assert_eq!(names(&unit), ["leaf", "middle", "top"]);
        assert!(!unit.contains(unused));
        assert_eq!(unit.dependencies()[&top], BTreeSet::from([middle, leaf]));

        // Memoized by id.
        unit.add_callable(middle).unwrap();
        assert_eq!(unit.functions().len(), 3);
    }

    #[test]
    fn cycles_are_rejected() {
        let mut ctx = Context::new();
        let f = ctx.next_callable_id();
        let g = ctx.next_callable_id();
        ctx.insert(Function::new("f", f, caller(&[g])).unwrap());
        ctx.insert(Function::new("g", g, caller(&[f])).unwrap());

        let mut unit = LinkageUnit::new(&ctx);
        match unit.add_callable(f) {
            Err(LinkError::Cycle { functions }) => assert_eq!(functions, ["f", "g"]),
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn unknown_callee() {
        let mut ctx = Context::new();
        let f = ctx.register("f", caller(&[CallableId(40)])).unwrap();
        let mut unit = LinkageUnit::new(&ctx);
        assert!(matches!(
            unit.add_callable(f),
            Err(LinkError::UnknownCallable(CallableId(40)))
        ));
    }

    #[test]
    fn duplicate_names_get_distinct_symbols() {
        let mut ctx = Context::new();
        let a = ctx.register("helper", caller(&[])).unwrap();
        let b = ctx.register("helper", caller(&[])).unwrap();
        let top = ctx.register("top", caller(&[a, b])).unwrap();
        let mut unit = LinkageUnit::new(&ctx);
        unit.add_callable(top).unwrap();
        assert_eq!(unit.symbol(a).unwrap(), "helper_0");
        assert_eq!(unit.symbol(b).unwrap(), "helper_1");
        assert_eq!(unit.symbol(top).unwrap(), "top");
    }

    /// Stores `value` into element `i` of the runtime array in storage
    /// buffer `binding`.
    fn buffer_writer(binding: i32, element: PrimitiveType, read_only: bool) -> Buffer {
        let mut b = Buffer::new();
        let t = ty(&mut b, element);
        let array = qualifier(&mut b, QualifierKind::Arrays, t, -1);
        let mut block = qualifier(&mut b, QualifierKind::StorageBuffer, array, binding);
        if read_only {
            block = qualifier(&mut b, QualifierKind::ReadOnly, block, 0);
        }
        let i = param(&mut b, PrimitiveType::I32, 0);
        let slot = b.emit(ArrayAccess { src: block, loc: i });
        let zero = b.emit(Primitive {
            value: PrimitiveValue::F32(0.0),
        });
        b.emit(Store { dst: slot, src: zero });
        b
    }

    #[test]
    fn storage_buffers_and_modifiers() {
        let mut ctx = Context::new();
        let f = ctx
            .register("fill", buffer_writer(3, PrimitiveType::F32, true))
            .unwrap();
        let mut unit = LinkageUnit::new(&ctx);
        unit.add_callable(f).unwrap();

        let block = &unit.globals().buffers[&3];
        assert_eq!(
            block.ty,
            UnitType::Array {
                element: DataType::Primitive(PrimitiveType::F32),
                size: -1
            }
        );
        assert!(block.read_only);
        assert!(unit.globals_used(f).contains(&GlobalRef::Buffer(3)));
    }

    #[test]
    fn conflicting_buffers_last_writer_wins() {
        let mut ctx = Context::new();
        let a = ctx
            .register("a", buffer_writer(0, PrimitiveType::F32, false))
            .unwrap();
        let b = ctx
            .register("b", buffer_writer(0, PrimitiveType::U32, false))
            .unwrap();
        let top = ctx.register("top", caller(&[a, b])).unwrap();
        let mut unit = LinkageUnit::new(&ctx);
        unit.add_callable(top).unwrap();

        let block = &unit.globals().buffers[&0];
        assert_eq!(unit.globals().buffers.len(), 1);
        assert!(matches!(
            block.ty,
            UnitType::Array {
                element: DataType::Primitive(PrimitiveType::U32),
                ..
            }
        ));
        // The caller reaches the buffer through both callees.
        assert_eq!(
            unit.globals_used(top),
            BTreeSet::from([GlobalRef::Buffer(0)])
        );
    }

    #[test]
    fn sampler_arrays_and_layout_io() {
        let mut b = Buffer::new();
        let sampler = qualifier(&mut b, QualifierKind::Sampler2D, Index::NULL, 1);
        let samplers = qualifier(&mut b, QualifierKind::Arrays, sampler, 8);
        let which = param(&mut b, PrimitiveType::I32, 0);
        let chosen = b.emit(ArrayAccess {
            src: samplers,
            loc: which,
        });
        let vec2 = ty(&mut b, PrimitiveType::Vec2);
        let uv = qualifier(&mut b, QualifierKind::LayoutInSmooth, vec2, 0);
        let tail = b.emit(List {
            item: uv,
            next: Index::NULL,
        });
        let args = b.emit(List {
            item: chosen,
            next: tail,
        });
        let color = b.emit(Intrinsic {
            args,
            code: IntrinsicCode::Texture,
        });
        let vec4 = ty(&mut b, PrimitiveType::Vec4);
        let out = qualifier(&mut b, QualifierKind::LayoutOutFlat, vec4, 0);
        b.emit(Store { dst: out, src: color });

        let mut ctx = Context::new();
        let id = ctx.register("shade", b).unwrap();
        let mut unit = LinkageUnit::new(&ctx);
        unit.add_callable(id).unwrap();

        let globals = unit.globals();
        assert_eq!(globals.samplers[&1].count, Some(8));
        assert_eq!(globals.samplers[&1].sampler.dimension, 2);
        assert_eq!(
            globals.inputs[&0].ty,
            UnitType::primitive(PrimitiveType::Vec2)
        );
        assert_eq!(
            globals.outputs[&0].interpolation,
            thunder_ir::Interpolation::Flat
        );
    }

    #[test]
    fn builtins_and_local_size() {
        let mut b = Buffer::new();
        let x = b.emit(Primitive {
            value: PrimitiveValue::U32(64),
        });
        let args = b.emit(List {
            item: x,
            next: Index::NULL,
        });
        b.emit(Intrinsic {
            args,
            code: IntrinsicCode::LayoutLocalSize,
        });
        let gid = qualifier(&mut b, QualifierKind::GlGlobalInvocationId, Index::NULL, 0);
        let vec = ty(&mut b, PrimitiveType::UVec3);
        let out = qualifier(&mut b, QualifierKind::Shared, vec, 0);
        b.emit(Store { dst: out, src: gid });

        let mut ctx = Context::new();
        let id = ctx.register("kernel", b).unwrap();
        let mut unit = LinkageUnit::new(&ctx);
        unit.add_callable(id).unwrap();

        assert_eq!(unit.control().local_size, Some([64, 1, 1]));
        assert!(
            unit.globals()
                .builtins
                .contains(&QualifierKind::GlGlobalInvocationId)
        );
        assert_eq!(
            unit.globals().shared[&0].ty,
            UnitType::primitive(PrimitiveType::UVec3)
        );
    }

    #[test]
    fn local_size_mixes_signedness() {
        let mut b = Buffer::new();
        let sizes = [
            PrimitiveValue::U32(8),
            PrimitiveValue::I32(4),
            PrimitiveValue::U32(2),
        ];
        let items: Vec<Index> = sizes
            .into_iter()
            .map(|value| b.emit(Primitive { value }))
            .collect();
        let mut args = Index::NULL;
        for &item in items.iter().rev() {
            args = b.emit(List { item, next: args });
        }
        b.emit(Intrinsic {
            args,
            code: IntrinsicCode::LayoutLocalSize,
        });

        let mut ctx = Context::new();
        let id = ctx.register("kernel", b).unwrap();
        let mut unit = LinkageUnit::new(&ctx);
        unit.add_callable(id).unwrap();
        assert_eq!(unit.control().local_size, Some([8, 4, 2]));
    }

    /// Returns field 1 of a struct `{ vec3 position; f32 power }` read from
    /// uniform buffer 0.
    fn light_reader() -> Buffer {
        let mut b = Buffer::new();
        let node = struct_type(&mut b, &[PrimitiveType::Vec3, PrimitiveType::F32]);
        b.decorate(
            node,
            Decoration::new("Light").with_fields(["position", "power"]),
        );
        let block = qualifier(&mut b, QualifierKind::UniformBuffer, node, 0);
        let whole = b.emit(Load {
            src: block,
            idx: -1,
        });
        let power = b.emit(Load { src: whole, idx: 1 });
        b.emit(Return { value: power });
        b
    }

    #[test]
    fn aggregates_are_shared_across_functions() {
        let mut ctx = Context::new();
        let a = ctx.register("a", light_reader()).unwrap();
        let b = ctx.register("b", light_reader()).unwrap();
        let top = ctx.register("top", caller(&[a, b])).unwrap();
        let mut unit = LinkageUnit::new(&ctx);
        unit.add_callable(top).unwrap();

        assert_eq!(unit.aggregates().len(), 1);
        let light = unit.aggregate(0).unwrap();
        assert_eq!(light.name, "Light");
        assert_eq!(unit.globals().uniforms[&0].ty, UnitType::Data(DataType::Aggregate(0)));
    }

    #[test]
    fn resolve_reports_missing_aggregates() {
        let ctx = Context::new();
        let unit = LinkageUnit::new(&ctx);
        let ty = QualifiedType::plain(PlainDataType::Concrete(Index::new(4)));
        assert!(matches!(
            unit.resolve(CallableId(0), &ty),
            Err(LinkError::MissingAggregate { .. })
        ));
        assert_eq!(
            unit.resolve(CallableId(0), &QualifiedType::primitive(PrimitiveType::F32))
                .unwrap(),
            UnitType::primitive(PrimitiveType::F32)
        );
    }

    #[test]
    fn stream_round_trip_in_memory() {
        let mut ctx = Context::new();
        let leaf = ctx.register("leaf", caller(&[])).unwrap();
        let top = ctx.register("top", caller(&[leaf])).unwrap();
        let mut unit = LinkageUnit::new(&ctx);
        unit.add_callable(top).unwrap();

        let loaded = LinkageUnit::read_stream(&unit.write_stream()).unwrap();
        assert_eq!(loaded.len(), 2);
        for function in unit.functions() {
            let back = loaded.function(function.id).unwrap();
            assert_eq!(back.name, function.name);
            assert_eq!(back.buffer, function.buffer);
        }
        assert!(unit.write_assembly().contains("top.1:"));
    }
}
