//! Semantic type analysis.
//!
//! [`TypeAnalyzer::type_of`] infers the [`QualifiedType`] of an atom from
//! its operands, memoizing every result. Operators and intrinsics resolve
//! through [`crate::overload`].

use std::collections::BTreeMap;

use crate::atom::{Atom, Qualifier, TypeInformation};
use crate::buffer::{Buffer, Decoration};
use crate::codes::{ConstructorMode, QualifierKind};
use crate::error::IrError;
use crate::index::Index;
use crate::overload;
use crate::types::{
    ArrayType, BufferReferenceType, ImageType, PlainDataType, PrimitiveType, QualifiedType,
    SamplerType, StructFieldType,
};

/// Types of every atom plus name hints to copy onto struct chain heads.
pub type Analysis = (Vec<QualifiedType>, BTreeMap<Index, Decoration>);

/// Analyzes a whole buffer.
pub fn analyze(buffer: &Buffer) -> Result<Analysis, IrError> {
    let mut analyzer = TypeAnalyzer::new(buffer);
    let mut types = Vec::with_capacity(buffer.len());
    for (index, _) in buffer.iter() {
        types.push(analyzer.type_of(index)?);
    }
    Ok((types, analyzer.hints))
}

/// Field nodes of the struct whose chain starts at `head`, in order.
///
/// A chain is a run of `TypeInformation` nodes linked through `next` and
/// closed by a nil marker node.
pub fn field_chain(buffer: &Buffer, head: Index) -> Result<Vec<Index>, IrError> {
    let mut fields = Vec::new();
    let mut cursor = head;
    loop {
        let node = match buffer.atom(cursor)? {
            Atom::TypeInformation(t) => t,
            other => {
                return Err(buffer.structural_error(format!(
                    "field chain reaches {} at {cursor}",
                    other.kind_name()
                )));
            }
        };
        if node.next.is_null() {
            if node.item != PrimitiveType::Nil || !node.down.is_null() {
                return Err(buffer.structural_error(format!(
                    "field chain starting at {head} is not terminated by a nil marker"
                )));
            }
            break;
        }
        if node.next >= cursor {
            return Err(buffer.structural_error(format!(
                "field {cursor} links forward to {}",
                node.next
            )));
        }
        fields.push(cursor);
        cursor = node.next;
    }
    if fields.is_empty() {
        return Err(buffer.structural_error(format!("struct at {head} has no fields")));
    }
    Ok(fields)
}

/// Memoized per-atom type inference over one buffer.
pub struct TypeAnalyzer<'a> {
    buffer: &'a Buffer,
    cache: Vec<Option<QualifiedType>>,
    active: Vec<bool>,
    hints: BTreeMap<Index, Decoration>,
}

impl<'a> TypeAnalyzer<'a> {
    pub fn new(buffer: &'a Buffer) -> Self {
        Self {
            buffer,
            cache: vec![None; buffer.len()],
            active: vec![false; buffer.len()],
            hints: BTreeMap::new(),
        }
    }

    /// Type of the atom at `index`; null is `Nil`.
    pub fn type_of(&mut self, index: Index) -> Result<QualifiedType, IrError> {
        let Some(position) = index.get() else {
            return Ok(QualifiedType::Nil);
        };
        if position >= self.cache.len() {
            return Err(self
                .buffer
                .structural_error(format!("index {index} does not resolve")));
        }
        if let Some(ty) = &self.cache[position] {
            return Ok(ty.clone());
        }
        if self.active[position] {
            return Err(self
                .buffer
                .structural_error(format!("type of {index} depends on itself")));
        }
        self.active[position] = true;
        let ty = self.infer(index);
        self.active[position] = false;
        let ty = ty?;
        self.propagate_hint(index, &ty);
        self.cache[position] = Some(ty.clone());
        Ok(ty)
    }

    /// Copies a decoration on a binding or struct node to the chain head.
    fn propagate_hint(&mut self, index: Index, ty: &QualifiedType) {
        let Some(decoration) = self.buffer.decoration(index) else {
            return;
        };
        if let Some(head) = ty.concrete() {
            if head != index && self.buffer.decoration(head).is_none() {
                self.hints.entry(head).or_insert_with(|| decoration.clone());
            }
        }
    }

    fn plain(&self, ty: QualifiedType, site: Index) -> Result<PlainDataType, IrError> {
        ty.plain_data().ok_or_else(|| {
            self.buffer.structural_error(format!(
                "{site} wraps {ty}; only plain data may be an array or reference base"
            ))
        })
    }

    fn operand_types(&mut self, items: &[Index]) -> Result<Vec<QualifiedType>, IrError> {
        items
            .iter()
            .map(|&i| self.type_of(i).map(|t| t.bare()))
            .collect()
    }

    fn infer(&mut self, index: Index) -> Result<QualifiedType, IrError> {
        let buffer = self.buffer;
        match buffer.atom(index)? {
            Atom::TypeInformation(t) => self.type_information(index, t),
            Atom::Qualifier(q) => self.qualifier(index, q),
            Atom::Primitive(p) => Ok(QualifiedType::primitive(p.value.ty())),
            Atom::Swizzle(s) => {
                let source = self.type_of(s.src)?.bare();
                let vector = source
                    .primitive_type()
                    .filter(|p| p.is_vector() && s.code.max_component() < p.components())
                    .ok_or_else(|| {
                        buffer.structural_error(format!(
                            "swizzle {} at {index} applied to {source}",
                            s.code
                        ))
                    })?;
                let result = PrimitiveType::vector(vector.scalar(), s.code.components().len())
                    .unwrap_or(vector);
                Ok(QualifiedType::primitive(result))
            }
            Atom::Operation(o) => {
                let operands: Vec<Index> = [o.a, o.b].into_iter().filter(|i| !i.is_null()).collect();
                let args = self.operand_types(&operands)?;
                overload::lookup_operation(o.code, &args)
            }
            Atom::Intrinsic(i) => {
                let items = buffer.expand_list(i.args)?;
                let args = self.operand_types(&items)?;
                overload::lookup_intrinsic(i.code, &args)
            }
            Atom::Construct(c) => {
                let ty = self.type_of(c.ty)?;
                Ok(match c.mode {
                    ConstructorMode::Transient => ty.bare(),
                    ConstructorMode::Normal => match ty {
                        QualifiedType::StructField(field) => QualifiedType::PlainData(field.base),
                        other => other,
                    },
                })
            }
            Atom::Call(c) => Ok(self.type_of(c.ty)?.bare()),
            Atom::Load(l) => {
                let mut source = self.type_of(l.src)?.bare();
                if let QualifiedType::BufferReference(r) = source {
                    source = QualifiedType::PlainData(r.base);
                }
                if l.idx < 0 {
                    return Ok(source);
                }
                let QualifiedType::PlainData(PlainDataType::Concrete(head)) = source else {
                    return Err(buffer.structural_error(format!(
                        "load of field {} at {index} from non-struct {source}",
                        l.idx
                    )));
                };
                let fields = field_chain(buffer, head)?;
                let field = fields.get(l.idx as usize).copied().ok_or_else(|| {
                    buffer.structural_error(format!(
                        "load of field {} at {index} from a struct with {} fields",
                        l.idx,
                        fields.len()
                    ))
                })?;
                Ok(self.type_of(field)?.bare())
            }
            Atom::ArrayAccess(a) => {
                let mut source = self.type_of(a.src)?.bare();
                loop {
                    source = match source {
                        QualifiedType::BufferReference(r) => QualifiedType::PlainData(r.base),
                        QualifiedType::Array(array) => return Ok(QualifiedType::PlainData(array.base)),
                        QualifiedType::Sampler(_) | QualifiedType::Image(_) => return Ok(source),
                        QualifiedType::PlainData(PlainDataType::Primitive(p)) if p.is_matrix() => {
                            return Ok(QualifiedType::primitive(p.matrix_column().unwrap_or(p)));
                        }
                        QualifiedType::PlainData(PlainDataType::Primitive(p)) if p.is_vector() => {
                            return Ok(QualifiedType::primitive(p.scalar()));
                        }
                        other => {
                            return Err(buffer.structural_error(format!(
                                "array access at {index} into {other}"
                            )));
                        }
                    }
                }
            }
            Atom::List(_) | Atom::Store(_) | Atom::Branch(_) | Atom::Return(_) => {
                Ok(QualifiedType::Nil)
            }
        }
    }

    fn type_information(
        &mut self,
        index: Index,
        t: &TypeInformation,
    ) -> Result<QualifiedType, IrError> {
        let base = if t.down.is_null() {
            PlainDataType::Primitive(t.item)
        } else if t.item == PrimitiveType::Nil {
            field_chain(self.buffer, t.down)?;
            PlainDataType::Concrete(t.down)
        } else {
            return Err(self.buffer.structural_error(format!(
                "type node {index} is both {} and a nested struct",
                t.item
            )));
        };
        if t.next.is_null() {
            return Ok(QualifiedType::PlainData(base));
        }
        match self.buffer.atom(t.next)? {
            Atom::TypeInformation(_) => {}
            other => {
                return Err(self.buffer.structural_error(format!(
                    "field {index} links to {} instead of a type node",
                    other.kind_name()
                )));
            }
        }
        self.type_of(t.next)?;
        Ok(QualifiedType::StructField(StructFieldType {
            base,
            next: t.next,
        }))
    }

    fn qualifier(&mut self, index: Index, q: &Qualifier) -> Result<QualifiedType, IrError> {
        use QualifierKind as K;

        if let Some((result, dimension)) = q.kind.image_info() {
            return Ok(QualifiedType::Image(ImageType { result, dimension }));
        }
        if let Some((result, dimension)) = q.kind.sampler_info() {
            return Ok(QualifiedType::Sampler(SamplerType { result, dimension }));
        }
        if let Some((_, ty)) = q.kind.builtin() {
            return Ok(QualifiedType::primitive(ty));
        }

        let underlying = self.type_of(q.underlying)?;
        Ok(match q.kind {
            K::StorageBuffer => match underlying {
                QualifiedType::Array(_) => underlying,
                other => QualifiedType::BufferReference(BufferReferenceType {
                    base: self.plain(other, index)?,
                    id: q.numerical,
                }),
            },
            K::BufferReference => QualifiedType::BufferReference(BufferReferenceType {
                base: self.plain(underlying, index)?,
                id: q.numerical,
            }),
            K::Arrays => match underlying {
                QualifiedType::Sampler(_) | QualifiedType::Image(_) => underlying,
                other => QualifiedType::Array(ArrayType {
                    base: self.plain(other, index)?,
                    size: q.numerical,
                }),
            },
            K::InArg => QualifiedType::InArg(Box::new(underlying)),
            K::OutArg => QualifiedType::OutArg(Box::new(underlying)),
            K::InOutArg => QualifiedType::InOutArg(Box::new(underlying)),
            K::AccelerationStructure => QualifiedType::primitive(PrimitiveType::AccelerationStructure),
            _ => match underlying {
                QualifiedType::StructField(field) => QualifiedType::PlainData(field.base),
                other => other,
            },
        })
    }
}
