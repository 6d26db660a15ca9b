//! Functions: a buffer with its signature.

use std::fmt;

use crate::atom::Atom;
use crate::buffer::Buffer;
use crate::codes::QualifierKind;
use crate::error::IrError;
use crate::index::Index;
use crate::types::QualifiedType;

/// Identifier of a traced function, stable across a [`Context`](crate::Context).
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct CallableId(pub u32);

impl fmt::Display for CallableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A function ready for linking: its buffer is analyzed and marked, and
/// the signature is derived from the buffer.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub id: CallableId,
    pub buffer: Buffer,
    /// Type of the returned value; `Nil` for procedures.
    pub returns: QualifiedType,
    /// Positional parameter types, from the `parameter` qualifiers.
    pub args: Vec<QualifiedType>,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        id: CallableId,
        buffer: Buffer,
    ) -> Result<Self, IrError> {
        let mut function = Self {
            name: name.into(),
            id,
            buffer,
            returns: QualifiedType::Nil,
            args: Vec::new(),
        };
        function.prepare()?;
        Ok(function)
    }

    /// Re-runs analysis and marking, then re-derives the signature. Call
    /// after replacing the buffer.
    pub fn prepare(&mut self) -> Result<(), IrError> {
        self.buffer.validate()?;
        if self.buffer.is_empty() {
            self.returns = QualifiedType::Nil;
            self.args.clear();
            return Ok(());
        }
        self.buffer.analyze()?;
        self.buffer.mark()?;
        self.args = self.derive_args()?;
        self.returns = self.derive_returns()?;
        Ok(())
    }

    /// Parameter qualifiers as `(atom, position)`, sorted by position.
    pub fn parameters(&self) -> Vec<(Index, usize)> {
        let mut params: Vec<(Index, usize)> = self
            .buffer
            .iter()
            .filter_map(|(index, atom)| match atom {
                Atom::Qualifier(q) if q.kind == QualifierKind::Parameter => {
                    Some((index, q.numerical.max(0) as usize))
                }
                _ => None,
            })
            .collect();
        params.sort_by_key(|&(_, position)| position);
        params
    }

    fn derive_args(&self) -> Result<Vec<QualifiedType>, IrError> {
        let mut args = Vec::new();
        for (expected, (index, position)) in self.parameters().into_iter().enumerate() {
            if position != expected {
                return Err(self.buffer.structural_error(format!(
                    "parameter {index} of `{}` has position {position}, expected {expected}",
                    self.name
                )));
            }
            args.push(self.buffer.type_of(index)?);
        }
        Ok(args)
    }

    fn derive_returns(&self) -> Result<QualifiedType, IrError> {
        let mut returns: Option<QualifiedType> = None;
        for (index, atom) in self.buffer.iter() {
            let Atom::Return(r) = atom else { continue };
            let ty = self.buffer.type_of(r.value)?.bare();
            match &returns {
                Some(previous) if *previous != ty => {
                    return Err(self.buffer.structural_error(format!(
                        "return at {index} of `{}` yields {ty}, earlier returns yield {previous}",
                        self.name
                    )));
                }
                Some(_) => {}
                None => returns = Some(ty),
            }
        }
        Ok(returns.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{Operation, Qualifier, Return, TypeInformation};
    use crate::codes::OperationCode;
    use crate::types::PrimitiveType;

    fn ty(b: &mut Buffer, p: PrimitiveType) -> Index {
        b.emit(TypeInformation {
            item: p,
            down: Index::NULL,
            next: Index::NULL,
        })
    }

    #[test]
    fn signature_from_buffer() {
        let mut b = Buffer::new();
        let vec3 = ty(&mut b, PrimitiveType::Vec3);
        let f32 = ty(&mut b, PrimitiveType::F32);
        let s = b.emit(Qualifier {
            underlying: f32,
            numerical: 1,
            kind: QualifierKind::Parameter,
        });
        let a = b.emit(Qualifier {
            underlying: vec3,
            numerical: 0,
            kind: QualifierKind::Parameter,
        });
        let sum = b.emit(Operation {
            a,
            b: s,
            code: OperationCode::Addition,
        });
        b.emit(Return { value: sum });

        let f = Function::new("f", CallableId(0), b).unwrap();
        assert_eq!(
            f.args,
            vec![
                QualifiedType::primitive(PrimitiveType::Vec3),
                QualifiedType::primitive(PrimitiveType::F32)
            ]
        );
        assert_eq!(f.returns, QualifiedType::primitive(PrimitiveType::Vec3));
        assert_eq!(f.parameters()[0].0, a);
    }

    #[test]
    fn missing_parameter_position() {
        let mut b = Buffer::new();
        let f32 = ty(&mut b, PrimitiveType::F32);
        b.emit(Qualifier {
            underlying: f32,
            numerical: 1,
            kind: QualifierKind::Parameter,
        });
        assert!(Function::new("g", CallableId(1), b).is_err());
    }

    #[test]
    fn procedure_returns_nil() {
        let mut b = Buffer::new();
        b.emit(Return { value: Index::NULL });
        let f = Function::new("main", CallableId(2), b).unwrap();
        assert!(f.returns.is_nil());
        assert!(f.args.is_empty());
    }
}
