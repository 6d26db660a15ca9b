//! Liveness marking.
//!
//! The marked set is what a code generator must see: statements (roots,
//! synthesized snapshots, local variables) and declarations (qualifiers,
//! type nodes, layout intrinsics). Pure sub-expressions reached from a
//! marked atom are walked so that everything they depend on is declared,
//! but they stay unmarked and are inlined at each use.

use std::collections::{BTreeSet, HashSet};

use crate::atom::Atom;
use crate::buffer::Buffer;
use crate::codes::{ConstructorMode, QualifierKind};
use crate::error::IrError;
use crate::index::Index;
use crate::types::QualifiedType;

/// Computes the liveness set of a buffer.
pub fn mark(buffer: &Buffer) -> Result<BTreeSet<Index>, IrError> {
    let mut liveness = Liveness::new(buffer);
    for (index, atom) in buffer.iter() {
        if is_root(buffer, index, atom)? {
            liveness.force(index)?;
        }
    }
    Ok(liveness.marked)
}

/// Atoms that are live regardless of their uses.
pub fn is_root(buffer: &Buffer, index: Index, atom: &Atom) -> Result<bool, IrError> {
    if buffer.is_synthesized(index) {
        return Ok(true);
    }
    Ok(match atom {
        Atom::Store(_) | Atom::Return(_) | Atom::Branch(_) | Atom::Call(_) => true,
        Atom::Intrinsic(i) => i.code.is_side_effect() || i.code.is_layout(),
        Atom::Qualifier(q) => matches!(
            q.kind,
            QualifierKind::Parameter | QualifierKind::AccelerationStructure
        ),
        Atom::Construct(_) => matches!(
            buffer.type_of(index)?,
            QualifiedType::BufferReference(_)
        ),
        _ => false,
    })
}

/// The storage an lvalue expression ultimately reads or writes, found by
/// walking through swizzles, field loads and array accesses.
pub fn reference_of(buffer: &Buffer, index: Index) -> Result<Index, IrError> {
    let mut cursor = index;
    loop {
        cursor = match buffer.atom(cursor)? {
            Atom::Swizzle(s) => s.src,
            Atom::Load(l) => l.src,
            Atom::ArrayAccess(a) => a.src,
            _ => return Ok(cursor),
        };
    }
}

struct Liveness<'a> {
    buffer: &'a Buffer,
    marked: BTreeSet<Index>,
    visited: HashSet<Index>,
}

impl<'a> Liveness<'a> {
    fn new(buffer: &'a Buffer) -> Self {
        Self {
            buffer,
            marked: BTreeSet::new(),
            visited: HashSet::new(),
        }
    }

    /// Marks `index` live and forces what its statement requires.
    fn force(&mut self, index: Index) -> Result<(), IrError> {
        if index.is_null() || !self.marked.insert(index) {
            return Ok(());
        }
        self.visited.insert(index);
        self.mark_children(index)
    }

    /// Follows a use of `index` from a live atom.
    fn visit(&mut self, index: Index) -> Result<(), IrError> {
        if index.is_null() || !self.visited.insert(index) {
            return Ok(());
        }
        let buffer = self.buffer;
        if buffer.is_synthesized(index) {
            return self.force(index);
        }
        match buffer.atom(index)? {
            Atom::Qualifier(_)
            | Atom::TypeInformation(_)
            | Atom::Call(_)
            | Atom::Store(_)
            | Atom::Return(_)
            | Atom::Branch(_) => self.force(index),
            Atom::Intrinsic(i) if i.code.is_side_effect() || i.code.is_layout() => {
                self.force(index)
            }
            Atom::Construct(c) if c.mode == ConstructorMode::Normal => self.force(index),
            // Type carrier: its type is declared, the value is inlined.
            Atom::Construct(c) => {
                self.force(c.ty)?;
                self.visit(c.args)
            }
            atom => {
                for operand in atom.operands() {
                    self.visit(operand)?;
                }
                Ok(())
            }
        }
    }

    fn mark_children(&mut self, index: Index) -> Result<(), IrError> {
        let buffer = self.buffer;
        match buffer.atom(index)? {
            Atom::Store(s) => {
                self.force(reference_of(buffer, s.dst)?)?;
                self.visit(s.dst)?;
                self.visit(s.src)
            }
            Atom::Qualifier(q) => self.force(q.underlying),
            Atom::TypeInformation(t) => {
                self.force(t.down)?;
                self.force(t.next)
            }
            Atom::Construct(c) => {
                self.force(c.ty)?;
                self.visit(c.args)
            }
            Atom::Call(c) => {
                self.force(c.ty)?;
                self.visit(c.args)
            }
            Atom::ArrayAccess(a) => {
                self.force(reference_of(buffer, a.src)?)?;
                self.visit(a.src)?;
                self.visit(a.loc)
            }
            atom => {
                for operand in atom.operands() {
                    self.visit(operand)?;
                }
                Ok(())
            }
        }
    }
}
