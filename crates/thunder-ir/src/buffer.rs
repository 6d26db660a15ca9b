//! Per-function atom storage.

use std::collections::{BTreeMap, BTreeSet};
use std::ops;

use crate::atom::Atom;
use crate::display;
use crate::error::IrError;
use crate::index::{Index, Reindex};
use crate::marking;
use crate::semalz::{self, TypeAnalyzer};
use crate::types::QualifiedType;

/// Name hints for a struct or binding, attached by the front end.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct Decoration {
    pub name: String,
    /// Field names, in chain order.
    pub fields: Vec<String>,
    /// Phantom structs are never declared; their fields are only reachable
    /// through buffer blocks.
    pub phantom: bool,
}

impl Decoration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn phantom(mut self) -> Self {
        self.phantom = true;
        self
    }
}

/// Ordered atom stream of one function, with its analysis caches.
///
/// Every address is either null or points at an earlier atom; the only
/// exception is a branch's `failto`, which points forward at the next
/// branch of the same construct.
#[derive(Clone, Debug, Default)]
pub struct Buffer {
    atoms: Vec<Atom>,
    types: Vec<QualifiedType>,
    synthesized: BTreeSet<Index>,
    marked: BTreeSet<Index>,
    decorations: BTreeMap<Index, Decoration>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an atom and returns its index.
    pub fn emit(&mut self, atom: impl Into<Atom>) -> Index {
        self.invalidate();
        self.atoms.push(atom.into());
        Index::new(self.atoms.len() - 1)
    }

    /// Appends an atom unless a structurally equal one already exists.
    pub fn emit_unique(&mut self, atom: impl Into<Atom>) -> Index {
        let atom = atom.into();
        match self.atoms.iter().position(|a| *a == atom) {
            Some(position) => Index::new(position),
            None => self.emit(atom),
        }
    }

    pub fn clear(&mut self) {
        self.atoms.clear();
        self.synthesized.clear();
        self.decorations.clear();
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.types.clear();
        self.marked.clear();
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn get(&self, index: Index) -> Option<&Atom> {
        index.get().and_then(|i| self.atoms.get(i))
    }

    /// Resolves an index, failing with a structural error when it dangles.
    pub fn atom(&self, index: Index) -> Result<&Atom, IrError> {
        self.get(index)
            .ok_or_else(|| self.structural_error(format!("index {index} does not resolve")))
    }

    /// Mutable access, used to patch a branch's `failto`.
    pub fn atom_mut(&mut self, index: Index) -> Result<&mut Atom, IrError> {
        if self.get(index).is_none() {
            return Err(self.structural_error(format!("index {index} does not resolve")));
        }
        self.invalidate();
        let position = index.get().unwrap_or_default();
        Ok(&mut self.atoms[position])
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn iter(&self) -> impl Iterator<Item = (Index, &Atom)> {
        self.atoms
            .iter()
            .enumerate()
            .map(|(i, atom)| (Index::new(i), atom))
    }

    /// Walks a `List` chain into the indices of its items.
    pub fn expand_list(&self, head: Index) -> Result<Vec<Index>, IrError> {
        let mut items = Vec::new();
        let mut cursor = head;
        while !cursor.is_null() {
            match self.atom(cursor)? {
                Atom::List(list) => {
                    items.push(list.item);
                    if !list.next.is_null() && list.next >= cursor {
                        return Err(self.structural_error(format!(
                            "list cell {cursor} continues forward to {}",
                            list.next
                        )));
                    }
                    cursor = list.next;
                }
                other => {
                    return Err(self.structural_error(format!(
                        "expected list at {cursor}, found {}",
                        other.kind_name()
                    )));
                }
            }
        }
        Ok(items)
    }

    /// Rewrites every address, the synthesized set and the decorations
    /// through `map`. A reference to a removed atom is a structural error.
    pub fn reindex(&mut self, map: &Reindex) -> Result<(), IrError> {
        for position in 0..self.atoms.len() {
            let mut dangling = None;
            for address in self.atoms[position].addresses_mut() {
                match map.get(*address) {
                    Ok(to) => *address = to,
                    Err(removed) => dangling = Some(removed),
                }
            }
            if let Some(removed) = dangling {
                return Err(self.structural_error(format!(
                    "atom %{position} still references removed atom {removed}"
                )));
            }
        }
        self.synthesized = self
            .synthesized
            .iter()
            .filter_map(|&i| map.get(i).ok())
            .collect();
        self.decorations = std::mem::take(&mut self.decorations)
            .into_iter()
            .filter_map(|(i, d)| map.get(i).ok().map(|to| (to, d)))
            .collect();
        self.invalidate();
        Ok(())
    }

    /// Fresh buffer holding the `kept` atoms in order, with every address
    /// rewritten through `map`.
    pub fn rebuild(
        &self,
        kept: impl IntoIterator<Item = Index>,
        map: &Reindex,
    ) -> Result<Buffer, IrError> {
        let mut fresh = Buffer::new();
        for index in kept {
            fresh.atoms.push(self.atom(index)?.clone());
        }
        fresh.synthesized = self.synthesized.clone();
        fresh.decorations = self.decorations.clone();
        fresh.reindex(map)?;
        Ok(fresh)
    }

    pub fn synthesize(&mut self, index: Index) {
        self.synthesized.insert(index);
        self.marked.clear();
    }

    pub fn is_synthesized(&self, index: Index) -> bool {
        self.synthesized.contains(&index)
    }

    pub fn synthesized(&self) -> &BTreeSet<Index> {
        &self.synthesized
    }

    pub fn decorate(&mut self, index: Index, decoration: Decoration) {
        self.decorations.insert(index, decoration);
    }

    pub fn decoration(&self, index: Index) -> Option<&Decoration> {
        self.decorations.get(&index)
    }

    pub fn decorations(&self) -> &BTreeMap<Index, Decoration> {
        &self.decorations
    }

    /// Runs the type analyzer over every atom and caches the result.
    /// Name hints are propagated to struct chain heads on the way.
    pub fn analyze(&mut self) -> Result<(), IrError> {
        let (types, hints) = semalz::analyze(self)?;
        for (head, decoration) in hints {
            self.decorations.entry(head).or_insert(decoration);
        }
        self.types = types;
        Ok(())
    }

    pub fn is_analyzed(&self) -> bool {
        !self.atoms.is_empty() && self.types.len() == self.atoms.len()
    }

    /// Semantic type of an atom; uses the cache when present.
    pub fn type_of(&self, index: Index) -> Result<QualifiedType, IrError> {
        if self.is_analyzed() {
            if let Some(ty) = index.get().and_then(|i| self.types.get(i)) {
                return Ok(ty.clone());
            }
        }
        TypeAnalyzer::new(self).type_of(index)
    }

    pub fn types(&self) -> &[QualifiedType] {
        &self.types
    }

    /// Computes the liveness set. Analyzes first when needed.
    pub fn mark(&mut self) -> Result<(), IrError> {
        if !self.is_analyzed() && !self.is_empty() {
            self.analyze()?;
        }
        self.marked = marking::mark(self)?;
        Ok(())
    }

    pub fn is_marked(&self, index: Index) -> bool {
        self.marked.contains(&index)
    }

    pub fn marked(&self) -> &BTreeSet<Index> {
        &self.marked
    }

    /// Checks the address invariant.
    pub fn validate(&self) -> Result<(), IrError> {
        for (index, atom) in self.iter() {
            if let Atom::Branch(branch) = atom {
                if !branch.cond.is_null() && branch.cond >= index {
                    return Err(self.structural_error(format!(
                        "branch {index} condition {} is not emitted yet",
                        branch.cond
                    )));
                }
                if !branch.failto.is_null() {
                    match self.get(branch.failto) {
                        Some(Atom::Branch(_)) if branch.failto > index => {}
                        _ => {
                            return Err(self.structural_error(format!(
                                "branch {index} falls through to {} which is not a later branch",
                                branch.failto
                            )));
                        }
                    }
                }
                continue;
            }
            for address in atom.addresses() {
                if !address.is_null() && address >= index {
                    return Err(self.structural_error(format!(
                        "atom {index} references {address} which is not emitted before it"
                    )));
                }
            }
        }
        for &index in self.synthesized.iter().chain(self.decorations.keys()) {
            if self.get(index).is_none() {
                return Err(self.structural_error(format!(
                    "annotation on {index} does not resolve"
                )));
            }
        }
        Ok(())
    }

    /// Structural error carrying this buffer's listing.
    pub fn structural_error(&self, message: impl Into<String>) -> IrError {
        IrError::Structural {
            message: message.into(),
            dump: display::dump_buffer(self),
        }
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.atoms == other.atoms
            && self.synthesized == other.synthesized
            && self.decorations == other.decorations
    }
}

impl Eq for Buffer {}

/// Direct atom access for indices known to be valid.
///
/// # Panics
///
/// Panics when `index` is null or past the end of the buffer. Use
/// [`Buffer::atom`] or [`Buffer::get`] for indices read from untrusted
/// atoms.
impl ops::Index<Index> for Buffer {
    type Output = Atom;

    fn index(&self, index: Index) -> &Atom {
        let position = index.get().unwrap_or(usize::MAX);
        &self.atoms[position]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{Branch, List, Operation, Primitive, PrimitiveValue, Return};
    use crate::codes::{BranchKind, OperationCode};

    fn literal(buffer: &mut Buffer, v: f32) -> Index {
        buffer.emit(Primitive {
            value: PrimitiveValue::F32(v),
        })
    }

    #[test]
    fn emit_is_monotonic() {
        let mut b = Buffer::new();
        let x = literal(&mut b, 1.0);
        let y = literal(&mut b, 2.0);
        assert_eq!(x, Index::new(0));
        assert_eq!(y, Index::new(1));
        assert_eq!(b.len(), 2);
        assert!(matches!(b[y], Atom::Primitive(_)));
    }

    #[test]
    fn emit_unique_reuses() {
        let mut b = Buffer::new();
        let x = literal(&mut b, 1.0);
        let again = b.emit_unique(Primitive {
            value: PrimitiveValue::F32(1.0),
        });
        assert_eq!(x, again);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn expand_list_walks_chain() {
        let mut b = Buffer::new();
        let x = literal(&mut b, 1.0);
        let y = literal(&mut b, 2.0);
        let tail = b.emit(List {
            item: y,
            next: Index::NULL,
        });
        let head = b.emit(List { item: x, next: tail });
        assert_eq!(b.expand_list(head).unwrap(), vec![x, y]);
        assert!(b.expand_list(Index::NULL).unwrap().is_empty());
        assert!(matches!(
            b.expand_list(x),
            Err(IrError::Structural { .. })
        ));
    }

    #[test]
    fn dangling_index_is_structural() {
        let b = Buffer::new();
        let err = b.atom(Index::new(5)).unwrap_err();
        assert!(err.to_string().contains("does not resolve"));
    }

    #[test]
    fn reindex_rewrites_and_rejects_removed() {
        let mut b = Buffer::new();
        let x = literal(&mut b, 1.0);
        let y = literal(&mut b, 1.0);
        let sum = b.emit(Operation {
            a: x,
            b: y,
            code: OperationCode::Addition,
        });
        b.synthesize(sum);

        let mut map = Reindex::new();
        map.set(y, x);
        b.reindex(&map).unwrap();
        assert_eq!(b[sum].addresses(), [x, x]);
        assert!(b.is_synthesized(sum));

        let mut map = Reindex::new();
        map.remove(x);
        assert!(b.reindex(&map).is_err());
    }

    #[test]
    fn rebuild_compacts() {
        let mut b = Buffer::new();
        let _dead = literal(&mut b, 9.0);
        let x = literal(&mut b, 1.0);
        let ret = b.emit(Return { value: x });

        let mut map = Reindex::new();
        map.remove(Index::new(0));
        map.set(x, Index::new(0));
        map.set(ret, Index::new(1));
        let fresh = b.rebuild([x, ret], &map).unwrap();
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[Index::new(1)].addresses()[0], Index::new(0));
        fresh.validate().unwrap();
    }

    #[test]
    fn validate_allows_forward_failto_only() {
        let mut b = Buffer::new();
        let cond = b.emit(Primitive {
            value: PrimitiveValue::Bool(true),
        });
        let open = b.emit(Branch {
            cond,
            failto: Index::NULL,
            kind: BranchKind::If,
        });
        let end = b.emit(Branch {
            cond: Index::NULL,
            failto: Index::NULL,
            kind: BranchKind::End,
        });
        if let Atom::Branch(branch) = b.atom_mut(open).unwrap() {
            branch.failto = end;
        }
        b.validate().unwrap();

        b.emit(Return {
            value: Index::new(10),
        });
        assert!(b.validate().is_err());
    }

    #[test]
    #[should_panic]
    fn indexing_with_null_panics() {
        let mut b = Buffer::new();
        literal(&mut b, 1.0);
        let _ = &b[Index::NULL];
    }

    #[test]
    fn fallible_access_rejects_null_and_dangling() {
        let mut b = Buffer::new();
        let one = literal(&mut b, 1.0);
        assert!(b.atom(one).is_ok());
        assert!(b.get(Index::NULL).is_none());
        assert!(b.get(Index::new(5)).is_none());
        assert!(matches!(
            b.atom(Index::new(5)),
            Err(IrError::Structural { .. })
        ));
    }
}
