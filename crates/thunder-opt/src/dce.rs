//! Dead code elimination pass.
//!
//! Builds the usage graph of a buffer and its reverse, then removes atoms
//! nobody uses, propagating removal through their operands until a fixed
//! point. Survivors are compacted into a fresh buffer.

use std::collections::BTreeSet;

use thunder_ir::{Atom, Buffer, Index, IrError, QualifiedType, QualifierKind, Reindex};

use crate::Pass;

/// Removes atoms with no users and no observable effect.
#[derive(Debug)]
pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &str {
        "dce"
    }

    fn run(&self, buffer: &mut Buffer) -> Result<bool, IrError> {
        if buffer.is_empty() {
            return Ok(false);
        }
        if !buffer.is_analyzed() {
            buffer.analyze()?;
        }

        let n = buffer.len();
        // users[i]: atoms that reference i; operands[i]: atoms i references.
        let mut users: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        let mut operands: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (index, atom) in buffer.iter() {
            let i = index.get().unwrap_or_default();
            for address in atom.addresses() {
                if let Some(j) = address.get().filter(|&j| j < n) {
                    users[j].insert(i);
                    operands[i].push(j);
                }
            }
        }

        let mut exempt = vec![false; n];
        for (index, atom) in buffer.iter() {
            exempt[index.get().unwrap_or_default()] = is_exempt(buffer, index, atom)?;
        }

        let mut alive = vec![true; n];
        let mut worklist: Vec<usize> = (0..n)
            .filter(|&i| users[i].is_empty() && !exempt[i])
            .collect();
        while let Some(i) = worklist.pop() {
            if !alive[i] {
                continue;
            }
            alive[i] = false;
            for &j in &operands[i] {
                users[j].remove(&i);
                if users[j].is_empty() && !exempt[j] && alive[j] {
                    worklist.push(j);
                }
            }
        }

        let removed = alive.iter().filter(|&&a| !a).count();
        if removed == 0 {
            return Ok(false);
        }

        let mut map = Reindex::new();
        let mut kept = Vec::with_capacity(n - removed);
        for (i, &live) in alive.iter().enumerate() {
            if live {
                map.set(Index::new(i), Index::new(kept.len()));
                kept.push(Index::new(i));
            } else {
                map.remove(Index::new(i));
            }
        }
        *buffer = buffer.rebuild(kept, &map)?;
        Ok(true)
    }
}

/// Atoms kept even without users.
fn is_exempt(buffer: &Buffer, index: Index, atom: &Atom) -> Result<bool, IrError> {
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
