//! Compaction pass.
//!
//! Walks the buffer once in order, rewriting each atom's operands to their
//! canonical occurrence before comparing it against every atom seen so far.
//! Because operands are already canonical, plain equality of the rewritten
//! atom is structural equality including nested addresses. Duplicates are
//! merged into the earliest occurrence and the survivors are reindexed into
//! a fresh buffer.

use std::collections::{HashMap, HashSet};

use thunder_ir::marking::reference_of;
use thunder_ir::{Atom, Buffer, ConstructorMode, Decoration, Index, IrError, QualifierKind, Reindex};

use crate::{Pass, written_storage};

/// Merges structurally equal atoms.
#[derive(Debug)]
pub struct Compaction;

impl Pass for Compaction {
    fn name(&self) -> &str {
        "compaction"
    }

    fn run(&self, buffer: &mut Buffer) -> Result<bool, IrError> {
        let written = written_storage(buffer)?;
        let mut canonical: Vec<Index> = Vec::with_capacity(buffer.len());
        let mut seen: HashMap<(Atom, Option<&Decoration>), Index> = HashMap::new();
        let mut merged = 0usize;

        for (index, atom) in buffer.iter() {
            if !is_mergeable(buffer, index, atom, &written)? {
                canonical.push(index);
                continue;
            }
            let mut key = atom.clone();
            for address in key.addresses_mut() {
                if let Some(&first) = address.get().and_then(|p| canonical.get(p)) {
                    *address = first;
                }
            }
            match seen.get(&(key.clone(), buffer.decoration(index))) {
                Some(&first) => {
                    canonical.push(first);
                    merged += 1;
                }
                None => {
                    seen.insert((key, buffer.decoration(index)), index);
                    canonical.push(index);
                }
            }
        }

        if merged == 0 {
            return Ok(false);
        }

        let mut map = Reindex::new();
        let mut kept = Vec::with_capacity(buffer.len() - merged);
        let mut position: Vec<Index> = vec![Index::NULL; buffer.len()];
        for (i, &first) in canonical.iter().enumerate() {
            if first == Index::new(i) {
                position[i] = Index::new(kept.len());
                kept.push(first);
            }
        }
        for (i, &first) in canonical.iter().enumerate() {
            let target = first.get().map_or(Index::NULL, |f| position[f]);
            map.set(Index::new(i), target);
        }
        *buffer = buffer.rebuild(kept, &map)?;
        Ok(true)
    }
}

/// Atoms whose identity matters beyond their structure are never merged.
fn is_mergeable(
    buffer: &Buffer,
    index: Index,
    atom: &Atom,
    written: &HashSet<Index>,
) -> Result<bool, IrError> {
    if buffer.is_synthesized(index) {
        return Ok(false);
    }
    Ok(match atom {
        Atom::Store(_) | Atom::Return(_) | Atom::Branch(_) | Atom::Call(_) => false,
        Atom::Intrinsic(i) => !(i.code.is_side_effect() || i.code.is_layout()),
        Atom::Construct(c) => c.mode == ConstructorMode::Transient,
        Atom::Qualifier(q) => q.kind != QualifierKind::Parameter,
        Atom::Load(_) | Atom::ArrayAccess(_) | Atom::Swizzle(_) => {
            !written.contains(&reference_of(buffer, index)?)
        }
        _ => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use thunder_ir::{
        Construct, Intrinsic, IntrinsicCode, PrimitiveType, Return, Store, Swizzle, SwizzleCode,
    };

    #[test]
    fn merges_nested_duplicates() {
        let mut b = Buffer::new();
        let x = param(&mut b, PrimitiveType::F32, 0);
        let one = f32(&mut b, 1.0);
        let s1 = add(&mut b, x, one);
        let one_again = f32(&mut b, 1.0);
        let s2 = add(&mut b, x, one_again);
        let total = add(&mut b, s1, s2);
        b.emit(Return { value: total });

        assert!(Compaction.run(&mut b).unwrap());
        assert_eq!(b.len(), 6);
        // No two surviving atoms are equal.
        for (i, a) in b.iter() {
            for (j, c) in b.iter() {
                if i < j {
                    assert_ne!(a, c, "{i} and {j} are duplicates");
                }
            }
        }
        b.validate().unwrap();
        assert!(!Compaction.run(&mut b).unwrap());
    }

    #[test]
    fn keeps_parameters_and_locals_apart() {
        let mut b = Buffer::new();
        let p0 = param(&mut b, PrimitiveType::F32, 0);
        let p1 = param(&mut b, PrimitiveType::F32, 0);
        let t = ty(&mut b, PrimitiveType::F32);
        let l0 = b.emit(Construct {
            ty: t,
            args: Index::NULL,
            mode: ConstructorMode::Normal,
        });
        let l1 = b.emit(Construct {
            ty: t,
            args: Index::NULL,
            mode: ConstructorMode::Normal,
        });
        b.emit(Store { dst: l0, src: p0 });
        b.emit(Store { dst: l1, src: p1 });
        let before = b.len();
        // The second f32 type node merges into the first; nothing else does.
        assert!(Compaction.run(&mut b).unwrap());
        assert_eq!(b.len(), before - 2);
    }

    #[test]
    fn reads_of_written_storage_stay() {
        let mut b = Buffer::new();
        let v = param(&mut b, PrimitiveType::Vec2, 0);
        let r1 = b.emit(Swizzle {
            src: v,
            code: SwizzleCode::X,
        });
        let two = f32(&mut b, 2.0);
        b.emit(Store { dst: r1, src: two });
        let r2 = b.emit(Swizzle {
            src: v,
            code: SwizzleCode::X,
        });
        b.emit(Return { value: r2 });
        assert!(!Compaction.run(&mut b).unwrap());
    }

    #[test]
    fn side_effects_never_merge() {
        let mut b = Buffer::new();
        b.emit(Intrinsic {
            args: Index::NULL,
            code: IntrinsicCode::Barrier,
        });
        b.emit(Intrinsic {
            args: Index::NULL,
            code: IntrinsicCode::Barrier,
        });
        assert!(!Compaction.run(&mut b).unwrap());
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn decorations_must_agree() {
        let mut b = Buffer::new();
        let a = f32(&mut b, 1.0);
        let c = f32(&mut b, 1.0);
        b.decorate(a, Decoration::new("a"));
        b.decorate(c, Decoration::new("c"));
        assert!(!Compaction.run(&mut b).unwrap());
    }

    #[test]
    fn synthesized_values_are_kept() {
        let mut b = Buffer::new();
        let a = f32(&mut b, 1.0);
        let c = f32(&mut b, 1.0);
        b.synthesize(c);
        b.emit(Return { value: a });
        assert!(!Compaction.run(&mut b).unwrap());
    }
}
