//! Constructor elision pass.
//!
//! `c = construct T [a, b, d]; x = load c 1` lets every user of `x` read
//! `b` directly. Single-component swizzles of a vector built from scalars
//! are forwarded the same way. The bypassed reads become dead and are left
//! for DCE.

use std::collections::{HashMap, HashSet};

use thunder_ir::{Atom, Buffer, Construct, Index, IrError};

use crate::{Pass, written_storage};

/// Forwards field reads of constructed values to the constructor argument.
#[derive(Debug)]
pub struct ConstructorElision;

impl Pass for ConstructorElision {
    fn name(&self) -> &str {
        "constructor-elision"
    }

    fn run(&self, buffer: &mut Buffer) -> Result<bool, IrError> {
        if buffer.is_empty() {
            return Ok(false);
        }
        if !buffer.is_analyzed() {
            buffer.analyze()?;
        }
        let written = written_storage(buffer)?;
        let mut forward: HashMap<Index, Index> = HashMap::new();

        for (index, atom) in buffer.iter() {
            if buffer.is_synthesized(index) {
                continue;
            }
            let (src, slot) = match atom {
                Atom::Load(l) if l.idx >= 0 => (l.src, l.idx as usize),
                Atom::Swizzle(s) if s.code.components().len() == 1 => {
                    (s.src, s.code.components()[0])
                }
                _ => continue,
            };
            let Some(construct) = constructed(buffer, src, &written) else {
                continue;
            };
            let items = buffer.expand_list(construct.args)?;
            let Some(&item) = items.get(slot) else {
                continue;
            };
            if matches!(atom, Atom::Swizzle(_)) && !is_scalar_split(buffer, src, &items)? {
                continue;
            }
            if reads_written(buffer, item, &written, &mut HashSet::new())? {
                continue;
            }
            let item = forward.get(&item).copied().unwrap_or(item);
            forward.insert(index, item);
        }

        if forward.is_empty() {
            return Ok(false);
        }

        let mut fresh = buffer.clone();
        let mut changed = false;
        for position in 0..fresh.len() {
            let atom = fresh.atom_mut(Index::new(position))?;
            for address in atom.addresses_mut() {
                if let Some(&to) = forward.get(&*address) {
                    *address = to;
                    changed = true;
                }
            }
        }
        if changed {
            *buffer = fresh;
        }
        Ok(changed)
    }
}

/// The constructor at `src`, if it has an argument list and its value is
/// never written after construction.
fn constructed<'b>(
    buffer: &'b Buffer,
    src: Index,
    written: &HashSet<Index>,
) -> Option<&'b Construct> {
    match buffer.get(src)? {
        Atom::Construct(c) if !c.args.is_null() && !written.contains(&src) => Some(c),
        _ => None,
    }
}

/// True when the vector at `src` is built from exactly one scalar per
/// component, so that component `k` is argument `k`.
fn is_scalar_split(buffer: &Buffer, src: Index, items: &[Index]) -> Result<bool, IrError> {
    let Some(vector) = buffer.type_of(src)?.primitive_type() else {
        return Ok(false);
    };
    if !vector.is_vector() || items.len() != vector.components() {
        return Ok(false);
    }
    for &item in items {
        if buffer.type_of(item)?.primitive_type() != Some(vector.scalar()) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Whether the expression at `index` depends on storage that is written
/// somewhere in the buffer; such a value may differ when re-read later.
fn reads_written(
    buffer: &Buffer,
    index: Index,
    written: &HashSet<Index>,
    seen: &mut HashSet<Index>,
) -> Result<bool, IrError> {
    if index.is_null() || !seen.insert(index) {
        return Ok(false);
    }
    if written.contains(&index) {
        return Ok(true);
    }
    if buffer.is_synthesized(index) {
        return Ok(false);
    }
    match buffer.atom(index)? {
        Atom::Qualifier(_) | Atom::TypeInformation(_) | Atom::Primitive(_) => Ok(false),
        atom => {
            for operand in atom.operands() {
                if reads_written(buffer, operand, written, seen)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use crate::{DeadCodeElimination, OptLevel, PassManager};
    use thunder_ir::{
        ConstructorMode, List, Load, PrimitiveType, Return, Store, Swizzle, SwizzleCode,
        TypeInformation,
    };

    fn list(b: &mut Buffer, items: &[Index]) -> Index {
        let mut next = Index::NULL;
        for &item in items.iter().rev() {
            next = b.emit(List { item, next });
        }
        next
    }

    /// struct { f32; f32; f32 }
    fn triple(b: &mut Buffer) -> Index {
        let end = ty(b, PrimitiveType::Nil);
        let mut next = end;
        for _ in 0..3 {
            next = b.emit(TypeInformation {
                item: PrimitiveType::F32,
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

    #[test]
    fn load_of_construct_reads_argument() {
        let mut b = Buffer::new();
        let t = triple(&mut b);
        let a = param(&mut b, PrimitiveType::F32, 0);
        let bb = param(&mut b, PrimitiveType::F32, 1);
        let d = param(&mut b, PrimitiveType::F32, 2);
        let args = list(&mut b, &[a, bb, d]);
        let c = b.emit(Construct {
            ty: t,
            args,
            mode: ConstructorMode::Normal,
        });
        let x = b.emit(Load { src: c, idx: 1 });
        let ret = b.emit(Return { value: x });

        assert!(ConstructorElision.run(&mut b).unwrap());
        assert_eq!(b[ret].addresses()[0], bb);

        // The load and the constructor are now dead.
        assert!(DeadCodeElimination.run(&mut b).unwrap());
        assert!(b.iter().all(|(_, atom)| !matches!(atom, Atom::Load(_) | Atom::Construct(_))));
    }

    #[test]
    fn swizzle_of_scalar_vector() {
        let mut b = Buffer::new();
        let vec2 = ty(&mut b, PrimitiveType::Vec2);
        let x = param(&mut b, PrimitiveType::F32, 0);
        let y = param(&mut b, PrimitiveType::F32, 1);
        let args = list(&mut b, &[x, y]);
        let v = b.emit(Construct {
            ty: vec2,
            args,
            mode: ConstructorMode::Normal,
        });
        let second = b.emit(Swizzle {
            src: v,
            code: SwizzleCode::Y,
        });
        let ret = b.emit(Return { value: second });

        assert!(ConstructorElision.run(&mut b).unwrap());
        assert_eq!(b[ret].addresses()[0], y);
    }

    #[test]
    fn written_constructs_are_kept() {
        let mut b = Buffer::new();
        let t = triple(&mut b);
        let a = param(&mut b, PrimitiveType::F32, 0);
        let args = list(&mut b, &[a, a, a]);
        let c = b.emit(Construct {
            ty: t,
            args,
            mode: ConstructorMode::Normal,
        });
        let field = b.emit(Load { src: c, idx: 0 });
        let zero = f32(&mut b, 0.0);
        b.emit(Store { dst: field, src: zero });
        let x = b.emit(Load { src: c, idx: 0 });
        b.emit(Return { value: x });

        assert!(!ConstructorElision.run(&mut b).unwrap());
    }

    #[test]
    fn full_pipeline_removes_struct() {
        let mut b = Buffer::new();
        let t = triple(&mut b);
        let a = param(&mut b, PrimitiveType::F32, 0);
        let one = f32(&mut b, 1.0);
        let args = list(&mut b, &[one, a, one]);
        let c = b.emit(Construct {
            ty: t,
            args,
            mode: ConstructorMode::Normal,
        });
        let x = b.emit(Load { src: c, idx: 1 });
        let y = b.emit(Load { src: c, idx: 2 });
        let sum = add(&mut b, x, y);
        b.emit(Return { value: sum });

        PassManager::for_level(OptLevel::O1).run(&mut b).unwrap();
        // f32 type, parameter, 1.0, a + 1.0, return
        assert_eq!(b.len(), 5);
        b.validate().unwrap();
    }
}
