//! IR optimization passes for Thunder.
//!
//! Provides a [`Pass`] trait, a [`PassManager`] with fixed-point iteration,
//! and the built-in passes (compaction, constructor elision, dead code
//! elimination). Every pass works on one [`Buffer`] and replaces it with a
//! freshly built one; optimization never crosses function boundaries.

mod compaction;
mod dce;
mod elision;

pub use compaction::Compaction;
pub use dce::DeadCodeElimination;
pub use elision::ConstructorElision;

use std::collections::HashSet;
use std::fmt::Debug;

use thunder_ir::marking::reference_of;
use thunder_ir::{Atom, Buffer, Function, Index, IntrinsicCode, IrError};

/// An optimization pass that rewrites a buffer.
pub trait Pass: Debug {
    /// Human-readable name of the pass.
    fn name(&self) -> &str;

    /// Run the pass on a buffer. Returns `true` if anything was modified.
    fn run(&self, buffer: &mut Buffer) -> Result<bool, IrError>;
}

/// Optimization level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptLevel {
    /// No optimizations.
    O0,
    /// Compaction, constructor elision and DCE to a fixed point.
    #[default]
    O1,
    /// Same as O1 for now.
    O2,
}

impl std::fmt::Display for OptLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::O0 => write!(f, "O0"),
            Self::O1 => write!(f, "O1"),
            Self::O2 => write!(f, "O2"),
        }
    }
}

/// Runs passes in sequence with fixed-point iteration.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PassManager {
    /// Creates an empty pass manager with no passes.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Creates a pass manager with passes appropriate for the given level.
    pub fn for_level(level: OptLevel) -> Self {
        let mut pm = Self::new();
        match level {
            OptLevel::O0 => {}
            OptLevel::O1 | OptLevel::O2 => {
                pm.add_pass(Box::new(Compaction));
                pm.add_pass(Box::new(ConstructorElision));
                pm.add_pass(Box::new(DeadCodeElimination));
            }
        }
        pm
    }

    /// Adds a pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Runs all passes until none of them changes the buffer. Returns
    /// whether anything changed.
    ///
    /// Passes must report a change only when they rewrote the buffer,
    /// otherwise this never returns.
    pub fn run(&self, buffer: &mut Buffer) -> Result<bool, IrError> {
        let mut any = false;
        for iteration in 0.. {
            let before = buffer.len();
            let mut changed = false;
            for pass in &self.passes {
                let modified = pass.run(buffer)?;
                if modified {
                    log::debug!("{} rewrote buffer ({} atoms)", pass.name(), buffer.len());
                }
                changed |= modified;
            }
            log::debug!(
                "optimizer iteration {iteration}: {before} -> {} atoms",
                buffer.len()
            );
            if !changed {
                break;
            }
            any = true;
        }
        Ok(any)
    }

    /// Optimizes a function's buffer and re-derives its analysis caches and
    /// signature.
    pub fn run_on_function(&self, function: &mut Function) -> Result<bool, IrError> {
        let changed = self.run(&mut function.buffer)?;
        function.prepare()?;
        Ok(changed)
    }
}

/// Convenience function: runs O1 optimization passes on a buffer.
pub fn optimize(buffer: &mut Buffer) -> Result<(), IrError> {
    PassManager::for_level(OptLevel::O1).run(buffer)?;
    Ok(())
}

/// Convenience function: runs O1 optimization passes on a function.
pub fn optimize_function(function: &mut Function) -> Result<(), IrError> {
    PassManager::for_level(OptLevel::O1).run_on_function(function)?;
    Ok(())
}

/// Storage roots some atom in the buffer may write: store destinations,
/// call arguments (through `out`/`inout` parameters) and the targets of
/// writing intrinsics.
pub(crate) fn written_storage(buffer: &Buffer) -> Result<HashSet<Index>, IrError> {
    let mut written = HashSet::new();
    for (_, atom) in buffer.iter() {
        match atom {
            Atom::Store(s) => {
                written.insert(reference_of(buffer, s.dst)?);
            }
            Atom::Call(c) => {
                for arg in buffer.expand_list(c.args)? {
                    written.insert(reference_of(buffer, arg)?);
                }
            }
            Atom::Intrinsic(i)
                if matches!(i.code, IntrinsicCode::AtomicAdd | IntrinsicCode::ImageStore) =>
            {
                if let Some(&target) = buffer.expand_list(i.args)?.first() {
                    written.insert(reference_of(buffer, target)?);
                }
            }
            _ => {}
        }
    }
    Ok(written)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use thunder_ir::{
        Atom, Construct, ConstructorMode, List, Load, PrimitiveType, Return, Store,
        TypeInformation,
    };

    fn sample() -> Buffer {
        let mut b = Buffer::new();
        let x = param(&mut b, PrimitiveType::F32, 0);
        let one = f32(&mut b, 1.0);
        let again = f32(&mut b, 1.0);
        let s1 = add(&mut b, x, one);
        let s2 = add(&mut b, x, again);
        let _dead = f32(&mut b, 7.0);
        let total = add(&mut b, s1, s2);
        b.emit(Return { value: total });
        b
    }

    #[test]
    fn optimize_empty_buffer() {
        let mut buffer = Buffer::new();
        optimize(&mut buffer).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn pass_manager_o0_is_noop() {
        let pm = PassManager::for_level(OptLevel::O0);
        let mut buffer = sample();
        assert!(!pm.run(&mut buffer).unwrap());
        assert_eq!(buffer, sample());
    }

    #[test]
    fn optimize_reaches_fixed_point() {
        let mut once = sample();
        optimize(&mut once).unwrap();
        // type, parameter, 1.0, x + 1.0, sum, return
        assert_eq!(once.len(), 6);

        let mut twice = once.clone();
        assert!(!PassManager::for_level(OptLevel::O1).run(&mut twice).unwrap());
        assert_eq!(once, twice);
    }

    /// `x` wrapped in `depth` single-field structs and read back out
    /// through as many field loads.
    fn nested_wrappers(depth: usize) -> Buffer {
        let mut b = Buffer::new();
        let x = param(&mut b, PrimitiveType::F32, 0);
        let end = ty(&mut b, PrimitiveType::Nil);
        let mut head = b.emit(TypeInformation {
            item: PrimitiveType::F32,
            down: Index::NULL,
            next: end,
        });
        let mut value = x;
        for level in 0..depth {
            if level > 0 {
                let end = ty(&mut b, PrimitiveType::Nil);
                head = b.emit(TypeInformation {
                    item: PrimitiveType::Nil,
                    down: head,
                    next: end,
                });
            }
            let node = b.emit(TypeInformation {
                item: PrimitiveType::Nil,
                down: head,
                next: Index::NULL,
            });
            let args = b.emit(List {
                item: value,
                next: Index::NULL,
            });
            value = b.emit(Construct {
                ty: node,
                args,
                mode: ConstructorMode::Normal,
            });
        }
        for _ in 0..depth {
            value = b.emit(Load { src: value, idx: 0 });
        }
        b.emit(Return { value });
        b
    }

    #[test]
    fn deep_nesting_is_fully_elided() {
        let mut b = nested_wrappers(40);
        let pm = PassManager::for_level(OptLevel::O1);
        assert!(pm.run(&mut b).unwrap());
        assert!(
            b.iter()
                .all(|(_, atom)| !matches!(atom, Atom::Load(_) | Atom::Construct(_)))
        );
        let Some((_, Atom::Return(ret))) = b.iter().last() else {
            panic!("expected a trailing return");
        };
        assert!(matches!(b[ret.value], Atom::Qualifier(_)));

        let once = b.clone();
        assert!(!pm.run(&mut b).unwrap());
        assert_eq!(b, once);
    }

    #[test]
    fn written_storage_follows_swizzles() {
        let mut b = Buffer::new();
        let v = param(&mut b, PrimitiveType::Vec2, 0);
        let x = b.emit(thunder_ir::Swizzle {
            src: v,
            code: thunder_ir::SwizzleCode::X,
        });
        let zero = f32(&mut b, 0.0);
        b.emit(Store { dst: x, src: zero });
        let written = written_storage(&b).unwrap();
        assert!(written.contains(&v));
        assert_eq!(written.len(), 1);
    }

    #[test]
    fn optimize_function_updates_signature() {
        let mut f = Function::new("f", thunder_ir::CallableId(0), sample()).unwrap();
        optimize_function(&mut f).unwrap();
        assert_eq!(f.buffer.len(), 6);
        assert_eq!(f.args.len(), 1);
        assert!(f.buffer.is_analyzed());
    }
}
