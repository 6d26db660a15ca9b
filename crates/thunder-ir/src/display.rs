//! Display implementations, assembly listings and Graphviz dumps.

use std::fmt::{self, Write};

use crate::atom::{Atom, PrimitiveValue};
use crate::buffer::Buffer;
use crate::function::Function;
use crate::index::Index;

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}i32"),
            Self::U32(v) => write!(f, "{v}u32"),
            Self::F32(v) => write!(f, "{v:?}f32"),
            Self::F64(v) => write!(f, "{v:?}f64"),
            Self::U64(v) => write!(f, "{v}u64"),
        }
    }
}

/// Instruction reference.
struct Ref(Index);

/// Type or forward reference.
struct At(Index);

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Display for At {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(i) => write!(f, "@{i}"),
            None => f.write_str("null"),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.kind_name();
        match self {
            Atom::Qualifier(q) => write!(f, "{op} {} {} {}", At(q.underlying), q.kind, q.numerical),
            Atom::TypeInformation(t) => {
                write!(f, "{op} {} {} {}", t.item, At(t.down), At(t.next))
            }
            Atom::Primitive(p) => write!(f, "{op} {}", p.value),
            Atom::Swizzle(s) => write!(f, "{op} {} {}", Ref(s.src), s.code),
            Atom::Operation(o) => write!(f, "{op} {} {} {}", o.code, Ref(o.a), Ref(o.b)),
            Atom::Intrinsic(i) => write!(f, "{op} {} {}", i.code, Ref(i.args)),
            Atom::List(l) => write!(f, "{op} {} {}", Ref(l.item), Ref(l.next)),
            Atom::Construct(c) => write!(f, "{op} {} {} {}", At(c.ty), Ref(c.args), c.mode),
            Atom::Call(c) => write!(f, "{op} ${} {} {}", c.callee, At(c.ty), Ref(c.args)),
            Atom::Store(s) => write!(f, "{op} {} {}", Ref(s.dst), Ref(s.src)),
            Atom::Load(l) => write!(f, "{op} {} {}", Ref(l.src), l.idx),
            Atom::ArrayAccess(a) => write!(f, "{op} {} {}", Ref(a.src), Ref(a.loc)),
            Atom::Branch(b) => write!(f, "{op} {} {} {}", b.kind, Ref(b.cond), At(b.failto)),
            Atom::Return(r) => write!(f, "{op} {}", Ref(r.value)),
        }
    }
}

/// Assembly listing of a buffer, one atom per line.
pub fn dump_buffer(buffer: &Buffer) -> String {
    let mut out = String::new();
    for (index, atom) in buffer.iter() {
        let live = if buffer.is_marked(index) { '*' } else { ' ' };
        let label = index.to_string();
        let _ = write!(out, "  {live} {label:>5} = {atom}");
        let mut notes = Vec::new();
        if buffer.is_synthesized(index) {
            notes.push("synthesized".to_string());
        }
        if let Some(d) = buffer.decoration(index) {
            let phantom = if d.phantom { " phantom" } else { "" };
            if d.fields.is_empty() {
                notes.push(format!("\"{}\"{phantom}", d.name));
            } else {
                notes.push(format!("\"{}\" {{{}}}{phantom}", d.name, d.fields.join(", ")));
            }
        }
        if let Some(ty) = index.get().and_then(|i| buffer.types().get(i)) {
            if !ty.is_nil() {
                notes.push(format!(": {ty}"));
            }
        }
        if !notes.is_empty() {
            let _ = write!(out, "    ; {}", notes.join(" "));
        }
        out.push('\n');
    }
    out
}

/// Assembly listing with the `name.id:` header.
pub fn dump_function(function: &Function) -> String {
    format!(
        "{}.{}:\n{}",
        function.name,
        function.id,
        dump_buffer(&function.buffer)
    )
}

/// Usage graph of a buffer in DOT syntax. Live atoms are filled.
pub fn graphviz(buffer: &Buffer, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", name.replace('"', "'"));
    let _ = writeln!(out, "  node [shape=box, fontname=monospace];");
    for (index, atom) in buffer.iter() {
        let i = index.raw();
        let label = atom.to_string().replace('"', "'");
        let style = if buffer.is_marked(index) {
            ", style=filled, fillcolor=lightblue"
        } else {
            ""
        };
        let _ = writeln!(out, "  n{i} [label=\"%{i}: {label}\"{style}];");
        for operand in atom.operands() {
            let _ = writeln!(out, "  n{i} -> n{};", operand.raw());
        }
        if let Atom::Branch(b) = atom {
            if !b.failto.is_null() {
                let _ = writeln!(out, "  n{i} -> n{} [style=dashed];", b.failto.raw());
            }
        }
    }
    out.push_str("}\n");
    out
}

impl Buffer {
    pub fn graphviz(&self, name: &str) -> String {
        graphviz(self, name)
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&dump_buffer(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{Operation, Primitive, Qualifier, Return, TypeInformation};
    use crate::codes::{OperationCode, QualifierKind};
    use crate::function::CallableId;
    use crate::types::PrimitiveType;

    fn sample() -> Buffer {
        let mut b = Buffer::new();
        let f32 = b.emit(TypeInformation {
            item: PrimitiveType::F32,
            down: Index::NULL,
            next: Index::NULL,
        });
        let p = b.emit(Qualifier {
            underlying: f32,
            numerical: 0,
            kind: QualifierKind::Parameter,
        });
        let two = b.emit(Primitive {
            value: PrimitiveValue::F32(2.0),
        });
        let product = b.emit(Operation {
            a: p,
            b: two,
            code: OperationCode::Multiplication,
        });
        b.emit(Return { value: product });
        b
    }

    #[test]
    fn literal_display() {
        assert_eq!(PrimitiveValue::F32(2.0).to_string(), "2.0f32");
        assert_eq!(PrimitiveValue::I32(-3).to_string(), "-3i32");
        assert_eq!(PrimitiveValue::Bool(true).to_string(), "true");
    }

    #[test]
    fn atom_display_uses_reference_sigils() {
        let b = sample();
        assert_eq!(b[Index::new(1)].to_string(), "qualifier @0 parameter 0");
        assert_eq!(
            b[Index::new(3)].to_string(),
            "operation multiplication %1 %2"
        );
        assert_eq!(b[Index::new(0)].to_string(), "type f32 null null");
    }

    #[test]
    fn function_listing() {
        let f = Function::new("twice", CallableId(3), sample()).unwrap();
        let text = dump_function(&f);
        assert!(text.starts_with("twice.3:\n"));
        assert!(text.contains("%4 = return %3"));
        assert!(text.contains("*    %1 = qualifier"));
    }

    #[test]
    fn dot_output() {
        let dot = graphviz(&sample(), "twice");
        assert!(dot.starts_with("digraph \"twice\" {"));
        assert!(dot.contains("n3 -> n1;"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
