//! Binary function streams.
//!
//! Layout (all integers little endian):
//!
//! ```text
//! stream   := u32 count, function*
//! function := u32 name_len, name bytes, atoms
//! atoms    := u32 callable_id, u32 atom_count, atom*,
//!             u32 synthesized_count, u32*,
//!             u32 decoration_count, decoration*
//! ```
//!
//! Each atom is a one-byte tag followed by its fields; addresses are `i32`
//! with `-1` for null.

use crate::atom::{
    ArrayAccess, Atom, Branch, Call, Construct, Intrinsic, List, Load, Operation, Primitive,
    PrimitiveValue, Qualifier, Return, Store, Swizzle, TypeInformation,
};
use crate::buffer::{Buffer, Decoration};
use crate::codes::{
    BranchKind, ConstructorMode, IntrinsicCode, OperationCode, QualifierKind, SwizzleCode,
};
use crate::error::IrError;
use crate::function::{CallableId, Function};
use crate::index::Index;
use crate::types::PrimitiveType;

/// Encodes a list of functions as a stream.
pub fn write_functions<'a>(functions: impl IntoIterator<Item = &'a Function>) -> Vec<u8> {
    let functions: Vec<&Function> = functions.into_iter().collect();
    let mut w = Writer::default();
    w.u32(functions.len() as u32);
    for function in functions {
        w.str(&function.name);
        w.atoms(function.id, &function.buffer);
    }
    w.bytes
}

/// Encodes one function's atom section (without its name).
pub fn encode_buffer(id: CallableId, buffer: &Buffer) -> Vec<u8> {
    let mut w = Writer::default();
    w.atoms(id, buffer);
    w.bytes
}

/// Decodes a stream back into raw `(name, id, buffer)` triples, checking
/// the address invariant of every buffer.
pub fn read_buffers(bytes: &[u8]) -> Result<Vec<(String, CallableId, Buffer)>, IrError> {
    let mut r = Reader { bytes, pos: 0 };
    let count = r.u32()? as usize;
    let mut out = Vec::new();
    for _ in 0..count {
        let name = r.str()?;
        let (id, buffer) = r.atoms()?;
        buffer.validate()?;
        out.push((name, id, buffer));
    }
    if r.pos != bytes.len() {
        return Err(IrError::Stream(format!(
            "{} trailing bytes after {count} functions",
            bytes.len() - r.pos
        )));
    }
    Ok(out)
}

/// Decodes a stream into prepared functions.
pub fn read_functions(bytes: &[u8]) -> Result<Vec<Function>, IrError> {
    read_buffers(bytes)?
        .into_iter()
        .map(|(name, id, buffer)| Function::new(name, id, buffer))
        .collect()
}

mod tag {
    pub const QUALIFIER: u8 = 0;
    pub const TYPE_INFORMATION: u8 = 1;
    pub const PRIMITIVE: u8 = 2;
    pub const SWIZZLE: u8 = 3;
    pub const OPERATION: u8 = 4;
    pub const INTRINSIC: u8 = 5;
    pub const LIST: u8 = 6;
    pub const CONSTRUCT: u8 = 7;
    pub const CALL: u8 = 8;
    pub const STORE: u8 = 9;
    pub const LOAD: u8 = 10;
    pub const ARRAY_ACCESS: u8 = 11;
    pub const BRANCH: u8 = 12;
    pub const RETURN: u8 = 13;
}

#[derive(Default)]
struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn index(&mut self, i: Index) {
        self.i32(i.raw());
    }

    fn str(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.bytes.extend_from_slice(s.as_bytes());
    }

    fn atoms(&mut self, id: CallableId, buffer: &Buffer) {
        self.u32(id.0);
        self.u32(buffer.len() as u32);
        for atom in buffer.atoms() {
            self.atom(atom);
        }
        self.u32(buffer.synthesized().len() as u32);
        for &index in buffer.synthesized() {
            self.index(index);
        }
        self.u32(buffer.decorations().len() as u32);
        for (&index, decoration) in buffer.decorations() {
            self.index(index);
            self.str(&decoration.name);
            self.u8(decoration.phantom as u8);
            self.u32(decoration.fields.len() as u32);
            for field in &decoration.fields {
                self.str(field);
            }
        }
    }

    fn atom(&mut self, atom: &Atom) {
        match atom {
            Atom::Qualifier(q) => {
                self.u8(tag::QUALIFIER);
                self.index(q.underlying);
                self.i32(q.numerical);
                self.u16(q.kind.code());
            }
            Atom::TypeInformation(t) => {
                self.u8(tag::TYPE_INFORMATION);
                self.u16(t.item.code());
                self.index(t.down);
                self.index(t.next);
            }
            Atom::Primitive(p) => {
                self.u8(tag::PRIMITIVE);
                let kind = match p.value {
                    PrimitiveValue::Bool(_) => 0,
                    PrimitiveValue::I32(_) => 1,
                    PrimitiveValue::U32(_) => 2,
                    PrimitiveValue::F32(_) => 3,
                    PrimitiveValue::F64(_) => 4,
                    PrimitiveValue::U64(_) => 5,
                };
                self.u8(kind);
                self.u64(p.value.bits());
            }
            Atom::Swizzle(s) => {
                self.u8(tag::SWIZZLE);
                self.index(s.src);
                self.u16(s.code.code());
            }
            Atom::Operation(o) => {
                self.u8(tag::OPERATION);
                self.index(o.a);
                self.index(o.b);
                self.u16(o.code.code());
            }
            Atom::Intrinsic(i) => {
                self.u8(tag::INTRINSIC);
                self.index(i.args);
                self.u16(i.code.code());
            }
            Atom::List(l) => {
                self.u8(tag::LIST);
                self.index(l.item);
                self.index(l.next);
            }
            Atom::Construct(c) => {
                self.u8(tag::CONSTRUCT);
                self.index(c.ty);
                self.index(c.args);
                self.u16(c.mode.code());
            }
            Atom::Call(c) => {
                self.u8(tag::CALL);
                self.u32(c.callee.0);
                self.index(c.ty);
                self.index(c.args);
            }
            Atom::Store(s) => {
                self.u8(tag::STORE);
                self.index(s.dst);
                self.index(s.src);
            }
            Atom::Load(l) => {
                self.u8(tag::LOAD);
                self.index(l.src);
                self.i32(l.idx);
            }
            Atom::ArrayAccess(a) => {
                self.u8(tag::ARRAY_ACCESS);
                self.index(a.src);
                self.index(a.loc);
            }
            Atom::Branch(b) => {
                self.u8(tag::BRANCH);
                self.index(b.cond);
                self.index(b.failto);
                self.u16(b.kind.code());
            }
            Atom::Return(r) => {
                self.u8(tag::RETURN);
                self.index(r.value);
            }
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], IrError> {
        let end = self.pos + N;
        let chunk = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| IrError::Stream(format!("unexpected end of stream at byte {}", self.pos)))?;
        self.pos = end;
        let mut out = [0; N];
        out.copy_from_slice(chunk);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, IrError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, IrError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32, IrError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32, IrError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn u64(&mut self) -> Result<u64, IrError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    fn index(&mut self) -> Result<Index, IrError> {
        self.i32().map(Index::from_raw)
    }

    /// A length prefix that must fit in the remaining input.
    fn len(&mut self, unit: usize) -> Result<usize, IrError> {
        let len = self.u32()? as usize;
        if len.saturating_mul(unit) > self.bytes.len() - self.pos {
            return Err(IrError::Stream(format!(
                "length {len} at byte {} exceeds the stream",
                self.pos - 4
            )));
        }
        Ok(len)
    }

    fn str(&mut self) -> Result<String, IrError> {
        let len = self.len(1)?;
        let raw = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        String::from_utf8(raw.to_vec())
            .map_err(|_| IrError::Stream(format!("name at byte {} is not utf-8", self.pos - len)))
    }

    fn code<T>(&mut self, what: &str, decode: fn(u16) -> Option<T>) -> Result<T, IrError> {
        let raw = self.u16()?;
        decode(raw).ok_or_else(|| IrError::Stream(format!("unknown {what} code {raw}")))
    }

    fn atoms(&mut self) -> Result<(CallableId, Buffer), IrError> {
        let id = CallableId(self.u32()?);
        let count = self.len(1)?;
        let mut buffer = Buffer::new();
        for _ in 0..count {
            let atom = self.atom()?;
            buffer.emit(atom);
        }
        for _ in 0..self.len(4)? {
            let index = self.index()?;
            buffer.synthesize(index);
        }
        for _ in 0..self.len(4)? {
            let index = self.index()?;
            let name = self.str()?;
            let phantom = self.u8()? != 0;
            let fields = (0..self.len(4)?)
                .map(|_| self.str())
                .collect::<Result<Vec<_>, _>>()?;
            buffer.decorate(
                index,
                Decoration {
                    name,
                    fields,
                    phantom,
                },
            );
        }
        Ok((id, buffer))
    }

    fn atom(&mut self) -> Result<Atom, IrError> {
        let at = self.pos;
        Ok(match self.u8()? {
            tag::QUALIFIER => Atom::Qualifier(Qualifier {
                underlying: self.index()?,
                numerical: self.i32()?,
                kind: self.code("qualifier", QualifierKind::from_code)?,
            }),
            tag::TYPE_INFORMATION => Atom::TypeInformation(TypeInformation {
                item: self.code("primitive type", PrimitiveType::from_code)?,
                down: self.index()?,
                next: self.index()?,
            }),
            tag::PRIMITIVE => {
                let kind = self.u8()?;
                let bits = self.u64()?;
                let value = match kind {
                    0 => PrimitiveValue::Bool(bits != 0),
                    1 => PrimitiveValue::I32(bits as u32 as i32),
                    2 => PrimitiveValue::U32(bits as u32),
                    3 => PrimitiveValue::F32(f32::from_bits(bits as u32)),
                    4 => PrimitiveValue::F64(f64::from_bits(bits)),
                    5 => PrimitiveValue::U64(bits),
                    other => {
                        return Err(IrError::Stream(format!("unknown literal kind {other}")));
                    }
                };
                Atom::Primitive(Primitive { value })
            }
            tag::SWIZZLE => Atom::Swizzle(Swizzle {
                src: self.index()?,
                code: self.code("swizzle", SwizzleCode::from_code)?,
            }),
            tag::OPERATION => Atom::Operation(Operation {
                a: self.index()?,
                b: self.index()?,
                code: self.code("operation", OperationCode::from_code)?,
            }),
            tag::INTRINSIC => Atom::Intrinsic(Intrinsic {
                args: self.index()?,
                code: self.code("intrinsic", IntrinsicCode::from_code)?,
            }),
            tag::LIST => Atom::List(List {
                item: self.index()?,
                next: self.index()?,
            }),
            tag::CONSTRUCT => Atom::Construct(Construct {
                ty: self.index()?,
                args: self.index()?,
                mode: self.code("constructor mode", ConstructorMode::from_code)?,
            }),
            tag::CALL => Atom::Call(Call {
                callee: CallableId(self.u32()?),
                ty: self.index()?,
                args: self.index()?,
            }),
            tag::STORE => Atom::Store(Store {
                dst: self.index()?,
                src: self.index()?,
            }),
            tag::LOAD => Atom::Load(Load {
                src: self.index()?,
                idx: self.i32()?,
            }),
            tag::ARRAY_ACCESS => Atom::ArrayAccess(ArrayAccess {
                src: self.index()?,
                loc: self.index()?,
            }),
            tag::BRANCH => Atom::Branch(Branch {
                cond: self.index()?,
                failto: self.index()?,
                kind: self.code("branch", BranchKind::from_code)?,
            }),
            tag::RETURN => Atom::Return(Return {
                value: self.index()?,
            }),
            other => {
                return Err(IrError::Stream(format!("unknown atom tag {other} at byte {at}")));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
        let half = b.emit(Primitive {
            value: PrimitiveValue::F32(0.5),
        });
        let product = b.emit(Operation {
            a: p,
            b: half,
            code: OperationCode::Multiplication,
        });
        b.synthesize(product);
        b.decorate(p, Decoration::new("scale"));
        b.emit(Return { value: product });
        b
    }

    #[test]
    fn round_trip() {
        let f = Function::new("half", CallableId(7), sample()).unwrap();
        let bytes = write_functions([&f]);
        let back = read_functions(&bytes).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].name, "half");
        assert_eq!(back[0].id, CallableId(7));
        assert_eq!(back[0].buffer, f.buffer);
    }

    #[test]
    fn truncated_stream() {
        let f = Function::new("half", CallableId(0), sample()).unwrap();
        let bytes = write_functions([&f]);
        let err = read_functions(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, IrError::Stream(_)));
    }

    #[test]
    fn bad_tag() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(b'f');
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(200);
        let err = read_buffers(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown atom tag 200"));
    }

    #[test]
    fn forward_reference_rejected() {
        let mut b = Buffer::new();
        b.emit(Return {
            value: Index::new(3),
        });
        let bytes = {
            let mut w = Writer::default();
            w.u32(1);
            w.str("bad");
            w.atoms(CallableId(0), &b);
            w.bytes
        };
        assert!(matches!(
            read_buffers(&bytes),
            Err(IrError::Structural { .. })
        ));
    }
}
