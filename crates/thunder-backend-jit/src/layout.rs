//! Packed argument and result layout.
//!
//! Values cross the native ABI as a flat run of scalars. Vectors and
//! matrices contribute one scalar per component, aggregates their fields
//! in order. Each scalar sits at its natural alignment; booleans occupy
//! four bytes.

use cranelift::prelude::*;
use thunder_backend_core::BackendError;
use thunder_ir::PrimitiveType;
use thunder_link::{DataType, LinkageUnit, UnitType};

/// Scalar positions of a value type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Layout {
    pub scalars: Vec<PrimitiveType>,
    /// Byte offset of each scalar.
    pub offsets: Vec<u32>,
    /// Total size in bytes, padded to the widest alignment.
    pub size: u32,
}

impl Layout {
    pub fn of(unit: &LinkageUnit<'_>, ty: &UnitType) -> Result<Self, BackendError> {
        Ok(Self::pack(scalars(unit, ty)?))
    }

    /// Packs the scalars of several values back to back.
    pub fn concat(unit: &LinkageUnit<'_>, types: &[UnitType]) -> Result<Self, BackendError> {
        let mut all = Vec::new();
        for ty in types {
            all.extend(scalars(unit, ty)?);
        }
        Ok(Self::pack(all))
    }

    fn pack(scalars: Vec<PrimitiveType>) -> Self {
        let mut offsets = Vec::with_capacity(scalars.len());
        let mut at = 0u32;
        let mut align = 1u32;
        for &s in &scalars {
            let size = memory_size(s);
            align = align.max(size);
            at = at.next_multiple_of(size);
            offsets.push(at);
            at += size;
        }
        Self {
            scalars,
            offsets,
            size: at.next_multiple_of(align),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty()
    }

    /// Loads every scalar from `base + offset`.
    pub fn load(&self, builder: &mut FunctionBuilder<'_>, base: Value, offset: u32) -> Vec<Value> {
        self.scalars
            .iter()
            .zip(&self.offsets)
            .map(|(&s, &at)| {
                let raw = builder
                    .ins()
                    .load(memory_type(s), MemFlags::new(), base, (offset + at) as i32);
                if s == PrimitiveType::Boolean {
                    builder.ins().icmp_imm(IntCC::NotEqual, raw, 0)
                } else {
                    raw
                }
            })
            .collect()
    }

    /// Stores `values` to `base + offset`.
    pub fn store(
        &self,
        builder: &mut FunctionBuilder<'_>,
        base: Value,
        offset: u32,
        values: &[Value],
    ) {
        for ((&s, &at), &value) in self.scalars.iter().zip(&self.offsets).zip(values) {
            let raw = if s == PrimitiveType::Boolean {
                builder.ins().uextend(types::I32, value)
            } else {
                value
            };
            builder
                .ins()
                .store(MemFlags::new(), raw, base, (offset + at) as i32);
        }
    }
}

/// Scalars making up a value of `ty`, in memory order.
pub fn scalars(unit: &LinkageUnit<'_>, ty: &UnitType) -> Result<Vec<PrimitiveType>, BackendError> {
    match *ty {
        UnitType::Nil => Ok(Vec::new()),
        UnitType::Data(data) => data_scalars(unit, data),
        other => Err(BackendError::Unsupported(format!(
            "values of type {other} cannot cross the native ABI"
        ))),
    }
}

fn data_scalars(unit: &LinkageUnit<'_>, data: DataType) -> Result<Vec<PrimitiveType>, BackendError> {
    match data {
        DataType::Primitive(PrimitiveType::AccelerationStructure) => Err(BackendError::Unsupported(
            "acceleration structures have no native representation".into(),
        )),
        DataType::Primitive(p) => Ok(vec![p.scalar(); p.components()]),
        DataType::Aggregate(index) => {
            let aggregate = unit
                .aggregate(index)
                .ok_or_else(|| BackendError::Other(format!("aggregate {index} is not registered")))?;
            let mut all = Vec::new();
            for field in &aggregate.fields {
                all.extend(data_scalars(unit, field.ty)?);
            }
            Ok(all)
        }
    }
}

/// Scalar range field `field` covers within a value of aggregate `index`.
pub fn field_range(
    unit: &LinkageUnit<'_>,
    index: usize,
    field: usize,
) -> Result<std::ops::Range<usize>, BackendError> {
    let aggregate = unit
        .aggregate(index)
        .ok_or_else(|| BackendError::Other(format!("aggregate {index} is not registered")))?;
    let mut start = 0;
    for (k, f) in aggregate.fields.iter().enumerate() {
        let len = data_scalars(unit, f.ty)?.len();
        if k == field {
            return Ok(start..start + len);
        }
        start += len;
    }
    Err(BackendError::Other(format!(
        "aggregate `{}` has no field {field}",
        aggregate.name
    )))
}

/// Cranelift type a scalar is computed in.
pub fn value_type(scalar: PrimitiveType) -> Type {
    match scalar {
        PrimitiveType::Boolean => types::I8,
        PrimitiveType::F32 => types::F32,
        PrimitiveType::F64 => types::F64,
        PrimitiveType::U64 => types::I64,
        _ => types::I32,
    }
}

fn memory_type(scalar: PrimitiveType) -> Type {
    match scalar {
        PrimitiveType::Boolean => types::I32,
        other => value_type(other),
    }
}

fn memory_size(scalar: PrimitiveType) -> u32 {
    memory_type(scalar).bytes()
}
