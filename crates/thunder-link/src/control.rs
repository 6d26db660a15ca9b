//! Unit-wide execution layout set by layout intrinsics.

use thunder_ir::{Buffer, Index, Intrinsic, IntrinsicCode, IrError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshShaderSize {
    pub max_vertices: u32,
    pub max_primitives: u32,
}

/// Workgroup and mesh output sizes of the unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlState {
    pub local_size: Option<[u32; 3]>,
    pub mesh_shader_size: Option<MeshShaderSize>,
}

impl ControlState {
    /// Reads the literal arguments of a layout intrinsic.
    pub fn apply(&mut self, buffer: &Buffer, at: Index, layout: &Intrinsic) -> Result<(), IrError> {
        let values = literal_arguments(buffer, at, layout)?;
        match layout.code {
            IntrinsicCode::LayoutLocalSize => {
                if values.is_empty() || values.len() > 3 {
                    return Err(buffer.structural_error(format!(
                        "layout_local_size at {at} takes 1 to 3 sizes, got {}",
                        values.len()
                    )));
                }
                let mut size = [1; 3];
                size[..values.len()].copy_from_slice(&values);
                if let Some(previous) = self.local_size.filter(|p| *p != size) {
                    log::warn!("local size {previous:?} replaced by {size:?}");
                }
                self.local_size = Some(size);
            }
            IntrinsicCode::LayoutMeshShaderSizes => {
                let [max_vertices, max_primitives] = values[..] else {
                    return Err(buffer.structural_error(format!(
                        "layout_mesh_shader_sizes at {at} takes 2 sizes, got {}",
                        values.len()
                    )));
                };
                let size = MeshShaderSize {
                    max_vertices,
                    max_primitives,
                };
                if let Some(previous) = self.mesh_shader_size.filter(|p| *p != size) {
                    log::warn!("mesh output sizes {previous:?} replaced by {size:?}");
                }
                self.mesh_shader_size = Some(size);
            }
            other => {
                return Err(buffer.structural_error(format!(
                    "{other} at {at} is not a layout intrinsic"
                )));
            }
        }
        Ok(())
    }
}

fn literal_arguments(buffer: &Buffer, at: Index, layout: &Intrinsic) -> Result<Vec<u32>, IrError> {
    buffer
        .expand_list(layout.args)?
        .into_iter()
        .map(|arg| {
            buffer
                .atom(arg)?
                .literal()
                .and_then(|v| v.as_integer())
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    buffer.structural_error(format!(
                        "argument {arg} of {} at {at} is not a non-negative integer literal",
                        layout.code
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunder_ir::{List, Primitive, PrimitiveValue};

    fn layout(code: IntrinsicCode, values: &[PrimitiveValue]) -> (Buffer, Index) {
        let mut b = Buffer::new();
        let items: Vec<Index> = values.iter().map(|&value| b.emit(Primitive { value })).collect();
        let mut args = Index::NULL;
        for &item in items.iter().rev() {
            args = b.emit(List { item, next: args });
        }
        let at = b.emit(Intrinsic { args, code });
        (b, at)
    }

    fn run(state: &mut ControlState, b: &Buffer, at: Index) -> Result<(), IrError> {
        let thunder_ir::Atom::Intrinsic(i) = b.atom(at)?.clone() else {
            panic!("not an intrinsic");
        };
        state.apply(b, at, &i)
    }

    #[test]
    fn local_size_pads_with_ones() {
        let (b, at) = layout(
            IntrinsicCode::LayoutLocalSize,
            &[PrimitiveValue::U32(64), PrimitiveValue::I32(2)],
        );
        let mut state = ControlState::default();
        run(&mut state, &b, at).unwrap();
        assert_eq!(state.local_size, Some([64, 2, 1]));
    }

    #[test]
    fn mesh_sizes() {
        let (b, at) = layout(
            IntrinsicCode::LayoutMeshShaderSizes,
            &[PrimitiveValue::U32(64), PrimitiveValue::U32(126)],
        );
        let mut state = ControlState::default();
        run(&mut state, &b, at).unwrap();
        assert_eq!(
            state.mesh_shader_size,
            Some(MeshShaderSize {
                max_vertices: 64,
                max_primitives: 126
            })
        );
    }

    #[test]
    fn non_literal_sizes_are_rejected() {
        let (b, at) = layout(IntrinsicCode::LayoutLocalSize, &[PrimitiveValue::F32(1.5)]);
        assert!(run(&mut ControlState::default(), &b, at).is_err());

        let (b, at) = layout(IntrinsicCode::LayoutMeshShaderSizes, &[PrimitiveValue::U32(3)]);
        assert!(run(&mut ControlState::default(), &b, at).is_err());

        let (b, at) = layout(IntrinsicCode::LayoutLocalSize, &[PrimitiveValue::I32(-4)]);
        assert!(run(&mut ControlState::default(), &b, at).is_err());
    }
}
