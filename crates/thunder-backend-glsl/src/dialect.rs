//! GLSL spelling of types, literals and built-in calls.

use thunder_backend_core::{BackendError, Dialect, Direction, naming};
use thunder_ir::{ImageType, IntrinsicCode, PrimitiveType, PrimitiveValue, SamplerType};

/// The GLSL dialect.
#[derive(Clone, Copy, Debug, Default)]
pub struct Glsl;

/// `""`, `"i"` or `"u"` for a resource result type.
fn result_prefix(result: PrimitiveType) -> &'static str {
    match result.scalar() {
        PrimitiveType::I32 => "i",
        PrimitiveType::U32 => "u",
        _ => "",
    }
}

fn float(value: f64, suffix: &str) -> String {
    if value.is_nan() {
        return "(0.0 / 0.0)".into();
    }
    if value.is_infinite() {
        let sign = if value < 0.0 { "-" } else { "" };
        return format!("({sign}1.0 / 0.0)");
    }
    format!("{value:?}{suffix}")
}

impl Dialect for Glsl {
    fn primitive(&self, p: PrimitiveType) -> String {
        p.glsl().to_string()
    }

    fn array(&self, element: &str, size: i32) -> String {
        if size < 0 {
            format!("{element}[]")
        } else {
            format!("{element}[{size}]")
        }
    }

    fn image(&self, image: ImageType) -> Result<String, BackendError> {
        Ok(format!(
            "{}image{}D",
            result_prefix(image.result),
            image.dimension
        ))
    }

    fn sampler(&self, sampler: SamplerType) -> Result<String, BackendError> {
        Ok(format!(
            "{}sampler{}D",
            result_prefix(sampler.result),
            sampler.dimension
        ))
    }

    fn buffer_reference(&self, _base: &str, id: i32) -> String {
        naming::buffer_reference(id)
    }

    fn literal(&self, value: PrimitiveValue) -> String {
        match value {
            PrimitiveValue::Bool(v) => v.to_string(),
            PrimitiveValue::I32(v) => v.to_string(),
            PrimitiveValue::U32(v) => format!("{v}u"),
            PrimitiveValue::F32(v) => {
                if v.is_finite() {
                    format!("{v:?}")
                } else {
                    float(v as f64, "")
                }
            }
            PrimitiveValue::F64(v) => float(v, "lf"),
            PrimitiveValue::U64(v) => format!("{v}ul"),
        }
    }

    fn intrinsic(&self, code: IntrinsicCode, args: &[String]) -> Result<String, BackendError> {
        if code.is_keyword() {
            return Ok(code.glsl_name().to_string());
        }
        if code.is_layout() {
            return Err(BackendError::Other(format!(
                "{code} configures the unit and has no expression"
            )));
        }
        Ok(format!("{}({})", code.glsl_name(), args.join(", ")))
    }

    fn block_member(&self, block: &str, phantom: bool) -> String {
        if phantom {
            block.to_string()
        } else {
            format!("{block}.data")
        }
    }

    fn dereference(&self, reference: &str, phantom: bool) -> String {
        self.block_member(reference, phantom)
    }

    fn parameter(&self, ty: &str, name: &str, direction: Direction) -> String {
        let qualifier = match direction {
            Direction::Value => "",
            Direction::In => "in ",
            Direction::Out => "out ",
            Direction::InOut => "inout ",
        };
        format!("{qualifier}{ty} {name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals() {
        assert_eq!(Glsl.literal(PrimitiveValue::F32(1.0)), "1.0");
        assert_eq!(Glsl.literal(PrimitiveValue::F32(0.25)), "0.25");
        assert_eq!(Glsl.literal(PrimitiveValue::U32(3)), "3u");
        assert_eq!(Glsl.literal(PrimitiveValue::I32(-2)), "-2");
        assert_eq!(Glsl.literal(PrimitiveValue::F64(2.5)), "2.5lf");
        assert_eq!(Glsl.literal(PrimitiveValue::U64(7)), "7ul");
        assert_eq!(Glsl.literal(PrimitiveValue::Bool(true)), "true");
        assert_eq!(Glsl.literal(PrimitiveValue::F32(f32::INFINITY)), "(1.0 / 0.0)");
    }

    #[test]
    fn resource_types() {
        let image = ImageType {
            result: PrimitiveType::UVec4,
            dimension: 2,
        };
        assert_eq!(Glsl.image(image).unwrap(), "uimage2D");
        let sampler = SamplerType {
            result: PrimitiveType::Vec4,
            dimension: 3,
        };
        assert_eq!(Glsl.sampler(sampler).unwrap(), "sampler3D");
        assert_eq!(Glsl.array("float", -1), "float[]");
        assert_eq!(Glsl.buffer_reference("Camera", 2), "_Ref2");
    }

    #[test]
    fn intrinsics() {
        let args = vec!["s0".to_string(), "s1".to_string()];
        assert_eq!(
            Glsl.intrinsic(IntrinsicCode::Dfdx, &args[..1]).unwrap(),
            "dFdx(s0)"
        );
        assert_eq!(
            Glsl.intrinsic(IntrinsicCode::Max, &args).unwrap(),
            "max(s0, s1)"
        );
        assert_eq!(Glsl.intrinsic(IntrinsicCode::Discard, &[]).unwrap(), "discard");
        assert!(Glsl.intrinsic(IntrinsicCode::LayoutLocalSize, &[]).is_err());
    }

    #[test]
    fn blocks_and_parameters() {
        assert_eq!(Glsl.block_member("_buffer1", false), "_buffer1.data");
        assert_eq!(Glsl.block_member("_pc", true), "_pc");
        assert_eq!(
            Glsl.parameter("vec3", "_arg0", Direction::InOut),
            "inout vec3 _arg0"
        );
    }
}
