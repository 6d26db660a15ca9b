//! Host math functions the generated code calls into.

use cranelift_jit::JITBuilder;
use thunder_ir::IntrinsicCode;

extern "C" fn sinf(x: f32) -> f32 {
    x.sin()
}

extern "C" fn cosf(x: f32) -> f32 {
    x.cos()
}

extern "C" fn tanf(x: f32) -> f32 {
    x.tan()
}

extern "C" fn asinf(x: f32) -> f32 {
    x.asin()
}

extern "C" fn acosf(x: f32) -> f32 {
    x.acos()
}

extern "C" fn atanf(x: f32) -> f32 {
    x.atan()
}

extern "C" fn expf(x: f32) -> f32 {
    x.exp()
}

extern "C" fn logf(x: f32) -> f32 {
    x.ln()
}

extern "C" fn exp2f(x: f32) -> f32 {
    x.exp2()
}

extern "C" fn log2f(x: f32) -> f32 {
    x.log2()
}

extern "C" fn powf(x: f32, y: f32) -> f32 {
    x.powf(y)
}

type Unary = extern "C" fn(f32) -> f32;
type Binary = extern "C" fn(f32, f32) -> f32;

/// Symbol and address of the host function bound to a unary intrinsic.
pub fn unary(code: IntrinsicCode) -> Option<(&'static str, Unary)> {
    use IntrinsicCode as I;
    let f: Unary = match code {
        I::Sin => sinf,
        I::Cos => cosf,
        I::Tan => tanf,
        I::Asin => asinf,
        I::Acos => acosf,
        I::Atan => atanf,
        I::Exp => expf,
        I::Log => logf,
        I::Exp2 => exp2f,
        I::Log2 => log2f,
        _ => return None,
    };
    Some((symbol(code), f))
}

pub fn binary(code: IntrinsicCode) -> Option<(&'static str, Binary)> {
    let f: Binary = match code {
        IntrinsicCode::Pow => powf,
        _ => return None,
    };
    Some((symbol(code), f))
}

fn symbol(code: IntrinsicCode) -> &'static str {
    use IntrinsicCode as I;
    match code {
        I::Sin => "thunder_sinf",
        I::Cos => "thunder_cosf",
        I::Tan => "thunder_tanf",
        I::Asin => "thunder_asinf",
        I::Acos => "thunder_acosf",
        I::Atan => "thunder_atanf",
        I::Exp => "thunder_expf",
        I::Log => "thunder_logf",
        I::Exp2 => "thunder_exp2f",
        I::Log2 => "thunder_log2f",
        I::Pow => "thunder_powf",
        _ => "",
    }
}

/// Makes every host function resolvable by the JIT linker.
pub fn register(builder: &mut JITBuilder) {
    for &code in IntrinsicCode::ALL {
        if let Some((symbol, f)) = unary(code) {
            builder.symbol(symbol, f as *const u8);
        }
        if let Some((symbol, f)) = binary(code) {
            builder.symbol(symbol, f as *const u8);
        }
    }
}
