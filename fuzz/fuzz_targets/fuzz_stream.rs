#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Malformed streams must be rejected with an error, never a panic.
    if let Ok(ctx) = thunder_link::LinkageUnit::read_stream(data) {
        let ids: Vec<_> = ctx.functions().map(|f| f.id).collect();
        let mut unit = thunder_link::LinkageUnit::new(&ctx);
        for id in ids {
            if unit.add_callable(id).is_err() {
                return;
            }
        }
        let _ = unit.write_assembly();
    }
});
