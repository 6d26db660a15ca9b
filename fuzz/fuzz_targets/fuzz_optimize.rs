#![no_main]

use libfuzzer_sys::fuzz_target;
use thunder_ir::Function;

fuzz_target!(|data: &[u8]| {
    let Ok(buffers) = thunder_ir::stream::read_buffers(data) else {
        return;
    };
    for (name, id, buffer) in buffers {
        let Ok(mut function) = Function::new(name, id, buffer) else {
            continue;
        };
        if thunder_opt::optimize_function(&mut function).is_err() {
            continue;
        }
        // Optimization is idempotent.
        let once = function.buffer.clone();
        if thunder_opt::optimize_function(&mut function).is_ok() {
            assert_eq!(function.buffer, once);
        }
    }
});
