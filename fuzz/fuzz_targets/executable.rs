#![no_main]

use libfuzzer_sys::fuzz_target;
use lescope::{
    disassembler::{AnalysisOptions, Explorer, Renderer},
    format::Executable,
};

fuzz_target!(|data: &[u8]| {
    let options = AnalysisOptions::default();
    let Ok(exe) = Executable::parse(data, options.relocation_base) else {
        return;
    };

    let mut explorer = Explorer::new(exe.source(), &options);
    exe.seed(&mut explorer);
    if explorer.analyze().is_ok() {
        let _ = Renderer::new(&explorer, options.render).render_to_string();
    }
});
