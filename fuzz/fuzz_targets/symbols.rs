#![no_main]

use libfuzzer_sys::fuzz_target;
use lescope::symbols::SymbolFile;

fuzz_target!(|data: &[u8]| {
    let _ = SymbolFile::parse(data);
});
