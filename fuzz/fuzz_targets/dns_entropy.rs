#![no_main]

use libfuzzer_sys::fuzz_target;
use netwarden_detect::detector::shannon_entropy;

fuzz_target!(|data: &[u8]| {
    if let Ok(name) = std::str::from_utf8(data) {
        let h = shannon_entropy(name.chars());
        assert!(h.is_finite() && h >= 0.0, "entropy out of range: {h}");
    }
});
