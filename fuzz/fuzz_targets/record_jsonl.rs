#![no_main]

use libfuzzer_sys::fuzz_target;
use netwarden_core::types::{AlertRecord, DetectionRecord};
use netwarden_correlate::CorrelationEngine;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<AlertRecord>(data);

    if let Ok(record) = serde_json::from_slice::<DetectionRecord>(data) {
        let mut engine = CorrelationEngine::from_config(&Default::default());
        let _ = engine.ingest(&record);
        let _ = engine.ingest(&record);
    }
});
