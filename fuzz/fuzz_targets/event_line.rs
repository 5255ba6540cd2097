#![no_main]

use libfuzzer_sys::fuzz_target;
use netwarden_core::config::NetwardenConfig;
use netwarden_detect::DetectorPipeline;
use netwarden_detect::source::parse_event_line;

fuzz_target!(|data: &[u8]| {
    // 정규화에 성공한 입력은 모든 탐지기를 통과시켜 패닉 격리까지 확인
    if let Some(Ok(event)) = parse_event_line(1, data) {
        let mut pipeline = DetectorPipeline::from_config(&NetwardenConfig::default());
        let _ = pipeline.process(&event);
        let _ = pipeline.process(&event);
    }
});
