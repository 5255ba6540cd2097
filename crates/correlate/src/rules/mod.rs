//! 상관 분석 규칙 -- 탐지 스트림 위의 2단계 규칙
//!
//! ```text
//! DetectionRecord ──▶ CorrelationEngine ──▶ Vec<AlertRecord>
//!                          │
//!                          ├── IcmpFloodMetaRule  (source_ip별 60초 윈도우 + hysteresis)
//!                          └── RepeatedRuleRule   (rule_name별 누적 카운트, 규칙당 1회)
//! ```

pub mod icmp_meta;
pub mod repeated;

pub use icmp_meta::IcmpFloodMetaRule;
pub use repeated::RepeatedRuleRule;

use netwarden_core::config::NetwardenConfig;
use netwarden_core::pipeline::CorrelationRule;

/// ICMP 홍수 메타 규칙명
pub const RULE_ICMP_FLOOD_META: &str = "icmp_flood_meta";
/// 반복 규칙 메타 규칙명
pub const RULE_REPEATED_RULE: &str = "repeated_rule";

/// ICMP 메타 규칙이 소비하는 탐지 규칙명
pub const SOURCE_RULE_ICMP_FLOOD: &str = "icmp_flood";

/// 설정에서 상관 분석 규칙을 고정된 순서로 생성합니다.
pub fn from_config(config: &NetwardenConfig) -> Vec<Box<dyn CorrelationRule>> {
    vec![
        Box::new(IcmpFloodMetaRule::new(&config.correlation, &config.limits)),
        Box::new(RepeatedRuleRule::new(config.correlation.repeated_rule_threshold)),
    ]
}
