//! 탐지기 -- 원시 이벤트 스트림 위의 분석기
//!
//! 각 탐지기는 [`netwarden_core::Detector`]를 구현하며 자신의 윈도우 상태를 독점 소유합니다.
//!
//! ```text
//! NetworkEvent ──▶ DetectorPipeline ──▶ Vec<DetectionRecord>
//!                      │
//!                      ├── DnsSuspiciousDetector  (상태 없음)
//!                      ├── IcmpFloodDetector      (src_ip별 윈도우 + hysteresis)
//!                      ├── ArpSpoofDetector       (sender IP별 MAC 윈도우)
//!                      └── HttpKeywordDetector    (상태 없음)
//! ```

pub mod arp;
pub mod dns;
pub mod http;
pub mod icmp;

pub use arp::ArpSpoofDetector;
pub use dns::{DnsSuspiciousDetector, shannon_entropy};
pub use http::HttpKeywordDetector;
pub use icmp::IcmpFloodDetector;

use netwarden_core::Detector;
use netwarden_core::config::NetwardenConfig;

/// DNS 의심 이름 규칙명
pub const RULE_DNS_SUSPICIOUS: &str = "dns_suspicious";
/// ICMP 홍수 규칙명
pub const RULE_ICMP_FLOOD: &str = "icmp_flood";
/// ARP 스푸핑 규칙명
pub const RULE_ARP_SPOOF: &str = "arp_spoof";
/// HTTP 키워드 규칙명
pub const RULE_HTTP_KEYWORD: &str = "http_keyword";

/// 설정에서 활성화된 탐지기를 고정된 순서로 생성합니다.
///
/// 순서는 DNS, ICMP, ARP, HTTP이며 같은 이벤트에서 나온 탐지 기록의 순서를 결정합니다.
pub fn from_config(config: &NetwardenConfig) -> Vec<Box<dyn Detector>> {
    let mut detectors: Vec<Box<dyn Detector>> = Vec::new();
    let thresholds = &config.thresholds;
    let limits = &config.limits;

    if config.rules.dns_suspicious {
        detectors.push(Box::new(DnsSuspiciousDetector::new(
            thresholds.dns_label_max,
            thresholds.dns_name_max,
            thresholds.entropy_threshold,
        )));
    }
    if config.rules.icmp_flood {
        detectors.push(Box::new(IcmpFloodDetector::new(thresholds, limits)));
    }
    if config.rules.arp_spoof {
        detectors.push(Box::new(ArpSpoofDetector::new(thresholds, limits)));
    }
    if config.rules.http_keyword {
        detectors.push(Box::new(HttpKeywordDetector::new(&thresholds.http_keywords)));
    }

    detectors
}

/// 문자 단위로 잘라낸 문자열
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_owned(),
        None => text.to_owned(),
    }
}
