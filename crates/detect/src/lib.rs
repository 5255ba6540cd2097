#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`detector`]: DNS/ICMP/ARP/HTTP 탐지기와 설정 기반 생성
//! - [`pipeline`]: 탐지기 실행과 장애 격리 ([`DetectorPipeline`])
//! - [`source`]: 캡처 파일 재생과 라이브 피드
//! - [`runtime`]: 오프라인 재생, 라이브 생산자/소비자, dry-run 실행기
//! - [`stats`]: 실행 통계
//!
//! # 아키텍처
//!
//! ```text
//! ReplaySource / LiveSource -> DetectorPipeline -> RecordSink<DetectionRecord>
//!                                   |
//!                    dns_suspicious / icmp_flood / arp_spoof / http_keyword
//! ```

pub mod detector;
pub mod pipeline;
pub mod runtime;
pub mod source;
pub mod stats;

// --- 주요 타입 re-export ---

// 탐지기
pub use detector::{
    ArpSpoofDetector, DnsSuspiciousDetector, HttpKeywordDetector, IcmpFloodDetector,
    RULE_ARP_SPOOF, RULE_DNS_SUSPICIOUS, RULE_HTTP_KEYWORD, RULE_ICMP_FLOOD,
};

// 파이프라인
pub use pipeline::DetectorPipeline;
pub use stats::PipelineStats;

// 소스
pub use source::{LiveSource, ReplaySource, check_interface};

// 실행기
pub use runtime::{RunReport, StopReason, idle_until_cancelled, run_live, run_replay};
