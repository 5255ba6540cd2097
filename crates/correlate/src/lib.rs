#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`rules`]: `icmp_flood_meta`, `repeated_rule` 상관 규칙
//! - [`engine`]: 규칙과 상태를 소유하는 [`CorrelationEngine`]
//! - [`tail`]: 일괄 처리와 커서 기반 tail 처리
//! - [`cursor`]: 영속 tail 커서
//! - [`views`]: 탐지 로그 리포트 (rule-stats, timeline, top-talkers)

pub mod cursor;
pub mod engine;
pub mod rules;
pub mod tail;
pub mod views;

// --- 주요 타입 re-export ---

// 엔진
pub use engine::{CorrelationEngine, EngineStats};

// 규칙
pub use rules::{IcmpFloodMetaRule, RULE_ICMP_FLOOD_META, RULE_REPEATED_RULE, RepeatedRuleRule};

// 수집
pub use cursor::TailCursor;
pub use tail::{CorrelateReport, Follower, correlate_batch};

// 리포트
pub use views::{
    DEFAULT_TOP_TALKERS, RuleCount, TalkerCount, TimelineBucket, rule_stats, timeline, top_talkers,
};
