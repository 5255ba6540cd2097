//! 리포트 뷰 -- 탐지 로그 위의 읽기 전용 요약
//!
//! - [`rule_stats`]: 규칙별 탐지 수 (내림차순, 동률은 이름순)
//! - [`timeline`]: UTC 분 단위 버킷(`YYYY-MM-DDTHH:MM`)별 탐지 수 (오름차순)
//! - [`top_talkers`]: 출발지 IP별 탐지 수 상위 N개 (내림차순, 동률은 IP순)

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

use netwarden_core::types::DetectionRecord;

/// top-talkers 기본 개수
pub const DEFAULT_TOP_TALKERS: usize = 10;

/// 분 단위 버킷 형식
const MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// 규칙별 탐지 수
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleCount {
    pub rule_name: String,
    pub count: u64,
}

/// 분 단위 탐지 수
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineBucket {
    pub minute: String,
    pub count: u64,
}

/// 출발지 IP별 탐지 수
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TalkerCount {
    pub source_ip: IpAddr,
    pub count: u64,
}

impl fmt::Display for RuleCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<20} {}", self.rule_name, self.count)
    }
}

impl fmt::Display for TimelineBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {}", self.minute, self.count)
    }
}

impl fmt::Display for TalkerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<39} {}", self.source_ip, self.count)
    }
}

/// 규칙별 탐지 수
pub fn rule_stats(records: &[DetectionRecord]) -> Vec<RuleCount> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for record in records {
        *counts.entry(record.rule_name.as_str()).or_insert(0) += 1;
    }
    let mut out: Vec<RuleCount> = counts
        .into_iter()
        .map(|(rule_name, count)| RuleCount {
            rule_name: rule_name.to_owned(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.rule_name.cmp(&b.rule_name)));
    out
}

/// 분 단위 타임라인
pub fn timeline(records: &[DetectionRecord]) -> Vec<TimelineBucket> {
    let mut buckets: BTreeMap<String, u64> = BTreeMap::new();
    for record in records {
        let minute = record.timestamp.format(MINUTE_FORMAT).to_string();
        *buckets.entry(minute).or_insert(0) += 1;
    }
    buckets
        .into_iter()
        .map(|(minute, count)| TimelineBucket { minute, count })
        .collect()
}

/// 탐지 수 상위 출발지 IP
pub fn top_talkers(records: &[DetectionRecord], n: usize) -> Vec<TalkerCount> {
    let mut counts: HashMap<IpAddr, u64> = HashMap::new();
    for record in records {
        *counts.entry(record.source_ip).or_insert(0) += 1;
    }
    let mut out: Vec<TalkerCount> = counts
        .into_iter()
        .map(|(source_ip, count)| TalkerCount { source_ip, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.source_ip.cmp(&b.source_ip)));
    out.truncate(n);
    out
}
