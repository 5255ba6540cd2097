//! DNS 의심 이름 탐지기
//!
//! 질의 이름 하나에 대해 세 가지 신호를 계산합니다.
//! - 가장 긴 레이블 길이 > `dns_label_max` → `label_too_long`
//! - 이름 전체 길이 > `dns_name_max` → `name_too_long`
//! - 레이블 문자 분포의 Shannon 엔트로피 > `entropy_threshold` → `high_entropy`
//!
//! 여러 사유가 동시에 성립하면 한 기록의 `details.reasons`에 모두 담깁니다.

use std::collections::HashMap;

use netwarden_core::error::DetectorError;
use netwarden_core::event::NetworkEvent;
use netwarden_core::pipeline::Detector;
use netwarden_core::types::{DetectionRecord, Severity};

use super::RULE_DNS_SUSPICIOUS;

/// 레이블 길이 초과 사유
pub const REASON_LABEL_TOO_LONG: &str = "label_too_long";
/// 이름 길이 초과 사유
pub const REASON_NAME_TOO_LONG: &str = "name_too_long";
/// 높은 엔트로피 사유
pub const REASON_HIGH_ENTROPY: &str = "high_entropy";

/// DNS 의심 이름 탐지기 (상태 없음)
#[derive(Debug, Clone)]
pub struct DnsSuspiciousDetector {
    label_max: usize,
    name_max: usize,
    entropy_threshold: f64,
}

impl DnsSuspiciousDetector {
    /// 새 DNS 탐지기를 생성합니다.
    pub fn new(label_max: usize, name_max: usize, entropy_threshold: f64) -> Self {
        Self {
            label_max,
            name_max,
            entropy_threshold,
        }
    }

    /// 질의 이름을 분석합니다. 의심 사유가 없으면 `None`을 반환합니다.
    pub fn analyze(&self, query_name: &str) -> Option<NameAnalysis> {
        // 루트를 나타내는 마지막 점은 이름의 일부가 아님
        let name = query_name.trim().trim_end_matches('.');
        if name.is_empty() {
            return None;
        }

        let labels: Vec<&str> = name.split('.').filter(|l| !l.is_empty()).collect();
        let max_label_len = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        let name_len = name.chars().count();
        let entropy = shannon_entropy(
            labels
                .iter()
                .flat_map(|l| l.chars())
                .map(|c| c.to_ascii_lowercase()),
        );

        let mut reasons = Vec::new();
        if max_label_len > self.label_max {
            reasons.push(REASON_LABEL_TOO_LONG);
        }
        if name_len > self.name_max {
            reasons.push(REASON_NAME_TOO_LONG);
        }
        if entropy > self.entropy_threshold {
            reasons.push(REASON_HIGH_ENTROPY);
        }

        if reasons.is_empty() {
            return None;
        }

        Some(NameAnalysis {
            name: name.to_owned(),
            max_label_len,
            name_len,
            entropy,
            reasons,
        })
    }
}

/// 질의 이름 분석 결과
#[derive(Debug, Clone, PartialEq)]
pub struct NameAnalysis {
    /// 마지막 점을 뗀 질의 이름
    pub name: String,
    /// 가장 긴 레이블 길이
    pub max_label_len: usize,
    /// 이름 전체 길이
    pub name_len: usize,
    /// Shannon 엔트로피 (bits/char)
    pub entropy: f64,
    /// 성립한 사유
    pub reasons: Vec<&'static str>,
}

impl Detector for DnsSuspiciousDetector {
    fn name(&self) -> &str {
        RULE_DNS_SUSPICIOUS
    }

    fn observe(&mut self, event: &NetworkEvent) -> Result<Vec<DetectionRecord>, DetectorError> {
        let Some(query_name) = event.dns_query() else {
            return Ok(Vec::new());
        };
        let Some(analysis) = self.analyze(query_name) else {
            return Ok(Vec::new());
        };

        let record = DetectionRecord::new(
            RULE_DNS_SUSPICIOUS,
            Severity::Medium,
            event.src_ip,
            event.timestamp,
        )
        .with_detail("query_name", analysis.name)
        .with_detail("dst_ip", event.dst_ip.to_string())
        .with_detail("max_label_len", analysis.max_label_len as u64)
        .with_detail("name_len", analysis.name_len as u64)
        .with_detail("entropy", round4(analysis.entropy))
        .with_detail("reasons", analysis.reasons);

        Ok(vec![record])
    }
}

/// 문자 분포의 Shannon 엔트로피 (bits/char)
///
/// 빈 입력은 0을 반환합니다.
pub fn shannon_entropy(chars: impl IntoIterator<Item = char>) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in chars {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    let entropy: f64 = counts
        .values()
        .map(|&count| {
            let p = count as f64 / n;
            -p * p.log2()
        })
        .sum();
    // 단일 문자 입력에서 -0.0이 나오지 않도록 정규화
    entropy.max(0.0)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
