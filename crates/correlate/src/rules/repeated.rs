//! 동일 규칙 반복 알림
//!
//! 수집을 시작한 뒤 `rule_name`별 누적 탐지 수가 `repeated_rule_threshold`에 도달하면
//! 규칙 이름당 한 번 알림을 냅니다. 엔진을 초기화하기 전에는 다시 발화하지 않습니다.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use netwarden_core::pipeline::CorrelationRule;
use netwarden_core::types::{AlertRecord, DetectionRecord};

use super::RULE_REPEATED_RULE;

/// 규칙 이름별 누적 상태
#[derive(Debug, Default)]
struct RuleTally {
    count: u64,
    first_seen: Option<DateTime<Utc>>,
    /// 처음 `threshold`개의 탐지 ID
    first_ids: Vec<String>,
}

/// 반복 규칙 메타 규칙
#[derive(Debug)]
pub struct RepeatedRuleRule {
    threshold: u64,
    tallies: HashMap<String, RuleTally>,
    fired: HashSet<String>,
}

impl RepeatedRuleRule {
    /// 새 반복 규칙을 생성합니다.
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold: threshold.max(1),
            tallies: HashMap::new(),
            fired: HashSet::new(),
        }
    }

    /// 규칙 이름의 누적 탐지 수
    pub fn count(&self, rule_name: &str) -> u64 {
        self.tallies.get(rule_name).map_or(0, |t| t.count)
    }
}

impl CorrelationRule for RepeatedRuleRule {
    fn name(&self) -> &str {
        RULE_REPEATED_RULE
    }

    fn evaluate(&mut self, detection: &DetectionRecord) -> Option<AlertRecord> {
        let rule_name = detection.rule_name.as_str();
        if self.fired.contains(rule_name) {
            // 발화한 규칙은 카운트만 유지
            if let Some(tally) = self.tallies.get_mut(rule_name) {
                tally.count += 1;
            }
            return None;
        }

        let tally = self.tallies.entry(rule_name.to_owned()).or_default();
        tally.count += 1;
        tally.first_seen = Some(match tally.first_seen {
            Some(seen) => seen.min(detection.timestamp),
            None => detection.timestamp,
        });
        if (tally.first_ids.len() as u64) < self.threshold {
            tally.first_ids.push(detection.id.clone());
        }

        if tally.count < self.threshold {
            return None;
        }

        let window_end = detection.timestamp;
        let alert = AlertRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: window_end,
            meta_rule_name: RULE_REPEATED_RULE.to_owned(),
            window_start: tally.first_seen.unwrap_or(window_end),
            window_end,
            trigger_count: tally.count,
            grouping_key: rule_name.to_owned(),
            contributing_detection_ids: std::mem::take(&mut tally.first_ids),
        };
        self.fired.insert(rule_name.to_owned());
        Some(alert)
    }

    fn reset(&mut self) {
        self.tallies.clear();
        self.fired.clear();
    }
}
