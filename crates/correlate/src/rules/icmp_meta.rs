//! ICMP 홍수 메타 알림
//!
//! `icmp_flood` 탐지를 `source_ip`별로 묶어 `icmp_meta_window_sec` 윈도우에 넣고,
//! 윈도우 수가 `icmp_meta_threshold`에 도달하면 알림을 냅니다.
//! 발화 후에는 수가 임계값 아래로 떨어져야 다시 무장합니다.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use tracing::debug;

use netwarden_core::config::{CorrelationConfig, LimitsConfig};
use netwarden_core::pipeline::CorrelationRule;
use netwarden_core::types::{AlertRecord, DetectionRecord};
use netwarden_core::window::{Hysteresis, KeyedWindows};

use super::{RULE_ICMP_FLOOD_META, SOURCE_RULE_ICMP_FLOOD};

/// ICMP 홍수 메타 규칙
#[derive(Debug)]
pub struct IcmpFloodMetaRule {
    /// source_ip별 탐지 ID 윈도우
    windows: KeyedWindows<IpAddr, String, Hysteresis>,
    threshold: u64,
}

impl IcmpFloodMetaRule {
    /// 새 메타 규칙을 생성합니다.
    pub fn new(correlation: &CorrelationConfig, limits: &LimitsConfig) -> Self {
        Self {
            windows: KeyedWindows::new(
                correlation.icmp_meta_window(),
                limits.max_entries_per_key,
                limits.max_tracked_keys,
            ),
            threshold: correlation.icmp_meta_threshold,
        }
    }

    /// 너무 늦게 도착해 버려진 탐지 수
    pub fn late_detections(&self) -> u64 {
        self.windows.late_events()
    }
}

impl CorrelationRule for IcmpFloodMetaRule {
    fn name(&self) -> &str {
        RULE_ICMP_FLOOD_META
    }

    fn evaluate(&mut self, detection: &DetectionRecord) -> Option<AlertRecord> {
        if detection.rule_name != SOURCE_RULE_ICMP_FLOOD {
            return None;
        }

        let Some(slot) = self.windows.observe(
            &detection.source_ip,
            detection.timestamp,
            detection.id.clone(),
        ) else {
            debug!(source_ip = %detection.source_ip, "late detection dropped from meta window");
            return None;
        };

        let count = slot.window.len() as u64;
        if !slot.state.update(count >= self.threshold) {
            return None;
        }

        let window_end = detection.timestamp;
        let window_start = slot
            .window
            .oldest()
            .map(|entry| entry.timestamp)
            .unwrap_or(window_end);
        let contributing_detection_ids = slot.window.iter().map(|e| e.value.clone()).collect();

        Some(AlertRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: window_end,
            meta_rule_name: RULE_ICMP_FLOOD_META.to_owned(),
            window_start,
            window_end,
            trigger_count: count,
            grouping_key: detection.source_ip.to_string(),
            contributing_detection_ids,
        })
    }

    fn reset(&mut self) {
        self.windows.clear();
    }

    fn prune(&mut self, now: DateTime<Utc>) -> usize {
        self.windows.prune_idle(now)
    }
}
