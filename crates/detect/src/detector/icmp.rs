//! ICMP 홍수 탐지기
//!
//! 출발지 IP별로 ICMP 이벤트 시각을 `icmp_window_sec` 윈도우에 넣고,
//! 남은 수가 `icmp_per_sec * icmp_window_sec`를 넘으면 발화합니다.
//!
//! # 억제 정책
//! 발화한 키는 해제 상태가 되고, 이후 관측에서 윈도우 수가 임계값 이하로
//! 떨어져야 다시 무장합니다. 지속되는 홍수에서 패킷마다 탐지가 나오지 않습니다.

use std::net::IpAddr;

use chrono::DateTime;
use chrono::Utc;
use tracing::debug;

use netwarden_core::config::{LimitsConfig, ThresholdsConfig};
use netwarden_core::error::DetectorError;
use netwarden_core::event::NetworkEvent;
use netwarden_core::pipeline::Detector;
use netwarden_core::types::{DetectionRecord, Severity};
use netwarden_core::window::{Hysteresis, KeyedWindows};

use super::RULE_ICMP_FLOOD;

/// ICMP 홍수 탐지기
#[derive(Debug)]
pub struct IcmpFloodDetector {
    windows: KeyedWindows<IpAddr, (), Hysteresis>,
    threshold: u64,
    window_sec: u64,
}

impl IcmpFloodDetector {
    /// 새 ICMP 홍수 탐지기를 생성합니다.
    pub fn new(thresholds: &ThresholdsConfig, limits: &LimitsConfig) -> Self {
        Self {
            windows: KeyedWindows::new(
                thresholds.icmp_window(),
                limits.max_entries_per_key,
                limits.max_tracked_keys,
            ),
            threshold: thresholds.icmp_threshold(),
            window_sec: thresholds.icmp_window_sec,
        }
    }

    /// 윈도우 기준 발화 임계값
    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

impl Detector for IcmpFloodDetector {
    fn name(&self) -> &str {
        RULE_ICMP_FLOOD
    }

    fn observe(&mut self, event: &NetworkEvent) -> Result<Vec<DetectionRecord>, DetectorError> {
        if !event.is_icmp() {
            return Ok(Vec::new());
        }

        let Some(slot) = self.windows.observe(&event.src_ip, event.timestamp, ()) else {
            debug!(src_ip = %event.src_ip, "late icmp event dropped");
            return Ok(Vec::new());
        };

        let count = slot.window.len() as u64;
        if !slot.state.update(count > self.threshold) {
            return Ok(Vec::new());
        }

        let record = DetectionRecord::new(
            RULE_ICMP_FLOOD,
            Severity::High,
            event.src_ip,
            event.timestamp,
        )
        .with_detail("count", count)
        .with_detail("threshold", self.threshold)
        .with_detail("window_sec", self.window_sec)
        .with_detail("rate_per_sec", count as f64 / self.window_sec as f64);

        Ok(vec![record])
    }

    fn prune(&mut self, now: DateTime<Utc>) -> usize {
        self.windows.prune_idle(now)
    }

    fn late_events(&self) -> u64 {
        self.windows.late_events()
    }

    fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
