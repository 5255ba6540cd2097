//! 도메인 타입 -- 탐지 기록, 알림 기록, 심각도
//!
//! [`DetectionRecord`]와 [`AlertRecord`]는 한 번 생성되면 변경되지 않습니다.
//! 싱크는 이 값을 JSON 한 줄로 덧붙이기만 하며, 하위 소비자는 읽기만 합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 탐지 상세 정보 맵 (키 순서가 고정되어 직렬화 결과가 결정적입니다)
pub type Details = BTreeMap<String, serde_json::Value>;

/// 심각도 레벨
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 정보성 이벤트
    #[default]
    Info,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적
    Critical,
}

impl Severity {
    /// 직렬화 형식과 같은 소문자 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 탐지 기록
///
/// 원시 이벤트 스트림에서 규칙 하나가 발화할 때마다 정확히 한 번 기록됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// 기록 ID (UUID v4)
    pub id: String,
    /// 발화시킨 이벤트의 캡처 시각
    pub timestamp: DateTime<Utc>,
    /// 규칙명 (예: `icmp_flood`)
    pub rule_name: String,
    /// 심각도
    pub severity: Severity,
    /// 그룹핑 주체 IP
    pub source_ip: IpAddr,
    /// 규칙별 상세 정보
    #[serde(default)]
    pub details: Details,
}

impl DetectionRecord {
    /// 새 ID를 부여하여 탐지 기록을 만듭니다.
    pub fn new(
        rule_name: impl Into<String>,
        severity: Severity,
        source_ip: IpAddr,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            rule_name: rule_name.into(),
            severity,
            source_ip,
            details: Details::new(),
        }
    }

    /// 상세 필드를 추가합니다.
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_owned(), value.into());
        self
    }
}

impl fmt::Display for DetectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} src={} at {}",
            self.severity,
            self.rule_name,
            self.source_ip,
            self.timestamp.to_rfc3339(),
        )
    }
}

/// 상관 분석 알림 기록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// 알림 ID (UUID v4)
    pub id: String,
    /// 알림 시각 (= `window_end`, 이벤트 시간)
    pub timestamp: DateTime<Utc>,
    /// 메타 규칙명 (예: `icmp_flood_meta`)
    pub meta_rule_name: String,
    /// 윈도우 내 가장 오래된 탐지 시각
    pub window_start: DateTime<Utc>,
    /// 발화시킨 탐지 시각
    pub window_end: DateTime<Utc>,
    /// 발화 시점의 탐지 수
    pub trigger_count: u64,
    /// 그룹핑 키 (출발지 IP 또는 규칙명)
    pub grouping_key: String,
    /// 기여한 탐지 ID (탐지 시각 순)
    pub contributing_detection_ids: Vec<String>,
}

impl fmt::Display for AlertRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} key={} count={} window=[{} .. {}]",
            self.meta_rule_name,
            self.grouping_key,
            self.trigger_count,
            self.window_start.to_rfc3339(),
            self.window_end.to_rfc3339(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
        let parsed: Severity = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, Severity::Medium);
    }

    #[test]
    fn detection_record_has_unique_ids() {
        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        let a = DetectionRecord::new("icmp_flood", Severity::High, ip, ts("2024-01-01T00:00:00Z"));
        let b = DetectionRecord::new("icmp_flood", Severity::High, ip, ts("2024-01-01T00:00:00Z"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn detection_record_json_round_trip_preserves_fields() {
        let record = DetectionRecord::new(
            "dns_suspicious",
            Severity::Medium,
            "10.0.0.5".parse().unwrap(),
            ts("2024-05-01T12:00:00.123456789Z"),
        )
        .with_detail("entropy", 4.2193)
        .with_detail("reasons", serde_json::json!(["high_entropy", "label_too_long"]))
        .with_detail("query_name", "x.example.com");

        let line = serde_json::to_string(&record).unwrap();
        let parsed: DetectionRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn detection_record_line_has_expected_keys() {
        let record = DetectionRecord::new(
            "http_keyword",
            Severity::Low,
            "10.0.0.5".parse().unwrap(),
            ts("2024-05-01T12:00:00Z"),
        );
        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["id", "timestamp", "rule_name", "severity", "source_ip", "details"] {
            assert!(obj.contains_key(key), "missing key {key}");
        }
        assert_eq!(obj["severity"], "low");
    }

    #[test]
    fn alert_record_json_round_trip_preserves_fields() {
        let alert = AlertRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: ts("2024-05-01T12:00:59Z"),
            meta_rule_name: "icmp_flood_meta".to_owned(),
            window_start: ts("2024-05-01T12:00:00Z"),
            window_end: ts("2024-05-01T12:00:59Z"),
            trigger_count: 30,
            grouping_key: "9.9.9.9".to_owned(),
            contributing_detection_ids: vec!["a".to_owned(), "b".to_owned()],
        };
        let line = serde_json::to_string(&alert).unwrap();
        let parsed: AlertRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, alert);
        assert!(alert.to_string().contains("key=9.9.9.9"));
    }
}
