//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않았으면 호출은 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `netwarden_`
//! - 접미어: `_total` (counter), 없음 (gauge)

use metrics::{describe_counter, describe_gauge};

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 탐지기 레이블 키
pub const LABEL_DETECTOR: &str = "detector";

/// 규칙 레이블 키 (탐지 규칙명 또는 메타 규칙명)
pub const LABEL_RULE: &str = "rule";

/// 싱크 레이블 키 (detections, alerts)
pub const LABEL_SINK: &str = "sink";

// ─── 탐지 파이프라인 ───────────────────────────────────────────────

/// 처리된 이벤트 수 (counter)
pub const EVENTS_PROCESSED_TOTAL: &str = "netwarden_events_processed_total";

/// 정규화 실패로 건너뛴 이벤트 수 (counter)
pub const EVENTS_SKIPPED_TOTAL: &str = "netwarden_events_skipped_total";

/// 너무 늦게 도착해 윈도우에서 버려진 관측 수 (counter)
pub const LATE_EVENTS_TOTAL: &str = "netwarden_late_events_total";

/// 탐지기 실패 수 (counter, label: detector)
pub const DETECTOR_FAILURES_TOTAL: &str = "netwarden_detector_failures_total";

/// 생성된 탐지 수 (counter, label: rule)
pub const DETECTIONS_TOTAL: &str = "netwarden_detections_total";

/// 라이브 큐에 대기 중인 이벤트 수 (gauge)
pub const LIVE_QUEUE_DEPTH: &str = "netwarden_live_queue_depth";

// ─── 상관 분석 ─────────────────────────────────────────────────────

/// 상관 분석에 입력된 탐지 수 (counter)
pub const CORRELATION_DETECTIONS_INGESTED_TOTAL: &str =
    "netwarden_correlation_detections_ingested_total";

/// 생성된 알림 수 (counter, label: rule)
pub const ALERTS_TOTAL: &str = "netwarden_alerts_total";

// ─── 싱크 ──────────────────────────────────────────────────────────

/// 싱크 쓰기 실패 수 (counter, label: sink)
pub const SINK_WRITE_FAILURES_TOTAL: &str = "netwarden_sink_write_failures_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// exporter를 설치한 직후 한 번 호출합니다.
pub fn describe_all() {
    describe_counter!(
        EVENTS_PROCESSED_TOTAL,
        "Total number of normalized events driven through the detector pipeline"
    );
    describe_counter!(
        EVENTS_SKIPPED_TOTAL,
        "Total number of input records skipped because they failed to normalize"
    );
    describe_counter!(
        LATE_EVENTS_TOTAL,
        "Total number of observations dropped for arriving behind the window horizon"
    );
    describe_counter!(
        DETECTOR_FAILURES_TOTAL,
        "Total number of detector errors or panics isolated at the detector boundary"
    );
    describe_counter!(DETECTIONS_TOTAL, "Total number of detection records emitted");
    describe_gauge!(
        LIVE_QUEUE_DEPTH,
        "Number of events waiting in the live producer/consumer queue"
    );
    describe_counter!(
        CORRELATION_DETECTIONS_INGESTED_TOTAL,
        "Total number of detection records consumed by the correlation engine"
    );
    describe_counter!(ALERTS_TOTAL, "Total number of correlation alerts emitted");
    describe_counter!(
        SINK_WRITE_FAILURES_TOTAL,
        "Total number of failed append attempts on a record sink"
    );
}
