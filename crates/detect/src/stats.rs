//! 파이프라인 통계
//!
//! [`PipelineStats`]는 [`DetectorPipeline`](crate::DetectorPipeline)이 소유하는 카운터 묶음입니다.
//! 전역 상태 없이 실행 단위로 생성되며, 실행 종료 시 스냅샷으로 보고됩니다.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// 파이프라인 실행 통계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// 파이프라인을 통과한 이벤트 수
    pub events_processed: u64,
    /// 정규화 실패로 건너뛴 입력 레코드 수
    pub events_skipped: u64,
    /// 생성된 탐지 기록 수
    pub detections_emitted: u64,
    /// 윈도우 지평선 뒤로 도착해 버려진 관측 수 (모든 탐지기 합계)
    pub late_events: u64,
    /// 탐지기별 실패 수 (에러 + 패닉)
    pub detector_failures: BTreeMap<String, u64>,
}

impl PipelineStats {
    /// 모든 탐지기의 실패 합계
    pub fn total_failures(&self) -> u64 {
        self.detector_failures.values().sum()
    }

    pub(crate) fn record_failure(&mut self, detector: &str) {
        *self
            .detector_failures
            .entry(detector.to_owned())
            .or_insert(0) += 1;
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} skipped={} detections={} late={} failures={}",
            self.events_processed,
            self.events_skipped,
            self.detections_emitted,
            self.late_events,
            self.total_failures()
        )
    }
}
