//! 탐지 파이프라인 -- 같은 이벤트 스트림 위에서 N개의 탐지기를 실행합니다.
//!
//! [`DetectorPipeline`]은 모든 탐지기(각자의 윈도우 상태 포함)와 [`PipelineStats`]를
//! 소유하는 명시적 컨텍스트입니다. 실행마다 새로 생성하며 전역 상태를 쓰지 않습니다.
//!
//! # 장애 격리
//! 탐지기 하나가 이벤트 하나에서 `Err`를 반환하거나 패닉하면 경계에서 잡아
//! 탐지기별로 카운트하고 `warn!`으로 남깁니다. 같은 이벤트의 다른 탐지기와
//! 이후 이벤트는 그대로 진행됩니다.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use netwarden_core::config::NetwardenConfig;
use netwarden_core::error::{DetectorError, SourceError};
use netwarden_core::event::NetworkEvent;
use netwarden_core::metrics as m;
use netwarden_core::pipeline::Detector;
use netwarden_core::types::DetectionRecord;

use crate::detector;
use crate::stats::PipelineStats;

/// 기본 prune 주기 (이벤트 수)
pub const DEFAULT_PRUNE_EVERY: u64 = 1024;

/// 탐지 파이프라인
pub struct DetectorPipeline {
    detectors: Vec<Box<dyn Detector>>,
    stats: PipelineStats,
    prune_every: u64,
    since_prune: u64,
    /// 지금까지 본 가장 늦은 이벤트 시각 (prune 기준)
    latest: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for DetectorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorPipeline")
            .field("detectors", &self.detector_names())
            .field("stats", &self.stats)
            .field("prune_every", &self.prune_every)
            .finish()
    }
}

impl DetectorPipeline {
    /// 주어진 탐지기들로 파이프라인을 생성합니다.
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self {
            detectors,
            stats: PipelineStats::default(),
            prune_every: DEFAULT_PRUNE_EVERY,
            since_prune: 0,
            latest: None,
        }
    }

    /// 설정에서 활성화된 탐지기로 파이프라인을 생성합니다.
    pub fn from_config(config: &NetwardenConfig) -> Self {
        Self::new(detector::from_config(config)).with_prune_every(config.limits.prune_every)
    }

    /// prune 주기를 지정합니다. 0은 주기적 prune을 끕니다.
    pub fn with_prune_every(mut self, prune_every: u64) -> Self {
        self.prune_every = prune_every;
        self
    }

    /// 이벤트 하나를 모든 탐지기에 전달하고 탐지 기록을 모읍니다.
    ///
    /// 기록 순서는 탐지기 순서, 그 안에서는 탐지기가 반환한 순서입니다.
    pub fn process(&mut self, event: &NetworkEvent) -> Vec<DetectionRecord> {
        self.stats.events_processed += 1;
        metrics::counter!(m::EVENTS_PROCESSED_TOTAL).increment(1);

        let late_before = self.late_events();
        let mut out = Vec::new();
        for detector in self.detectors.iter_mut() {
            match observe_isolated(detector.as_mut(), event) {
                Ok(records) => out.extend(records),
                Err(err) => {
                    let name = detector.name().to_owned();
                    warn!(
                        detector = %name,
                        event_ts = %event.timestamp,
                        src_ip = %event.src_ip,
                        error = %err,
                        "detector failed on event, continuing"
                    );
                    metrics::counter!(m::DETECTOR_FAILURES_TOTAL, m::LABEL_DETECTOR => name.clone())
                        .increment(1);
                    self.stats.record_failure(&name);
                }
            }
        }

        let late = self.late_events().saturating_sub(late_before);
        if late > 0 {
            metrics::counter!(m::LATE_EVENTS_TOTAL).increment(late);
        }

        for record in &out {
            metrics::counter!(m::DETECTIONS_TOTAL, m::LABEL_RULE => record.rule_name.clone())
                .increment(1);
        }
        self.stats.detections_emitted += out.len() as u64;

        self.latest = Some(match self.latest {
            Some(latest) => latest.max(event.timestamp),
            None => event.timestamp,
        });
        self.maybe_prune();

        out
    }

    /// 정규화에 실패해 건너뛴 입력을 기록합니다.
    pub fn record_skipped(&mut self, err: &SourceError) {
        self.stats.events_skipped += 1;
        metrics::counter!(m::EVENTS_SKIPPED_TOTAL).increment(1);
        warn!(error = %err, "skipping malformed input record");
    }

    /// 모든 탐지기에서 `now` 기준으로 유휴 키를 정리합니다.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let pruned: usize = self.detectors.iter_mut().map(|d| d.prune(now)).sum();
        if pruned > 0 {
            debug!(pruned, now = %now, "pruned idle window keys");
        }
        pruned
    }

    fn maybe_prune(&mut self) {
        if self.prune_every == 0 {
            return;
        }
        self.since_prune += 1;
        if self.since_prune < self.prune_every {
            return;
        }
        self.since_prune = 0;
        if let Some(now) = self.latest {
            self.prune(now);
        }
    }

    /// 현재 통계 스냅샷
    ///
    /// `late_events`는 각 탐지기가 보고한 값을 합산합니다.
    pub fn stats(&self) -> PipelineStats {
        let mut stats = self.stats.clone();
        stats.late_events = self.late_events();
        stats
    }

    fn late_events(&self) -> u64 {
        self.detectors.iter().map(|d| d.late_events()).sum()
    }

    /// 탐지기 이름 목록 (실행 순서)
    pub fn detector_names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// 모든 탐지기가 추적 중인 키 수 합계
    pub fn tracked_keys(&self) -> usize {
        self.detectors.iter().map(|d| d.tracked_keys()).sum()
    }

    /// 탐지기 수
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    /// 탐지기가 하나도 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

/// 탐지기 하나를 패닉 경계 안에서 실행합니다.
///
/// 패닉 후에도 탐지기 상태는 그대로 유지되고 다음 이벤트를 계속 받습니다.
fn observe_isolated(
    detector: &mut dyn Detector,
    event: &NetworkEvent,
) -> Result<Vec<DetectionRecord>, DetectorError> {
    match panic::catch_unwind(AssertUnwindSafe(|| detector.observe(event))) {
        Ok(result) => result,
        Err(payload) => Err(DetectorError::Panicked {
            detector: detector.name().to_owned(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
