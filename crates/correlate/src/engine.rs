//! 상관 분석 엔진
//!
//! [`CorrelationEngine`]은 모든 상관 규칙과 그 윈도우 상태를 소유합니다.
//! 탐지 기록을 하나씩 받아 규칙 순서대로 평가하고 발화한 알림을 돌려줍니다.
//! 윈도우 상태는 영속화하지 않으며, 재시작하면 빈 상태에서 시작합니다.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use netwarden_core::config::NetwardenConfig;
use netwarden_core::metrics as m;
use netwarden_core::pipeline::CorrelationRule;
use netwarden_core::types::{AlertRecord, DetectionRecord};

use crate::rules;

/// 엔진 통계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// 평가한 탐지 기록 수
    pub detections_ingested: u64,
    /// 발화한 알림 수
    pub alerts_emitted: u64,
    /// 읽지 못해 건너뛴 탐지 로그 줄 수
    pub lines_skipped: u64,
}

/// 상관 분석 엔진
pub struct CorrelationEngine {
    rules: Vec<Box<dyn CorrelationRule>>,
    stats: EngineStats,
    prune_every: u64,
    since_prune: u64,
    latest: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for CorrelationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationEngine")
            .field("rules", &self.rule_names())
            .field("stats", &self.stats)
            .finish()
    }
}

impl CorrelationEngine {
    /// 주어진 규칙들로 엔진을 생성합니다.
    pub fn new(rules: Vec<Box<dyn CorrelationRule>>) -> Self {
        Self {
            rules,
            stats: EngineStats::default(),
            prune_every: 0,
            since_prune: 0,
            latest: None,
        }
    }

    /// 설정에서 기본 규칙 세트로 엔진을 생성합니다.
    pub fn from_config(config: &NetwardenConfig) -> Self {
        let mut engine = Self::new(rules::from_config(config));
        engine.prune_every = config.limits.prune_every;
        engine
    }

    /// 탐지 기록 하나를 모든 규칙에 전달하고 발화한 알림을 반환합니다.
    pub fn ingest(&mut self, detection: &DetectionRecord) -> Vec<AlertRecord> {
        self.stats.detections_ingested += 1;
        metrics::counter!(m::CORRELATION_DETECTIONS_INGESTED_TOTAL).increment(1);

        let mut alerts = Vec::new();
        for rule in self.rules.iter_mut() {
            if let Some(alert) = rule.evaluate(detection) {
                info!(
                    rule = %alert.meta_rule_name,
                    grouping_key = %alert.grouping_key,
                    trigger_count = alert.trigger_count,
                    window_end = %alert.window_end,
                    "correlation alert fired"
                );
                metrics::counter!(m::ALERTS_TOTAL, m::LABEL_RULE => alert.meta_rule_name.clone())
                    .increment(1);
                alerts.push(alert);
            }
        }
        self.stats.alerts_emitted += alerts.len() as u64;

        self.latest = Some(match self.latest {
            Some(latest) => latest.max(detection.timestamp),
            None => detection.timestamp,
        });
        self.maybe_prune();

        alerts
    }

    /// 여러 탐지 기록을 순서대로 평가합니다.
    pub fn ingest_all<'a>(
        &mut self,
        detections: impl IntoIterator<Item = &'a DetectionRecord>,
    ) -> Vec<AlertRecord> {
        detections
            .into_iter()
            .flat_map(|d| self.ingest(d))
            .collect()
    }

    /// 읽지 못한 로그 줄 수를 더합니다.
    pub fn record_skipped(&mut self, lines: u64) {
        self.stats.lines_skipped += lines;
    }

    /// 모든 규칙의 누적 상태를 초기화합니다.
    pub fn reset(&mut self) {
        for rule in self.rules.iter_mut() {
            rule.reset();
        }
        self.latest = None;
        self.since_prune = 0;
        debug!("correlation state reset");
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
            let pruned: usize = self.rules.iter_mut().map(|r| r.prune(now)).sum();
            if pruned > 0 {
                debug!(pruned, "pruned idle correlation groups");
            }
        }
    }

    /// 현재 통계
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// 규칙 이름 목록 (평가 순서)
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}
