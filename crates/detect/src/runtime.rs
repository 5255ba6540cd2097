//! 실행기 -- 오프라인 재생과 라이브 생산자/소비자 런타임
//!
//! # 오프라인
//! [`run_replay`]는 파이프라인을 동기적으로, 파일 순서대로 한 번 통과시킵니다.
//! 윈도우는 이벤트 시각만 사용하므로 같은 입력은 같은 탐지 순서를 냅니다 (id 제외).
//! 이벤트 사이마다 [`CancellationToken`]을 확인합니다.
//!
//! # 라이브
//! ```text
//! EventFeed ──producer task──▶ mpsc(bounded) ──blocking_recv──▶ consumer(spawn_blocking)
//!                                                                   │
//!                                                      DetectorPipeline ──▶ RecordSink
//! ```
//! 큐가 가득 차면 생산자는 `send().await`에서 기다립니다 (드롭 없음).
//! 취소되면 생산자가 읽기를 멈추고 송신측을 놓으며, 소비자는 큐를 비운 뒤
//! 싱크를 flush하고 보고서를 반환합니다.

use std::fmt;
use std::io;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use netwarden_core::error::{NetwardenError, SourceError};
use netwarden_core::event::NetworkEvent;
use netwarden_core::metrics as m;
use netwarden_core::pipeline::EventFeed;
use netwarden_core::sink::RecordSink;
use netwarden_core::types::DetectionRecord;

use crate::pipeline::DetectorPipeline;
use crate::stats::PipelineStats;

/// 실행 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// 입력 끝에 도달
    EndOfInput,
    /// 종료 신호로 중단
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfInput => write!(f, "end_of_input"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// 실행 결과 보고서
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// 종료 사유
    pub stop_reason: StopReason,
    /// 싱크에 기록한 탐지 수
    pub detections_written: u64,
    /// 파이프라인 통계
    pub stats: PipelineStats,
}

impl RunReport {
    fn log_shutdown(&self) {
        info!(
            component = "runner",
            msg = "shutdown",
            reason = %self.stop_reason,
            events_processed = self.stats.events_processed,
            events_skipped = self.stats.events_skipped,
            detections = self.detections_written,
            late_events = self.stats.late_events,
            detector_failures = self.stats.total_failures(),
            "detection run finished"
        );
    }
}

/// 캡처 재생을 끝까지 (또는 취소될 때까지) 실행합니다.
///
/// - `Malformed` 레코드는 건너뛰고 카운트합니다.
/// - 그 밖의 소스 에러와 싱크 에러는 실행을 중단시킵니다.
/// - 정상 종료와 취소 모두 마지막에 싱크를 flush합니다.
pub fn run_replay<I, S>(
    events: I,
    pipeline: &mut DetectorPipeline,
    sink: &mut S,
    cancel: &CancellationToken,
) -> Result<RunReport, NetwardenError>
where
    I: IntoIterator<Item = Result<NetworkEvent, SourceError>>,
    S: RecordSink<DetectionRecord> + ?Sized,
{
    let mut written = 0u64;
    let mut stop_reason = StopReason::EndOfInput;

    for item in events {
        if cancel.is_cancelled() {
            stop_reason = StopReason::Cancelled;
            break;
        }
        match item {
            Ok(event) => {
                for record in pipeline.process(&event) {
                    if let Err(e) = sink.append(&record) {
                        error!(error = %e, "detection sink failed, stopping replay");
                        flush_best_effort(sink);
                        return Err(e.into());
                    }
                    written += 1;
                }
            }
            Err(e @ SourceError::Malformed { .. }) => pipeline.record_skipped(&e),
            Err(e) => {
                error!(error = %e, "capture source failed, stopping replay");
                flush_best_effort(sink);
                return Err(e.into());
            }
        }
    }

    // 마지막 이벤트 처리 중에 들어온 취소도 보고서에 반영
    if stop_reason == StopReason::EndOfInput && cancel.is_cancelled() {
        stop_reason = StopReason::Cancelled;
    }

    sink.flush()?;

    let report = RunReport {
        stop_reason,
        detections_written: written,
        stats: pipeline.stats(),
    };
    report.log_shutdown();
    Ok(report)
}

/// 라이브 피드를 생산자/소비자 구조로 실행합니다.
///
/// `cancel`이 취소되거나 피드가 끝나면 큐를 비우고 반환합니다.
pub async fn run_live<F, S>(
    mut feed: F,
    mut pipeline: DetectorPipeline,
    mut sink: S,
    queue_capacity: usize,
    cancel: CancellationToken,
) -> Result<RunReport, NetwardenError>
where
    F: EventFeed + 'static,
    S: RecordSink<DetectionRecord> + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Result<NetworkEvent, SourceError>>(queue_capacity.max(1));
    // 소비자가 실패하면 부모 토큰을 건드리지 않고 생산자만 멈춥니다.
    let producer_token = cancel.child_token();
    let consumer_token = producer_token.clone();

    let producer = tokio::spawn(async move {
        let mut reason = StopReason::EndOfInput;
        loop {
            let item = tokio::select! {
                biased;
                _ = producer_token.cancelled() => {
                    reason = StopReason::Cancelled;
                    break;
                }
                item = feed.next_event() => item,
            };
            let Some(item) = item else {
                info!(feed = %feed.name(), "live feed reached end of input");
                break;
            };
            let fatal = !matches!(item, Ok(_) | Err(SourceError::Malformed { .. }));
            if tx.send(item).await.is_err() {
                // 소비자가 먼저 종료됨
                break;
            }
            metrics::gauge!(m::LIVE_QUEUE_DEPTH).set((tx.max_capacity() - tx.capacity()) as f64);
            if fatal {
                break;
            }
        }
        reason
    });

    let consumer = tokio::task::spawn_blocking(move || -> Result<(u64, PipelineStats), NetwardenError> {
        let mut written = 0u64;
        while let Some(item) = rx.blocking_recv() {
            metrics::gauge!(m::LIVE_QUEUE_DEPTH).set(rx.len() as f64);
            match item {
                Ok(event) => {
                    for record in pipeline.process(&event) {
                        if let Err(e) = sink.append(&record) {
                            error!(error = %e, "detection sink failed, stopping live run");
                            consumer_token.cancel();
                            flush_best_effort(&mut sink);
                            return Err(e.into());
                        }
                        written += 1;
                    }
                }
                Err(e @ SourceError::Malformed { .. }) => pipeline.record_skipped(&e),
                Err(e) => {
                    error!(error = %e, "live feed failed, stopping live run");
                    consumer_token.cancel();
                    flush_best_effort(&mut sink);
                    return Err(e.into());
                }
            }
        }
        sink.flush()?;
        Ok((written, pipeline.stats()))
    });

    let consumed = consumer.await.map_err(join_error)?;
    let stop_reason = producer.await.map_err(join_error)?;
    metrics::gauge!(m::LIVE_QUEUE_DEPTH).set(0.0);
    let (written, stats) = consumed?;

    let stop_reason = if cancel.is_cancelled() {
        StopReason::Cancelled
    } else {
        stop_reason
    };
    let report = RunReport {
        stop_reason,
        detections_written: written,
        stats,
    };
    report.log_shutdown();
    Ok(report)
}

/// 캡처 없이 취소될 때까지 대기합니다 (dry-run).
pub async fn idle_until_cancelled(cancel: &CancellationToken) -> RunReport {
    info!("dry run: no feed opened, waiting for shutdown signal");
    cancel.cancelled().await;
    let report = RunReport {
        stop_reason: StopReason::Cancelled,
        detections_written: 0,
        stats: PipelineStats::default(),
    };
    report.log_shutdown();
    report
}

fn flush_best_effort<S: RecordSink<DetectionRecord> + ?Sized>(sink: &mut S) {
    if let Err(e) = sink.flush() {
        warn!(error = %e, "flush after failure also failed");
    }
}

fn join_error(e: JoinError) -> NetwardenError {
    NetwardenError::Io(io::Error::other(format!("runtime task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwarden_core::config::NetwardenConfig;
    use netwarden_core::sink::MemorySink;

    fn icmp_line(src: &str, offset_ms: i64) -> Result<NetworkEvent, SourceError> {
        let ts = "2024-05-01T12:00:00Z"
            .parse::<chrono::DateTime<chrono::Utc>>()
            .unwrap()
            + chrono::Duration::milliseconds(offset_ms);
        Ok(NetworkEvent::new(
            ts,
            netwarden_core::event::Protocol::Icmp,
            src.parse().unwrap(),
            "10.0.0.1".parse().unwrap(),
        ))
    }

    fn flood(n: i64) -> Vec<Result<NetworkEvent, SourceError>> {
        (0..n).map(|i| icmp_line("1.2.3.4", i * 10)).collect()
    }

    #[test]
    fn replay_writes_detections_and_flushes() {
        let mut pipeline = DetectorPipeline::from_config(&NetwardenConfig::default());
        let mut sink = MemorySink::new();
        let report = run_replay(flood(31), &mut pipeline, &mut sink, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.stop_reason, StopReason::EndOfInput);
        assert_eq!(report.detections_written, 1);
        assert_eq!(report.stats.events_processed, 31);
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.flushes(), 1);
    }

    #[test]
    fn replay_skips_malformed_records() {
        let mut events = flood(3);
        events.insert(
            1,
            Err(SourceError::Malformed {
                line: 2,
                reason: "bad".into(),
            }),
        );
        let mut pipeline = DetectorPipeline::from_config(&NetwardenConfig::default());
        let mut sink = MemorySink::new();
        let report =
            run_replay(events, &mut pipeline, &mut sink, &CancellationToken::new()).unwrap();
        assert_eq!(report.stats.events_processed, 3);
        assert_eq!(report.stats.events_skipped, 1);
    }

    #[test]
    fn replay_stops_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut pipeline = DetectorPipeline::from_config(&NetwardenConfig::default());
        let mut sink = MemorySink::new();
        let report = run_replay(flood(31), &mut pipeline, &mut sink, &cancel).unwrap();
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.stats.events_processed, 0);
        assert_eq!(sink.flushes(), 1);
    }

    #[test]
    fn replay_sink_failure_is_fatal() {
        let mut pipeline = DetectorPipeline::from_config(&NetwardenConfig::default());
        let mut sink = MemorySink::failing_after(0);
        let err = run_replay(flood(31), &mut pipeline, &mut sink, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, NetwardenError::Sink(_)));
    }

    #[test]
    fn replay_source_io_error_is_fatal() {
        let mut events = flood(2);
        events.push(Err(SourceError::Io(io::Error::other("disk gone"))));
        let mut pipeline = DetectorPipeline::from_config(&NetwardenConfig::default());
        let mut sink = MemorySink::new();
        let err =
            run_replay(events, &mut pipeline, &mut sink, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, NetwardenError::Source(SourceError::Io(_))));
    }

    #[test]
    fn stop_reason_display_matches_serialization() {
        assert_eq!(StopReason::EndOfInput.to_string(), "end_of_input");
        assert_eq!(
            serde_json::to_value(StopReason::Cancelled).unwrap(),
            serde_json::json!("cancelled")
        );
    }

    #[tokio::test]
    async fn idle_returns_once_cancelled() {
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let handle = tokio::spawn(async move { idle_until_cancelled(&child).await });
        cancel.cancel();
        let report = handle.await.unwrap();
        assert_eq!(report.stop_reason, StopReason::Cancelled);
    }
}
