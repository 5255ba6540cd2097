//! 탐지 로그 수집 -- 일괄(batch) 처리와 tail(follow) 처리
//!
//! - [`correlate_batch`]: 탐지 로그 전체를 오프셋 0부터 한 번 읽습니다. 커서는 건드리지 않습니다.
//! - [`Follower`]: 저장된 커서부터 이어 읽고, 폴링마다 알림을 기록한 뒤 커서를 저장합니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use netwarden_core::error::NetwardenError;
use netwarden_core::reader::JsonlReader;
use netwarden_core::sink::RecordSink;
use netwarden_core::types::{AlertRecord, DetectionRecord};

use crate::cursor::TailCursor;
use crate::engine::{CorrelationEngine, EngineStats};

/// 수집 결과 보고서
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelateReport {
    /// 기록한 알림 수
    pub alerts_written: u64,
    /// 마지막으로 소비한 탐지 로그 오프셋
    pub offset: u64,
    /// 엔진 통계
    pub stats: EngineStats,
}

/// 탐지 로그 전체를 한 번 상관 분석합니다.
///
/// 탐지 로그가 없으면 탐지가 없었던 것으로 보고 빈 결과를 돌려줍니다.
pub fn correlate_batch<S>(
    reader: &JsonlReader<DetectionRecord>,
    engine: &mut CorrelationEngine,
    sink: &mut S,
) -> Result<CorrelateReport, NetwardenError>
where
    S: RecordSink<AlertRecord> + ?Sized,
{
    let batch = reader.read_all()?;
    engine.record_skipped(batch.skipped);

    let mut written = 0u64;
    for detection in &batch.records {
        for alert in engine.ingest(detection) {
            sink.append(&alert)?;
            written += 1;
        }
    }
    sink.flush()?;

    info!(
        path = %reader.path().display(),
        detections = batch.records.len(),
        alerts = written,
        "batch correlation finished"
    );
    Ok(CorrelateReport {
        alerts_written: written,
        offset: batch.next_offset,
        stats: engine.stats().clone(),
    })
}

/// 탐지 로그 tail 처리기
pub struct Follower<S> {
    reader: JsonlReader<DetectionRecord>,
    engine: CorrelationEngine,
    sink: S,
    cursor_path: PathBuf,
    offset: u64,
    alerts_written: u64,
}

impl<S: RecordSink<AlertRecord>> Follower<S> {
    /// 저장된 커서에서 이어 읽는 처리기를 만듭니다. 커서가 없으면 0부터 시작합니다.
    pub fn new(
        reader: JsonlReader<DetectionRecord>,
        engine: CorrelationEngine,
        sink: S,
        cursor_path: impl AsRef<Path>,
    ) -> Self {
        let cursor_path = cursor_path.as_ref().to_path_buf();
        let offset = TailCursor::load(&cursor_path).map_or(0, |c| c.offset);
        Self {
            reader,
            engine,
            sink,
            cursor_path,
            offset,
            alerts_written: 0,
        }
    }

    /// 현재 오프셋
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 엔진 (읽기 전용)
    pub fn engine(&self) -> &CorrelationEngine {
        &self.engine
    }

    /// 한 번 폴링합니다: 새 줄을 평가하고, 알림을 기록/flush한 뒤 커서를 저장합니다.
    ///
    /// 이번 폴링에서 기록한 알림 수를 반환합니다.
    pub fn poll_once(&mut self) -> Result<u64, NetwardenError> {
        let batch = self.reader.poll_from(self.offset)?;
        self.engine.record_skipped(batch.skipped);

        let mut written = 0u64;
        for detection in &batch.records {
            for alert in self.engine.ingest(detection) {
                self.sink.append(&alert)?;
                written += 1;
            }
        }
        self.sink.flush()?;

        if batch.next_offset != self.offset || batch.truncated {
            self.offset = batch.next_offset;
            TailCursor::new(self.offset).save(&self.cursor_path)?;
            debug!(
                offset = self.offset,
                detections = batch.records.len(),
                alerts = written,
                "tail cursor advanced"
            );
        }

        self.alerts_written += written;
        Ok(written)
    }

    /// 취소될 때까지 `interval`마다 폴링합니다.
    ///
    /// 각 폴링은 파일 I/O를 하므로 blocking 스레드 풀에서 실행됩니다.
    pub async fn run(
        mut self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<CorrelateReport, NetwardenError>
    where
        S: 'static,
    {
        info!(
            path = %self.reader.path().display(),
            offset = self.offset,
            interval_ms = interval.as_millis() as u64,
            "following detections log"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self = poll_blocking(self).await?;
        }

        info!(offset = self.offset, alerts = self.alerts_written, "stopped following detections log");
        Ok(self.report())
    }

    /// 현재까지의 보고서
    pub fn report(&self) -> CorrelateReport {
        CorrelateReport {
            alerts_written: self.alerts_written,
            offset: self.offset,
            stats: self.engine.stats().clone(),
        }
    }
}

/// `poll_once`를 blocking 스레드에서 실행하고 처리기를 돌려받습니다.
async fn poll_blocking<S>(mut follower: Follower<S>) -> Result<Follower<S>, NetwardenError>
where
    S: RecordSink<AlertRecord> + 'static,
{
    let (follower, polled) = tokio::task::spawn_blocking(move || {
        let polled = follower.poll_once();
        (follower, polled)
    })
    .await
    .map_err(|e| NetwardenError::Io(std::io::Error::other(format!("tail poll task failed: {e}"))))?;
    polled?;
    Ok(follower)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use netwarden_core::config::NetwardenConfig;
    use netwarden_core::sink::MemorySink;
    use netwarden_core::types::Severity;
    use std::io::Write;

    fn icmp_detection(offset_secs: i64) -> DetectionRecord {
        let base: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().unwrap();
        DetectionRecord::new(
            "icmp_flood",
            Severity::High,
            "9.9.9.9".parse().unwrap(),
            base + ChronoDuration::seconds(offset_secs),
        )
    }

    fn append_detections(path: &Path, range: std::ops::Range<i64>) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        for i in range {
            writeln!(file, "{}", serde_json::to_string(&icmp_detection(i)).unwrap()).unwrap();
        }
    }

    fn engine() -> CorrelationEngine {
        CorrelationEngine::from_config(&NetwardenConfig::default())
    }

    #[test]
    fn batch_over_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reader = JsonlReader::new(dir.path().join("detections.jsonl"));
        let mut sink = MemorySink::new();
        let report = correlate_batch(&reader, &mut engine(), &mut sink).unwrap();
        assert_eq!(report.alerts_written, 0);
        assert_eq!(report.stats.detections_ingested, 0);
    }

    #[test]
    fn follower_resumes_from_saved_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("detections.jsonl");
        let cursor = dir.path().join("correlation.cursor");
        append_detections(&log, 0..20);

        let mut first = Follower::new(JsonlReader::new(&log), engine(), MemorySink::new(), &cursor);
        assert_eq!(first.poll_once().unwrap(), 0);
        let saved = TailCursor::load(&cursor).unwrap().offset;
        assert_eq!(saved, std::fs::metadata(&log).unwrap().len());

        append_detections(&log, 20..30);
        let mut second = Follower::new(JsonlReader::new(&log), engine(), MemorySink::new(), &cursor);
        assert_eq!(second.offset(), saved);
        // 새 엔진은 이전 20개를 보지 못했으므로 10개만으로는 발화하지 않음
        assert_eq!(second.poll_once().unwrap(), 0);
        assert_eq!(second.engine().stats().detections_ingested, 10);
    }

    #[test]
    fn truncated_log_resets_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("detections.jsonl");
        let cursor = dir.path().join("correlation.cursor");
        append_detections(&log, 0..5);
        TailCursor::new(1_000_000).save(&cursor).unwrap();

        let mut follower =
            Follower::new(JsonlReader::new(&log), engine(), MemorySink::new(), &cursor);
        follower.poll_once().unwrap();
        assert_eq!(follower.engine().stats().detections_ingested, 5);
        assert_eq!(
            TailCursor::load(&cursor).unwrap().offset,
            std::fs::metadata(&log).unwrap().len()
        );
    }

    #[tokio::test]
    async fn follow_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("detections.jsonl");
        append_detections(&log, 0..30);
        let follower = Follower::new(
            JsonlReader::new(&log),
            engine(),
            MemorySink::new(),
            dir.path().join("c"),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(follower.run(Duration::from_millis(10), cancel.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.alerts_written, 1);
        assert_eq!(report.stats.detections_ingested, 30);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn follow_picks_up_lines_appended_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("detections.jsonl");
        let cursor = dir.path().join("correlation.cursor");
        append_detections(&log, 0..10);
        let follower = Follower::new(JsonlReader::new(&log), engine(), MemorySink::new(), &cursor);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(follower.run(Duration::from_millis(10), cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        append_detections(&log, 10..30);
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.stats.detections_ingested, 30);
        assert_eq!(report.alerts_written, 1);
        assert_eq!(
            TailCursor::load(&cursor).unwrap().offset,
            std::fs::metadata(&log).unwrap().len()
        );
    }
}
