//! 레코드 싱크 -- 추가 전용(append-only) 영속화
//!
//! 레코드 하나를 JSON 한 줄로 직렬화하여 `O_APPEND` 파일에 한 번의 `write_all`로 씁니다.
//! 덧붙이기 한 번이 내구성의 단위이며, 읽는 쪽은 개행으로 끝난 줄만 소비하므로
//! 반쯤 쓰인 줄을 관측하지 않습니다. 삭제나 수정 연산은 없습니다.
//!
//! # 실패 정책
//! 쓰기가 실패하면 그 시도가 남긴 조각을 쓰기 전 길이로 잘라 내고, 파일을 다시 열어
//! 한 번 재시도합니다. 재시도도 실패하면 싱크는 닫힌 상태가 되고 이후 모든 `append`는
//! [`SinkError::Closed`]를 반환합니다.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::SinkError;
use crate::metrics as m;

/// 레코드를 영속화하는 싱크 trait
pub trait RecordSink<T>: Send {
    /// 레코드 하나를 덧붙입니다.
    fn append(&mut self, record: &T) -> Result<(), SinkError>;

    /// 버퍼링된 쓰기를 내구 저장소로 내보냅니다.
    fn flush(&mut self) -> Result<(), SinkError>;
}

/// JSON Lines 파일 싱크
pub struct JsonlSink<T> {
    path: PathBuf,
    label: &'static str,
    file: Option<File>,
    written: u64,
    _record: PhantomData<fn(&T)>,
}

impl<T> std::fmt::Debug for JsonlSink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlSink")
            .field("path", &self.path)
            .field("label", &self.label)
            .field("closed", &self.file.is_none())
            .field("written", &self.written)
            .finish()
    }
}

impl<T: Serialize> JsonlSink<T> {
    /// 파일을 추가 모드로 엽니다. 상위 디렉토리가 없으면 만듭니다.
    ///
    /// `label`은 메트릭 레이블과 로그에 사용됩니다 (예: `detections`).
    pub fn open(path: impl AsRef<Path>, label: &'static str) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SinkError::WriteFailed {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        let file = open_append(&path).map_err(|e| SinkError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), sink = label, "record sink opened");
        Ok(Self {
            path,
            label,
            file: Some(file),
            written: 0,
            _record: PhantomData,
        })
    }

    /// 싱크 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 성공적으로 기록한 레코드 수
    pub fn written(&self) -> u64 {
        self.written
    }

    /// 이전 실패로 닫혔는지 여부
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn closed_error(&self) -> SinkError {
        SinkError::Closed {
            path: self.path.display().to_string(),
        }
    }
}

impl<T: Serialize> RecordSink<T> for JsonlSink<T> {
    fn append(&mut self, record: &T) -> Result<(), SinkError> {
        let Some(file) = self.file.as_mut() else {
            return Err(self.closed_error());
        };

        let mut line =
            serde_json::to_string(record).map_err(|e| SinkError::Serialize(e.to_string()))?;
        line.push('\n');

        // 재시도도 같은 시작 위치를 기준으로 조각을 정리합니다.
        let mut start = None;
        let first = match file.end_offset() {
            Ok(offset) => {
                start = Some(offset);
                write_line(file, offset, line.as_bytes())
            }
            Err(e) => Err(e),
        };
        let first = match first {
            Ok(()) => {
                self.written += 1;
                return Ok(());
            }
            Err(e) => e,
        };

        metrics::counter!(m::SINK_WRITE_FAILURES_TOTAL, m::LABEL_SINK => self.label).increment(1);
        warn!(
            path = %self.path.display(),
            sink = self.label,
            error = %first,
            "sink append failed, reopening and retrying once"
        );

        let retried = open_append(&self.path).and_then(|mut reopened| {
            let offset = match start {
                Some(offset) => offset,
                None => reopened.end_offset()?,
            };
            write_line(&mut reopened, offset, line.as_bytes())?;
            Ok(reopened)
        });

        match retried {
            Ok(reopened) => {
                self.file = Some(reopened);
                self.written += 1;
                Ok(())
            }
            Err(second) => {
                metrics::counter!(m::SINK_WRITE_FAILURES_TOTAL, m::LABEL_SINK => self.label)
                    .increment(1);
                error!(
                    path = %self.path.display(),
                    sink = self.label,
                    error = %second,
                    written = self.written,
                    "sink append failed after retry, closing sink"
                );
                self.file = None;
                Err(SinkError::WriteFailed {
                    path: self.path.display().to_string(),
                    reason: second.to_string(),
                })
            }
        }
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        let Some(file) = self.file.as_mut() else {
            return Err(self.closed_error());
        };
        file.flush()
            .and_then(|()| file.sync_data())
            .map_err(|e| SinkError::WriteFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

impl<T> Drop for JsonlSink<T> {
    fn drop(&mut self) {
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.sync_data() {
                // /dev/null 같은 특수 파일은 sync를 지원하지 않을 수 있음
                debug!(path = %self.path.display(), error = %e, "sync on close failed");
            }
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// 줄 단위 쓰기 대상
///
/// 실패한 쓰기가 남긴 바이트를 되돌릴 수 있어야 합니다.
trait LineTarget: Write {
    /// 현재 끝 위치 (바이트)
    fn end_offset(&self) -> io::Result<u64>;

    /// `len` 바이트로 잘라 냅니다.
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl LineTarget for File {
    fn end_offset(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// `start` 위치에 줄 하나를 씁니다.
///
/// 끝이 `start`보다 길면 이전 시도의 조각으로 보고 먼저 잘라 냅니다. 쓰기가 실패하면
/// `start`로 되돌린 뒤 원래 에러를 반환하므로 반쯤 쓰인 줄이 파일에 남지 않습니다.
fn write_line<W: LineTarget>(target: &mut W, start: u64, bytes: &[u8]) -> io::Result<()> {
    if target.end_offset()? > start {
        target.truncate_to(start)?;
    }
    let result = target.write_all(bytes).and_then(|()| target.flush());
    if result.is_err() {
        if let Err(e) = target.truncate_to(start) {
            // /dev/full 같은 특수 파일은 잘라 낼 수 없음
            debug!(error = %e, offset = start, "could not roll back partial line");
        }
    }
    result
}

/// 메모리 싱크 (테스트와 dry-run용)
///
/// `fail_after`를 지정하면 그 수만큼 기록한 뒤부터 쓰기 실패를 흉내 냅니다.
#[derive(Debug, Clone)]
pub struct MemorySink<T> {
    records: Vec<T>,
    fail_after: Option<usize>,
    flushes: u64,
}

impl<T> Default for MemorySink<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            fail_after: None,
            flushes: 0,
        }
    }
}

impl<T> MemorySink<T> {
    /// 빈 메모리 싱크를 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// `limit`개를 기록한 뒤부터 실패하는 싱크를 만듭니다.
    pub fn failing_after(limit: usize) -> Self {
        Self {
            fail_after: Some(limit),
            ..Self::default()
        }
    }

    /// 기록된 레코드
    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// 기록된 레코드를 꺼냅니다.
    pub fn into_records(self) -> Vec<T> {
        self.records
    }

    /// `flush` 호출 수
    pub fn flushes(&self) -> u64 {
        self.flushes
    }
}

impl<T: Clone + Send> RecordSink<T> for MemorySink<T> {
    fn append(&mut self, record: &T) -> Result<(), SinkError> {
        if self.fail_after.is_some_and(|limit| self.records.len() >= limit) {
            return Err(SinkError::WriteFailed {
                path: "memory".to_owned(),
                reason: "simulated write failure".to_owned(),
            });
        }
        self.records.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.flushes += 1;
        Ok(())
    }
}
