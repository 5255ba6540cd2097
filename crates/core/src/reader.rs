//! JSONL 리더 -- 추가 전용 로그를 바이트 오프셋 기준으로 읽습니다.
//!
//! 줄바꿈으로 끝난 줄만 소비합니다. 쓰는 중인 마지막 줄은 다음 폴링까지 남겨 두므로
//! 반쯤 쓰인 레코드를 읽는 일이 없습니다.
//!
//! 파일이 없으면 빈 결과를 돌려줍니다. 파일이 요청 오프셋보다 짧으면
//! (잘림 또는 로테이션) 경고를 남기고 처음부터 다시 읽습니다.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::SourceError;

/// 한 번의 폴링 결과
#[derive(Debug, Clone, PartialEq)]
pub struct PollBatch<T> {
    /// 파싱된 레코드 (파일 순서)
    pub records: Vec<T>,
    /// 다음 폴링을 시작할 바이트 오프셋
    pub next_offset: u64,
    /// 파싱하지 못해 건너뛴 줄 수
    pub skipped: u64,
    /// 요청 오프셋이 파일 길이를 넘어 처음부터 다시 읽었는지 여부
    pub truncated: bool,
}

impl<T> PollBatch<T> {
    fn empty(offset: u64) -> Self {
        Self {
            records: Vec::new(),
            next_offset: offset,
            skipped: 0,
            truncated: false,
        }
    }
}

/// JSONL 파일 리더
pub struct JsonlReader<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for JsonlReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlReader").field("path", &self.path).finish()
    }
}

impl<T: DeserializeOwned> JsonlReader<T> {
    /// 새 리더를 만듭니다. 파일은 읽을 때마다 엽니다.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            _record: PhantomData,
        }
    }

    /// 읽을 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 파일 전체를 읽습니다.
    pub fn read_all(&self) -> Result<PollBatch<T>, SourceError> {
        self.poll_from(0)
    }

    /// `offset`부터 현재 끝까지의 완성된 줄을 읽습니다.
    pub fn poll_from(&self, offset: u64) -> Result<PollBatch<T>, SourceError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if offset > 0 {
                    warn!(path = %self.path.display(), offset, "log file disappeared, restarting from 0");
                    let mut batch = PollBatch::empty(0);
                    batch.truncated = true;
                    return Ok(batch);
                }
                return Ok(PollBatch::empty(0));
            }
            Err(e) => return Err(SourceError::Io(e)),
        };

        let len = file.metadata()?.len();
        let (start, truncated) = if len < offset {
            warn!(
                path = %self.path.display(),
                offset,
                len,
                "log file is shorter than cursor, restarting from 0"
            );
            (0, true)
        } else {
            (offset, false)
        };

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(start))?;

        let mut batch = PollBatch::empty(start);
        batch.truncated = truncated;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 || buf.last() != Some(&b'\n') {
                // EOF 또는 아직 쓰이는 중인 줄
                break;
            }
            let line_start = batch.next_offset;
            batch.next_offset += n as u64;

            let text = String::from_utf8_lossy(&buf);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(text) {
                Ok(record) => batch.records.push(record),
                Err(e) => {
                    batch.skipped += 1;
                    warn!(
                        path = %self.path.display(),
                        offset = line_start,
                        error = %e,
                        "skipping unreadable log line"
                    );
                }
            }
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::types::{DetectionRecord, Severity};

    fn record(rule: &str) -> DetectionRecord {
        DetectionRecord::new(
            rule,
            Severity::Low,
            "1.2.3.4".parse().unwrap(),
            "2024-05-01T12:00:00Z".parse().unwrap(),
        )
    }

    fn line(rule: &str) -> String {
        format!("{}\n", serde_json::to_string(&record(rule)).unwrap())
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reader = JsonlReader::<DetectionRecord>::new(dir.path().join("none.jsonl"));
        let batch = reader.read_all().unwrap();
        assert!(batch.records.is_empty());
        assert_eq!(batch.next_offset, 0);
        assert!(!batch.truncated);
    }

    #[test]
    fn partial_trailing_line_is_left_for_next_poll() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.jsonl");
        let full = line("a");
        let second = line("b");
        let (head, tail) = second.split_at(10);
        std::fs::write(&path, format!("{full}{head}")).unwrap();

        let reader = JsonlReader::<DetectionRecord>::new(&path);
        let first = reader.poll_from(0).unwrap();
        assert_eq!(first.records.len(), 1);
        assert_eq!(first.next_offset, full.len() as u64);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(tail.as_bytes()).unwrap();

        let next = reader.poll_from(first.next_offset).unwrap();
        assert_eq!(next.records.len(), 1);
        assert_eq!(next.records[0].rule_name, "b");
        assert_eq!(next.next_offset, (full.len() + second.len()) as u64);
    }

    #[test]
    fn malformed_lines_are_skipped_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.jsonl");
        std::fs::write(&path, format!("{}garbage\n\n{}", line("a"), line("b"))).unwrap();
        let batch = JsonlReader::<DetectionRecord>::new(&path).read_all().unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.skipped, 1);
    }

    #[test]
    fn truncated_file_restarts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.jsonl");
        std::fs::write(&path, line("a")).unwrap();
        let batch = JsonlReader::<DetectionRecord>::new(&path)
            .poll_from(10_000)
            .unwrap();
        assert!(batch.truncated);
        assert_eq!(batch.records.len(), 1);
    }
}
