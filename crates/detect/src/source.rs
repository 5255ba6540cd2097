//! 이벤트 소스 -- 정규화된 이벤트 스트림 읽기
//!
//! 외부 디코더가 만든 JSONL(한 줄에 [`NetworkEvent`] 하나)을 읽습니다.
//!
//! - [`ReplaySource`]: 캡처 파일을 파일 순서대로 재생하는 동기 반복자 (오프라인 모드)
//! - [`LiveSource`]: stdin 또는 FIFO에서 계속 도착하는 줄을 읽는 비동기 [`EventFeed`] (라이브 모드)
//!
//! 빈 줄은 건너뛰고, 파싱할 수 없는 줄은 `SourceError::Malformed`로 전달합니다.
//! 호출자는 그 줄을 건너뛰고 계속 진행합니다.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use netwarden_core::error::SourceError;
use netwarden_core::event::NetworkEvent;
use netwarden_core::pipeline::EventFeed;

/// 한 줄의 최대 길이 (바이트)
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// 줄 하나를 이벤트로 파싱합니다.
///
/// 공백뿐인 줄은 `None`입니다.
pub fn parse_event_line(line_no: u64, raw: &[u8]) -> Option<Result<NetworkEvent, SourceError>> {
    if raw.len() > MAX_LINE_BYTES {
        return Some(Err(SourceError::Malformed {
            line: line_no,
            reason: format!("line exceeds {MAX_LINE_BYTES} bytes ({} bytes)", raw.len()),
        }));
    }
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text.trim(),
        Err(e) => {
            return Some(Err(SourceError::Malformed {
                line: line_no,
                reason: format!("invalid utf-8: {e}"),
            }));
        }
    };
    if text.is_empty() {
        return None;
    }
    Some(
        serde_json::from_str::<NetworkEvent>(text).map_err(|e| SourceError::Malformed {
            line: line_no,
            reason: e.to_string(),
        }),
    )
}

fn unavailable(name: &str, err: &io::Error) -> SourceError {
    SourceError::Unavailable {
        source_name: name.to_owned(),
        reason: err.to_string(),
    }
}

// --- 오프라인 재생 ---

/// 캡처 파일 재생 소스
///
/// `Iterator<Item = Result<NetworkEvent, SourceError>>`를 구현합니다.
/// 같은 파일은 항상 같은 순서의 이벤트를 냅니다.
#[derive(Debug)]
pub struct ReplaySource<R = BufReader<File>> {
    reader: R,
    name: String,
    line_no: u64,
    buf: Vec<u8>,
    done: bool,
}

impl ReplaySource {
    /// 캡처 파일을 엽니다.
    ///
    /// 파일이 없거나 권한이 없으면 `SourceError::Unavailable`을 반환합니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::open(path).map_err(|e| unavailable(&name, &e))?;
        if file.metadata().map_err(|e| unavailable(&name, &e))?.is_dir() {
            return Err(SourceError::Unavailable {
                source_name: name,
                reason: "path is a directory".to_owned(),
            });
        }
        debug!(path = %name, "replay source opened");
        Ok(Self::from_reader(name, BufReader::new(file)))
    }
}

impl<R: BufRead> ReplaySource<R> {
    /// 임의의 리더로 재생 소스를 만듭니다.
    pub fn from_reader(name: impl Into<String>, reader: R) -> Self {
        Self {
            reader,
            name: name.into(),
            line_no: 0,
            buf: Vec::new(),
            done: false,
        }
    }

    /// 소스 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 지금까지 읽은 줄 수
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }
}

impl<R: BufRead> Iterator for ReplaySource<R> {
    type Item = Result<NetworkEvent, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                }
                Ok(_) => {
                    self.line_no += 1;
                    if let Some(item) = parse_event_line(self.line_no, &self.buf) {
                        return Some(item);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(SourceError::Io(e)));
                }
            }
        }
        None
    }
}

// --- 라이브 피드 ---

/// 라이브 이벤트 피드
///
/// stdin이나 FIFO처럼 계속 쓰이는 스트림에서 줄 단위로 이벤트를 읽습니다.
/// 스트림이 EOF에 도달하면 `None`을 반환합니다.
#[derive(Debug)]
pub struct LiveSource<R> {
    reader: R,
    name: String,
    line_no: u64,
    buf: Vec<u8>,
}

impl LiveSource<tokio::io::BufReader<tokio::io::Stdin>> {
    /// 표준 입력에서 읽는 피드를 만듭니다.
    pub fn stdin() -> Self {
        Self::from_reader("stdin", tokio::io::BufReader::new(tokio::io::stdin()))
    }
}

impl LiveSource<tokio::io::BufReader<tokio::fs::File>> {
    /// 파일 또는 FIFO를 피드로 엽니다.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| unavailable(&name, &e))?;
        debug!(path = %name, "live feed opened");
        Ok(Self::from_reader(name, tokio::io::BufReader::new(file)))
    }
}

impl<R: AsyncBufRead + Unpin + Send> LiveSource<R> {
    /// 임의의 비동기 리더로 피드를 만듭니다.
    pub fn from_reader(name: impl Into<String>, reader: R) -> Self {
        Self {
            reader,
            name: name.into(),
            line_no: 0,
            buf: Vec::new(),
        }
    }
}

impl<R: AsyncBufRead + Unpin + Send> EventFeed for LiveSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_event(&mut self) -> Option<Result<NetworkEvent, SourceError>> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_no += 1;
                    if let Some(item) = parse_event_line(self.line_no, &self.buf) {
                        return Some(item);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Some(Err(SourceError::Io(e))),
            }
        }
    }
}

/// 캡처 인터페이스가 존재하는지 확인합니다.
///
/// Linux에서는 `/sys/class/net/<iface>`를 확인합니다. 다른 플랫폼에서는 이름 형식만 검사합니다.
pub fn check_interface(iface: &str) -> Result<(), SourceError> {
    let invalid = |reason: &str| SourceError::Unavailable {
        source_name: format!("interface {iface}"),
        reason: reason.to_owned(),
    };

    if iface.trim().is_empty() {
        return Err(invalid("interface name is empty"));
    }
    if iface.contains('/') || iface == "." || iface == ".." {
        return Err(invalid("interface name contains invalid characters"));
    }

    #[cfg(target_os = "linux")]
    {
        let sys_path = Path::new("/sys/class/net").join(iface);
        if !sys_path.exists() {
            return Err(invalid("no such network interface"));
        }
    }

    Ok(())
}
