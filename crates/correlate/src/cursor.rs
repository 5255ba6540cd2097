//! tail 커서 -- 탐지 로그를 어디까지 소비했는지 기록합니다.
//!
//! 커서는 한 폴링 배치의 알림을 기록하고 flush한 **뒤에** 저장합니다.
//! 그 사이에 중단되면 다음 실행이 같은 배치를 다시 읽습니다 (at-least-once).
//! 저장은 임시 파일에 쓴 뒤 rename하므로 반쯤 쓰인 커서가 남지 않습니다.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use netwarden_core::error::SinkError;

/// 탐지 로그 tail 커서
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailCursor {
    /// 다음에 읽을 바이트 오프셋
    pub offset: u64,
    /// 마지막 저장 시각 (벽시계)
    pub updated_at: DateTime<Utc>,
}

impl TailCursor {
    /// 오프셋으로 커서를 만듭니다.
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            updated_at: Utc::now(),
        }
    }

    /// 커서 파일을 읽습니다.
    ///
    /// 파일이 없거나 읽을 수 없으면 `None`을 반환하며, 손상된 경우 경고를 남깁니다.
    pub fn load(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read tail cursor, starting from 0");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(cursor) => Some(cursor),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt tail cursor, starting from 0");
                None
            }
        }
    }

    /// 커서를 파일에 저장합니다.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SinkError> {
        let path = path.as_ref();
        let write_failed = |e: std::io::Error| SinkError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_failed)?;
        }
        let json = serde_json::to_string(self).map_err(|e| SinkError::Serialize(e.to_string()))?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        std::fs::write(&tmp, json).map_err(write_failed)?;
        std::fs::rename(&tmp, path).map_err(write_failed)?;
        Ok(())
    }
}
