//! 에러 타입 -- 도메인별 에러 정의
//!
//! 전파 정책:
//! - 이벤트 하나, 탐지기 하나에 국한된 문제([`DetectorError`], [`SourceError::Malformed`])는
//!   호출자가 흡수하고 카운트만 올립니다.
//! - 소스를 읽거나 결과를 영속화할 수 없는 문제([`SourceError::Unavailable`], [`SinkError`])는
//!   해당 동작 모드를 종료시킵니다.

/// netwarden 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum NetwardenError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 이벤트 소스 에러
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// 싱크(영속화) 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// 탐지기 에러
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패 (알 수 없는 키 포함)
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 이벤트 소스 에러
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// 입력 파일이나 인터페이스를 열 수 없음 (시작 시 치명적)
    #[error("source unavailable: {source_name}: {reason}")]
    Unavailable { source_name: String, reason: String },

    /// 단일 레코드 정규화 실패 (건너뛰고 계속 진행)
    #[error("malformed event at line {line}: {reason}")]
    Malformed { line: u64, reason: String },

    /// 읽기 중 I/O 실패
    #[error("source read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// 싱크 에러
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 재시도 후에도 쓰기 실패
    #[error("write to {path} failed: {reason}")]
    WriteFailed { path: String, reason: String },

    /// 이전 실패로 인해 닫힌 싱크
    #[error("sink {path} is closed after a previous write failure")]
    Closed { path: String },

    /// 레코드 직렬화 실패
    #[error("failed to serialize record: {0}")]
    Serialize(String),
}

/// 탐지기 에러
///
/// 파이프라인 경계에서 잡혀서 카운트되고, 다른 탐지기로 전파되지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// 평가 중 발생한 에러
    #[error("detector '{detector}' failed: {reason}")]
    Evaluation { detector: String, reason: String },

    /// 평가 중 발생한 패닉
    #[error("detector '{detector}' panicked: {message}")]
    Panicked { detector: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_into_top_level() {
        let err: NetwardenError = ConfigError::InvalidValue {
            field: "thresholds.icmp_per_sec".to_owned(),
            reason: "must be >= 1".to_owned(),
        }
        .into();
        assert!(matches!(err, NetwardenError::Config(_)));
        assert!(err.to_string().contains("thresholds.icmp_per_sec"));
    }

    #[test]
    fn unavailable_source_converts_into_top_level() {
        let err: NetwardenError = SourceError::Unavailable {
            source_name: "/missing.jsonl".to_owned(),
            reason: "not found".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            NetwardenError::Source(SourceError::Unavailable { .. })
        ));
        assert!(err.to_string().contains("/missing.jsonl"));
    }

    #[test]
    fn malformed_source_display_has_line() {
        let err: NetwardenError = SourceError::Malformed {
            line: 7,
            reason: "expected value".to_owned(),
        }
        .into();
        assert!(err.to_string().contains("line 7"));
    }

    #[test]
    fn sink_error_display() {
        let err = SinkError::Closed {
            path: "alerts.jsonl".to_owned(),
        };
        assert!(err.to_string().contains("alerts.jsonl"));
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn detector_panic_display_names_detector() {
        let err = DetectorError::Panicked {
            detector: "dns_suspicious".to_owned(),
            message: "index out of bounds".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "detector 'dns_suspicious' panicked: index out of bounds"
        );
    }
}
