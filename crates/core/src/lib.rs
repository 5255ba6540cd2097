#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod reader;
pub mod sink;
pub mod types;
pub mod window;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, DetectorError, NetwardenError, SinkError, SourceError};

// 설정
pub use config::NetwardenConfig;

// 이벤트
pub use event::{NetworkEvent, Payload, Protocol};

// 파이프라인 trait
pub use pipeline::{CorrelationRule, Detector, EventFeed};

// 싱크와 리더
pub use reader::{JsonlReader, PollBatch};
pub use sink::{JsonlSink, MemorySink, RecordSink};

// 도메인 타입
pub use types::{AlertRecord, DetectionRecord, Details, Severity};

// 윈도우
pub use window::{Admission, Hysteresis, KeyedWindows, SlidingWindow, WindowEntry, WindowSlot};
