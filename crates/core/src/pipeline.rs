//! 파이프라인 trait -- 확장 포인트 정의
//!
//! - [`Detector`]: 원시 이벤트 스트림 위의 탐지기
//! - [`CorrelationRule`]: 탐지 스트림 위의 2단계 규칙
//! - [`EventFeed`]: 라이브 모드 이벤트 소스

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::{DetectorError, SourceError};
use crate::event::NetworkEvent;
use crate::types::{AlertRecord, DetectionRecord};

/// 탐지 로직을 구현하는 trait
///
/// 각 탐지기는 자신의 윈도우 상태를 독점 소유하며, 파이프라인은 이벤트 하나를
/// 모든 탐지기에 같은 참조로 전달합니다. 새 탐지 규칙은 이 trait을 구현하여 추가합니다.
pub trait Detector: Send {
    /// 탐지기 이름 (탐지 기록의 `rule_name`과 같음)
    fn name(&self) -> &str;

    /// 이벤트 하나를 관측하고 0개 이상의 탐지 기록을 반환합니다.
    fn observe(&mut self, event: &NetworkEvent) -> Result<Vec<DetectionRecord>, DetectorError>;

    /// `now`(이벤트 시간) 기준으로 유휴 키 상태를 정리하고 정리한 키 수를 반환합니다.
    fn prune(&mut self, _now: DateTime<Utc>) -> usize {
        0
    }

    /// 너무 늦게 도착해 버린 관측 수
    fn late_events(&self) -> u64 {
        0
    }

    /// 현재 추적 중인 키 수
    fn tracked_keys(&self) -> usize {
        0
    }
}

/// 상관 분석 규칙 trait
///
/// 탐지 기록 하나를 평가하여 알림 발화 여부를 결정합니다.
pub trait CorrelationRule: Send {
    /// 메타 규칙 이름 (`AlertRecord::meta_rule_name`)
    fn name(&self) -> &str;

    /// 탐지 기록 하나를 반영하고, 발화하면 알림을 반환합니다.
    fn evaluate(&mut self, detection: &DetectionRecord) -> Option<AlertRecord>;

    /// 누적 상태를 초기화합니다.
    fn reset(&mut self);

    /// `now` 기준으로 유휴 그룹 상태를 정리합니다.
    fn prune(&mut self, _now: DateTime<Utc>) -> usize {
        0
    }
}

/// 라이브 모드 이벤트 소스 trait
///
/// `None`은 소스가 끝났음을 의미합니다. 정규화 실패는
/// `Some(Err(SourceError::Malformed { .. }))`로 전달되며 호출자가 건너뜁니다.
pub trait EventFeed: Send {
    /// 소스 이름 (로그용)
    fn name(&self) -> &str;

    /// 다음 이벤트를 읽습니다.
    fn next_event(
        &mut self,
    ) -> impl Future<Output = Option<Result<NetworkEvent, SourceError>>> + Send;
}
