//! HTTP 키워드 탐지기
//!
//! 평문 HTTP 텍스트에서 설정된 키워드를 대소문자 구분 없이 찾습니다.
//! 일치한 키워드마다 탐지 기록을 하나씩 만듭니다.

use netwarden_core::error::DetectorError;
use netwarden_core::event::NetworkEvent;
use netwarden_core::pipeline::Detector;
use netwarden_core::types::{DetectionRecord, Severity};

use super::{RULE_HTTP_KEYWORD, truncate_chars};

/// `details.text`에 남기는 최대 문자 수
pub const MAX_TEXT_CHARS: usize = 256;

/// HTTP 키워드 탐지기 (상태 없음)
#[derive(Debug, Clone)]
pub struct HttpKeywordDetector {
    /// 소문자로 정규화되고 중복이 제거된 키워드 (설정 순서 유지)
    keywords: Vec<String>,
}

impl HttpKeywordDetector {
    /// 새 HTTP 키워드 탐지기를 생성합니다.
    pub fn new(keywords: &[String]) -> Self {
        let mut normalized: Vec<String> = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let k = keyword.trim().to_lowercase();
            if !k.is_empty() && !normalized.contains(&k) {
                normalized.push(k);
            }
        }
        Self {
            keywords: normalized,
        }
    }

    /// 텍스트에 포함된 키워드를 설정 순서대로 반환합니다.
    pub fn matches<'a>(&'a self, text: &str) -> Vec<&'a str> {
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|k| haystack.contains(k.as_str()))
            .map(String::as_str)
            .collect()
    }
}

impl Detector for HttpKeywordDetector {
    fn name(&self) -> &str {
        RULE_HTTP_KEYWORD
    }

    fn observe(&mut self, event: &NetworkEvent) -> Result<Vec<DetectionRecord>, DetectorError> {
        let Some(text) = event.http_text() else {
            return Ok(Vec::new());
        };

        let records = self
            .matches(text)
            .into_iter()
            .map(|keyword| {
                DetectionRecord::new(RULE_HTTP_KEYWORD, Severity::Low, event.src_ip, event.timestamp)
                    .with_detail("keyword", keyword)
                    .with_detail("text", truncate_chars(text, MAX_TEXT_CHARS))
                    .with_detail("dst_ip", event.dst_ip.to_string())
            })
            .collect();

        Ok(records)
    }
}
