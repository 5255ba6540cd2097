//! 네트워크 이벤트 -- 외부 디코더가 정규화한 입력 단위
//!
//! 패킷 디코딩은 이 크레이트의 범위 밖입니다. 외부 디코더는 프레임마다
//! [`NetworkEvent`] 하나를 JSON 한 줄로 내보내고, 파이프라인은 그 줄을 읽어
//! 탐지기에 전달합니다.
//!
//! ```json
//! {"timestamp":"2024-05-01T12:00:00Z","protocol":"dns","src_ip":"10.0.0.5",
//!  "dst_ip":"8.8.8.8","src_port":53124,"dst_port":53,
//!  "payload":{"kind":"dns","query_name":"example.com."}}
//! ```

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 정규화된 프로토콜 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// DNS 질의
    Dns,
    /// ICMP
    Icmp,
    /// ARP
    Arp,
    /// HTTP (평문)
    Http,
    /// 기타 TCP
    Tcp,
    /// 기타 UDP
    Udp,
    /// 분류되지 않은 프로토콜
    Other,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dns => "dns",
            Self::Icmp => "icmp",
            Self::Arp => "arp",
            Self::Http => "http",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// 프로토콜별 페이로드 뷰
///
/// 탐지기는 자신이 다루는 변형만 확인하고 나머지는 무시합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    /// DNS 질의 이름
    Dns { query_name: String },
    /// ICMP 타입 코드
    Icmp { icmp_type: u8 },
    /// ARP 발신자 IP/MAC
    Arp { sender_ip: IpAddr, sender_mac: String },
    /// 키워드 스캔 대상 HTTP 텍스트 (호스트 + URI 등)
    Http { text: String },
    /// 페이로드 없음
    #[default]
    None,
}

/// 정규화된 네트워크 이벤트 (불변)
///
/// `timestamp`는 캡처 시각(이벤트 시간)이며 벽시계 시간이 아닙니다.
/// 모든 윈도우 판단은 이 값만 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEvent {
    /// 캡처 시각
    pub timestamp: DateTime<Utc>,
    /// 프로토콜
    pub protocol: Protocol,
    /// 출발지 IP
    pub src_ip: IpAddr,
    /// 목적지 IP
    pub dst_ip: IpAddr,
    /// 출발지 포트
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_port: Option<u16>,
    /// 목적지 포트
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<u16>,
    /// 프로토콜별 페이로드
    #[serde(default)]
    pub payload: Payload,
}

impl NetworkEvent {
    /// 페이로드 없는 이벤트를 생성합니다.
    pub fn new(
        timestamp: DateTime<Utc>,
        protocol: Protocol,
        src_ip: IpAddr,
        dst_ip: IpAddr,
    ) -> Self {
        Self {
            timestamp,
            protocol,
            src_ip,
            dst_ip,
            src_port: None,
            dst_port: None,
            payload: Payload::None,
        }
    }

    /// 포트를 설정합니다.
    pub fn with_ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = Some(src_port);
        self.dst_port = Some(dst_port);
        self
    }

    /// 페이로드를 설정합니다.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// DNS 질의 이름 (DNS 이벤트일 때만)
    pub fn dns_query(&self) -> Option<&str> {
        match &self.payload {
            Payload::Dns { query_name } => Some(query_name),
            _ => None,
        }
    }

    /// HTTP 텍스트 (HTTP 이벤트일 때만)
    pub fn http_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Http { text } => Some(text),
            _ => None,
        }
    }

    /// ICMP 이벤트 여부
    ///
    /// 디코더가 페이로드를 붙이지 않은 경우에도 프로토콜로 판별합니다.
    pub fn is_icmp(&self) -> bool {
        self.protocol == Protocol::Icmp || matches!(self.payload, Payload::Icmp { .. })
    }
}

impl fmt::Display for NetworkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} -> {}",
            self.timestamp.to_rfc3339(),
            self.protocol,
            self.src_ip,
            self.dst_ip,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn parses_decoder_line() {
        let line = r#"{"timestamp":"2024-05-01T12:00:00Z","protocol":"dns","src_ip":"10.0.0.5","dst_ip":"8.8.8.8","src_port":53124,"dst_port":53,"payload":{"kind":"dns","query_name":"example.com."}}"#;
        let event: NetworkEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.protocol, Protocol::Dns);
        assert_eq!(event.dns_query(), Some("example.com."));
        assert_eq!(event.dst_port, Some(53));
        assert_eq!(event.timestamp, ts());
    }

    #[test]
    fn payload_defaults_to_none_when_absent() {
        let line = r#"{"timestamp":"2024-05-01T12:00:00Z","protocol":"icmp","src_ip":"1.2.3.4","dst_ip":"10.0.0.1"}"#;
        let event: NetworkEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.payload, Payload::None);
        assert!(event.is_icmp());
        assert!(event.src_port.is_none());
    }

    #[test]
    fn arp_payload_parses_sender() {
        let line = r#"{"timestamp":"2024-05-01T12:00:00Z","protocol":"arp","src_ip":"10.0.0.1","dst_ip":"10.0.0.255","payload":{"kind":"arp","sender_ip":"10.0.0.1","sender_mac":"AA:BB:CC:00:11:22"}}"#;
        let event: NetworkEvent = serde_json::from_str(line).unwrap();
        match event.payload {
            Payload::Arp {
                sender_ip,
                sender_mac,
            } => {
                assert_eq!(sender_ip.to_string(), "10.0.0.1");
                assert_eq!(sender_mac, "AA:BB:CC:00:11:22");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let line = r#"{"timestamp":"2024-05-01T12:00:00Z","protocol":"sctp","src_ip":"1.1.1.1","dst_ip":"2.2.2.2"}"#;
        assert!(serde_json::from_str::<NetworkEvent>(line).is_err());
    }

    #[test]
    fn accessors_return_none_for_other_payloads() {
        let event = NetworkEvent::new(
            ts(),
            Protocol::Http,
            "10.0.0.1".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
        )
        .with_payload(Payload::Http {
            text: "example.com/login".to_owned(),
        });
        assert!(event.dns_query().is_none());
        assert_eq!(event.http_text(), Some("example.com/login"));
        assert!(!event.is_icmp());
    }

    #[test]
    fn display_contains_endpoints() {
        let event = NetworkEvent::new(
            ts(),
            Protocol::Icmp,
            "1.2.3.4".parse().unwrap(),
            "5.6.7.8".parse().unwrap(),
        )
        .with_ports(1, 2);
        let display = event.to_string();
        assert!(display.contains("icmp 1.2.3.4 -> 5.6.7.8"));
    }
}
