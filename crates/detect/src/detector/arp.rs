//! ARP 스푸핑 탐지기
//!
//! 발신자 IP별로 `arp_window_sec` 안에서 관측된 MAC 주소를 추적합니다.
//! 윈도우 엔트리는 MAC 하나당 하나이며, 시각은 마지막 관측 시각이고
//! 값은 처음 관측 시각을 함께 들고 있습니다.
//!
//! 윈도우에 다른 MAC이 남아 있는 상태에서 새 MAC이 나타나면 발화하고,
//! 현재 연관된 모든 MAC과 처음 관측 시각을 `details.macs`에 담습니다.

use std::net::IpAddr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

use netwarden_core::config::{LimitsConfig, ThresholdsConfig};
use netwarden_core::error::DetectorError;
use netwarden_core::event::{NetworkEvent, Payload};
use netwarden_core::pipeline::Detector;
use netwarden_core::types::{DetectionRecord, Severity};
use netwarden_core::window::KeyedWindows;

use super::RULE_ARP_SPOOF;

/// IP에 연관된 MAC 관측
#[derive(Debug, Clone, PartialEq, Eq)]
struct MacSighting {
    mac: String,
    first_seen: DateTime<Utc>,
}

/// ARP 스푸핑 탐지기
#[derive(Debug)]
pub struct ArpSpoofDetector {
    windows: KeyedWindows<IpAddr, MacSighting>,
    window_sec: u64,
}

impl ArpSpoofDetector {
    /// 새 ARP 스푸핑 탐지기를 생성합니다.
    pub fn new(thresholds: &ThresholdsConfig, limits: &LimitsConfig) -> Self {
        Self {
            windows: KeyedWindows::new(
                thresholds.arp_window(),
                limits.max_entries_per_key,
                limits.max_tracked_keys,
            ),
            window_sec: thresholds.arp_window_sec,
        }
    }
}

impl Detector for ArpSpoofDetector {
    fn name(&self) -> &str {
        RULE_ARP_SPOOF
    }

    fn observe(&mut self, event: &NetworkEvent) -> Result<Vec<DetectionRecord>, DetectorError> {
        let Payload::Arp {
            sender_ip,
            sender_mac,
        } = &event.payload
        else {
            return Ok(Vec::new());
        };

        let mac = normalize_mac(sender_mac).ok_or_else(|| DetectorError::Evaluation {
            detector: RULE_ARP_SPOOF.to_owned(),
            reason: format!("invalid sender mac '{sender_mac}'"),
        })?;

        let ts = event.timestamp;
        let Some(slot) = self.windows.advance(sender_ip, ts) else {
            return Ok(Vec::new());
        };

        let previous = slot.window.take_first(|s| s.mac == mac);
        let is_new = previous.is_none();
        let (last_seen, first_seen) = match previous {
            Some(p) => (p.timestamp.max(ts), p.value.first_seen.min(ts)),
            None => (ts, ts),
        };
        slot.window.observe(
            last_seen,
            MacSighting {
                mac: mac.clone(),
                first_seen,
            },
        );

        if !is_new || slot.window.len() < 2 {
            return Ok(Vec::new());
        }

        let mut sightings: Vec<&MacSighting> = slot.window.iter().map(|e| &e.value).collect();
        sightings.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.mac.cmp(&b.mac)));
        let macs: Vec<serde_json::Value> = sightings
            .iter()
            .map(|s| {
                json!({
                    "mac": s.mac,
                    "first_seen": s.first_seen.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                })
            })
            .collect();

        let record = DetectionRecord::new(RULE_ARP_SPOOF, Severity::Medium, *sender_ip, ts)
            .with_detail("macs", macs)
            .with_detail("new_mac", mac)
            .with_detail("window_sec", self.window_sec);

        Ok(vec![record])
    }

    fn prune(&mut self, now: DateTime<Utc>) -> usize {
        self.windows.prune_idle(now)
    }

    fn late_events(&self) -> u64 {
        self.windows.late_events()
    }

    fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

/// MAC 주소를 소문자 콜론 표기로 정규화합니다.
///
/// `aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF` 형식을 받으며 그 외는 `None`입니다.
fn normalize_mac(raw: &str) -> Option<String> {
    let octets: Vec<&str> = raw.trim().split([':', '-']).collect();
    if octets.len() != 6
        || !octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return None;
    }
    Some(octets.join(":").to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use netwarden_core::event::Protocol;

    const IP_A: &str = "192.168.1.1";

    fn base() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    fn arp(ip: &str, mac: &str, offset_secs: i64) -> NetworkEvent {
        let sender: IpAddr = ip.parse().unwrap();
        NetworkEvent::new(
            base() + Duration::seconds(offset_secs),
            Protocol::Arp,
            sender,
            "192.168.1.255".parse().unwrap(),
        )
        .with_payload(Payload::Arp {
            sender_ip: sender,
            sender_mac: mac.to_owned(),
        })
    }

    fn detector() -> ArpSpoofDetector {
        ArpSpoofDetector::new(&ThresholdsConfig::default(), &LimitsConfig::default())
    }

    #[test]
    fn second_mac_within_window_fires_once_with_both_macs() {
        let mut d = detector();
        assert!(d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:01", 0)).unwrap().is_empty());
        let records = d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:02", 5)).unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.rule_name, RULE_ARP_SPOOF);
        assert_eq!(record.source_ip.to_string(), IP_A);
        let macs = record.details["macs"].as_array().unwrap();
        assert_eq!(macs.len(), 2);
        assert_eq!(macs[0]["mac"], "aa:aa:aa:aa:aa:01");
        assert_eq!(macs[0]["first_seen"], "2024-05-01T12:00:00Z");
        assert_eq!(macs[1]["mac"], "aa:aa:aa:aa:aa:02");
        assert_eq!(macs[1]["first_seen"], "2024-05-01T12:00:05Z");
        assert_eq!(record.details["new_mac"], "aa:aa:aa:aa:aa:02");
    }

    #[test]
    fn repeated_known_macs_do_not_fire_again() {
        let mut d = detector();
        d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:01", 0)).unwrap();
        assert_eq!(d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:02", 5)).unwrap().len(), 1);
        assert!(d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:01", 6)).unwrap().is_empty());
        assert!(d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:02", 7)).unwrap().is_empty());
    }

    #[test]
    fn third_mac_fires_and_lists_all() {
        let mut d = detector();
        d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:01", 0)).unwrap();
        d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:02", 1)).unwrap();
        let records = d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:03", 2)).unwrap();
        assert_eq!(records[0].details["macs"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn mac_outside_window_is_forgotten() {
        let mut d = detector();
        d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:01", 0)).unwrap();
        assert!(d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:02", 61)).unwrap().is_empty());
    }

    #[test]
    fn refresh_keeps_first_seen_and_extends_lifetime() {
        let mut d = detector();
        d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:01", 0)).unwrap();
        d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:01", 50)).unwrap();
        let records = d.observe(&arp(IP_A, "aa:aa:aa:aa:aa:02", 100)).unwrap();
        assert_eq!(records.len(), 1);
        let macs = records[0].details["macs"].as_array().unwrap();
        assert_eq!(macs[0]["first_seen"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn mac_comparison_is_case_insensitive() {
        let mut d = detector();
        d.observe(&arp(IP_A, "AA:BB:CC:DD:EE:FF", 0)).unwrap();
        assert!(d.observe(&arp(IP_A, "aa-bb-cc-dd-ee-ff", 1)).unwrap().is_empty());
    }

    #[test]
    fn different_ips_are_independent() {
        let mut d = detector();
        d.observe(&arp("10.0.0.1", "aa:aa:aa:aa:aa:01", 0)).unwrap();
        assert!(d.observe(&arp("10.0.0.2", "aa:aa:aa:aa:aa:02", 1)).unwrap().is_empty());
        assert_eq!(d.tracked_keys(), 2);
    }

    #[test]
    fn invalid_mac_is_an_evaluation_error() {
        let mut d = detector();
        let err = d.observe(&arp(IP_A, "not-a-mac", 0)).unwrap_err();
        assert!(matches!(err, DetectorError::Evaluation { .. }));
    }

    #[test]
    fn normalize_mac_formats() {
        assert_eq!(normalize_mac(" AA-bb-CC-00-11-22 ").as_deref(), Some("aa:bb:cc:00:11:22"));
        assert!(normalize_mac("aa:bb:cc:dd:ee").is_none());
        assert!(normalize_mac("zz:bb:cc:dd:ee:ff").is_none());
    }
}
