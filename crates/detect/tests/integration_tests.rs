//! 통합 테스트 -- 캡처 재생부터 탐지 로그까지의 전체 흐름 검증

use std::io::Write;
use std::net::IpAddr;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use netwarden_core::config::NetwardenConfig;
use netwarden_core::error::{DetectorError, NetwardenError};
use netwarden_core::event::{NetworkEvent, Payload, Protocol};
use netwarden_core::pipeline::Detector;
use netwarden_core::sink::{JsonlSink, MemorySink};
use netwarden_core::types::{DetectionRecord, Severity};
use netwarden_detect::{
    DetectorPipeline, LiveSource, RULE_ARP_SPOOF, RULE_DNS_SUSPICIOUS, RULE_HTTP_KEYWORD,
    RULE_ICMP_FLOOD, ReplaySource, StopReason, run_live, run_replay,
};

fn base() -> DateTime<Utc> {
    "2024-05-01T12:00:00Z".parse().unwrap()
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn icmp(src: &str, offset_ms: i64) -> NetworkEvent {
    NetworkEvent::new(
        base() + Duration::milliseconds(offset_ms),
        Protocol::Icmp,
        ip(src),
        ip("10.0.0.1"),
    )
    .with_payload(Payload::Icmp { icmp_type: 8 })
}

fn arp(sender: &str, mac: &str, offset_ms: i64) -> NetworkEvent {
    NetworkEvent::new(
        base() + Duration::milliseconds(offset_ms),
        Protocol::Arp,
        ip(sender),
        ip("192.168.1.255"),
    )
    .with_payload(Payload::Arp {
        sender_ip: ip(sender),
        sender_mac: mac.to_owned(),
    })
}

fn dns(name: &str, offset_ms: i64) -> NetworkEvent {
    NetworkEvent::new(
        base() + Duration::milliseconds(offset_ms),
        Protocol::Dns,
        ip("10.0.0.5"),
        ip("8.8.8.8"),
    )
    .with_ports(53000, 53)
    .with_payload(Payload::Dns {
        query_name: name.to_owned(),
    })
}

fn http(text: &str, offset_ms: i64) -> NetworkEvent {
    NetworkEvent::new(
        base() + Duration::milliseconds(offset_ms),
        Protocol::Http,
        ip("10.0.0.7"),
        ip("10.0.0.80"),
    )
    .with_ports(51000, 80)
    .with_payload(Payload::Http {
        text: text.to_owned(),
    })
}

/// 모든 탐지기를 한 번 이상 발화시키는 캡처 (중간에 깨진 줄 포함)
fn mixed_capture() -> Vec<String> {
    let mut lines = Vec::new();
    let mut push = |e: NetworkEvent| lines.push(serde_json::to_string(&e).unwrap());

    push(dns(&format!("{}.example.com", "a".repeat(60)), 0));
    push(arp("192.168.1.1", "aa:aa:aa:aa:aa:01", 0));
    for i in 0..31 {
        push(icmp("1.2.3.4", 100 + i * 10));
    }
    push(http("POST /login password=hunter2", 500));
    push(arp("192.168.1.1", "aa:aa:aa:aa:aa:02", 5_000));
    lines.insert(3, "{not json".to_owned());
    lines
}

fn write_capture(path: &Path, lines: &[String]) {
    let mut file = std::fs::File::create(path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
}

/// id를 제외한 탐지 로그 줄
fn lines_without_ids(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let mut value: serde_json::Value = serde_json::from_str(line).unwrap();
            value.as_object_mut().unwrap().remove("id");
            serde_json::to_string(&value).unwrap()
        })
        .collect()
}

fn replay_to(capture: &Path, out: &Path) -> netwarden_detect::RunReport {
    let config = NetwardenConfig::default();
    let mut pipeline = DetectorPipeline::from_config(&config);
    let mut sink = JsonlSink::<DetectionRecord>::open(out, "detections").unwrap();
    let source = ReplaySource::open(capture).unwrap();
    run_replay(source, &mut pipeline, &mut sink, &CancellationToken::new()).unwrap()
}

#[test]
fn replay_fires_every_detector_once() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("capture.jsonl");
    write_capture(&capture, &mixed_capture());
    let out = dir.path().join("logs/detections.jsonl");

    let report = replay_to(&capture, &out);
    assert_eq!(report.stop_reason, StopReason::EndOfInput);
    assert_eq!(report.stats.events_skipped, 1);
    assert_eq!(report.stats.events_processed, 35);

    let records: Vec<DetectionRecord> = std::fs::read_to_string(&out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let rules: Vec<&str> = records.iter().map(|r| r.rule_name.as_str()).collect();
    assert_eq!(
        rules,
        vec![
            RULE_DNS_SUSPICIOUS,
            RULE_ICMP_FLOOD,
            RULE_HTTP_KEYWORD,
            RULE_HTTP_KEYWORD,
            RULE_ARP_SPOOF,
        ]
    );
    assert_eq!(report.detections_written, 5);
}

#[test]
fn replaying_same_capture_twice_is_identical_except_ids() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("capture.jsonl");
    write_capture(&capture, &mixed_capture());

    let first = dir.path().join("first.jsonl");
    let second = dir.path().join("second.jsonl");
    replay_to(&capture, &first);
    replay_to(&capture, &second);

    let a = lines_without_ids(&first);
    let b = lines_without_ids(&second);
    assert!(!a.is_empty());
    assert_eq!(a, b);
}

#[test]
fn arp_two_macs_within_window_fire_once() {
    let mut pipeline = DetectorPipeline::from_config(&NetwardenConfig::default());
    let mut sink = MemorySink::new();
    let events = vec![
        Ok(arp("192.168.1.1", "aa:aa:aa:aa:aa:01", 0)),
        Ok(arp("192.168.1.1", "aa:aa:aa:aa:aa:02", 5_000)),
    ];
    run_replay(events, &mut pipeline, &mut sink, &CancellationToken::new()).unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let macs: Vec<&str> = records[0].details["macs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["mac"].as_str().unwrap())
        .collect();
    assert_eq!(macs, vec!["aa:aa:aa:aa:aa:01", "aa:aa:aa:aa:aa:02"]);
}

/// 특정 이벤트 인덱스에서 실패하는 탐지기
struct Saboteur {
    seen: usize,
    panic_on: usize,
    error_on: usize,
}

impl Detector for Saboteur {
    fn name(&self) -> &str {
        "saboteur"
    }

    fn observe(&mut self, _event: &NetworkEvent) -> Result<Vec<DetectionRecord>, DetectorError> {
        let index = self.seen;
        self.seen += 1;
        if index == self.panic_on {
            panic!("saboteur panicked on event {index}");
        }
        if index == self.error_on {
            return Err(DetectorError::Evaluation {
                detector: "saboteur".into(),
                reason: format!("event {index}"),
            });
        }
        Ok(Vec::new())
    }
}

#[test]
fn failing_detector_does_not_suppress_other_detections() {
    let config = NetwardenConfig::default();
    let mut detectors = netwarden_detect::detector::from_config(&config);
    // 탐지기 순서상 앞에 두어 다른 탐지기보다 먼저 실패하게 합니다.
    detectors.insert(
        0,
        Box::new(Saboteur {
            seen: 0,
            panic_on: 0,
            error_on: 1,
        }),
    );
    let mut pipeline = DetectorPipeline::new(detectors);

    let long_name = format!("{}.example.com", "b".repeat(60));
    let first = pipeline.process(&dns(&long_name, 0));
    let second = pipeline.process(&dns(&long_name, 10));
    let third = pipeline.process(&dns(&long_name, 20));

    for records in [&first, &second, &third] {
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rule_name, RULE_DNS_SUSPICIOUS);
        assert_eq!(records[0].severity, Severity::Medium);
    }
    let stats = pipeline.stats();
    assert_eq!(stats.detector_failures.get("saboteur"), Some(&2));
    assert_eq!(stats.detections_emitted, 3);
}

#[tokio::test]
async fn live_run_drains_feed_into_sink() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("detections.jsonl");

    let mut input = String::new();
    for i in 0..31 {
        input.push_str(&serde_json::to_string(&icmp("1.2.3.4", i * 10)).unwrap());
        input.push('\n');
    }
    input.push_str("garbage\n");

    let feed = LiveSource::from_reader("mem", std::io::Cursor::new(input.into_bytes()));
    let pipeline = DetectorPipeline::from_config(&NetwardenConfig::default());
    let sink = JsonlSink::<DetectionRecord>::open(&out, "detections").unwrap();

    let report = run_live(feed, pipeline, sink, 4, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.stop_reason, StopReason::EndOfInput);
    assert_eq!(report.stats.events_processed, 31);
    assert_eq!(report.stats.events_skipped, 1);
    assert_eq!(report.detections_written, 1);

    let content = std::fs::read_to_string(&out).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.contains(RULE_ICMP_FLOOD));
}

#[tokio::test]
async fn live_run_stops_on_cancel_with_open_feed() {
    let (mut writer, reader) = tokio::io::duplex(4096);
    let line = serde_json::to_string(&icmp("1.2.3.4", 0)).unwrap();
    writer.write_all(format!("{line}\n").as_bytes()).await.unwrap();

    let feed = LiveSource::from_reader("duplex", tokio::io::BufReader::new(reader));
    let pipeline = DetectorPipeline::from_config(&NetwardenConfig::default());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_live(
        feed,
        pipeline,
        MemorySink::new(),
        8,
        cancel.clone(),
    ));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    cancel.cancel();
    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.stop_reason, StopReason::Cancelled);
    // writer는 끝까지 열려 있으므로 피드는 EOF에 도달하지 않았습니다.
    drop(writer);
}

#[tokio::test]
async fn live_sink_failure_stops_producer_and_reports_error() {
    let (mut writer, reader) = tokio::io::duplex(64 * 1024);
    for i in 0..31 {
        let line = serde_json::to_string(&icmp("1.2.3.4", i * 10)).unwrap();
        writer.write_all(format!("{line}\n").as_bytes()).await.unwrap();
    }

    let feed = LiveSource::from_reader("duplex", tokio::io::BufReader::new(reader));
    let pipeline = DetectorPipeline::from_config(&NetwardenConfig::default());
    let err = run_live(
        feed,
        pipeline,
        MemorySink::failing_after(0),
        8,
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, NetwardenError::Sink(_)));
    drop(writer);
}
