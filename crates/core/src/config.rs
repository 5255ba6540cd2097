//! 설정 관리 -- netwarden.toml 파싱 및 런타임 설정
//!
//! [`NetwardenConfig`]는 모든 구성 요소의 설정을 담는 최상위 구조체입니다.
//! 알 수 없는 키와 범위를 벗어난 값은 처리를 시작하기 전에 거부됩니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`NETWARDEN_THRESHOLDS_ICMP_PER_SEC=50` 형식)
//! 3. 설정 파일 (`netwarden.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), netwarden_core::error::NetwardenError> {
//! use netwarden_core::config::NetwardenConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드 + 검증
//! let config = NetwardenConfig::load("netwarden.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = NetwardenConfig::parse("[thresholds]\nicmp_per_sec = 50")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, NetwardenError};

/// netwarden 통합 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetwardenConfig {
    /// 일반 설정 (로깅)
    pub general: GeneralConfig,
    /// 탐지기 임계값
    pub thresholds: ThresholdsConfig,
    /// 탐지기 활성화 토글
    pub rules: RulesConfig,
    /// 상관 분석 설정
    pub correlation: CorrelationConfig,
    /// 메모리 상한
    pub limits: LimitsConfig,
    /// 영속 파일 경로
    pub paths: PathsConfig,
    /// 라이브 모드 설정
    pub live: LiveConfig,
    /// Prometheus 메트릭 설정
    pub metrics: MetricsConfig,
}

impl NetwardenConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, NetwardenError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, NetwardenError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NetwardenError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                NetwardenError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, NetwardenError> {
        toml::from_str(toml_str).map_err(|e| {
            NetwardenError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `NETWARDEN_{SECTION}_{FIELD}`
    ///
    /// 값을 해석할 수 없으면 [`ConfigError::InvalidValue`]를 반환합니다 (필드는 환경변수 이름).
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // General
        override_string(&mut self.general.log_level, "NETWARDEN_GENERAL_LOG_LEVEL")?;
        override_string(&mut self.general.log_format, "NETWARDEN_GENERAL_LOG_FORMAT")?;

        // Thresholds
        override_usize(
            &mut self.thresholds.dns_label_max,
            "NETWARDEN_THRESHOLDS_DNS_LABEL_MAX",
        )?;
        override_usize(
            &mut self.thresholds.dns_name_max,
            "NETWARDEN_THRESHOLDS_DNS_NAME_MAX",
        )?;
        override_f64(
            &mut self.thresholds.entropy_threshold,
            "NETWARDEN_THRESHOLDS_ENTROPY_THRESHOLD",
        )?;
        override_u64(
            &mut self.thresholds.icmp_per_sec,
            "NETWARDEN_THRESHOLDS_ICMP_PER_SEC",
        )?;
        override_u64(
            &mut self.thresholds.icmp_window_sec,
            "NETWARDEN_THRESHOLDS_ICMP_WINDOW_SEC",
        )?;
        override_u64(
            &mut self.thresholds.arp_window_sec,
            "NETWARDEN_THRESHOLDS_ARP_WINDOW_SEC",
        )?;
        override_csv(
            &mut self.thresholds.http_keywords,
            "NETWARDEN_THRESHOLDS_HTTP_KEYWORDS",
        )?;

        // Rules
        override_bool(&mut self.rules.dns_suspicious, "NETWARDEN_RULES_DNS_SUSPICIOUS")?;
        override_bool(&mut self.rules.icmp_flood, "NETWARDEN_RULES_ICMP_FLOOD")?;
        override_bool(&mut self.rules.arp_spoof, "NETWARDEN_RULES_ARP_SPOOF")?;
        override_bool(&mut self.rules.http_keyword, "NETWARDEN_RULES_HTTP_KEYWORD")?;

        // Correlation
        override_u64(
            &mut self.correlation.icmp_meta_window_sec,
            "NETWARDEN_CORRELATION_ICMP_META_WINDOW_SEC",
        )?;
        override_u64(
            &mut self.correlation.icmp_meta_threshold,
            "NETWARDEN_CORRELATION_ICMP_META_THRESHOLD",
        )?;
        override_u64(
            &mut self.correlation.repeated_rule_threshold,
            "NETWARDEN_CORRELATION_REPEATED_RULE_THRESHOLD",
        )?;
        override_u64(
            &mut self.correlation.poll_interval_ms,
            "NETWARDEN_CORRELATION_POLL_INTERVAL_MS",
        )?;

        // Limits
        override_usize(
            &mut self.limits.max_tracked_keys,
            "NETWARDEN_LIMITS_MAX_TRACKED_KEYS",
        )?;
        override_usize(
            &mut self.limits.max_entries_per_key,
            "NETWARDEN_LIMITS_MAX_ENTRIES_PER_KEY",
        )?;
        override_u64(&mut self.limits.prune_every, "NETWARDEN_LIMITS_PRUNE_EVERY")?;

        // Paths
        override_path(&mut self.paths.logs_dir, "NETWARDEN_PATHS_LOGS_DIR")?;

        // Live
        override_usize(
            &mut self.live.queue_capacity,
            "NETWARDEN_LIVE_QUEUE_CAPACITY",
        )?;
        override_bool(&mut self.live.dry_run, "NETWARDEN_LIVE_DRY_RUN")?;

        // Metrics
        override_bool(&mut self.metrics.enabled, "NETWARDEN_METRICS_ENABLED")?;
        override_string(&mut self.metrics.listen_addr, "NETWARDEN_METRICS_LISTEN_ADDR")?;
        override_u16(&mut self.metrics.port, "NETWARDEN_METRICS_PORT")?;
        Ok(())
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), NetwardenError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        let t = &self.thresholds;
        require_positive("thresholds.dns_label_max", t.dns_label_max as u64)?;
        require_positive("thresholds.dns_name_max", t.dns_name_max as u64)?;
        require_positive("thresholds.icmp_per_sec", t.icmp_per_sec)?;
        require_window("thresholds.icmp_window_sec", t.icmp_window_sec)?;
        require_window("thresholds.arp_window_sec", t.arp_window_sec)?;

        // 8 bits/char는 바이트 알파벳의 최대 엔트로피
        if !t.entropy_threshold.is_finite()
            || t.entropy_threshold <= 0.0
            || t.entropy_threshold > 8.0
        {
            return Err(invalid(
                "thresholds.entropy_threshold",
                "must be within (0, 8]".to_owned(),
            ));
        }

        if t.http_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(invalid(
                "thresholds.http_keywords",
                "keywords must not be empty strings".to_owned(),
            ));
        }

        let c = &self.correlation;
        require_window("correlation.icmp_meta_window_sec", c.icmp_meta_window_sec)?;
        require_positive("correlation.icmp_meta_threshold", c.icmp_meta_threshold)?;
        require_positive(
            "correlation.repeated_rule_threshold",
            c.repeated_rule_threshold,
        )?;
        require_positive("correlation.poll_interval_ms", c.poll_interval_ms)?;

        let l = &self.limits;
        require_positive("limits.max_tracked_keys", l.max_tracked_keys as u64)?;
        require_positive("limits.prune_every", l.prune_every)?;
        // 윈도우 상한이 임계값보다 작으면 홍수를 영원히 탐지할 수 없음
        let icmp_threshold = t.icmp_per_sec.saturating_mul(t.icmp_window_sec);
        if (l.max_entries_per_key as u64) <= icmp_threshold
            || (l.max_entries_per_key as u64) < c.icmp_meta_threshold
        {
            return Err(invalid(
                "limits.max_entries_per_key",
                format!(
                    "must exceed icmp threshold ({icmp_threshold}) and correlation.icmp_meta_threshold ({})",
                    c.icmp_meta_threshold
                ),
            ));
        }

        if self.paths.logs_dir.as_os_str().is_empty() {
            return Err(invalid(
                "paths.logs_dir",
                "must not be empty".to_owned(),
            ));
        }

        require_positive("live.queue_capacity", self.live.queue_capacity as u64)?;

        if self.metrics.enabled && self.metrics.listen_addr.parse::<std::net::IpAddr>().is_err() {
            return Err(invalid(
                "metrics.listen_addr",
                format!("'{}' is not an IP address", self.metrics.listen_addr),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> NetwardenError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn require_positive(field: &str, value: u64) -> Result<(), NetwardenError> {
    if value == 0 {
        return Err(invalid(field, "must be >= 1".to_owned()));
    }
    Ok(())
}

/// 윈도우 길이 상한 (1년)
const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

fn require_window(field: &str, value: u64) -> Result<(), NetwardenError> {
    require_positive(field, value)?;
    if value > MAX_WINDOW_SECS {
        return Err(invalid(
            field,
            format!("must be <= {MAX_WINDOW_SECS} seconds"),
        ));
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 탐지기 임계값
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdsConfig {
    /// DNS 레이블 최대 길이
    pub dns_label_max: usize,
    /// DNS 이름 전체 최대 길이
    pub dns_name_max: usize,
    /// Shannon 엔트로피 임계값 (bits/char)
    pub entropy_threshold: f64,
    /// 초당 허용 ICMP 수
    pub icmp_per_sec: u64,
    /// ICMP 윈도우 (초)
    pub icmp_window_sec: u64,
    /// ARP IP-MAC 관측 윈도우 (초)
    pub arp_window_sec: u64,
    /// HTTP 키워드 (대소문자 무시, 순서 유지)
    pub http_keywords: Vec<String>,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            dns_label_max: 50,
            dns_name_max: 100,
            entropy_threshold: 4.0,
            icmp_per_sec: 30,
            icmp_window_sec: 1,
            arp_window_sec: 60,
            http_keywords: vec![
                "admin".to_owned(),
                "password".to_owned(),
                "login".to_owned(),
            ],
        }
    }
}

impl ThresholdsConfig {
    /// ICMP 윈도우 호라이즌
    pub fn icmp_window(&self) -> Duration {
        secs(self.icmp_window_sec)
    }

    /// ICMP 윈도우 기준 발화 임계값 (`icmp_per_sec * icmp_window_sec`)
    pub fn icmp_threshold(&self) -> u64 {
        self.icmp_per_sec.saturating_mul(self.icmp_window_sec)
    }

    /// ARP 윈도우 호라이즌
    pub fn arp_window(&self) -> Duration {
        secs(self.arp_window_sec)
    }
}

/// 탐지기 활성화 토글
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RulesConfig {
    /// DNS 의심 이름 탐지
    pub dns_suspicious: bool,
    /// ICMP 홍수 탐지
    pub icmp_flood: bool,
    /// ARP 스푸핑 탐지
    pub arp_spoof: bool,
    /// HTTP 키워드 탐지
    pub http_keyword: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            dns_suspicious: true,
            icmp_flood: true,
            arp_spoof: true,
            http_keyword: true,
        }
    }
}

/// 상관 분석 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorrelationConfig {
    /// ICMP 메타 알림 윈도우 (초)
    pub icmp_meta_window_sec: u64,
    /// ICMP 메타 알림 임계값 (윈도우 내 탐지 수)
    pub icmp_meta_threshold: u64,
    /// 동일 규칙 반복 알림 임계값 (누적)
    pub repeated_rule_threshold: u64,
    /// tail 모드 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            icmp_meta_window_sec: 60,
            icmp_meta_threshold: 30,
            repeated_rule_threshold: 50,
            poll_interval_ms: 1000,
        }
    }
}

impl CorrelationConfig {
    /// ICMP 메타 알림 윈도우 호라이즌
    pub fn icmp_meta_window(&self) -> Duration {
        secs(self.icmp_meta_window_sec)
    }

    /// tail 폴링 간격
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

/// 윈도우 상태 메모리 상한
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// 탐지기/규칙별 최대 추적 키 수
    pub max_tracked_keys: usize,
    /// 키별 최대 윈도우 엔트리 수
    pub max_entries_per_key: usize,
    /// 유휴 키 정리 주기 (이벤트 수)
    pub prune_every: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_tracked_keys: 100_000,
            max_entries_per_key: crate::window::DEFAULT_MAX_ENTRIES,
            prune_every: 1024,
        }
    }
}

/// 영속 파일 경로
///
/// 파일명이 절대 경로면 `logs_dir`을 무시합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// 로그 디렉토리
    pub logs_dir: PathBuf,
    /// 탐지 로그 파일명
    pub detections_file: String,
    /// 알림 로그 파일명
    pub alerts_file: String,
    /// 상관 분석 tail 커서 파일명
    pub cursor_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            detections_file: "detections.jsonl".to_owned(),
            alerts_file: "alerts.jsonl".to_owned(),
            cursor_file: "correlation.cursor".to_owned(),
        }
    }
}

impl PathsConfig {
    /// 탐지 로그 경로
    pub fn detections_path(&self) -> PathBuf {
        self.logs_dir.join(&self.detections_file)
    }

    /// 알림 로그 경로
    pub fn alerts_path(&self) -> PathBuf {
        self.logs_dir.join(&self.alerts_file)
    }

    /// tail 커서 경로
    pub fn cursor_path(&self) -> PathBuf {
        self.logs_dir.join(&self.cursor_file)
    }
}

/// 라이브 모드 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiveConfig {
    /// 생산자-소비자 큐 용량
    pub queue_capacity: usize,
    /// 캡처 없이 종료 신호까지 대기
    pub dry_run: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            dry_run: false,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// exporter 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9108,
        }
    }
}

fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_WINDOW_SECS) as i64)
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) -> Result<(), ConfigError> {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
    Ok(())
}

fn override_path(target: &mut PathBuf, env_key: &str) -> Result<(), ConfigError> {
    if let Ok(val) = std::env::var(env_key) {
        *target = PathBuf::from(val);
    }
    Ok(())
}

fn override_parsed<T: std::str::FromStr>(
    target: &mut T,
    env_key: &str,
    type_name: &str,
) -> Result<(), ConfigError> {
    let Ok(val) = std::env::var(env_key) else {
        return Ok(());
    };
    *target = val.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        field: env_key.to_owned(),
        reason: format!("expected {type_name}, got '{val}'"),
    })?;
    Ok(())
}

fn override_bool(target: &mut bool, env_key: &str) -> Result<(), ConfigError> {
    override_parsed(target, env_key, "bool")
}

fn override_usize(target: &mut usize, env_key: &str) -> Result<(), ConfigError> {
    override_parsed(target, env_key, "usize")
}

fn override_u64(target: &mut u64, env_key: &str) -> Result<(), ConfigError> {
    override_parsed(target, env_key, "u64")
}

fn override_u16(target: &mut u16, env_key: &str) -> Result<(), ConfigError> {
    override_parsed(target, env_key, "u16")
}

fn override_f64(target: &mut f64, env_key: &str) -> Result<(), ConfigError> {
    override_parsed(target, env_key, "f64")
}

fn override_csv(target: &mut Vec<String>, env_key: &str) -> Result<(), ConfigError> {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
    Ok(())
}
