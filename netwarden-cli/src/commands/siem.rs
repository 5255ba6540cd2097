//! `netwarden siem` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use netwarden_core::config::NetwardenConfig;
use netwarden_core::reader::JsonlReader;
use netwarden_core::sink::JsonlSink;
use netwarden_core::types::{AlertRecord, DetectionRecord};
use netwarden_correlate::{
    CorrelateReport, CorrelationEngine, Follower, RuleCount, TalkerCount, TimelineBucket,
    correlate_batch, rule_stats, timeline, top_talkers,
};

use crate::cli::{SiemAction, SiemArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `siem` command.
pub async fn execute(
    args: SiemArgs,
    config: &NetwardenConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        SiemAction::RuleStats => {
            let (path, records) = load_detections(config)?;
            writer.render(&RuleStatsReport {
                detections_path: path,
                total: records.len(),
                rules: rule_stats(&records),
            })
        }
        SiemAction::Timeline => {
            let (path, records) = load_detections(config)?;
            writer.render(&TimelineReport {
                detections_path: path,
                buckets: timeline(&records),
            })
        }
        SiemAction::TopTalkers { limit } => {
            let (path, records) = load_detections(config)?;
            writer.render(&TopTalkersReport {
                detections_path: path,
                limit,
                talkers: top_talkers(&records, limit),
            })
        }
        SiemAction::Correlate { follow: false } => {
            let outcome = correlate_once(config)?;
            writer.render(&outcome)
        }
        SiemAction::Correlate { follow: true } => {
            let outcome = correlate_follow(config).await?;
            writer.render(&outcome)
        }
    }
}

/// Read the whole detections log. A missing log reads as empty.
fn load_detections(config: &NetwardenConfig) -> Result<(String, Vec<DetectionRecord>), CliError> {
    let path = config.paths.detections_path();
    let batch = JsonlReader::<DetectionRecord>::new(&path).read_all()?;
    Ok((path.display().to_string(), batch.records))
}

/// One pass over the detections log from offset 0. The tail cursor is left untouched.
fn correlate_once(config: &NetwardenConfig) -> Result<CorrelateOutcome, CliError> {
    let detections_path = config.paths.detections_path();
    let alerts_path = config.paths.alerts_path();
    let reader = JsonlReader::<DetectionRecord>::new(&detections_path);
    let mut engine = CorrelationEngine::from_config(config);
    let mut sink = JsonlSink::<AlertRecord>::open(&alerts_path, "alerts")?;

    info!(
        detections_path = %detections_path.display(),
        rules = ?engine.rule_names(),
        "batch correlation started"
    );
    let report = correlate_batch(&reader, &mut engine, &mut sink)?;
    Ok(CorrelateOutcome::new("batch", &alerts_path, report))
}

/// Tail the detections log from the saved cursor until SIGINT/SIGTERM.
async fn correlate_follow(config: &NetwardenConfig) -> Result<CorrelateOutcome, CliError> {
    let alerts_path = config.paths.alerts_path();
    let sink = JsonlSink::<AlertRecord>::open(&alerts_path, "alerts")?;
    let follower = Follower::new(
        JsonlReader::new(config.paths.detections_path()),
        CorrelationEngine::from_config(config),
        sink,
        config.paths.cursor_path(),
    );

    let cancel = CancellationToken::new();
    super::cancel_on_shutdown_signal(cancel.clone())?;
    let report = follower
        .run(config.correlation.poll_interval(), cancel)
        .await?;
    Ok(CorrelateOutcome::new("follow", &alerts_path, report))
}

// --- reports ---

/// Detection count per rule.
#[derive(Debug, Serialize)]
pub struct RuleStatsReport {
    pub detections_path: String,
    pub total: usize,
    pub rules: Vec<RuleCount>,
}

impl Render for RuleStatsReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Rule stats: {} ({} detections)",
            self.detections_path.bold(),
            self.total
        )?;
        if self.rules.is_empty() {
            writeln!(w, "  no detections")?;
        }
        for rule in &self.rules {
            writeln!(w, "  {rule}")?;
        }
        Ok(())
    }
}

/// Detection count per UTC minute.
#[derive(Debug, Serialize)]
pub struct TimelineReport {
    pub detections_path: String,
    pub buckets: Vec<TimelineBucket>,
}

impl Render for TimelineReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Timeline (UTC): {}", self.detections_path.bold())?;
        if self.buckets.is_empty() {
            writeln!(w, "  no detections")?;
        }
        for bucket in &self.buckets {
            writeln!(w, "  {bucket}")?;
        }
        Ok(())
    }
}

/// Source IPs with the most detections.
#[derive(Debug, Serialize)]
pub struct TopTalkersReport {
    pub detections_path: String,
    pub limit: usize,
    pub talkers: Vec<TalkerCount>,
}

impl Render for TopTalkersReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Top {} talkers: {}",
            self.limit,
            self.detections_path.bold()
        )?;
        if self.talkers.is_empty() {
            writeln!(w, "  no detections")?;
        }
        for talker in &self.talkers {
            writeln!(w, "  {talker}")?;
        }
        Ok(())
    }
}

/// Outcome of `siem correlate`.
#[derive(Debug, Serialize)]
pub struct CorrelateOutcome {
    /// `batch` or `follow`
    pub mode: &'static str,
    pub alerts_path: String,
    #[serde(flatten)]
    pub report: CorrelateReport,
}

impl CorrelateOutcome {
    fn new(mode: &'static str, alerts_path: &Path, report: CorrelateReport) -> Self {
        Self {
            mode,
            alerts_path: alerts_path.display().to_string(),
            report,
        }
    }
}

impl Render for CorrelateOutcome {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let alerts = self.report.alerts_written.to_string();
        let alerts = if self.report.alerts_written > 0 {
            alerts.red().bold()
        } else {
            alerts.green()
        };
        writeln!(w, "Correlation ({})", self.mode.bold())?;
        writeln!(
            w,
            "  Detections ingested: {}",
            self.report.stats.detections_ingested
        )?;
        writeln!(w, "  Lines skipped:       {}", self.report.stats.lines_skipped)?;
        writeln!(w, "  Alerts written:      {} -> {}", alerts, self.alerts_path)?;
        writeln!(w, "  Log offset:          {}", self.report.offset)?;
        Ok(())
    }
}
