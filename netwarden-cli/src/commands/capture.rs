//! `netwarden capture` command handler

use std::io::Write;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use netwarden_core::config::NetwardenConfig;
use netwarden_core::sink::JsonlSink;
use netwarden_core::types::DetectionRecord;
use netwarden_detect::{DetectorPipeline, ReplaySource, RunReport, StopReason, run_replay};

use crate::cli::CaptureArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `capture` command.
///
/// Replays the capture file in file order on a blocking thread. SIGINT/SIGTERM
/// stop the replay after the current event; the detections log is flushed
/// either way.
///
/// # Errors
///
/// - Source unavailable (missing or unreadable file): exit code 3
/// - Detections log cannot be opened or written: exit code 4
pub async fn execute(
    args: CaptureArgs,
    config: &NetwardenConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let source = ReplaySource::open(&args.file)?;
    let detections_path = config.paths.detections_path();
    let mut sink = JsonlSink::<DetectionRecord>::open(&detections_path, "detections")?;
    let mut pipeline = DetectorPipeline::from_config(config);

    info!(
        component = "runner",
        msg = "start_capture",
        file = %args.file.display(),
        detectors = ?pipeline.detector_names(),
        detections_path = %detections_path.display(),
        "capture replay started"
    );

    let cancel = CancellationToken::new();
    super::cancel_on_shutdown_signal(cancel.clone())?;

    let replay_cancel = cancel.clone();
    let report = tokio::task::spawn_blocking(move || {
        run_replay(source, &mut pipeline, &mut sink, &replay_cancel)
    })
    .await
    .map_err(|e| CliError::Command(format!("capture task failed: {e}")))??;
    // releases the signal task
    cancel.cancel();

    writer.render(&DetectionSummary {
        mode: "capture",
        source: args.file.display().to_string(),
        detections_path: detections_path.display().to_string(),
        report,
    })?;
    Ok(())
}

/// Outcome of a capture or live run.
#[derive(Debug, Serialize)]
pub struct DetectionSummary {
    /// `capture` or `live`
    pub mode: &'static str,
    /// Capture file, feed or interface
    pub source: String,
    /// Where detection records were appended
    pub detections_path: String,
    #[serde(flatten)]
    pub report: RunReport,
}

impl Render for DetectionSummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let status = match self.report.stop_reason {
            StopReason::EndOfInput => "completed".green().bold(),
            StopReason::Cancelled => "stopped".yellow().bold(),
        };
        let stats = &self.report.stats;

        writeln!(w, "{} {} ({})", self.mode.bold(), self.source, status)?;
        writeln!(w, "  Events processed:   {}", stats.events_processed)?;
        writeln!(w, "  Events skipped:     {}", stats.events_skipped)?;
        writeln!(w, "  Late events:        {}", stats.late_events)?;
        writeln!(
            w,
            "  Detections written: {} -> {}",
            self.report.detections_written, self.detections_path
        )?;
        if stats.detector_failures.is_empty() {
            writeln!(w, "  Detector failures:  none")?;
        } else {
            writeln!(w, "  Detector failures:")?;
            for (detector, count) in &stats.detector_failures {
                writeln!(w, "    {:<16} {}", detector, count.to_string().red())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwarden_detect::PipelineStats;

    fn summary(stop_reason: StopReason) -> DetectionSummary {
        let mut stats = PipelineStats {
            events_processed: 35,
            events_skipped: 1,
            detections_emitted: 5,
            ..PipelineStats::default()
        };
        stats.detector_failures.insert("dns_suspicious".to_owned(), 2);
        DetectionSummary {
            mode: "capture",
            source: "traffic.jsonl".to_owned(),
            detections_path: "logs/detections.jsonl".to_owned(),
            report: RunReport {
                stop_reason,
                detections_written: 5,
                stats,
            },
        }
    }

    #[test]
    fn text_summary_lists_counts_and_failures() {
        colored::control::set_override(false);
        let mut buf = Vec::new();
        summary(StopReason::EndOfInput).render_text(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("capture traffic.jsonl (completed)"));
        assert!(text.contains("Events processed:   35"));
        assert!(text.contains("Detections written: 5 -> logs/detections.jsonl"));
        assert!(text.contains("dns_suspicious"));
    }

    #[test]
    fn json_summary_flattens_report() {
        let value = serde_json::to_value(summary(StopReason::Cancelled)).unwrap();
        assert_eq!(value["mode"], "capture");
        assert_eq!(value["stop_reason"], "cancelled");
        assert_eq!(value["detections_written"], 5);
        assert_eq!(value["stats"]["events_skipped"], 1);
    }
}
