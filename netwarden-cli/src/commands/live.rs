//! `netwarden live` command handler

use tokio_util::sync::CancellationToken;
use tracing::info;

use netwarden_core::config::NetwardenConfig;
use netwarden_core::pipeline::EventFeed;
use netwarden_core::sink::JsonlSink;
use netwarden_core::types::DetectionRecord;
use netwarden_detect::{
    DetectorPipeline, LiveSource, RunReport, check_interface, idle_until_cancelled, run_live,
};

use crate::cli::LiveArgs;
use crate::commands::capture::DetectionSummary;
use crate::error::CliError;
use crate::output::OutputWriter;

/// Feed argument meaning stdin.
const STDIN_FEED: &str = "-";

/// Execute the `live` command.
///
/// The interface must exist. With `--dry-run` (or `live.dry_run`) no feed is
/// opened and the command idles until SIGINT/SIGTERM. Otherwise events are
/// read from `--feed` (stdin by default) until EOF or a shutdown signal.
pub async fn execute(
    args: LiveArgs,
    config: &NetwardenConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    check_interface(&args.iface)?;
    let dry_run = args.dry_run || config.live.dry_run;
    let feed_name = feed_label(args.feed.as_deref());

    let cancel = CancellationToken::new();
    super::cancel_on_shutdown_signal(cancel.clone())?;

    info!(
        component = "runner",
        msg = "start_live",
        iface = %args.iface,
        feed = %feed_name,
        dry_run,
        queue_capacity = config.live.queue_capacity,
        "live detection started"
    );

    let detections_path = config.paths.detections_path();
    let report = if dry_run {
        idle_until_cancelled(&cancel).await
    } else {
        match args.feed.as_deref() {
            None | Some(STDIN_FEED) => {
                run_feed(LiveSource::stdin(), config, cancel.clone()).await?
            }
            Some(path) => run_feed(LiveSource::open(path).await?, config, cancel.clone()).await?,
        }
    };
    cancel.cancel();

    let input = if dry_run { "dry-run" } else { feed_name.as_str() };
    writer.render(&DetectionSummary {
        mode: "live",
        source: format!("{} ({})", args.iface, input),
        detections_path: detections_path.display().to_string(),
        report,
    })?;
    Ok(())
}

async fn run_feed<F: EventFeed + 'static>(
    feed: F,
    config: &NetwardenConfig,
    cancel: CancellationToken,
) -> Result<RunReport, CliError> {
    let sink = JsonlSink::<DetectionRecord>::open(config.paths.detections_path(), "detections")?;
    let pipeline = DetectorPipeline::from_config(config);
    let report = run_live(feed, pipeline, sink, config.live.queue_capacity, cancel).await?;
    Ok(report)
}

fn feed_label(feed: Option<&str>) -> String {
    match feed {
        None | Some(STDIN_FEED) => "stdin".to_owned(),
        Some(path) => path.to_owned(),
    }
}
