//! `netwarden config` command handler and effective-config loading

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use netwarden_core::config::NetwardenConfig;
use netwarden_core::error::NetwardenError;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Section names accepted by `config show --section`.
pub const SECTIONS: &[&str] = &[
    "general",
    "thresholds",
    "rules",
    "correlation",
    "limits",
    "paths",
    "live",
    "metrics",
];

/// Load the effective configuration: defaults < file < environment.
///
/// When the path was not given explicitly and the default file does not
/// exist, the built-in defaults are used. An explicit path must exist.
pub async fn load_effective(path: &Path, explicit: bool) -> Result<NetwardenConfig, NetwardenError> {
    if !explicit && !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let mut config = NetwardenConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        return Ok(config);
    }
    NetwardenConfig::load(path).await
}

/// Where the effective configuration came from, for reports.
fn source_label(path: &Path, explicit: bool) -> String {
    if !explicit && !path.exists() {
        "built-in defaults".to_owned()
    } else {
        path.display().to_string()
    }
}

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    explicit: bool,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, explicit, writer).await,
        ConfigAction::Show { section } => {
            execute_show(config_path, explicit, section, writer).await
        }
    }
}

/// Load and validate the configuration, reporting the result.
///
/// # Errors
///
/// Returns `CliError::Config` (exit code 2) when the configuration is invalid.
async fn execute_validate(
    config_path: &Path,
    explicit: bool,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let errors = match load_effective(config_path, explicit).await {
        Ok(_) => Vec::new(),
        Err(e) => vec![e.to_string()],
    };
    let report = ConfigValidationReport {
        source: source_label(config_path, explicit),
        valid: errors.is_empty(),
        errors,
    };
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

/// Show the effective configuration, whole or one section, as TOML.
async fn execute_show(
    config_path: &Path,
    explicit: bool,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_effective(config_path, explicit).await?;
    let config_toml = match section.as_deref() {
        None => to_toml(&config)?,
        Some("general") => to_toml(&config.general)?,
        Some("thresholds") => to_toml(&config.thresholds)?,
        Some("rules") => to_toml(&config.rules)?,
        Some("correlation") => to_toml(&config.correlation)?,
        Some("limits") => to_toml(&config.limits)?,
        Some("paths") => to_toml(&config.paths)?,
        Some("live") => to_toml(&config.live)?,
        Some("metrics") => to_toml(&config.metrics)?,
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected one of: {})",
                other,
                SECTIONS.join(", ")
            )));
        }
    };

    writer.render(&ConfigReport {
        source: source_label(config_path, explicit),
        section,
        config: toml::from_str(&config_toml)
            .map_err(|e| CliError::Command(format!("config round-trip failed: {e}")))?,
        config_toml,
    })?;
    Ok(())
}

fn to_toml<T: Serialize>(value: &T) -> Result<String, CliError> {
    toml::to_string_pretty(value)
        .map_err(|e| CliError::Command(format!("failed to serialize config: {e}")))
}

/// Effective configuration display.
///
/// JSON output carries the structured `config`; text output prints the TOML.
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path, or `built-in defaults`
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub config: toml::Table,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.section {
            Some(section) => writeln!(
                w,
                "Configuration {} (source: {})",
                format!("[{section}]").bold(),
                self.source
            )?,
            None => writeln!(w, "Configuration (source: {})", self.source.bold())?,
        }
        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;
        Ok(())
    }
}

/// Configuration validation result.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Empty when valid
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}
