//! Command implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use appvault_protocol::{Platform, UploadMetadata};
use appvault_transfer::{ChunkProgress, ProgressReporter};
use appvault_uploader::{
    HttpTransport, RetryingTransport, UploadOrchestrator, UploadRegistry, UploadReport,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{self, Config};

/// Arguments of `appvault upload`.
#[derive(Debug, Clone)]
pub struct UploadArgs {
    pub file: PathBuf,
    pub app: String,
    pub version: String,
    pub version_code: u32,
    pub platform: Option<Platform>,
    pub mandatory: bool,
    pub changelog: Vec<String>,
}

impl UploadArgs {
    /// Builds upload metadata, inferring the platform from the extension
    /// when `--platform` was not given.
    pub fn metadata(&self) -> anyhow::Result<UploadMetadata> {
        let platform = match self.platform {
            Some(p) => p,
            None => {
                let name = file_name(&self.file);
                Platform::from_file_name(&name).with_context(|| {
                    format!("cannot infer platform from {name:?}; pass --platform")
                })?
            }
        };
        Ok(UploadMetadata {
            app_identifier: self.app.clone(),
            version: self.version.clone(),
            version_code: self.version_code,
            platform,
            is_mandatory: self.mandatory,
            changelog: self.changelog.clone(),
        })
    }
}

pub async fn upload(config: &Config, args: UploadArgs) -> anyhow::Result<()> {
    let metadata = args.metadata()?;
    let transport = HttpTransport::with_timeout(
        &config.server_url,
        &config.api_key,
        config.request_timeout(),
    )?;
    let transport = RetryingTransport::new(transport, config.retry_policy());
    let orchestrator = UploadOrchestrator::new(Arc::new(transport), UploadRegistry::new())
        .with_options(config.upload_options());

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling upload");
            cancel.cancel();
        }
    });

    let bar = make_progress_bar(&file_name(&args.file));
    let reporter = BarReporter { bar: bar.clone() };

    match orchestrator
        .upload_with_report(&args.file, metadata, reporter)
        .await
    {
        Ok(report) => {
            bar.finish_with_message("committed");
            print_summary(&report);
            Ok(())
        }
        Err(e) => {
            bar.abandon_with_message("failed");
            let phase = e.phase();
            Err(anyhow::Error::new(e).context(format!("upload failed during {phase}")))
        }
    }
}

pub async fn health(config: &Config) -> anyhow::Result<()> {
    let transport = HttpTransport::with_timeout(
        &config.server_url,
        &config.api_key,
        config.request_timeout(),
    )?;
    let health = transport
        .health()
        .await
        .with_context(|| format!("health check against {}", transport.base_url()))?;

    println!("{}: {}", transport.base_url(), health.status);
    for (key, value) in &health.extra {
        println!("  {key}: {value}");
    }
    Ok(())
}

pub fn show_config(config: &Config, path: Option<&Path>) -> anyhow::Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config::config_path()?,
    };
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&config.redacted())?);
    Ok(())
}

/// Feeds chunk acknowledgments into a terminal progress bar.
struct BarReporter {
    bar: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn on_chunk(&self, progress: &ChunkProgress) {
        self.bar.set_length(progress.total_bytes);
        self.bar.set_position(progress.bytes_transferred);
        self.bar.set_message(format!(
            "chunk {}/{} {}/s",
            progress.chunk_index + 1,
            progress.total_chunks,
            fmt_bytes(progress.bytes_per_second as u64)
        ));
    }
}

fn make_progress_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
    )
    .map(|s| s.progress_chars("=>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_summary(report: &UploadReport) {
    let artifact = &report.artifact;
    println!(
        "Uploaded {} ({}) in {:.1}s, {}/s",
        report.file_name,
        fmt_bytes(artifact.final_size),
        report.elapsed.as_secs_f64(),
        fmt_bytes(report.average_speed() as u64)
    );
    println!("  version:  {} ({})", artifact.version, artifact.platform);
    println!("  session:  {}", report.session_id);
    println!("  sha256:   {}", report.local_hash);
    if let Some(url) = &artifact.download_url {
        println!("  download: {url}");
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Human-readable byte count.
fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
