//! Command line surface

use crate::extractor::{Extractor, Format, VideoInfo};
use crate::queue::{JobEvent, JobOptions, JobRunner, JobStatus, OptionOverrides};
use crate::utils::config::{AppSettings, SettingsStore, VideoFormat, VideoQuality};
use crate::utils::error::DownloadError;
use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest description printed by `info`
pub const DESCRIPTION_LIMIT: usize = 500;

const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "videodownloader", version, about = "Download videos through yt-dlp")]
pub struct Cli {
    /// Settings file to use instead of the per-user one
    #[arg(long = "settings", global = true, value_name = "PATH")]
    pub settings_file: Option<PathBuf>,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show metadata for a URL without downloading anything
    Info { url: String },
    /// List the entries of a playlist or channel without downloading
    Playlist { url: String },
    /// Download a single URL
    Download(DownloadArgs),
    /// Inspect or change the saved settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

impl Commands {
    /// Whether the command talks to the extraction tool
    pub fn needs_extractor(&self) -> bool {
        !matches!(self, Commands::Settings(_))
    }

    /// The media URL the command operates on, if any
    pub fn url(&self) -> Option<&str> {
        match self {
            Commands::Info { url } | Commands::Playlist { url } => Some(url.as_str()),
            Commands::Download(args) => Some(args.url.as_str()),
            Commands::Settings(_) => None,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    pub url: String,

    #[arg(long, value_enum)]
    pub quality: Option<VideoQuality>,

    #[arg(long, value_enum)]
    pub format: Option<VideoFormat>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub audio_only: bool,

    /// Also fetch English subtitles
    #[arg(long)]
    pub subtitles: bool,

    /// Exact format id as listed by `info`
    #[arg(long)]
    pub format_id: Option<String>,

    /// Save metadata, subtitles, thumbnail and description but not the media
    #[arg(long)]
    pub metadata_only: bool,

    /// Download every entry when the URL is a playlist
    #[arg(long)]
    pub playlist: bool,

    /// Print job events as JSON lines on stdout
    #[arg(long)]
    pub json: bool,
}

impl DownloadArgs {
    pub fn overrides(&self) -> OptionOverrides {
        OptionOverrides {
            output_dir: self.output.clone(),
            quality: self.quality,
            format: self.format,
            audio_only: self.audio_only.then_some(true),
            include_subtitles: self.subtitles.then_some(true),
            format_id: self.format_id.clone(),
            metadata_only: self.metadata_only.then_some(true),
            whole_playlist: self.playlist.then_some(true),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommand {
    /// Print the current settings
    Show,
    /// Change one setting and save
    Set { key: String, value: String },
    /// Restore and save the defaults
    Reset,
    /// Print the settings file location
    Path,
}

/// Output of the `info` command
#[derive(Debug, Clone, Serialize)]
pub struct InfoOutput {
    pub title: String,
    pub uploader: Option<String>,
    pub duration: Option<f64>,
    pub view_count: Option<u64>,
    pub url: String,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub formats: Vec<FormatSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatSummary {
    pub format_id: String,
    pub ext: String,
    pub resolution: Option<String>,
    pub filesize: Option<u64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub note: Option<String>,
}

impl From<&Format> for FormatSummary {
    fn from(format: &Format) -> Self {
        Self {
            format_id: format.format_id.clone(),
            ext: format.ext.clone(),
            resolution: format.resolution.clone(),
            filesize: format.filesize,
            vcodec: format.vcodec.clone(),
            acodec: format.acodec.clone(),
            note: format.format_note.clone(),
        }
    }
}

impl InfoOutput {
    pub fn from_info(info: &VideoInfo, requested_url: &str) -> Self {
        let url = if info.webpage_url.is_empty() {
            requested_url.to_string()
        } else {
            info.webpage_url.clone()
        };
        Self {
            title: info.title.clone(),
            uploader: info.uploader.clone(),
            duration: info.duration,
            view_count: info.view_count,
            url,
            thumbnail: info.thumbnail.clone(),
            description: info
                .description
                .as_deref()
                .map(|d| d.chars().take(DESCRIPTION_LIMIT).collect()),
            formats: info.formats.iter().map(FormatSummary::from).collect(),
        }
    }
}

/// Run a parsed command line and return the process exit code.
///
/// `make_extractor` is only called for commands that need one; `interrupt`
/// resolving cancels a running download.
pub async fn run<F, I>(
    cli: Cli,
    make_extractor: F,
    interrupt: I,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> i32
where
    F: FnOnce() -> Result<Arc<dyn Extractor>, DownloadError>,
    I: Future<Output = ()>,
{
    let store = match &cli.settings_file {
        Some(path) => SettingsStore::new(path.clone()),
        None => SettingsStore::default_location(),
    };

    // a bad URL is reported before any tool lookup
    if let Some(Err(e)) = cli.command.url().map(crate::queue::validate_url) {
        return report_error(err, &e);
    }

    let extractor = if cli.command.needs_extractor() {
        match make_extractor() {
            Ok(extractor) => Some(extractor),
            Err(e) => return report_error(err, &e),
        }
    } else {
        None
    };

    let result = match (cli.command, extractor) {
        (Commands::Info { url }, Some(extractor)) => {
            run_info(extractor.as_ref(), &url, out, err).await
        }
        (Commands::Playlist { url }, Some(extractor)) => {
            run_playlist(extractor.as_ref(), &url, out, err).await
        }
        (Commands::Download(args), Some(extractor)) => {
            let settings = store.load();
            run_download(extractor, &settings, &args, interrupt, out, err).await
        }
        (Commands::Settings(command), _) => run_settings(&store, &command, out, err),
        (_, None) => Ok(report_error(
            err,
            &DownloadError::AdapterFailure("no extractor available".to_string()),
        )),
    };

    result.unwrap_or_else(|e| {
        let _ = writeln!(err, "Error: {:#}", e);
        1
    })
}

fn report_error(err: &mut dyn Write, error: &DownloadError) -> i32 {
    let _ = writeln!(err, "Error: {}", error);
    error.exit_code()
}

/// `info <url>`
pub async fn run_info(
    extractor: &dyn Extractor,
    url: &str,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<i32> {
    let url = match crate::queue::validate_url(url) {
        Ok(url) => url,
        Err(e) => return Ok(report_error(err, &e)),
    };

    debug!("Probing {} with {}", url, extractor.id());
    match extractor.probe(&url).await {
        Ok(info) => {
            let output = InfoOutput::from_info(&info, &url);
            writeln!(out, "{}", serde_json::to_string_pretty(&output)?)?;
            Ok(0)
        }
        Err(e) => Ok(report_error(err, &e)),
    }
}

/// `playlist <url>`
pub async fn run_playlist(
    extractor: &dyn Extractor,
    url: &str,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<i32> {
    let url = match crate::queue::validate_url(url) {
        Ok(url) => url,
        Err(e) => return Ok(report_error(err, &e)),
    };

    debug!("Listing {} with {}", url, extractor.id());
    match extractor.probe_playlist(&url).await {
        Ok(listing) => {
            writeln!(out, "{}", serde_json::to_string_pretty(&listing)?)?;
            Ok(0)
        }
        Err(e) => Ok(report_error(err, &e)),
    }
}

/// `download <url>`: run one job to completion
pub async fn run_download<I>(
    extractor: Arc<dyn Extractor>,
    settings: &AppSettings,
    args: &DownloadArgs,
    interrupt: I,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<i32>
where
    I: Future<Output = ()>,
{
    let options = JobOptions::resolve(settings, &args.overrides());
    let runner = JobRunner::new(1, extractor);
    let mut events = runner.subscribe().await;

    let handle = match runner.submit(&args.url, options).await {
        Ok(handle) => handle,
        Err(e) => return Ok(report_error(err, &e)),
    };
    let id = handle.id();

    let wait = handle.wait();
    tokio::pin!(wait);
    tokio::pin!(interrupt);
    let mut interrupted = false;
    let mut finished_seen = false;

    let job = loop {
        tokio::select! {
            job = &mut wait => break job,
            Some(event) = events.recv() => {
                finished_seen |= matches!(event, JobEvent::Finished { .. });
                report_event(&event, args.json, out, err)?;
            }
            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                info!("Interrupted, cancelling job {}", id);
                runner.cancel(id).await?;
            }
        }
    };

    // the terminal event may still be in flight when the handle resolves
    let deadline = tokio::time::Instant::now() + EVENT_DRAIN_TIMEOUT;
    while !finished_seen {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(event)) => {
                finished_seen = matches!(event, JobEvent::Finished { .. });
                report_event(&event, args.json, out, err)?;
            }
            Ok(None) | Err(_) => {
                warn!("Finished event for job {} was not delivered", id);
                break;
            }
        }
    }

    match (job.status, job.result_path, job.error) {
        (JobStatus::Completed, Some(path), _) => {
            if !args.json {
                writeln!(out, "{}", path.display())?;
            }
            Ok(0)
        }
        (JobStatus::Cancelled, _, _) => Ok(report_error(err, &DownloadError::Cancelled)),
        (_, _, Some(error)) => Ok(report_error(err, &error)),
        (status, _, None) => Ok(report_error(
            err,
            &DownloadError::AdapterFailure(format!("job ended as {} without a result", status)),
        )),
    }
}

fn report_event(
    event: &JobEvent,
    json: bool,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string(event)?)?;
        return Ok(());
    }

    match event {
        JobEvent::Queued { url, .. } => writeln!(err, "Queued {}", url)?,
        JobEvent::Started { .. } => writeln!(err, "Downloading...")?,
        JobEvent::Progress {
            percent, speed, eta, ..
        } => {
            let mut line = format!("{:5.1}%", percent);
            if let Some(speed) = speed {
                line.push_str(&format!("  {}/s", format_bytes(*speed)));
            }
            if let Some(eta) = eta {
                line.push_str(&format!("  ETA {}s", eta));
            }
            writeln!(err, "{}", line)?;
        }
        JobEvent::Finished { status, .. } => writeln!(err, "{}", status)?,
    }
    Ok(())
}

fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// `settings show|set|reset|path`
pub fn run_settings(
    store: &SettingsStore,
    command: &SettingsCommand,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<i32> {
    match command {
        SettingsCommand::Show => {
            let settings = store.load();
            writeln!(out, "{}", serde_json::to_string_pretty(&settings)?)?;
        }
        SettingsCommand::Set { key, value } => {
            let mut settings = store.load();
            if let Err(e) = settings.set_field(key, value) {
                return Ok(report_error(err, &e));
            }
            let settings = settings.normalized();
            store.save(&settings)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&settings)?)?;
        }
        SettingsCommand::Reset => {
            let settings = AppSettings::default();
            store.save(&settings)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&settings)?)?;
        }
        SettingsCommand::Path => {
            writeln!(out, "{}", store.path().display())?;
        }
    }
    Ok(0)
}
