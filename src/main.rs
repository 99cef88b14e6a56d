//! videodownloader - download videos through yt-dlp from the command line

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use videodownloader::cli::{self, Cli};
use videodownloader::extractor::{Extractor, YtDlpExtractor};
use videodownloader::utils::DownloadError;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    // Initialize logging; RUST_LOG takes precedence over -v
    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // no signal handler; never interrupt
            std::future::pending::<()>().await;
        }
    };

    let extractor = if args.command.needs_extractor() {
        match YtDlpExtractor::new() {
            Ok(extractor) => {
                let tools = extractor.check_tools().await;
                info!(
                    "yt-dlp {} at {}, ffmpeg: {:?}",
                    tools.ytdlp_version.as_deref().unwrap_or("(unknown version)"),
                    tools.ytdlp_path.display(),
                    tools.ffmpeg_path
                );
                Ok(Arc::new(extractor) as Arc<dyn Extractor>)
            }
            Err(e) => Err(e),
        }
    } else {
        Err(DownloadError::ExternalToolMissing {
            tool: "yt-dlp".to_string(),
        })
    };

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let code = cli::run(
        args,
        move || extractor,
        interrupt,
        &mut stdout,
        &mut stderr,
    )
    .await;

    std::process::exit(code);
}
