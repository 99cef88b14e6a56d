//! Progress reports emitted by an extractor while a transfer runs

use serde::{Deserialize, Serialize};

/// One progress report from the adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchProgress {
    /// 0.0 to 100.0
    pub percent: f64,
    /// bytes per second
    pub speed: Option<f64>,
    /// seconds remaining
    pub eta: Option<u64>,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
}

impl FetchProgress {
    pub fn new(percent: f64) -> Self {
        Self {
            percent: percent.clamp(0.0, 100.0),
            ..Default::default()
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_eta(mut self, eta: u64) -> Self {
        self.eta = Some(eta);
        self
    }

    /// Parse a yt-dlp `--newline` progress line such as
    /// `[download]  42.5% of ~ 150.00MiB at  5.20MiB/s ETA 00:15`
    pub fn parse_ytdlp_line(line: &str) -> Option<Self> {
        let rest = line.trim_start().strip_prefix("[download]")?;
        let mut tokens = rest.split_whitespace().peekable();

        let percent = tokens.next()?.strip_suffix('%')?.parse::<f64>().ok()?;
        let mut progress = FetchProgress::new(percent);

        while let Some(token) = tokens.next() {
            match token {
                "of" => {
                    let mut size = tokens.next();
                    if size == Some("~") {
                        size = tokens.next();
                    }
                    progress.total_bytes = size
                        .map(|s| s.trim_start_matches('~'))
                        .and_then(parse_size)
                        .map(|b| b as u64);
                }
                "at" => {
                    progress.speed = tokens
                        .next()
                        .and_then(|s| s.strip_suffix("/s"))
                        .and_then(parse_size);
                }
                "ETA" => {
                    progress.eta = tokens.next().and_then(parse_clock);
                }
                _ => {}
            }
        }

        if let Some(total) = progress.total_bytes {
            progress.downloaded_bytes = Some((progress.percent / 100.0 * total as f64) as u64);
        }

        Some(progress)
    }
}

/// Position in a multi-entry run, from `[download] Downloading item 3 of 10`.
/// Older yt-dlp releases say `video` instead of `item`.
pub fn parse_playlist_item(line: &str) -> Option<(u32, u32)> {
    let rest = line.trim_start().strip_prefix("[download]")?.trim_start();
    let rest = rest
        .strip_prefix("Downloading item ")
        .or_else(|| rest.strip_prefix("Downloading video "))?;
    let (item, count) = rest.split_once(" of ")?;
    let item = item.trim().parse::<u32>().ok()?;
    let count = count.trim().parse::<u32>().ok()?;
    (item >= 1 && item <= count).then_some((item, count))
}

impl FetchProgress {
    /// Rescale a per-entry report to the whole run of `count` entries
    pub fn within_playlist(mut self, item: u32, count: u32) -> Self {
        if count > 1 {
            let done = f64::from(item.saturating_sub(1)) * 100.0;
            self.percent = ((done + self.percent) / f64::from(count)).clamp(0.0, 100.0);
        }
        self
    }
}

/// `150.00MiB` -> bytes
fn parse_size(token: &str) -> Option<f64> {
    let split = token
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(token.len());
    if split == 0 {
        return None;
    }
    let number = token[..split].parse::<f64>().ok()?;
    let multiplier = match &token[split..] {
        "" | "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" | "kB" => 1_000.0,
        "MB" => 1_000_000.0,
        "GB" => 1_000_000_000.0,
        _ => return None,
    };
    Some(number * multiplier)
}

/// `00:15`, `01:02:03` -> seconds
fn parse_clock(token: &str) -> Option<u64> {
    let mut seconds = 0u64;
    let mut parts = 0;
    for part in token.split(':') {
        seconds = seconds * 60 + part.parse::<u64>().ok()?;
        parts += 1;
    }
    (parts <= 3).then_some(seconds)
}
