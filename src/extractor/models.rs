//! Data structures for video information

use serde::{Deserialize, Serialize};

/// Metadata returned by a probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub webpage_url: String,
    /// Seconds; some extractors report fractional durations
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub extractor: Option<String>,
    #[serde(default)]
    pub formats: Vec<Format>,
}

/// Video format information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Format {
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub format_note: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub fps: Option<f32>,
    #[serde(default)]
    pub tbr: Option<f32>, // Total bitrate
}

impl Format {
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref().is_some_and(|c| c != "none")
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref().is_some_and(|c| c != "none")
    }
}

/// Most entries listed by a playlist or channel analysis
pub const PLAYLIST_LIMIT: usize = 50;

/// Flat listing of a playlist, a channel, or a single video
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub id: String,
    pub title: String,
    pub uploader: Option<String>,
    pub webpage_url: String,
    /// False when the URL pointed at a single video
    pub is_playlist: bool,
    pub entries: Vec<PlaylistEntry>,
}

/// One downloadable item of a [`PlaylistInfo`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub id: String,
    pub title: String,
    pub url: String,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
}

// Shape of `yt-dlp --flat-playlist --dump-single-json`
#[derive(Deserialize)]
struct FlatListing {
    #[serde(rename = "_type", default)]
    kind: Option<String>,
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    webpage_url: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    entries: Option<Vec<Option<FlatEntry>>>,
}

#[derive(Deserialize)]
struct FlatEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    channel: Option<String>,
}

impl PlaylistInfo {
    /// Listing with the probed video as its only entry
    pub fn single(info: &VideoInfo, requested_url: &str) -> Self {
        let url = if info.webpage_url.is_empty() {
            requested_url.to_string()
        } else {
            info.webpage_url.clone()
        };
        Self {
            id: info.id.clone(),
            title: info.title.clone(),
            uploader: info.uploader.clone(),
            webpage_url: url.clone(),
            is_playlist: false,
            entries: vec![PlaylistEntry {
                id: info.id.clone(),
                title: info.title.clone(),
                url,
                duration: info.duration,
                uploader: info.uploader.clone(),
            }],
        }
    }

    /// Parse a flat yt-dlp dump. Missing entries are skipped, untitled ones
    /// get a positional name, and at most [`PLAYLIST_LIMIT`] are kept.
    pub fn from_flat_json(json: &str, requested_url: &str) -> Result<Self, serde_json::Error> {
        let listing: FlatListing = serde_json::from_str(json)?;
        let uploader = listing.uploader.or(listing.channel);
        let webpage_url = if listing.webpage_url.is_empty() {
            requested_url.to_string()
        } else {
            listing.webpage_url
        };

        let entries = match listing.entries {
            Some(entries) if listing.kind.as_deref() != Some("video") => entries,
            _ => {
                let entry = PlaylistEntry {
                    id: listing.id.clone(),
                    title: listing.title.clone(),
                    url: webpage_url.clone(),
                    duration: listing.duration,
                    uploader: uploader.clone(),
                };
                return Ok(Self {
                    id: listing.id,
                    title: listing.title,
                    uploader,
                    webpage_url,
                    is_playlist: false,
                    entries: vec![entry],
                });
            }
        };

        let entries = entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let entry = entry?;
                let url = entry.url.or(entry.webpage_url).filter(|u| !u.is_empty())?;
                Some(PlaylistEntry {
                    title: entry
                        .title
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| format!("Video {}", index + 1)),
                    id: entry.id,
                    url,
                    duration: entry.duration,
                    uploader: entry.uploader.or(entry.channel).or_else(|| uploader.clone()),
                })
            })
            .take(PLAYLIST_LIMIT)
            .collect();

        Ok(Self {
            id: listing.id,
            title: listing.title,
            uploader,
            webpage_url,
            is_playlist: true,
            entries,
        })
    }
}
