//! Translation of [`JobOptions`] into yt-dlp command line arguments

use crate::queue::JobOptions;
use crate::utils::config::{VideoFormat, VideoQuality};
use std::path::PathBuf;

/// Marker printed by yt-dlp after the final move so the path can be picked out of stdout
pub const FILEPATH_MARKER: &str = "__videodownloader_filepath__ ";

/// Flags for a metadata-only run
const METADATA_ONLY_FLAGS: &[&str] = &[
    "--skip-download",
    "--no-simulate",
    "--write-info-json",
    "--write-subs",
    "--write-auto-subs",
    "--write-thumbnail",
    "--write-description",
];

/// What the extractor is asked to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub options: JobOptions,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, options: JobOptions) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }
}

/// yt-dlp `-f` selector for the given options
pub fn format_selector(options: &JobOptions) -> String {
    if let Some(format_id) = &options.format_id {
        return format_id.clone();
    }

    if options.audio_only {
        return match options.format {
            VideoFormat::Mp4 => "ba[ext=m4a]/ba",
            VideoFormat::Webm => "ba[ext=webm]/ba",
            _ => "ba/b",
        }
        .to_string();
    }

    match (options.quality, options.quality.max_height()) {
        (VideoQuality::Best, _) => match options.format {
            VideoFormat::Mp4 => {
                "bv*[ext=mp4][height<=1080]+ba[ext=m4a]/bv*[height<=1080]+ba/b[height<=1080]"
            }
            VideoFormat::Webm => "bv*[ext=webm]+ba[ext=webm]/bv*+ba",
            VideoFormat::Mkv => "bv*+ba/b",
            VideoFormat::Any => "bv*[ext=mp4]+ba[ext=m4a]/bv*+ba/b",
        }
        .to_string(),
        (VideoQuality::Worst, _) => "wv*+wa/w".to_string(),
        (_, Some(h)) => match options.format {
            VideoFormat::Mp4 => {
                format!("bv*[height<={h}][ext=mp4]+ba[ext=m4a]/bv*[height<={h}]+ba")
            }
            VideoFormat::Webm => {
                format!("bv*[height<={h}][ext=webm]+ba[ext=webm]/bv*[height<={h}]+ba")
            }
            VideoFormat::Mkv | VideoFormat::Any => format!("bv*[height<={h}]+ba"),
        },
        (_, None) => "b".to_string(),
    }
}

/// Container passed to `--merge-output-format`, if any
pub fn merge_output_format(options: &JobOptions) -> Option<&'static str> {
    if options.audio_only || options.metadata_only || options.format_id.is_some() {
        return None;
    }
    match (options.quality, options.format) {
        (VideoQuality::Worst, _) => None,
        (VideoQuality::Best, VideoFormat::Any) => Some("mp4"),
        (_, VideoFormat::Any) => None,
        (_, format) => Some(format.as_str()),
    }
}

/// `-o` output template
pub fn output_template(options: &JobOptions) -> String {
    let template = if options.organize_in_folders {
        options
            .output_dir
            .join("%(playlist_title,uploader)s")
            .join("%(title)s.%(ext)s")
    } else {
        options.output_dir.join("%(title)s.%(ext)s")
    };
    template.to_string_lossy().into_owned()
}

/// Full argument list for a download run, URL last
///
/// Multi-entry playlist runs print one marker per finished file.
pub fn download_args(request: &FetchRequest) -> Vec<String> {
    let options = &request.options;
    let mut args: Vec<String> = vec![
        "--newline".into(),
        "--progress".into(),
        "--no-warnings".into(),
    ];
    args.push(if options.whole_playlist { "--yes-playlist" } else { "--no-playlist" }.into());
    args.push("-f".into());
    args.push(format_selector(options));
    args.push("-o".into());
    args.push(output_template(options));
    args.push("--print".into());

    if options.metadata_only {
        // nothing is moved when the media is skipped
        args.push(format!("video:{}%(filename)s", FILEPATH_MARKER));
        args.extend(METADATA_ONLY_FLAGS.iter().map(|flag| flag.to_string()));
    } else {
        args.push(format!("after_move:{}%(filepath)s", FILEPATH_MARKER));
        if let Some(container) = merge_output_format(options) {
            args.push("--merge-output-format".into());
            args.push(container.into());
        }
        if options.save_metadata {
            args.push("--write-info-json".into());
        }
        if options.include_subtitles {
            args.push("--write-subs".into());
            args.push("--sub-langs".into());
            args.push("en".into());
        }
    }

    args.push("--".into());
    args.push(request.url.clone());
    args
}

/// Path a job reports for the file named by a marker line
pub fn result_path(options: &JobOptions, reported: &str) -> PathBuf {
    let path = PathBuf::from(reported.trim_end());
    if options.metadata_only {
        path.with_extension("info.json")
    } else {
        path
    }
}
