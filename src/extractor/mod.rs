pub mod models;
pub mod options;
pub mod progress;
pub mod traits;
pub mod ytdlp;

pub use models::{Format, PlaylistEntry, PlaylistInfo, VideoInfo, PLAYLIST_LIMIT};
pub use options::FetchRequest;
pub use progress::FetchProgress;
pub use traits::Extractor;
pub use ytdlp::{ToolStatus, YtDlpExtractor};
