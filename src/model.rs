use std::path::PathBuf;

use eframe::egui::ColorImage;
use serde::Deserialize;

/// One entry of the `formats` array reported by yt-dlp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FormatDescriptor {
    /// Identifier passed back to yt-dlp when selecting this stream
    pub format_id: String,
    /// Vertical resolution in pixels, absent for audio-only streams
    pub height: Option<u32>,
    /// Human-readable quality note (e.g. "720p", "HD")
    pub format_note: Option<String>,
    /// Container extension
    pub ext: String,
    /// Video codec, "none" for audio-only streams
    pub vcodec: Option<String>,
}

impl FormatDescriptor {
    /// Text shown on the quality button.
    pub fn label(&self) -> String {
        let height = self
            .height
            .map(|h| h.to_string())
            .unwrap_or_else(|| "?".to_string());
        let note = self.format_note.as_deref().unwrap_or("N/A");
        format!("{}p - {}", height, note)
    }
}

/// Metadata returned by a probe, before any download.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProbeInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub formats: Vec<FormatDescriptor>,
}

/// What the extractor needs to perform a download.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// yt-dlp format selector, e.g. `137+bestaudio`
    pub format_selector: String,
    /// Folder the merged file is written to
    pub output_dir: PathBuf,
}

/// Final metadata reported by the extractor once the output file is in place.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchOutcome {
    #[serde(default)]
    pub id: Option<String>,
    /// Extractor name, e.g. "Youtube"; ids are only unique per extractor
    #[serde(default)]
    pub extractor_key: Option<String>,
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub filepath: PathBuf,
}

impl FetchOutcome {
    /// Identifier of the downloaded video, qualified by its extractor when known.
    pub fn video_id(&self) -> Option<String> {
        let id = self.id.as_deref().filter(|id| !id.is_empty())?;
        Some(match self.extractor_key.as_deref() {
            Some(key) if !key.is_empty() => format!("{}-{}", key.to_lowercase(), id),
            _ => id.to_string(),
        })
    }
}

/// A single progress report from a running download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        total_bytes_estimate: Option<u64>,
    },
    Finished,
}

/// A completed download kept in the session history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub url: String,
    pub title: String,
    /// Size of the output file in bytes
    pub filesize: u64,
    /// Cached thumbnail on disk, `None` when caching failed or no source was given
    pub thumbnail_path: Option<PathBuf>,
}

/// Messages posted by background work to the UI loop.
pub enum AppMessage {
    /// Probe succeeded; the list is already filtered and may be empty
    FormatsReady(Vec<FormatDescriptor>),
    FetchFailed(String),
    /// Download progress in percent (0-100)
    Progress(f32),
    DownloadFinished(HistoryRecord),
    DownloadFailed(String),
    /// A cached thumbnail decoded for display
    ThumbnailLoaded { path: PathBuf, image: ColorImage },
}
