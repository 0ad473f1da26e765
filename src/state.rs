use std::path::PathBuf;

use crate::{
    history::HistoryStore,
    model::{AppMessage, FormatDescriptor},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

/// A message box waiting to be dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub body: String,
}

impl Notice {
    fn new(kind: NoticeKind, title: &str, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.to_string(),
            body: body.into(),
        }
    }
}

/// Everything the window shows. Mutated only on the UI thread.
pub struct AppState {
    pub download_folder: PathBuf,
    pub url_input: String,
    /// URL the current format list belongs to
    pub source_url: String,
    pub formats: Vec<FormatDescriptor>,
    pub fetching: bool,
    pub downloading: bool,
    /// Download progress in percent; `None` hides the bar
    pub progress: Option<f32>,
    pub notice: Option<Notice>,
    pub history: HistoryStore,
}

impl AppState {
    pub fn new(download_folder: PathBuf, history: HistoryStore) -> Self {
        Self {
            download_folder,
            url_input: String::new(),
            source_url: String::new(),
            formats: Vec::new(),
            fetching: false,
            downloading: false,
            progress: None,
            notice: None,
            history,
        }
    }

    /// Inputs are locked while either background operation runs.
    pub fn controls_enabled(&self) -> bool {
        !self.fetching && !self.downloading
    }

    /// Validates the URL entry and locks the controls. Returns the URL to
    /// probe, or `None` when nothing should start.
    pub fn start_fetch(&mut self) -> Option<String> {
        if !self.controls_enabled() {
            return None;
        }
        let url = self.url_input.trim().to_string();
        if url.is_empty() {
            self.notice = Some(Notice::new(NoticeKind::Error, "Error", "Please enter a YouTube URL."));
            return None;
        }

        self.fetching = true;
        self.formats.clear();
        self.progress = None;
        self.source_url = url.clone();
        Some(url)
    }

    /// Locks the controls and shows an empty progress bar. Returns what the
    /// download needs, or `None` for an unknown index.
    pub fn start_download(&mut self, index: usize) -> Option<(String, FormatDescriptor, PathBuf)> {
        if !self.controls_enabled() {
            return None;
        }
        let format = self.formats.get(index)?.clone();
        self.downloading = true;
        self.progress = Some(0.0);
        Some((self.source_url.clone(), format, self.download_folder.clone()))
    }

    pub fn set_download_folder(&mut self, folder: PathBuf) {
        self.notice = Some(Notice::new(
            NoticeKind::Info,
            "Preferences",
            format!("Download folder set to:\n{}", folder.display()),
        ));
        self.download_folder = folder;
    }

    pub fn apply(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::FormatsReady(formats) => {
                self.fetching = false;
                if formats.is_empty() {
                    self.notice = Some(Notice::new(
                        NoticeKind::Info,
                        "No formats",
                        "No suitable mp4 formats found.",
                    ));
                }
                self.formats = formats;
            }
            AppMessage::FetchFailed(err) => {
                self.fetching = false;
                self.notice = Some(Notice::new(NoticeKind::Error, "Error", err));
            }
            AppMessage::Progress(pct) => {
                if self.downloading {
                    self.progress = Some(pct);
                }
            }
            AppMessage::DownloadFinished(record) => {
                tracing::info!(title = %record.title, "download complete");
                self.finish_download();
                self.notice = Some(Notice::new(NoticeKind::Success, "Success", "Download completed!"));
            }
            AppMessage::DownloadFailed(err) => {
                self.finish_download();
                self.notice = Some(Notice::new(NoticeKind::Error, "Error", err));
            }
            // Textures are the window's business.
            AppMessage::ThumbnailLoaded { .. } => {}
        }
    }

    fn finish_download(&mut self) {
        self.downloading = false;
        self.progress = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{history::ThumbnailFetcher, model::HistoryRecord};
    use anyhow::{anyhow, Result};
    use std::sync::Arc;

    struct Offline;

    impl ThumbnailFetcher for Offline {
        fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            Err(anyhow!("offline"))
        }
    }

    fn state() -> AppState {
        let history = HistoryStore::new(std::env::temp_dir().join("vidgrab-test"), Arc::new(Offline));
        AppState::new(PathBuf::from("/home/me"), history)
    }

    fn mp4(id: &str, height: u32) -> FormatDescriptor {
        FormatDescriptor {
            format_id: id.to_string(),
            height: Some(height),
            format_note: Some(format!("{}p", height)),
            ext: "mp4".to_string(),
            vcodec: Some("avc1".to_string()),
        }
    }

    #[test]
    fn empty_url_is_rejected() {
        let mut s = state();
        s.url_input = "   ".to_string();
        assert_eq!(s.start_fetch(), None);
        assert!(s.controls_enabled());
        assert_eq!(s.notice.as_ref().map(|n| n.kind), Some(NoticeKind::Error));
    }

    #[test]
    fn fetch_locks_controls_until_formats_arrive() {
        let mut s = state();
        s.url_input = " https://youtu.be/abc ".to_string();
        s.formats = vec![mp4("old", 144)];

        assert_eq!(s.start_fetch().as_deref(), Some("https://youtu.be/abc"));
        assert!(!s.controls_enabled());
        assert!(s.formats.is_empty());
        assert_eq!(s.start_fetch(), None);

        s.apply(AppMessage::FormatsReady(vec![mp4("22", 720)]));
        assert!(s.controls_enabled());
        assert_eq!(s.formats.len(), 1);
        assert_eq!(s.notice, None);
    }

    #[test]
    fn empty_format_list_is_informational() {
        let mut s = state();
        s.url_input = "https://youtu.be/abc".to_string();
        s.start_fetch();
        s.apply(AppMessage::FormatsReady(Vec::new()));

        let notice = s.notice.as_ref().unwrap();
        assert_eq!(notice.kind, NoticeKind::Info);
        assert_eq!(notice.body, "No suitable mp4 formats found.");
        assert!(s.controls_enabled());
    }

    #[test]
    fn fetch_failure_reenables_controls() {
        let mut s = state();
        s.url_input = "nope".to_string();
        s.start_fetch();
        s.apply(AppMessage::FetchFailed("Failed to fetch formats:\nboom".to_string()));

        assert!(s.controls_enabled());
        assert_eq!(s.notice.map(|n| n.kind), Some(NoticeKind::Error));
    }

    #[test]
    fn download_lifecycle() {
        let mut s = state();
        s.url_input = "https://youtu.be/abc".to_string();
        s.start_fetch();
        s.apply(AppMessage::FormatsReady(vec![mp4("22", 720), mp4("18", 360)]));

        assert_eq!(s.start_download(5), None);
        let (url, format, folder) = s.start_download(1).unwrap();
        assert_eq!(url, "https://youtu.be/abc");
        assert_eq!(format.format_id, "18");
        assert_eq!(folder, PathBuf::from("/home/me"));
        assert_eq!(s.progress, Some(0.0));
        assert!(!s.controls_enabled());

        s.apply(AppMessage::Progress(25.0));
        s.apply(AppMessage::Progress(10.0));
        assert_eq!(s.progress, Some(10.0));
        s.apply(AppMessage::Progress(100.0));
        assert_eq!(s.progress, Some(100.0));

        s.apply(AppMessage::DownloadFinished(HistoryRecord {
            url,
            title: "Clip".to_string(),
            filesize: 1,
            thumbnail_path: None,
        }));
        assert!(s.controls_enabled());
        assert_eq!(s.progress, None);
        assert_eq!(s.notice.as_ref().map(|n| n.kind), Some(NoticeKind::Success));
    }

    #[test]
    fn download_failure_restores_controls() {
        let mut s = state();
        s.formats = vec![mp4("22", 720)];
        s.start_download(0);
        s.apply(AppMessage::DownloadFailed("Download failed:\nHTTP 403".to_string()));

        assert!(s.controls_enabled());
        assert_eq!(s.progress, None);
        assert!(s.notice.unwrap().body.contains("HTTP 403"));
    }

    #[test]
    fn folder_change_is_announced() {
        let mut s = state();
        s.set_download_folder(PathBuf::from("/media/videos"));
        assert_eq!(s.download_folder, PathBuf::from("/media/videos"));
        assert!(s.notice.unwrap().body.contains("/media/videos"));
    }
}
