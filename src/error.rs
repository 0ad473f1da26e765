use thiserror::Error;

/// Terminal failures surfaced to the user.
#[derive(Debug, Error)]
pub enum AppError {
    /// Probing the URL failed: bad URL, network error, unsupported site.
    #[error("Failed to fetch formats:\n{0}")]
    FetchFailure(String),
    /// The chosen format could not be downloaded or merged.
    #[error("Download failed:\n{0}")]
    DownloadFailure(String),
}

impl AppError {
    pub fn fetch(err: anyhow::Error) -> Self {
        Self::FetchFailure(format!("{:#}", err))
    }

    pub fn download(err: anyhow::Error) -> Self {
        Self::DownloadFailure(format!("{:#}", err))
    }
}
