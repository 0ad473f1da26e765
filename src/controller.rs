use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use tokio::{runtime::Handle, sync::mpsc::UnboundedSender};

use crate::{
    downloader::{format_selector, Extractor},
    error::AppError,
    formats::filter_formats,
    history::HistoryStore,
    model::{AppMessage, FetchOutcome, FetchRequest, FormatDescriptor, HistoryRecord},
    progress::ProgressRelay,
};

/// Runs format fetches and downloads off the UI thread. Results come back
/// only as [`AppMessage`]s on `tx`.
pub struct Controller<E: Extractor> {
    runtime: Handle,
    extractor: Arc<E>,
    history: HistoryStore,
    tx: UnboundedSender<AppMessage>,
}

impl<E: Extractor> Controller<E> {
    pub fn new(
        runtime: Handle,
        extractor: E,
        history: HistoryStore,
        tx: UnboundedSender<AppMessage>,
    ) -> Self {
        Self {
            runtime,
            extractor: Arc::new(extractor),
            history,
            tx,
        }
    }

    pub fn begin_fetch(&self, url: String) {
        let extractor = Arc::clone(&self.extractor);
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            let msg = match fetch_formats(extractor.as_ref(), &url).await {
                Ok(formats) => AppMessage::FormatsReady(formats),
                Err(e) => AppMessage::FetchFailed(e.to_string()),
            };
            let _ = tx.send(msg);
        });
    }

    pub fn begin_download(&self, url: String, format: FormatDescriptor, folder: PathBuf) {
        let extractor = Arc::clone(&self.extractor);
        let history = self.history.clone();
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            let relay = ProgressRelay::new(tx.clone());
            let msg = match download(extractor.as_ref(), &history, &relay, url, &format, folder).await {
                Ok(record) => AppMessage::DownloadFinished(record),
                Err(e) => AppMessage::DownloadFailed(e.to_string()),
            };
            let _ = tx.send(msg);
        });
    }
}

async fn fetch_formats<E: Extractor>(extractor: &E, url: &str) -> Result<Vec<FormatDescriptor>, AppError> {
    tracing::info!(url, "fetching formats");
    let info = extractor.probe(url).await.map_err(|e| {
        tracing::error!(url, "probe failed: {:#}", e);
        AppError::fetch(e)
    })?;
    let formats = filter_formats(&info.formats);
    tracing::info!(
        url,
        id = info.id.as_deref().unwrap_or("?"),
        title = info.title.as_deref().unwrap_or("?"),
        total = info.formats.len(),
        usable = formats.len(),
        "formats fetched"
    );
    Ok(formats)
}

async fn download<E: Extractor>(
    extractor: &E,
    history: &HistoryStore,
    relay: &ProgressRelay,
    url: String,
    format: &FormatDescriptor,
    folder: PathBuf,
) -> Result<HistoryRecord, AppError> {
    let request = FetchRequest {
        url,
        format_selector: format_selector(&format.format_id),
        output_dir: folder,
    };
    tracing::info!(url = %request.url, selector = %request.format_selector, "download started");

    let (outcome, filesize) = fetch_to_disk(extractor, &request, relay).await.map_err(|e| {
        tracing::error!(url = %request.url, "download failed: {:#}", e);
        AppError::download(e)
    })?;

    // Thumbnail fetching uses a blocking HTTP client.
    let history = history.clone();
    let url = request.url;
    let record = tokio::task::spawn_blocking(move || {
        let video_id = outcome.video_id();
        history.record(
            &url,
            video_id.as_deref(),
            &outcome.title,
            filesize,
            outcome.thumbnail.as_deref(),
        )
    })
    .await
    .context("history task panicked")
    .map_err(AppError::download)?;

    Ok(record)
}

async fn fetch_to_disk<E: Extractor>(
    extractor: &E,
    request: &FetchRequest,
    relay: &ProgressRelay,
) -> Result<(FetchOutcome, u64)> {
    let outcome = extractor.fetch(request, relay).await?;
    let meta = tokio::fs::metadata(&outcome.filepath)
        .await
        .with_context(|| format!("reading size of {}", outcome.filepath.display()))?;
    Ok((outcome, meta.len()))
}
