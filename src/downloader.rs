use std::{
    ffi::OsString,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rust_embed::RustEmbed;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::Command,
};

use crate::{
    model::{FetchOutcome, FetchRequest, ProbeInfo},
    progress::{parse_progress_line, progress_template, ProgressRelay},
};

#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

/// Printed by yt-dlp once the merged file has been moved into place.
const OUTCOME_TEMPLATE: &str =
    "after_move:%(.{id,extractor_key,title,thumbnail,filepath})j";

/// File name template; the folder goes through `-P` so it is never parsed
/// as template syntax.
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// The extraction/download capability the app drives.
#[async_trait]
pub trait Extractor: Send + Sync + 'static {
    /// Lists the formats and metadata of a video without downloading it.
    async fn probe(&self, url: &str) -> Result<ProbeInfo>;

    /// Downloads and merges the requested streams, relaying progress as it goes.
    async fn fetch(&self, request: &FetchRequest, relay: &ProgressRelay) -> Result<FetchOutcome>;
}

/// Selector pairing the chosen video stream with the best audio stream.
pub fn format_selector(format_id: &str) -> String {
    format!("{}+bestaudio", format_id)
}

/// Command line for a download of `request`.
pub fn fetch_args(request: &FetchRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-f",
        request.format_selector.as_str(),
        "--merge-output-format",
        "mp4",
        "--no-playlist",
        "--newline",
        "--no-warnings",
        // --print implies --quiet, which would hide progress otherwise.
        "--progress",
        "--progress-template",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(progress_template().into());
    args.push("--print".into());
    args.push(OUTCOME_TEMPLATE.into());
    args.push("-P".into());
    args.push(request.output_dir.clone().into_os_string());
    args.push("-o".into());
    args.push(OUTPUT_TEMPLATE.into());
    args.push(request.url.as_str().into());
    args
}

// Stderr is decoded lossily; Windows consoles often emit non-UTF-8 text.
fn exit_error(status: ExitStatus, stderr: &[u8]) -> anyhow::Error {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        anyhow!("yt-dlp exited with {}", status)
    } else {
        anyhow!("{}", stderr)
    }
}

/// [`Extractor`] backed by the yt-dlp command line tool.
pub struct YtDlp {
    bin: PathBuf,
}

impl YtDlp {
    pub fn new(bin: PathBuf) -> Self {
        Self { bin }
    }

    /// Uses `configured` when given, then a binary bundled under `assets/`,
    /// then whatever `yt-dlp` resolves to on `PATH`.
    pub fn locate(configured: Option<PathBuf>) -> Result<Self> {
        if let Some(bin) = configured {
            return Ok(Self::new(bin));
        }
        let name = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };
        match Asset::get(name) {
            Some(data) => Ok(Self::new(extract_bundled(name, &data.data)?)),
            None => Ok(Self::new(PathBuf::from(name))),
        }
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }
}

fn extract_bundled(name: &str, data: &[u8]) -> Result<PathBuf> {
    let tmp = std::env::temp_dir().join(name);
    if !tmp.exists() {
        let mut f = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755))?;
        }
    }
    tracing::debug!(path = %tmp.display(), "using bundled yt-dlp");
    Ok(tmp)
}

#[async_trait]
impl Extractor for YtDlp {
    async fn probe(&self, url: &str) -> Result<ProbeInfo> {
        let output = Command::new(&self.bin)
            // A single document even when the URL resolves to a playlist.
            .args(["--dump-single-json", "--no-playlist", "--no-warnings", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.bin.display()))?;

        if !output.status.success() {
            return Err(exit_error(output.status, &output.stderr));
        }

        serde_json::from_slice(&output.stdout).context("yt-dlp returned invalid JSON")
    }

    async fn fetch(&self, request: &FetchRequest, relay: &ProgressRelay) -> Result<FetchOutcome> {
        let mut child = Command::new(&self.bin)
            .args(fetch_args(request))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start {}", self.bin.display()))?;

        let out = child.stdout.take().ok_or_else(|| anyhow!("yt-dlp stdout not captured"))?;
        let mut err = child.stderr.take().ok_or_else(|| anyhow!("yt-dlp stderr not captured"))?;

        // Drain stderr alongside stdout so a chatty child never blocks.
        let stderr_reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(e) = err.read_to_end(&mut buf).await {
                tracing::debug!("reading yt-dlp stderr: {}", e);
            }
            buf
        });

        let mut outcome = None;
        let mut lines = BufReader::new(out).lines();
        let read = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            tracing::trace!("yt-dlp> {}", line);
            if let Some(event) = parse_progress_line(&line) {
                relay.relay(event);
            } else if line.starts_with('{') {
                match serde_json::from_str::<FetchOutcome>(&line) {
                    Ok(parsed) => outcome = Some(parsed),
                    Err(e) => tracing::debug!("unrecognised JSON line from yt-dlp: {}", e),
                }
            }
        };

        // Reap the child even when stdout broke off.
        if read.is_err() {
            let _ = child.start_kill();
        }
        let status = child.wait().await.context("waiting for yt-dlp")?;
        let stderr = stderr_reader.await.unwrap_or_default();
        read.context("reading yt-dlp output")?;

        if !status.success() {
            return Err(exit_error(status, &stderr));
        }

        outcome.ok_or_else(|| anyhow!("yt-dlp did not report an output file"))
    }
}
