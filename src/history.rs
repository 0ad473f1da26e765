use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::{Context, Result};
use image::ImageFormat;

use crate::model::HistoryRecord;

const THUMBNAIL_EXT: &str = "jpg";

/// Source of thumbnail image bytes.
pub trait ThumbnailFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain blocking HTTP GET. Must not be called from inside an async task.
pub struct HttpThumbnailFetcher {
    client: reqwest::blocking::Client,
}

impl HttpThumbnailFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("building thumbnail HTTP client")?;
        Ok(Self { client })
    }
}

impl ThumbnailFetcher for HttpThumbnailFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("requesting {}", url))?
            .error_for_status()?;
        Ok(resp.bytes()?.to_vec())
    }
}

/// Append-only list of finished downloads plus the on-disk thumbnail cache.
/// Clones share the same list.
#[derive(Clone)]
pub struct HistoryStore {
    records: Arc<Mutex<Vec<HistoryRecord>>>,
    cache_dir: PathBuf,
    fetcher: Arc<dyn ThumbnailFetcher>,
}

impl HistoryStore {
    pub fn new(cache_dir: PathBuf, fetcher: Arc<dyn ThumbnailFetcher>) -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            cache_dir,
            fetcher,
        }
    }

    /// Stores a record for a finished download. Thumbnail caching is best
    /// effort: any failure leaves `thumbnail_path` empty. Blocks on network
    /// I/O when the thumbnail is not cached yet.
    ///
    /// The cache is keyed on `video_id` as reported by the extractor; the key
    /// is only guessed from `url` when no id is known.
    pub fn record(
        &self,
        url: &str,
        video_id: Option<&str>,
        title: &str,
        filesize: u64,
        thumbnail_source: Option<&str>,
    ) -> HistoryRecord {
        let thumbnail_path = thumbnail_source.and_then(|source| {
            let key = video_id.and_then(sanitize_key).or_else(|| video_key(url))?;
            match self.cache_thumbnail(&key, source) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(url, "thumbnail not cached: {:#}", e);
                    None
                }
            }
        });

        let record = HistoryRecord {
            url: url.to_string(),
            title: title.to_string(),
            filesize,
            thumbnail_path,
        };
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        tracing::info!(title, filesize, "added to history");
        record
    }

    /// Records in the order they were added.
    pub fn snapshot(&self) -> Vec<HistoryRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn cache_thumbnail(&self, key: &str, source: &str) -> Result<PathBuf> {
        let path = self.cache_dir.join(format!("{}.{}", key, THUMBNAIL_EXT));
        if path.exists() {
            return Ok(path);
        }

        fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("creating {}", self.cache_dir.display()))?;
        let bytes = self.fetcher.fetch(source)?;
        store_as_jpeg(&bytes, &path)?;
        Ok(path)
    }
}

// Sources come as jpg, webp or png; the cache keeps a single extension.
fn store_as_jpeg(bytes: &[u8], path: &Path) -> Result<()> {
    let img = image::load_from_memory(bytes).context("decoding thumbnail")?;
    image::DynamicImage::ImageRgb8(img.to_rgb8())
        .save_with_format(path, ImageFormat::Jpeg)
        .with_context(|| format!("writing {}", path.display()))
}

/// Stable cache key for a video URL: the YouTube video id when one can be
/// found, otherwise the last path segment.
pub fn video_key(url: &str) -> Option<String> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let (path, query) = match without_fragment.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (without_fragment, None),
    };

    let from_query = query.and_then(|q| {
        q.split('&')
            .find_map(|pair| pair.strip_prefix("v="))
            .map(str::to_string)
    });

    let from_path = || {
        let segments: Vec<&str> = path
            .split("://")
            .last()
            .unwrap_or(path)
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        // First segment is the host.
        let segments = segments.get(1..)?;
        match segments {
            [marker, id, ..] if matches!(*marker, "shorts" | "embed" | "live" | "v") => {
                Some(id.to_string())
            }
            [.., last] => Some(last.to_string()),
            [] => None,
        }
    };

    sanitize_key(&from_query.or_else(from_path)?)
}

// Keys become file names.
fn sanitize_key(raw: &str) -> Option<String> {
    let key: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (!key.is_empty()).then_some(key)
}

/// Human-readable size for the history panel.
pub fn format_size(bytes: u64) -> String {
    let mb = bytes as f64 / 1_048_576.0;
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else if mb >= 1.0 {
        format!("{:.1} MB", mb)
    } else {
        format!("{:.0} KB", bytes as f64 / 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::{io::Cursor, sync::atomic::{AtomicUsize, Ordering}};

    struct Failing;

    impl ThumbnailFetcher for Failing {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            Err(anyhow!("connection refused: {}", url))
        }
    }

    struct Png {
        calls: AtomicUsize,
    }

    impl ThumbnailFetcher for Png {
        fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([200, 10, 10, 255]));
            let mut buf = Vec::new();
            image::DynamicImage::ImageRgba8(img)
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
            Ok(buf)
        }
    }

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10";

    #[test]
    fn failed_thumbnail_still_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().to_path_buf(), Arc::new(Failing));

        let record = store.record(URL, None, "Song", 1234, Some("https://i.ytimg.com/x.jpg"));

        assert_eq!(record.thumbnail_path, None);
        assert_eq!(store.snapshot(), vec![record]);
    }

    #[test]
    fn thumbnail_is_cached_once_per_video() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(Png { calls: AtomicUsize::new(0) });
        let store = HistoryStore::new(dir.path().join("thumbs"), fetcher.clone());

        let first = store.record(URL, None, "Song", 10, Some("https://i.ytimg.com/x.webp"));
        let second = store.record(URL, None, "Song again", 20, Some("https://i.ytimg.com/x.webp"));

        let expected = dir.path().join("thumbs").join("dQw4w9WgXcQ.jpg");
        assert_eq!(first.thumbnail_path.as_deref(), Some(expected.as_path()));
        assert_eq!(second.thumbnail_path, first.thumbnail_path);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(image::open(&expected).is_ok());
    }

    #[test]
    fn reported_ids_keep_thumbnails_apart() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(Png { calls: AtomicUsize::new(0) });
        let store = HistoryStore::new(dir.path().to_path_buf(), fetcher.clone());

        // Both URLs end in the same path segment.
        let first = store.record(
            "https://media.example.org/play?id=1001",
            Some("generic-1001"),
            "First",
            10,
            Some("https://media.example.org/t/1001.png"),
        );
        let second = store.record(
            "https://media.example.org/play?id=2002",
            Some("generic-2002"),
            "Second",
            20,
            Some("https://media.example.org/t/2002.png"),
        );

        assert_eq!(first.thumbnail_path, Some(dir.path().join("generic-1001.jpg")));
        assert_eq!(second.thumbnail_path, Some(dir.path().join("generic-2002.jpg")));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsafe_id_characters_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(
            dir.path().to_path_buf(),
            Arc::new(Png { calls: AtomicUsize::new(0) }),
        );

        let record = store.record(URL, Some("../x/y"), "Song", 10, Some("https://i.ytimg.com/x.jpg"));
        assert_eq!(record.thumbnail_path, Some(dir.path().join("xy.jpg")));
    }

    #[test]
    fn no_source_means_no_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(Png { calls: AtomicUsize::new(0) });
        let store = HistoryStore::new(dir.path().to_path_buf(), fetcher.clone());

        let record = store.record(URL, None, "Song", 10, None);
        assert_eq!(record.thumbnail_path, None);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn snapshot_keeps_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().to_path_buf(), Arc::new(Failing));
        let shared = store.clone();

        store.record("https://youtu.be/aaa", None, "A", 1, None);
        shared.record("https://youtu.be/bbb", None, "B", 2, None);

        let titles: Vec<String> = store.snapshot().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn keys_from_common_url_shapes() {
        assert_eq!(video_key(URL).as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(video_key("https://youtu.be/dQw4w9WgXcQ?si=abc").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(video_key("https://youtube.com/shorts/abc_123-X").as_deref(), Some("abc_123-X"));
        assert_eq!(video_key("https://www.youtube.com/embed/xyz/").as_deref(), Some("xyz"));
        assert_eq!(video_key("https://vimeo.com/76979871").as_deref(), Some("76979871"));
        assert_eq!(video_key("https://example.com/"), None);
        assert_eq!(video_key("https://example.com/%%%"), None);
    }

    #[test]
    fn sizes_are_readable() {
        assert_eq!(format_size(2048), "2 KB");
        assert_eq!(format_size(5 * 1_048_576), "5.0 MB");
        assert_eq!(format_size(3 * 1_073_741_824), "3.0 GB");
    }
}
