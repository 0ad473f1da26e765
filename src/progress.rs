use tokio::sync::mpsc::UnboundedSender;

use crate::model::{AppMessage, ProgressEvent};

/// Marker prepended to every progress line so it can be told apart from
/// other yt-dlp output.
pub const PROGRESS_PREFIX: &str = "vidgrab-progress";

/// Value for yt-dlp's `--progress-template`, matched by [`parse_progress_line`].
pub fn progress_template() -> String {
    format!(
        "download:{}|%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s",
        PROGRESS_PREFIX
    )
}

/// Parses a line produced by [`progress_template`]. Fields yt-dlp could not
/// fill in come through as `NA` and are treated as absent.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?.strip_prefix('|')?;
    let mut fields = rest.split('|');
    let status = fields.next()?;

    match status {
        "downloading" => {
            let downloaded_bytes = parse_bytes(fields.next()?).unwrap_or(0);
            let total_bytes = parse_bytes(fields.next()?);
            let total_bytes_estimate = parse_bytes(fields.next()?);
            Some(ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes,
                total_bytes_estimate,
            })
        }
        "finished" => Some(ProgressEvent::Finished),
        _ => None,
    }
}

// yt-dlp reports estimates as floats.
fn parse_bytes(field: &str) -> Option<u64> {
    let value = field.trim().parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value as u64)
}

/// Converts an event to a 0-100 display value. A download with no known
/// total yields nothing so the display stays where it is.
pub fn percent(event: &ProgressEvent) -> Option<f32> {
    match *event {
        ProgressEvent::Downloading {
            downloaded_bytes,
            total_bytes,
            total_bytes_estimate,
        } => {
            let total = total_bytes
                .filter(|t| *t > 0)
                .or(total_bytes_estimate)
                .filter(|t| *t > 0)?;
            let pct = downloaded_bytes as f64 / total as f64 * 100.0;
            Some(pct.clamp(0.0, 100.0) as f32)
        }
        ProgressEvent::Finished => Some(100.0),
    }
}

/// Forwards progress to the UI loop as [`AppMessage::Progress`], in the
/// order events are relayed.
#[derive(Clone)]
pub struct ProgressRelay {
    tx: UnboundedSender<AppMessage>,
}

impl ProgressRelay {
    pub fn new(tx: UnboundedSender<AppMessage>) -> Self {
        Self { tx }
    }

    pub fn relay(&self, event: ProgressEvent) {
        if let Some(pct) = percent(&event) {
            // The UI may already be gone during shutdown.
            let _ = self.tx.send(AppMessage::Progress(pct));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn downloading(done: u64, total: Option<u64>, estimate: Option<u64>) -> ProgressEvent {
        ProgressEvent::Downloading {
            downloaded_bytes: done,
            total_bytes: total,
            total_bytes_estimate: estimate,
        }
    }

    #[test]
    fn quarter_of_total() {
        assert_eq!(percent(&downloading(50, Some(200), None)), Some(25.0));
    }

    #[test]
    fn estimate_is_used_when_total_missing() {
        assert_eq!(percent(&downloading(30, None, Some(120))), Some(25.0));
        assert_eq!(percent(&downloading(30, Some(0), Some(60))), Some(50.0));
    }

    #[test]
    fn unknown_total_gives_nothing() {
        assert_eq!(percent(&downloading(50, None, None)), None);
        assert_eq!(percent(&downloading(50, Some(0), Some(0))), None);
    }

    #[test]
    fn finished_is_always_full() {
        assert_eq!(percent(&ProgressEvent::Finished), Some(100.0));
    }

    #[test]
    fn overshoot_is_clamped() {
        assert_eq!(percent(&downloading(300, Some(200), None)), Some(100.0));
    }

    #[test]
    fn parses_template_lines() {
        assert_eq!(
            parse_progress_line("vidgrab-progress|downloading|1024|4096|NA"),
            Some(downloading(1024, Some(4096), None))
        );
        assert_eq!(
            parse_progress_line("  vidgrab-progress|downloading|10|NA|2048.5\n"),
            Some(downloading(10, None, Some(2048)))
        );
        assert_eq!(
            parse_progress_line("vidgrab-progress|finished|4096|4096|NA"),
            Some(ProgressEvent::Finished)
        );
    }

    #[test]
    fn ignores_unrelated_lines() {
        assert_eq!(parse_progress_line("[download] Destination: x.mp4"), None);
        assert_eq!(parse_progress_line("vidgrab-progress|error|0|0|0"), None);
        assert_eq!(parse_progress_line("vidgrab-progress|downloading|1"), None);
    }

    #[test]
    fn relay_forwards_in_order_and_skips_unknown_totals() {
        let (tx, mut rx) = unbounded_channel();
        let relay = ProgressRelay::new(tx);

        relay.relay(downloading(50, Some(200), None));
        relay.relay(downloading(70, None, None));
        relay.relay(downloading(100, Some(200), None));
        relay.relay(ProgressEvent::Finished);

        let mut seen = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            match msg {
                AppMessage::Progress(p) => seen.push(p),
                _ => panic!("unexpected message"),
            }
        }
        assert_eq!(seen, vec![25.0, 50.0, 100.0]);
    }
}
