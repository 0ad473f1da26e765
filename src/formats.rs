use std::collections::HashSet;

use crate::model::FormatDescriptor;

/// Keeps the mp4 video streams that have a height and a quality note,
/// dropping later entries whose `(height, format_note)` was already seen.
/// Source order is preserved.
pub fn filter_formats(formats: &[FormatDescriptor]) -> Vec<FormatDescriptor> {
    let mut seen: HashSet<(u32, &str)> = HashSet::new();
    let mut filtered = Vec::new();

    for format in formats {
        if format.ext != "mp4" {
            continue;
        }
        let Some(note) = format.format_note.as_deref() else {
            continue;
        };
        if note.trim().is_empty() {
            continue;
        }
        let height = match format.height {
            Some(h) if h > 0 => h,
            _ => continue,
        };
        if format.vcodec.as_deref() == Some("none") {
            continue;
        }
        // Key on the raw note; two notes differing only in padding stay distinct.
        if seen.insert((height, note)) {
            filtered.push(format.clone());
        }
    }

    filtered
}
