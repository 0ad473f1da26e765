use std::path::Path;

use eframe::egui::ColorImage;

/// Decodes a cached thumbnail into an image egui can upload as a texture.
pub fn load_thumbnail(path: &Path) -> Option<ColorImage> {
    // Decode from disk; the cache only holds JPEGs but any format works
    let img = match image::open(path) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "cannot decode thumbnail: {}", e);
            return None;
        }
    };
    // egui wants the size as [width, height]
    let size = [img.width() as usize, img.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_cached_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.jpg");
        image::RgbImage::from_pixel(8, 6, image::Rgb([1, 2, 3]))
            .save(&path)
            .unwrap();

        let img = load_thumbnail(&path).unwrap();
        assert_eq!(img.size, [8, 6]);
    }

    #[test]
    fn missing_file_gives_none() {
        assert!(load_thumbnail(Path::new("/definitely/not/here.jpg")).is_none());
    }
}
