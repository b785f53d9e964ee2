//! Rendering orchestrator.
//!
//! Takes the ordered image files collected by a session, applies the chosen
//! style to each, and assembles the results into a single PDF. Failures from
//! any stage surface as [`RenderError`]; the gateway handler converts them to
//! a user-facing message, so nothing here can take the process down.

mod error;
pub mod pdf;
pub mod style;

pub use error::RenderError;
pub use pdf::{EncodedPage, Quality};
pub use style::{Style, apply_style};

use std::path::PathBuf;

use image::codecs::jpeg::JpegEncoder;

/// Render the collected images into a single PDF.
///
/// Each input produces exactly one page, in input order. CPU-bound; callers
/// on an async runtime should run this on the blocking pool.
pub fn render_document(
    paths: &[PathBuf],
    style: Style,
    quality: Quality,
) -> Result<Vec<u8>, RenderError> {
    if paths.is_empty() {
        return Err(RenderError::NoPages);
    }

    let mut pages = Vec::with_capacity(paths.len());
    for path in paths {
        let image = image::open(path).map_err(|source| RenderError::Decode {
            path: path.clone(),
            source,
        })?;

        let styled = apply_style(image, style).to_rgb8();
        let (width, height) = styled.dimensions();

        let mut jpeg = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.jpeg_quality());
        styled
            .write_with_encoder(encoder)
            .map_err(RenderError::Encode)?;

        pages.push(EncodedPage {
            jpeg,
            width,
            height,
        });
    }

    pdf::assemble(&pages)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use lopdf::Document;
    use tempfile::TempDir;

    use super::*;

    fn write_image(dir: &TempDir, name: &str, value: u8) -> PathBuf {
        let path = dir.path().join(name);
        RgbImage::from_pixel(6, 4, Rgb([value, value, value]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn page_count_matches_input_count() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..3)
            .map(|i| write_image(&dir, &format!("{i}.jpg"), 80 + i as u8))
            .collect();

        let bytes = render_document(&paths, Style::Original, Quality::High).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn every_style_renders() {
        let dir = TempDir::new().unwrap();
        let paths = vec![write_image(&dir, "0.jpg", 120)];

        for style in Style::ALL {
            let bytes = render_document(&paths, style, Quality::Low).unwrap();
            assert_eq!(Document::load_mem(&bytes).unwrap().get_pages().len(), 1);
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            render_document(&[], Style::Original, Quality::High),
            Err(RenderError::NoPages)
        ));
    }

    #[test]
    fn unreadable_image_reports_its_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        match render_document(&[path.clone()], Style::Grayscale, Quality::Medium) {
            Err(RenderError::Decode { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected a decode error, got {other:?}"),
        }
    }
}
