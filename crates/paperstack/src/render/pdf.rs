//! PDF assembly: one page per encoded image, in order.
//!
//! Pages embed the JPEG-encoded images directly (DCTDecode), so the quality
//! choice maps straight to the JPEG compression level. Page size equals the
//! image's pixel size at 72 dpi, first image first.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use super::RenderError;

// ============================================================================
// Quality
// ============================================================================

/// Document quality, mapped to a JPEG compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    High,
    Medium,
    Low,
}

impl Quality {
    /// All qualities, in presentation order.
    pub const ALL: [Quality; 3] = [Quality::High, Quality::Medium, Quality::Low];

    /// Parse a quality identifier (callback data payload).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Quality::High),
            "medium" => Some(Quality::Medium),
            "low" => Some(Quality::Low),
            _ => None,
        }
    }

    /// Stable identifier used in callback data.
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::High => "high",
            Quality::Medium => "medium",
            Quality::Low => "low",
        }
    }

    /// Human-readable button label.
    pub fn label(&self) -> &'static str {
        match self {
            Quality::High => "High",
            Quality::Medium => "Medium",
            Quality::Low => "Low",
        }
    }

    /// JPEG encoder quality for this level.
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            Quality::High => 85,
            Quality::Medium => 65,
            Quality::Low => 45,
        }
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// A JPEG-encoded page ready for embedding.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Assemble encoded pages into a single PDF, returning its bytes.
pub fn assemble(pages: &[EncodedPage]) -> Result<Vec<u8>, RenderError> {
    if pages.is_empty() {
        return Err(RenderError::NoPages);
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for page in pages {
        let width = page.width as f32;
        let height = page.height as f32;

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => page.width as i64,
                "Height" => page.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            page.jpeg.clone(),
        ));

        // Scale the unit image square to fill the page.
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width.into(),
                        0.into(),
                        0.into(),
                        height.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec!["Im0".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content
                .encode()
                .map_err(|e| RenderError::Assembly(e.to_string()))?,
        ));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| RenderError::Assembly(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use image::codecs::jpeg::JpegEncoder;
    use image::{Rgb, RgbImage};

    use super::*;

    fn encoded_page(width: u32, height: u32) -> EncodedPage {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 90, 60]));
        let mut jpeg = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut jpeg, 85);
        img.write_with_encoder(encoder).unwrap();
        EncodedPage {
            jpeg,
            width,
            height,
        }
    }

    #[test]
    fn quality_parse_roundtrip() {
        for quality in Quality::ALL {
            assert_eq!(Quality::parse(quality.as_str()), Some(quality));
        }
        assert_eq!(Quality::parse("ultra"), None);
    }

    #[test]
    fn quality_maps_to_jpeg_levels() {
        assert_eq!(Quality::High.jpeg_quality(), 85);
        assert_eq!(Quality::Medium.jpeg_quality(), 65);
        assert_eq!(Quality::Low.jpeg_quality(), 45);
    }

    #[test]
    fn assemble_produces_one_page_per_image() {
        let pages = vec![encoded_page(4, 6), encoded_page(8, 8), encoded_page(2, 2)];
        let bytes = assemble(&pages).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn assemble_sets_page_size_from_pixels() {
        let bytes = assemble(&[encoded_page(40, 60)]).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();

        let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        let dim = |obj: &Object| match obj {
            Object::Integer(v) => *v as f32,
            Object::Real(v) => *v,
            other => panic!("unexpected MediaBox entry {other:?}"),
        };
        assert_eq!(dim(&media_box[2]), 40.0);
        assert_eq!(dim(&media_box[3]), 60.0);
    }

    #[test]
    fn assemble_rejects_empty_input() {
        assert!(matches!(assemble(&[]), Err(RenderError::NoPages)));
    }
}
