//! Image style transforms.
//!
//! Each style is a deterministic, pure per-image transform. Output is always
//! RGB so every document page carries the same color space.

use image::DynamicImage;

// ============================================================================
// Style
// ============================================================================

/// Image style applied uniformly to all images in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// Identity; images pass through untouched.
    Original,
    /// Luma conversion.
    Grayscale,
    /// Binary threshold over the luma channel.
    BlackWhite,
    /// Contrast and brightness boost.
    Enhanced,
}

impl Style {
    /// All styles, in presentation order.
    pub const ALL: [Style; 4] = [
        Style::Original,
        Style::Grayscale,
        Style::BlackWhite,
        Style::Enhanced,
    ];

    /// Parse a style identifier (callback data payload).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "original" => Some(Style::Original),
            "grayscale" => Some(Style::Grayscale),
            "black_white" => Some(Style::BlackWhite),
            "enhanced" => Some(Style::Enhanced),
            _ => None,
        }
    }

    /// Stable identifier used in callback data.
    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Original => "original",
            Style::Grayscale => "grayscale",
            Style::BlackWhite => "black_white",
            Style::Enhanced => "enhanced",
        }
    }

    /// Human-readable button label.
    pub fn label(&self) -> &'static str {
        match self {
            Style::Original => "Original",
            Style::Grayscale => "Grayscale",
            Style::BlackWhite => "Black & White",
            Style::Enhanced => "Enhanced",
        }
    }
}

// ============================================================================
// Transforms
// ============================================================================

/// Luma cutoff for the black & white style: values above become white.
const BW_THRESHOLD: u8 = 150;

/// Contrast scale for the enhanced style, applied about the mean luma.
const CONTRAST_FACTOR: f32 = 1.5;

/// Brightness scale for the enhanced style.
const BRIGHTNESS_FACTOR: f32 = 1.2;

/// Apply a style transform to one image.
pub fn apply_style(image: DynamicImage, style: Style) -> DynamicImage {
    match style {
        Style::Original => image,
        Style::Grayscale => {
            let gray = image.to_luma8();
            DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(gray).to_rgb8())
        }
        Style::BlackWhite => {
            let mut gray = image.to_luma8();
            for pixel in gray.pixels_mut() {
                pixel.0[0] = if pixel.0[0] > BW_THRESHOLD { 255 } else { 0 };
            }
            DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(gray).to_rgb8())
        }
        Style::Enhanced => enhance(image),
    }
}

/// Scale contrast about the image's mean luma, then scale brightness.
fn enhance(image: DynamicImage) -> DynamicImage {
    let rgb = image.to_rgb8();

    let gray = image.to_luma8();
    let sum: u64 = gray.pixels().map(|p| u64::from(p.0[0])).sum();
    let count = u64::from(gray.width()) * u64::from(gray.height());
    let mean = if count == 0 {
        0.0
    } else {
        (sum as f32 / count as f32).round()
    };

    let mut out = rgb;
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let contrasted = mean + CONTRAST_FACTOR * (f32::from(*channel) - mean);
            let brightened = contrasted * BRIGHTNESS_FACTOR;
            *channel = brightened.round().clamp(0.0, 255.0) as u8;
        }
    }
    DynamicImage::ImageRgb8(out)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn uniform(value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([value, value, value])))
    }

    #[test]
    fn parse_roundtrip() {
        for style in Style::ALL {
            assert_eq!(Style::parse(style.as_str()), Some(style));
        }
        assert_eq!(Style::parse("sepia"), None);
    }

    #[test]
    fn original_is_identity() {
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(0, 0, Rgb([10, 200, 30]));
        img.put_pixel(1, 1, Rgb([255, 0, 127]));
        let input = DynamicImage::ImageRgb8(img.clone());

        let output = apply_style(input, Style::Original);
        assert_eq!(output.to_rgb8(), img);
    }

    #[test]
    fn grayscale_equalizes_channels() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([200, 10, 10]));
        img.put_pixel(1, 0, Rgb([0, 0, 255]));

        let output = apply_style(DynamicImage::ImageRgb8(img), Style::Grayscale).to_rgb8();
        for pixel in output.pixels() {
            assert_eq!(pixel.0[0], pixel.0[1]);
            assert_eq!(pixel.0[1], pixel.0[2]);
        }
    }

    #[test]
    fn black_white_thresholds_at_150() {
        // Luma of a uniform gray equals its channel value, so the threshold
        // is observable directly.
        let below = apply_style(uniform(150), Style::BlackWhite).to_rgb8();
        assert_eq!(below.get_pixel(0, 0).0, [0, 0, 0]);

        let above = apply_style(uniform(151), Style::BlackWhite).to_rgb8();
        assert_eq!(above.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn enhanced_brightens_uniform_image() {
        // Uniform image: mean == channel value, so contrast is a no-op and
        // only the brightness factor applies.
        let output = apply_style(uniform(100), Style::Enhanced).to_rgb8();
        assert_eq!(output.get_pixel(0, 0).0, [120, 120, 120]);
    }

    #[test]
    fn enhanced_clamps_channel_values() {
        let output = apply_style(uniform(255), Style::Enhanced).to_rgb8();
        assert_eq!(output.get_pixel(0, 0).0, [255, 255, 255]);
    }
}
