//! Branding codec
//!
//! Recomposes an uploaded scan onto a fixed ID-1 sized card: a rounded white surface over a soft
//! drop shadow, the source scaled and centered in the padded interior, and a caption strip at the
//! bottom carrying the provenance label and the UTC time of branding.

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageReader, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::filter::gaussian_blur_f32;
use imageproc::rect::Rect;
use std::io::Cursor;

use crate::glyphs::{self, GLYPH_HEIGHT};

/// Output canvas width in pixels: ID-1 card width (85.60 mm) at 300 DPI.
pub const CANVAS_WIDTH: u32 = 1011;
/// Output canvas height in pixels: ID-1 card height (53.98 mm) at 300 DPI.
pub const CANVAS_HEIGHT: u32 = 638;

const SHADOW_MARGIN: u32 = 24;
const SHADOW_OFFSET: (i32, i32) = (8, 10);
const SHADOW_SIGMA: f32 = 8.0;
const CORNER_RADIUS: u32 = 36;
const PADDING_RATIO: f32 = 0.06;
const CAPTION_RATIO: f32 = 0.14;
const MIN_CAPTION_SCALE: u32 = 1;
const MAX_CAPTION_SCALE: u32 = 6;
const JPEG_QUALITY: u8 = 90;

const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 90]);
const SURFACE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const DIVIDER: Rgba<u8> = Rgba([215, 215, 220, 255]);
const INK: Rgba<u8> = Rgba([60, 60, 70, 255]);

/// Default provenance prefix.
pub const DEFAULT_LABEL: &str = "KYC ONBOARDING";

/// Output of [`BrandingCodec::brand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandingResult {
    pub data: Vec<u8>,
    pub branded: bool,
    /// Detected container format (`png` or `jpeg`) when branding was applied.
    pub format: Option<String>,
    /// Caption rendered on the card.
    pub label: Option<String>,
}

impl BrandingResult {
    fn unmodified(payload: &[u8]) -> Self {
        Self {
            data: payload.to_vec(),
            branded: false,
            format: None,
            label: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupportedFormat {
    Png,
    Jpeg,
}

impl SupportedFormat {
    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        }
    }

    fn has_alpha(self) -> bool {
        matches!(self, Self::Png)
    }
}

/// Card-frame watermarking for identity documents.
///
/// Stateless apart from the label prefix; every call works on its own buffers, so one codec can
/// be shared across concurrent uploads.
#[derive(Debug, Clone)]
pub struct BrandingCodec {
    label_prefix: String,
}

impl Default for BrandingCodec {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL)
    }
}

impl BrandingCodec {
    pub fn new(label_prefix: impl Into<String>) -> Self {
        Self {
            label_prefix: label_prefix.into(),
        }
    }

    pub fn label_prefix(&self) -> &str {
        &self.label_prefix
    }

    /// Brand `payload`, captioned with the current UTC time.
    ///
    /// Never fails: empty input, unknown or unsupported formats, decode errors and encode errors
    /// all return the input unchanged with `branded == false`.
    pub fn brand(&self, payload: &[u8], filename: &str) -> BrandingResult {
        self.brand_at(payload, filename, Utc::now())
    }

    /// Same as [`brand`](Self::brand) with an explicit caption timestamp.
    pub fn brand_at(&self, payload: &[u8], filename: &str, at: DateTime<Utc>) -> BrandingResult {
        if payload.is_empty() {
            return BrandingResult::unmodified(payload);
        }

        let reader = match ImageReader::new(Cursor::new(payload)).with_guessed_format() {
            Ok(reader) => reader,
            Err(_) => return BrandingResult::unmodified(payload),
        };
        let Some(format) = reader.format().and_then(SupportedFormat::from_image_format) else {
            tracing::debug!(filename = %filename, "Branding skipped: unsupported image format");
            return BrandingResult::unmodified(payload);
        };

        let source = match reader.decode() {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(filename = %filename, error = %e, "Branding skipped: decode failed");
                return BrandingResult::unmodified(payload);
            }
        };

        let label = self.caption(at);
        let canvas = compose(&source, &label, format);

        match encode(canvas, format) {
            Ok(data) if !data.is_empty() => BrandingResult {
                data,
                branded: true,
                format: Some(format.as_str().to_string()),
                label: Some(label),
            },
            Ok(_) => BrandingResult::unmodified(payload),
            Err(e) => {
                tracing::warn!(filename = %filename, error = %e, "Branding skipped: encode failed");
                BrandingResult::unmodified(payload)
            }
        }
    }

    fn caption(&self, at: DateTime<Utc>) -> String {
        let stamp = at.format("%Y-%m-%d %H:%M");
        let prefix = self.label_prefix.trim();
        if prefix.is_empty() {
            stamp.to_string()
        } else {
            format!("{} {}", prefix, stamp)
        }
    }
}

/// Fill a rounded rectangle as two overlapping bands plus four corner discs.
fn fill_rounded_rect(
    image: &mut RgbaImage,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    radius: u32,
    color: Rgba<u8>,
) {
    if width == 0 || height == 0 {
        return;
    }
    let r = radius.min(width / 2).min(height / 2);

    if width > 2 * r {
        draw_filled_rect_mut(
            image,
            Rect::at(x + r as i32, y).of_size(width - 2 * r, height),
            color,
        );
    }
    if height > 2 * r {
        draw_filled_rect_mut(
            image,
            Rect::at(x, y + r as i32).of_size(width, height - 2 * r),
            color,
        );
    }
    if r > 0 {
        let (left, top) = (x + r as i32, y + r as i32);
        let (right, bottom) = (x + (width - 1 - r) as i32, y + (height - 1 - r) as i32);
        for center in [(left, top), (right, top), (left, bottom), (right, bottom)] {
            draw_filled_circle_mut(image, center, r as i32, color);
        }
    }
}

fn compose(source: &DynamicImage, label: &str, format: SupportedFormat) -> RgbaImage {
    let background = if format.has_alpha() {
        Rgba([0, 0, 0, 0])
    } else {
        SURFACE
    };
    let mut canvas = RgbaImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, background);

    let margin = SHADOW_MARGIN.min(CANVAS_WIDTH / 4).min(CANVAS_HEIGHT / 4);
    let card_x = margin as i32;
    let card_y = margin as i32;
    let card_w = (CANVAS_WIDTH - 2 * margin).max(1);
    let card_h = (CANVAS_HEIGHT - 2 * margin).max(1);
    let radius = CORNER_RADIUS.min(card_w / 2).min(card_h / 2);

    // Drop shadow on its own layer so the blur never touches the card
    let mut shadow = RgbaImage::new(CANVAS_WIDTH, CANVAS_HEIGHT);
    fill_rounded_rect(
        &mut shadow,
        card_x + SHADOW_OFFSET.0,
        card_y + SHADOW_OFFSET.1,
        card_w,
        card_h,
        radius,
        SHADOW,
    );
    let shadow = gaussian_blur_f32(&shadow, SHADOW_SIGMA);
    imageops::overlay(&mut canvas, &shadow, 0, 0);

    fill_rounded_rect(&mut canvas, card_x, card_y, card_w, card_h, radius, SURFACE);

    let padding = ((card_h as f32 * PADDING_RATIO) as u32)
        .max(1)
        .min(card_w / 4)
        .min(card_h / 4);
    let caption_h = ((card_h as f32 * CAPTION_RATIO) as u32).max(1);
    let inner_x = card_x + padding as i32;
    let inner_y = card_y + padding as i32;
    let inner_w = card_w.saturating_sub(2 * padding).max(1);
    let inner_h = card_h.saturating_sub(2 * padding + caption_h).max(1);

    // `resize` keeps the aspect ratio and fits within the bounds
    let scaled = source
        .resize(inner_w, inner_h, FilterType::CatmullRom)
        .to_rgba8();
    let offset_x = inner_x + (inner_w.saturating_sub(scaled.width()) / 2) as i32;
    let offset_y = inner_y + (inner_h.saturating_sub(scaled.height()) / 2) as i32;
    imageops::overlay(&mut canvas, &scaled, offset_x as i64, offset_y as i64);

    let strip_top = inner_y + inner_h as i32;
    let divider_y = strip_top as f32 + (padding as f32 / 2.0).min(caption_h as f32 / 4.0);
    draw_line_segment_mut(
        &mut canvas,
        (inner_x as f32, divider_y),
        ((inner_x + inner_w as i32) as f32, divider_y),
        DIVIDER,
    );

    draw_caption(&mut canvas, label, inner_x, strip_top, inner_w, caption_h + padding);

    canvas
}

/// Left-aligned caption, vertically centered in the strip, at the largest integer scale that
/// fits both the strip height and the available width.
fn draw_caption(canvas: &mut RgbaImage, label: &str, x: i32, top: i32, width: u32, height: u32) {
    let by_height = height / 2 / GLYPH_HEIGHT;
    let by_width = width / glyphs::text_width(label, 1).max(1);
    let scale = by_height
        .min(by_width)
        .clamp(MIN_CAPTION_SCALE, MAX_CAPTION_SCALE);

    let text_h = GLYPH_HEIGHT * scale;
    let y = top + (height.saturating_sub(text_h) / 2) as i32;
    glyphs::draw_text(canvas, x, y, scale, label, INK);
}

fn encode(canvas: RgbaImage, format: SupportedFormat) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Vec::new();
    match format {
        SupportedFormat::Png => {
            canvas.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        }
        SupportedFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
            JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).encode_image(&rgb)?;
        }
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::{GenericImageView, Rgb, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([20, 120, 200]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)
            .unwrap();
        buffer
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap()
    }

    #[test]
    fn test_canvas_is_id1_at_300_dpi() {
        let px = |mm: f64| (mm / 25.4 * 300.0).round() as u32;
        assert_eq!(CANVAS_WIDTH, px(85.60));
        assert_eq!(CANVAS_HEIGHT, px(53.98));
    }

    #[test]
    fn test_empty_payload_is_unmodified() {
        let result = BrandingCodec::default().brand(&[], "empty.png");
        assert!(!result.branded);
        assert!(result.data.is_empty());
        assert_eq!(result.format, None);
    }

    #[test]
    fn test_garbage_payload_is_unmodified() {
        let codec = BrandingCodec::default();
        for payload in [vec![0u8; 64], b"definitely not an image".to_vec()] {
            let result = codec.brand(&payload, "scan.png");
            assert!(!result.branded);
            assert_eq!(result.data, payload);
            assert_eq!(result.label, None);
        }
    }

    #[test]
    fn test_truncated_png_is_unmodified() {
        let mut payload = png_bytes(16, 16);
        payload.truncate(payload.len() / 2);
        let result = BrandingCodec::default().brand(&payload, "broken.png");
        assert!(!result.branded);
        assert_eq!(result.data, payload);
    }

    #[test]
    fn test_unsupported_format_is_unmodified() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let mut gif = Vec::new();
        img.write_to(&mut Cursor::new(&mut gif), ImageFormat::Gif)
            .unwrap();

        let result = BrandingCodec::default().brand(&gif, "anim.png");
        assert!(!result.branded);
        assert_eq!(result.data, gif);
    }

    #[test]
    fn test_one_pixel_png_is_branded_to_card_canvas() {
        let codec = BrandingCodec::new("KYC ONBOARDING");
        let result = codec.brand_at(&png_bytes(1, 1), "tiny.png", fixed_time());

        assert!(result.branded);
        assert_eq!(result.format.as_deref(), Some("png"));
        assert_eq!(result.label.as_deref(), Some("KYC ONBOARDING 2024-03-05 14:07"));

        let decoded = image::load_from_memory(&result.data).unwrap();
        assert_eq!(decoded.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
        // outside the card and its shadow stays transparent
        assert_eq!(decoded.get_pixel(0, 0)[3], 0);
        // interior of the card holds the scaled source
        let center = decoded.get_pixel(CANVAS_WIDTH / 2, CANVAS_HEIGHT / 2 - 40);
        for (got, want) in center.0.iter().zip([200u8, 30, 30, 255]) {
            assert!(got.abs_diff(want) <= 2, "center {:?}", center);
        }
    }

    #[test]
    fn test_jpeg_is_branded_as_jpeg() {
        let payload = jpeg_bytes(40, 30);
        let result = BrandingCodec::default().brand(&payload, "front.jpg");

        assert!(result.branded);
        assert_eq!(result.format.as_deref(), Some("jpeg"));
        assert_eq!(image::guess_format(&result.data).unwrap(), ImageFormat::Jpeg);

        let decoded = image::load_from_memory(&result.data).unwrap();
        assert_eq!(decoded.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
        // opaque white background for formats without alpha
        let corner = decoded.to_rgb8().get_pixel(0, 0).0;
        assert!(corner.iter().all(|&c| c > 240), "corner {:?}", corner);
    }

    #[test]
    fn test_format_comes_from_bytes_not_filename() {
        let result = BrandingCodec::default().brand(&png_bytes(8, 8), "mislabelled.jpg");
        assert!(result.branded);
        assert_eq!(result.format.as_deref(), Some("png"));
    }

    #[test]
    fn test_extreme_aspect_ratios_do_not_panic() {
        let codec = BrandingCodec::default();
        for (w, h) in [(1, 400), (400, 1), (2000, 3)] {
            let result = codec.brand(&png_bytes(w, h), "strip.png");
            assert!(result.branded, "{w}x{h}");
        }
    }

    #[test]
    fn test_blank_prefix_caption_is_timestamp_only() {
        let codec = BrandingCodec::new("  ");
        assert_eq!(codec.caption(fixed_time()), "2024-03-05 14:07");
    }

    fn rightmost_ink(canvas: &RgbaImage) -> Option<u32> {
        canvas
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[3] > 0)
            .map(|(x, _, _)| x)
            .max()
    }

    #[test]
    fn test_caption_stays_inside_its_strip() {
        let label = "KYC ONBOARDING 2024-03-05 14:07";

        let mut narrow = RgbaImage::new(300, 40);
        draw_caption(&mut narrow, label, 0, 0, 300, 40);
        let right = rightmost_ink(&narrow).unwrap();
        assert!(right < glyphs::text_width(label, 1), "ink at {right}");

        let mut wide = RgbaImage::new(2000, 200);
        draw_caption(&mut wide, label, 0, 0, 2000, 200);
        let right = rightmost_ink(&wide).unwrap();
        let full = glyphs::text_width(label, MAX_CAPTION_SCALE);
        assert!(right < full, "ink at {right}");
        assert!(right > full / 2, "ink at {right}");
    }
}
