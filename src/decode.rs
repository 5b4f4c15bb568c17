//! The decoder seam: a header probe plus a full decode, both fallible.
//!
//! The blend job only ever talks to [`LayerDecoder`], so tests can substitute
//! instrumented decoders and the codec stack stays swappable.

use std::io::Cursor;

use image::ImageDecoder as _;

use crate::canvas::Canvas;
use crate::error::{BlendError, BlendResult};

/// Header-level facts about an encoded layer, available without a full decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerInfo {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
}

/// A fully decoded layer plus any non-fatal notices the codec produced.
#[derive(Clone, Debug)]
pub struct DecodedLayer {
    pub canvas: Canvas,
    pub warnings: Vec<String>,
}

pub trait LayerDecoder: Send + Sync {
    /// Read width/height/alpha-presence from the image header only.
    fn probe(&self, bytes: &[u8]) -> BlendResult<LayerInfo>;

    /// Decode the full pixel buffer.
    fn decode(&self, bytes: &[u8]) -> BlendResult<DecodedLayer>;
}

/// Default decoder backed by the `image` crate (PNG, JPEG, WebP and friends).
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultDecoder;

impl LayerDecoder for DefaultDecoder {
    fn probe(&self, bytes: &[u8]) -> BlendResult<LayerInfo> {
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| BlendError::decode(e.to_string()))?;
        let decoder = reader
            .into_decoder()
            .map_err(|e| BlendError::decode(e.to_string()))?;
        let (width, height) = decoder.dimensions();
        let has_alpha = decoder.color_type().has_alpha();
        Ok(LayerInfo {
            width,
            height,
            has_alpha,
        })
    }

    fn decode(&self, bytes: &[u8]) -> BlendResult<DecodedLayer> {
        let rgba = image::load_from_memory(bytes)
            .map_err(|e| BlendError::decode(format!("Could not decode image: {e}")))?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        let canvas = Canvas::from_rgba8(width, height, rgba.as_raw())?;
        Ok(DecodedLayer {
            canvas,
            warnings: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::pack;

    fn rgb_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn rgba_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 4]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn probe_reports_dimensions_and_alpha() {
        let info = DefaultDecoder.probe(&rgb_png()).unwrap();
        assert_eq!(
            info,
            LayerInfo {
                width: 3,
                height: 2,
                has_alpha: false
            }
        );

        let info = DefaultDecoder.probe(&rgba_png()).unwrap();
        assert!(info.has_alpha);
    }

    #[test]
    fn decode_yields_packed_pixels() {
        let decoded = DefaultDecoder.decode(&rgb_png()).unwrap();
        assert_eq!(decoded.canvas.width(), 3);
        assert_eq!(decoded.canvas.pixels()[0], pack(10, 20, 30, 255));
        assert!(decoded.warnings.is_empty());
    }

    #[test]
    fn garbage_bytes_fail_probe_and_decode() {
        let junk = [0u8; 16];
        assert!(matches!(
            DefaultDecoder.probe(&junk),
            Err(BlendError::Decode(_))
        ));
        assert!(matches!(
            DefaultDecoder.decode(&junk),
            Err(BlendError::Decode(_))
        ));
    }
}
