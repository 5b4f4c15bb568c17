//! Encoder dispatch: one canvas in, format-specific bytes out.
//!
//! PNG full-color goes through `image`'s encoder; quantized and paletted PNG
//! go through the `png` crate directly, which exposes indexed output. JPEG
//! drops the alpha channel. WebP uses the pure-Rust lossless backend, with
//! channel precision reduced below quality 100 as the lossy stand-in.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tracing::trace;

use crate::canvas::Canvas;
use crate::error::{BlendError, BlendResult};
use crate::options::{FormatKind, PngEncoderKind, QuantMode, ResolvedOptions};
use crate::quant;

/// Serialize the canvas. `may_have_alpha` is the preparer's verdict on
/// whether any transparency can remain; it picks the hextree path for
/// quantized PNG.
pub(crate) fn encode(
    canvas: &Canvas,
    opts: &ResolvedOptions,
    may_have_alpha: bool,
) -> BlendResult<Vec<u8>> {
    match opts.format {
        FormatKind::Jpeg => encode_jpeg(canvas, opts.quality),
        FormatKind::Webp => encode_webp(canvas, opts.quality),
        FormatKind::Png => encode_png(canvas, opts, may_have_alpha),
    }
}

fn encode_png(
    canvas: &Canvas,
    opts: &ResolvedOptions,
    may_have_alpha: bool,
) -> BlendResult<Vec<u8>> {
    if let Some(palette) = &opts.palette {
        trace!(colors = palette.0.len(), "encoding paletted png");
        let indices = quant::map_to_palette(canvas, &palette.0);
        return write_indexed_png(canvas, &palette.0, &indices, opts.compression);
    }

    if opts.quality > 0 {
        let with_alpha = may_have_alpha && opts.mode == QuantMode::Hextree;
        trace!(
            colors = opts.quality,
            hextree = with_alpha,
            "encoding quantized png"
        );
        let (palette, indices) = quant::quantize(canvas, opts.quality as u32, with_alpha);
        return write_indexed_png(canvas, &palette, &indices, opts.compression);
    }

    let mut out = Vec::new();
    PngEncoder::new_with_quality(
        Cursor::new(&mut out),
        png_compression(opts.compression, opts.encoder),
        FilterType::Adaptive,
    )
    .write_image(
        &canvas.to_rgba8(),
        canvas.width(),
        canvas.height(),
        ExtendedColorType::Rgba8,
    )
    .map_err(|e| BlendError::encode(e.to_string()))?;
    Ok(out)
}

/// Numeric zlib-style levels collapse onto the codec's compression tiers.
fn png_compression(level: i32, encoder: PngEncoderKind) -> CompressionType {
    let max = match encoder {
        PngEncoderKind::Default => 9,
        PngEncoderKind::Miniz => 10,
    };
    match level {
        l if l < 0 => CompressionType::Default,
        0..=2 => CompressionType::Fast,
        l if l >= max - 1 => CompressionType::Best,
        _ => CompressionType::Default,
    }
}

fn write_indexed_png(
    canvas: &Canvas,
    palette: &[[u8; 4]],
    indices: &[u8],
    compression: i32,
) -> BlendResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut enc = png::Encoder::new(Cursor::new(&mut out), canvas.width(), canvas.height());
    enc.set_color(png::ColorType::Indexed);
    enc.set_depth(png::BitDepth::Eight);
    enc.set_palette(
        palette
            .iter()
            .flat_map(|c| [c[0], c[1], c[2]])
            .collect::<Vec<u8>>(),
    );
    if palette.iter().any(|c| c[3] != 255) {
        enc.set_trns(palette.iter().map(|c| c[3]).collect::<Vec<u8>>());
    }
    enc.set_compression(match compression {
        c if c < 0 => png::Compression::Default,
        0..=2 => png::Compression::Fast,
        c if c >= 8 => png::Compression::Best,
        _ => png::Compression::Default,
    });
    let mut writer = enc
        .write_header()
        .map_err(|e| BlendError::encode(e.to_string()))?;
    writer
        .write_image_data(indices)
        .map_err(|e| BlendError::encode(e.to_string()))?;
    writer
        .finish()
        .map_err(|e| BlendError::encode(e.to_string()))?;
    Ok(out)
}

fn encode_jpeg(canvas: &Canvas, quality: i32) -> BlendResult<Vec<u8>> {
    let rgb = canvas.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(Cursor::new(&mut out), quality.clamp(1, 100) as u8)
        .write_image(
            &rgb,
            canvas.width(),
            canvas.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| BlendError::encode(e.to_string()))?;
    Ok(out)
}

fn encode_webp(canvas: &Canvas, quality: i32) -> BlendResult<Vec<u8>> {
    let mut rgba = canvas.to_rgba8();
    let quality = quality.clamp(0, 100) as u8;
    if quality < 100 {
        posterize_rgb(&mut rgba, quality);
    }
    let mut out = Vec::new();
    WebPEncoder::new_lossless(Cursor::new(&mut out))
        .write_image(
            &rgba,
            canvas.width(),
            canvas.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| BlendError::encode(e.to_string()))?;
    Ok(out)
}

/// Coarsen RGB channel precision so the lossless WebP stream compresses
/// harder at lower quality settings. Alpha is left untouched.
fn posterize_rgb(data: &mut [u8], quality: u8) {
    let levels = 8 + (quality as u32 * 248) / 100;
    if levels >= 256 {
        return;
    }
    let step = 255.0 / (levels - 1) as f32;
    for px in data.chunks_exact_mut(4) {
        for c in &mut px[..3] {
            let bucket = (*c as f32 / step).round();
            *c = (bucket * step).round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::pack;
    use crate::options::{BlendOptions, Palette};

    fn solid_canvas(r: u8, g: u8, b: u8, a: u8) -> Canvas {
        let mut canvas = Canvas::new(8, 8).unwrap();
        canvas.fill(pack(r, g, b, a));
        canvas
    }

    fn resolved(options: BlendOptions) -> ResolvedOptions {
        let layer = crate::layer::Layer::new(vec![0u8; 4]);
        options.resolve(&[layer]).unwrap()
    }

    #[test]
    fn png_output_has_signature() {
        let opts = resolved(BlendOptions::default());
        let bytes = encode(&solid_canvas(10, 20, 30, 255), &opts, true).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn quantized_png_roundtrips_solid_color() {
        let opts = resolved(BlendOptions {
            quality: 4,
            ..BlendOptions::default()
        });
        let bytes = encode(&solid_canvas(200, 50, 25, 255), &opts, false).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0).0, [200, 50, 25, 255]);
    }

    #[test]
    fn paletted_png_uses_supplied_colors() {
        let opts = resolved(BlendOptions {
            palette: Some(Palette(vec![[0, 0, 0, 255], [200, 50, 25, 255]])),
            ..BlendOptions::default()
        });
        let bytes = encode(&solid_canvas(199, 51, 25, 255), &opts, false).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0).0, [200, 50, 25, 255]);
    }

    #[test]
    fn jpeg_output_has_marker() {
        let opts = resolved(BlendOptions {
            format: FormatKind::Jpeg,
            ..BlendOptions::default()
        });
        let bytes = encode(&solid_canvas(255, 0, 0, 255), &opts, false).unwrap();
        assert_eq!(&bytes[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn webp_output_has_riff_header() {
        let opts = resolved(BlendOptions {
            format: FormatKind::Webp,
            ..BlendOptions::default()
        });
        let bytes = encode(&solid_canvas(0, 255, 0, 255), &opts, false).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[test]
    fn posterize_is_identity_at_full_quality() {
        let mut data = vec![13u8, 77, 201, 128];
        posterize_rgb(&mut data, 100);
        assert_eq!(data, [13, 77, 201, 128]);

        let mut coarse = vec![13u8, 77, 201, 128];
        posterize_rgb(&mut coarse, 10);
        assert_eq!(coarse[3], 128);
    }
}
