//! The blend job: decide which layers are visible, decode them, composite
//! back-to-front onto one canvas, and encode the result.
//!
//! Layers are scanned from the top of the stack down so that everything
//! hidden beneath a fully opaque, fully covering layer is never decoded.
//! Compositing is integer-only source-over; outputs are byte-stable
//! across releases.

use tracing::{debug, trace};

use crate::canvas::{Canvas, Pixel};
use crate::color::{self, Tinter};
use crate::decode::LayerDecoder;
use crate::encode;
use crate::error::{BlendError, BlendResult};
use crate::layer::Layer;
use crate::options::ResolvedOptions;

/// A finished job: encoded bytes plus non-fatal per-layer decode notices,
/// each prefixed with the originating layer index.
#[derive(Clone, Debug)]
pub struct BlendOutput {
    pub bytes: Vec<u8>,
    pub warnings: Vec<String>,
}

struct PreparedLayer {
    x: i32,
    y: i32,
    tint: Tinter,
    canvas: Canvas,
}

/// Run one blend job to completion. Executes on a worker thread; the
/// canvas and all decoded layers are dropped on every exit path.
#[tracing::instrument(skip_all, fields(layers = layers.len(), format = ?opts.format))]
pub(crate) fn run(
    layers: &[Layer],
    mut opts: ResolvedOptions,
    decoder: &dyn LayerDecoder,
) -> BlendResult<BlendOutput> {
    let mut warnings = Vec::new();
    // Pushed in visit order (top of the stack first).
    let mut prepared: Vec<PreparedLayer> = Vec::new();
    let mut may_have_transparency = true;

    for (index, layer) in layers.iter().enumerate().rev() {
        // An opaque covering layer above makes everything below invisible.
        if !may_have_transparency {
            break;
        }

        let info = decoder.probe(&layer.bytes)?;
        if info.width == 0 || info.height == 0 {
            return Err(BlendError::decode("zero width/height image encountered"));
        }

        let visible_w = info.width as i32 + layer.x;
        let visible_h = info.height as i32 + layer.y;
        // The first visited layer fixes the canvas size unless the caller
        // supplied one.
        if opts.width <= 0 {
            opts.width = visible_w.max(0);
        }
        if opts.height <= 0 {
            opts.height = visible_h.max(0);
        }

        if visible_w <= 0 || visible_h <= 0 || layer.x >= opts.width || layer.y >= opts.height {
            trace!(index, "layer outside the viewport, skipped");
            continue;
        }

        // Topmost visible layer that already matches the output exactly:
        // forward its bytes without decoding anything.
        if prepared.is_empty()
            && !info.has_alpha
            && !opts.reencode
            && layer.x == 0
            && layer.y == 0
            && info.width as i32 == opts.width
            && info.height as i32 == opts.height
        {
            debug!(index, "opaque covering layer passed through untouched");
            return Ok(BlendOutput {
                bytes: layer.bytes.to_vec(),
                warnings,
            });
        }

        let decoded = decoder.decode(&layer.bytes)?;
        for warning in decoded.warnings {
            warnings.push(format!("Layer {index}: {warning}"));
        }

        let tint = layer.tint.unwrap_or_default();
        if tint.debug {
            debug!(index, ?tint, "layer tint");
        }

        let covers_w = layer.x <= 0 && visible_w >= opts.width;
        let covers_h = layer.y <= 0 && visible_h >= opts.height;
        if !info.has_alpha && covers_w && covers_h && tint.is_alpha_identity() {
            may_have_transparency = false;
        }

        prepared.push(PreparedLayer {
            x: layer.x,
            y: layer.y,
            tint,
            canvas: decoded.canvas,
        });
    }

    if opts.width <= 0 || opts.height <= 0 {
        return Err(BlendError::dimension(format!(
            "Image dimensions {}x{} are invalid",
            opts.width, opts.height
        )));
    }

    let mut target = Canvas::new(opts.width as u32, opts.height as u32)?;
    if may_have_transparency {
        target.fill(opts.matte);
    }

    debug!(
        decoded = prepared.len(),
        matte = may_have_transparency,
        "compositing layers"
    );
    // Paint in original stacking order, bottom to top.
    for layer in prepared.iter().rev() {
        composite_layer(&mut target, layer);
    }

    let bytes = encode::encode(&target, &opts, may_have_transparency)?;
    Ok(BlendOutput { bytes, warnings })
}

/// Paint one decoded layer onto the target over their intersection.
fn composite_layer(target: &mut Canvas, layer: &PreparedLayer) {
    let canvas_w = target.width() as i32;
    let canvas_h = target.height() as i32;
    let layer_w = layer.canvas.width() as i32;
    let layer_h = layer.canvas.height() as i32;

    let source_x = (-layer.x).max(0);
    let source_y = (-layer.y).max(0);
    let width = layer_w - source_x - (layer.x + layer_w - canvas_w).max(0);
    let height = layer_h - source_y - (layer.y + layer_h - canvas_h).max(0);

    let mut source_pos = (source_y * layer_w + source_x) as usize;
    let mut target_pos = (layer.y.max(0) * canvas_w + layer.x.max(0)) as usize;

    let source = layer.canvas.pixels();
    let dst = target.pixels_mut();
    let tinting = !layer.tint.is_identity();
    let set_alpha = !layer.tint.is_alpha_identity();

    if tinting || set_alpha {
        for _ in 0..height {
            for x in 0..width as usize {
                let source_pixel = source[source_pos + x];
                let mut a = (source_pixel >> 24) & 0xff;
                if set_alpha {
                    let mut a2 = layer.tint.a0 + (a as f64 / 255.0) * (layer.tint.a1 - layer.tint.a0);
                    if a2 < 0.0 {
                        a2 = 0.0;
                    }
                    a = ((a2 * 255.0) + 0.5).floor() as u32;
                    if a > 255 {
                        a = 255;
                    }
                }
                let mut r = (source_pixel & 0xff) as u8;
                let mut g = ((source_pixel >> 8) & 0xff) as u8;
                let mut b = ((source_pixel >> 16) & 0xff) as u8;
                if a > 1 && tinting {
                    color::tint_pixel(&mut r, &mut g, &mut b, &layer.tint);
                }
                let new_pixel =
                    (a << 24) | ((b as u32) << 16) | ((g as u32) << 8) | (r as u32);
                composite_pixel(&mut dst[target_pos + x], new_pixel);
            }
            source_pos += layer_w as usize;
            target_pos += canvas_w as usize;
        }
    } else {
        for _ in 0..height {
            for x in 0..width as usize {
                composite_pixel(&mut dst[target_pos + x], source[source_pos + x]);
            }
            source_pos += layer_w as usize;
            target_pos += canvas_w as usize;
        }
    }
}

/// Porter-Duff source-over in pure integer arithmetic.
///
/// The fixed-point formula below is deliberate: outputs must stay
/// bit-identical across releases, so do not swap in a float blend.
fn composite_pixel(target: &mut Pixel, source: Pixel) {
    if source <= 0x00ff_ffff {
        // Source is fully transparent.
    } else if source >= 0xff00_0000 || *target <= 0x00ff_ffff {
        // Source is fully opaque, or the target is fully transparent.
        *target = source;
    } else {
        // Both carry partial transparency.
        let a1 = ((source >> 24) & 0xff) as i64;
        let r1 = (source & 0xff) as i64;
        let g1 = ((source >> 8) & 0xff) as i64;
        let b1 = ((source >> 16) & 0xff) as i64;

        let a0 = ((*target >> 24) & 0xff) as i64;
        let r0 = ((*target & 0xff) as i64) * a0;
        let g0 = (((*target >> 8) & 0xff) as i64) * a0;
        let b0 = (((*target >> 16) & 0xff) as i64) * a0;

        let a = ((a1 + a0) << 8) - a0 * a1;
        let r = (((r1 << 8) - r0) * a1 + (r0 << 8)) / a;
        let g = (((g1 << 8) - g0) * a1 + (g0 << 8)) / a;
        let b = (((b1 << 8) - b0) * a1 + (b0 << 8)) / a;
        let a = a >> 8;

        *target = ((a as u32) << 24) | ((b as u32) << 16) | ((g as u32) << 8) | (r as u32);
    }
}
