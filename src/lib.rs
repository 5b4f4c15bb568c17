//! Tileblend composites stacks of independently encoded raster images into
//! a single output image.
//!
//! Given an ordered set of layers (bottom first), each with an optional
//! placement offset and optional HSL/alpha tint, it decodes only the layers
//! that can actually be seen, paints them back-to-front with integer
//! Porter-Duff source-over blending, and re-encodes the result as PNG,
//! JPEG or WebP.
//!
//! # Pipeline overview
//!
//! 1. **Validate**: [`BlendOptions::resolve`] checks every option
//!    synchronously, before any pixel work.
//! 2. **Prepare**: a top-down visibility scan probes layer headers, derives
//!    the canvas size, drops off-viewport layers and stops decoding below
//!    the first opaque covering layer.
//! 3. **Composite**: decoded layers are painted bottom-to-top onto one
//!    [`Canvas`], applying per-layer [`Tinter`] remaps.
//! 4. **Encode**: the canvas is serialized with format-specific options
//!    (quantized/paletted PNG, JPEG quality, WebP).
//!
//! Each submitted job runs as exactly one task on a [`BlendPool`] worker;
//! the caller gets a [`JobHandle`] immediately and the result exactly once.
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Bit-exact compositing**: the integer blend formula and the HSL tint
//!   round-trip produce byte-identical output across releases.
//! - **No IO in the engine**: layers arrive as in-memory buffers and results
//!   leave as in-memory buffers.
#![forbid(unsafe_code)]

mod blend;
mod canvas;
mod color;
mod decode;
mod encode;
mod error;
mod layer;
mod options;
mod pool;
mod quant;

pub use blend::BlendOutput;
pub use canvas::{Canvas, Pixel, pack, unpack};
pub use color::{Tinter, hsl_to_rgb, rgb_to_hsl, tint_pixel};
pub use decode::{DecodedLayer, DefaultDecoder, LayerDecoder, LayerInfo};
pub use error::{BlendError, BlendResult};
pub use layer::Layer;
pub use options::{
    BlendOptions, FormatKind, Palette, PngEncoderKind, QuantMode, ResolvedOptions, TintSpec,
};
pub use pool::{BlendPool, JobHandle, blend};
