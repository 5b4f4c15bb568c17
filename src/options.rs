//! Strongly typed blend options and their synchronous validation.
//!
//! Everything here is cheap shape/range checking: no layer is decoded before
//! [`BlendOptions::resolve`] has accepted the request.

use std::str::FromStr;

use crate::canvas::pack;
use crate::color::Tinter;
use crate::error::{BlendError, BlendResult};
use crate::layer::Layer;

/// Output raster format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    Webp,
}

impl FromStr for FormatKind {
    type Err = BlendError;

    fn from_str(s: &str) -> BlendResult<Self> {
        match s {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            other => Err(BlendError::validation(format!(
                "unknown output format '{other}'"
            ))),
        }
    }
}

/// Palette reduction algorithm for quantized PNG output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantMode {
    #[serde(alias = "o")]
    Octree,
    #[default]
    #[serde(alias = "h")]
    Hextree,
}

impl FromStr for QuantMode {
    type Err = BlendError;

    fn from_str(s: &str) -> BlendResult<Self> {
        match s {
            "octree" | "o" => Ok(Self::Octree),
            "hextree" | "h" => Ok(Self::Hextree),
            other => Err(BlendError::validation(format!(
                "unknown quantization mode '{other}'"
            ))),
        }
    }
}

/// Interchangeable PNG backends. They differ only in the compression range
/// they accept: the default codec takes `0..=9`, the miniz-style one `0..=10`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngEncoderKind {
    #[default]
    Default,
    Miniz,
}

impl FromStr for PngEncoderKind {
    type Err = BlendError;

    fn from_str(s: &str) -> BlendResult<Self> {
        match s {
            "default" => Ok(Self::Default),
            "miniz" => Ok(Self::Miniz),
            other => Err(BlendError::validation(format!(
                "unknown png encoder '{other}'"
            ))),
        }
    }
}

/// A fixed palette for indexed PNG output, as RGBA entries.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Palette(pub Vec<[u8; 4]>);

/// Serde-facing tint description: each axis is an optional `[from, to]` pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TintSpec {
    pub h: Option<[f64; 2]>,
    pub s: Option<[f64; 2]>,
    pub l: Option<[f64; 2]>,
    pub a: Option<[f64; 2]>,
    pub debug: bool,
}

impl From<TintSpec> for Tinter {
    fn from(spec: TintSpec) -> Self {
        let mut tint = Tinter {
            debug: spec.debug,
            ..Tinter::default()
        };
        if let Some([h0, h1]) = spec.h {
            tint.h0 = h0;
            tint.h1 = h1;
        }
        if let Some([s0, s1]) = spec.s {
            tint.s0 = s0;
            tint.s1 = s1;
        }
        if let Some([l0, l1]) = spec.l {
            tint.l0 = l0;
            tint.l1 = l1;
        }
        if let Some([a0, a1]) = spec.a {
            tint.a0 = a0;
            tint.a1 = a1;
        }
        tint
    }
}

/// Caller-facing blend options. Zero means "unset" for `quality`, `width`
/// and `height`; `-1` means "unset" for `compression`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlendOptions {
    pub quality: i32,
    pub format: FormatKind,
    pub reencode: bool,
    pub width: i32,
    pub height: i32,
    /// Background fill as `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
    pub matte: Option<String>,
    pub palette: Option<Palette>,
    pub mode: QuantMode,
    pub encoder: PngEncoderKind,
    pub compression: i32,
}

impl Default for BlendOptions {
    fn default() -> Self {
        Self {
            quality: 0,
            format: FormatKind::Png,
            reencode: false,
            width: 0,
            height: 0,
            matte: None,
            palette: None,
            mode: QuantMode::Hextree,
            encoder: PngEncoderKind::Default,
            compression: -1,
        }
    }
}

/// Options after validation: matte parsed into a packed pixel, quality
/// defaults applied, reencode forced where tints or a matte demand it.
#[derive(Clone, Debug)]
pub struct ResolvedOptions {
    pub quality: i32,
    pub format: FormatKind,
    pub reencode: bool,
    pub width: i32,
    pub height: i32,
    pub matte: u32,
    pub palette: Option<Palette>,
    pub mode: QuantMode,
    pub encoder: PngEncoderKind,
    pub compression: i32,
}

impl BlendOptions {
    /// Validate this request against its layers. Runs synchronously on the
    /// caller's thread and touches no pixel data.
    pub fn resolve(&self, layers: &[Layer]) -> BlendResult<ResolvedOptions> {
        let mut quality = self.quality;
        match self.format {
            FormatKind::Jpeg => {
                if quality == 0 {
                    quality = 80;
                } else if !(0..=100).contains(&quality) {
                    return Err(BlendError::validation("JPEG quality is range 0-100"));
                }
            }
            FormatKind::Webp => {
                if quality == 0 {
                    quality = 80;
                } else if !(0..=100).contains(&quality) {
                    return Err(BlendError::validation("WebP quality is range 0-100"));
                }
            }
            FormatKind::Png => {
                if quality < 0 || quality == 1 || quality > 256 {
                    return Err(BlendError::validation(
                        "PNG images must be quantized between 2 and 256 colors",
                    ));
                }
            }
        }

        if self.width < 0 || self.height < 0 {
            return Err(BlendError::validation(
                "Image dimensions must be greater than 0",
            ));
        }

        let mut reencode = self.reencode;
        let matte = match self.matte.as_deref() {
            Some(s) => {
                let matte = parse_matte(s)?;
                if matte != 0 {
                    reencode = true;
                }
                matte
            }
            None => 0,
        };
        if layers.iter().any(|l| l.tint.is_some()) {
            reencode = true;
        }

        let (min_compression, max_compression) = match self.format {
            FormatKind::Png => match self.encoder {
                PngEncoderKind::Default => (0, 9),
                PngEncoderKind::Miniz => (0, 10),
            },
            FormatKind::Webp => (0, 6),
            // Compression is meaningless for JPEG; accept a zlib-shaped
            // range and ignore the value.
            FormatKind::Jpeg => (0, 9),
        };
        if self.compression > max_compression {
            return Err(BlendError::validation(format!(
                "Compression level must be between {min_compression} and {max_compression}"
            )));
        }

        if let Some(palette) = &self.palette
            && !(2..=256).contains(&palette.0.len())
        {
            return Err(BlendError::validation(
                "palette must contain between 2 and 256 colors",
            ));
        }

        if layers.is_empty() {
            if !reencode {
                return Err(BlendError::validation(
                    "at least one input layer is required",
                ));
            }
            if self.width <= 0 || self.height <= 0 {
                return Err(BlendError::validation(
                    "without input layers, width and height must be specified",
                ));
            }
        }

        Ok(ResolvedOptions {
            quality,
            format: self.format,
            reencode,
            width: self.width,
            height: self.height,
            matte,
            palette: self.palette.clone(),
            mode: self.mode,
            encoder: self.encoder,
            compression: self.compression,
        })
    }
}

/// Parse `#RRGGBB` / `#RRGGBBAA` (leading `#` optional) into the packed
/// canvas pixel layout. Six-digit mattes are fully opaque.
fn parse_matte(s: &str) -> BlendResult<u32> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    let bad = || BlendError::validation(format!("invalid matte '{s}'"));
    match hex.len() {
        6 => {
            let v = u32::from_str_radix(hex, 16).map_err(|_| bad())?;
            Ok(pack(
                (v >> 16) as u8,
                (v >> 8) as u8,
                v as u8,
                0xff,
            ))
        }
        8 => {
            let v = u32::from_str_radix(hex, 16).map_err(|_| bad())?;
            Ok(pack(
                (v >> 24) as u8,
                (v >> 16) as u8,
                (v >> 8) as u8,
                v as u8,
            ))
        }
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> Layer {
        Layer::new(vec![0u8; 4])
    }

    #[test]
    fn jpeg_quality_defaults_to_80() {
        let opts = BlendOptions {
            format: FormatKind::Jpeg,
            ..BlendOptions::default()
        };
        assert_eq!(opts.resolve(&[layer()]).unwrap().quality, 80);
    }

    #[test]
    fn webp_quality_defaults_to_80() {
        let opts = BlendOptions {
            format: FormatKind::Webp,
            ..BlendOptions::default()
        };
        assert_eq!(opts.resolve(&[layer()]).unwrap().quality, 80);
    }

    #[test]
    fn jpeg_quality_out_of_range_is_rejected() {
        let opts = BlendOptions {
            format: FormatKind::Jpeg,
            quality: 101,
            ..BlendOptions::default()
        };
        assert!(matches!(
            opts.resolve(&[layer()]),
            Err(BlendError::Validation(_))
        ));
    }

    #[test]
    fn png_quality_one_is_rejected() {
        let opts = BlendOptions {
            quality: 1,
            ..BlendOptions::default()
        };
        let err = opts.resolve(&[layer()]).unwrap_err();
        assert!(err.to_string().contains("quantized between 2 and 256"));
    }

    #[test]
    fn png_quality_257_is_rejected() {
        let opts = BlendOptions {
            quality: 257,
            ..BlendOptions::default()
        };
        assert!(opts.resolve(&[layer()]).is_err());
    }

    #[test]
    fn negative_dimensions_are_rejected() {
        let opts = BlendOptions {
            width: -1,
            ..BlendOptions::default()
        };
        assert!(matches!(
            opts.resolve(&[layer()]),
            Err(BlendError::Validation(_))
        ));
    }

    #[test]
    fn matte_parses_and_forces_reencode() {
        let opts = BlendOptions {
            matte: Some("#336699".to_string()),
            ..BlendOptions::default()
        };
        let resolved = opts.resolve(&[layer()]).unwrap();
        assert_eq!(resolved.matte, pack(0x33, 0x66, 0x99, 0xff));
        assert!(resolved.reencode);
    }

    #[test]
    fn matte_with_alpha_and_no_hash() {
        let opts = BlendOptions {
            matte: Some("11223344".to_string()),
            ..BlendOptions::default()
        };
        let resolved = opts.resolve(&[layer()]).unwrap();
        assert_eq!(resolved.matte, pack(0x11, 0x22, 0x33, 0x44));
    }

    #[test]
    fn malformed_matte_is_rejected() {
        for bad in ["#12345", "zzzzzz", "#1234567", ""] {
            let opts = BlendOptions {
                matte: Some(bad.to_string()),
                ..BlendOptions::default()
            };
            assert!(opts.resolve(&[layer()]).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn tint_forces_reencode() {
        let tinted = Layer::new(vec![0u8; 4]).with_tint(Tinter::default());
        let resolved = BlendOptions::default().resolve(&[tinted]).unwrap();
        assert!(resolved.reencode);
    }

    #[test]
    fn compression_ranges_per_format_and_encoder() {
        let png = BlendOptions {
            compression: 10,
            ..BlendOptions::default()
        };
        assert!(png.resolve(&[layer()]).is_err());

        let miniz = BlendOptions {
            compression: 10,
            encoder: PngEncoderKind::Miniz,
            ..BlendOptions::default()
        };
        assert!(miniz.resolve(&[layer()]).is_ok());

        let webp = BlendOptions {
            format: FormatKind::Webp,
            compression: 7,
            ..BlendOptions::default()
        };
        let err = webp.resolve(&[layer()]).unwrap_err();
        assert!(err.to_string().contains("between 0 and 6"));
    }

    #[test]
    fn empty_layers_require_reencode_and_dimensions() {
        assert!(BlendOptions::default().resolve(&[]).is_err());

        let no_dims = BlendOptions {
            reencode: true,
            ..BlendOptions::default()
        };
        assert!(no_dims.resolve(&[]).is_err());

        let ok = BlendOptions {
            reencode: true,
            width: 4,
            height: 4,
            ..BlendOptions::default()
        };
        assert!(ok.resolve(&[]).is_ok());
    }

    #[test]
    fn format_and_mode_accept_short_forms() {
        assert_eq!("jpg".parse::<FormatKind>().unwrap(), FormatKind::Jpeg);
        assert_eq!("o".parse::<QuantMode>().unwrap(), QuantMode::Octree);
        assert_eq!("h".parse::<QuantMode>().unwrap(), QuantMode::Hextree);
        assert!("gif".parse::<FormatKind>().is_err());
    }

    #[test]
    fn options_deserialize_from_json() {
        let opts: BlendOptions = serde_json::from_str(
            r##"{"format":"jpg","quality":90,"mode":"o","matte":"#ffffff"}"##,
        )
        .unwrap();
        assert_eq!(opts.format, FormatKind::Jpeg);
        assert_eq!(opts.quality, 90);
        assert_eq!(opts.mode, QuantMode::Octree);

        let spec: TintSpec = serde_json::from_str(r#"{"h":[0.1,0.9],"debug":true}"#).unwrap();
        let tint: Tinter = spec.into();
        assert_eq!((tint.h0, tint.h1), (0.1, 0.9));
        assert!(tint.debug);
        assert!(tint.is_alpha_identity());
    }
}
