//! RGB↔HSL conversion and the per-layer tint remap.
//!
//! The arithmetic here is load-bearing: tile caches diff output bytes, so
//! the truncated hue constants and `floor(x + 0.5)` rounding must never
//! change between releases.

/// Convert 8-bit RGB to HSL with all three components in `[0, 1]`.
///
/// Hue is normalized by dividing by 6 rather than expressed in degrees.
pub fn rgb_to_hsl(red: u8, green: u8, blue: u8) -> (f64, f64, f64) {
    let r = red as f64 / 255.0;
    let g = green as f64 / 255.0;
    let b = blue as f64 / 255.0;
    let max = r.max(g.max(b));
    let min = r.min(g.min(b));
    let delta = max - min;
    let gamma = max + min;
    let mut h = 0.0;
    let mut s = 0.0;
    let l = gamma / 2.0;
    if delta > 0.0 {
        s = if l > 0.5 {
            delta / (2.0 - gamma)
        } else {
            delta / gamma
        };
        if r >= b && r > g {
            h = (g - b) / delta + if g < b { 6.0 } else { 0.0 };
        }
        if g >= r && g > b {
            h = (b - r) / delta + 2.0;
        }
        if b >= g && b > r {
            h = (r - g) / delta + 4.0;
        }
        h /= 6.0;
    }
    (h, s, l)
}

fn hue_to_rgb(m1: f64, m2: f64, mut h: f64) -> f64 {
    // poor man's fmod
    if h < 0.0 {
        h += 1.0;
    }
    if h > 1.0 {
        h -= 1.0;
    }
    if h * 6.0 < 1.0 {
        return m1 + (m2 - m1) * h * 6.0;
    }
    if h * 2.0 < 1.0 {
        return m2;
    }
    if h * 3.0 < 2.0 {
        return m1 + (m2 - m1) * (0.66666 - h) * 6.0;
    }
    m1
}

/// Convert HSL (each in `[0, 1]`) back to 8-bit RGB.
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    if s == 0.0 {
        let v = ((l * 255.0) + 0.5).floor() as u8;
        return (v, v, v);
    }
    let m2 = if l <= 0.5 { l * (s + 1.0) } else { l + s - l * s };
    let m1 = l * 2.0 - m2;
    let r = (hue_to_rgb(m1, m2, h + 0.33333) * 255.0 + 0.5).floor() as u8;
    let g = (hue_to_rgb(m1, m2, h) * 255.0 + 0.5).floor() as u8;
    let b = (hue_to_rgb(m1, m2, h - 0.33333) * 255.0 + 0.5).floor() as u8;
    (r, g, b)
}

/// An affine remap of a layer's hue, saturation, lightness and alpha ranges.
///
/// Each pair `(c0, c1)` maps a source component `c` to `c0 + c * (c1 - c0)`,
/// clamped to `[0, 1]`. The default is the identity mapping on every axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tinter {
    pub h0: f64,
    pub h1: f64,
    pub s0: f64,
    pub s1: f64,
    pub l0: f64,
    pub l1: f64,
    pub a0: f64,
    pub a1: f64,
    /// Emit per-layer tint diagnostics while blending.
    pub debug: bool,
}

impl Default for Tinter {
    fn default() -> Self {
        Self {
            h0: 0.0,
            h1: 1.0,
            s0: 0.0,
            s1: 1.0,
            l0: 0.0,
            l1: 1.0,
            a0: 0.0,
            a1: 1.0,
            debug: false,
        }
    }
}

impl Tinter {
    /// True when the hue/saturation/lightness pairs are all identity.
    /// The alpha pair is deliberately not part of this check.
    pub fn is_identity(&self) -> bool {
        self.h0 == 0.0
            && self.h1 == 1.0
            && self.s0 == 0.0
            && self.s1 == 1.0
            && self.l0 == 0.0
            && self.l1 == 1.0
    }

    pub fn is_alpha_identity(&self) -> bool {
        self.a0 == 0.0 && self.a1 == 1.0
    }
}

/// Remap one pixel's RGB channels through HSL space.
pub fn tint_pixel(r: &mut u8, g: &mut u8, b: &mut u8, tint: &Tinter) {
    let (h, s, l) = rgb_to_hsl(*r, *g, *b);
    let h2 = (tint.h0 + h * (tint.h1 - tint.h0)).clamp(0.0, 1.0);
    let s2 = (tint.s0 + s * (tint.s1 - tint.s0)).clamp(0.0, 1.0);
    let l2 = (tint.l0 + l * (tint.l1 - tint.l0)).clamp(0.0, 1.0);
    let (nr, ng, nb) = hsl_to_rgb(h2, s2, l2);
    *r = nr;
    *g = ng;
    *b = nb;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_colors_roundtrip() {
        assert_eq!(rgb_to_hsl(255, 0, 0), (0.0, 1.0, 0.5));
        assert_eq!(hsl_to_rgb(0.0, 1.0, 0.5), (255, 0, 0));

        let (h, s, l) = rgb_to_hsl(0, 255, 0);
        assert!((h - 2.0 / 6.0).abs() < 1e-12);
        assert_eq!((s, l), (1.0, 0.5));
        assert_eq!(hsl_to_rgb(h, s, l), (0, 255, 0));

        let (h, s, l) = rgb_to_hsl(0, 0, 255);
        assert!((h - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(hsl_to_rgb(h, s, l), (0, 0, 255));
    }

    #[test]
    fn grays_have_zero_saturation() {
        let (h, s, l) = rgb_to_hsl(128, 128, 128);
        assert_eq!((h, s), (0.0, 0.0));
        assert_eq!(hsl_to_rgb(h, s, l), (128, 128, 128));
    }

    #[test]
    fn desaturated_midpoint_rounds_up() {
        // l = 0.5 with s = 0 hits the floor(l*255 + 0.5) branch.
        assert_eq!(hsl_to_rgb(0.0, 0.0, 0.5), (128, 128, 128));
    }

    #[test]
    fn identity_tint_is_bit_stable() {
        let tint = Tinter::default();
        assert!(tint.is_identity());
        assert!(tint.is_alpha_identity());
        for &(r, g, b) in &[
            (0u8, 0u8, 0u8),
            (255, 255, 255),
            (255, 0, 0),
            (1, 2, 3),
            (37, 201, 99),
            (128, 128, 128),
        ] {
            let (mut r2, mut g2, mut b2) = (r, g, b);
            tint_pixel(&mut r2, &mut g2, &mut b2, &tint);
            assert_eq!((r2, g2, b2), (r, g, b), "({r},{g},{b}) drifted");
        }
    }

    #[test]
    fn alpha_pairs_do_not_affect_identity() {
        let tint = Tinter {
            a0: 0.2,
            a1: 0.8,
            ..Tinter::default()
        };
        assert!(tint.is_identity());
        assert!(!tint.is_alpha_identity());
    }

    #[test]
    fn lightness_collapse_forces_black() {
        let tint = Tinter {
            l0: 0.0,
            l1: 0.0,
            ..Tinter::default()
        };
        let (mut r, mut g, mut b) = (200u8, 100u8, 50u8);
        tint_pixel(&mut r, &mut g, &mut b, &tint);
        assert_eq!((r, g, b), (0, 0, 0));
    }
}
