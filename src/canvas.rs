use crate::error::{BlendError, BlendResult};

/// A packed RGBA pixel: `a << 24 | b << 16 | g << 8 | r`.
///
/// On a little-endian machine this is byte order `[r, g, b, a]`, which is
/// what decoders hand us and what encoders expect. The word-level layout is
/// observable in the compositor's alpha short-circuits, so it is fixed here
/// and converted to raw bytes only at the codec boundary.
pub type Pixel = u32;

pub fn pack(r: u8, g: u8, b: u8, a: u8) -> Pixel {
    (a as u32) << 24 | (b as u32) << 16 | (g as u32) << 8 | r as u32
}

pub fn unpack(px: Pixel) -> (u8, u8, u8, u8) {
    (
        (px & 0xff) as u8,
        ((px >> 8) & 0xff) as u8,
        ((px >> 16) & 0xff) as u8,
        ((px >> 24) & 0xff) as u8,
    )
}

/// An owned RGBA canvas.
///
/// Invariant: `pixels.len() == width * height`, and both dimensions are
/// non-zero. The buffer is released when the canvas goes out of scope on any
/// exit path of a blend job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<Pixel>,
}

impl Canvas {
    /// Allocate a zeroed (fully transparent) canvas.
    pub fn new(width: u32, height: u32) -> BlendResult<Self> {
        if width == 0 || height == 0 {
            return Err(BlendError::dimension(format!(
                "Image dimensions {width}x{height} are invalid"
            )));
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| {
                BlendError::allocation(format!("canvas {width}x{height} overflows usize"))
            })?;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|e| BlendError::allocation(format!("canvas buffer {width}x{height}: {e}")))?;
        pixels.resize(len, 0);
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build a canvas from straight-alpha RGBA bytes (decoder output order).
    pub fn from_rgba8(width: u32, height: u32, bytes: &[u8]) -> BlendResult<Self> {
        let mut canvas = Self::new(width, height)?;
        if bytes.len() != canvas.pixels.len() * 4 {
            return Err(BlendError::decode(format!(
                "decoded buffer is {} bytes, expected {} for {width}x{height}",
                bytes.len(),
                canvas.pixels.len() * 4
            )));
        }
        for (px, chunk) in canvas.pixels.iter_mut().zip(bytes.chunks_exact(4)) {
            *px = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(canvas)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }

    pub fn fill(&mut self, pixel: Pixel) {
        self.pixels.fill(pixel);
    }

    /// Straight-alpha RGBA bytes for the encoders.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for &px in &self.pixels {
            out.extend_from_slice(&px.to_le_bytes());
        }
        out
    }

    /// RGB bytes with the alpha channel dropped (JPEG path).
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 3);
        for &px in &self.pixels {
            let (r, g, b, _) = unpack(px);
            out.extend_from_slice(&[r, g, b]);
        }
        out
    }
}
