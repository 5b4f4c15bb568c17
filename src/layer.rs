use std::sync::Arc;

use crate::color::Tinter;

/// One input layer: encoded image bytes plus placement and an optional tint.
///
/// The byte buffer is reference-counted so a submitted job can outlive the
/// caller's copy without the caller giving up its own reference. Offsets may
/// be negative; the visible intersection is computed against the target
/// canvas when the job runs.
#[derive(Clone, Debug)]
pub struct Layer {
    pub bytes: Arc<[u8]>,
    pub x: i32,
    pub y: i32,
    pub tint: Option<Tinter>,
}

impl Layer {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
            x: 0,
            y: 0,
            tint: None,
        }
    }

    pub fn with_offset(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_tint(mut self, tint: Tinter) -> Self {
        self.tint = Some(tint);
        self
    }

    /// A plain layer is a bare buffer: no offset, no tint. Only plain layers
    /// qualify for the single-buffer pass-through at submit time.
    pub fn is_plain(&self) -> bool {
        self.x == 0 && self.y == 0 && self.tint.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_until_decorated() {
        let bytes: Vec<u8> = vec![1, 2, 3];
        assert!(Layer::new(bytes.clone()).is_plain());
        assert!(!Layer::new(bytes.clone()).with_offset(1, 0).is_plain());
        assert!(
            !Layer::new(bytes)
                .with_tint(Tinter::default())
                .is_plain()
        );
    }
}
