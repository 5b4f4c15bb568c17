//! Palette quantization for indexed PNG output.
//!
//! Both reduction modes share one prefix-tree quantizer over channel bit
//! planes: octree branches on the top bits of R/G/B (8 children per level),
//! hextree adds the alpha bit plane (16 children per level) so distinct
//! transparency levels survive reduction. The tree is reduced bottom-up,
//! smallest-population subtrees first, until the leaf count fits the
//! requested palette size.

use crate::canvas::{Canvas, unpack};

/// Bit planes consumed per pixel. Six planes bound the node arena while
/// leaving plenty of precision for palettes of at most 256 entries.
const TREE_DEPTH: usize = 6;
const BRANCH: usize = 16;

/// Reduce the canvas to at most `max_colors` representative colors.
/// Returns the palette and one palette index per canvas pixel.
pub(crate) fn quantize(
    canvas: &Canvas,
    max_colors: u32,
    with_alpha: bool,
) -> (Vec<[u8; 4]>, Vec<u8>) {
    let mut tree = ColorTree::new(with_alpha);
    for &px in canvas.pixels() {
        tree.insert(px);
    }
    tree.reduce(max_colors as usize);
    let palette = tree.build_palette();
    let indices = canvas.pixels().iter().map(|&px| tree.index_of(px)).collect();
    (palette, indices)
}

/// Map every pixel to its nearest entry in a caller-supplied palette
/// (squared RGBA distance).
pub(crate) fn map_to_palette(canvas: &Canvas, palette: &[[u8; 4]]) -> Vec<u8> {
    canvas
        .pixels()
        .iter()
        .map(|&px| {
            let (r, g, b, a) = unpack(px);
            let mut best = 0usize;
            let mut best_dist = u32::MAX;
            for (i, entry) in palette.iter().enumerate() {
                let dist = sq(r, entry[0]) + sq(g, entry[1]) + sq(b, entry[2]) + sq(a, entry[3]);
                if dist < best_dist {
                    best_dist = dist;
                    best = i;
                }
            }
            best as u8
        })
        .collect()
}

fn sq(a: u8, b: u8) -> u32 {
    let d = a as i32 - b as i32;
    (d * d) as u32
}

#[derive(Clone)]
struct Node {
    children: [i32; BRANCH],
    count: u64,
    sum: [u64; 4],
    palette: i32,
}

impl Node {
    fn new() -> Self {
        Self {
            children: [-1; BRANCH],
            count: 0,
            sum: [0; 4],
            palette: -1,
        }
    }
}

struct ColorTree {
    nodes: Vec<Node>,
    // Interior nodes created at each depth; index 0 (the root) stays empty.
    levels: Vec<Vec<usize>>,
    leaves: usize,
    with_alpha: bool,
}

impl ColorTree {
    fn new(with_alpha: bool) -> Self {
        Self {
            nodes: vec![Node::new()],
            levels: vec![Vec::new(); TREE_DEPTH],
            leaves: 0,
            with_alpha,
        }
    }

    fn slot(&self, px: u32, depth: usize) -> usize {
        let bit = 7 - depth as u32;
        let (r, g, b, a) = unpack(px);
        let mut idx = ((((r >> bit) & 1) as usize) << 2)
            | ((((g >> bit) & 1) as usize) << 1)
            | (((b >> bit) & 1) as usize);
        if self.with_alpha {
            idx |= (((a >> bit) & 1) as usize) << 3;
        }
        idx
    }

    fn insert(&mut self, px: u32) {
        let mut node = 0usize;
        for depth in 0..TREE_DEPTH {
            let slot = self.slot(px, depth);
            let next = self.nodes[node].children[slot];
            node = if next < 0 {
                let id = self.nodes.len();
                self.nodes.push(Node::new());
                self.nodes[node].children[slot] = id as i32;
                if depth + 1 == TREE_DEPTH {
                    self.leaves += 1;
                } else {
                    self.levels[depth + 1].push(id);
                }
                id
            } else {
                next as usize
            };
        }
        let (r, g, b, a) = unpack(px);
        let n = &mut self.nodes[node];
        n.count += 1;
        n.sum[0] += r as u64;
        n.sum[1] += g as u64;
        n.sum[2] += b as u64;
        n.sum[3] += a as u64;
    }

    /// Fold deepest interior nodes into leaves until at most `max_colors`
    /// leaves remain. Folding stops above the root, so pathological targets
    /// can leave up to one branch-width of leaves; that is still well within
    /// an indexed PNG's 256-entry limit.
    fn reduce(&mut self, max_colors: usize) {
        let mut depth = TREE_DEPTH - 1;
        while self.leaves > max_colors && depth > 0 {
            if self.levels[depth].is_empty() {
                depth -= 1;
                continue;
            }
            let pos = self.levels[depth]
                .iter()
                .enumerate()
                .min_by_key(|&(_, &id)| self.subtree_count(id))
                .map(|(i, _)| i)
                .unwrap_or(0);
            let id = self.levels[depth].swap_remove(pos);
            self.fold(id);
        }
    }

    fn subtree_count(&self, id: usize) -> u64 {
        self.nodes[id]
            .children
            .iter()
            .filter(|&&c| c >= 0)
            .map(|&c| self.nodes[c as usize].count)
            .sum()
    }

    fn fold(&mut self, id: usize) {
        let children = self.nodes[id].children;
        let mut folded = 0usize;
        let mut count = 0u64;
        let mut sum = [0u64; 4];
        for child in children.iter().filter(|&&c| c >= 0) {
            let c = &self.nodes[*child as usize];
            count += c.count;
            for (acc, s) in sum.iter_mut().zip(c.sum.iter()) {
                *acc += s;
            }
            folded += 1;
        }
        let n = &mut self.nodes[id];
        n.children = [-1; BRANCH];
        n.count += count;
        for (acc, s) in n.sum.iter_mut().zip(sum.iter()) {
            *acc += s;
        }
        self.leaves = self.leaves - folded + 1;
    }

    fn build_palette(&mut self) -> Vec<[u8; 4]> {
        let mut palette = Vec::new();
        let mut stack = vec![0usize];
        while let Some(id) = stack.pop() {
            let children = self.nodes[id].children;
            if children.iter().all(|&c| c < 0) {
                let n = &mut self.nodes[id];
                let count = n.count.max(1);
                n.palette = palette.len() as i32;
                palette.push([
                    ((n.sum[0] + count / 2) / count) as u8,
                    ((n.sum[1] + count / 2) / count) as u8,
                    ((n.sum[2] + count / 2) / count) as u8,
                    ((n.sum[3] + count / 2) / count) as u8,
                ]);
            } else {
                for &c in children.iter().rev() {
                    if c >= 0 {
                        stack.push(c as usize);
                    }
                }
            }
        }
        palette
    }

    fn index_of(&self, px: u32) -> u8 {
        let mut node = 0usize;
        for depth in 0..TREE_DEPTH {
            if self.nodes[node].palette >= 0 {
                break;
            }
            let child = self.nodes[node].children[self.slot(px, depth)];
            if child < 0 {
                break;
            }
            node = child as usize;
        }
        self.nodes[node].palette.max(0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::pack;

    fn two_tone_canvas() -> Canvas {
        let mut canvas = Canvas::new(4, 4).unwrap();
        for (i, px) in canvas.pixels_mut().iter_mut().enumerate() {
            *px = if i % 2 == 0 {
                pack(255, 0, 0, 255)
            } else {
                pack(0, 0, 255, 255)
            };
        }
        canvas
    }

    #[test]
    fn few_colors_survive_exactly() {
        let canvas = two_tone_canvas();
        let (palette, indices) = quantize(&canvas, 16, false);
        assert!(palette.len() <= 16);
        assert_eq!(indices.len(), 16);
        for (px, idx) in canvas.pixels().iter().zip(indices.iter()) {
            let entry = palette[*idx as usize];
            let (r, g, b, _) = unpack(*px);
            assert_eq!((entry[0], entry[1], entry[2]), (r, g, b));
        }
    }

    #[test]
    fn reduction_respects_palette_budget() {
        let mut canvas = Canvas::new(16, 16).unwrap();
        for (i, px) in canvas.pixels_mut().iter_mut().enumerate() {
            *px = pack((i % 256) as u8, (i * 7 % 256) as u8, (i * 13 % 256) as u8, 255);
        }
        let (palette, indices) = quantize(&canvas, 8, false);
        assert!(palette.len() <= 16, "got {} colors", palette.len());
        assert!(indices.iter().all(|&i| (i as usize) < palette.len()));
    }

    #[test]
    fn hextree_keeps_alpha_distinct() {
        let mut canvas = Canvas::new(2, 1).unwrap();
        canvas.pixels_mut()[0] = pack(100, 100, 100, 255);
        canvas.pixels_mut()[1] = pack(100, 100, 100, 0);
        let (palette, indices) = quantize(&canvas, 4, true);
        let a0 = palette[indices[0] as usize][3];
        let a1 = palette[indices[1] as usize][3];
        assert_ne!(a0, a1);
    }

    #[test]
    fn fixed_palette_maps_to_nearest() {
        let canvas = two_tone_canvas();
        let palette = [[250, 5, 5, 255], [5, 5, 250, 255], [0, 255, 0, 255]];
        let indices = map_to_palette(&canvas, &palette);
        assert_eq!(indices[0], 0);
        assert_eq!(indices[1], 1);
    }
}
