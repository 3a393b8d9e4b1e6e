use crate::{config::ClipmapConfig, device::HeightTexel, streaming::HeightField};
use bevy::math::IVec2;
use itertools::iproduct;
use std::sync::Arc;

/// Turns level grid coordinates into the texels stored in the height texture.
///
/// Level 0 draws the raw heights of the source. Coarser levels point sample its low
/// pass companion, which keeps them from aliasing. The second channel of a texel holds
/// the surface the next coarser level draws at the same position: its vertex where both
/// coordinates are even, and the mean of the neighbouring coarse vertices elsewhere.
/// Morphing a level fully into this channel therefore lines it up with its parent.
#[derive(Clone, Debug)]
pub struct LevelSampler {
    source: Arc<HeightField>,
    /// Source samples per level grid step.
    strides: Vec<i64>,
}

impl LevelSampler {
    pub fn new(config: &ClipmapConfig, source: Arc<HeightField>) -> Self {
        let strides = (0..config.level_count)
            .map(|level| config.step(level) as i64 / config.source_spacing as i64)
            .collect();

        Self { source, strides }
    }

    pub fn source(&self) -> &HeightField {
        &self.source
    }

    pub fn level_count(&self) -> u32 {
        self.strides.len() as u32
    }

    /// The height of the level's vertex at the grid coordinate.
    pub fn height(&self, level: u32, grid: IVec2) -> f32 {
        let stride = self.strides[level as usize];
        let (x, z) = (grid.x as i64 * stride, grid.y as i64 * stride);

        if level == 0 {
            self.source.height(x, z)
        } else {
            self.source.low_pass_height(x, z)
        }
    }

    /// The height of the next coarser level's surface at a grid coordinate of `level`.
    /// The coarsest level has no parent and blends into itself.
    pub fn coarser_height(&self, level: u32, grid: IVec2) -> f32 {
        let coarser = level + 1;

        if coarser >= self.level_count() {
            return self.height(level, grid);
        }

        let base = grid.div_euclid(IVec2::splat(2));
        let odd = grid - base * 2;

        let count = (odd.x + 1) * (odd.y + 1);
        let sum: f32 = iproduct!(0..=odd.y, 0..=odd.x)
            .map(|(z, x)| self.height(coarser, base + IVec2::new(x, z)))
            .sum();

        sum / count as f32
    }

    #[inline]
    pub fn texel(&self, level: u32, grid: IVec2) -> HeightTexel {
        [self.height(level, grid), self.coarser_height(level, grid)]
    }
}
