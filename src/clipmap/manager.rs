use crate::{
    clipmap::{Block, ClipmapLevel, Quadrant},
    config::ClipmapConfig,
    math::Aabb,
    mesh::BlockType,
    streaming::WindowUpdate,
};
use bevy::prelude::*;
use itertools::iproduct;

/// Places the clipmap levels around the viewer and emits the blocks that tile them.
pub struct ClipmapLevelManager {
    levels: Vec<ClipmapLevel>,
    block_size: u32,
    texture_size: u32,
    /// The world space height range of the terrain, used for the block bounds.
    height_range: (f32, f32),
}

impl ClipmapLevelManager {
    pub fn new(config: &ClipmapConfig, height_range: (f32, f32)) -> Self {
        let levels = (0..config.level_count)
            .map(|index| ClipmapLevel::new(index, config.step(index), config.block_size))
            .collect();

        Self {
            levels,
            block_size: config.block_size,
            texture_size: config.texture_size,
            height_range,
        }
    }

    pub fn levels(&self) -> &[ClipmapLevel] {
        &self.levels
    }

    pub fn level(&self, index: u32) -> &ClipmapLevel {
        &self.levels[index as usize]
    }

    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Snaps every level to the viewer and returns the blocks of all levels, finest first.
    ///
    /// Within a level, the bodies come first, then the fixups, the trims around the
    /// finer level and finally the skirt towards the coarser level.
    pub fn update(&mut self, viewer: Vec3) -> Vec<Block> {
        let viewer = IVec2::new(viewer.x.floor() as i32, viewer.z.floor() as i32);

        for level in &mut self.levels {
            let origin = level.snap(viewer);
            level.place(origin, self.texture_size);
        }

        let mut blocks = Vec::with_capacity(self.levels.len() * 20);

        for index in 0..self.levels.len() {
            self.emit_level(index, &mut blocks);
        }

        blocks
    }

    /// The texture window moves caused by the last updates, in level order.
    pub fn take_window_updates(&mut self) -> Vec<WindowUpdate> {
        self.levels
            .iter_mut()
            .filter_map(ClipmapLevel::take_dirty)
            .collect()
    }

    fn emit_level(&self, index: usize, blocks: &mut Vec<Block>) {
        let level = &self.levels[index];
        let m = self.block_size as i32;
        let offsets = [0, m - 1, 2 * m, 3 * m - 1];

        let mut push = |block_type: BlockType, x: i32, z: i32, quadrant: Option<Quadrant>| {
            blocks.push(self.block(level, block_type, IVec2::new(x, z), quadrant));
        };

        for (z, x) in iproduct!(0..4, 0..4) {
            let interior = (1..=2).contains(&x) && (1..=2).contains(&z);

            if index == 0 || !interior {
                push(BlockType::Body, offsets[x], offsets[z], None);
            }
        }

        for z in [0, 3 * m - 1] {
            push(BlockType::FixupVertical, 2 * m - 2, z, None);
        }
        for x in [0, 3 * m - 1] {
            push(BlockType::FixupHorizontal, x, 2 * m - 2, None);
        }

        if index == 0 {
            // the finest level closes the centre of the fixup cross itself
            for z in [m - 1, 2 * m] {
                push(BlockType::FixupVertical, 2 * m - 2, z, None);
            }
            for z in [2 * m - 2, 2 * m - 1] {
                push(BlockType::TrimHorizontal, m - 1, z, None);
            }
        } else {
            // the finer level sits in the low or high part of the hole
            let parity = self.levels[index - 1].origin - level.origin;
            let quadrant = Quadrant::new(parity.x == 0, parity.y == 0);

            let trim_x = if quadrant.high_x() { 3 * m - 2 } else { m - 1 };
            let trim_z = if quadrant.high_z() { 3 * m - 2 } else { m - 1 };
            let vertical_z = if quadrant.high_z() { m - 1 } else { m };

            push(BlockType::TrimHorizontal, m - 1, trim_z, Some(quadrant));
            push(BlockType::TrimVertical, trim_x, vertical_z, Some(quadrant));
        }

        if index + 1 < self.levels.len() {
            push(BlockType::DegenerateSkirt, 0, 0, None);
        }
    }

    /// Places a block at a vertex offset relative to the level's first vertex.
    fn block(
        &self,
        level: &ClipmapLevel,
        block_type: BlockType,
        local: IVec2,
        quadrant: Option<Quadrant>,
    ) -> Block {
        let offset = level.min_corner() + local * level.step;
        let extent = (block_type.vertex_extent(self.block_size).as_ivec2() - IVec2::ONE) * level.step;
        let (min_height, max_height) = self.height_range;

        Block {
            block_type,
            level: level.index,
            offset,
            quadrant,
            aabb: Aabb::new(
                Vec3::new(offset.x as f32, min_height, offset.y as f32),
                Vec3::new(
                    (offset.x + extent.x) as f32,
                    max_height,
                    (offset.y + extent.y) as f32,
                ),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::Exposure;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn manager(level_count: u32, block_size: u32) -> ClipmapLevelManager {
        ClipmapLevelManager::new(&ClipmapConfig::new(level_count, block_size), (-1.0, 1.0))
    }

    /// Counts how often each quad of the level is covered by its own blocks and the finer level.
    fn coverage(manager: &ClipmapLevelManager, blocks: &[Block], index: u32) -> Vec<u32> {
        let level = manager.level(index);
        let quads = (4 * manager.block_size - 2) as i32;
        let mut counts = vec![0; (quads * quads) as usize];

        let mut cover = |min: IVec2, size: IVec2| {
            for (z, x) in iproduct!(min.y..min.y + size.y, min.x..min.x + size.x) {
                assert!((0..quads).contains(&x) && (0..quads).contains(&z));
                counts[(z * quads + x) as usize] += 1;
            }
        };

        for block in blocks.iter().filter(|block| block.level == index) {
            if block.block_type == BlockType::DegenerateSkirt {
                continue;
            }

            let local = block.offset - level.min_corner();
            assert_eq!(local % level.step, IVec2::ZERO);

            let extent = block.block_type.vertex_extent(manager.block_size).as_ivec2();
            cover(local / level.step, extent - IVec2::ONE);
        }

        if index > 0 {
            let finer = manager.level(index - 1);
            let local = finer.min_corner() - level.min_corner();
            assert_eq!(local % level.step, IVec2::ZERO);

            cover(local / level.step, IVec2::splat(2 * manager.block_size as i32 - 1));
        }

        counts
    }

    #[test]
    fn origins_snap_to_twice_the_step() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut manager = manager(6, 8);

        for _ in 0..100 {
            let viewer = Vec3::new(
                rng.random_range(-5000.0..5000.0),
                0.0,
                rng.random_range(-5000.0..5000.0),
            );
            manager.update(viewer);

            for level in manager.levels() {
                let granularity = 2 * level.step;
                let distance = Vec2::new(viewer.x, viewer.z) - level.origin.as_vec2();

                assert_eq!(level.origin % granularity, IVec2::ZERO);
                assert!(distance.min_element() >= 0.0);
                assert!(distance.max_element() < granularity as f32);
            }
        }
    }

    #[test]
    fn levels_tile_without_gaps_or_overlaps() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut manager = manager(5, 8);

        for _ in 0..50 {
            let viewer = Vec3::new(
                rng.random_range(-300.0..300.0),
                rng.random_range(0.0..10.0),
                rng.random_range(-300.0..300.0),
            );
            let blocks = manager.update(viewer);

            for index in 0..manager.level_count() {
                let counts = coverage(&manager, &blocks, index);

                assert!(
                    counts.iter().all(|&count| count == 1),
                    "level {index} is not tiled exactly for a viewer at {viewer}"
                );
            }
        }
    }

    #[test]
    fn finer_levels_nest_inside_the_coarser_hole() {
        let mut manager = manager(4, 8);
        manager.update(Vec3::new(-13.7, 0.0, 42.2));

        for index in 1..manager.level_count() {
            let coarse = manager.level(index).footprint();
            let fine = manager.level(index - 1).footprint();
            let margin = (fine.min - coarse.min) / manager.level(index).step;

            assert!(coarse.contains(fine.min) && coarse.contains(fine.max));
            assert!(margin.cmpge(IVec2::splat(7)).all() && margin.cmple(IVec2::splat(8)).all());
        }
    }

    #[test]
    fn reference_configuration_emits_one_seam_per_level_pair() {
        let mut manager =
            ClipmapLevelManager::new(&ClipmapConfig::default(), (0.0, 100.0));
        let blocks = manager.update(Vec3::new(1234.5, 80.0, -987.25));

        let count = |block_type: BlockType| {
            blocks
                .iter()
                .filter(|block| block.block_type == block_type && block.quadrant.is_some())
                .count()
        };
        let skirts = blocks
            .iter()
            .filter(|block| block.block_type == BlockType::DegenerateSkirt)
            .count();

        assert_eq!(count(BlockType::TrimHorizontal), 9);
        assert_eq!(count(BlockType::TrimVertical), 9);
        assert_eq!(skirts, 9);
        assert_eq!(blocks.len(), 25 + 8 * 19 + 18);
        assert!(blocks.windows(2).all(|pair| pair[0].level <= pair[1].level));
    }

    #[test]
    fn single_step_moves_update_only_the_finest_level() {
        let mut manager = manager(10, 64);
        manager.update(Vec3::new(0.5, 0.0, 0.5));

        let initial = manager.take_window_updates();
        assert_eq!(initial.len(), 10);
        assert!(initial.iter().all(|update| update.exposure == Exposure::Full));

        manager.update(Vec3::new(2.5, 0.0, 0.5));
        let updates = manager.take_window_updates();

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].level, 0);
        assert_eq!(updates[0].texel_count(256), 256 * 2);

        manager.update(Vec3::new(2.9, 0.0, 0.5));
        assert!(manager.take_window_updates().is_empty());
    }

    #[test]
    fn bounds_follow_the_height_range() {
        let mut manager = manager(2, 8);
        let blocks = manager.update(Vec3::ZERO);

        let body = &blocks[0];
        assert_eq!(body.offset, IVec2::splat(-14));
        assert_eq!(body.aabb.min, Vec3::new(-14.0, -1.0, -14.0));
        assert_eq!(body.aabb.max, Vec3::new(-7.0, 1.0, -7.0));

        let skirt = blocks
            .iter()
            .find(|block| block.block_type == BlockType::DegenerateSkirt)
            .unwrap();
        assert_eq!(skirt.aabb.max.x - skirt.aabb.min.x, 30.0);
    }
}
