use crate::{
    math::snap_down_2d,
    streaming::{Exposure, WindowUpdate},
};
use bevy::math::{IRect, IVec2};

/// The placement state of one clipmap level.
#[derive(Clone, Debug)]
pub struct ClipmapLevel {
    pub index: u32,
    /// The world space distance between two vertices.
    pub step: i32,
    /// The snapped world space origin, always a multiple of twice the step.
    pub origin: IVec2,
    pub previous_origin: Option<IVec2>,
    /// The window move not yet handed to the streamer.
    pub dirty: Option<WindowUpdate>,
    streamed_anchor: Option<IVec2>,
    placed: bool,
    block_size: i32,
}

impl ClipmapLevel {
    pub fn new(index: u32, step: i32, block_size: u32) -> Self {
        Self {
            index,
            step,
            origin: IVec2::ZERO,
            previous_origin: None,
            dirty: None,
            streamed_anchor: None,
            placed: false,
            block_size: block_size as i32,
        }
    }

    /// The origin of the level for a viewer at the given world position.
    #[inline]
    pub fn snap(&self, viewer: IVec2) -> IVec2 {
        snap_down_2d(viewer, 2 * self.step)
    }

    /// The world position of the level's first vertex.
    #[inline]
    pub fn min_corner(&self) -> IVec2 {
        self.origin - IVec2::splat(2 * (self.block_size - 1) * self.step)
    }

    /// The first vertex in level grid coordinates, which is also the texture window's anchor.
    #[inline]
    pub fn grid_min(&self) -> IVec2 {
        self.min_corner() / self.step
    }

    /// Half of the level's side length in world units.
    #[inline]
    pub fn half_extent(&self) -> f32 {
        ((2 * self.block_size - 1) * self.step) as f32
    }

    /// The covered world space area, from the first to the last vertex.
    pub fn footprint(&self) -> IRect {
        let min = self.min_corner();
        IRect::from_corners(min, min + IVec2::splat((4 * self.block_size - 2) * self.step))
    }

    /// Moves the level to `origin` and records the resulting texture window move.
    ///
    /// The move is measured against the window of the last taken update, so an
    /// update that was never taken is folded into the next one.
    pub(crate) fn place(&mut self, origin: IVec2, texture_size: u32) {
        if self.placed && origin == self.origin {
            return;
        }

        if self.placed {
            self.previous_origin = Some(self.origin);
        }
        self.origin = origin;
        self.placed = true;

        let update = WindowUpdate::between(
            self.index,
            self.streamed_anchor,
            self.grid_min(),
            texture_size,
        );
        self.dirty = (update.exposure != Exposure::None).then_some(update);
    }

    /// Hands out the pending window move, if any.
    pub fn take_dirty(&mut self) -> Option<WindowUpdate> {
        let update = self.dirty.take()?;
        self.streamed_anchor = Some(update.anchor);
        Some(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_snap_to_twice_the_step() {
        let level = ClipmapLevel::new(2, 4, 8);

        assert_eq!(level.snap(IVec2::new(7, -1)), IVec2::new(0, -8));
        assert_eq!(level.snap(IVec2::new(8, 15)), IVec2::new(8, 8));
    }

    #[test]
    fn footprint_surrounds_the_origin() {
        let mut level = ClipmapLevel::new(1, 2, 8);
        level.place(IVec2::new(4, -4), 64);

        assert_eq!(level.min_corner(), IVec2::new(4 - 28, -4 - 28));
        assert_eq!(level.grid_min(), IVec2::new(-12, -16));
        assert_eq!(level.footprint().size(), IVec2::splat(60));
        assert_eq!(level.footprint().center(), level.origin + IVec2::splat(2));
        assert_eq!(level.half_extent(), 30.0);
    }

    #[test]
    fn placement_records_window_moves() {
        let mut level = ClipmapLevel::new(0, 1, 8);

        level.place(IVec2::ZERO, 32);
        assert_eq!(level.take_dirty().unwrap().exposure, Exposure::Full);

        level.place(IVec2::ZERO, 32);
        assert!(level.take_dirty().is_none());

        level.place(IVec2::new(2, 0), 32);
        let update = level.take_dirty().unwrap();
        assert_eq!(update.anchor, IVec2::new(2 - 14, -14));
        assert_eq!(update.texel_count(32), 2 * 32);
        assert_eq!(level.previous_origin, Some(IVec2::ZERO));
    }

    #[test]
    fn untaken_moves_are_merged() {
        let mut level = ClipmapLevel::new(0, 1, 8);
        level.place(IVec2::ZERO, 32);
        level.take_dirty();

        level.place(IVec2::new(2, 0), 32);
        level.place(IVec2::new(4, 2), 32);
        let update = level.take_dirty().unwrap();

        assert_eq!(update.texel_count(32), 4 * 32 + 28 * 2);

        level.place(IVec2::new(0, 0), 32);
        assert_eq!(level.take_dirty().unwrap().texel_count(32), 4 * 32 + 28 * 2);
    }
}
