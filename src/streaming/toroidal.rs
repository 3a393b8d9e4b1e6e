use crate::math::{rect_area, wrap};
use bevy::math::{IRect, IVec2, UVec2};

/// A contiguous rectangle of one level's toroidal texture, together with the
/// level grid coordinate of its first texel.
///
/// The texel at `origin + (x, z)` holds the sample of grid coordinate `source + (x, z)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRegion {
    pub level: u32,
    pub origin: UVec2,
    pub extent: UVec2,
    pub source: IVec2,
}

impl TileRegion {
    #[inline]
    pub fn texel_count(&self) -> u64 {
        self.extent.x as u64 * self.extent.y as u64
    }
}

/// The part of a level's texture window that has to be refreshed after a move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exposure {
    /// The window did not move.
    None,
    /// The window moved by a whole texture size or more, every texel is stale.
    Full,
    /// The newly exposed strips in level grid coordinates.
    Partial(Vec<IRect>),
}

/// A move of one level's texture window, derived from the level's new placement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowUpdate {
    pub level: u32,
    /// The new window origin in level grid coordinates.
    pub anchor: IVec2,
    pub exposure: Exposure,
}

impl WindowUpdate {
    /// A window seen for the first time is always exposed entirely.
    pub fn between(level: u32, previous: Option<IVec2>, anchor: IVec2, size: u32) -> Self {
        let exposure = match previous {
            None => Exposure::Full,
            Some(previous) => exposed_regions(previous, anchor, size),
        };

        Self {
            level,
            anchor,
            exposure,
        }
    }

    /// The count of texels that have to be refreshed.
    pub fn texel_count(&self, size: u32) -> u64 {
        match &self.exposure {
            Exposure::None => 0,
            Exposure::Full => size as u64 * size as u64,
            Exposure::Partial(strips) => strips.iter().map(|&strip| rect_area(strip)).sum(),
        }
    }
}

/// The texture window anchored at `anchor`, covering `size` texels per side.
#[inline]
pub fn window(anchor: IVec2, size: u32) -> IRect {
    IRect::from_corners(anchor, anchor + IVec2::splat(size as i32))
}

/// Computes the cells of the window at `current` that were not part of the window at `previous`.
///
///  previous    current
///  +-------+----+
///  |       |    |         a column strip of |dx| x size
///  |   +---+----+----+    and a row strip of (size - |dx|) x |dz|
///  |   |   | col|    |
///  +---+---+----+    |
///      |  row   |    |
///      +--------+----+
///
/// The two strips never overlap and together cover exactly the stale cells.
pub fn exposed_regions(previous: IVec2, current: IVec2, size: u32) -> Exposure {
    let delta = current - previous;
    let size = size as i32;

    if delta == IVec2::ZERO {
        return Exposure::None;
    }
    if delta.x.abs() >= size || delta.y.abs() >= size {
        return Exposure::Full;
    }

    let mut strips = Vec::with_capacity(2);

    // columns entering on the side the window moved towards
    let (column_min, column_max) = if delta.x > 0 {
        (previous.x + size, current.x + size)
    } else {
        (current.x, previous.x)
    };
    if delta.x != 0 {
        strips.push(IRect::new(column_min, current.y, column_max, current.y + size));
    }

    // the rows, minus the columns already covered above
    let (row_min, row_max) = if delta.y > 0 {
        (previous.y + size, current.y + size)
    } else {
        (current.y, previous.y)
    };
    let (row_left, row_right) = if delta.x > 0 {
        (current.x, previous.x + size)
    } else if delta.x < 0 {
        (previous.x, current.x + size)
    } else {
        (current.x, current.x + size)
    };
    if delta.y != 0 {
        strips.push(IRect::new(row_left, row_min, row_right, row_max));
    }

    Exposure::Partial(strips)
}

/// Splits a rectangle of level grid coordinates, at most `size` wide and high,
/// at the wrap boundaries of the toroidal texture.
///
/// Yields up to four regions, each of which is contiguous in the texture.
pub fn split_wrapped(level: u32, rect: IRect, size: u32) -> Vec<TileRegion> {
    let split_axis = |min: i32, max: i32| -> Vec<(i32, u32)> {
        let start = wrap(min, size);
        let length = (max - min) as u32;

        if start + length <= size {
            vec![(min, length)]
        } else {
            let first = size - start;
            vec![(min, first), (min + first as i32, length - first)]
        }
    };

    if rect.is_empty() {
        return Vec::new();
    }

    let columns = split_axis(rect.min.x, rect.max.x);
    let rows = split_axis(rect.min.y, rect.max.y);

    rows.iter()
        .flat_map(|&(z, height)| {
            columns.iter().map(move |&(x, width)| TileRegion {
                level,
                origin: UVec2::new(wrap(x, size), wrap(z, size)),
                extent: UVec2::new(width, height),
                source: IVec2::new(x, z),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::utils::HashSet;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn cells(rect: IRect) -> impl Iterator<Item = IVec2> {
        (rect.min.y..rect.max.y)
            .flat_map(move |z| (rect.min.x..rect.max.x).map(move |x| IVec2::new(x, z)))
    }

    #[test]
    fn exposed_strips_cover_exactly_the_stale_cells() {
        let mut rng = StdRng::seed_from_u64(7);
        let size = 16;

        for _ in 0..200 {
            let previous = IVec2::new(rng.random_range(-40..40), rng.random_range(-40..40));
            let current = previous + IVec2::new(rng.random_range(-15..16), rng.random_range(-15..16));

            let old = window(previous, size);
            let stale = cells(window(current, size))
                .filter(|&cell| !(cell.cmpge(old.min).all() && cell.cmplt(old.max).all()))
                .collect::<HashSet<_>>();

            let strips = match exposed_regions(previous, current, size) {
                Exposure::None => Vec::new(),
                Exposure::Partial(strips) => strips,
                Exposure::Full => panic!("partial move reported as full"),
            };

            let covered = strips.iter().flat_map(|&strip| cells(strip)).collect::<Vec<_>>();
            let unique = covered.iter().copied().collect::<HashSet<_>>();

            assert_eq!(covered.len(), unique.len(), "strips overlap");
            assert_eq!(unique, stale);
        }
    }

    #[test]
    fn large_moves_require_a_full_upload() {
        assert_eq!(
            exposed_regions(IVec2::ZERO, IVec2::new(16, 0), 16),
            Exposure::Full
        );
        assert_eq!(
            exposed_regions(IVec2::ZERO, IVec2::new(3, -20), 16),
            Exposure::Full
        );
        assert_eq!(exposed_regions(IVec2::ONE, IVec2::ONE, 16), Exposure::None);
    }

    #[test]
    fn single_step_move_exposes_one_strip() {
        let Exposure::Partial(strips) = exposed_regions(IVec2::ZERO, IVec2::new(2, 0), 256) else {
            panic!("expected a partial update");
        };

        assert_eq!(strips.len(), 1);
        assert_eq!(rect_area(strips[0]), 256 * 2);
    }

    #[test]
    fn regions_split_at_the_wrap_boundary() {
        let regions = split_wrapped(3, IRect::new(-2, 14, 3, 18), 16);

        assert_eq!(regions.len(), 4);
        assert_eq!(regions.iter().map(TileRegion::texel_count).sum::<u64>(), 5 * 4);

        for region in &regions {
            assert_eq!(region.level, 3);
            assert!(region.origin.x + region.extent.x <= 16);
            assert!(region.origin.y + region.extent.y <= 16);
            assert_eq!(region.origin.x, wrap(region.source.x, 16));
            assert_eq!(region.origin.y, wrap(region.source.y, 16));
        }
    }

    #[test]
    fn aligned_windows_are_a_single_region() {
        let regions = split_wrapped(0, window(IVec2::new(-32, 48), 16), 16);

        assert_eq!(
            regions.as_slice(),
            &[TileRegion {
                level: 0,
                origin: UVec2::ZERO,
                extent: UVec2::splat(16),
                source: IVec2::new(-32, 48),
            }]
        );
    }
}
