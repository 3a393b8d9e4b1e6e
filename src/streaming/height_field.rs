use crate::error::{ClipmapError, ClipmapResult};
use bevy::math::UVec2;
use image::DynamicImage;
use ndarray::{Array2, Axis};

/// The source of all terrain heights: a grid of samples and its low pass filtered companion.
///
/// The grid is indexed as `[z, x]` and repeats in both directions, which makes the
/// terrain effectively infinite. It is read only once constructed.
#[derive(Clone, Debug)]
pub struct HeightField {
    heights: Array2<f32>,
    low_pass: Array2<f32>,
    min_height: f32,
    max_height: f32,
}

impl HeightField {
    /// Pairs a height grid with a precomputed low pass companion of the same size.
    pub fn new(heights: Array2<f32>, low_pass: Array2<f32>) -> ClipmapResult<Self> {
        if heights.is_empty() {
            return Err(ClipmapError::EmptyHeightField);
        }
        if heights.dim() != low_pass.dim() {
            let (a, b) = heights.dim();
            let (c, d) = low_pass.dim();
            return Err(ClipmapError::CompanionMismatch(b, a, d, c));
        }

        let (min_height, max_height) = heights
            .iter()
            .chain(low_pass.iter())
            .fold((f32::MAX, f32::MIN), |(min, max), &height| {
                (min.min(height), max.max(height))
            });

        Ok(Self {
            heights,
            low_pass,
            min_height,
            max_height,
        })
    }

    /// Computes the low pass companion with a box filter of the given radius.
    pub fn with_low_pass(heights: Array2<f32>, radius: usize) -> ClipmapResult<Self> {
        if heights.is_empty() {
            return Err(ClipmapError::EmptyHeightField);
        }

        let low_pass = box_filter(&box_filter(&heights, radius, Axis(1)), radius, Axis(0));

        Self::new(heights, low_pass)
    }

    pub fn from_fn(size: UVec2, mut height: impl FnMut(u32, u32) -> f32) -> ClipmapResult<Self> {
        let heights = Array2::from_shape_fn((size.y as usize, size.x as usize), |(z, x)| {
            height(x as u32, z as u32)
        });

        Self::with_low_pass(heights, 1)
    }

    /// Converts a single channel image into a height field with heights in `0..=scale`.
    pub fn from_image(image: &DynamicImage, scale: f32) -> ClipmapResult<Self> {
        let luma = match image {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLumaA16(_) => image.to_luma32f(),
            _ => return Err(ClipmapError::UnsupportedImage),
        };

        let (width, height) = luma.dimensions();
        let heights = Array2::from_shape_vec((height as usize, width as usize), luma.into_raw())
            .map_err(|_| ClipmapError::UnsupportedImage)?
            * scale;

        Self::with_low_pass(heights, 1)
    }

    /// The count of samples along x and z.
    pub fn size(&self) -> UVec2 {
        let (height, width) = self.heights.dim();
        UVec2::new(width as u32, height as u32)
    }

    pub fn height_range(&self) -> (f32, f32) {
        (self.min_height, self.max_height)
    }

    #[inline]
    fn index(&self, x: i64, z: i64) -> [usize; 2] {
        let (height, width) = self.heights.dim();
        [
            z.rem_euclid(height as i64) as usize,
            x.rem_euclid(width as i64) as usize,
        ]
    }

    /// Samples the height at a (wrapping) sample coordinate.
    #[inline]
    pub fn height(&self, x: i64, z: i64) -> f32 {
        self.heights[self.index(x, z)]
    }

    #[inline]
    pub fn low_pass_height(&self, x: i64, z: i64) -> f32 {
        self.low_pass[self.index(x, z)]
    }
}

/// A wrapping box filter along one axis.
fn box_filter(grid: &Array2<f32>, radius: usize, axis: Axis) -> Array2<f32> {
    let length = grid.len_of(axis) as i64;
    let radius = radius as i64;
    let weight = 1.0 / (2 * radius + 1) as f32;

    let mut output = Array2::zeros(grid.dim());

    for (input, mut output) in grid.lanes(axis).into_iter().zip(output.lanes_mut(axis)) {
        for i in 0..length {
            let sum: f32 = (-radius..=radius)
                .map(|offset| input[(i + offset).rem_euclid(length) as usize])
                .sum();

            output[i as usize] = sum * weight;
        }
    }

    output
}
