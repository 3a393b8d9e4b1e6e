use crate::{culling::ClipDepth, error::ClipmapError, render::BlendCurve};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// The configuration of a clipmap terrain.
///
/// The defaults match the reference setup: ten levels of 64x64 vertex blocks,
/// one world unit between the vertices of the finest level and a 256x256 texel
/// toroidal height texture per level.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClipmapConfig {
    /// The count of clipmap levels (K).
    pub level_count: u32,
    /// The count of vertices per side of a body block (m).
    pub block_size: u32,
    /// The world space distance between two vertices of level 0.
    pub base_step: u32,
    /// The side length of each level's toroidal height texture in texels.
    pub texture_size: u32,
    /// The world space distance between two samples of the source height field.
    pub source_spacing: u32,
    /// Scales the stored heights into world space.
    pub height_scale: f32,
    /// The fraction of a level's half extent over which it fades into the coarser level.
    pub transition_width: f32,
    /// The curve used to shape the blend factor across the transition band.
    pub blend_curve: BlendCurve,
    /// The count of staging buffers available for concurrent texture transfers.
    pub staging_slots: u32,
    /// The depth convention of the projection used for culling.
    pub clip_depth: ClipDepth,
}

impl Default for ClipmapConfig {
    fn default() -> Self {
        Self {
            level_count: 10,
            block_size: 64,
            base_step: 1,
            texture_size: 256,
            source_spacing: 1,
            height_scale: 1.0,
            transition_width: 0.2,
            blend_curve: BlendCurve::Smoothstep,
            staging_slots: 8,
            clip_depth: ClipDepth::ZeroToOne,
        }
    }
}

impl ClipmapConfig {
    pub fn new(level_count: u32, block_size: u32) -> Self {
        Self {
            level_count,
            block_size,
            texture_size: (4 * block_size).next_power_of_two(),
            ..Self::default()
        }
    }

    pub fn with_base_step(mut self, base_step: u32) -> Self {
        self.base_step = base_step;
        self
    }

    pub fn with_texture_size(mut self, texture_size: u32) -> Self {
        self.texture_size = texture_size;
        self
    }

    pub fn with_height_scale(mut self, height_scale: f32) -> Self {
        self.height_scale = height_scale;
        self
    }

    pub fn with_transition_width(mut self, transition_width: f32) -> Self {
        self.transition_width = transition_width.clamp(0.0, 1.0);
        self
    }

    pub fn with_blend_curve(mut self, blend_curve: BlendCurve) -> Self {
        self.blend_curve = blend_curve;
        self
    }

    pub fn with_staging_slots(mut self, staging_slots: u32) -> Self {
        self.staging_slots = staging_slots;
        self
    }

    pub fn with_clip_depth(mut self, clip_depth: ClipDepth) -> Self {
        self.clip_depth = clip_depth;
        self
    }

    /// The count of vertices per side of a whole level (n = 4m - 1).
    #[inline]
    pub fn level_vertices(&self) -> u32 {
        4 * self.block_size - 1
    }

    /// The world space distance between two vertices of the level.
    #[inline]
    pub fn step(&self, level: u32) -> i32 {
        (self.base_step << level) as i32
    }

    /// Checks the invariants the geometry and streaming code rely on.
    pub fn validate(&self) -> Result<(), ClipmapError> {
        let invalid = |message: String| Err(ClipmapError::InvalidConfig(message));

        if self.level_count == 0 || self.level_count > 24 {
            return invalid(format!("level count {} is not in 1..=24", self.level_count));
        }
        if self.block_size < 4 {
            return invalid(format!("block size {} is smaller than 4", self.block_size));
        }
        if self.base_step == 0 {
            return invalid("base step must not be zero".to_string());
        }
        if self.source_spacing == 0 || self.base_step % self.source_spacing != 0 {
            return invalid(format!(
                "base step {} is not a multiple of the source spacing {}",
                self.base_step, self.source_spacing
            ));
        }
        if ((self.base_step as u64) << self.level_count) > i32::MAX as u64 / 8 {
            return invalid("the coarsest level step overflows the world grid".to_string());
        }
        if self.texture_size < self.level_vertices() {
            return invalid(format!(
                "texture size {} can not hold a level of {} vertices",
                self.texture_size,
                self.level_vertices()
            ));
        }
        if self.staging_slots == 0 {
            return invalid("at least one staging slot is required".to_string());
        }
        if !(0.0..=1.0).contains(&self.transition_width) {
            return invalid(format!(
                "transition width {} is not in 0..=1",
                self.transition_width
            ));
        }

        Ok(())
    }

    pub fn from_ron(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_ron()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_configuration() {
        let config = ClipmapConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.level_vertices(), 255);
        assert_eq!(config.step(0), 1);
        assert_eq!(config.step(9), 512);
    }

    #[test]
    fn texture_must_hold_a_level() {
        let config = ClipmapConfig::default().with_texture_size(200);

        assert!(matches!(
            config.validate(),
            Err(ClipmapError::InvalidConfig(_))
        ));
    }

    #[test]
    fn new_picks_a_fitting_texture() {
        let config = ClipmapConfig::new(4, 16);

        assert_eq!(config.texture_size, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ron_round_trip_keeps_overrides() {
        let config = ClipmapConfig::new(6, 32)
            .with_blend_curve(BlendCurve::Linear)
            .with_staging_slots(3);

        let parsed = ClipmapConfig::from_ron(&config.to_ron().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_ron_falls_back_to_defaults() {
        let config = ClipmapConfig::from_ron("(level_count: 4)").unwrap();

        assert_eq!(config.level_count, 4);
        assert_eq!(config.block_size, 64);
    }

    #[test]
    fn invalid_ron_is_rejected() {
        assert!(ClipmapConfig::from_ron("(texture_size: 8)").is_err());
    }
}
