//! Instanced rendering of the visible clipmap blocks.
//!
//! All blocks of the same type share one mesh, so the blocks of a frame are drawn
//! with at most one instanced draw per block type. The per instance data carries the
//! level, the world offset and the blend factor towards the coarser level.

use crate::math::smoothstep;
use serde::{Deserialize, Serialize};

mod instance;
mod renderer;

pub use instance::{InstanceData, InstanceGroup};
pub use renderer::{FrameContext, InstanceRenderer, RenderStats};

/// Shapes the blend factor across the transition band of a level.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendCurve {
    Linear,
    #[default]
    Smoothstep,
}

impl BlendCurve {
    #[inline]
    pub fn apply(self, t: f32) -> f32 {
        match self {
            BlendCurve::Linear => t.clamp(0.0, 1.0),
            BlendCurve::Smoothstep => smoothstep(t),
        }
    }
}
