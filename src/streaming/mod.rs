//! Streaming of the height data into the toroidal textures of the clipmap levels.

mod height_field;
mod sampler;
mod staging;
mod streamer;
mod toroidal;

pub use height_field::HeightField;
pub use sampler::LevelSampler;
pub(crate) use staging::StagingRing;
pub use streamer::{HeightmapStreamer, StreamStats};
pub use toroidal::{exposed_regions, split_wrapped, window, Exposure, TileRegion, WindowUpdate};
