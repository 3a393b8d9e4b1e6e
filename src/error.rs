use thiserror::Error;

/// Errors that can occur while building or driving a clipmap terrain.
///
/// Everything except [`ClipmapError::Device`] during construction is recoverable;
/// the per-frame pipeline never returns these to the caller for streaming hiccups.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClipmapError {
    #[error("invalid clipmap configuration: {0}")]
    InvalidConfig(String),
    #[error("the height field is empty")]
    EmptyHeightField,
    #[error("the height field and its low pass companion differ in size ({0}x{1} vs {2}x{3})")]
    CompanionMismatch(usize, usize, usize, usize),
    #[error("unsupported image format for a height field")]
    UnsupportedImage,
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

/// Failures reported by a [`TerrainDevice`](crate::device::TerrainDevice).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("failed to allocate {label} ({size} bytes)")]
    Allocation { label: String, size: u64 },
    #[error("unknown buffer {0}")]
    UnknownBuffer(u32),
    #[error("unknown texture {0}")]
    UnknownTexture(u32),
    #[error("write of {len} bytes at offset {offset} exceeds buffer size {size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },
    #[error("texture copy does not fit the texture: {0}")]
    InvalidCopy(String),
    #[error("the device refused the texture copy")]
    CopyRejected,
}

pub type ClipmapResult<T> = Result<T, ClipmapError>;
