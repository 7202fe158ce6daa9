//! Error types shared by every backend.

use std::io;

use crate::accel::AccelError;
use crate::buffer::BufferId;
use crate::format::Fourcc;

/// A blit mode component the accelerator cannot honour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ModeError {
    #[error("unsupported blend mode: {0:?}")]
    Blend(crate::blit::BlendMode),

    #[error("unsupported raster operation: {0:?}")]
    RasterOp(crate::blit::LogicOp),

    #[error("unsupported scaling filter: {0:?}")]
    ScalingFilter(crate::blit::ScalingFilter),
}

/// Errors returned by driver and buffer operations.
#[derive(Debug, thiserror::Error)]
pub enum DrmError {
    #[error("not supported format: {0}")]
    UnsupportedFormat(Fourcc),

    #[error("zero size requested ({width} x {height})")]
    ZeroSize { width: u32, height: u32 },

    #[error("buffer geometry overflows ({width} x {height}, header {header_size})")]
    GeometryOverflow {
        width: u32,
        height: u32,
        header_size: u32,
    },

    #[error("bad pitch value: {pitch} (expected {expected})")]
    BadPitch { pitch: u32, expected: u32 },

    #[error("bad size: {size} (expected {expected})")]
    BadSize { size: usize, expected: usize },

    #[error("size ({size}) exceeds descriptor size ({file_size})")]
    SizeExceedsDescriptor { size: usize, file_size: usize },

    #[error(transparent)]
    UnsupportedMode(#[from] ModeError),

    #[error("unsupported transform for {0}")]
    UnsupportedTransform(&'static str),

    #[error("source and destination dimensions do not match")]
    DimensionMismatch,

    #[error("rectangle outside of buffer bounds")]
    RectOutOfBounds,

    #[error("buffer {0} has no accelerator wrapping")]
    NotAccelerated(BufferId),

    #[error("operation not supported by this driver: {0}")]
    NotSupported(&'static str),

    #[error("no such buffer: {0}")]
    NoSuchBuffer(BufferId),

    #[error("buffer {0} is already mapped")]
    AlreadyMapped(BufferId),

    #[error("buffer {0} is not mapped")]
    NotMapped(BufferId),

    #[error("{op} failed: {source}")]
    Kernel {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Accel(#[from] AccelError),
}

impl DrmError {
    pub(crate) fn kernel(op: &'static str, source: io::Error) -> Self {
        DrmError::Kernel { op, source }
    }

    /// True when the kernel or the accelerator rejected a call. Every other
    /// variant is detected before any device call is issued.
    pub fn is_device_failure(&self) -> bool {
        matches!(self, DrmError::Kernel { .. } | DrmError::Accel(_))
    }
}

/// Result type for driver operations.
pub type DrmResult<T> = Result<T, DrmError>;
