//! Blit operation descriptors.
//!
//! [`BlitOps`] is the accelerator-agnostic description of one blit: the copy
//! transform, colour keying, global alpha, Porter-Duff blend, raster op and
//! scaling filter. A driver validates it once in `check_blit`, which yields a
//! [`PreparedBlit`] that can be executed later.

use crate::accel::{AccelOptions, AccelRect, Usage};
use crate::buffer::BufferId;
use crate::error::{DrmError, DrmResult};

/// A rectangle in payload coordinates (header rows excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// The rectangle covering a whole `width` x `height` surface.
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub const fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Whether the rectangle lies inside a `width` x `height` surface.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let (Ok(x), Ok(y)) = (u64::try_from(self.x), u64::try_from(self.y)) else {
            return false;
        };
        x + u64::from(self.w) <= u64::from(width) && y + u64::from(self.h) <= u64::from(height)
    }

    /// Convert to accelerator coordinates, skipping `header_rows` leading rows.
    pub(crate) fn to_accel(self, header_rows: u32) -> DrmResult<AccelRect> {
        let header = i32::try_from(header_rows).map_err(|_| DrmError::RectOutOfBounds)?;
        Ok(AccelRect {
            x: self.x,
            y: self.y.checked_add(header).ok_or(DrmError::RectOutOfBounds)?,
            width: i32::try_from(self.w).map_err(|_| DrmError::RectOutOfBounds)?,
            height: i32::try_from(self.h).map_err(|_| DrmError::RectOutOfBounds)?,
        })
    }
}

/// Geometric transform applied while copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyOp {
    #[default]
    Normal,
    Scale,
    Rot90,
    Rot180,
    Rot270,
    FlipH,
    FlipV,
    FlipHV,
}

impl CopyOp {
    pub fn is_rotation(self) -> bool {
        matches!(self, CopyOp::Rot90 | CopyOp::Rot180 | CopyOp::Rot270)
    }

    pub fn is_flip(self) -> bool {
        matches!(self, CopyOp::FlipH | CopyOp::FlipV | CopyOp::FlipHV)
    }

    /// Whether the transform exchanges width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, CopyOp::Rot90 | CopyOp::Rot270)
    }
}

/// Colour-key mode with the inclusive key range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorKey {
    #[default]
    None,
    /// Skip source pixels inside `[min, max]`.
    Normal { min: u32, max: u32 },
    /// Skip source pixels outside `[min, max]`.
    Inverted { min: u32, max: u32 },
}

/// Per-call global alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaOp {
    /// Use per-pixel alpha only.
    #[default]
    None,
    /// Apply this plane alpha to the source.
    Set(u8),
}

/// Colour blend method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    Legacy,
    Clear,
    #[default]
    Src,
    Dst,
    SrcOver,
    DstOver,
    SrcIn,
    DstIn,
    SrcOut,
    DstOut,
    SrcAtop,
    DstAtop,
    Xor,
    Plus,
    Modulate,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

/// Logical raster operation between source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogicOp {
    Clear,
    Nor,
    AndInverted,
    CopyInverted,
    AndReverse,
    Invert,
    Xor,
    Nand,
    And,
    Equiv,
    Noop,
    OrInverted,
    #[default]
    Copy,
    OrReverse,
    Or,
    Set,
}

/// Filter used when the copy scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingFilter {
    #[default]
    Fast,
    Good,
    Best,
    Nearest,
    Bilinear,
    Convolution,
}

/// Everything a blit does besides choosing its rectangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlitOps {
    pub copy: CopyOp,
    pub key: ColorKey,
    pub alpha: AlphaOp,
    pub blend: BlendMode,
    pub rop: LogicOp,
    pub scaling: ScalingFilter,
}

impl BlitOps {
    pub fn with_copy(mut self, copy: CopyOp) -> Self {
        self.copy = copy;
        self
    }

    pub fn with_key(mut self, key: ColorKey) -> Self {
        self.key = key;
        self
    }

    pub fn with_alpha(mut self, alpha: AlphaOp) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_rop(mut self, rop: LogicOp) -> Self {
        self.rop = rop;
        self
    }

    pub fn with_scaling(mut self, scaling: ScalingFilter) -> Self {
        self.scaling = scaling;
        self
    }
}

/// A blit that passed `check_blit`.
///
/// Holds the translated accelerator parameters, so executing it cannot fail
/// on mode or geometry grounds. It can still fail if one of its buffers was
/// destroyed in between or the device reports an error.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedBlit {
    pub(crate) src: BufferId,
    pub(crate) dst: BufferId,
    pub(crate) src_rect: AccelRect,
    pub(crate) dst_rect: AccelRect,
    pub(crate) usage: Usage,
    pub(crate) options: AccelOptions,
    pub(crate) global_alpha: Option<u8>,
}

impl PreparedBlit {
    pub fn src(&self) -> BufferId {
        self.src
    }

    pub fn dst(&self) -> BufferId {
        self.dst
    }

    /// Accelerator usage bits the blit will be issued with.
    pub fn usage(&self) -> Usage {
        self.usage
    }
}
