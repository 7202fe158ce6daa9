//!
//! Bridge to a 2D composition engine.
//!
//! A buffer's prime descriptor is imported into the engine, which hands back
//! an [`AccelHandle`]. The handle plus the buffer geometry form an
//! [`AccelBuffer`] view that fill/copy/rotate/flip/blend requests operate on.
//!
//! The only engine shipped is Rockchip RGA ([`rga::Rga`], feature
//! `rockchip`). Its usage word and native format codes are what [`Usage`] and
//! [`rk_format`] mirror.
//!

#[cfg(feature = "rockchip")]
pub mod rga;

use std::os::fd::BorrowedFd;

use crate::blit::{BlendMode, BlitOps, ColorKey, CopyOp, LogicOp, ScalingFilter};
use crate::error::ModeError;

bitflags::bitflags! {
    /// Operation bits handed to the engine with each request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Usage: u32 {
        const ROT_90 = 1 << 0;
        const ROT_180 = 1 << 1;
        const ROT_270 = 1 << 2;
        const FLIP_H = 1 << 3;
        const FLIP_V = 1 << 4;
        const FLIP_H_V = 1 << 5;

        const BLEND_SRC_OVER = 1 << 6;
        const BLEND_SRC = 1 << 7;
        const BLEND_DST = 1 << 8;
        const BLEND_SRC_IN = 1 << 9;
        const BLEND_DST_IN = 1 << 10;
        const BLEND_SRC_OUT = 1 << 11;
        const BLEND_DST_OUT = 1 << 12;
        const BLEND_DST_OVER = 1 << 13;
        const BLEND_SRC_ATOP = 1 << 14;
        const BLEND_DST_ATOP = 1 << 15;
        const BLEND_XOR = 1 << 16;

        const COLORKEY_NORMAL = 1 << 17;
        const COLORKEY_INVERTED = 1 << 18;

        const SYNC = 1 << 19;
        const COLOR_FILL = 1 << 21;
        const ROP = 1 << 24;

        const TRANSFORM_MASK = 0x3f;
        const BLEND_MASK = 0x1_ffc0;
        const COLORKEY_MASK = 0x6_0000;
    }
}

/// RGA native pixel format codes (`RK_FORMAT_*`).
pub mod rk_format {
    pub const RGBA_8888: i32 = 0x00 << 8;
    pub const RGBX_8888: i32 = 0x01 << 8;
    pub const RGB_888: i32 = 0x02 << 8;
    pub const BGRA_8888: i32 = 0x03 << 8;
    pub const RGB_565: i32 = 0x04 << 8;
    pub const RGBA_5551: i32 = 0x05 << 8;
    pub const RGBA_4444: i32 = 0x06 << 8;
    pub const BGR_888: i32 = 0x07 << 8;
    pub const BGRX_8888: i32 = 0x16 << 8;
    pub const BGR_565: i32 = 0x24 << 8;
    pub const BGRA_5551: i32 = 0x25 << 8;
    pub const BGRA_4444: i32 = 0x26 << 8;
    pub const ARGB_8888: i32 = 0x28 << 8;
    pub const XRGB_8888: i32 = 0x29 << 8;
    pub const ARGB_4444: i32 = 0x2b << 8;
    pub const ABGR_8888: i32 = 0x2c << 8;
    pub const XBGR_8888: i32 = 0x2d << 8;
    pub const ABGR_4444: i32 = 0x2f << 8;
}

/// RGA raster-op codes (`IM_ROP_*`).
pub mod rop_code {
    pub const AND: i32 = 0x88;
    pub const OR: i32 = 0xee;
    pub const XOR: i32 = 0xf6;
}

/// Engine-side handle of an imported buffer. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccelHandle(pub u32);

/// Engine view of a wrapped buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelBuffer {
    pub handle: AccelHandle,
    pub width: u32,
    /// Height including the header rows.
    pub height: u32,
    /// Native format code.
    pub format: i32,
    /// Row pitch in bytes.
    pub pitch: u32,
    /// Bytes per pixel.
    pub cpp: u32,
    /// Plane alpha applied when this buffer is a blit source.
    pub global_alpha: Option<u8>,
}

impl AccelBuffer {
    pub fn wrap(handle: AccelHandle, width: u32, height: u32, format: i32, pitch: u32, cpp: u32) -> Self {
        Self {
            handle,
            width,
            height,
            format,
            pitch,
            cpp,
            global_alpha: None,
        }
    }

    pub fn with_global_alpha(mut self, alpha: Option<u8>) -> Self {
        self.global_alpha = alpha;
        self
    }
}

/// Rectangle in engine coordinates (header rows included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl AccelRect {
    pub fn same_size(&self, other: &AccelRect) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn transposed_size(&self, other: &AccelRect) -> bool {
        self.width == other.height && self.height == other.width
    }
}

/// Inclusive colour-key range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorKeyRange {
    pub min: u32,
    pub max: u32,
}

/// Auxiliary parameters accompanying a usage word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccelOptions {
    pub colorkey: Option<ColorKeyRange>,
    pub rop_code: Option<i32>,
}

/// An engine call that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{op} failed: {message} (status {status})")]
pub struct AccelError {
    pub op: &'static str,
    pub status: i32,
    pub message: String,
}

impl AccelError {
    pub fn new(op: &'static str, status: i32, message: impl Into<String>) -> Self {
        Self {
            op,
            status,
            message: message.into(),
        }
    }
}

/// A 2D composition engine.
///
/// Calls are synchronous. Implementations do not need to be thread-safe;
/// a driver and its engine are used from one thread.
pub trait Accelerator {
    /// Human-readable engine description.
    fn info(&self) -> Option<String> {
        None
    }

    /// Import a prime descriptor whose content is `width` x `height` pixels
    /// of native `format`.
    fn import_fd(
        &self,
        fd: BorrowedFd<'_>,
        width: u32,
        height: u32,
        format: i32,
    ) -> Result<AccelHandle, AccelError>;

    /// Release a handle obtained from `import_fd`.
    fn release(&self, handle: AccelHandle) -> Result<(), AccelError>;

    /// Validate a request without running it. `src` is `None` for fills.
    fn check(
        &self,
        src: Option<&AccelBuffer>,
        dst: &AccelBuffer,
        src_rect: &AccelRect,
        dst_rect: &AccelRect,
        usage: Usage,
    ) -> Result<(), AccelError>;

    /// Fill `rect` of `dst` with a solid colour.
    fn fill(&self, dst: &AccelBuffer, rect: &AccelRect, color: u32) -> Result<(), AccelError>;

    /// Copy `src_rect` of `src` into `dst_rect` of `dst`, applying `usage`.
    fn process(
        &self,
        src: &AccelBuffer,
        dst: &AccelBuffer,
        src_rect: &AccelRect,
        dst_rect: &AccelRect,
        options: &AccelOptions,
        usage: Usage,
    ) -> Result<(), AccelError>;
}

/// Translate blit modes into the engine's usage word and options.
///
/// Refuses blend modes outside the Porter-Duff subset the engine implements,
/// raster ops other than COPY/AND/OR/XOR, and any scaling filter but the
/// fast one. Global alpha does not contribute bits; it travels on the source
/// buffer view.
pub fn translate_ops(ops: &BlitOps) -> Result<(Usage, AccelOptions), ModeError> {
    let mut usage = Usage::empty();
    let mut options = AccelOptions::default();

    usage |= match ops.copy {
        CopyOp::Normal | CopyOp::Scale => Usage::empty(),
        CopyOp::Rot90 => Usage::ROT_90,
        CopyOp::Rot180 => Usage::ROT_180,
        CopyOp::Rot270 => Usage::ROT_270,
        CopyOp::FlipH => Usage::FLIP_H,
        CopyOp::FlipV => Usage::FLIP_V,
        CopyOp::FlipHV => Usage::FLIP_H_V,
    };

    match ops.key {
        ColorKey::None => {}
        ColorKey::Normal { min, max } => {
            usage |= Usage::COLORKEY_NORMAL;
            options.colorkey = Some(ColorKeyRange { min, max });
        }
        ColorKey::Inverted { min, max } => {
            usage |= Usage::COLORKEY_INVERTED;
            options.colorkey = Some(ColorKeyRange { min, max });
        }
    }

    usage |= match ops.blend {
        BlendMode::Src => Usage::BLEND_SRC,
        BlendMode::Dst => Usage::BLEND_DST,
        BlendMode::SrcOver => Usage::BLEND_SRC_OVER,
        BlendMode::DstOver => Usage::BLEND_DST_OVER,
        BlendMode::SrcIn => Usage::BLEND_SRC_IN,
        BlendMode::DstIn => Usage::BLEND_DST_IN,
        BlendMode::SrcOut => Usage::BLEND_SRC_OUT,
        BlendMode::DstOut => Usage::BLEND_DST_OUT,
        BlendMode::SrcAtop => Usage::BLEND_SRC_ATOP,
        BlendMode::DstAtop => Usage::BLEND_DST_ATOP,
        BlendMode::Xor => Usage::BLEND_XOR,
        other => return Err(ModeError::Blend(other)),
    };

    match ops.rop {
        LogicOp::Copy => {}
        LogicOp::And => options.rop_code = Some(rop_code::AND),
        LogicOp::Or => options.rop_code = Some(rop_code::OR),
        LogicOp::Xor => options.rop_code = Some(rop_code::XOR),
        other => return Err(ModeError::RasterOp(other)),
    }
    if options.rop_code.is_some() {
        usage |= Usage::ROP;
    }

    if ops.scaling != ScalingFilter::Fast {
        return Err(ModeError::ScalingFilter(ops.scaling));
    }

    Ok((usage, options))
}
