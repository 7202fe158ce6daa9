//! Pixel format table.
//!
//! Maps DRM fourcc codes to bits/bytes per pixel and, for the accelerated
//! backend, to the accelerator's native format code. The two backend families
//! disagree on 24-bit formats: the generic table rejects them, the accelerated
//! one accepts them.

use std::fmt;

/// A DRM fourcc pixel format code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fourcc(pub u32);

const fn fourcc(code: &[u8; 4]) -> Fourcc {
    Fourcc(
        code[0] as u32 | (code[1] as u32) << 8 | (code[2] as u32) << 16 | (code[3] as u32) << 24,
    )
}

impl Fourcc {
    pub const RGB332: Fourcc = fourcc(b"RGB8");
    pub const BGR233: Fourcc = fourcc(b"BGR8");

    pub const XRGB4444: Fourcc = fourcc(b"XR12");
    pub const XBGR4444: Fourcc = fourcc(b"XB12");
    pub const RGBX4444: Fourcc = fourcc(b"RX12");
    pub const BGRX4444: Fourcc = fourcc(b"BX12");
    pub const ARGB4444: Fourcc = fourcc(b"AR12");
    pub const ABGR4444: Fourcc = fourcc(b"AB12");
    pub const RGBA4444: Fourcc = fourcc(b"RA12");
    pub const BGRA4444: Fourcc = fourcc(b"BA12");

    pub const XRGB1555: Fourcc = fourcc(b"XR15");
    pub const XBGR1555: Fourcc = fourcc(b"XB15");
    pub const RGBX5551: Fourcc = fourcc(b"RX15");
    pub const BGRX5551: Fourcc = fourcc(b"BX15");
    pub const ARGB1555: Fourcc = fourcc(b"AR15");
    pub const ABGR1555: Fourcc = fourcc(b"AB15");
    pub const RGBA5551: Fourcc = fourcc(b"RA15");
    pub const BGRA5551: Fourcc = fourcc(b"BA15");

    pub const RGB565: Fourcc = fourcc(b"RG16");
    pub const BGR565: Fourcc = fourcc(b"BG16");

    pub const RGB888: Fourcc = fourcc(b"RG24");
    pub const BGR888: Fourcc = fourcc(b"BG24");

    pub const XRGB8888: Fourcc = fourcc(b"XR24");
    pub const XBGR8888: Fourcc = fourcc(b"XB24");
    pub const RGBX8888: Fourcc = fourcc(b"RX24");
    pub const BGRX8888: Fourcc = fourcc(b"BX24");
    pub const ARGB8888: Fourcc = fourcc(b"AR24");
    pub const ABGR8888: Fourcc = fourcc(b"AB24");
    pub const RGBA8888: Fourcc = fourcc(b"RA24");
    pub const BGRA8888: Fourcc = fourcc(b"BA24");

    /// Build a code from its four-character tag, e.g. `"XR24"`.
    pub fn from_tag(tag: &str) -> Option<Fourcc> {
        let bytes: &[u8; 4] = tag.as_bytes().try_into().ok()?;
        Some(fourcc(bytes))
    }

    /// The four-character tag of this code.
    pub fn tag(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Look up a format by its DRM name without the `DRM_FORMAT_` prefix.
    pub fn from_name(name: &str) -> Option<Fourcc> {
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, f)| *f)
    }

    /// The DRM name of this code, if it is one of the known RGB formats.
    pub fn name(self) -> Option<&'static str> {
        NAMES.iter().find(|(_, f)| *f == self).map(|(n, _)| *n)
    }
}

const NAMES: &[(&str, Fourcc)] = &[
    ("RGB332", Fourcc::RGB332),
    ("BGR233", Fourcc::BGR233),
    ("XRGB4444", Fourcc::XRGB4444),
    ("XBGR4444", Fourcc::XBGR4444),
    ("RGBX4444", Fourcc::RGBX4444),
    ("BGRX4444", Fourcc::BGRX4444),
    ("ARGB4444", Fourcc::ARGB4444),
    ("ABGR4444", Fourcc::ABGR4444),
    ("RGBA4444", Fourcc::RGBA4444),
    ("BGRA4444", Fourcc::BGRA4444),
    ("XRGB1555", Fourcc::XRGB1555),
    ("XBGR1555", Fourcc::XBGR1555),
    ("RGBX5551", Fourcc::RGBX5551),
    ("BGRX5551", Fourcc::BGRX5551),
    ("ARGB1555", Fourcc::ARGB1555),
    ("ABGR1555", Fourcc::ABGR1555),
    ("RGBA5551", Fourcc::RGBA5551),
    ("BGRA5551", Fourcc::BGRA5551),
    ("RGB565", Fourcc::RGB565),
    ("BGR565", Fourcc::BGR565),
    ("RGB888", Fourcc::RGB888),
    ("BGR888", Fourcc::BGR888),
    ("XRGB8888", Fourcc::XRGB8888),
    ("XBGR8888", Fourcc::XBGR8888),
    ("RGBX8888", Fourcc::RGBX8888),
    ("BGRX8888", Fourcc::BGRX8888),
    ("ARGB8888", Fourcc::ARGB8888),
    ("ABGR8888", Fourcc::ABGR8888),
    ("RGBA8888", Fourcc::RGBA8888),
    ("BGRA8888", Fourcc::BGRA8888),
];

impl fmt::Display for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        if tag.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            write!(f, "{}", String::from_utf8_lossy(&tag))
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

impl fmt::Debug for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fourcc({})", self)
    }
}

/// Resolved pixel layout of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// Bits per pixel.
    pub bpp: u32,
    /// Bytes per pixel.
    pub cpp: u32,
    /// Accelerator-native format code, when the table has one.
    pub native: Option<i32>,
}

impl FormatInfo {
    const fn plain(bpp: u32, cpp: u32) -> Self {
        Self { bpp, cpp, native: None }
    }

    const fn native(bpp: u32, cpp: u32, code: i32) -> Self {
        Self { bpp, cpp, native: Some(code) }
    }
}

/// Per-backend format policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTable {
    /// Dumb/DMA buffers without an accelerator. No 24-bit formats.
    Generic,
    /// Buffers shared with the Rockchip RGA engine.
    Rockchip,
}

impl FormatTable {
    /// Resolve a format under this table's policy.
    pub fn resolve(self, format: Fourcc) -> Option<FormatInfo> {
        match self {
            FormatTable::Generic => resolve_generic(format),
            FormatTable::Rockchip => resolve_rockchip(format),
        }
    }
}

fn resolve_generic(format: Fourcc) -> Option<FormatInfo> {
    let info = match format {
        Fourcc::RGB332 | Fourcc::BGR233 => FormatInfo::plain(8, 1),

        Fourcc::XRGB4444
        | Fourcc::XBGR4444
        | Fourcc::RGBX4444
        | Fourcc::BGRX4444
        | Fourcc::ARGB4444
        | Fourcc::ABGR4444
        | Fourcc::RGBA4444
        | Fourcc::BGRA4444
        | Fourcc::XRGB1555
        | Fourcc::XBGR1555
        | Fourcc::RGBX5551
        | Fourcc::BGRX5551
        | Fourcc::ARGB1555
        | Fourcc::ABGR1555
        | Fourcc::RGBA5551
        | Fourcc::BGRA5551
        | Fourcc::RGB565
        | Fourcc::BGR565 => FormatInfo::plain(16, 2),

        Fourcc::XRGB8888
        | Fourcc::XBGR8888
        | Fourcc::RGBX8888
        | Fourcc::BGRX8888
        | Fourcc::ARGB8888
        | Fourcc::ABGR8888
        | Fourcc::RGBA8888
        | Fourcc::BGRA8888 => FormatInfo::plain(32, 4),

        _ => return None,
    };
    Some(info)
}

fn resolve_rockchip(format: Fourcc) -> Option<FormatInfo> {
    use crate::accel::rk_format as rk;

    let info = match format {
        Fourcc::ARGB4444 => FormatInfo::native(16, 2, rk::ARGB_4444),
        Fourcc::ABGR4444 => FormatInfo::native(16, 2, rk::ABGR_4444),
        Fourcc::RGBA4444 => FormatInfo::native(16, 2, rk::RGBA_4444),
        Fourcc::BGRA4444 => FormatInfo::native(16, 2, rk::BGRA_4444),
        Fourcc::RGBA5551 => FormatInfo::native(16, 2, rk::RGBA_5551),
        Fourcc::BGRA5551 => FormatInfo::native(16, 2, rk::BGRA_5551),
        Fourcc::RGB565 => FormatInfo::native(16, 2, rk::RGB_565),
        Fourcc::BGR565 => FormatInfo::native(16, 2, rk::BGR_565),

        Fourcc::RGB888 => FormatInfo::native(24, 3, rk::RGB_888),
        Fourcc::BGR888 => FormatInfo::native(24, 3, rk::BGR_888),

        Fourcc::XRGB8888 => FormatInfo::native(32, 4, rk::XRGB_8888),
        Fourcc::XBGR8888 => FormatInfo::native(32, 4, rk::XBGR_8888),
        Fourcc::RGBX8888 => FormatInfo::native(32, 4, rk::RGBX_8888),
        Fourcc::BGRX8888 => FormatInfo::native(32, 4, rk::BGRX_8888),
        Fourcc::ARGB8888 => FormatInfo::native(32, 4, rk::ARGB_8888),
        Fourcc::ABGR8888 => FormatInfo::native(32, 4, rk::ABGR_8888),
        Fourcc::RGBA8888 => FormatInfo::native(32, 4, rk::RGBA_8888),
        Fourcc::BGRA8888 => FormatInfo::native(32, 4, rk::BGRA_8888),

        _ => return None,
    };
    Some(info)
}
