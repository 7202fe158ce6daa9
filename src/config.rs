use anyhow::{Context, Result};

use crate::buffer::Placement;
use crate::format::{FormatTable, Fourcc};
use crate::logging::LogLevel;

/// Options of the `drmbuf-probe` run
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub device: String,
    /// Backend name; `None` means guess from the device
    pub driver: Option<String>,
    pub format: Fourcc,
    pub size: Size,
    pub header_size: u32,
    pub placement: Placement,
    /// Colour for an accelerated fill of the whole payload
    pub fill_color: Option<u32>,
    /// Map the buffer and write a test pattern by CPU
    pub map: bool,
    /// Number of `-v` flags; each one lowers the log threshold by a level
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            device: String::from("/dev/dri/card0"),
            driver: None,
            format: Fourcc::XRGB8888,
            size: Size {
                width: 640,
                height: 480,
            },
            header_size: 0,
            placement: Placement::General,
            fill_color: None,
            map: false,
            verbose: 0,
        }
    }
}

impl ProbeOptions {
    /// Warnings and errors by default, more with every `-v`.
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_i32(LogLevel::Warning.as_i32() + i32::from(self.verbose))
    }
}

/// Parse a size string in the format "WIDTHxHEIGHT"
pub fn parse_size(s: &str) -> Result<Size> {
    let Some((width, height)) = s.split_once('x') else {
        anyhow::bail!("Size must be in WIDTHxHEIGHT format");
    };

    let width: u32 = width.trim().parse().context("Invalid width value")?;
    let height: u32 = height.trim().parse().context("Invalid height value")?;

    if width == 0 || height == 0 {
        anyhow::bail!("Size values must be positive");
    }

    Ok(Size { width, height })
}

/// Parse a pixel format, either a DRM name ("XRGB8888") or a four-character
/// tag ("XR24"). The format must be known to at least one backend.
pub fn parse_format(s: &str) -> Result<Fourcc> {
    let s = s.trim();
    let format = Fourcc::from_name(s)
        .or_else(|| Fourcc::from_tag(s))
        .with_context(|| format!("Unknown pixel format: {s}"))?;

    if FormatTable::Generic.resolve(format).is_none() && FormatTable::Rockchip.resolve(format).is_none() {
        anyhow::bail!("Pixel format {format} is not supported by any backend");
    }
    Ok(format)
}

/// Parse a buffer placement (scanout, shadow, general)
pub fn parse_placement(s: &str) -> Result<Placement> {
    match s.trim().to_ascii_lowercase().as_str() {
        "scanout" => Ok(Placement::Scanout),
        "shadow" => Ok(Placement::Shadow),
        "general" => Ok(Placement::General),
        other => anyhow::bail!("Invalid placement: {other} (expected scanout, shadow or general)"),
    }
}

/// Parse a pixel value, hexadecimal with a `0x` prefix or decimal
pub fn parse_color(s: &str) -> Result<u32> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).with_context(|| format!("Invalid hex colour: {s}")),
        None => s.parse().with_context(|| format!("Invalid colour: {s}")),
    }
}
