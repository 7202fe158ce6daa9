use crate::config::{parse_color, parse_format, parse_placement, parse_size, ProbeOptions};
use anyhow::{Context, Result};
use clap::Parser;

/// Allocate, map and fill a GPU surface buffer through a DRM userland driver
#[derive(Parser, Debug)]
#[command(name = "drmbuf-probe")]
#[command(version)]
#[command(about = "Exercise a DRM buffer backend on a device node", long_about = None)]
pub struct Cli {
    /// DRM device node
    #[arg(short, long, value_name = "PATH")]
    pub device: Option<String>,

    /// Backend name (vmwgfx, rockchip); guessed from the device when omitted
    #[arg(long = "driver", value_name = "NAME")]
    pub driver: Option<String>,

    /// Pixel format (e.g., XRGB8888 or XR24)
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Buffer size (e.g., 640x480)
    #[arg(short, long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Bytes reserved in front of the pixels
    #[arg(long = "header", value_name = "BYTES")]
    pub header: Option<String>,

    /// Placement (scanout, shadow, general)
    #[arg(short, long, value_name = "PLACEMENT")]
    pub placement: Option<String>,

    /// Fill the buffer through the accelerator with this pixel value
    #[arg(long = "fill", value_name = "PIXEL")]
    pub fill: Option<String>,

    /// Map the buffer and write a test pattern
    #[arg(short, long)]
    pub map: bool,

    /// Log more; repeat for more detail (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// List the backends enabled in this build and exit
    #[arg(long)]
    pub list: bool,
}

impl Cli {
    /// Merge CLI arguments into the options struct
    pub fn merge_into_options(&self, mut opts: ProbeOptions) -> Result<ProbeOptions> {
        if let Some(ref device) = self.device {
            opts.device = device.clone();
        }

        if let Some(ref driver) = self.driver {
            opts.driver = Some(driver.clone());
        }

        if let Some(ref format) = self.format {
            opts.format = parse_format(format)?;
        }

        if let Some(ref size) = self.size {
            opts.size = parse_size(size).context("Invalid buffer size")?;
        }

        if let Some(ref header) = self.header {
            opts.header_size = header.trim().parse().context("Invalid header size")?;
        }

        if let Some(ref placement) = self.placement {
            opts.placement = parse_placement(placement)?;
        }

        if let Some(ref fill) = self.fill {
            opts.fill_color = Some(parse_color(fill)?);
        }

        if self.map {
            opts.map = true;
        }

        if self.verbose > 0 {
            opts.verbose = self.verbose;
        }

        Ok(opts)
    }
}
