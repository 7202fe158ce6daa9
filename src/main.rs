use std::fs::OpenOptions;
use std::os::fd::AsFd;

use anyhow::{Context, Result};
use clap::Parser;

use drmbuf::kernel::{ioctl, DeviceFd};
use drmbuf::logging::log_init;
use drmbuf::registry::{DriverRegistry, KNOWN_BACKENDS};
use drmbuf::{log_info, log_warning};
use drmbuf::{BufferDesc, Capabilities, Cli, DrmDriver, ProbeOptions, Rect, DRIVER_VERSION};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list {
        let registry = DriverRegistry::with_builtin();
        println!("driver interface version {DRIVER_VERSION}");
        for name in KNOWN_BACKENDS {
            let state = if registry.lookup(name).is_some() { "enabled" } else { "disabled" };
            println!("{name}: {state}");
        }
        return Ok(());
    }

    let options = cli.merge_into_options(ProbeOptions::default())?;
    log_init(options.log_level());

    let device = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&options.device)
        .with_context(|| format!("Failed to open {}", options.device))?;

    let name = match options.driver.clone() {
        Some(name) => name,
        None => ioctl::driver_name(&DeviceFd::new(device.as_fd()))
            .with_context(|| format!("Failed to query the driver of {}", options.device))?,
    };
    log_info!("Using driver {} on {}", name, options.device);

    let mut driver = drmbuf::get_driver(&name, device.as_fd())
        .with_context(|| format!("No usable driver for {name}"))?;
    report_driver(driver.as_ref());

    let result = probe(driver.as_mut(), &options);
    println!("live buffers before teardown: {}", driver.live_buffers());
    drop(driver);
    result
}

fn report_driver(driver: &dyn DrmDriver) {
    println!("driver: {} (interface version {})", driver.name(), DRIVER_VERSION);
    println!("capabilities: {:?}", driver.capabilities());
    if let Some(info) = driver.accelerator_info() {
        println!("accelerator:\n{info}");
    }
}

fn probe(driver: &mut dyn DrmDriver, options: &ProbeOptions) -> Result<()> {
    let desc = BufferDesc::new(options.format, options.size.width, options.size.height)
        .with_header(options.header_size);
    let id = driver
        .create_buffer(&desc, options.placement)
        .context("Failed to create buffer")?;

    if let Some(buffer) = driver.buffer(id) {
        println!(
            "buffer {}: {} {}x{} pitch {} size {} header rows {} scanout {}",
            buffer.id(),
            buffer.format(),
            buffer.width(),
            buffer.height(),
            buffer.pitch(),
            buffer.size(),
            buffer.header_rows(),
            buffer.is_scanout()
        );
    }

    let outcome = exercise(driver, id, options);
    driver.destroy_buffer(id).context("Failed to destroy buffer")?;
    outcome
}

fn exercise(driver: &mut dyn DrmDriver, id: drmbuf::BufferId, options: &ProbeOptions) -> Result<()> {
    if options.map {
        let ptr = driver.map_buffer(id).context("Failed to map buffer")?;
        println!("mapped at {ptr:p}");

        if let Some(buffer) = driver.buffer_mut(id) {
            let pitch = buffer.pitch() as usize;
            if let Some(pixels) = buffer.pixels_mut() {
                for (row, line) in pixels.chunks_mut(pitch).enumerate() {
                    line.fill(row as u8);
                }
            }
        }
        driver.unmap_buffer(id).context("Failed to unmap buffer")?;
    }

    if let Some(color) = options.fill_color {
        if driver.capabilities().contains(Capabilities::FILL_RECT) {
            let rect = Rect::full(options.size.width, options.size.height);
            driver.fill_rect(id, &rect, color).context("Accelerated fill failed")?;
            println!("filled with 0x{color:08x}");
        } else {
            log_warning!("Driver {} cannot fill rectangles", driver.name());
        }
    }

    Ok(())
}
