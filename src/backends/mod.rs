//!
//! Hardware backends.
//!
//! - [`vmwgfx`]: VMware SVGA DMA buffers, no 2D engine.
//! - [`rockchip`]: Rockchip GEM objects composed through an [`Accelerator`].
//!
//! Both drivers are generic over the kernel seam so they can run against
//! something other than a real device node.
//!
//! [`Accelerator`]: crate::accel::Accelerator
//!

pub mod rockchip;
pub mod vmwgfx;

pub use rockchip::RockchipDriver;
pub use vmwgfx::VmwgfxDriver;
