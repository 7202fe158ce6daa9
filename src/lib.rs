// drmbuf: GPU surface buffers over DRM userland drivers
//
// Buffer allocation, CPU mapping and accelerated fill/blit/rotate/flip,
// dispatched through one driver interface per hardware family.

pub mod logging;

pub mod accel;
pub mod backends;
pub mod blit;
pub mod buffer;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod format;
pub mod kernel;
pub mod registry;

pub use blit::{AlphaOp, BlendMode, BlitOps, ColorKey, CopyOp, LogicOp, PreparedBlit, Rect, ScalingFilter};
pub use buffer::{BufferDesc, BufferId, Placement, SurfaceBuffer};
pub use cli::Cli;
pub use config::ProbeOptions;
pub use driver::{Capabilities, DrmDriver};
pub use error::{DrmError, DrmResult, ModeError};
pub use format::{FormatTable, Fourcc};
pub use logging::LogLevel;
pub use registry::{get_driver, DriverRegistry, DRIVER_VERSION};
