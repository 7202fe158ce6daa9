//!
//! The driver operations table.
//!
//! [`DrmDriver`] is what a caller gets back from the registry for one opened
//! device node. Every buffer it creates lives inside the driver and is
//! addressed by a [`BufferId`]; the driver keeps the live-buffer count that
//! flags leaks at teardown.
//!
//! Not every backend implements every slot. Optional slots return
//! [`DrmError::NotSupported`] by default, and [`DrmDriver::capabilities`]
//! tells callers which ones are backed before they try.
//!

use std::os::fd::OwnedFd;
use std::ptr::NonNull;

use crate::blit::{BlitOps, CopyOp, PreparedBlit, Rect};
use crate::buffer::{BufferDesc, BufferId, Placement, SurfaceBuffer};
use crate::error::{DrmError, DrmResult};

bitflags::bitflags! {
    /// Optional driver slots a backend actually implements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        const FLUSH = 1 << 0;
        const IMPORT_HANDLE = 1 << 1;
        const IMPORT_NAME = 1 << 2;
        const IMPORT_PRIME_FD = 1 << 3;
        const EXPORT_PRIME_FD = 1 << 4;
        const FILL_RECT = 1 << 5;
        const BLIT = 1 << 6;
        const COPY_BUFF = 1 << 7;
        const ROTATE_BUFF = 1 << 8;
        const FLIP_BUFF = 1 << 9;

        const IMPORT = Self::IMPORT_HANDLE.bits()
            | Self::IMPORT_NAME.bits()
            | Self::IMPORT_PRIME_FD.bits();
        const ACCELERATED = Self::FILL_RECT.bits()
            | Self::BLIT.bits()
            | Self::COPY_BUFF.bits()
            | Self::ROTATE_BUFF.bits()
            | Self::FLIP_BUFF.bits();
    }
}

/// A userland driver bound to one DRM device descriptor.
///
/// A driver and its buffers are used from a single thread; nothing here
/// locks. Dropping the driver tears down the device context: leftover
/// buffers are reported and released in the normal destroy order.
pub trait DrmDriver {
    /// Backend name as known to the registry.
    fn name(&self) -> &'static str;

    /// Which optional slots this backend implements.
    fn capabilities(&self) -> Capabilities;

    /// Buffers created and not yet successfully freed.
    fn live_buffers(&self) -> usize;

    /// Description of the 2D engine in use, if any.
    fn accelerator_info(&self) -> Option<String> {
        None
    }

    /// Flush pending work to the device.
    fn flush(&mut self) -> DrmResult<()> {
        Err(DrmError::NotSupported("flush_driver"))
    }

    /// Allocate a fresh buffer.
    ///
    /// Either returns a fully set up buffer or leaves nothing behind in the
    /// kernel.
    fn create_buffer(&mut self, desc: &BufferDesc, placement: Placement) -> DrmResult<BufferId>;

    /// Wrap an existing local GEM handle. The geometry is recomputed and
    /// `pitch` (and `size`, when known) must match it.
    ///
    /// The driver takes ownership of `handle` and closes it on destroy.
    fn create_buffer_from_handle(
        &mut self,
        _handle: u32,
        _size: Option<usize>,
        _desc: &BufferDesc,
        _pitch: u32,
    ) -> DrmResult<BufferId> {
        Err(DrmError::NotSupported("create_buffer_from_handle"))
    }

    /// Open a buffer by its global (flink) name.
    fn create_buffer_from_name(
        &mut self,
        _name: u32,
        _desc: &BufferDesc,
        _pitch: u32,
    ) -> DrmResult<BufferId> {
        Err(DrmError::NotSupported("create_buffer_from_name"))
    }

    /// Import a shareable (prime) descriptor.
    ///
    /// `size` defaults to the descriptor's real size. It may not exceed that
    /// size and must match the computed geometry. The descriptor is owned by
    /// the new buffer.
    fn create_buffer_from_prime_fd(
        &mut self,
        _fd: OwnedFd,
        _size: Option<usize>,
        _desc: &BufferDesc,
        _pitch: u32,
    ) -> DrmResult<BufferId> {
        Err(DrmError::NotSupported("create_buffer_from_prime_fd"))
    }

    fn buffer(&self, id: BufferId) -> Option<&SurfaceBuffer>;

    fn buffer_mut(&mut self, id: BufferId) -> Option<&mut SurfaceBuffer>;

    /// Ids of every live buffer, in creation order.
    fn buffer_ids(&self) -> Vec<BufferId>;

    /// Map the whole buffer for CPU access.
    ///
    /// Fails with [`DrmError::AlreadyMapped`] if a mapping is active; a
    /// failed map leaves the buffer unmapped.
    fn map_buffer(&mut self, id: BufferId) -> DrmResult<NonNull<u8>>;

    fn unmap_buffer(&mut self, id: BufferId) -> DrmResult<()>;

    /// Release every resource of a buffer: mapping, accelerator handle,
    /// shareable descriptor and the kernel object, in that order.
    ///
    /// A failed kernel free is logged and leaves the live count unchanged;
    /// the buffer is gone from the driver either way.
    fn destroy_buffer(&mut self, id: BufferId) -> DrmResult<()>;

    /// A new shareable descriptor for the buffer.
    fn export_prime_fd(&mut self, _id: BufferId) -> DrmResult<OwnedFd> {
        Err(DrmError::NotSupported("export_prime_fd"))
    }

    /// Fill `rect` (payload coordinates) with a solid colour.
    fn fill_rect(&mut self, _id: BufferId, _rect: &Rect, _color: u32) -> DrmResult<()> {
        Err(DrmError::NotSupported("fill_rect"))
    }

    /// Validate a blit without running it.
    ///
    /// The returned [`PreparedBlit`] can be passed to [`DrmDriver::blit`]
    /// later; it cannot fail there for format, geometry or mode reasons.
    fn check_blit(
        &self,
        _src: BufferId,
        _src_rect: &Rect,
        _dst: BufferId,
        _dst_rect: &Rect,
        _ops: &BlitOps,
    ) -> DrmResult<PreparedBlit> {
        Err(DrmError::NotSupported("check_blit"))
    }

    /// Execute a blit obtained from [`DrmDriver::check_blit`].
    fn blit(&mut self, _blit: &PreparedBlit) -> DrmResult<()> {
        Err(DrmError::NotSupported("blit"))
    }

    /// Copy the whole payload of `src` into `dst`; sizes must be equal.
    fn copy_buff(&mut self, _src: BufferId, _dst: BufferId) -> DrmResult<()> {
        Err(DrmError::NotSupported("copy_buff"))
    }

    /// Rotate the whole payload of `src` into `dst`.
    fn rotate_buff(&mut self, _src: BufferId, _dst: BufferId, _op: CopyOp) -> DrmResult<()> {
        Err(DrmError::NotSupported("rotate_buff"))
    }

    /// Mirror the whole payload of `src` into `dst`.
    fn flip_buff(&mut self, _src: BufferId, _dst: BufferId, _op: CopyOp) -> DrmResult<()> {
        Err(DrmError::NotSupported("flip_buff"))
    }
}
