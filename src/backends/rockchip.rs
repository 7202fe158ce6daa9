//!
//! Rockchip backend: GEM buffer objects plus the RGA 2D engine.
//!
//! Every buffer, however it was created, gets a prime descriptor that is
//! imported into the engine right away. If that fails the buffer is still
//! usable through a CPU mapping; only the accelerated slots refuse it with
//! [`DrmError::NotAccelerated`].
//!
//! Rectangles handed to the engine are in whole-buffer coordinates: each
//! buffer's header rows are skipped by moving the vertical origin down.
//!

use std::collections::BTreeMap;
use std::os::fd::{AsFd, OwnedFd};
use std::ptr::NonNull;

use crate::accel::{translate_ops, AccelBuffer, AccelError, AccelOptions, AccelRect, Accelerator, Usage};
use crate::blit::{AlphaOp, BlitOps, CopyOp, PreparedBlit, Rect};
use crate::buffer::{BufferDesc, BufferId, BufferIds, Geometry, Placement, SurfaceBuffer};
use crate::driver::{Capabilities, DrmDriver};
use crate::error::{DrmError, DrmResult};
use crate::format::FormatTable;
use crate::kernel::{fd_size, ioctl, DrmDevice, Mapping};
use crate::{log_debug, log_error, log_warning};

/// Registry name of this backend.
pub const NAME: &str = "rockchip";

/// Kernel placement flags for a fresh GEM object.
pub fn placement_flags(placement: Placement) -> u32 {
    match placement {
        Placement::Scanout => ioctl::ROCKCHIP_BO_CONTIG,
        Placement::Shadow => ioctl::ROCKCHIP_BO_CONTIG | ioctl::ROCKCHIP_BO_CACHABLE,
        Placement::General => ioctl::ROCKCHIP_BO_CACHABLE,
    }
}

#[derive(Debug)]
struct RkBuffer {
    base: SurfaceBuffer,
    rk_format: i32,
    rk_flags: u32,
    accel: Option<AccelBuffer>,
}

impl RkBuffer {
    fn accel_view(&self) -> DrmResult<AccelBuffer> {
        self.accel.ok_or(DrmError::NotAccelerated(self.base.id()))
    }

    /// The full payload in engine coordinates.
    fn payload_rect(&self) -> DrmResult<AccelRect> {
        Rect::full(self.base.width(), self.base.height()).to_accel(self.base.header_rows())
    }

    /// `rect` in engine coordinates, after checking it lies in the payload.
    fn rect_to_accel(&self, rect: &Rect) -> DrmResult<AccelRect> {
        if !rect.fits_within(self.base.width(), self.base.height()) {
            return Err(DrmError::RectOutOfBounds);
        }
        rect.to_accel(self.base.header_rows())
    }
}

fn accel_failed(err: AccelError) -> DrmError {
    log_warning!("DRM>rockchip: {}", err);
    DrmError::Accel(err)
}

/// Driver for one Rockchip DRM device node, composing through `A`.
#[derive(Debug)]
pub struct RockchipDriver<D: DrmDevice, A: Accelerator> {
    dev: D,
    accel: A,
    ids: BufferIds,
    buffers: BTreeMap<BufferId, RkBuffer>,
    nr_bufs: usize,
}

impl<D: DrmDevice, A: Accelerator> RockchipDriver<D, A> {
    pub fn new(dev: D, accel: A) -> Self {
        if let Some(info) = accel.info() {
            log_debug!("DRM>rockchip: RGA information:\n{}", info);
        }
        Self {
            dev,
            accel,
            ids: BufferIds::new(),
            buffers: BTreeMap::new(),
            nr_bufs: 0,
        }
    }

    pub fn accelerator(&self) -> &A {
        &self.accel
    }

    /// Kernel placement flags the buffer was allocated with; zero for imports.
    pub fn placement_flags(&self, id: BufferId) -> Option<u32> {
        self.buffers.get(&id).map(|bo| bo.rk_flags)
    }

    /// Whether the buffer has an engine handle.
    pub fn is_accelerated(&self, id: BufferId) -> bool {
        self.buffers.get(&id).is_some_and(|bo| bo.accel.is_some())
    }

    /// Tear the driver down now, releasing any buffers still live.
    /// Returns how many there were.
    pub fn destroy(self) -> usize {
        let live = self.nr_bufs;
        drop(self);
        live
    }

    fn get(&self, id: BufferId) -> DrmResult<&RkBuffer> {
        self.buffers.get(&id).ok_or(DrmError::NoSuchBuffer(id))
    }

    /// Export a prime descriptor if the buffer has none, then import it into
    /// the engine. Failure is logged and leaves the buffer unaccelerated.
    fn wrap(&self, bo: &mut RkBuffer) {
        if bo.base.prime_fd.is_none() {
            match ioctl::prime_handle_to_fd(&self.dev, bo.base.handle) {
                Ok(fd) => bo.base.prime_fd = Some(fd),
                Err(err) => {
                    log_warning!("DRM>rockchip: failed to get prime fd of buffer: {}", err);
                    return;
                }
            }
        }
        let Some(fd) = bo.base.prime_fd() else {
            return;
        };

        let width = bo.base.width();
        let height = bo.base.height() + bo.base.header_rows();
        match self.accel.import_fd(fd, width, height, bo.rk_format) {
            Ok(handle) => {
                bo.accel = Some(AccelBuffer::wrap(
                    handle,
                    width,
                    height,
                    bo.rk_format,
                    bo.base.pitch(),
                    bo.base.cpp(),
                ));
            }
            Err(err) => log_warning!("DRM>rockchip: failed to import buffer: {}", err),
        }
    }

    fn finish_create(&mut self, base: SurfaceBuffer, geometry: &Geometry, rk_flags: u32) -> BufferId {
        let mut bo = RkBuffer {
            base,
            rk_format: geometry.info.native.unwrap_or_default(),
            rk_flags,
            accel: None,
        };
        log_debug!(
            "DRM>rockchip: buffer {} (handle {}): width ({}), height ({}), pitch ({}), size ({}), offset ({})",
            bo.base.id(),
            bo.base.handle(),
            bo.base.width(),
            bo.base.height(),
            bo.base.pitch(),
            bo.base.size(),
            bo.base.offset()
        );

        self.wrap(&mut bo);
        let id = bo.base.id();
        self.buffers.insert(id, bo);
        self.nr_bufs += 1;
        id
    }

    fn validate(&self, what: &str, desc: &BufferDesc, pitch: u32, size: Option<usize>) -> DrmResult<Geometry> {
        Geometry::validate(FormatTable::Rockchip, desc, pitch, size).map_err(|err| {
            log_error!(
                "DRM>rockchip: bad surface parameters for {}: {} (header size: {}, {} x {}, pitch: {})",
                what,
                err,
                desc.header_size,
                desc.width,
                desc.height,
                pitch
            );
            err
        })
    }

    fn release(&mut self, mut bo: RkBuffer) {
        if let Some(mapping) = bo.base.mapping.take() {
            if let Err(err) = self.dev.unmap(mapping) {
                log_warning!("DRM>rockchip: failed munmap: {}", err);
            }
        }
        if let Some(view) = bo.accel.take() {
            if let Err(err) = self.accel.release(view.handle) {
                log_warning!("DRM>rockchip: {}", err);
            }
        }
        if let Some(fd) = bo.base.prime_fd.take() {
            self.dev.close_prime_fd(fd);
        }

        match ioctl::gem_close(&self.dev, bo.base.handle) {
            Ok(()) => {
                self.nr_bufs = self.nr_bufs.saturating_sub(1);
                log_debug!("DRM>rockchip: buffer object ({}) destroyed", bo.base.handle);
            }
            Err(err) => log_warning!("DRM>rockchip: failed DRM_IOCTL_GEM_CLOSE: {}", err),
        }
    }

    /// Check and run a whole-payload request from `src` to `dst`.
    fn process_whole(
        &self,
        src: &RkBuffer,
        dst: &RkBuffer,
        src_rect: &AccelRect,
        dst_rect: &AccelRect,
        usage: Usage,
    ) -> DrmResult<()> {
        let src_view = src.accel_view()?;
        let dst_view = dst.accel_view()?;
        self.accel
            .check(Some(&src_view), &dst_view, src_rect, dst_rect, usage)
            .map_err(accel_failed)?;
        self.accel
            .process(&src_view, &dst_view, src_rect, dst_rect, &AccelOptions::default(), usage)
            .map_err(accel_failed)
    }

    /// Both buffers, their payload rectangles, and a check that both are
    /// wrapped by the engine.
    fn whole_pair(&self, src: BufferId, dst: BufferId) -> DrmResult<(&RkBuffer, &RkBuffer, AccelRect, AccelRect)> {
        let src = self.get(src)?;
        let dst = self.get(dst)?;
        src.accel_view()?;
        dst.accel_view()?;
        let src_rect = src.payload_rect()?;
        let dst_rect = dst.payload_rect()?;
        Ok((src, dst, src_rect, dst_rect))
    }
}

impl<D: DrmDevice, A: Accelerator> DrmDriver for RockchipDriver<D, A> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::IMPORT | Capabilities::EXPORT_PRIME_FD | Capabilities::ACCELERATED
    }

    fn live_buffers(&self) -> usize {
        self.nr_bufs
    }

    fn accelerator_info(&self) -> Option<String> {
        self.accel.info()
    }

    fn create_buffer(&mut self, desc: &BufferDesc, placement: Placement) -> DrmResult<BufferId> {
        let geometry = Geometry::compute(FormatTable::Rockchip, desc).map_err(|err| {
            log_error!("DRM>rockchip: cannot create buffer: {}", err);
            err
        })?;
        let rk_flags = placement_flags(placement);

        let handle = ioctl::rockchip_gem_create(&self.dev, geometry.size as u64, rk_flags).map_err(|err| {
            log_error!("DRM>rockchip: failed to create gem object: {}", err);
            DrmError::kernel("DRM_IOCTL_ROCKCHIP_GEM_CREATE", err)
        })?;

        let id = self.ids.next();
        let base = SurfaceBuffer::new(id, handle, desc, &geometry, placement.is_scanout());
        Ok(self.finish_create(base, &geometry, rk_flags))
    }

    /// The driver only takes ownership of `handle` on success.
    fn create_buffer_from_handle(
        &mut self,
        handle: u32,
        size: Option<usize>,
        desc: &BufferDesc,
        pitch: u32,
    ) -> DrmResult<BufferId> {
        let geometry = self.validate(&format!("handle {handle}"), desc, pitch, size)?;

        let id = self.ids.next();
        let base = SurfaceBuffer::new(id, handle, desc, &geometry, false);
        Ok(self.finish_create(base, &geometry, 0))
    }

    fn create_buffer_from_name(&mut self, name: u32, desc: &BufferDesc, pitch: u32) -> DrmResult<BufferId> {
        let geometry = self.validate(&format!("name {name}"), desc, pitch, None)?;

        let (handle, object_size) = ioctl::gem_open(&self.dev, name).map_err(|err| {
            log_error!("DRM>rockchip: failed to open gem object by name {}: {}", name, err);
            DrmError::kernel("DRM_IOCTL_GEM_OPEN", err)
        })?;
        if object_size < geometry.size as u64 {
            log_error!(
                "DRM>rockchip: gem object {} holds {} bytes, {} needed",
                name,
                object_size,
                geometry.size
            );
            if let Err(err) = ioctl::gem_close(&self.dev, handle) {
                log_warning!("DRM>rockchip: failed DRM_IOCTL_GEM_CLOSE: {}", err);
            }
            return Err(DrmError::SizeExceedsDescriptor {
                size: geometry.size,
                file_size: object_size as usize,
            });
        }

        let id = self.ids.next();
        let mut base = SurfaceBuffer::new(id, handle, desc, &geometry, false);
        base.name = Some(name);
        Ok(self.finish_create(base, &geometry, 0))
    }

    /// The descriptor is consumed: on failure it is closed. When `size` is
    /// `None` the descriptor's own size must match the computed geometry.
    fn create_buffer_from_prime_fd(
        &mut self,
        fd: OwnedFd,
        size: Option<usize>,
        desc: &BufferDesc,
        pitch: u32,
    ) -> DrmResult<BufferId> {
        let file_size = fd_size(fd.as_fd()).map_err(|err| {
            log_error!("DRM>rockchip: failed to get size of buffer from fd: {}", err);
            DrmError::kernel("lseek", err)
        })?;
        let file_size = usize::try_from(file_size).unwrap_or(usize::MAX);
        log_debug!("DRM>rockchip: size of prime fd: {}", file_size);

        // Without a caller size the whole descriptor must be the buffer.
        let size = size.unwrap_or(file_size);
        if size > file_size {
            log_error!(
                "DRM>rockchip: size ({}) exceeds file size ({})",
                size,
                file_size
            );
            return Err(DrmError::SizeExceedsDescriptor { size, file_size });
        }

        let geometry = self.validate("prime fd", desc, pitch, Some(size))?;

        let handle = ioctl::prime_fd_to_handle(&self.dev, fd.as_fd()).map_err(|err| {
            log_error!("DRM>rockchip: failed to get handle of prime fd: {}", err);
            DrmError::kernel("DRM_IOCTL_PRIME_FD_TO_HANDLE", err)
        })?;

        let id = self.ids.next();
        let mut base = SurfaceBuffer::new(id, handle, desc, &geometry, false);
        base.prime_fd = Some(fd);
        Ok(self.finish_create(base, &geometry, 0))
    }

    fn buffer(&self, id: BufferId) -> Option<&SurfaceBuffer> {
        self.buffers.get(&id).map(|bo| &bo.base)
    }

    fn buffer_mut(&mut self, id: BufferId) -> Option<&mut SurfaceBuffer> {
        self.buffers.get_mut(&id).map(|bo| &mut bo.base)
    }

    fn buffer_ids(&self) -> Vec<BufferId> {
        self.buffers.keys().copied().collect()
    }

    fn map_buffer(&mut self, id: BufferId) -> DrmResult<NonNull<u8>> {
        let bo = self.buffers.get_mut(&id).ok_or(DrmError::NoSuchBuffer(id))?;
        if bo.base.is_mapped() {
            return Err(DrmError::AlreadyMapped(id));
        }

        let size = bo.base.size();
        let mapping = match bo.base.prime_fd() {
            Some(fd) => Mapping::new(fd, size, 0),
            None => {
                let offset = ioctl::rockchip_gem_map_offset(&self.dev, bo.base.handle).map_err(|err| {
                    log_error!("DRM>rockchip: failed to get gem map offset: {}", err);
                    DrmError::kernel("DRM_IOCTL_ROCKCHIP_GEM_MAP_OFFSET", err)
                })?;
                Mapping::new(self.dev.as_fd(), size, offset)
            }
        }
        .map_err(|err| {
            log_error!("DRM>rockchip: failed to mmap buffer: {}", err);
            DrmError::kernel("mmap", err)
        })?;

        let ptr = mapping.as_ptr();
        bo.base.mapping = Some(mapping);
        Ok(ptr)
    }

    fn unmap_buffer(&mut self, id: BufferId) -> DrmResult<()> {
        let bo = self.buffers.get_mut(&id).ok_or(DrmError::NoSuchBuffer(id))?;
        let mapping = bo.base.mapping.take().ok_or(DrmError::NotMapped(id))?;
        self.dev.unmap(mapping).map_err(|err| {
            log_warning!("DRM>rockchip: failed munmap: {}", err);
            DrmError::kernel("munmap", err)
        })
    }

    fn destroy_buffer(&mut self, id: BufferId) -> DrmResult<()> {
        let bo = self.buffers.remove(&id).ok_or(DrmError::NoSuchBuffer(id))?;
        self.release(bo);
        Ok(())
    }

    fn export_prime_fd(&mut self, id: BufferId) -> DrmResult<OwnedFd> {
        let bo = self.get(id)?;
        match bo.base.prime_fd() {
            Some(fd) => fd.try_clone_to_owned().map_err(|err| DrmError::kernel("dup", err)),
            None => ioctl::prime_handle_to_fd(&self.dev, bo.base.handle)
                .map_err(|err| DrmError::kernel("DRM_IOCTL_PRIME_HANDLE_TO_FD", err)),
        }
    }

    fn fill_rect(&mut self, id: BufferId, rect: &Rect, color: u32) -> DrmResult<()> {
        let bo = self.get(id)?;
        let view = bo.accel_view()?;
        let dst_rect = bo.rect_to_accel(rect)?;

        self.accel
            .check(None, &view, &AccelRect::default(), &dst_rect, Usage::COLOR_FILL)
            .map_err(accel_failed)?;
        self.accel.fill(&view, &dst_rect, color).map_err(accel_failed)
    }

    fn check_blit(
        &self,
        src: BufferId,
        src_rect: &Rect,
        dst: BufferId,
        dst_rect: &Rect,
        ops: &BlitOps,
    ) -> DrmResult<PreparedBlit> {
        let (usage, options) = translate_ops(ops)?;

        let src_bo = self.get(src)?;
        let dst_bo = self.get(dst)?;
        let global_alpha = match ops.alpha {
            AlphaOp::Set(alpha) => Some(alpha),
            AlphaOp::None => None,
        };
        let src_view = src_bo.accel_view()?.with_global_alpha(global_alpha);
        let dst_view = dst_bo.accel_view()?;
        let src_accel = src_bo.rect_to_accel(src_rect)?;
        let dst_accel = dst_bo.rect_to_accel(dst_rect)?;

        self.accel
            .check(Some(&src_view), &dst_view, &src_accel, &dst_accel, usage)
            .map_err(accel_failed)?;

        Ok(PreparedBlit {
            src,
            dst,
            src_rect: src_accel,
            dst_rect: dst_accel,
            usage,
            options,
            global_alpha,
        })
    }

    fn blit(&mut self, blit: &PreparedBlit) -> DrmResult<()> {
        let src_view = self.get(blit.src)?.accel_view()?.with_global_alpha(blit.global_alpha);
        let dst_view = self.get(blit.dst)?.accel_view()?;

        self.accel
            .process(
                &src_view,
                &dst_view,
                &blit.src_rect,
                &blit.dst_rect,
                &blit.options,
                blit.usage,
            )
            .map_err(accel_failed)
    }

    fn copy_buff(&mut self, src: BufferId, dst: BufferId) -> DrmResult<()> {
        let (src, dst, src_rect, dst_rect) = self.whole_pair(src, dst)?;
        if !src_rect.same_size(&dst_rect) {
            return Err(DrmError::DimensionMismatch);
        }
        self.process_whole(src, dst, &src_rect, &dst_rect, Usage::SYNC)
    }

    fn rotate_buff(&mut self, src: BufferId, dst: BufferId, op: CopyOp) -> DrmResult<()> {
        let (src, dst, src_rect, dst_rect) = self.whole_pair(src, dst)?;
        if !op.is_rotation() {
            return Err(DrmError::UnsupportedTransform("rotate_buff"));
        }
        let fits = if op.swaps_axes() {
            src_rect.transposed_size(&dst_rect)
        } else {
            src_rect.same_size(&dst_rect)
        };
        if !fits {
            return Err(DrmError::DimensionMismatch);
        }
        self.process_whole(src, dst, &src_rect, &dst_rect, transform_usage(op))
    }

    fn flip_buff(&mut self, src: BufferId, dst: BufferId, op: CopyOp) -> DrmResult<()> {
        let (src, dst, src_rect, dst_rect) = self.whole_pair(src, dst)?;
        if !src_rect.same_size(&dst_rect) {
            return Err(DrmError::DimensionMismatch);
        }
        if !op.is_flip() {
            return Err(DrmError::UnsupportedTransform("flip_buff"));
        }
        self.process_whole(src, dst, &src_rect, &dst_rect, transform_usage(op))
    }
}

/// Engine usage bits for a whole-buffer transform.
fn transform_usage(op: CopyOp) -> Usage {
    match op {
        CopyOp::Rot90 => Usage::ROT_90,
        CopyOp::Rot180 => Usage::ROT_180,
        CopyOp::Rot270 => Usage::ROT_270,
        CopyOp::FlipH => Usage::FLIP_H,
        CopyOp::FlipV => Usage::FLIP_V,
        CopyOp::FlipHV => Usage::FLIP_H_V,
        _ => Usage::empty(),
    }
}

impl<D: DrmDevice, A: Accelerator> Drop for RockchipDriver<D, A> {
    fn drop(&mut self) {
        if self.nr_bufs > 0 {
            log_warning!("DRM>rockchip: there are still {} buffers left", self.nr_bufs);
        }
        let leftovers = std::mem::take(&mut self.buffers);
        for bo in leftovers.into_values() {
            self.release(bo);
        }
    }
}

/// Registry factory: a Rockchip driver over a caller-owned descriptor,
/// composing through librga.
#[cfg(feature = "rockchip")]
pub fn create_driver(fd: std::os::fd::BorrowedFd<'_>) -> DrmResult<Box<dyn DrmDriver + '_>> {
    use crate::accel::rga::Rga;
    use crate::kernel::DeviceFd;

    log_debug!("DRM>rockchip: creating driver");
    Ok(Box::new(RockchipDriver::new(DeviceFd::new(fd), Rga::new())))
}
