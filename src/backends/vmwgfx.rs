//!
//! VMware SVGA (vmwgfx) backend.
//!
//! Buffers are vmwgfx DMA buffers. The kernel returns a fake mmap offset
//! (`map_handle`) with each allocation, and mapping goes through the device
//! node at that offset. Only fresh allocation is supported; there is no 2D
//! engine.
//!

use std::collections::BTreeMap;
use std::os::fd::BorrowedFd;
use std::ptr::NonNull;

use crate::buffer::{BufferDesc, BufferId, BufferIds, Geometry, Placement, SurfaceBuffer};
use crate::driver::{Capabilities, DrmDriver};
use crate::error::{DrmError, DrmResult};
use crate::format::FormatTable;
use crate::kernel::{ioctl, page_size, DeviceFd, DrmDevice, Mapping};
use crate::{log_debug, log_error, log_warning};

/// Registry name of this backend.
pub const NAME: &str = "vmwgfx";

#[derive(Debug)]
struct VmwBuffer {
    base: SurfaceBuffer,
    /// Fake offset for mmap on the device node.
    map_handle: u64,
    /// Offset inside the current guest memory region.
    map_offset: u32,
    /// Map calls not yet matched by an unmap.
    map_count: u32,
}

/// Driver for one vmwgfx device node.
#[derive(Debug)]
pub struct VmwgfxDriver<D: DrmDevice> {
    dev: D,
    ids: BufferIds,
    buffers: BTreeMap<BufferId, VmwBuffer>,
    nr_bufs: usize,
}

impl<D: DrmDevice> VmwgfxDriver<D> {
    pub fn new(dev: D) -> Self {
        Self {
            dev,
            ids: BufferIds::new(),
            buffers: BTreeMap::new(),
            nr_bufs: 0,
        }
    }

    /// Offset of the buffer inside the guest memory region it was placed in.
    pub fn gmr_offset(&self, id: BufferId) -> Option<u32> {
        self.buffers.get(&id).map(|bo| bo.map_offset)
    }

    /// Outstanding map calls on the buffer.
    pub fn map_count(&self, id: BufferId) -> Option<u32> {
        self.buffers.get(&id).map(|bo| bo.map_count)
    }

    /// Tear the driver down now, releasing any buffers still live.
    /// Returns how many there were.
    pub fn destroy(self) -> usize {
        let live = self.nr_bufs;
        drop(self);
        live
    }

    fn release(&mut self, mut bo: VmwBuffer) {
        if let Some(mapping) = bo.base.mapping.take() {
            if let Err(err) = self.dev.unmap(mapping) {
                log_warning!("DRM>vmwgfx: failed munmap of buffer {}: {}", bo.base.id(), err);
            }
        }

        match ioctl::vmw_unref_dmabuf(&self.dev, bo.base.handle) {
            Ok(()) => {
                self.nr_bufs = self.nr_bufs.saturating_sub(1);
                log_debug!("DRM>vmwgfx: buffer object ({}) destroyed", bo.base.handle);
            }
            Err(err) => {
                log_warning!(
                    "DRM>vmwgfx: failed to free buffer object ({}): {}",
                    bo.base.handle,
                    err
                );
            }
        }
    }
}

impl<D: DrmDevice> DrmDriver for VmwgfxDriver<D> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    fn live_buffers(&self) -> usize {
        self.nr_bufs
    }

    fn create_buffer(&mut self, desc: &BufferDesc, placement: Placement) -> DrmResult<BufferId> {
        let geometry = Geometry::compute(FormatTable::Generic, desc).map_err(|err| {
            log_error!("DRM>vmwgfx: cannot create buffer: {}", err);
            err
        })?;
        let size = u32::try_from(geometry.size).map_err(|_| DrmError::GeometryOverflow {
            width: desc.width,
            height: desc.height,
            header_size: desc.header_size,
        })?;

        let rep = ioctl::vmw_alloc_dmabuf(&self.dev, size).map_err(|err| {
            log_error!("DRM>vmwgfx: failed to allocate DMA buffer ({} bytes): {}", size, err);
            DrmError::kernel("DRM_VMW_ALLOC_DMABUF", err)
        })?;

        let id = self.ids.next();
        let base = SurfaceBuffer::new(id, rep.handle, desc, &geometry, placement.is_scanout());
        log_debug!(
            "DRM>vmwgfx: allocated buffer {}: width ({}), height ({}), pitch ({}), size ({}), map handle (0x{:x})",
            id,
            base.width(),
            base.height(),
            base.pitch(),
            base.size(),
            rep.map_handle
        );

        self.buffers.insert(
            id,
            VmwBuffer {
                base,
                map_handle: rep.map_handle,
                map_offset: rep.cur_gmr_offset,
                map_count: 0,
            },
        );
        self.nr_bufs += 1;
        Ok(id)
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
        if bo.map_handle % page_size() as u64 != 0 {
            log_error!(
                "DRM>vmwgfx: map handle 0x{:x} of buffer {} is not page aligned",
                bo.map_handle,
                id
            );
            return Err(DrmError::kernel(
                "mmap",
                std::io::Error::from_raw_os_error(libc::EINVAL),
            ));
        }

        let mapping = Mapping::new(self.dev.as_fd(), bo.base.size(), bo.map_handle).map_err(|err| {
            log_error!(
                "DRM>vmwgfx: failed mmap(): {} (size: {}, handle: 0x{:x})",
                err,
                bo.base.size(),
                bo.map_handle
            );
            DrmError::kernel("mmap", err)
        })?;

        let ptr = mapping.as_ptr();
        bo.base.mapping = Some(mapping);
        bo.map_count = bo.map_count.saturating_add(1);
        log_debug!("DRM>vmwgfx: mapped buffer {} at {:p}", id, ptr);
        Ok(ptr)
    }

    fn unmap_buffer(&mut self, id: BufferId) -> DrmResult<()> {
        let bo = self.buffers.get_mut(&id).ok_or(DrmError::NoSuchBuffer(id))?;
        let mapping = bo.base.mapping.take().ok_or(DrmError::NotMapped(id))?;
        bo.map_count = bo.map_count.saturating_sub(1);
        self.dev.unmap(mapping).map_err(|err| {
            log_warning!("DRM>vmwgfx: failed munmap: {}", err);
            DrmError::kernel("munmap", err)
        })
    }

    fn destroy_buffer(&mut self, id: BufferId) -> DrmResult<()> {
        let bo = self.buffers.remove(&id).ok_or(DrmError::NoSuchBuffer(id))?;
        self.release(bo);
        Ok(())
    }
}

impl<D: DrmDevice> Drop for VmwgfxDriver<D> {
    fn drop(&mut self) {
        if self.nr_bufs > 0 {
            log_warning!("DRM>vmwgfx: there are still {} buffers left", self.nr_bufs);
        }
        let leftovers = std::mem::take(&mut self.buffers);
        for bo in leftovers.into_values() {
            self.release(bo);
        }
    }
}

/// Registry factory: a vmwgfx driver over a caller-owned descriptor.
pub fn create_driver(fd: BorrowedFd<'_>) -> DrmResult<Box<dyn DrmDriver + '_>> {
    log_debug!("DRM>vmwgfx: creating driver");
    Ok(Box::new(VmwgfxDriver::new(DeviceFd::new(fd))))
}
