//! DRM ioctl request codes, argument layouts and typed wrappers.
//!
//! Layouts follow `drm.h`, `rockchip_drm.h` and `vmwgfx_drm.h`. Each wrapper
//! is safe: it pairs a request code with the one argument type that request
//! expects.

use std::ffi::c_ulong;
use std::io;
use std::mem::size_of;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use super::DrmDevice;

const IOC_WRITE: c_ulong = 1;
const IOC_READ: c_ulong = 2;

const IOC_NRSHIFT: c_ulong = 0;
const IOC_TYPESHIFT: c_ulong = 8;
const IOC_SIZESHIFT: c_ulong = 16;
const IOC_DIRSHIFT: c_ulong = 30;

const DRM_IOCTL_BASE: c_ulong = b'd' as c_ulong;

/// First driver-private command number.
pub const DRM_COMMAND_BASE: c_ulong = 0x40;

const fn ioc(dir: c_ulong, nr: c_ulong, size: usize) -> c_ulong {
    (dir << IOC_DIRSHIFT)
        | (DRM_IOCTL_BASE << IOC_TYPESHIFT)
        | (nr << IOC_NRSHIFT)
        | ((size as c_ulong) << IOC_SIZESHIFT)
}

const fn iow<T>(nr: c_ulong) -> c_ulong {
    ioc(IOC_WRITE, nr, size_of::<T>())
}

const fn iowr<T>(nr: c_ulong) -> c_ulong {
    ioc(IOC_READ | IOC_WRITE, nr, size_of::<T>())
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Version {
    pub version_major: i32,
    pub version_minor: i32,
    pub version_patchlevel: i32,
    pub name_len: usize,
    pub name: *mut u8,
    pub date_len: usize,
    pub date: *mut u8,
    pub desc_len: usize,
    pub desc: *mut u8,
}

impl Default for Version {
    fn default() -> Self {
        Self {
            version_major: 0,
            version_minor: 0,
            version_patchlevel: 0,
            name_len: 0,
            name: std::ptr::null_mut(),
            date_len: 0,
            date: std::ptr::null_mut(),
            desc_len: 0,
            desc: std::ptr::null_mut(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct GemClose {
    pub handle: u32,
    pub pad: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct GemOpen {
    pub name: u32,
    pub handle: u32,
    pub size: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct PrimeHandle {
    pub handle: u32,
    pub flags: u32,
    pub fd: i32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct RockchipGemCreate {
    pub size: u64,
    pub flags: u32,
    pub handle: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct RockchipGemMapOff {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct VmwAllocDmabufReq {
    pub size: u32,
    pub pad64: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct VmwDmabufRep {
    pub map_handle: u64,
    pub handle: u32,
    pub cur_gmr_id: u32,
    pub cur_gmr_offset: u32,
    pub pad64: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union VmwAllocDmabufArg {
    pub req: VmwAllocDmabufReq,
    pub rep: VmwDmabufRep,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct VmwUnrefDmabuf {
    pub handle: u32,
    pub pad64: u32,
}

pub const DRM_IOCTL_VERSION: c_ulong = iowr::<Version>(0x00);
pub const DRM_IOCTL_GEM_CLOSE: c_ulong = iow::<GemClose>(0x09);
pub const DRM_IOCTL_GEM_OPEN: c_ulong = iowr::<GemOpen>(0x0b);
pub const DRM_IOCTL_PRIME_HANDLE_TO_FD: c_ulong = iowr::<PrimeHandle>(0x2d);
pub const DRM_IOCTL_PRIME_FD_TO_HANDLE: c_ulong = iowr::<PrimeHandle>(0x2e);

pub const DRM_IOCTL_ROCKCHIP_GEM_CREATE: c_ulong = iowr::<RockchipGemCreate>(DRM_COMMAND_BASE);
pub const DRM_IOCTL_ROCKCHIP_GEM_MAP_OFFSET: c_ulong =
    iowr::<RockchipGemMapOff>(DRM_COMMAND_BASE + 0x01);

pub const DRM_IOCTL_VMW_ALLOC_DMABUF: c_ulong = iowr::<VmwAllocDmabufArg>(DRM_COMMAND_BASE + 0x01);
pub const DRM_IOCTL_VMW_UNREF_DMABUF: c_ulong = iow::<VmwUnrefDmabuf>(DRM_COMMAND_BASE + 0x02);

/// Physically contiguous placement.
pub const ROCKCHIP_BO_CONTIG: u32 = 1 << 0;
/// CPU-cached placement.
pub const ROCKCHIP_BO_CACHABLE: u32 = 1 << 1;

/// Flags passed when exporting a prime descriptor.
pub const DRM_PRIME_EXPORT_FLAGS: u32 = (libc::O_RDWR | libc::O_CLOEXEC) as u32;

/// Issue `request` with a typed argument.
fn call<D, T>(dev: &D, request: c_ulong, arg: &mut T) -> io::Result<()>
where
    D: DrmDevice + ?Sized,
{
    // SAFETY: every caller in this module pairs `request` with the argument
    // type its encoding names.
    unsafe { dev.ioctl_raw(request, (arg as *mut T).cast()) }
}

/// Name of the kernel driver behind the device node, e.g. `"vmwgfx"`.
pub fn driver_name<D: DrmDevice + ?Sized>(dev: &D) -> io::Result<String> {
    let mut arg = Version::default();
    call(dev, DRM_IOCTL_VERSION, &mut arg)?;

    let mut name = vec![0u8; arg.name_len];
    arg = Version {
        name_len: name.len(),
        name: name.as_mut_ptr(),
        ..Version::default()
    };
    call(dev, DRM_IOCTL_VERSION, &mut arg)?;

    name.truncate(arg.name_len.min(name.len()));
    String::from_utf8(name).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

pub fn gem_close<D: DrmDevice + ?Sized>(dev: &D, handle: u32) -> io::Result<()> {
    let mut arg = GemClose { handle, pad: 0 };
    call(dev, DRM_IOCTL_GEM_CLOSE, &mut arg)
}

/// Open a GEM object by its global (flink) name; returns `(handle, size)`.
pub fn gem_open<D: DrmDevice + ?Sized>(dev: &D, name: u32) -> io::Result<(u32, u64)> {
    let mut arg = GemOpen {
        name,
        ..Default::default()
    };
    call(dev, DRM_IOCTL_GEM_OPEN, &mut arg)?;
    Ok((arg.handle, arg.size))
}

pub fn prime_handle_to_fd<D: DrmDevice + ?Sized>(dev: &D, handle: u32) -> io::Result<OwnedFd> {
    let mut arg = PrimeHandle {
        handle,
        flags: DRM_PRIME_EXPORT_FLAGS,
        fd: -1,
    };
    call(dev, DRM_IOCTL_PRIME_HANDLE_TO_FD, &mut arg)?;
    if arg.fd < 0 {
        return Err(io::Error::from_raw_os_error(libc::EBADF));
    }
    // SAFETY: the kernel just installed this descriptor for us.
    Ok(unsafe { OwnedFd::from_raw_fd(arg.fd) })
}

pub fn prime_fd_to_handle<D: DrmDevice + ?Sized>(dev: &D, fd: BorrowedFd<'_>) -> io::Result<u32> {
    let mut arg = PrimeHandle {
        handle: 0,
        flags: 0,
        fd: fd.as_raw_fd(),
    };
    call(dev, DRM_IOCTL_PRIME_FD_TO_HANDLE, &mut arg)?;
    Ok(arg.handle)
}

/// Allocate a Rockchip GEM object; returns its handle.
pub fn rockchip_gem_create<D: DrmDevice + ?Sized>(dev: &D, size: u64, flags: u32) -> io::Result<u32> {
    let mut arg = RockchipGemCreate {
        size,
        flags,
        handle: 0,
    };
    call(dev, DRM_IOCTL_ROCKCHIP_GEM_CREATE, &mut arg)?;
    Ok(arg.handle)
}

/// Fake mmap offset of a Rockchip GEM object on the device node.
pub fn rockchip_gem_map_offset<D: DrmDevice + ?Sized>(dev: &D, handle: u32) -> io::Result<u64> {
    let mut arg = RockchipGemMapOff {
        handle,
        ..Default::default()
    };
    call(dev, DRM_IOCTL_ROCKCHIP_GEM_MAP_OFFSET, &mut arg)?;
    Ok(arg.offset)
}

/// Allocate a vmwgfx DMA buffer, retrying while the kernel asks for a restart.
pub fn vmw_alloc_dmabuf<D: DrmDevice + ?Sized>(dev: &D, size: u32) -> io::Result<VmwDmabufRep> {
    loop {
        let mut arg = VmwAllocDmabufArg {
            rep: VmwDmabufRep::default(),
        };
        arg.req = VmwAllocDmabufReq { size, pad64: 0 };

        match call(dev, DRM_IOCTL_VMW_ALLOC_DMABUF, &mut arg) {
            // SAFETY: on success the kernel has overwritten the union with the reply.
            Ok(()) => return Ok(unsafe { arg.rep }),
            Err(err) if err.raw_os_error() == Some(libc::ERESTART) => continue,
            Err(err) => return Err(err),
        }
    }
}

pub fn vmw_unref_dmabuf<D: DrmDevice + ?Sized>(dev: &D, handle: u32) -> io::Result<()> {
    let mut arg = VmwUnrefDmabuf { handle, pad64: 0 };
    call(dev, DRM_IOCTL_VMW_UNREF_DMABUF, &mut arg)
}
