//!
//! Kernel device access: ioctls on the DRM node and shared memory mappings.
//!
//! Backends never call `libc::ioctl` directly. They go through [`DrmDevice`],
//! which lets tests stand in for the kernel, and through the typed wrappers in
//! [`ioctl`].
//!

pub mod ioctl;

use std::ffi::{c_ulong, c_void};
use std::io;
use std::mem::ManuallyDrop;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use std::ptr::{self, NonNull};

/// A DRM device node that can receive ioctls.
pub trait DrmDevice {
    /// The device descriptor, used for mmap through fake offsets.
    fn as_fd(&self) -> BorrowedFd<'_>;

    /// Issue a raw ioctl.
    ///
    /// # Safety
    ///
    /// `arg` must point to a live, initialised value of the argument type
    /// encoded in `request`.
    unsafe fn ioctl_raw(&self, request: c_ulong, arg: *mut c_void) -> io::Result<()>;

    /// Unmap a region mapped from this device or from one of its buffers.
    fn unmap(&self, mapping: Mapping) -> io::Result<()> {
        mapping.unmap()
    }

    /// Close a prime descriptor belonging to one of this device's buffers.
    fn close_prime_fd(&self, fd: OwnedFd) {
        drop(fd);
    }
}

/// A caller-owned DRM device descriptor.
///
/// Ioctls interrupted by a signal (`EINTR`) or refused with `EAGAIN` are
/// retried until they complete.
#[derive(Debug, Clone, Copy)]
pub struct DeviceFd<'fd> {
    fd: BorrowedFd<'fd>,
}

impl<'fd> DeviceFd<'fd> {
    pub fn new(fd: BorrowedFd<'fd>) -> Self {
        Self { fd }
    }
}

impl DrmDevice for DeviceFd<'_> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd
    }

    unsafe fn ioctl_raw(&self, request: c_ulong, arg: *mut c_void) -> io::Result<()> {
        loop {
            let ret = libc::ioctl(self.fd.as_raw_fd(), request as _, arg);
            if ret != -1 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
                _ => return Err(err),
            }
        }
    }
}

/// A shared, read/write memory mapping. Dropping it unmaps the region.
#[derive(Debug)]
pub struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

impl Mapping {
    /// Map `len` bytes of `fd` starting at `offset`.
    pub fn new(fd: BorrowedFd<'_>, len: usize, offset: u64) -> io::Result<Mapping> {
        if len == 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let offset = libc::off64_t::try_from(offset)
            .map_err(|_| io::Error::from_raw_os_error(libc::EOVERFLOW))?;

        // SAFETY: a fresh mapping chosen by the kernel does not alias any
        // Rust-owned memory.
        let addr = unsafe {
            libc::mmap64(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                offset,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        NonNull::new(addr.cast::<u8>())
            .map(|ptr| Mapping { ptr, len })
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned a null address"))
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the region is mapped readable for `len` bytes while `self` lives.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access from Rust.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Unmap now and report failure instead of logging it.
    pub fn unmap(self) -> io::Result<()> {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` owned the mapping and is never used again.
        let ret = unsafe { libc::munmap(this.ptr.as_ptr().cast(), this.len) };
        if ret == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: the mapping is owned by `self` and goes away with it.
        if unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) } != 0 {
            crate::log_warning!("Failed munmap: {}", io::Error::last_os_error());
        }
    }
}

/// Size of the object behind `fd`, found by seeking to its end.
pub fn fd_size(fd: BorrowedFd<'_>) -> io::Result<u64> {
    // SAFETY: lseek only touches the descriptor's file offset.
    let end = unsafe { libc::lseek64(fd.as_raw_fd(), 0, libc::SEEK_END) };
    if end < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(end as u64)
}

/// The system page size.
pub fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}
