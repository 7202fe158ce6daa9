// Test doubles for the kernel device and the 2D engine.
//
// `MockDevice` answers the DRM ioctls the backends issue. Every GEM object is
// a sparse temp file, so prime descriptors are real files and mapping them
// runs a real mmap. Device-node mappings land in one shared backing file at
// the fake offset handed out for the object.
//
// Both doubles can write into a shared `Journal` so tests can check the order
// in which resources are released.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ffi::{c_ulong, c_void};
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, IntoRawFd, OwnedFd};
use std::os::unix::fs::{FileExt, MetadataExt};
use std::rc::Rc;

use drmbuf::accel::{
    AccelBuffer, AccelError, AccelHandle, AccelOptions, AccelRect, Accelerator, Usage,
};
use drmbuf::kernel::ioctl::{self, GemClose, GemOpen, PrimeHandle, RockchipGemCreate, RockchipGemMapOff};
use drmbuf::kernel::{page_size, DrmDevice, Mapping};

pub type Journal = Rc<RefCell<Vec<String>>>;

pub fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

/// Position of the first journal entry starting with `prefix`.
pub fn position(journal: &Journal, prefix: &str) -> Option<usize> {
    journal.borrow().iter().position(|entry| entry.starts_with(prefix))
}

#[derive(Debug)]
struct MockObject {
    size: u64,
    offset: u64,
    flags: u32,
    file: File,
}

#[derive(Debug, Default)]
struct MockState {
    next_handle: u32,
    next_offset: u64,
    objects: BTreeMap<u32, MockObject>,
    names: HashMap<u32, u64>,
    closed: Vec<u32>,
    requests: Vec<c_ulong>,
    fail_create: bool,
    fail_prime_export: bool,
    fail_close: bool,
    misalign_maps: bool,
    restarts: u32,
}

#[derive(Debug)]
struct Inner {
    backing: File,
    state: RefCell<MockState>,
    journal: Option<Journal>,
}

/// A fake DRM device node. Clones share state.
#[derive(Debug, Clone)]
pub struct MockDevice {
    inner: Rc<Inner>,
}

fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

fn sparse_file(size: u64) -> io::Result<File> {
    let file = tempfile::tempfile()?;
    file.set_len(size)?;
    Ok(file)
}

impl MockDevice {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_journal(journal: &Journal) -> Self {
        Self::build(Some(journal.clone()))
    }

    fn build(journal: Option<Journal>) -> Self {
        let backing = sparse_file(page_size() as u64).expect("backing file");
        let state = MockState {
            next_handle: 1,
            next_offset: page_size() as u64,
            ..MockState::default()
        };
        Self {
            inner: Rc::new(Inner {
                backing,
                state: RefCell::new(state),
                journal,
            }),
        }
    }

    fn note(&self, entry: String) {
        if let Some(journal) = &self.inner.journal {
            journal.borrow_mut().push(entry);
        }
    }

    /// Make a global name resolvable by GEM_OPEN to an object of `size` bytes.
    pub fn add_name(&self, name: u32, size: u64) {
        self.inner.state.borrow_mut().names.insert(name, size);
    }

    /// Allocate an object directly, as another client would, and return its handle.
    pub fn add_object(&self, size: u64) -> u32 {
        self.allocate(size, 0).expect("allocate object")
    }

    pub fn fail_create(&self, fail: bool) {
        self.inner.state.borrow_mut().fail_create = fail;
    }

    pub fn fail_prime_export(&self, fail: bool) {
        self.inner.state.borrow_mut().fail_prime_export = fail;
    }

    pub fn fail_close(&self, fail: bool) {
        self.inner.state.borrow_mut().fail_close = fail;
    }

    /// Hand out vmwgfx map handles that are off a page boundary.
    pub fn misalign_maps(&self, misalign: bool) {
        self.inner.state.borrow_mut().misalign_maps = misalign;
    }

    /// Answer the next `count` allocation requests with ERESTART.
    pub fn restart_allocations(&self, count: u32) {
        self.inner.state.borrow_mut().restarts = count;
    }

    pub fn live_objects(&self) -> usize {
        self.inner.state.borrow().objects.len()
    }

    pub fn closed(&self) -> Vec<u32> {
        self.inner.state.borrow().closed.clone()
    }

    pub fn flags(&self, handle: u32) -> Option<u32> {
        self.inner.state.borrow().objects.get(&handle).map(|obj| obj.flags)
    }

    pub fn object_size(&self, handle: u32) -> Option<u64> {
        self.inner.state.borrow().objects.get(&handle).map(|obj| obj.size)
    }

    /// How many times `request` was issued.
    pub fn count(&self, request: c_ulong) -> usize {
        self.inner
            .state
            .borrow()
            .requests
            .iter()
            .filter(|&&r| r == request)
            .count()
    }

    pub fn request_count(&self) -> usize {
        self.inner.state.borrow().requests.len()
    }

    /// Bytes of the device backing file at a fake mmap offset.
    pub fn read_backing(&self, offset: u64, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        self.inner
            .backing
            .read_exact_at(&mut bytes, offset)
            .expect("read backing");
        bytes
    }

    fn allocate(&self, size: u64, flags: u32) -> io::Result<u32> {
        let mut state = self.inner.state.borrow_mut();
        let page = page_size() as u64;
        let handle = state.next_handle;
        let offset = state.next_offset;

        let end = offset + size.div_ceil(page) * page;
        if self.inner.backing.metadata()?.len() < end {
            self.inner.backing.set_len(end)?;
        }

        state.next_handle += 1;
        state.next_offset = end;
        state.objects.insert(
            handle,
            MockObject {
                size,
                offset,
                flags,
                file: sparse_file(size)?,
            },
        );
        Ok(handle)
    }

    fn close(&self, handle: u32, what: &str) -> io::Result<()> {
        let mut state = self.inner.state.borrow_mut();
        if state.fail_close {
            return Err(errno(libc::EIO));
        }
        state.objects.remove(&handle).ok_or_else(|| errno(libc::EINVAL))?;
        state.closed.push(handle);
        drop(state);
        self.note(format!("{what} {handle}"));
        Ok(())
    }

    fn export(&self, handle: u32) -> io::Result<i32> {
        let state = self.inner.state.borrow();
        if state.fail_prime_export {
            return Err(errno(libc::ENOSYS));
        }
        let object = state.objects.get(&handle).ok_or_else(|| errno(libc::ENOENT))?;
        Ok(object.file.try_clone()?.into_raw_fd())
    }

    fn import(&self, fd: BorrowedFd<'_>) -> io::Result<u32> {
        let file = File::from(fd.try_clone_to_owned()?);
        let size = file.metadata()?.len();
        let ino = file.metadata()?.ino();

        let handle = self.allocate(size, 0)?;
        let mut state = self.inner.state.borrow_mut();
        if let Some(object) = state.objects.get_mut(&handle) {
            // Share the imported object's pages rather than fresh ones.
            object.file = file;
        }
        drop(state);
        self.note(format!("prime_import {handle} ino {ino}"));
        Ok(handle)
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DrmDevice for MockDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.backing.as_fd()
    }

    unsafe fn ioctl_raw(&self, request: c_ulong, arg: *mut c_void) -> io::Result<()> {
        self.inner.state.borrow_mut().requests.push(request);

        match request {
            ioctl::DRM_IOCTL_ROCKCHIP_GEM_CREATE => {
                let arg = &mut *arg.cast::<RockchipGemCreate>();
                if self.inner.state.borrow().fail_create {
                    return Err(errno(libc::ENOMEM));
                }
                arg.handle = self.allocate(arg.size, arg.flags)?;
                Ok(())
            }
            ioctl::DRM_IOCTL_ROCKCHIP_GEM_MAP_OFFSET => {
                let arg = &mut *arg.cast::<RockchipGemMapOff>();
                let state = self.inner.state.borrow();
                let object = state.objects.get(&arg.handle).ok_or_else(|| errno(libc::ENOENT))?;
                arg.offset = object.offset;
                Ok(())
            }
            ioctl::DRM_IOCTL_GEM_CLOSE => {
                let arg = &*arg.cast::<GemClose>();
                self.close(arg.handle, "gem_close")
            }
            ioctl::DRM_IOCTL_GEM_OPEN => {
                let arg = &mut *arg.cast::<GemOpen>();
                let size = self
                    .inner
                    .state
                    .borrow()
                    .names
                    .get(&arg.name)
                    .copied()
                    .ok_or_else(|| errno(libc::ENOENT))?;
                arg.handle = self.allocate(size, 0)?;
                arg.size = size;
                Ok(())
            }
            ioctl::DRM_IOCTL_PRIME_HANDLE_TO_FD => {
                let arg = &mut *arg.cast::<PrimeHandle>();
                arg.fd = self.export(arg.handle)?;
                Ok(())
            }
            ioctl::DRM_IOCTL_PRIME_FD_TO_HANDLE => {
                let arg = &mut *arg.cast::<PrimeHandle>();
                arg.handle = self.import(BorrowedFd::borrow_raw(arg.fd))?;
                Ok(())
            }
            ioctl::DRM_IOCTL_VMW_ALLOC_DMABUF => {
                let arg = &mut *arg.cast::<ioctl::VmwAllocDmabufArg>();
                {
                    let mut state = self.inner.state.borrow_mut();
                    if state.restarts > 0 {
                        state.restarts -= 1;
                        return Err(errno(libc::ERESTART));
                    }
                    if state.fail_create {
                        return Err(errno(libc::ENOMEM));
                    }
                }
                let size = arg.req.size;
                let handle = self.allocate(u64::from(size), 0)?;
                let state = self.inner.state.borrow();
                let offset = state.objects[&handle].offset + u64::from(state.misalign_maps);
                drop(state);
                arg.rep = ioctl::VmwDmabufRep {
                    map_handle: offset,
                    handle,
                    cur_gmr_id: 0,
                    cur_gmr_offset: 0,
                    pad64: 0,
                };
                Ok(())
            }
            ioctl::DRM_IOCTL_VMW_UNREF_DMABUF => {
                let arg = &*arg.cast::<ioctl::VmwUnrefDmabuf>();
                self.close(arg.handle, "vmw_unref")
            }
            _ => Err(errno(libc::ENOTTY)),
        }
    }

    fn unmap(&self, mapping: Mapping) -> io::Result<()> {
        self.note(format!("munmap {}", mapping.len()));
        mapping.unmap()
    }

    fn close_prime_fd(&self, fd: OwnedFd) {
        self.note(String::from("prime_close"));
        drop(fd);
    }
}

/// One request seen by [`MockAccelerator`].
#[derive(Debug, Clone, PartialEq)]
pub enum AccelCall {
    Import {
        width: u32,
        height: u32,
        format: i32,
    },
    Release(AccelHandle),
    Check {
        src: Option<AccelBuffer>,
        dst: AccelBuffer,
        src_rect: AccelRect,
        dst_rect: AccelRect,
        usage: Usage,
    },
    Fill {
        dst: AccelBuffer,
        rect: AccelRect,
        color: u32,
    },
    Process {
        src: AccelBuffer,
        dst: AccelBuffer,
        src_rect: AccelRect,
        dst_rect: AccelRect,
        options: AccelOptions,
        usage: Usage,
    },
}

#[derive(Debug, Default)]
struct AccelState {
    next_handle: u32,
    calls: Vec<AccelCall>,
    fail_import: bool,
    fail_check: bool,
    fail_process: bool,
}

/// A 2D engine that records every request. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockAccelerator {
    state: Rc<RefCell<AccelState>>,
    journal: Option<Journal>,
}

impl MockAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: &Journal) -> Self {
        Self {
            journal: Some(journal.clone()),
            ..Self::default()
        }
    }

    pub fn fail_import(&self, fail: bool) {
        self.state.borrow_mut().fail_import = fail;
    }

    pub fn fail_check(&self, fail: bool) {
        self.state.borrow_mut().fail_check = fail;
    }

    pub fn fail_process(&self, fail: bool) {
        self.state.borrow_mut().fail_process = fail;
    }

    pub fn calls(&self) -> Vec<AccelCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn imports(&self) -> Vec<AccelCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, AccelCall::Import { .. }))
            .collect()
    }

    pub fn last_process(&self) -> Option<AccelCall> {
        self.calls()
            .into_iter()
            .rev()
            .find(|call| matches!(call, AccelCall::Process { .. }))
    }

    fn record(&self, call: AccelCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl Accelerator for MockAccelerator {
    fn info(&self) -> Option<String> {
        Some(String::from("mock 2D engine"))
    }

    fn import_fd(
        &self,
        _fd: BorrowedFd<'_>,
        width: u32,
        height: u32,
        format: i32,
    ) -> Result<AccelHandle, AccelError> {
        self.record(AccelCall::Import { width, height, format });
        let mut state = self.state.borrow_mut();
        if state.fail_import {
            return Err(AccelError::new("importbuffer_fd", 0, "mock import failure"));
        }
        state.next_handle += 1;
        Ok(AccelHandle(state.next_handle))
    }

    fn release(&self, handle: AccelHandle) -> Result<(), AccelError> {
        self.record(AccelCall::Release(handle));
        if let Some(journal) = &self.journal {
            journal.borrow_mut().push(format!("accel_release {}", handle.0));
        }
        Ok(())
    }

    fn check(
        &self,
        src: Option<&AccelBuffer>,
        dst: &AccelBuffer,
        src_rect: &AccelRect,
        dst_rect: &AccelRect,
        usage: Usage,
    ) -> Result<(), AccelError> {
        self.record(AccelCall::Check {
            src: src.copied(),
            dst: *dst,
            src_rect: *src_rect,
            dst_rect: *dst_rect,
            usage,
        });
        if self.state.borrow().fail_check {
            return Err(AccelError::new("imcheck", -3, "invalid parameter"));
        }
        Ok(())
    }

    fn fill(&self, dst: &AccelBuffer, rect: &AccelRect, color: u32) -> Result<(), AccelError> {
        self.record(AccelCall::Fill {
            dst: *dst,
            rect: *rect,
            color,
        });
        Ok(())
    }

    fn process(
        &self,
        src: &AccelBuffer,
        dst: &AccelBuffer,
        src_rect: &AccelRect,
        dst_rect: &AccelRect,
        options: &AccelOptions,
        usage: Usage,
    ) -> Result<(), AccelError> {
        self.record(AccelCall::Process {
            src: *src,
            dst: *dst,
            src_rect: *src_rect,
            dst_rect: *dst_rect,
            options: *options,
            usage,
        });
        if self.state.borrow().fail_process {
            return Err(AccelError::new("improcess", 0, "device error"));
        }
        Ok(())
    }
}

/// A prime descriptor of `size` bytes that no driver knows yet.
pub fn foreign_prime_fd(size: u64) -> OwnedFd {
    OwnedFd::from(sparse_file(size).expect("prime file"))
}
