//! Surface buffer objects and their geometry.
//!
//! A [`SurfaceBuffer`] carries the kernel identity of one allocation (local
//! handle, optional flink name, optional prime descriptor) together with the
//! pixel geometry derived from its format. Rows reserved for an application
//! header sit in front of the pixel payload; `offset` points past them.

use std::fmt;
use std::num::NonZeroU32;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::ptr::NonNull;

use crate::error::{DrmError, DrmResult};
use crate::format::{FormatInfo, FormatTable, Fourcc};
use crate::kernel::Mapping;

/// Identifier of a buffer inside the driver that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(NonZeroU32);

impl BufferId {
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out buffer ids; ids are never reused by one allocator.
#[derive(Debug)]
pub(crate) struct BufferIds {
    next: u32,
}

impl BufferIds {
    pub(crate) fn new() -> Self {
        Self { next: 1 }
    }

    pub(crate) fn next(&mut self) -> BufferId {
        let id = NonZeroU32::new(self.next).unwrap_or(NonZeroU32::MIN);
        self.next = self.next.wrapping_add(1).max(1);
        BufferId(id)
    }
}

/// Where the kernel should place a fresh buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Directly displayable by the display controller.
    Scanout,
    /// Shadow copy of a scanout buffer, composed by the CPU.
    Shadow,
    /// Anything else.
    #[default]
    General,
}

impl Placement {
    pub fn is_scanout(self) -> bool {
        self == Placement::Scanout
    }
}

/// Geometry requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub format: Fourcc,
    /// Bytes reserved in front of the pixels for an application header.
    pub header_size: u32,
    pub width: u32,
    pub height: u32,
}

impl BufferDesc {
    pub fn new(format: Fourcc, width: u32, height: u32) -> Self {
        Self {
            format,
            header_size: 0,
            width,
            height,
        }
    }

    pub fn with_header(mut self, header_size: u32) -> Self {
        self.header_size = header_size;
        self
    }
}

/// Row pitch in bytes: `width * cpp` rounded up to a multiple of four.
pub fn pitch_for(width: u32, cpp: u32) -> Option<u32> {
    width.checked_mul(cpp)?.checked_add(3).map(|raw| raw & !3)
}

/// Number of whole rows needed to hold `header_size` bytes.
pub fn header_rows(header_size: u32, pitch: u32) -> u32 {
    if header_size == 0 || pitch == 0 {
        return 0;
    }
    header_size.div_ceil(pitch)
}

/// Geometry derived from a format and a [`BufferDesc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub info: FormatInfo,
    pub pitch: u32,
    pub header_rows: u32,
    /// Total bytes: `(height + header_rows) * pitch`.
    pub size: usize,
    /// Byte offset of the first pixel row.
    pub offset: usize,
}

impl Geometry {
    /// Compute the geometry of a fresh allocation.
    pub fn compute(table: FormatTable, desc: &BufferDesc) -> DrmResult<Geometry> {
        let info = table
            .resolve(desc.format)
            .ok_or(DrmError::UnsupportedFormat(desc.format))?;
        let overflow = || DrmError::GeometryOverflow {
            width: desc.width,
            height: desc.height,
            header_size: desc.header_size,
        };

        let pitch = pitch_for(desc.width, info.cpp).ok_or_else(overflow)?;
        let header_rows = header_rows(desc.header_size, pitch);
        let rows = u64::from(desc.height) + u64::from(header_rows);
        let size = rows
            .checked_mul(u64::from(pitch))
            .and_then(|size| usize::try_from(size).ok())
            .ok_or_else(overflow)?;
        if size == 0 {
            return Err(DrmError::ZeroSize {
                width: desc.width,
                height: desc.height,
            });
        }

        Ok(Geometry {
            info,
            pitch,
            header_rows,
            size,
            offset: header_rows as usize * pitch as usize,
        })
    }

    /// Recompute the geometry of an imported buffer and check the caller's
    /// pitch and, when known, total size against it.
    pub fn validate(
        table: FormatTable,
        desc: &BufferDesc,
        pitch: u32,
        size: Option<usize>,
    ) -> DrmResult<Geometry> {
        let geometry = Geometry::compute(table, desc)?;
        if pitch != geometry.pitch {
            return Err(DrmError::BadPitch {
                pitch,
                expected: geometry.pitch,
            });
        }
        if let Some(size) = size {
            if size != geometry.size {
                return Err(DrmError::BadSize {
                    size,
                    expected: geometry.size,
                });
            }
        }
        Ok(geometry)
    }
}

/// The backend-independent part of a buffer object.
#[derive(Debug)]
pub struct SurfaceBuffer {
    id: BufferId,
    pub(crate) handle: u32,
    pub(crate) name: Option<u32>,
    pub(crate) prime_fd: Option<OwnedFd>,
    format: Fourcc,
    bpp: u32,
    cpp: u32,
    width: u32,
    height: u32,
    pitch: u32,
    header_rows: u32,
    size: usize,
    offset: usize,
    scanout: bool,
    pub(crate) mapping: Option<Mapping>,
}

impl SurfaceBuffer {
    pub(crate) fn new(
        id: BufferId,
        handle: u32,
        desc: &BufferDesc,
        geometry: &Geometry,
        scanout: bool,
    ) -> Self {
        Self {
            id,
            handle,
            name: None,
            prime_fd: None,
            format: desc.format,
            bpp: geometry.info.bpp,
            cpp: geometry.info.cpp,
            width: desc.width,
            height: desc.height,
            pitch: geometry.pitch,
            header_rows: geometry.header_rows,
            size: geometry.size,
            offset: geometry.offset,
            scanout,
            mapping: None,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Backend-local kernel handle.
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// Global (flink) name, when the buffer was opened by name.
    pub fn name(&self) -> Option<u32> {
        self.name
    }

    pub fn prime_fd(&self) -> Option<BorrowedFd<'_>> {
        self.prime_fd.as_ref().map(|fd| fd.as_fd())
    }

    pub fn format(&self) -> Fourcc {
        self.format
    }

    pub fn bpp(&self) -> u32 {
        self.bpp
    }

    pub fn cpp(&self) -> u32 {
        self.cpp
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the pixel payload, header rows excluded.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pitch(&self) -> u32 {
        self.pitch
    }

    pub fn header_rows(&self) -> u32 {
        self.header_rows
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Byte offset of the first pixel row.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_scanout(&self) -> bool {
        self.scanout
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// Start of the CPU mapping, if mapped.
    pub fn mapped_ptr(&self) -> Option<NonNull<u8>> {
        self.mapping.as_ref().map(Mapping::as_ptr)
    }

    /// The whole mapped buffer, header rows included.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.mapping.as_ref().map(Mapping::as_slice)
    }

    pub fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.mapping.as_mut().map(Mapping::as_mut_slice)
    }

    /// The mapped header region.
    pub fn header_mut(&mut self) -> Option<&mut [u8]> {
        let offset = self.offset;
        self.bytes_mut().map(|bytes| &mut bytes[..offset])
    }

    /// The mapped pixel payload, header rows excluded.
    pub fn pixels_mut(&mut self) -> Option<&mut [u8]> {
        let offset = self.offset;
        self.bytes_mut().map(|bytes| &mut bytes[offset..])
    }
}
