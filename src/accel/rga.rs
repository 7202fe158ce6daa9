//! Rockchip RGA engine through librga's im2d C API.
//!
//! Layouts follow librga 1.x `im2d_type.h`. `im_opt_t` is padded past its
//! known fields; librga only reads what its own header version defines.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::ptr;

use super::{AccelBuffer, AccelError, AccelHandle, AccelOptions, AccelRect, Accelerator, Usage};

const IM_STATUS_NOERROR: c_int = 2;
const IM_STATUS_SUCCESS: c_int = 1;

/// `querystring` selector returning every section.
const RGA_ALL: c_int = 10;

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct ImRect {
    x: c_int,
    y: c_int,
    width: c_int,
    height: c_int,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct ImColorkeyRange {
    max: c_int,
    min: c_int,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct ImNn {
    scale_r: c_int,
    scale_g: c_int,
    scale_b: c_int,
    offset_r: c_int,
    offset_g: c_int,
    offset_b: c_int,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RgaBuffer {
    vir_addr: *mut c_void,
    phy_addr: *mut c_void,
    fd: c_int,
    width: c_int,
    height: c_int,
    wstride: c_int,
    hstride: c_int,
    format: c_int,
    color_space_mode: c_int,
    global_alpha: c_int,
    rd_mode: c_int,
    color: c_int,
    colorkey_range: ImColorkeyRange,
    nn: ImNn,
    rop_code: c_int,
    handle: c_int,
}

impl RgaBuffer {
    fn empty() -> Self {
        Self {
            vir_addr: ptr::null_mut(),
            phy_addr: ptr::null_mut(),
            fd: 0,
            width: 0,
            height: 0,
            wstride: 0,
            hstride: 0,
            format: 0,
            color_space_mode: 0,
            global_alpha: -1,
            rd_mode: 0,
            color: 0,
            colorkey_range: ImColorkeyRange::default(),
            nn: ImNn::default(),
            rop_code: 0,
            handle: 0,
        }
    }

    /// Equivalent of `wrapbuffer_handle()`; strides are in pixels.
    fn from_view(view: &AccelBuffer) -> Self {
        let cpp = view.cpp.max(1);
        Self {
            handle: view.handle.0 as c_int,
            width: view.width as c_int,
            height: view.height as c_int,
            wstride: (view.pitch / cpp) as c_int,
            hstride: view.height as c_int,
            format: view.format,
            global_alpha: view.global_alpha.map_or(-1, c_int::from),
            ..Self::empty()
        }
    }
}

#[repr(C)]
struct ImHandleParam {
    width: u32,
    height: u32,
    format: u32,
}

#[repr(C)]
struct ImOpt {
    version: c_int,
    color: c_int,
    colorkey_range: ImColorkeyRange,
    nn: ImNn,
    rop_code: c_int,
    priority: c_int,
    core: c_int,
    mosaic_mode: c_int,
    reserve: [u8; 512],
}

impl ImOpt {
    fn from_options(options: &AccelOptions) -> Self {
        let colorkey_range = options
            .colorkey
            .map(|range| ImColorkeyRange {
                max: range.max as c_int,
                min: range.min as c_int,
            })
            .unwrap_or_default();
        Self {
            version: 0,
            color: 0,
            colorkey_range,
            nn: ImNn::default(),
            rop_code: options.rop_code.unwrap_or(0),
            priority: 0,
            core: 0,
            mosaic_mode: 0,
            reserve: [0; 512],
        }
    }
}

#[link(name = "rga")]
extern "C" {
    fn querystring(name: c_int) -> *const c_char;
    fn importbuffer_fd(fd: c_int, param: *mut ImHandleParam) -> c_int;
    fn releasebuffer_handle(handle: c_int) -> c_int;
    fn imStrError_t(status: c_int) -> *const c_char;
    fn imcheck_t(
        src: RgaBuffer,
        dst: RgaBuffer,
        pat: RgaBuffer,
        src_rect: ImRect,
        dst_rect: ImRect,
        pat_rect: ImRect,
        mode_usage: c_int,
    ) -> c_int;
    fn improcess(
        src: RgaBuffer,
        dst: RgaBuffer,
        pat: RgaBuffer,
        srect: ImRect,
        drect: ImRect,
        prect: ImRect,
        opt: *mut ImOpt,
        usage: c_int,
    ) -> c_int;
}

fn im_rect(rect: &AccelRect) -> ImRect {
    ImRect {
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
    }
}

fn status_result(op: &'static str, status: c_int) -> Result<(), AccelError> {
    if status == IM_STATUS_NOERROR || status == IM_STATUS_SUCCESS {
        return Ok(());
    }
    // SAFETY: imStrError_t returns a static string for any status value.
    let message = unsafe {
        let text = imStrError_t(status);
        if text.is_null() {
            String::from("unknown error")
        } else {
            CStr::from_ptr(text).to_string_lossy().into_owned()
        }
    };
    Err(AccelError::new(op, status, message))
}

/// The RGA engine. Stateless; librga keeps its own device context.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rga;

impl Rga {
    pub fn new() -> Self {
        Self
    }
}

impl Accelerator for Rga {
    fn info(&self) -> Option<String> {
        // SAFETY: querystring returns a pointer to a static buffer or null.
        unsafe {
            let text = querystring(RGA_ALL);
            (!text.is_null()).then(|| CStr::from_ptr(text).to_string_lossy().into_owned())
        }
    }

    fn import_fd(
        &self,
        fd: BorrowedFd<'_>,
        width: u32,
        height: u32,
        format: i32,
    ) -> Result<AccelHandle, AccelError> {
        let mut param = ImHandleParam {
            width,
            height,
            format: format as u32,
        };
        // SAFETY: `param` outlives the call and `fd` is open.
        let handle = unsafe { importbuffer_fd(fd.as_raw_fd(), &mut param) };
        if handle <= 0 {
            return Err(AccelError::new(
                "importbuffer_fd",
                handle,
                std::io::Error::last_os_error().to_string(),
            ));
        }
        Ok(AccelHandle(handle as u32))
    }

    fn release(&self, handle: AccelHandle) -> Result<(), AccelError> {
        // SAFETY: plain integer handle.
        let status = unsafe { releasebuffer_handle(handle.0 as c_int) };
        status_result("releasebuffer_handle", status)
    }

    fn check(
        &self,
        src: Option<&AccelBuffer>,
        dst: &AccelBuffer,
        src_rect: &AccelRect,
        dst_rect: &AccelRect,
        usage: Usage,
    ) -> Result<(), AccelError> {
        let src = src.map_or_else(RgaBuffer::empty, RgaBuffer::from_view);
        // SAFETY: all arguments are passed by value.
        let status = unsafe {
            imcheck_t(
                src,
                RgaBuffer::from_view(dst),
                RgaBuffer::empty(),
                im_rect(src_rect),
                im_rect(dst_rect),
                ImRect::default(),
                usage.bits() as c_int,
            )
        };
        status_result("imcheck", status)
    }

    fn fill(&self, dst: &AccelBuffer, rect: &AccelRect, color: u32) -> Result<(), AccelError> {
        let mut target = RgaBuffer::from_view(dst);
        target.color = color as c_int;
        let mut opt = ImOpt::from_options(&AccelOptions::default());
        opt.color = color as c_int;
        let usage = Usage::COLOR_FILL | Usage::SYNC;
        // SAFETY: `opt` outlives the call; buffers are passed by value.
        let status = unsafe {
            improcess(
                RgaBuffer::empty(),
                target,
                RgaBuffer::empty(),
                ImRect::default(),
                im_rect(rect),
                ImRect::default(),
                &mut opt,
                usage.bits() as c_int,
            )
        };
        status_result("imfill", status)
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
        let mut opt = ImOpt::from_options(options);
        // SAFETY: `opt` outlives the call; buffers are passed by value.
        let status = unsafe {
            improcess(
                RgaBuffer::from_view(src),
                RgaBuffer::from_view(dst),
                RgaBuffer::empty(),
                im_rect(src_rect),
                im_rect(dst_rect),
                ImRect::default(),
                &mut opt,
                usage.bits() as c_int,
            )
        };
        status_result("improcess", status)
    }
}
