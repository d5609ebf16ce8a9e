// src/display/gbm.rs
//! Allocator binding over libgbm.
//!
//! Compiled only when `build.rs` finds libgbm through pkg-config.
//! [`GbmDevice`] must outlive every [`GbmSurface`] created from it, and both
//! must be dropped before the DRM descriptor they were created on is closed;
//! [`crate::display::DrmDisplay`] drops them in that order.

use crate::display::allocator::{
    BufferAllocator, BufferObjectId, BufferObjectInfo, PresentableSurface,
};
use crate::display::types::{FourCc, UsageFlags};
use log::{debug, trace};
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::os::raw::{c_int, c_void};
use std::ptr::NonNull;

#[allow(non_camel_case_types)]
mod ffi {
    use std::os::raw::{c_int, c_void};

    #[repr(C)]
    pub struct gbm_device {
        _private: [u8; 0],
    }

    #[repr(C)]
    pub struct gbm_surface {
        _private: [u8; 0],
    }

    #[repr(C)]
    pub struct gbm_bo {
        _private: [u8; 0],
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    pub union gbm_bo_handle {
        pub ptr: *mut c_void,
        pub s32: i32,
        pub u32_: u32,
        pub s64: i64,
        pub u64_: u64,
    }

    #[link(name = "gbm")]
    extern "C" {
        pub fn gbm_create_device(fd: c_int) -> *mut gbm_device;
        pub fn gbm_device_destroy(gbm: *mut gbm_device);
        pub fn gbm_surface_create(
            gbm: *mut gbm_device,
            width: u32,
            height: u32,
            format: u32,
            flags: u32,
        ) -> *mut gbm_surface;
        pub fn gbm_surface_destroy(surface: *mut gbm_surface);
        pub fn gbm_surface_lock_front_buffer(surface: *mut gbm_surface) -> *mut gbm_bo;
        pub fn gbm_surface_release_buffer(surface: *mut gbm_surface, bo: *mut gbm_bo);
        pub fn gbm_bo_get_width(bo: *mut gbm_bo) -> u32;
        pub fn gbm_bo_get_height(bo: *mut gbm_bo) -> u32;
        pub fn gbm_bo_get_stride(bo: *mut gbm_bo) -> u32;
        pub fn gbm_bo_get_format(bo: *mut gbm_bo) -> u32;
        pub fn gbm_bo_get_handle(bo: *mut gbm_bo) -> gbm_bo_handle;
    }
}

#[derive(Debug)]
pub struct GbmDevice {
    raw: NonNull<ffi::gbm_device>,
}

impl GbmDevice {
    /// Binds libgbm to an open DRM descriptor. The descriptor is borrowed,
    /// not owned; it must stay open until this device is dropped.
    pub fn new(fd: BorrowedFd<'_>) -> io::Result<Self> {
        let raw = unsafe { ffi::gbm_create_device(fd.as_raw_fd() as c_int) };
        let raw = NonNull::new(raw).ok_or_else(io::Error::last_os_error)?;
        debug!("Created GBM device on fd {}", fd.as_raw_fd());
        Ok(Self { raw })
    }
}

impl BufferAllocator for GbmDevice {
    type Surface = GbmSurface;

    fn create_surface(
        &self,
        width: u32,
        height: u32,
        format: FourCc,
        usage: UsageFlags,
    ) -> io::Result<GbmSurface> {
        let raw = unsafe {
            ffi::gbm_surface_create(self.raw.as_ptr(), width, height, format.0, usage.bits())
        };
        let raw = NonNull::new(raw).ok_or_else(io::Error::last_os_error)?;
        debug!(
            "Created {}x{} {} GBM surface (usage {:?})",
            width, height, format, usage
        );
        Ok(GbmSurface { raw })
    }
}

impl Drop for GbmDevice {
    fn drop(&mut self) {
        unsafe { ffi::gbm_device_destroy(self.raw.as_ptr()) };
        debug!("Destroyed GBM device");
    }
}

#[derive(Debug)]
pub struct GbmSurface {
    raw: NonNull<ffi::gbm_surface>,
}

impl GbmSurface {
    /// Raw `gbm_surface*`, for handing to EGL as a native window.
    pub fn as_ptr(&self) -> *mut c_void {
        self.raw.as_ptr() as *mut c_void
    }
}

// Buffer object ids are the `gbm_bo*` addresses libgbm hands out; they are
// only ever turned back into pointers for the surface that produced them.
fn bo_ptr(bo: BufferObjectId) -> *mut ffi::gbm_bo {
    bo.0 as *mut ffi::gbm_bo
}

impl PresentableSurface for GbmSurface {
    fn lock_front_buffer(&mut self) -> io::Result<BufferObjectId> {
        let bo = unsafe { ffi::gbm_surface_lock_front_buffer(self.raw.as_ptr()) };
        if bo.is_null() {
            return Err(io::Error::last_os_error());
        }
        trace!("Locked GBM front buffer {:p}", bo);
        Ok(BufferObjectId(bo as usize))
    }

    fn buffer_info(&self, bo: BufferObjectId) -> BufferObjectInfo {
        let ptr = bo_ptr(bo);
        unsafe {
            BufferObjectInfo {
                width: ffi::gbm_bo_get_width(ptr),
                height: ffi::gbm_bo_get_height(ptr),
                stride: ffi::gbm_bo_get_stride(ptr),
                format: FourCc(ffi::gbm_bo_get_format(ptr)),
                handle: ffi::gbm_bo_get_handle(ptr).u32_,
            }
        }
    }

    fn release_buffer(&mut self, bo: BufferObjectId) {
        unsafe { ffi::gbm_surface_release_buffer(self.raw.as_ptr(), bo_ptr(bo)) };
    }
}

impl Drop for GbmSurface {
    fn drop(&mut self) {
        unsafe { ffi::gbm_surface_destroy(self.raw.as_ptr()) };
        debug!("Destroyed GBM surface");
    }
}
