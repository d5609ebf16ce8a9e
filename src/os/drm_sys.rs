// src/os/drm_sys.rs

//! Raw mirrors of the kernel DRM mode-setting ABI (`drm.h` / `drm_mode.h`)
//! and the `nix` ioctl wrappers that carry them.
//!
//! Only the handful of requests the display backend needs are declared here.
//! Pointer fields are `u64` as in the kernel headers; callers fill them with
//! addresses of buffers they own for the duration of the ioctl.

/// The DRM ioctl type byte (`DRM_IOCTL_BASE`).
const DRM_IOCTL_BASE: u8 = b'd';

pub const DRM_DISPLAY_MODE_LEN: usize = 32;

/// `drm_mode_get_connector.connection` value for an attached display.
pub const DRM_MODE_CONNECTED: u32 = 1;
pub const DRM_MODE_DISCONNECTED: u32 = 2;

/// Mode type bit set on the mode the sink reports as native.
pub const DRM_MODE_TYPE_PREFERRED: u32 = 1 << 3;

/// Ask the kernel to queue a completion event for a page flip.
pub const DRM_MODE_PAGE_FLIP_EVENT: u32 = 0x01;

pub const DRM_EVENT_VBLANK: u32 = 0x01;
pub const DRM_EVENT_FLIP_COMPLETE: u32 = 0x02;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DrmModeCardRes {
    pub fb_id_ptr: u64,
    pub crtc_id_ptr: u64,
    pub connector_id_ptr: u64,
    pub encoder_id_ptr: u64,
    pub count_fbs: u32,
    pub count_crtcs: u32,
    pub count_connectors: u32,
    pub count_encoders: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DrmModeModeInfo {
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub type_: u32,
    pub name: [u8; DRM_DISPLAY_MODE_LEN],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DrmModeGetConnector {
    pub encoders_ptr: u64,
    pub modes_ptr: u64,
    pub props_ptr: u64,
    pub prop_values_ptr: u64,
    pub count_modes: u32,
    pub count_props: u32,
    pub count_encoders: u32,
    pub encoder_id: u32,
    pub connector_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: u32,
    pub mm_width: u32,
    pub mm_height: u32,
    pub subpixel: u32,
    pub pad: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DrmModeGetEncoder {
    pub encoder_id: u32,
    pub encoder_type: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DrmModeCrtc {
    pub set_connectors_ptr: u64,
    pub count_connectors: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub x: u32,
    pub y: u32,
    pub gamma_size: u32,
    pub mode_valid: u32,
    pub mode: DrmModeModeInfo,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DrmModeFbCmd2 {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_format: u32,
    pub flags: u32,
    pub handles: [u32; 4],
    pub pitches: [u32; 4],
    pub offsets: [u32; 4],
    pub modifier: [u64; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DrmModeCrtcPageFlip {
    pub crtc_id: u32,
    pub fb_id: u32,
    pub flags: u32,
    pub reserved: u32,
    pub user_data: u64,
}

/// Header shared by every event read from the device descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DrmEvent {
    pub type_: u32,
    pub length: u32,
}

/// Body of `DRM_EVENT_VBLANK` and `DRM_EVENT_FLIP_COMPLETE`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DrmEventVblank {
    pub base: DrmEvent,
    pub user_data: u64,
    pub tv_sec: u32,
    pub tv_usec: u32,
    pub sequence: u32,
    pub crtc_id: u32,
}

nix::ioctl_readwrite!(drm_mode_getresources, DRM_IOCTL_BASE, 0xA0, DrmModeCardRes);
nix::ioctl_readwrite!(drm_mode_setcrtc, DRM_IOCTL_BASE, 0xA2, DrmModeCrtc);
nix::ioctl_readwrite!(drm_mode_getencoder, DRM_IOCTL_BASE, 0xA6, DrmModeGetEncoder);
nix::ioctl_readwrite!(drm_mode_getconnector, DRM_IOCTL_BASE, 0xA7, DrmModeGetConnector);
nix::ioctl_readwrite!(drm_mode_rmfb, DRM_IOCTL_BASE, 0xAF, u32);
nix::ioctl_readwrite!(drm_mode_page_flip, DRM_IOCTL_BASE, 0xB0, DrmModeCrtcPageFlip);
nix::ioctl_readwrite!(drm_mode_addfb2, DRM_IOCTL_BASE, 0xB8, DrmModeFbCmd2);
