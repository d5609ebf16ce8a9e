// src/display/error.rs
//! Error taxonomy for the display backend.

use crate::display::types::{ConnectorId, CrtcId, FourCc, FramebufferId};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("failed to open DRM device {path}")]
    DeviceOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to query mode-setting resources")]
    ResourceQueryFailed(#[source] io::Error),
    #[error("no connected connector found")]
    NoConnector,
    #[error("connector {0} advertises no modes")]
    NoMode(ConnectorId),
    #[error("no controller can drive connector {0}")]
    NoController(ConnectorId),
    #[error("failed to create allocator device")]
    AllocatorDeviceFailed(#[source] io::Error),
    #[error("failed to create {width}x{height} {format} surface")]
    SurfaceCreateFailed {
        width: u32,
        height: u32,
        format: FourCc,
        #[source]
        source: io::Error,
    },
    #[error("a framebuffer surface already exists")]
    SurfaceExists,
    #[error("no framebuffer surface has been created")]
    NoSurface,
    #[error("surface has no front buffer to lock")]
    BufferLockFailed(#[source] io::Error),
    #[error("failed to register {width}x{height} framebuffer (stride {stride}, {format})")]
    FramebufferRegistrationFailed {
        width: u32,
        height: u32,
        stride: u32,
        format: FourCc,
        #[source]
        source: io::Error,
    },
    #[error("failed to set controller {crtc} to framebuffer {fb}")]
    DisplaySetFailed {
        crtc: CrtcId,
        fb: FramebufferId,
        #[source]
        source: io::Error,
    },
    #[error("failed to submit page flip of framebuffer {fb} on controller {crtc}")]
    PageFlipSubmitFailed {
        crtc: CrtcId,
        fb: FramebufferId,
        #[source]
        source: io::Error,
    },
    #[error("waiting for page flip completion failed")]
    EventWaitFailed(#[source] io::Error),
    #[error("page flip did not complete within {0} ms")]
    TimedOut(u64),
}

impl DisplayError {
    /// Initialization-phase errors leave the instance unusable; everything
    /// else concerns a single frame and may be retried on the next one.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DisplayError::DeviceOpenFailed { .. }
                | DisplayError::ResourceQueryFailed(_)
                | DisplayError::NoConnector
                | DisplayError::NoMode(_)
                | DisplayError::NoController(_)
                | DisplayError::AllocatorDeviceFailed(_)
                | DisplayError::SurfaceCreateFailed { .. }
        )
    }
}

pub type Result<T, E = DisplayError> = std::result::Result<T, E>;
