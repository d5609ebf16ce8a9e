// src/display/mod.rs
//! Kernel mode-setting display backend.
//!
//! - `topology`: choose connector, mode and display controller
//! - `buffers`: lock surface buffers and register them as framebuffers
//! - `present`: immediate and vsync-synchronized presentation
//! - `drm_display`: the owning object tying the above together
//!
//! The kernel is reached through the [`KmsDevice`] trait and buffer memory
//! through [`BufferAllocator`], so everything above them runs against mocks
//! in tests.

pub mod allocator;
pub mod buffers;
pub mod drm_display;
pub mod error;
#[cfg(has_gbm)]
pub mod gbm;
pub mod kms;
pub mod present;
pub mod topology;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use allocator::{BufferAllocator, BufferObjectId, BufferObjectInfo, PresentableSurface};
pub use buffers::{BufferTracker, Framebuffer, MAX_BUFFERS};
pub use drm_display::DrmDisplay;
pub use error::{DisplayError, Result};
#[cfg(has_gbm)]
pub use gbm::{GbmDevice, GbmSurface};
pub use kms::KmsDevice;
pub use present::{FlipState, PresentOutcome, Presenter};
pub use topology::Topology;
pub use types::{
    ConnectionState, ConnectorId, CrtcId, EncoderId, FlipCompletion, FourCc, FramebufferId,
    ModeInfo, UsageFlags,
};
