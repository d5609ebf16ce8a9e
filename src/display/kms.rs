// src/display/kms.rs
//! The kernel mode-setting protocol, as consumed by the display backend.
//!
//! [`crate::os::card::Card`] implements this over a real `/dev/dri/cardN`
//! descriptor; tests implement it in memory. Every method maps onto one
//! kernel request (or, for `wait_readable`, one readiness wait) and reports
//! failures as the kernel's `errno` wrapped in [`std::io::Error`].

use crate::display::types::{
    ConnectorId, ConnectorInfo, CrtcId, EncoderId, EncoderInfo, FramebufferId, FramebufferSpec,
    KmsEvent, ModeInfo, Readiness, Resources,
};
use std::io;
use std::time::Duration;

pub trait KmsDevice {
    /// Lists connector, encoder and controller ids, in kernel order.
    fn resources(&self) -> io::Result<Resources>;

    fn connector(&self, id: ConnectorId) -> io::Result<ConnectorInfo>;

    fn encoder(&self, id: EncoderId) -> io::Result<EncoderInfo>;

    /// Registers a framebuffer and returns its kernel id.
    fn add_framebuffer(&mut self, spec: &FramebufferSpec) -> io::Result<FramebufferId>;

    fn remove_framebuffer(&mut self, fb: FramebufferId) -> io::Result<()>;

    /// Synchronously points `crtc` at `fb`, driving `connectors` with `mode`.
    fn set_crtc(
        &mut self,
        crtc: CrtcId,
        fb: FramebufferId,
        connectors: &[ConnectorId],
        mode: &ModeInfo,
    ) -> io::Result<()>;

    /// Queues a flip to `fb` at the next vertical blank. The kernel reports
    /// completion with a [`KmsEvent::FlipComplete`] carrying `tag`.
    fn page_flip(&mut self, crtc: CrtcId, fb: FramebufferId, tag: u64) -> io::Result<()>;

    /// Blocks until the descriptor is readable. `None` waits indefinitely.
    fn wait_readable(&mut self, timeout: Option<Duration>) -> io::Result<Readiness>;

    /// Reads and decodes every pending event.
    fn read_events(&mut self) -> io::Result<Vec<KmsEvent>>;
}
