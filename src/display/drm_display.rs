// src/display/drm_display.rs
//! A single directly driven output: one connector, one mode, one controller,
//! and one presentable surface whose buffers are scanned out.
//!
//! ## Lifecycle
//! 1. `initialize()` - resolve topology, bind the allocator to the device
//! 2. `create_framebuffer_surface()` - surface sized to the resolved mode
//! 3. per frame: `lock_front_buffer()` -> `present_surface()` -> `release_buffer()`
//! 4. `Drop` - unregister framebuffers, destroy surface, destroy allocator,
//!    free connector, close device, in that order

use crate::config::DisplayConfig;
use crate::display::allocator::BufferAllocator;
use crate::display::buffers::{BufferTracker, Framebuffer};
use crate::display::error::{DisplayError, Result};
use crate::display::kms::KmsDevice;
use crate::display::present::{PresentOutcome, Presenter};
use crate::display::topology::Topology;
use crate::display::types::{ConnectorId, CrtcId, FlipCompletion, FourCc, ModeInfo, UsageFlags};
use crate::os::card::Card;
use log::{debug, error, info, trace, warn};
use std::io;
use std::time::Duration;

pub struct DrmDisplay<D: KmsDevice, A: BufferAllocator> {
    tracker: BufferTracker,
    presenter: Presenter,
    // Field order is teardown order: surface, allocator, connector, device.
    surface: Option<A::Surface>,
    allocator: A,
    topology: Topology,
    device: D,
}

impl<D: KmsDevice, A: BufferAllocator> DrmDisplay<D, A> {
    /// Resolves the output on `device` and binds an allocator to it.
    ///
    /// `flip_timeout` bounds synchronized presents; `None` waits indefinitely.
    pub fn initialize<F>(
        device: D,
        make_allocator: F,
        flip_timeout: Option<Duration>,
    ) -> Result<Self>
    where
        F: FnOnce(&D) -> io::Result<A>,
    {
        let topology = Topology::resolve(&device)?;

        let allocator = make_allocator(&device).map_err(|e| {
            error!("Creating allocator device failed: {}", e);
            DisplayError::AllocatorDeviceFailed(e)
        })?;

        info!(
            "Display initialized: {}x{} on connector {} via controller {}",
            topology.width(),
            topology.height(),
            topology.connector_id(),
            topology.crtc()
        );
        Ok(Self {
            tracker: BufferTracker::default(),
            presenter: Presenter::new(flip_timeout),
            surface: None,
            allocator,
            topology,
            device,
        })
    }

    /// Creates the presentable surface, sized to the resolved mode. Scan-out
    /// usage is always added to `usage`.
    pub fn create_framebuffer_surface(
        &mut self,
        format: FourCc,
        usage: UsageFlags,
    ) -> Result<&A::Surface> {
        if self.surface.is_some() {
            error!("Framebuffer surface already created");
            return Err(DisplayError::SurfaceExists);
        }

        let (width, height) = (self.width(), self.height());
        let usage = usage | UsageFlags::SCANOUT;
        let surface = self
            .allocator
            .create_surface(width, height, format, usage)
            .map_err(|source| {
                error!(
                    "Creating {}x{} {} surface failed: {}",
                    width, height, format, source
                );
                DisplayError::SurfaceCreateFailed {
                    width,
                    height,
                    format,
                    source,
                }
            })?;
        debug!("Framebuffer surface {}x{} {} ({:?})", width, height, format, usage);
        let surface = self.surface.insert(surface);
        Ok(&*surface)
    }

    /// Locks the surface's next front buffer, registering it with the kernel
    /// on first sight.
    pub fn lock_front_buffer(&mut self) -> Result<Framebuffer> {
        let surface = self.surface.as_mut().ok_or(DisplayError::NoSurface)?;
        self.tracker.lock_and_register(&mut self.device, surface)
    }

    /// Returns `buffer` to the surface's pool. Its kernel registration is kept.
    pub fn release_buffer(&mut self, buffer: &Framebuffer) {
        match self.surface.as_mut() {
            Some(surface) => self.tracker.release(surface, buffer),
            None => warn!("Releasing {:?} without a surface", buffer.bo),
        }
    }

    /// Shows `buffer`. With `synchronize`, blocks until the flip has been
    /// latched at vertical blank.
    pub fn present_surface(
        &mut self,
        buffer: &Framebuffer,
        synchronize: bool,
    ) -> Result<PresentOutcome> {
        trace!("Presenting fb {} (vsync: {})", buffer.fb_id, synchronize);
        self.presenter
            .present(&mut self.device, &self.topology, buffer, synchronize)
    }

    pub fn width(&self) -> u32 {
        self.topology.width()
    }

    pub fn height(&self) -> u32 {
        self.topology.height()
    }

    pub fn mode(&self) -> &ModeInfo {
        self.topology.mode()
    }

    pub fn connector_id(&self) -> ConnectorId {
        self.topology.connector_id()
    }

    pub fn crtc_id(&self) -> CrtcId {
        self.topology.crtc()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn surface(&self) -> Option<&A::Surface> {
        self.surface.as_ref()
    }

    pub fn tracked_buffers(&self) -> &[Framebuffer] {
        self.tracker.entries()
    }

    pub fn last_flip(&self) -> Option<FlipCompletion> {
        self.presenter.last_flip()
    }
}

impl<A: BufferAllocator> DrmDisplay<Card, A> {
    /// Opens the configured card and initializes a display on it.
    pub fn open<F>(config: &DisplayConfig, make_allocator: F) -> Result<Self>
    where
        F: FnOnce(&Card) -> io::Result<A>,
    {
        let card = Card::open(config.card_index)?;
        Self::initialize(card, make_allocator, config.vsync_timeout())
    }
}

#[cfg(has_gbm)]
impl DrmDisplay<Card, crate::display::gbm::GbmDevice> {
    /// Opens the configured card with a libgbm allocator.
    pub fn open_gbm(config: &DisplayConfig) -> Result<Self> {
        use std::os::fd::AsFd;
        Self::open(config, |card| crate::display::gbm::GbmDevice::new(card.as_fd()))
    }
}

impl<D: KmsDevice, A: BufferAllocator> Drop for DrmDisplay<D, A> {
    fn drop(&mut self) {
        debug!(
            "Tearing down display: {} framebuffers registered",
            self.tracker.len()
        );
        self.tracker.unregister_all(&mut self.device);
        drop(self.surface.take());
        // The allocator, connector and device follow in field order.
    }
}
