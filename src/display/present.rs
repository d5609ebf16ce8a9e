// src/display/present.rs
//! Puts framebuffers on screen, either immediately or at the next vertical
//! blank.
//!
//! ## Synchronized presentation
//!
//! ```text
//! Idle --page_flip ok--> FlipRequested --matching FlipComplete--> Idle
//!   \--page_flip err--> (return error, never waits)
//! ```
//!
//! While a flip is outstanding the calling thread blocks on the device
//! descriptor. Each flip carries a fresh tag, and only the completion event
//! echoing that tag ends the wait.

use crate::display::buffers::Framebuffer;
use crate::display::error::{DisplayError, Result};
use crate::display::kms::KmsDevice;
use crate::display::topology::Topology;
use crate::display::types::{FlipCompletion, KmsEvent, Readiness};
use log::{debug, error, trace, warn};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipState {
    Idle,
    FlipRequested { tag: u64 },
}

/// What a successful present did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The controller was reprogrammed synchronously.
    Set,
    /// A page flip was latched at vertical blank.
    Flipped(FlipCompletion),
}

#[derive(Debug)]
pub struct Presenter {
    state: FlipState,
    next_tag: u64,
    flip_timeout: Option<Duration>,
    last_flip: Option<FlipCompletion>,
}

impl Default for Presenter {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Presenter {
    /// `flip_timeout` bounds the vsync wait; `None` waits indefinitely.
    pub fn new(flip_timeout: Option<Duration>) -> Self {
        Self {
            state: FlipState::Idle,
            next_tag: 1,
            flip_timeout,
            last_flip: None,
        }
    }

    pub fn state(&self) -> FlipState {
        self.state
    }

    pub fn last_flip(&self) -> Option<FlipCompletion> {
        self.last_flip
    }

    pub fn present<D: KmsDevice + ?Sized>(
        &mut self,
        device: &mut D,
        topology: &Topology,
        buffer: &Framebuffer,
        synchronize: bool,
    ) -> Result<PresentOutcome> {
        if synchronize {
            self.flip(device, topology, buffer).map(PresentOutcome::Flipped)
        } else {
            self.set(device, topology, buffer).map(|()| PresentOutcome::Set)
        }
    }

    fn set<D: KmsDevice + ?Sized>(
        &mut self,
        device: &mut D,
        topology: &Topology,
        buffer: &Framebuffer,
    ) -> Result<()> {
        let crtc = topology.crtc();
        trace!("SETCRTC controller {} -> fb {}", crtc, buffer.fb_id);
        device
            .set_crtc(crtc, buffer.fb_id, &[topology.connector_id()], topology.mode())
            .map_err(|source| {
                error!("Setting controller {} to fb {} failed: {}", crtc, buffer.fb_id, source);
                DisplayError::DisplaySetFailed {
                    crtc,
                    fb: buffer.fb_id,
                    source,
                }
            })
    }

    fn flip<D: KmsDevice + ?Sized>(
        &mut self,
        device: &mut D,
        topology: &Topology,
        buffer: &Framebuffer,
    ) -> Result<FlipCompletion> {
        let crtc = topology.crtc();
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1).max(1);

        trace!("PAGE_FLIP controller {} -> fb {} (tag {})", crtc, buffer.fb_id, tag);
        device.page_flip(crtc, buffer.fb_id, tag).map_err(|source| {
            error!("Page flip of fb {} on controller {} failed: {}", buffer.fb_id, crtc, source);
            DisplayError::PageFlipSubmitFailed {
                crtc,
                fb: buffer.fb_id,
                source,
            }
        })?;
        self.state = FlipState::FlipRequested { tag };

        let result = self.wait_for_flip(device, tag);
        // Whatever happened, this call no longer owns an outstanding flip.
        self.state = FlipState::Idle;
        if let Ok(completion) = &result {
            self.last_flip = Some(*completion);
        }
        result
    }

    /// Blocks until the completion tagged `tag` arrives. With a flip timeout
    /// configured, the bound covers the whole wait, not each wake-up.
    fn wait_for_flip<D: KmsDevice + ?Sized>(
        &mut self,
        device: &mut D,
        tag: u64,
    ) -> Result<FlipCompletion> {
        let deadline = self.flip_timeout.map(|limit| Instant::now() + limit);
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            match device.wait_readable(remaining) {
                Ok(Readiness::Ready) => {
                    if let Some(completion) = drain_events(device, tag)? {
                        return Ok(completion);
                    }
                }
                Ok(Readiness::Spurious) => {
                    trace!("Spurious wake-up while waiting for flip {}", tag);
                }
                Ok(Readiness::TimedOut) => return Err(self.timed_out(tag)),
                Err(e) => {
                    // The kernel may still complete the flip; nothing here
                    // knows whether it will.
                    error!("Waiting for flip {} failed: {}", tag, e);
                    return Err(DisplayError::EventWaitFailed(e));
                }
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(self.timed_out(tag));
            }
        }
    }

    fn timed_out(&self, tag: u64) -> DisplayError {
        let ms = self.flip_timeout.map_or(0, |t| t.as_millis() as u64);
        warn!("Flip {} did not complete within {} ms", tag, ms);
        DisplayError::TimedOut(ms)
    }
}

/// Reads one batch of events, returning the completion of flip `tag` if it
/// is among them.
fn drain_events<D: KmsDevice + ?Sized>(device: &mut D, tag: u64) -> Result<Option<FlipCompletion>> {
    let events = device.read_events().map_err(|e| {
        error!("Reading events while waiting for flip {} failed: {}", tag, e);
        DisplayError::EventWaitFailed(e)
    })?;

    for event in events {
        match event {
            KmsEvent::FlipComplete { tag: t, completion } if t == tag => {
                debug!(
                    "Flip {} complete: frame {} at {}.{:06}",
                    tag, completion.sequence, completion.tv_sec, completion.tv_usec
                );
                return Ok(Some(completion));
            }
            KmsEvent::FlipComplete { tag: t, .. } => {
                warn!("Ignoring completion of stale flip {} while waiting for {}", t, tag);
            }
            other => trace!("Ignoring {:?} while waiting for flip {}", other, tag),
        }
    }
    Ok(None)
}
