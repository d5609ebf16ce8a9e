// src/display/buffers.rs
//! Maps buffer objects handed out by the allocator to kernel framebuffers.
//!
//! The allocator cycles a small fixed pool of buffer objects, so each one is
//! registered with the kernel the first time it is seen and the registration
//! is reused on every later lock. Entries live until the tracker is drained at
//! teardown.

use crate::display::allocator::{BufferObjectId, PresentableSurface};
use crate::display::error::{DisplayError, Result};
use crate::display::kms::KmsDevice;
use crate::display::types::{FourCc, FramebufferId, FramebufferSpec};
use log::{debug, error, trace, warn};

/// Depth of the allocator's buffer pool. Exceeding it means the allocator is
/// producing more distinct buffers than it should.
pub const MAX_BUFFERS: usize = 4;

/// A buffer object together with its kernel framebuffer registration.
/// Immutable once registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framebuffer {
    pub bo: BufferObjectId,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: FourCc,
    pub fb_id: FramebufferId,
}

#[derive(Debug)]
pub struct BufferTracker {
    entries: Vec<Framebuffer>,
    capacity: usize,
}

impl Default for BufferTracker {
    fn default() -> Self {
        Self::new(MAX_BUFFERS)
    }
}

impl BufferTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Framebuffer] {
        &self.entries
    }

    pub fn get(&self, bo: BufferObjectId) -> Option<&Framebuffer> {
        self.entries.iter().find(|e| e.bo == bo)
    }

    /// Locks the surface's next front buffer and returns its framebuffer,
    /// registering it with the kernel on first sight.
    ///
    /// # Panics
    ///
    /// Panics if a previously unseen buffer would grow the set past its
    /// capacity.
    pub fn lock_and_register<D, S>(
        &mut self,
        device: &mut D,
        surface: &mut S,
    ) -> Result<Framebuffer>
    where
        D: KmsDevice + ?Sized,
        S: PresentableSurface + ?Sized,
    {
        let bo = surface.lock_front_buffer().map_err(|e| {
            error!("Locking front buffer failed: {}", e);
            DisplayError::BufferLockFailed(e)
        })?;

        if let Some(hit) = self.get(bo) {
            trace!("Buffer {:?} already registered as fb {}", bo, hit.fb_id);
            return Ok(*hit);
        }

        assert!(
            self.entries.len() < self.capacity,
            "buffer tracker full: {} buffers already registered",
            self.capacity
        );

        let info = surface.buffer_info(bo);
        let spec = FramebufferSpec::single_plane(
            info.width,
            info.height,
            info.format,
            info.handle,
            info.stride,
        );
        let fb_id = match device.add_framebuffer(&spec) {
            Ok(fb_id) => fb_id,
            Err(source) => {
                error!(
                    "Registering framebuffer for {:?} ({}x{}, stride {}, {}) failed: {}",
                    bo, info.width, info.height, info.stride, info.format, source
                );
                // Not tracked, so the next lock of this buffer retries.
                surface.release_buffer(bo);
                return Err(DisplayError::FramebufferRegistrationFailed {
                    width: info.width,
                    height: info.height,
                    stride: info.stride,
                    format: info.format,
                    source,
                });
            }
        };

        let entry = Framebuffer {
            bo,
            width: info.width,
            height: info.height,
            stride: info.stride,
            format: info.format,
            fb_id,
        };
        debug!(
            "Registered {:?} as fb {} ({}x{}, stride {}, {})",
            bo, fb_id, entry.width, entry.height, entry.stride, entry.format
        );
        self.entries.push(entry);
        Ok(entry)
    }

    /// Hands the buffer back to the surface. The registration stays cached.
    pub fn release<S: PresentableSurface + ?Sized>(&self, surface: &mut S, buffer: &Framebuffer) {
        trace!("Releasing {:?} (fb {})", buffer.bo, buffer.fb_id);
        surface.release_buffer(buffer.bo);
    }

    /// Unregisters every framebuffer, most recent first.
    pub fn unregister_all<D: KmsDevice + ?Sized>(&mut self, device: &mut D) {
        while let Some(entry) = self.entries.pop() {
            match device.remove_framebuffer(entry.fb_id) {
                Ok(()) => debug!("Removed fb {}", entry.fb_id),
                Err(e) => warn!("Removing fb {} failed: {}", entry.fb_id, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::allocator::BufferAllocator;
    use crate::display::mock::{KmsCall, MockAllocator, MockKms, MockSurface};
    use crate::display::types::UsageFlags;
    use test_log::test;

    fn surface_with_locks(locks: &[usize]) -> MockSurface {
        MockAllocator::new()
            .with_lock_sequence(locks.iter().copied().map(BufferObjectId).collect())
            .create_surface(1920, 1080, FourCc::XRGB8888, UsageFlags::SCANOUT)
            .unwrap()
    }

    fn registrations(kms: &MockKms) -> usize {
        kms.calls()
            .iter()
            .filter(|c| matches!(c, KmsCall::AddFramebuffer(_)))
            .count()
    }

    #[test]
    fn relocking_a_known_buffer_skips_the_kernel() {
        let mut kms = MockKms::new();
        let mut surface = surface_with_locks(&[0x10, 0x10]);
        let mut tracker = BufferTracker::default();

        let first = tracker.lock_and_register(&mut kms, &mut surface).unwrap();
        tracker.release(&mut surface, &first);
        let second = tracker.lock_and_register(&mut kms, &mut surface).unwrap();

        assert_eq!(first, second);
        assert_eq!(registrations(&kms), 1);
        assert_eq!(surface.info_queries(), 1);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn registers_a_single_plane_from_buffer_layout() {
        let mut kms = MockKms::new();
        let mut surface = surface_with_locks(&[0x10]);
        let mut tracker = BufferTracker::default();

        let fb = tracker.lock_and_register(&mut kms, &mut surface).unwrap();
        assert_eq!((fb.width, fb.height, fb.stride), (1920, 1080, 7680));
        assert_eq!(fb.format, FourCc::XRGB8888);

        let info = surface.buffer_info(BufferObjectId(0x10));
        assert_eq!(
            kms.calls()[0],
            KmsCall::AddFramebuffer(FramebufferSpec {
                width: 1920,
                height: 1080,
                format: FourCc::XRGB8888,
                handles: [info.handle, 0, 0, 0],
                pitches: [7680, 0, 0, 0],
                offsets: [0; 4],
            })
        );
    }

    #[test]
    fn failed_registration_is_not_cached() {
        let mut kms = MockKms::new();
        kms.fail_next_add_framebuffer(libc::EINVAL);
        let mut surface = surface_with_locks(&[0x10, 0x10]);
        let mut tracker = BufferTracker::default();

        let err = tracker.lock_and_register(&mut kms, &mut surface).unwrap_err();
        assert!(matches!(
            err,
            DisplayError::FramebufferRegistrationFailed { width: 1920, stride: 7680, .. }
        ));
        assert!(tracker.is_empty());
        assert!(!surface.is_locked(BufferObjectId(0x10)));

        let fb = tracker.lock_and_register(&mut kms, &mut surface).unwrap();
        assert_eq!(fb.bo, BufferObjectId(0x10));
        assert_eq!(registrations(&kms), 2);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn lock_failure_is_reported() {
        let mut kms = MockKms::new();
        let mut surface = surface_with_locks(&[]);
        surface.fail_next_lock();
        let mut tracker = BufferTracker::default();

        assert!(matches!(
            tracker.lock_and_register(&mut kms, &mut surface),
            Err(DisplayError::BufferLockFailed(_))
        ));
        assert!(kms.calls().is_empty());
    }

    #[test]
    #[should_panic(expected = "buffer tracker full")]
    fn exceeding_capacity_is_a_contract_violation() {
        let mut kms = MockKms::new();
        let mut surface = surface_with_locks(&[1, 2, 3]);
        let mut tracker = BufferTracker::new(2);

        for _ in 0..3 {
            let fb = tracker.lock_and_register(&mut kms, &mut surface).unwrap();
            tracker.release(&mut surface, &fb);
        }
    }

    #[test]
    fn unregister_all_removes_every_framebuffer() {
        let mut kms = MockKms::new();
        let mut surface = surface_with_locks(&[1, 2, 1, 3]);
        let mut tracker = BufferTracker::default();

        let mut ids = Vec::new();
        for _ in 0..4 {
            let fb = tracker.lock_and_register(&mut kms, &mut surface).unwrap();
            ids.push(fb.fb_id);
            tracker.release(&mut surface, &fb);
        }
        assert_eq!(ids[0], ids[2]);
        assert_eq!(tracker.len(), 3);

        tracker.unregister_all(&mut kms);
        assert!(tracker.is_empty());
        let removed: Vec<_> = kms
            .calls()
            .iter()
            .filter_map(|c| match c {
                KmsCall::RemoveFramebuffer(fb) => Some(*fb),
                _ => None,
            })
            .collect();
        assert_eq!(removed, vec![ids[3], ids[1], ids[0]]);
    }
}
