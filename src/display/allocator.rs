// src/display/allocator.rs
//! The narrow contract the display backend needs from a buffer allocation
//! library: create a presentable surface, lock its next front buffer, query
//! that buffer's layout, and hand it back.

use crate::display::types::{FourCc, UsageFlags};
use std::io;

/// Opaque identity of a buffer object. Two locks returning the same id refer
/// to the same backing memory; nothing else about the value is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferObjectId(pub usize);

/// Layout of a buffer object, queried once when it is first seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferObjectInfo {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: FourCc,
    /// Kernel memory handle (GEM handle) backing the buffer.
    pub handle: u32,
}

pub trait PresentableSurface {
    /// Takes the most recently rendered buffer out of the surface's pool.
    fn lock_front_buffer(&mut self) -> io::Result<BufferObjectId>;

    fn buffer_info(&self, bo: BufferObjectId) -> BufferObjectInfo;

    /// Returns a locked buffer to the pool.
    fn release_buffer(&mut self, bo: BufferObjectId);
}

pub trait BufferAllocator {
    type Surface: PresentableSurface;

    fn create_surface(
        &self,
        width: u32,
        height: u32,
        format: FourCc,
        usage: UsageFlags,
    ) -> io::Result<Self::Surface>;
}
