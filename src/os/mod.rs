// src/os/mod.rs
//! Linux kernel plumbing: the DRM card device, its ioctl surface, and epoll.

pub mod card;
pub mod drm_sys;
pub mod epoll;
