// src/lib.rs

//! Direct display output over the Linux kernel mode-setting interface.
//!
//! [`display::DrmDisplay`] drives one output of a `/dev/dri/cardN` device
//! without a display server: it picks a connected connector, its mode and a
//! display controller, allocates a presentable surface, registers that
//! surface's buffers as kernel framebuffers and shows them either immediately
//! or at vertical blank.

pub mod config;
pub mod display;
pub mod os;
