// src/display/types.rs
//! Plain data types shared by the topology resolver, buffer tracker and
//! presentation engine.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! kms_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

kms_id!(
    /// Kernel id of a physical output connection point.
    ConnectorId
);
kms_id!(
    /// Kernel id of an encoder.
    EncoderId
);
kms_id!(
    /// Kernel id of a scan-out controller (CRTC).
    CrtcId
);
kms_id!(
    /// Kernel id of a registered framebuffer.
    FramebufferId
);

/// Whether something is plugged into a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Unknown,
}

/// A display timing/resolution descriptor as advertised by a connector.
///
/// `raw` carries the full kernel timing block so the mode can be handed back
/// to the kernel unchanged when programming the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeInfo {
    pub width: u16,
    pub height: u16,
    pub refresh_hz: u32,
    pub preferred: bool,
    pub name: [u8; 32],
    pub raw: RawModeTiming,
}

/// Timing fields passed through to the kernel untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawModeTiming {
    pub clock: u32,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub flags: u32,
    pub type_: u32,
}

impl ModeInfo {
    /// A mode with only geometry filled in.
    pub fn new(width: u16, height: u16, refresh_hz: u32, preferred: bool) -> Self {
        let mut name = [0u8; 32];
        let label = format!("{}x{}", width, height);
        let len = label.len().min(name.len() - 1);
        name[..len].copy_from_slice(&label.as_bytes()[..len]);
        Self {
            width,
            height,
            refresh_hz,
            preferred,
            name,
            raw: RawModeTiming::default(),
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

impl fmt::Display for ModeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.refresh_hz)?;
        if self.preferred {
            write!(f, " (preferred)")?;
        }
        Ok(())
    }
}

/// A connector as reported by the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorInfo {
    pub id: ConnectorId,
    pub state: ConnectionState,
    /// Encoder currently bound to this connector, if any.
    pub current_encoder: Option<EncoderId>,
    /// Encoders that can drive this connector.
    pub encoders: Vec<EncoderId>,
    pub modes: Vec<ModeInfo>,
}

/// An encoder as reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderInfo {
    pub id: EncoderId,
    /// Controller currently feeding this encoder, if any.
    pub crtc: Option<CrtcId>,
    /// Bitmask over positions in [`Resources::crtcs`].
    pub possible_crtcs: u32,
}

/// The device's mode-setting resource lists, in kernel order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
    pub connectors: Vec<ConnectorId>,
    pub encoders: Vec<EncoderId>,
    pub crtcs: Vec<CrtcId>,
}

/// A four-character pixel format code as used by DRM and GBM.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub u32);

impl FourCc {
    pub const XRGB8888: FourCc = FourCc::from_bytes(*b"XR24");
    pub const ARGB8888: FourCc = FourCc::from_bytes(*b"AR24");

    pub const fn from_bytes(code: [u8; 4]) -> Self {
        FourCc(u32::from_le_bytes(code))
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.to_bytes() {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({} / {:#010x})", self, self.0)
    }
}

impl FromStr for FourCc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 || !s.is_ascii() {
            return Err(format!("'{}' is not a four-character format code", s));
        }
        // Short codes such as "R8" are space padded, as in drm_fourcc.h.
        let mut code = [b' '; 4];
        code[..bytes.len()].copy_from_slice(bytes);
        Ok(FourCc::from_bytes(code))
    }
}

impl Serialize for FourCc {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.to_string().trim_end())
    }
}

impl<'de> Deserialize<'de> for FourCc {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

bitflags! {
    /// Buffer usage flags understood by the allocator (`GBM_BO_USE_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct UsageFlags: u32 {
        const SCANOUT = 1 << 0;
        const CURSOR = 1 << 1;
        const RENDERING = 1 << 2;
        const WRITE = 1 << 3;
        const LINEAR = 1 << 4;
        const PROTECTED = 1 << 5;
    }
}

/// A request to register a single-plane framebuffer with the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferSpec {
    pub width: u32,
    pub height: u32,
    pub format: FourCc,
    /// Per-plane memory handles; only plane 0 is populated.
    pub handles: [u32; 4],
    pub pitches: [u32; 4],
    pub offsets: [u32; 4],
}

impl FramebufferSpec {
    pub fn single_plane(width: u32, height: u32, format: FourCc, handle: u32, stride: u32) -> Self {
        Self {
            width,
            height,
            format,
            handles: [handle, 0, 0, 0],
            pitches: [stride, 0, 0, 0],
            offsets: [0; 4],
        }
    }
}

/// Timing of a completed page flip, as delivered by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipCompletion {
    pub crtc: CrtcId,
    pub sequence: u32,
    pub tv_sec: u32,
    pub tv_usec: u32,
}

/// An event read from the device descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmsEvent {
    /// A page flip submitted with `tag` has been latched by the hardware.
    FlipComplete { tag: u64, completion: FlipCompletion },
    Vblank { tag: u64, sequence: u32 },
    /// Some event type this backend does not handle.
    Other { event_type: u32 },
}

/// Outcome of waiting on the device descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Events are ready to be read.
    Ready,
    /// Woke up without data (signal, spurious wake-up).
    Spurious,
    /// The wait bound elapsed.
    TimedOut,
}
