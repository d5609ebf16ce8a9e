// src/os/card.rs

//! The DRM device handle: an exclusively owned `/dev/dri/cardN` descriptor
//! speaking the kernel mode-setting ioctl protocol.

use crate::display::error::DisplayError;
use crate::display::kms::KmsDevice;
use crate::display::types::{
    ConnectionState, ConnectorId, ConnectorInfo, CrtcId, EncoderId, EncoderInfo, FlipCompletion,
    FourCc, FramebufferId, FramebufferSpec, KmsEvent, ModeInfo, RawModeTiming, Readiness,
    Resources,
};
use crate::os::drm_sys::{self, DrmEvent, DrmEventVblank, DrmModeModeInfo};
use crate::os::epoll::{EpollFlags, EventMonitor};
use log::{debug, error, info, trace, warn};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::mem::size_of;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Path of the character device for card `index`.
pub fn card_path(index: u32) -> PathBuf {
    PathBuf::from(format!("/dev/dri/card{}", index))
}

/// Kernel events are small; one read drains everything a flip produces.
const EVENT_READ_BUFFER_SIZE: usize = 1024;

#[derive(Debug)]
pub struct Card {
    monitor: EventMonitor,
    file: File,
    index: u32,
    path: PathBuf,
}

impl Card {
    /// Opens `/dev/dri/card{index}` read/write.
    pub fn open(index: u32) -> Result<Self, DisplayError> {
        let path = card_path(index);
        Self::open_path(&path, index)
    }

    pub fn open_path(path: &Path, index: u32) -> Result<Self, DisplayError> {
        let open_failed = |source: io::Error| {
            error!("open({}) failed: {}", path.display(), source);
            DisplayError::DeviceOpenFailed {
                path: path.to_path_buf(),
                source,
            }
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)
            .map_err(open_failed)?;

        let monitor = EventMonitor::watch(file.as_fd()).map_err(open_failed)?;

        info!("Opened DRM device {} (fd {})", path.display(), file.as_raw_fd());
        Ok(Self {
            monitor,
            file,
            index,
            path: path.to_path_buf(),
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs one ioctl, restarting it when interrupted the way libdrm does.
    fn ioctl<F>(&self, mut request: F) -> io::Result<()>
    where
        F: FnMut(RawFd) -> nix::Result<libc::c_int>,
    {
        let fd = self.file.as_raw_fd();
        loop {
            match request(fd) {
                Ok(_) => return Ok(()),
                Err(nix::errno::Errno::EINTR) | Err(nix::errno::Errno::EAGAIN) => continue,
                Err(errno) => return Err(io::Error::from(errno)),
            }
        }
    }
}

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for Card {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Drop for Card {
    fn drop(&mut self) {
        debug!("Closing DRM device {}", self.path.display());
    }
}

fn mode_from_raw(raw: &DrmModeModeInfo) -> ModeInfo {
    ModeInfo {
        width: raw.hdisplay,
        height: raw.vdisplay,
        refresh_hz: raw.vrefresh,
        preferred: raw.type_ & drm_sys::DRM_MODE_TYPE_PREFERRED != 0,
        name: raw.name,
        raw: RawModeTiming {
            clock: raw.clock,
            hsync_start: raw.hsync_start,
            hsync_end: raw.hsync_end,
            htotal: raw.htotal,
            hskew: raw.hskew,
            vsync_start: raw.vsync_start,
            vsync_end: raw.vsync_end,
            vtotal: raw.vtotal,
            vscan: raw.vscan,
            flags: raw.flags,
            type_: raw.type_,
        },
    }
}

fn mode_to_raw(mode: &ModeInfo) -> DrmModeModeInfo {
    DrmModeModeInfo {
        clock: mode.raw.clock,
        hdisplay: mode.width,
        hsync_start: mode.raw.hsync_start,
        hsync_end: mode.raw.hsync_end,
        htotal: mode.raw.htotal,
        hskew: mode.raw.hskew,
        vdisplay: mode.height,
        vsync_start: mode.raw.vsync_start,
        vsync_end: mode.raw.vsync_end,
        vtotal: mode.raw.vtotal,
        vscan: mode.raw.vscan,
        vrefresh: mode.refresh_hz,
        flags: mode.raw.flags,
        type_: mode.raw.type_,
        name: mode.name,
    }
}

fn connection_from_raw(connection: u32) -> ConnectionState {
    match connection {
        drm_sys::DRM_MODE_CONNECTED => ConnectionState::Connected,
        drm_sys::DRM_MODE_DISCONNECTED => ConnectionState::Disconnected,
        _ => ConnectionState::Unknown,
    }
}

/// Maps what epoll reported for the card onto a wait outcome. Pending input
/// wins over a hang-up so queued events are still read.
fn readiness(flags: EpollFlags, bound_elapsed: bool) -> io::Result<Readiness> {
    if flags.intersects(EpollFlags::EPOLLIN | EpollFlags::EPOLLPRI) {
        Ok(Readiness::Ready)
    } else if flags.intersects(EpollFlags::EPOLLERR | EpollFlags::EPOLLHUP) {
        Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            format!("DRM device reported {:?}", flags),
        ))
    } else if bound_elapsed {
        Ok(Readiness::TimedOut)
    } else {
        Ok(Readiness::Spurious)
    }
}

/// Decodes the `drm_event` records the kernel wrote into `buf`.
///
/// Truncated trailing records are dropped with a warning.
pub fn decode_events(buf: &[u8]) -> Vec<KmsEvent> {
    let mut events = Vec::new();
    let mut offset = 0;

    while offset + size_of::<DrmEvent>() <= buf.len() {
        // SAFETY: bounds checked above; read_unaligned tolerates any alignment.
        let header: DrmEvent =
            unsafe { std::ptr::read_unaligned(buf[offset..].as_ptr() as *const DrmEvent) };
        let length = header.length as usize;
        if length < size_of::<DrmEvent>() || offset + length > buf.len() {
            warn!(
                "Dropping malformed DRM event (type {}, length {}) at offset {}",
                header.type_, header.length, offset
            );
            break;
        }

        let event = match header.type_ {
            drm_sys::DRM_EVENT_FLIP_COMPLETE | drm_sys::DRM_EVENT_VBLANK
                if length >= size_of::<DrmEventVblank>() =>
            {
                // SAFETY: the record is at least as long as DrmEventVblank.
                let vblank: DrmEventVblank = unsafe {
                    std::ptr::read_unaligned(buf[offset..].as_ptr() as *const DrmEventVblank)
                };
                if header.type_ == drm_sys::DRM_EVENT_FLIP_COMPLETE {
                    KmsEvent::FlipComplete {
                        tag: vblank.user_data,
                        completion: FlipCompletion {
                            crtc: CrtcId(vblank.crtc_id),
                            sequence: vblank.sequence,
                            tv_sec: vblank.tv_sec,
                            tv_usec: vblank.tv_usec,
                        },
                    }
                } else {
                    KmsEvent::Vblank {
                        tag: vblank.user_data,
                        sequence: vblank.sequence,
                    }
                }
            }
            other => KmsEvent::Other { event_type: other },
        };
        trace!("Decoded DRM event {:?}", event);
        events.push(event);
        offset += length;
    }

    events
}

impl KmsDevice for Card {
    fn resources(&self) -> io::Result<Resources> {
        // The lists can change under us (hotplug) between the counting pass and
        // the filling pass; retry until both passes agree.
        loop {
            let mut res = drm_sys::DrmModeCardRes::default();
            self.ioctl(|fd| unsafe { drm_sys::drm_mode_getresources(fd, &mut res) })?;

            let mut connectors = vec![0u32; res.count_connectors as usize];
            let mut encoders = vec![0u32; res.count_encoders as usize];
            let mut crtcs = vec![0u32; res.count_crtcs as usize];

            let mut fill = drm_sys::DrmModeCardRes {
                connector_id_ptr: connectors.as_mut_ptr() as u64,
                count_connectors: connectors.len() as u32,
                encoder_id_ptr: encoders.as_mut_ptr() as u64,
                count_encoders: encoders.len() as u32,
                crtc_id_ptr: crtcs.as_mut_ptr() as u64,
                count_crtcs: crtcs.len() as u32,
                ..Default::default()
            };
            self.ioctl(|fd| unsafe { drm_sys::drm_mode_getresources(fd, &mut fill) })?;

            if fill.count_connectors as usize != connectors.len()
                || fill.count_encoders as usize != encoders.len()
                || fill.count_crtcs as usize != crtcs.len()
            {
                debug!("Resource counts changed between queries, retrying");
                continue;
            }

            return Ok(Resources {
                connectors: connectors.into_iter().map(ConnectorId).collect(),
                encoders: encoders.into_iter().map(EncoderId).collect(),
                crtcs: crtcs.into_iter().map(CrtcId).collect(),
            });
        }
    }

    fn connector(&self, id: ConnectorId) -> io::Result<ConnectorInfo> {
        loop {
            let mut counts = drm_sys::DrmModeGetConnector {
                connector_id: id.0,
                ..Default::default()
            };
            self.ioctl(|fd| unsafe { drm_sys::drm_mode_getconnector(fd, &mut counts) })?;

            let mut modes = vec![DrmModeModeInfo::default(); counts.count_modes as usize];
            let mut encoders = vec![0u32; counts.count_encoders as usize];
            let mut props = vec![0u32; counts.count_props as usize];
            let mut prop_values = vec![0u64; counts.count_props as usize];

            let mut fill = drm_sys::DrmModeGetConnector {
                connector_id: id.0,
                modes_ptr: modes.as_mut_ptr() as u64,
                count_modes: modes.len() as u32,
                encoders_ptr: encoders.as_mut_ptr() as u64,
                count_encoders: encoders.len() as u32,
                props_ptr: props.as_mut_ptr() as u64,
                prop_values_ptr: prop_values.as_mut_ptr() as u64,
                count_props: props.len() as u32,
                ..Default::default()
            };
            self.ioctl(|fd| unsafe { drm_sys::drm_mode_getconnector(fd, &mut fill) })?;

            if fill.count_modes as usize != modes.len()
                || fill.count_encoders as usize != encoders.len()
                || fill.count_props as usize != props.len()
            {
                debug!("Connector {} changed between queries, retrying", id);
                continue;
            }

            return Ok(ConnectorInfo {
                id: ConnectorId(fill.connector_id),
                state: connection_from_raw(fill.connection),
                current_encoder: (fill.encoder_id != 0).then_some(EncoderId(fill.encoder_id)),
                encoders: encoders.into_iter().map(EncoderId).collect(),
                modes: modes.iter().map(mode_from_raw).collect(),
            });
        }
    }

    fn encoder(&self, id: EncoderId) -> io::Result<EncoderInfo> {
        let mut enc = drm_sys::DrmModeGetEncoder {
            encoder_id: id.0,
            ..Default::default()
        };
        self.ioctl(|fd| unsafe { drm_sys::drm_mode_getencoder(fd, &mut enc) })?;
        Ok(EncoderInfo {
            id: EncoderId(enc.encoder_id),
            crtc: (enc.crtc_id != 0).then_some(CrtcId(enc.crtc_id)),
            possible_crtcs: enc.possible_crtcs,
        })
    }

    fn add_framebuffer(&mut self, spec: &FramebufferSpec) -> io::Result<FramebufferId> {
        let FourCc(pixel_format) = spec.format;
        let mut cmd = drm_sys::DrmModeFbCmd2 {
            width: spec.width,
            height: spec.height,
            pixel_format,
            handles: spec.handles,
            pitches: spec.pitches,
            offsets: spec.offsets,
            ..Default::default()
        };
        self.ioctl(|fd| unsafe { drm_sys::drm_mode_addfb2(fd, &mut cmd) })?;
        trace!(
            "ADDFB2 {}x{} {} -> fb {}",
            spec.width,
            spec.height,
            spec.format,
            cmd.fb_id
        );
        Ok(FramebufferId(cmd.fb_id))
    }

    fn remove_framebuffer(&mut self, fb: FramebufferId) -> io::Result<()> {
        let mut id = fb.0;
        self.ioctl(|fd| unsafe { drm_sys::drm_mode_rmfb(fd, &mut id) })
    }

    fn set_crtc(
        &mut self,
        crtc: CrtcId,
        fb: FramebufferId,
        connectors: &[ConnectorId],
        mode: &ModeInfo,
    ) -> io::Result<()> {
        let connector_ids: Vec<u32> = connectors.iter().map(|c| c.0).collect();
        let mut cmd = drm_sys::DrmModeCrtc {
            set_connectors_ptr: connector_ids.as_ptr() as u64,
            count_connectors: connector_ids.len() as u32,
            crtc_id: crtc.0,
            fb_id: fb.0,
            x: 0,
            y: 0,
            mode_valid: 1,
            mode: mode_to_raw(mode),
            ..Default::default()
        };
        self.ioctl(|fd| unsafe { drm_sys::drm_mode_setcrtc(fd, &mut cmd) })
    }

    fn page_flip(&mut self, crtc: CrtcId, fb: FramebufferId, tag: u64) -> io::Result<()> {
        let mut cmd = drm_sys::DrmModeCrtcPageFlip {
            crtc_id: crtc.0,
            fb_id: fb.0,
            flags: drm_sys::DRM_MODE_PAGE_FLIP_EVENT,
            reserved: 0,
            user_data: tag,
        };
        self.ioctl(|fd| unsafe { drm_sys::drm_mode_page_flip(fd, &mut cmd) })
    }

    fn wait_readable(&mut self, timeout: Option<Duration>) -> io::Result<Readiness> {
        let started = Instant::now();
        let flags = self.monitor.wait(timeout)?;
        let bound_elapsed = timeout.is_some_and(|limit| started.elapsed() >= limit);
        readiness(flags, bound_elapsed)
    }

    fn read_events(&mut self) -> io::Result<Vec<KmsEvent>> {
        let mut buf = [0u8; EVENT_READ_BUFFER_SIZE];
        let len = match (&self.file).read(&mut buf) {
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(decode_events(&buf[..len]))
    }
}
