// src/display/mock.rs
//! In-memory stand-ins for the kernel device and the allocator, recording
//! every call so tests can assert on exactly what reached the "kernel".

use crate::display::allocator::{
    BufferAllocator, BufferObjectId, BufferObjectInfo, PresentableSurface,
};
use crate::display::kms::KmsDevice;
use crate::display::types::{
    ConnectionState, ConnectorId, ConnectorInfo, CrtcId, EncoderId, EncoderInfo, FlipCompletion,
    FourCc, FramebufferId, FramebufferSpec, KmsEvent, ModeInfo, Readiness, Resources, UsageFlags,
};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

/// Shared, ordered record of teardown-relevant events across mocks.
pub type Journal = Rc<RefCell<Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KmsCall {
    AddFramebuffer(FramebufferSpec),
    RemoveFramebuffer(FramebufferId),
    SetCrtc {
        crtc: CrtcId,
        fb: FramebufferId,
        connectors: Vec<ConnectorId>,
        mode: ModeInfo,
    },
    PageFlip {
        crtc: CrtcId,
        fb: FramebufferId,
        tag: u64,
    },
}

#[derive(Debug, Default)]
pub struct MockKms {
    resources: Resources,
    connectors: HashMap<ConnectorId, ConnectorInfo>,
    encoders: HashMap<EncoderId, EncoderInfo>,
    resources_error: Option<i32>,
    add_fb_error: Option<i32>,
    set_crtc_error: Option<i32>,
    page_flip_error: Option<i32>,
    calls: Vec<KmsCall>,
    next_fb: u32,
    flip_sequence: u32,
    waits: VecDeque<io::Result<Readiness>>,
    wait_count: usize,
    last_wait_timeout: Option<Option<Duration>>,
    wait_stall: Option<Duration>,
    events: VecDeque<Vec<KmsEvent>>,
    journal: Option<Journal>,
}

impl MockKms {
    pub fn new() -> Self {
        let mut kms = Self::default();
        kms.next_fb = 100;
        kms
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn add_crtc(&mut self, id: CrtcId) {
        self.resources.crtcs.push(id);
    }

    pub fn add_encoder(&mut self, id: EncoderId, crtc: Option<CrtcId>, possible_crtcs: u32) {
        self.resources.encoders.push(id);
        self.encoders.insert(
            id,
            EncoderInfo {
                id,
                crtc,
                possible_crtcs,
            },
        );
    }

    pub fn add_connector(
        &mut self,
        id: ConnectorId,
        state: ConnectionState,
        current_encoder: Option<EncoderId>,
        encoders: Vec<EncoderId>,
        modes: Vec<ModeInfo>,
    ) {
        self.resources.connectors.push(id);
        self.connectors.insert(
            id,
            ConnectorInfo {
                id,
                state,
                current_encoder,
                encoders,
                modes,
            },
        );
    }

    pub fn fail_resources(&mut self, errno: i32) {
        self.resources_error = Some(errno);
    }

    pub fn fail_next_add_framebuffer(&mut self, errno: i32) {
        self.add_fb_error = Some(errno);
    }

    pub fn fail_next_set_crtc(&mut self, errno: i32) {
        self.set_crtc_error = Some(errno);
    }

    pub fn fail_next_page_flip(&mut self, errno: i32) {
        self.page_flip_error = Some(errno);
    }

    /// Scripts the outcome of the next unscripted `wait_readable`. Without a
    /// script the descriptor is ready whenever events are queued.
    pub fn queue_wait(&mut self, outcome: io::Result<Readiness>) {
        self.waits.push_back(outcome);
    }

    /// Makes every `wait_readable` sleep for `stall` before answering.
    pub fn stall_waits(&mut self, stall: Duration) {
        self.wait_stall = Some(stall);
    }

    /// Queues a batch of events returned by one `read_events` call.
    pub fn queue_events(&mut self, batch: Vec<KmsEvent>) {
        self.events.push_back(batch);
    }

    pub fn calls(&self) -> Vec<KmsCall> {
        self.calls.clone()
    }

    pub fn wait_count(&self) -> usize {
        self.wait_count
    }

    pub fn last_wait_timeout(&self) -> Option<Option<Duration>> {
        self.last_wait_timeout
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    fn record(&self, entry: String) {
        if let Some(journal) = &self.journal {
            journal.borrow_mut().push(entry);
        }
    }
}

impl KmsDevice for MockKms {
    fn resources(&self) -> io::Result<Resources> {
        match self.resources_error {
            Some(errno) => Err(io::Error::from_raw_os_error(errno)),
            None => Ok(self.resources.clone()),
        }
    }

    fn connector(&self, id: ConnectorId) -> io::Result<ConnectorInfo> {
        self.connectors
            .get(&id)
            .cloned()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))
    }

    fn encoder(&self, id: EncoderId) -> io::Result<EncoderInfo> {
        self.encoders
            .get(&id)
            .copied()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))
    }

    fn add_framebuffer(&mut self, spec: &FramebufferSpec) -> io::Result<FramebufferId> {
        self.calls.push(KmsCall::AddFramebuffer(*spec));
        if let Some(errno) = self.add_fb_error.take() {
            return Err(io::Error::from_raw_os_error(errno));
        }
        let fb = FramebufferId(self.next_fb);
        self.next_fb += 1;
        Ok(fb)
    }

    fn remove_framebuffer(&mut self, fb: FramebufferId) -> io::Result<()> {
        self.calls.push(KmsCall::RemoveFramebuffer(fb));
        self.record(format!("rmfb {}", fb));
        Ok(())
    }

    fn set_crtc(
        &mut self,
        crtc: CrtcId,
        fb: FramebufferId,
        connectors: &[ConnectorId],
        mode: &ModeInfo,
    ) -> io::Result<()> {
        self.calls.push(KmsCall::SetCrtc {
            crtc,
            fb,
            connectors: connectors.to_vec(),
            mode: *mode,
        });
        match self.set_crtc_error.take() {
            Some(errno) => Err(io::Error::from_raw_os_error(errno)),
            None => Ok(()),
        }
    }

    fn page_flip(&mut self, crtc: CrtcId, fb: FramebufferId, tag: u64) -> io::Result<()> {
        self.calls.push(KmsCall::PageFlip { crtc, fb, tag });
        if let Some(errno) = self.page_flip_error.take() {
            return Err(io::Error::from_raw_os_error(errno));
        }
        self.flip_sequence += 1;
        self.events.push_back(vec![KmsEvent::FlipComplete {
            tag,
            completion: FlipCompletion {
                crtc,
                sequence: self.flip_sequence,
                tv_sec: self.flip_sequence / 60,
                tv_usec: (self.flip_sequence % 60) * 16_666,
            },
        }]);
        Ok(())
    }

    fn wait_readable(&mut self, timeout: Option<Duration>) -> io::Result<Readiness> {
        self.wait_count += 1;
        self.last_wait_timeout = Some(timeout);
        if let Some(stall) = self.wait_stall {
            std::thread::sleep(stall);
        }
        if let Some(outcome) = self.waits.pop_front() {
            return outcome;
        }
        if self.events.is_empty() {
            // A real descriptor would block forever here.
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "mock: waiting with nothing queued",
            ));
        }
        Ok(Readiness::Ready)
    }

    fn read_events(&mut self) -> io::Result<Vec<KmsEvent>> {
        Ok(self.events.pop_front().unwrap_or_default())
    }
}

impl Drop for MockKms {
    fn drop(&mut self) {
        self.record("device closed".to_string());
    }
}

/// Allocator whose surfaces hand out buffers from a fixed pool.
#[derive(Debug, Default)]
pub struct MockAllocator {
    lock_sequence: Vec<BufferObjectId>,
    surface_error: Option<i32>,
    created: RefCell<Vec<(u32, u32, FourCc, UsageFlags)>>,
    journal: Option<Journal>,
}

impl MockAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Buffer ids surfaces return from successive locks, before falling back
    /// to cycling a pool of three.
    pub fn with_lock_sequence(mut self, sequence: Vec<BufferObjectId>) -> Self {
        self.lock_sequence = sequence;
        self
    }

    pub fn fail_surface_creation(&mut self, errno: i32) {
        self.surface_error = Some(errno);
    }

    pub fn created_surfaces(&self) -> Vec<(u32, u32, FourCc, UsageFlags)> {
        self.created.borrow().clone()
    }
}

impl BufferAllocator for MockAllocator {
    type Surface = MockSurface;

    fn create_surface(
        &self,
        width: u32,
        height: u32,
        format: FourCc,
        usage: UsageFlags,
    ) -> io::Result<MockSurface> {
        if let Some(errno) = self.surface_error {
            return Err(io::Error::from_raw_os_error(errno));
        }
        self.created.borrow_mut().push((width, height, format, usage));
        Ok(MockSurface {
            width,
            height,
            format,
            scripted: self.lock_sequence.iter().copied().collect(),
            pool_cursor: 0,
            locked: HashSet::new(),
            info_queries: Cell::new(0),
            fail_next_lock: false,
            journal: self.journal.clone(),
        })
    }
}

impl Drop for MockAllocator {
    fn drop(&mut self) {
        if let Some(journal) = &self.journal {
            journal.borrow_mut().push("allocator destroyed".to_string());
        }
    }
}

const MOCK_POOL: [BufferObjectId; 3] = [
    BufferObjectId(0x1000),
    BufferObjectId(0x2000),
    BufferObjectId(0x3000),
];

#[derive(Debug)]
pub struct MockSurface {
    width: u32,
    height: u32,
    format: FourCc,
    scripted: VecDeque<BufferObjectId>,
    pool_cursor: usize,
    locked: HashSet<BufferObjectId>,
    info_queries: Cell<usize>,
    fail_next_lock: bool,
    journal: Option<Journal>,
}

impl MockSurface {
    pub fn fail_next_lock(&mut self) {
        self.fail_next_lock = true;
    }

    pub fn is_locked(&self, bo: BufferObjectId) -> bool {
        self.locked.contains(&bo)
    }

    pub fn info_queries(&self) -> usize {
        self.info_queries.get()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl PresentableSurface for MockSurface {
    fn lock_front_buffer(&mut self) -> io::Result<BufferObjectId> {
        if std::mem::take(&mut self.fail_next_lock) {
            return Err(io::Error::from_raw_os_error(libc::ENOMEM));
        }
        let bo = match self.scripted.pop_front() {
            Some(bo) => bo,
            None => {
                let bo = MOCK_POOL[self.pool_cursor % MOCK_POOL.len()];
                self.pool_cursor += 1;
                bo
            }
        };
        if !self.locked.insert(bo) {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        Ok(bo)
    }

    fn buffer_info(&self, bo: BufferObjectId) -> BufferObjectInfo {
        self.info_queries.set(self.info_queries.get() + 1);
        BufferObjectInfo {
            width: self.width,
            height: self.height,
            stride: self.width * 4,
            format: self.format,
            handle: (bo.0 as u32) | 1,
        }
    }

    fn release_buffer(&mut self, bo: BufferObjectId) {
        self.locked.remove(&bo);
    }
}

impl Drop for MockSurface {
    fn drop(&mut self) {
        if let Some(journal) = &self.journal {
            journal.borrow_mut().push("surface destroyed".to_string());
        }
    }
}
