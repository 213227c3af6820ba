//! In-memory audio backend for testing
//!
//! Every handle shares one `MockState`, so a test keeps a clone of the
//! backend to queue capture packets, set render padding, inject failures and
//! inspect what was forwarded or left open.

use super::{AudioBackend, CaptureStream, CapturedPacket, FormatSupport, LoopbackEndpoint, RenderStream};
use crate::audio::AudioFormat;
use crate::device::DeviceDescriptor;
use crate::error::{LoopbackError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How the mock answers format support queries
#[derive(Debug, Clone)]
pub enum MockSupport {
    /// Accept every format
    AcceptAll,
    /// Reject formats with more than this many channels
    RejectAbove(u16),
    /// Suggest this format for anything else
    Closest(AudioFormat),
}

/// A queued capture packet
#[derive(Debug, Clone)]
pub struct MockPacket {
    pub data: Vec<u8>,
    pub frames: u32,
    pub silent: bool,
}

impl MockPacket {
    /// Packet of interleaved f32 samples
    pub fn float(samples: &[f32], channels: u16) -> Self {
        Self {
            data: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            frames: (samples.len() / channels as usize) as u32,
            silent: false,
        }
    }

    /// Packet flagged silent by the device
    pub fn silent(frames: u32, block_align: u16) -> Self {
        Self {
            data: vec![0xAA; frames as usize * block_align as usize],
            frames,
            silent: true,
        }
    }
}

struct MockConfig {
    devices: Vec<DeviceDescriptor>,
    default_id: String,
    mix_format: AudioFormat,
    support: MockSupport,
    render_format: AudioFormat,
    render_buffer_frames: u32,
    packet_size_delay: Duration,
}

pub struct MockState {
    config: Mutex<MockConfig>,
    packets: Mutex<VecDeque<MockPacket>>,
    written: Mutex<Vec<u8>>,
    support_queries: Mutex<Vec<AudioFormat>>,
    opened_loopback: Mutex<Vec<String>>,
    opened_render: Mutex<Vec<String>>,
    render_padding: AtomicU32,
    render_writes: AtomicUsize,
    live_handles: AtomicUsize,
    packet_size_failures: AtomicU32,
    fail_mix_format: AtomicBool,
    fail_render: AtomicBool,
}

/// Cloneable handle to a shared mock device graph
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<MockState>,
}

impl MockBackend {
    /// Three stereo float devices, the first being the default
    pub fn new() -> Self {
        let devices = vec![
            DeviceDescriptor::new("{speakers}", "Speakers (Realtek Audio)"),
            DeviceDescriptor::new("{headphones}", "Headphones (USB Audio)"),
            DeviceDescriptor::new("{cable}", "CABLE Input (VB-Audio Virtual Cable)"),
        ];
        Self::with_devices(devices, "{speakers}")
    }

    pub fn with_devices(devices: Vec<DeviceDescriptor>, default_id: &str) -> Self {
        let config = MockConfig {
            devices,
            default_id: default_id.to_string(),
            mix_format: AudioFormat::float32(48000, 2),
            support: MockSupport::AcceptAll,
            render_format: AudioFormat::float32(48000, 2),
            render_buffer_frames: 4800,
            packet_size_delay: Duration::ZERO,
        };
        Self {
            state: Arc::new(MockState {
                config: Mutex::new(config),
                packets: Mutex::new(VecDeque::new()),
                written: Mutex::new(Vec::new()),
                support_queries: Mutex::new(Vec::new()),
                opened_loopback: Mutex::new(Vec::new()),
                opened_render: Mutex::new(Vec::new()),
                render_padding: AtomicU32::new(0),
                render_writes: AtomicUsize::new(0),
                live_handles: AtomicUsize::new(0),
                packet_size_failures: AtomicU32::new(0),
                fail_mix_format: AtomicBool::new(false),
                fail_render: AtomicBool::new(false),
            }),
        }
    }

    pub fn set_mix_format(&self, format: AudioFormat) {
        self.state.config.lock().mix_format = format;
    }

    pub fn set_support(&self, support: MockSupport) {
        self.state.config.lock().support = support;
    }

    pub fn set_render_format(&self, format: AudioFormat, buffer_frames: u32) {
        let mut config = self.state.config.lock();
        config.render_format = format;
        config.render_buffer_frames = buffer_frames;
    }

    pub fn set_render_padding(&self, frames: u32) {
        self.state.render_padding.store(frames, Ordering::SeqCst);
    }

    pub fn set_packet_size_delay(&self, delay: Duration) {
        self.state.config.lock().packet_size_delay = delay;
    }

    pub fn fail_packet_size(&self, times: u32) {
        self.state.packet_size_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_mix_format(&self, fail: bool) {
        self.state.fail_mix_format.store(fail, Ordering::SeqCst);
    }

    pub fn fail_render(&self, fail: bool) {
        self.state.fail_render.store(fail, Ordering::SeqCst);
    }

    pub fn push_packet(&self, packet: MockPacket) {
        self.state.packets.lock().push_back(packet);
    }

    pub fn pending_packets(&self) -> usize {
        self.state.packets.lock().len()
    }

    /// Bytes committed to the render stream so far
    pub fn written(&self) -> Vec<u8> {
        self.state.written.lock().clone()
    }

    pub fn render_writes(&self) -> usize {
        self.state.render_writes.load(Ordering::SeqCst)
    }

    /// Endpoints, clients and streams currently alive
    pub fn live_handles(&self) -> usize {
        self.state.live_handles.load(Ordering::SeqCst)
    }

    pub fn support_queries(&self) -> Vec<AudioFormat> {
        self.state.support_queries.lock().clone()
    }

    pub fn opened_loopback(&self) -> Vec<String> {
        self.state.opened_loopback.lock().clone()
    }

    pub fn opened_render(&self) -> Vec<String> {
        self.state.opened_render.lock().clone()
    }

    fn find_device(&self, device_id: &str) -> Result<DeviceDescriptor> {
        self.state
            .config
            .lock()
            .devices
            .iter()
            .find(|d| d.id == device_id)
            .cloned()
            .ok_or_else(|| LoopbackError::DeviceNotFound(device_id.to_string()))
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn enumerate_render_endpoints(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(self.state.config.lock().devices.clone())
    }

    fn default_render_endpoint(&self) -> Result<DeviceDescriptor> {
        let default_id = self.state.config.lock().default_id.clone();
        self.find_device(&default_id)
    }

    fn open_loopback(&self, device_id: &str) -> Result<Box<dyn LoopbackEndpoint>> {
        let device = self.find_device(device_id)?;
        self.state.opened_loopback.lock().push(device.id.clone());
        Ok(Box::new(MockLoopbackEndpoint {
            device,
            state: Arc::clone(&self.state),
            _token: HandleToken::new(&self.state),
        }))
    }

    fn open_render(&self, device_id: &str) -> Result<Box<dyn RenderStream>> {
        let device = self.find_device(device_id)?;
        if self.state.fail_render.load(Ordering::SeqCst) {
            return Err(LoopbackError::device_error(device_id, "render activation failed"));
        }
        self.state.opened_render.lock().push(device.id.clone());
        let (format, buffer_frames) = {
            let config = self.state.config.lock();
            (config.render_format.clone(), config.render_buffer_frames)
        };
        Ok(Box::new(MockRenderStream {
            device,
            format,
            buffer_frames,
            region: Vec::new(),
            state: Arc::clone(&self.state),
            _token: HandleToken::new(&self.state),
        }))
    }
}

/// Counts a live native handle until dropped
struct HandleToken(Arc<MockState>);

impl HandleToken {
    fn new(state: &Arc<MockState>) -> Self {
        state.live_handles.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(state))
    }
}

impl Drop for HandleToken {
    fn drop(&mut self) {
        self.0.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MockLoopbackEndpoint {
    device: DeviceDescriptor,
    state: Arc<MockState>,
    _token: HandleToken,
}

impl LoopbackEndpoint for MockLoopbackEndpoint {
    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    fn mix_format(&self) -> Result<AudioFormat> {
        if self.state.fail_mix_format.load(Ordering::SeqCst) {
            return Err(LoopbackError::device_error(&self.device.id, "GetMixFormat failed"));
        }
        Ok(self.state.config.lock().mix_format.clone())
    }

    fn is_format_supported(&self, format: &AudioFormat) -> FormatSupport {
        self.state.support_queries.lock().push(format.clone());
        match &self.state.config.lock().support {
            MockSupport::AcceptAll => FormatSupport::Exact,
            MockSupport::RejectAbove(max) if format.channels > *max => {
                FormatSupport::Rejected(format!("{} channels not supported", format.channels))
            }
            MockSupport::RejectAbove(_) => FormatSupport::Exact,
            MockSupport::Closest(alt) if alt == format => FormatSupport::Exact,
            MockSupport::Closest(alt) => FormatSupport::Closest(alt.clone()),
        }
    }

    fn initialize(self: Box<Self>, format: &AudioFormat) -> Result<Box<dyn CaptureStream>> {
        let _ = format;
        Ok(Box::new(MockCaptureStream {
            state: Arc::clone(&self.state),
            current: None,
            started: false,
            _token: HandleToken::new(&self.state),
        }))
    }
}

struct MockCaptureStream {
    state: Arc<MockState>,
    current: Option<MockPacket>,
    started: bool,
    _token: HandleToken,
}

impl CaptureStream for MockCaptureStream {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn next_packet_size(&mut self) -> Result<u32> {
        let delay = self.state.config.lock().packet_size_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let failures = &self.state.packet_size_failures;
        if failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LoopbackError::device_error("mock", "GetNextPacketSize failed"));
        }

        if !self.started {
            return Ok(0);
        }
        Ok(self.state.packets.lock().front().map_or(0, |p| p.frames))
    }

    fn read_packet(&mut self) -> Result<CapturedPacket<'_>> {
        self.current = self.state.packets.lock().pop_front();
        Ok(match &self.current {
            Some(packet) => CapturedPacket {
                data: Some(&packet.data),
                frames: packet.frames,
                silent: packet.silent,
            },
            None => CapturedPacket {
                data: None,
                frames: 0,
                silent: false,
            },
        })
    }

    fn release_packet(&mut self, _frames: u32) -> Result<()> {
        self.current = None;
        Ok(())
    }
}

struct MockRenderStream {
    device: DeviceDescriptor,
    format: AudioFormat,
    buffer_frames: u32,
    region: Vec<u8>,
    state: Arc<MockState>,
    _token: HandleToken,
}

impl RenderStream for MockRenderStream {
    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn padding(&mut self) -> Result<u32> {
        Ok(self.state.render_padding.load(Ordering::SeqCst))
    }

    fn acquire_region(&mut self, frames: u32) -> Result<&mut [u8]> {
        self.region.clear();
        self.region.resize(self.format.frames_to_bytes(frames), 0xAA);
        Ok(&mut self.region)
    }

    fn release_region(&mut self, _frames: u32) -> Result<()> {
        self.state.written.lock().extend_from_slice(&self.region);
        self.state.render_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
