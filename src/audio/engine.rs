//! Capture engine - owns the session lifecycle and the capture thread

use crate::audio::{
    convert, negotiate_capture_format, AudioFormat, AudioSnapshot, BufferWriter, ForwardSession,
    LatestBuffer, SampleEncoding, VolumeMultiplier,
};
use crate::backend::{AudioBackend, CaptureStream};
use crate::device::{self, DeviceDescriptor, DeviceSelection};
use crate::error::{LoopbackError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Name of the capture worker thread
const CAPTURE_THREAD_NAME: &str = "loopback-capture";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long `stop` waits for the capture thread before detaching it
    pub shutdown_timeout: Duration,
    /// Sleep between polls of the capture stream
    pub idle_sleep: Duration,
    /// Log the capture level every this many audible packets (0 = never)
    pub diagnostics_interval: u64,
    /// Levels at or below this RMS are not logged
    pub rms_log_threshold: f32,
    /// Forward gain at startup
    pub initial_volume: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_millis(2000),
            idle_sleep: Duration::from_millis(1),
            diagnostics_interval: 100,
            rms_log_threshold: 1e-6,
            initial_volume: crate::audio::DEFAULT_VOLUME_MULTIPLIER,
        }
    }
}

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No session
    Idle,
    /// Session prepared, capture not started
    Initialized,
    /// Capture thread running
    Running,
    /// Waiting for the capture thread to exit
    Stopping,
}

/// Counters updated by the capture thread
#[derive(Debug, Default)]
pub struct EngineStats {
    published_packets: AtomicU64,
    silent_packets: AtomicU64,
    forwarded_packets: AtomicU64,
    forward_skips: AtomicU64,
    pump_errors: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub published_packets: u64,
    pub silent_packets: u64,
    pub forwarded_packets: u64,
    pub forward_skips: u64,
    pub pump_errors: u64,
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            published_packets: self.published_packets.load(Ordering::Relaxed),
            silent_packets: self.silent_packets.load(Ordering::Relaxed),
            forwarded_packets: self.forwarded_packets.load(Ordering::Relaxed),
            forward_skips: self.forward_skips.load(Ordering::Relaxed),
            pump_errors: self.pump_errors.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Initialized, not yet running capture session
struct CaptureSession {
    stream: Box<dyn CaptureStream>,
    format: AudioFormat,
    encoding: SampleEncoding,
    forward: Option<ForwardSession>,
}

/// Handle to a running capture thread
struct WorkerHandle {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    exit_rx: Receiver<()>,
}

/// Loopback capture engine
///
/// Captures what an output endpoint plays, keeps the most recent packet in a
/// [`LatestBuffer`] for polling, and optionally forwards a stereo downmix to a
/// second endpoint. Device selection and gain persist across init/stop cycles.
pub struct CaptureEngine {
    backend: Box<dyn AudioBackend>,
    config: EngineConfig,
    state: EngineState,
    selection: DeviceSelection,
    volume: Arc<VolumeMultiplier>,
    cache: Arc<LatestBuffer>,
    stats: Arc<EngineStats>,
    session: Option<CaptureSession>,
    worker: Option<WorkerHandle>,
    capture_device: Option<DeviceDescriptor>,
    forward_device: Option<DeviceDescriptor>,
    format: Option<AudioFormat>,
    forward_format: Option<AudioFormat>,
}

impl CaptureEngine {
    /// Create a new engine on top of a native backend
    pub fn new(backend: Box<dyn AudioBackend>, config: EngineConfig) -> Self {
        let volume = Arc::new(VolumeMultiplier::new(config.initial_volume));
        Self {
            backend,
            config,
            state: EngineState::Idle,
            selection: DeviceSelection::default(),
            volume,
            cache: Arc::new(LatestBuffer::new()),
            stats: Arc::new(EngineStats::default()),
            session: None,
            worker: None,
            capture_device: None,
            forward_device: None,
            format: None,
            forward_format: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Negotiated capture format of the current session
    pub fn format(&self) -> Option<&AudioFormat> {
        self.format.as_ref()
    }

    /// Render format of the forward endpoint, if forwarding
    pub fn forward_format(&self) -> Option<&AudioFormat> {
        self.forward_format.as_ref()
    }

    pub fn capture_device(&self) -> Option<&DeviceDescriptor> {
        self.capture_device.as_ref()
    }

    pub fn forward_device(&self) -> Option<&DeviceDescriptor> {
        self.forward_device.as_ref()
    }

    pub fn selection(&self) -> &DeviceSelection {
        &self.selection
    }

    /// Counters of the current (or last) session
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Prepare a capture session
    ///
    /// Opens the selected (or default) output endpoint for loopback capture,
    /// negotiates up to `requested_channels` channels and opens the forward
    /// endpoint if one can be found. Forwarding problems only disable
    /// forwarding. Calling `init` again before `start` replaces the prepared
    /// session.
    pub fn init(&mut self, requested_channels: u16) -> Result<()> {
        if matches!(self.state, EngineState::Running | EngineState::Stopping) {
            return Err(LoopbackError::AlreadyRunning);
        }

        self.clear_session();
        self.cache.reset();
        self.stats = Arc::new(EngineStats::default());

        info!(
            "Initializing capture ({} backend, {} channels requested)",
            self.backend.name(),
            requested_channels
        );

        let endpoint = device::resolve_capture_endpoint(self.backend.as_ref(), &self.selection)?;
        let capture_device = endpoint.device().clone();
        let format = negotiate_capture_format(endpoint.as_ref(), requested_channels)?;
        let encoding = format
            .sample_encoding()
            .ok_or_else(|| LoopbackError::UnsupportedFormat(format.to_string()))?;
        let stream = endpoint.initialize(&format)?;
        info!("Capturing from {}: {}", capture_device.name, format);

        let forward = device::resolve_forward_id(
            self.backend.as_ref(),
            &self.selection,
            &capture_device.id,
        )
        .and_then(|id| match self.backend.open_render(&id) {
            Ok(stream) => Some(ForwardSession::new(stream)),
            Err(e) => {
                warn!("Failed to open forward device {}: {}", id, e);
                None
            }
        });

        match &forward {
            Some(forward) => info!("Forwarding to {}: {}", forward.device().name, forward.format()),
            None => info!("Forwarding disabled"),
        }

        self.forward_device = forward.as_ref().map(|f| f.device().clone());
        self.forward_format = forward.as_ref().map(|f| f.format().clone());
        self.capture_device = Some(capture_device);
        self.format = Some(format.clone());
        self.session = Some(CaptureSession {
            stream,
            format,
            encoding,
            forward,
        });
        self.state = EngineState::Initialized;

        Ok(())
    }

    /// Start the capture thread
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            EngineState::Initialized => {}
            EngineState::Running | EngineState::Stopping => {
                return Err(LoopbackError::AlreadyRunning)
            }
            EngineState::Idle => return Err(LoopbackError::NotInitialized),
        }

        let mut session = self.session.take().ok_or(LoopbackError::NotInitialized)?;

        if let Err(e) = session.stream.start() {
            error!("Failed to start capture: {}", e);
            self.clear_session();
            return Err(e);
        }

        if let Some(forward) = session.forward.as_mut() {
            if let Err(e) = forward.start() {
                warn!("Failed to start forward stream, forwarding disabled: {}", e);
                session.forward = None;
                self.forward_device = None;
                self.forward_format = None;
            }
        }

        let running = Arc::new(AtomicBool::new(true));
        let (exit_tx, exit_rx) = bounded(1);
        let worker = CaptureWorker::new(
            session,
            self.cache.writer(),
            Arc::clone(&running),
            Arc::clone(&self.volume),
            Arc::clone(&self.stats),
            &self.config,
        );

        let handle = thread::Builder::new()
            .name(CAPTURE_THREAD_NAME.to_string())
            .spawn(move || {
                let _exit = ExitSignal(exit_tx);
                worker.run();
            })
            .map_err(|e| {
                self.clear_session();
                LoopbackError::Thread(e.to_string())
            })?;

        self.worker = Some(WorkerHandle {
            running,
            handle,
            exit_rx,
        });
        self.state = EngineState::Running;
        info!("Capture engine started");

        Ok(())
    }

    /// Stop capture and release the session
    ///
    /// Safe to call in any state. If the capture thread does not exit within
    /// the shutdown timeout it is detached, the session is still torn down and
    /// `ShutdownTimeout` is returned.
    pub fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            if self.state == EngineState::Initialized {
                debug!("Releasing prepared session");
            }
            self.clear_session();
            self.cache.reset();
            return Ok(());
        };

        info!("Stopping capture engine...");
        self.state = EngineState::Stopping;
        worker.running.store(false, Ordering::SeqCst);

        let timeout = self.config.shutdown_timeout;
        let result = match worker.exit_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    error!("Capture thread panicked");
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Capture thread did not exit within {:?}, detaching it",
                    timeout
                );
                drop(worker.handle);
                Err(LoopbackError::ShutdownTimeout(timeout))
            }
        };

        self.clear_session();
        self.cache.reset();
        info!("Capture engine stopped");

        result
    }

    fn clear_session(&mut self) {
        self.session = None;
        self.capture_device = None;
        self.forward_device = None;
        self.format = None;
        self.forward_format = None;
        self.state = EngineState::Idle;
    }

    /// Copy of the most recently captured packet
    ///
    /// `None` until the first packet of the current session is published.
    pub fn latest_buffer(&self) -> Option<AudioSnapshot> {
        self.cache.snapshot()
    }

    /// Shared handle to the latest-buffer cache for polling from other threads
    pub fn latest_buffer_handle(&self) -> Arc<LatestBuffer> {
        Arc::clone(&self.cache)
    }

    /// Shared handle to the forward gain
    pub fn volume_handle(&self) -> Arc<VolumeMultiplier> {
        Arc::clone(&self.volume)
    }

    /// Set the forward gain; takes effect on the next forwarded packet
    pub fn set_volume_multiplier(&self, multiplier: f32) {
        self.volume.set(multiplier);
    }

    /// Active output endpoints (at most [`device::MAX_ENDPOINTS`])
    pub fn enumerate_render_endpoints(&self) -> Result<Vec<DeviceDescriptor>> {
        device::enumerate_endpoints(self.backend.as_ref())
    }

    /// Choose the forward endpoint for the next `init` (`None` = automatic)
    pub fn set_forward_device_id(&mut self, device_id: Option<&str>) {
        self.selection.set_forward_id(device_id);
    }

    /// Choose the capture endpoint for the next `init` by name substring
    ///
    /// Returns `false` and reverts to the default output if nothing matches.
    pub fn set_capture_device_by_name(&mut self, needle: &str) -> bool {
        self.selection
            .select_capture_by_name(self.backend.as_ref(), needle)
    }

    /// Id of the first installed virtual audio cable
    pub fn find_known_virtual_cable(&self) -> Option<String> {
        device::find_virtual_cable(self.backend.as_ref()).map(|d| d.id)
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Signals the engine when the capture thread exits, including by panic
struct ExitSignal(Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// State owned by the capture thread
struct CaptureWorker {
    stream: Box<dyn CaptureStream>,
    forward: Option<ForwardSession>,
    format: AudioFormat,
    encoding: SampleEncoding,
    writer: BufferWriter,
    running: Arc<AtomicBool>,
    volume: Arc<VolumeMultiplier>,
    stats: Arc<EngineStats>,
    idle_sleep: Duration,
    diagnostics_interval: u64,
    rms_log_threshold: f32,
    /// Normalized samples of the current packet, grown to the largest seen
    scratch: Vec<f32>,
    audible_packets: u64,
}

impl CaptureWorker {
    fn new(
        session: CaptureSession,
        writer: BufferWriter,
        running: Arc<AtomicBool>,
        volume: Arc<VolumeMultiplier>,
        stats: Arc<EngineStats>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            stream: session.stream,
            forward: session.forward,
            format: session.format,
            encoding: session.encoding,
            writer,
            running,
            volume,
            stats,
            idle_sleep: config.idle_sleep,
            diagnostics_interval: config.diagnostics_interval,
            rms_log_threshold: config.rms_log_threshold,
            scratch: Vec::new(),
            audible_packets: 0,
        }
    }

    fn run(mut self) {
        info!("Capture thread started");

        while self.running.load(Ordering::Relaxed) {
            if let Err(e) = self.drain_packets() {
                EngineStats::bump(&self.stats.pump_errors);
                debug!("Capture error: {}", e);
            }
            thread::sleep(self.idle_sleep);
        }

        if let Err(e) = self.stream.stop() {
            debug!("Failed to stop capture stream: {}", e);
        }
        if let Some(forward) = self.forward.as_mut() {
            if let Err(e) = forward.stop() {
                debug!("Failed to stop forward stream: {}", e);
            }
        }

        info!("Capture thread stopped");
    }

    /// Handle every packet currently pending on the capture stream
    fn drain_packets(&mut self) -> Result<()> {
        let mut pending = self.stream.next_packet_size()?;

        while pending > 0 && self.running.load(Ordering::Relaxed) {
            let (frames, silent) = self.take_packet()?;
            if frames == 0 {
                break;
            }
            self.publish(frames, silent);
            self.forward(frames);
            pending = self.stream.next_packet_size()?;
        }

        Ok(())
    }

    /// Convert the next packet into `scratch` and give it back to the device
    fn take_packet(&mut self) -> Result<(u32, bool)> {
        let packet = self.stream.read_packet()?;
        let frames = packet.frames;
        let silent = packet.silent || packet.data.is_none();

        let len = frames as usize * self.format.channels as usize;
        if self.scratch.len() < len {
            self.scratch.resize(len, 0.0);
        }
        let dst = &mut self.scratch[..len];
        match packet.data {
            Some(data) if !silent => convert::normalize_into(data, self.encoding, dst),
            _ => dst.fill(0.0),
        }

        self.stream.release_packet(frames)?;
        Ok((frames, silent))
    }

    fn publish(&mut self, frames: u32, silent: bool) {
        let len = frames as usize * self.format.channels as usize;
        let published = self.writer.publish(
            &self.scratch[..len],
            frames,
            self.format.channels,
            self.format.sample_rate,
        );
        if !published {
            return;
        }
        EngineStats::bump(&self.stats.published_packets);

        if silent {
            EngineStats::bump(&self.stats.silent_packets);
            return;
        }

        self.audible_packets += 1;
        if self.diagnostics_interval > 0 && self.audible_packets % self.diagnostics_interval == 0 {
            if let Some(rms) = self.writer.cache().rms() {
                if rms > self.rms_log_threshold {
                    info!(
                        "Capture level: RMS {:.6} after {} packets",
                        rms, self.audible_packets
                    );
                }
            }
        }
    }

    fn forward(&mut self, frames: u32) {
        let Some(forward) = self.forward.as_mut() else {
            return;
        };

        let len = frames as usize * self.format.channels as usize;
        let gain = self.volume.get();
        match forward.write(&self.scratch[..len], self.format.channels, frames, gain) {
            Ok(true) => EngineStats::bump(&self.stats.forwarded_packets),
            Ok(false) => EngineStats::bump(&self.stats.forward_skips),
            Err(e) => {
                debug!("Forward write failed: {}", e);
                EngineStats::bump(&self.stats.forward_skips);
            }
        }
    }
}
