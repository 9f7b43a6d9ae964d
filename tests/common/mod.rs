// Scripted in-memory collaborators for pipeline tests
//
// FakeBackend stands in for the audio hardware, FakeSession/FakeFactory for
// the remote voice service. Every observable side effect is counted on a
// shared probe so tests can assert on it after the fact.

#![allow(dead_code)]

use anyhow::{bail, Result};
use loqa_duplex::audio::{
    AudioBackend, AudioDevice, AudioFrame, CaptureParams, CaptureStream, DeviceConfig,
    InputDevice, PlaybackStream,
};
use loqa_duplex::session::{SessionFactory, SessionHooks, VoiceSession};
use loqa_duplex::Config;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Consume one unit of a "fail the next N calls" budget
fn take_failure(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Default)]
pub struct BackendProbe {
    pub capture_opens: AtomicUsize,
    pub capture_closes: AtomicUsize,
    pub playback_closes: AtomicUsize,
    pub terminations: AtomicUsize,
    pub frames_written: AtomicUsize,
    pub playback_rates: Mutex<Vec<u32>>,
    pub opened_device_ids: Mutex<Vec<Option<u32>>>,
    /// Fail the next N `open_capture` calls
    pub fail_capture_opens: AtomicUsize,
    /// Fail the next N `open_playback` calls
    pub fail_playback_opens: AtomicUsize,
    /// Fail the next N capture `close` calls
    pub fail_capture_closes: AtomicUsize,
    /// Fail the next N capture reads
    pub fail_reads: AtomicUsize,
    /// Successful capture reads
    pub reads: AtomicUsize,
    /// Fail the next N speaker writes
    pub fail_writes: AtomicUsize,
    /// Speakers open at this rate whatever rate is asked for
    pub native_playback_rate: Mutex<Option<u32>>,
    playback_opens_in_flight: AtomicUsize,
    pub max_concurrent_playback_opens: AtomicUsize,
    /// Amplitude of every captured sample
    pub amplitude: Mutex<i16>,
}

impl BackendProbe {
    pub fn playback_rates(&self) -> Vec<u32> {
        self.playback_rates.lock().unwrap().clone()
    }

    pub fn set_amplitude(&self, amplitude: i16) {
        *self.amplitude.lock().unwrap() = amplitude;
    }
}

pub struct FakeBackend {
    pub probe: Arc<BackendProbe>,
}

impl FakeBackend {
    pub fn new() -> (Arc<Self>, Arc<BackendProbe>) {
        let probe = Arc::new(BackendProbe::default());
        probe.set_amplitude(800);
        (
            Arc::new(Self {
                probe: Arc::clone(&probe),
            }),
            probe,
        )
    }
}

#[async_trait::async_trait]
impl AudioBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn input_devices(&self) -> Result<Vec<InputDevice>> {
        Ok(vec![
            InputDevice {
                id: 0,
                name: "Built-in Microphone".to_string(),
            },
            InputDevice {
                id: 3,
                name: "USB Headset".to_string(),
            },
        ])
    }

    async fn open_capture(&self, params: CaptureParams) -> Result<Box<dyn CaptureStream>> {
        self.probe.capture_opens.fetch_add(1, Ordering::SeqCst);
        self.probe.opened_device_ids.lock().unwrap().push(params.device_id);
        if take_failure(&self.probe.fail_capture_opens) {
            bail!("microphone unavailable");
        }

        Ok(Box::new(FakeCapture {
            probe: Arc::clone(&self.probe),
            sample_rate: params.sample_rate,
            open: true,
        }))
    }

    async fn open_playback(&self, sample_rate: u32) -> Result<Box<dyn PlaybackStream>> {
        let in_flight = self.probe.playback_opens_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe
            .max_concurrent_playback_opens
            .fetch_max(in_flight, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.probe.playback_opens_in_flight.fetch_sub(1, Ordering::SeqCst);

        if take_failure(&self.probe.fail_playback_opens) {
            bail!("speaker unavailable");
        }

        self.probe.playback_rates.lock().unwrap().push(sample_rate);
        let native = *self.probe.native_playback_rate.lock().unwrap();
        Ok(Box::new(FakePlayback {
            probe: Arc::clone(&self.probe),
            sample_rate: native.unwrap_or(sample_rate),
            open: true,
        }))
    }

    async fn terminate(&self) -> Result<()> {
        self.probe.terminations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeCapture {
    probe: Arc<BackendProbe>,
    sample_rate: u32,
    open: bool,
}

#[async_trait::async_trait]
impl CaptureStream for FakeCapture {
    async fn read(&mut self, frame_size: usize) -> Result<AudioFrame> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        if !self.open {
            bail!("microphone stream closed");
        }
        if take_failure(&self.probe.fail_reads) {
            bail!("input overflowed");
        }
        self.probe.reads.fetch_add(1, Ordering::SeqCst);

        let amplitude = *self.probe.amplitude.lock().unwrap();
        Ok(AudioFrame::new(vec![amplitude; frame_size], self.sample_rate))
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if take_failure(&self.probe.fail_capture_closes) {
            bail!("driver refused to close stream");
        }
        if self.open {
            self.open = false;
            self.probe.capture_closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.open
    }
}

struct FakePlayback {
    probe: Arc<BackendProbe>,
    sample_rate: u32,
    open: bool,
}

#[async_trait::async_trait]
impl PlaybackStream for FakePlayback {
    async fn write(&mut self, _frame: &AudioFrame) -> Result<()> {
        if !self.open {
            bail!("speaker stream closed");
        }
        if take_failure(&self.probe.fail_writes) {
            bail!("output underflowed");
        }
        self.probe.frames_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.probe.playback_closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.open
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Scripted behaviour and recorded effects of one fake session
pub struct SessionProbe {
    pub rate: Option<u32>,
    /// `connect()` succeeds
    pub accept_connect: bool,
    /// Still live once the settle delay has passed
    pub live_after_connect: bool,
    connected: AtomicBool,
    disconnected: AtomicBool,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub sends: AtomicUsize,
    pub sends_after_disconnect: AtomicUsize,
    /// Fail the next N `send_audio` calls on a live session
    pub fail_sends: AtomicUsize,
    pub rejected_sends: AtomicUsize,
    pub hook_events: Mutex<Vec<&'static str>>,
    inbound: Mutex<VecDeque<AudioFrame>>,
}

impl SessionProbe {
    pub fn new(rate: Option<u32>) -> Arc<Self> {
        Self::scripted(rate, true, true)
    }

    pub fn refusing() -> Arc<Self> {
        Self::scripted(Some(16000), false, false)
    }

    pub fn dying() -> Arc<Self> {
        Self::scripted(Some(16000), true, false)
    }

    fn scripted(rate: Option<u32>, accept_connect: bool, live_after_connect: bool) -> Arc<Self> {
        Arc::new(Self {
            rate,
            accept_connect,
            live_after_connect,
            connected: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            sends_after_disconnect: AtomicUsize::new(0),
            fail_sends: AtomicUsize::new(0),
            rejected_sends: AtomicUsize::new(0),
            hook_events: Mutex::new(Vec::new()),
            inbound: Mutex::new(VecDeque::new()),
        })
    }

    /// Simulate the remote side going away
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn queue_frames(&self, count: usize, rate: u32) {
        let mut inbound = self.inbound.lock().unwrap();
        for _ in 0..count {
            inbound.push_back(AudioFrame::new(vec![300; 480], rate));
        }
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn rejected_sends(&self) -> usize {
        self.rejected_sends.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

pub struct FakeSession {
    probe: Arc<SessionProbe>,
    hooks: SessionHooks,
}

#[async_trait::async_trait]
impl VoiceSession for FakeSession {
    fn set_hooks(&mut self, hooks: SessionHooks) {
        self.hooks = hooks;
    }

    async fn connect(&self) -> Result<()> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        if !self.probe.accept_connect {
            bail!("connection refused");
        }
        self.probe
            .connected
            .store(self.probe.live_after_connect, Ordering::SeqCst);
        self.probe.hook_events.lock().unwrap().push("connect");
        self.hooks.fire_connect();
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.probe.disconnects.fetch_add(1, Ordering::SeqCst);
        self.probe.disconnected.store(true, Ordering::SeqCst);
        self.probe.connected.store(false, Ordering::SeqCst);
        self.probe.hook_events.lock().unwrap().push("disconnect");
        self.hooks.fire_disconnect();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.probe.connected.load(Ordering::SeqCst)
    }

    async fn send_audio(&self, _frame: &AudioFrame) -> Result<()> {
        if self.probe.disconnected.load(Ordering::SeqCst) {
            self.probe.sends_after_disconnect.fetch_add(1, Ordering::SeqCst);
            bail!("session closed");
        }
        if take_failure(&self.probe.fail_sends) {
            self.probe.rejected_sends.fetch_add(1, Ordering::SeqCst);
            bail!("publish timed out");
        }
        self.probe.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn receive_audio(&self, timeout: Duration) -> Result<Option<AudioFrame>> {
        let next = self.probe.inbound.lock().unwrap().pop_front();
        match next {
            Some(frame) => Ok(Some(frame)),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    fn playback_rate(&self) -> Option<u32> {
        self.probe.rate
    }
}

/// Hands out scripted sessions in order, then healthy 16 kHz ones
pub struct FakeFactory {
    script: Mutex<VecDeque<Arc<SessionProbe>>>,
    pub created: Mutex<Vec<Arc<SessionProbe>>>,
}

impl FakeFactory {
    pub fn new(script: Vec<Arc<SessionProbe>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl SessionFactory for FakeFactory {
    async fn create(&self) -> Result<Box<dyn VoiceSession>> {
        let probe = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| SessionProbe::new(Some(16000)));
        self.created.lock().unwrap().push(Arc::clone(&probe));

        Ok(Box::new(FakeSession {
            probe,
            hooks: SessionHooks::new(),
        }))
    }
}

/// Client configuration with every interval shrunk to milliseconds
pub fn fast_config() -> Config {
    let mut cfg = Config::default();
    cfg.session.settle_delay_ms = 5;
    cfg.session.poll_interval_ms = 30;
    cfg.audio.frame_size = 160;
    cfg.audio.reset_interval_secs = 3600;
    cfg.audio.reset_pause_ms = 1;
    cfg.audio.show_meter = false;
    cfg.capture.read_retry_ms = 5;
    cfg.capture.send_backoff_ms = 5;
    cfg.capture.idle_wait_ms = 20;
    cfg.playback.receive_timeout_ms = 1;
    cfg.playback.idle_wait_ms = 20;
    cfg
}

pub fn device_config() -> DeviceConfig {
    DeviceConfig {
        device_id: Some(3),
        input_rate: 16000,
        frame_size: 160,
        default_playback_rate: 16000,
        reset_pause: Duration::from_millis(1),
    }
}

pub async fn open_device(backend: Arc<FakeBackend>) -> Arc<AudioDevice> {
    Arc::new(
        AudioDevice::open(backend, device_config())
            .await
            .expect("fake device should open"),
    )
}

/// Poll `condition` every few milliseconds until it holds or `limit` passes
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
