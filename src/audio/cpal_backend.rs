// Live audio backend on cpal
//
// cpal streams are not Send, so each open stream lives on its own thread
// and is dropped there when the stream is closed. Audio crosses the thread
// boundary through channels.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{
    AudioBackend, AudioFrame, CaptureParams, CaptureStream, InputDevice, PlaybackStream,
    CHANNELS,
};

/// Captured callback buffers waiting to be read
const CAPTURE_QUEUE: usize = 256;

/// Seconds of queued playback before `write` applies backpressure
const PLAYBACK_QUEUE_SECS: usize = 2;

/// A read that sees no callback data for this long reports a stalled device
const CAPTURE_STALL: Duration = Duration::from_secs(2);

pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        info!("cpal backend initialized (host: {:?})", cpal::default_host().id());
        Self
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn stream_config(sample_rate: u32) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: CHANNELS,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

fn input_device(device_id: Option<u32>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match device_id {
        Some(id) => host
            .input_devices()
            .context("Failed to enumerate input devices")?
            .nth(id as usize)
            .ok_or_else(|| anyhow!("No input device with id {}", id)),
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow!("No default input device")),
    }
}

/// A cpal stream parked on its owning thread
struct StreamThread {
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    async fn spawn<F>(build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let handle = std::thread::spawn(move || {
            let started = build().and_then(|stream| {
                stream.play().context("Failed to start stream")?;
                Ok(stream)
            });

            match started {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Park until the owner closes the stream or goes away
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("{:#}", e)));
                }
            }
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                stop_tx: Some(stop_tx),
                handle: Some(handle),
            }),
            Ok(Err(e)) => bail!(e),
            Err(_) => bail!("Audio stream thread exited before starting"),
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            tokio::task::spawn_blocking(move || handle.join())
                .await
                .context("Failed to join audio stream thread")?
                .map_err(|_| anyhow!("Audio stream thread panicked"))?;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }
}

#[async_trait::async_trait]
impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn input_devices(&self) -> Result<Vec<InputDevice>> {
        let devices = cpal::default_host()
            .input_devices()
            .context("Failed to enumerate input devices")?
            .enumerate()
            .map(|(index, device)| InputDevice {
                id: index as u32,
                name: device.name().unwrap_or_else(|_| "<unnamed>".to_string()),
            })
            .collect();

        Ok(devices)
    }

    async fn open_capture(&self, params: CaptureParams) -> Result<Box<dyn CaptureStream>> {
        let (tx, rx) = mpsc::channel::<Vec<i16>>(CAPTURE_QUEUE);
        let active = Arc::new(AtomicBool::new(true));
        let callback_active = Arc::clone(&active);

        let thread = StreamThread::spawn(move || {
            let device = input_device(params.device_id)?;
            let stream = device
                .build_input_stream::<i16, _, _>(
                    &stream_config(params.sample_rate),
                    move |data: &[i16], _| {
                        // Dropped when the reader falls behind
                        let _ = tx.try_send(data.to_vec());
                    },
                    move |err| {
                        error!("Microphone stream error: {}", err);
                        callback_active.store(false, Ordering::SeqCst);
                    },
                    None,
                )
                .context("Failed to build input stream")?;
            Ok(stream)
        })
        .await?;

        Ok(Box::new(CpalCapture {
            thread,
            rx,
            pending: Vec::new(),
            sample_rate: params.sample_rate,
            active,
        }))
    }

    async fn open_playback(&self, sample_rate: u32) -> Result<Box<dyn PlaybackStream>> {
        let queue = Arc::new(Mutex::new(VecDeque::<i16>::new()));
        let callback_queue = Arc::clone(&queue);
        let active = Arc::new(AtomicBool::new(true));
        let callback_active = Arc::clone(&active);

        let thread = StreamThread::spawn(move || {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| anyhow!("No default output device"))?;
            let stream = device
                .build_output_stream::<i16, _, _>(
                    &stream_config(sample_rate),
                    move |out: &mut [i16], _| {
                        let mut queue = callback_queue.lock().unwrap_or_else(PoisonError::into_inner);
                        for sample in out.iter_mut() {
                            *sample = queue.pop_front().unwrap_or(0);
                        }
                    },
                    move |err| {
                        error!("Speaker stream error: {}", err);
                        callback_active.store(false, Ordering::SeqCst);
                    },
                    None,
                )
                .context("Failed to build output stream")?;
            Ok(stream)
        })
        .await?;

        Ok(Box::new(CpalPlayback {
            thread,
            queue,
            sample_rate,
            active,
        }))
    }
}

struct CpalCapture {
    thread: StreamThread,
    rx: mpsc::Receiver<Vec<i16>>,
    pending: Vec<i16>,
    sample_rate: u32,
    active: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl CaptureStream for CpalCapture {
    async fn read(&mut self, frame_size: usize) -> Result<AudioFrame> {
        while self.pending.len() < frame_size {
            match tokio::time::timeout(CAPTURE_STALL, self.rx.recv()).await {
                Ok(Some(buffer)) => self.pending.extend_from_slice(&buffer),
                Ok(None) => bail!("Microphone stream closed"),
                Err(_) => bail!("Microphone stream stalled"),
            }
        }

        let samples: Vec<i16> = self.pending.drain(..frame_size).collect();
        Ok(AudioFrame::new(samples, self.sample_rate))
    }

    async fn stop(&mut self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        self.rx.close();
        self.thread.shutdown().await
    }

    fn is_active(&self) -> bool {
        self.thread.is_running() && self.active.load(Ordering::SeqCst)
    }
}

struct CpalPlayback {
    thread: StreamThread,
    queue: Arc<Mutex<VecDeque<i16>>>,
    sample_rate: u32,
    active: Arc<AtomicBool>,
}

impl CpalPlayback {
    fn queued(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait::async_trait]
impl PlaybackStream for CpalPlayback {
    async fn write(&mut self, frame: &AudioFrame) -> Result<()> {
        if !self.thread.is_running() {
            bail!("Speaker stream is closed");
        }

        let limit = self.sample_rate as usize * PLAYBACK_QUEUE_SECS;
        while self.queued() > limit {
            if !self.active.load(Ordering::SeqCst) {
                bail!("Speaker stream stopped draining");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        if frame.sample_rate != self.sample_rate {
            warn!(
                "Playing {}Hz audio on a {}Hz speaker stream",
                frame.sample_rate, self.sample_rate
            );
        }

        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(frame.samples.iter().copied());
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        self.thread.shutdown().await
    }

    fn is_active(&self) -> bool {
        self.thread.is_running() && self.active.load(Ordering::SeqCst)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
