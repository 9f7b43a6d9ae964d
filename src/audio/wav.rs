// WAV-file audio backend
//
// Capture replays a 16 kHz mono WAV file in a loop, paced at real time so
// reads block like a hardware stream. Playback writes one WAV file per
// speaker open, at the rate the speaker was opened with.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

use super::backend::{
    AudioBackend, AudioFrame, CaptureParams, CaptureStream, InputDevice, PlaybackStream,
    CHANNELS,
};
use super::file::AudioFile;

/// Device id the file backend reports for its single input
pub const WAV_DEVICE_ID: u32 = 0;

pub struct WavBackend {
    name: String,
    source: Option<Arc<Vec<i16>>>,
    output_dir: PathBuf,
    playback_index: AtomicUsize,
}

impl WavBackend {
    /// `input` is replayed as microphone audio (silence when `None`);
    /// playback files land in `output_dir`.
    pub fn new(input: Option<PathBuf>, output_dir: PathBuf) -> Result<Self> {
        let source = match &input {
            Some(path) => {
                let samples = AudioFile::open(path)?.into_capture_samples()?;
                Some(Arc::new(samples))
            }
            None => None,
        };

        fs::create_dir_all(&output_dir).context("Failed to create playback output directory")?;

        let name = match &input {
            Some(path) => format!("wav:{}", path.display()),
            None => "wav:silence".to_string(),
        };

        info!("WAV backend initialized: {} -> {}", name, output_dir.display());

        Ok(Self {
            name,
            source,
            output_dir,
            playback_index: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for WavBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_devices(&self) -> Result<Vec<InputDevice>> {
        Ok(vec![InputDevice {
            id: WAV_DEVICE_ID,
            name: self.name.clone(),
        }])
    }

    async fn open_capture(&self, params: CaptureParams) -> Result<Box<dyn CaptureStream>> {
        if let Some(id) = params.device_id {
            if id != WAV_DEVICE_ID {
                bail!("Unknown input device id {}", id);
            }
        }

        Ok(Box::new(WavCapture {
            source: self.source.clone(),
            position: 0,
            sample_rate: params.sample_rate,
            next_deadline: Instant::now(),
            active: true,
        }))
    }

    async fn open_playback(&self, sample_rate: u32) -> Result<Box<dyn PlaybackStream>> {
        let index = self.playback_index.fetch_add(1, Ordering::SeqCst);
        let path = self
            .output_dir
            .join(format!("playback-{:03}-{}hz.wav", index, sample_rate));

        let spec = hound::WavSpec {
            channels: CHANNELS,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        Ok(Box::new(WavPlayback {
            writer: Some(writer),
            path,
            sample_rate,
            sample_count: 0,
        }))
    }
}

struct WavCapture {
    source: Option<Arc<Vec<i16>>>,
    position: usize,
    sample_rate: u32,
    next_deadline: Instant,
    active: bool,
}

#[async_trait::async_trait]
impl CaptureStream for WavCapture {
    async fn read(&mut self, frame_size: usize) -> Result<AudioFrame> {
        if !self.active {
            bail!("Microphone stream is closed");
        }

        let samples = match &self.source {
            Some(source) if !source.is_empty() => {
                let mut samples = Vec::with_capacity(frame_size);
                while samples.len() < frame_size {
                    let take = (frame_size - samples.len()).min(source.len() - self.position);
                    samples.extend_from_slice(&source[self.position..self.position + take]);
                    self.position = (self.position + take) % source.len();
                }
                samples
            }
            _ => vec![0; frame_size],
        };

        let frame = AudioFrame::new(samples, self.sample_rate);

        // Hold each frame back until its real-time slot
        let now = Instant::now();
        if self.next_deadline < now {
            self.next_deadline = now;
        }
        self.next_deadline += frame.duration();
        tokio::time::sleep_until(self.next_deadline).await;

        Ok(frame)
    }

    async fn stop(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

struct WavPlayback {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    sample_rate: u32,
    sample_count: usize,
}

#[async_trait::async_trait]
impl PlaybackStream for WavPlayback {
    async fn write(&mut self, frame: &AudioFrame) -> Result<()> {
        let Some(writer) = &mut self.writer else {
            bail!("Speaker stream is closed");
        };

        for &sample in &frame.samples {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }
        self.sample_count += frame.samples.len();

        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            writer.flush().context("Failed to flush WAV file")?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
            info!(
                "Playback file complete: {} ({} samples at {}Hz)",
                self.path.display(),
                self.sample_count,
                self.sample_rate
            );
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.writer.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for WavPlayback {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
