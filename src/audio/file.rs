use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::backend::{CHANNELS, INPUT_SAMPLE_RATE};

/// 16-bit PCM WAV loaded fully into memory, samples interleaved
pub struct AudioFile {
    pub path: PathBuf,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading WAV file {}", path.display());

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            bail!(
                "{} is not 16-bit integer PCM ({:?}, {} bits)",
                path.display(),
                spec.sample_format,
                spec.bits_per_sample
            );
        }

        // `duration()` counts frames, i.e. samples per channel
        let duration_seconds = reader.duration() as f64 / spec.sample_rate.max(1) as f64;

        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Corrupt sample data in {}", path.display()))?;

        info!(
            "Loaded {} ({:.1}s at {}Hz, {}ch)",
            path.display(),
            duration_seconds,
            spec.sample_rate,
            spec.channels
        );

        Ok(Self {
            path: path.to_path_buf(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Hand over the samples if they are already in the capture format
    /// (16 kHz mono). No resampling is attempted.
    pub fn into_capture_samples(self) -> Result<Vec<i16>> {
        if self.sample_rate != INPUT_SAMPLE_RATE || self.channels != CHANNELS {
            bail!(
                "{} must be {}Hz mono to stand in for the microphone, got {}Hz {}ch",
                self.path.display(),
                INPUT_SAMPLE_RATE,
                self.sample_rate,
                self.channels
            );
        }
        Ok(self.samples)
    }
}
