// Tests for the audio frame type and the WAV backend

use anyhow::Result;
use loqa_duplex::audio::{
    AudioBackend, AudioBackendFactory, AudioFrame, CaptureParams, WavBackend, CHANNELS,
    INPUT_SAMPLE_RATE,
};
use loqa_duplex::config::{AudioConfig, BackendKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn write_source(dir: &Path, samples: &[i16]) -> Result<PathBuf> {
    let path = dir.join("source.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(path)
}

fn params(frame_size: usize) -> CaptureParams {
    CaptureParams {
        device_id: None,
        sample_rate: INPUT_SAMPLE_RATE,
        frame_size,
    }
}

#[test]
fn test_audio_frame_pcm_bytes_are_little_endian() {
    let frame = AudioFrame::new(vec![1, -2, 0x0102], 16000);

    let bytes = frame.to_pcm_bytes();

    assert_eq!(bytes, vec![0x01, 0x00, 0xFE, 0xFF, 0x02, 0x01]);
    assert_eq!(AudioFrame::from_pcm_bytes(&bytes, 16000).samples, frame.samples);
}

#[test]
fn test_audio_frame_drops_trailing_odd_byte() {
    let frame = AudioFrame::from_pcm_bytes(&[0x10, 0x00, 0x7F], 24000);

    assert_eq!(frame.samples, vec![0x10]);
    assert_eq!(frame.sample_rate, 24000);
}

#[test]
fn test_audio_frame_timing_calculation() {
    // 1600 samples at 16kHz mono is 100ms
    let frame = AudioFrame::silence(1600, 16000);

    assert!((frame.duration().as_secs_f64() - 0.1).abs() < 1e-6);
    assert!(frame.samples.iter().all(|&s| s == 0));
    assert!(!frame.is_empty());
    assert!(AudioFrame::new(Vec::new(), 16000).is_empty());
    assert_eq!(CHANNELS, 1);
}

#[tokio::test]
async fn test_wav_backend_lists_single_input() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = WavBackend::new(None, dir.path().join("out"))?;

    let devices = backend.input_devices()?;

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, 0);
    assert_eq!(backend.name(), "wav:silence");
    assert!(dir.path().join("out").is_dir());

    Ok(())
}

#[tokio::test]
async fn test_wav_capture_loops_source() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source: Vec<i16> = (1..=100).collect();
    let input = write_source(dir.path(), &source)?;
    let backend = WavBackend::new(Some(input), dir.path().to_path_buf())?;

    let mut capture = backend.open_capture(params(80)).await?;
    let first = capture.read(80).await?;
    let second = capture.read(80).await?;

    assert_eq!(first.samples, source[..80].to_vec());
    let mut wrapped = source[80..].to_vec();
    wrapped.extend_from_slice(&source[..60]);
    assert_eq!(second.samples, wrapped);
    assert_eq!(second.sample_rate, 16000);

    Ok(())
}

#[tokio::test]
async fn test_wav_capture_without_source_is_silent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = WavBackend::new(None, dir.path().to_path_buf())?;

    let mut capture = backend.open_capture(params(160)).await?;
    let frame = capture.read(160).await?;

    assert_eq!(frame.samples, vec![0; 160]);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_wav_capture_is_paced_in_real_time() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = WavBackend::new(None, dir.path().to_path_buf())?;
    let mut capture = backend.open_capture(params(1600)).await?;

    let started = tokio::time::Instant::now();
    for _ in 0..5 {
        capture.read(1600).await?;
    }

    // Five 100ms frames
    assert!(started.elapsed() >= Duration::from_millis(499));

    Ok(())
}

#[tokio::test]
async fn test_wav_capture_rejects_unknown_device() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = WavBackend::new(None, dir.path().to_path_buf())?;

    let result = backend
        .open_capture(CaptureParams {
            device_id: Some(7),
            ..params(160)
        })
        .await;

    assert!(result.is_err());

    Ok(())
}

#[tokio::test]
async fn test_wav_capture_fails_after_close() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = WavBackend::new(None, dir.path().to_path_buf())?;
    let mut capture = backend.open_capture(params(160)).await?;

    capture.close().await?;

    assert!(!capture.is_active());
    assert!(capture.read(160).await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_wav_playback_writes_file_per_open() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = WavBackend::new(None, dir.path().to_path_buf())?;

    let mut first = backend.open_playback(16000).await?;
    first.write(&AudioFrame::new(vec![100; 320], 16000)).await?;
    first.close().await?;
    assert!(!first.is_active());
    assert!(first.write(&AudioFrame::silence(10, 16000)).await.is_err());

    let mut second = backend.open_playback(24000).await?;
    assert_eq!(second.sample_rate(), 24000);
    second.write(&AudioFrame::new(vec![-50; 480], 24000)).await?;
    second.close().await?;

    let reader = hound::WavReader::open(dir.path().join("playback-000-16000hz.wav"))?;
    assert_eq!(reader.spec().sample_rate, 16000);
    assert_eq!(reader.len(), 320);

    let reader = hound::WavReader::open(dir.path().join("playback-001-24000hz.wav"))?;
    assert_eq!(reader.spec().sample_rate, 24000);
    let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
    assert_eq!(samples, vec![-50; 480]);

    Ok(())
}

#[tokio::test]
async fn test_wav_playback_finalizes_on_drop() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = WavBackend::new(None, dir.path().to_path_buf())?;

    {
        let mut playback = backend.open_playback(16000).await?;
        playback.write(&AudioFrame::new(vec![1; 64], 16000)).await?;
    }

    let reader = hound::WavReader::open(dir.path().join("playback-000-16000hz.wav"))?;
    assert_eq!(reader.len(), 64);

    Ok(())
}

#[test]
fn test_factory_builds_file_backend_by_default() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = AudioConfig {
        output_dir: dir.path().to_path_buf(),
        ..AudioConfig::default()
    };
    assert_eq!(config.backend, BackendKind::File);

    let backend = AudioBackendFactory::create(&config)?;

    assert_eq!(backend.name(), "wav:silence");

    Ok(())
}

#[test]
fn test_factory_rejects_wrong_format_source() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("hifi.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 48000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&input, spec)?;
    writer.write_sample(0i16)?;
    writer.write_sample(0i16)?;
    writer.finalize()?;

    let config = AudioConfig {
        input_wav: Some(input),
        output_dir: dir.path().to_path_buf(),
        ..AudioConfig::default()
    };

    assert!(AudioBackendFactory::create(&config).is_err());

    Ok(())
}
