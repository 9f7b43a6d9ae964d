pub mod activity;
pub mod backend;
pub mod device;
pub mod file;
pub mod wav;

#[cfg(feature = "microphone")]
pub mod cpal_backend;

pub use activity::{frame_energy, level_meter, Activity, ActivityState};
pub use backend::{
    AudioBackend, AudioBackendFactory, AudioFrame, CaptureParams, CaptureStream, InputDevice,
    PlaybackStream, CHANNELS, DEFAULT_PLAYBACK_RATE, FRAME_SIZE, INPUT_SAMPLE_RATE,
};
pub use device::{select_playback_rate, AudioDevice, DeviceConfig};
pub use file::AudioFile;
pub use wav::WavBackend;
