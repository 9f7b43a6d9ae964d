use thiserror::Error;

/// Failures that end the client.
///
/// Everything else the pipeline meets (connect failures, dropped frames,
/// send/receive errors, rate adaptation) is logged and retried in place.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("No input devices found")]
    NoInputDevices,

    #[error("Failed to open any microphone: {0}")]
    MicrophoneUnavailable(String),

    #[error("Failed to open speaker: {0}")]
    PlaybackUnavailable(String),

    #[error("Critical error during audio reset: {0}")]
    DeviceResetFailed(String),
}
