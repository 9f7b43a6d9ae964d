//! Duplex audio pipeline
//!
//! Four long-lived tasks share one `AudioDevice` and one `SessionSlot`:
//! capture (microphone → session, plus the device watchdog), playback
//! (session → speaker), the connection monitor, and the health reporter.
//! All of them stop on the shared `Shutdown` flag.

mod capture;
mod client;
mod health;
mod playback;
mod shutdown;

pub use capture::CaptureWorker;
pub use client::VoiceClient;
pub use health::{snapshot, HealthReporter};
pub use playback::{PlaybackTracker, PlaybackWorker, SpeechTransition};
pub use shutdown::Shutdown;
