//! Voice session management
//!
//! This module provides the session side of the duplex client:
//! - The `VoiceSession` / `SessionFactory` collaborator traits
//! - The shared current-session slot read by the audio workers
//! - The `ConnectionSupervisor` that connects, monitors and replaces sessions
//! - Process-wide counters and health snapshots

mod client;
mod config;
mod slot;
mod stats;
mod supervisor;

pub use client::{SessionFactory, SessionHook, SessionHooks, VoiceSession};
pub use config::{Character, SessionState};
pub use slot::SessionSlot;
pub use stats::{Counters, HealthSnapshot};
pub use supervisor::{ConnectionSupervisor, SupervisorConfig};
