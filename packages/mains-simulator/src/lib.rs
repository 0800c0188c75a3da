//! # mains-simulator
//!
//! Split-phase mains waveform engine: synthesis with injectable faults, an
//! oscilloscope-style trigger, speed-adaptive sampling and running statistics.
//! Rendering is left to the consumer; the `mains-sim` binary drives a session
//! headlessly and streams telemetry as JSON lines.

pub mod clock;
pub mod config;
pub mod control;
pub mod fault_effects;
pub mod faults;
pub mod readout;
pub mod sampler;
pub mod session;
pub mod statistics;
pub mod telemetry;
pub mod trigger;
pub mod waveform;

pub use control::{apply, parse_command, Command, CommandError, Script, ScriptEntry};
pub use config::{ConfigError, FileConfig};
pub use sampler::SampleWindow;
pub use session::{Session, SessionOptions, TickOutcome};
pub use telemetry::{TelemetryFrame, TelemetryWriter};
