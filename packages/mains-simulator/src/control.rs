//! control.rs — Control commands
//!
//! Commands are JSON: `{ "cmd": "...", "args": {...} }`, the same envelope the
//! control panel sends. `args` may be omitted for commands that take none.
//! The driver applies each command under the session lock, so commands always
//! land between two ticks.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use mains_types::{FaultType, ParseFaultTypeError, SimulationParameters, SpeedPreset, TriggerMode};

use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "args", rename_all = "snake_case")]
pub enum Command {
    Pause,
    Resume,
    TogglePlay,
    Reset,
    SetSpeed { speed: f64 },
    PresetSpeed { name: SpeedPreset },
    /// Fault by wire name, e.g. `"neutral-loss"`
    TriggerFault { fault: String },
    ClearFaults,
    SetIntensity { intensity: f64 },
    SetTrigger {
        mode: TriggerMode,
        #[serde(default)]
        level: Option<f64>,
    },
    Configure { params: SimulationParameters },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("malformed control command: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    UnknownFault(#[from] ParseFaultTypeError),
}

pub fn parse_command(raw: &str) -> Result<Command, CommandError> {
    Ok(serde_json::from_str(raw)?)
}

/// Apply `cmd` to the session at wall-clock `now`.
pub fn apply(session: &mut Session, cmd: Command, now: Duration) -> Result<(), CommandError> {
    match cmd {
        Command::Pause => session.pause(now),
        Command::Resume => session.resume(now),
        Command::TogglePlay => session.toggle_play(now),
        Command::Reset => session.reset(),
        Command::SetSpeed { speed } => {
            session.set_speed(speed);
        }
        Command::PresetSpeed { name } => {
            session.apply_speed_preset(name);
        }
        Command::TriggerFault { fault } => {
            let fault_type: FaultType = fault.parse()?;
            session.trigger_fault(fault_type);
        }
        Command::ClearFaults => session.clear_all_faults(),
        Command::SetIntensity { intensity } => {
            let applied = session.set_fault_intensity(intensity);
            info!("🎚 Fault intensity {:.0}%", applied * 100.0);
        }
        Command::SetTrigger { mode, level } => session.set_trigger(mode, level),
        Command::Configure { params } => session.configure(params),
    }
    Ok(())
}

// ── Scripted commands ─────────────────────────────────────────────────────────

/// A command scheduled at a simulated time, loaded from `[[script]]` in config.toml.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptEntry {
    pub at_s: f64,
    pub command: Command,
}

/// Releases scripted commands once simulated time reaches them.
#[derive(Debug, Clone, Default)]
pub struct Script {
    entries: Vec<ScriptEntry>,
    next: usize,
}

impl Script {
    pub fn new(mut entries: Vec<ScriptEntry>) -> Self {
        entries.sort_by(|a, b| a.at_s.total_cmp(&b.at_s));
        Self { entries, next: 0 }
    }

    /// Commands whose time is `<= sim_time` and that have not fired yet, in time order.
    pub fn due(&mut self, sim_time: f64) -> Vec<Command> {
        let start = self.next;
        while self.next < self.entries.len() && self.entries[self.next].at_s <= sim_time {
            self.next += 1;
        }
        self.entries[start..self.next].iter().map(|e| e.command.clone()).collect()
    }

    /// Rewind after a session reset.
    pub fn rewind(&mut self) {
        self.next = 0;
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionOptions;
    use mains_types::TriggerConfig;

    fn session() -> Session {
        Session::new(
            SimulationParameters::default(),
            SessionOptions { seed: Some(5), ..Default::default() },
        )
    }

    #[test]
    fn parses_commands_with_and_without_args() {
        assert_eq!(parse_command(r#"{"cmd":"pause"}"#).unwrap(), Command::Pause);
        assert_eq!(
            parse_command(r#"{"cmd":"set_speed","args":{"speed":0.1}}"#).unwrap(),
            Command::SetSpeed { speed: 0.1 }
        );
        assert_eq!(
            parse_command(r#"{"cmd":"preset_speed","args":{"name":"ultra_slow"}}"#).unwrap(),
            Command::PresetSpeed { name: SpeedPreset::UltraSlow }
        );
        assert_eq!(
            parse_command(r#"{"cmd":"set_trigger","args":{"mode":"none"}}"#).unwrap(),
            Command::SetTrigger { mode: TriggerMode::None, level: None }
        );
    }

    #[test]
    fn unknown_command_is_malformed() {
        let err = parse_command(r#"{"cmd":"self_destruct"}"#).unwrap_err();
        assert!(matches!(err, CommandError::Malformed(_)));
        assert!(parse_command("not json").is_err());
    }

    #[test]
    fn apply_drives_the_session() {
        let mut s = session();
        let now = Duration::ZERO;
        let cmds = [
            r#"{"cmd":"set_intensity","args":{"intensity":1.0}}"#,
            r#"{"cmd":"trigger_fault","args":{"fault":"neutral-loss"}}"#,
            r#"{"cmd":"set_trigger","args":{"mode":"manual","level":42.0}}"#,
            r#"{"cmd":"preset_speed","args":{"name":"slow"}}"#,
            r#"{"cmd":"toggle_play"}"#,
        ];
        for raw in cmds {
            apply(&mut s, parse_command(raw).unwrap(), now).unwrap();
        }
        assert_eq!(s.faults().len(), 1);
        assert_eq!(s.faults().iter().next().map(|f| f.intensity), Some(1.0));
        assert_eq!(s.trigger_config(), TriggerConfig::Manual { voltage_v: 42.0 });
        assert_eq!(s.speed(), 0.1);
        assert!(!s.is_playing());

        apply(&mut s, Command::ClearFaults, now).unwrap();
        assert!(s.faults().is_empty());
    }

    #[test]
    fn unknown_fault_is_an_error_and_a_no_op() {
        let mut s = session();
        let cmd = Command::TriggerFault { fault: "gremlins".into() };
        let err = apply(&mut s, cmd, Duration::ZERO).unwrap_err();
        assert!(matches!(err, CommandError::UnknownFault(_)));
        assert!(s.faults().is_empty());
    }

    #[test]
    fn configure_command_replaces_params() {
        let mut s = session();
        let raw = r#"{"cmd":"configure","args":{"params":{
            "frequency_hz":50.0,"amplitude_v":230.0,"dc_offset_v":0.0,
            "chassis_grounded":true,"split_phase":false}}}"#;
        apply(&mut s, parse_command(raw).unwrap(), Duration::ZERO).unwrap();
        assert_eq!(s.params().frequency_hz, 50.0);
        assert!(!s.params().split_phase);
    }

    #[test]
    fn script_releases_entries_in_time_order() {
        let mut script = Script::new(vec![
            ScriptEntry { at_s: 1.0, command: Command::ClearFaults },
            ScriptEntry { at_s: 0.2, command: Command::Pause },
            ScriptEntry { at_s: 0.5, command: Command::Resume },
        ]);
        assert!(script.due(0.1).is_empty());
        assert_eq!(script.due(0.6), vec![Command::Pause, Command::Resume]);
        assert!(!script.is_finished());
        assert_eq!(script.due(5.0), vec![Command::ClearFaults]);
        assert!(script.is_finished());
        script.rewind();
        assert_eq!(script.due(0.3), vec![Command::Pause]);
    }
}
