//! End-to-end behaviour of a session driven through its public API.

use std::f64::consts::PI;
use std::time::Duration;

use mains_simulator::{apply, parse_command, Session, SessionOptions, TickOutcome};
use mains_types::{FaultType, SimulationParameters, TriggerConfig};

fn seeded(params: SimulationParameters) -> Session {
    Session::new(params, SessionOptions { seed: Some(2024), ..Default::default() })
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

#[test]
fn north_american_service_readout() {
    let session = seeded(SimulationParameters {
        amplitude_v: 170.0,
        frequency_hz: 60.0,
        chassis_grounded: true,
        ..Default::default()
    });
    let r = session.readout();
    assert_eq!(r.peak_to_peak, 340.0);
    assert!((r.rms_voltage - 120.2).abs() < 0.05);
    assert_eq!(r.zero_crossing, 0.0);
}

#[test]
fn clean_signal_matches_ideal_sinusoid() {
    let mut session = seeded(SimulationParameters::default());
    for i in 0..500 {
        let t = 0.123 + i as f64 * 1.3e-4;
        let expected = 170.0 * (2.0 * PI * 60.0 * t).sin();
        assert!((session.value(t, 0.0) - expected).abs() < 1e-9);
    }
}

#[test]
fn neutral_loss_raises_both_legs_until_cleared() {
    let mut session = seeded(SimulationParameters::default());
    session.set_fault_intensity(0.5);
    session.trigger_fault(FaultType::NeutralLoss);

    session.tick(ms(0));
    for i in 1..=60 {
        session.tick(ms(i * 100));
    }
    let t = session.time();
    assert!(t > 5.0);
    let ideal = 170.0 * (2.0 * PI * 60.0 * t).sin();
    assert!((session.value(t, 0.0) - (ideal + 51.0)).abs() < 1e-9);
    assert!((session.value(t, PI) - (-ideal + 51.0)).abs() < 1e-6);

    // persistent: outlives the 10 s default
    for i in 61..=200 {
        session.tick(ms(i * 100));
    }
    assert!(session.time() > 19.0);
    assert_eq!(session.faults().len(), 1);

    session.clear_all_faults();
    let t = session.time();
    let ideal = 170.0 * (2.0 * PI * 60.0 * t).sin();
    assert!((session.value(t, 0.0) - ideal).abs() < 1e-9);
}

#[test]
fn persistent_trigger_is_idempotent() {
    let mut session = seeded(SimulationParameters::default());
    assert!(session.trigger_fault_named("neutral-loss").is_some());
    assert!(session.trigger_fault_named("neutral-loss").is_none());
    let count = session
        .faults()
        .iter()
        .filter(|f| f.fault_type == FaultType::NeutralLoss)
        .count();
    assert_eq!(count, 1);
}

#[test]
fn switching_transient_expires_and_is_pruned() {
    let mut session = seeded(SimulationParameters::default());
    session.tick(ms(0));
    let id = session.trigger_fault(FaultType::ResistiveSwitchL1).unwrap();
    let start = session.faults().get(id).unwrap().start_time;

    // clean vs faulted value a quarter period of the 1 kHz burst in
    let during = start + 0.00025;
    let ideal = 170.0 * (2.0 * PI * 60.0 * during).sin();
    assert!((session.value(during, 0.0) - ideal).abs() > 1.0);

    for late in [0.2, 10.0, 1e4] {
        let t = start + late;
        let ideal = 170.0 * (2.0 * PI * 60.0 * t).sin();
        assert!((session.value(t, 0.0) - ideal).abs() < 1e-6);
    }

    // still registered until a maintenance pass runs past its lifetime
    session.tick(ms(100));
    assert!(session.faults().get(id).is_some());
    match session.tick(ms(200)) {
        TickOutcome::Advanced { expired, .. } => assert_eq!(expired, vec![id]),
        TickOutcome::Paused => panic!("session should be playing"),
    }
    assert!(session.faults().is_empty());
}

#[test]
fn auto_trigger_window_is_phase_locked() {
    let mut session = seeded(SimulationParameters::default());
    session.set_trigger_config(TriggerConfig::Auto { level_v: 0.0 });
    let period = 1.0 / 60.0;
    let t = 3.217;
    let a = session.sample_window(t, 0.0);
    let b = session.sample_window(t + period, 0.0);
    assert!((b.window_start - a.window_start - period).abs() < 1e-9);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.samples.iter().zip(&b.samples) {
        assert!((x - y).abs() < 1e-6);
    }
}

#[test]
fn rms_extrema_stay_within_band_for_any_fault_mix() {
    let params = SimulationParameters::default();
    let nominal = params.nominal_rms();
    let mut session = seeded(params);
    session.set_fault_intensity(1.0);
    session.tick(ms(0));

    let mut wall = 0;
    for round in 0..6 {
        for ft in FaultType::ALL {
            session.trigger_fault(ft);
            if round % 2 == 0 {
                session.trigger_fault(FaultType::NeutralLoss);
            }
            wall += 20;
            session.tick(ms(wall));
            let stats = session.statistics_snapshot();
            assert!(stats.min_rms >= 0.5 * nominal - 1e-9);
            assert!(stats.max_rms <= 1.5 * nominal + 1e-9);
        }
        session.clear_all_faults();
    }
}

#[test]
fn paused_interval_is_not_replayed() {
    let mut session = seeded(SimulationParameters::default());
    session.set_speed(0.5);
    session.tick(ms(0));
    session.tick(ms(200));
    session.pause(ms(200));
    assert_eq!(session.tick(ms(10_000)), TickOutcome::Paused);
    session.resume(ms(20_000));
    session.tick(ms(20_400));
    assert!((session.time() - 0.3).abs() < 1e-12);
}

#[test]
fn slow_playback_samples_more_densely() {
    let mut session = seeded(SimulationParameters::default());
    let fast = session.sample_window(1.0, 0.0);
    session.set_speed(0.01);
    let slow = session.sample_window(1.0, 0.0);
    assert_eq!(fast.len(), 800);
    assert_eq!(slow.len(), 4000);
    assert!(slow.effective_time_step < fast.effective_time_step);
}

#[test]
fn seeded_sessions_replay_arc_noise_exactly() {
    let run = || {
        let mut session = seeded(SimulationParameters::default());
        session.trigger_fault(FaultType::ArcFault240V);
        session.sample_window(0.05, PI).samples
    };
    assert_eq!(run(), run());
}

#[test]
fn json_commands_drive_a_session() {
    let mut session = seeded(SimulationParameters::default());
    let script = [
        r#"{"cmd":"trigger_fault","args":{"fault":"dc-injection"}}"#,
        r#"{"cmd":"set_trigger","args":{"mode":"none"}}"#,
        r#"{"cmd":"pause"}"#,
    ];
    for raw in script {
        apply(&mut session, parse_command(raw).unwrap(), Duration::ZERO).unwrap();
    }
    assert!(!session.is_playing());
    assert_eq!(session.trigger_config(), TriggerConfig::None);
    assert_eq!(session.safety_alerts().len(), 1);

    apply(&mut session, parse_command(r#"{"cmd":"reset"}"#).unwrap(), Duration::ZERO).unwrap();
    assert!(session.faults().is_empty());
    assert!(session.safety_alerts().is_empty());
}
