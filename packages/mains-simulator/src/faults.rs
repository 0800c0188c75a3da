//! faults.rs — Registry of injected faults
//!
//! Faults are injected at runtime through the control API, each stamped with the
//! simulated time of creation and the global intensity setting of that moment.
//! The registry is only mutated between frames: by explicit commands and by the
//! maintenance pass at the top of a tick. Every evaluation within one frame sees
//! the same borrowed snapshot.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use mains_types::{Fault, FaultId, FaultStatus, FaultType};

/// Intensity used until the operator moves the slider.
pub const DEFAULT_INTENSITY: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct FaultRegistry {
    /// Insertion order is kept so replays iterate identically
    faults: IndexMap<FaultId, Fault>,
    next_id: FaultId,
    intensity: f64,
}

impl Default for FaultRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_INTENSITY)
    }
}

impl FaultRegistry {
    pub fn new(intensity: f64) -> Self {
        Self {
            faults: IndexMap::new(),
            next_id: 0,
            intensity: clamp_intensity(intensity),
        }
    }

    /// Intensity applied to faults created from now on.
    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn set_intensity(&mut self, intensity: f64) -> f64 {
        self.intensity = clamp_intensity(intensity);
        self.intensity
    }

    /// Inject a fault starting at simulated time `now`.
    /// A persistent type that is already active is left alone and `None` is returned.
    pub fn trigger(&mut self, fault_type: FaultType, now: f64) -> Option<FaultId> {
        let persistent = fault_type.is_persistent();
        if persistent && self.contains_type(fault_type) {
            debug!("{fault_type} already active, ignoring duplicate trigger");
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.faults.insert(
            id,
            Fault {
                id,
                fault_type,
                start_time: now,
                duration: fault_type.default_duration(),
                intensity: self.intensity,
                persistent,
            },
        );
        info!(
            "⚡ Fault #{id} {fault_type} injected at t={now:.3}s (intensity {:.0}%)",
            self.intensity * 100.0
        );
        Some(id)
    }

    /// Inject by wire name. Unknown names are rejected without touching the registry.
    pub fn trigger_named(&mut self, name: &str, now: f64) -> Option<FaultId> {
        match name.parse::<FaultType>() {
            Ok(fault_type) => self.trigger(fault_type, now),
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }

    pub fn clear(&mut self) {
        if !self.faults.is_empty() {
            info!("🧹 Cleared {} active fault(s)", self.faults.len());
        }
        self.faults.clear();
    }

    /// Maintenance pass: drop non-persistent faults whose lifetime ended before `now`.
    /// Returns the removed faults in registry order.
    pub fn prune_expired(&mut self, now: f64) -> Vec<Fault> {
        let mut expired = Vec::new();
        self.faults.retain(|_, fault| {
            if fault.is_expired(now) {
                expired.push(*fault);
                false
            } else {
                true
            }
        });
        for fault in &expired {
            debug!("Fault #{} {} expired at t={now:.3}s", fault.id, fault.fault_type);
        }
        expired
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fault> {
        self.faults.values()
    }

    pub fn get(&self, id: FaultId) -> Option<&Fault> {
        self.faults.get(&id)
    }

    pub fn contains_type(&self, fault_type: FaultType) -> bool {
        self.faults.values().any(|f| f.fault_type == fault_type)
    }

    pub fn len(&self) -> usize {
        self.faults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn statuses(&self, now: f64) -> Vec<FaultStatus> {
        self.faults.values().map(|f| f.status(now)).collect()
    }
}

fn clamp_intensity(intensity: f64) -> f64 {
    if intensity.is_finite() {
        intensity.clamp(0.0, 1.0)
    } else {
        DEFAULT_INTENSITY
    }
}
