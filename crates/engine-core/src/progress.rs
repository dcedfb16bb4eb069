use crate::error::ProgressError;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// Tolerance applied when checking that phase weights sum to one.
pub const WEIGHT_EPSILON: f64 = 1e-6;

// Overall percentage never reaches 100 while any phase is still open.
const OPEN_PIPELINE_CEILING: f64 = 99.999_999;

/// Declared shape of one pipeline phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub total_steps: u64,
}

impl PhaseSpec {
    pub fn new(name: impl Into<String>, weight: f64, total_steps: u64) -> Self {
        PhaseSpec {
            name: name.into(),
            weight,
            total_steps,
        }
    }
}

/// A named, weighted unit of work, mutated in place during a run.
#[derive(Debug, Clone)]
pub struct Phase {
    name: String,
    weight: f64,
    total_steps: u64,
    completed_steps: u64,
    is_active: bool,
    started_at: Option<Instant>,
    resumed_at: Option<Instant>,
    // Time spent active in earlier activation windows.
    active_time: Duration,
}

impl Phase {
    fn from_spec(spec: &PhaseSpec, weight: f64) -> Self {
        Phase {
            name: spec.name.clone(),
            weight,
            total_steps: spec.total_steps,
            completed_steps: 0,
            is_active: false,
            started_at: None,
            resumed_at: None,
            active_time: Duration::ZERO,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn completed_steps(&self) -> u64 {
        self.completed_steps
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Completion in `[0, 1]`. A zero-step phase is binary: done once activated.
    pub fn fraction(&self) -> f64 {
        if self.total_steps == 0 {
            if self.started_at.is_some() { 1.0 } else { 0.0 }
        } else {
            self.completed_steps as f64 / self.total_steps as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        if self.total_steps == 0 {
            self.started_at.is_some()
        } else {
            self.completed_steps >= self.total_steps
        }
    }

    /// Seconds this phase has spent active, summed over every activation.
    fn elapsed_secs(&self, now: Instant) -> f64 {
        let current = self
            .resumed_at
            .map_or(Duration::ZERO, |resumed| now.saturating_duration_since(resumed));
        (self.active_time + current).as_secs_f64()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub name: String,
    pub weight: f64,
    pub completed_steps: u64,
    pub total_steps: u64,
    pub percent: f64,
    pub is_active: bool,
}

/// Immutable, point-in-time progress read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub overall_percent: f64,
    pub active_phase: Option<String>,
    pub phases: Vec<PhaseProgress>,
    pub estimated_remaining_seconds: Option<f64>,
}

impl ProgressSnapshot {
    pub fn phase(&self, name: &str) -> Option<&PhaseProgress> {
        self.phases.iter().find(|p| p.name == name)
    }
}

/// Tracks an ordered list of weighted phases and derives overall completion
/// and an ETA from them.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phases: Vec<Phase>,
    active: Option<usize>,
}

impl PhaseTracker {
    pub fn new(specs: &[PhaseSpec]) -> Result<Self, ProgressError> {
        if specs.is_empty() {
            return Err(ProgressError::EmptyPipeline);
        }

        let mut seen = HashSet::new();
        for spec in specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(ProgressError::DuplicatePhase(spec.name.clone()));
            }
            if !(spec.weight > 0.0 && spec.weight <= 1.0) {
                return Err(ProgressError::InvalidWeight {
                    phase: spec.name.clone(),
                    weight: spec.weight,
                });
            }
        }

        let sum: f64 = specs.iter().map(|s| s.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(ProgressError::WeightSum(sum));
        }

        // Absorb the epsilon so a fully completed pipeline reads exactly 100.
        let phases = specs
            .iter()
            .map(|spec| Phase::from_spec(spec, spec.weight / sum))
            .collect();

        Ok(PhaseTracker {
            phases,
            active: None,
        })
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.position(name).map(|idx| &self.phases[idx])
    }

    pub fn active_phase(&self) -> Option<&Phase> {
        self.active.map(|idx| &self.phases[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// See [`PhaseTracker::update_phase_at`].
    pub fn update_phase(&mut self, name: &str, completed_steps: i64, activate: bool) -> bool {
        self.update_phase_at(name, completed_steps, activate, Instant::now())
    }

    /// Sets a phase's completed steps, clamped to its total. Unknown phases
    /// and negative step counts are rejected without touching state.
    ///
    /// Returns whether any state changed.
    pub fn update_phase_at(
        &mut self,
        name: &str,
        completed_steps: i64,
        activate: bool,
        now: Instant,
    ) -> bool {
        let Some(idx) = self.position(name) else {
            warn!(phase = name, "Ignoring update for unknown phase");
            return false;
        };
        if completed_steps < 0 {
            warn!(phase = name, completed_steps, "Ignoring negative step count");
            return false;
        }

        let mut changed = false;
        if activate {
            changed |= self.activate_at(idx, now);
        }

        let phase = &mut self.phases[idx];
        let clamped = (completed_steps as u64).min(phase.total_steps);
        if phase.completed_steps != clamped {
            phase.completed_steps = clamped;
            changed = true;
        }

        if changed {
            debug!(
                phase = name,
                completed = phase.completed_steps,
                total = phase.total_steps,
                "Phase progress updated"
            );
        }
        changed
    }

    /// Changes a phase's total, clamping already completed steps.
    pub fn set_total_steps(&mut self, name: &str, total_steps: u64) -> bool {
        let Some(idx) = self.position(name) else {
            warn!(phase = name, "Ignoring total for unknown phase");
            return false;
        };
        let phase = &mut self.phases[idx];
        if phase.total_steps == total_steps {
            return false;
        }
        phase.total_steps = total_steps;
        phase.completed_steps = phase.completed_steps.min(total_steps);
        true
    }

    pub fn activate(&mut self, name: &str) -> bool {
        self.activate_named_at(name, Instant::now())
    }

    pub fn activate_named_at(&mut self, name: &str, now: Instant) -> bool {
        match self.position(name) {
            Some(idx) => self.activate_at(idx, now),
            None => {
                warn!(phase = name, "Ignoring activation of unknown phase");
                false
            }
        }
    }

    /// Marks the phase as fully done, keeping it active.
    pub fn complete_phase(&mut self, name: &str) -> bool {
        let total = match self.phase(name) {
            Some(phase) => phase.total_steps,
            None => return false,
        };
        self.update_phase(name, total as i64, false)
    }

    /// Closes the active phase's timing window without activating another.
    pub fn deactivate_at(&mut self, now: Instant) {
        if let Some(idx) = self.active.take() {
            let phase = &mut self.phases[idx];
            phase.is_active = false;
            if let Some(resumed) = phase.resumed_at.take() {
                phase.active_time += now.saturating_duration_since(resumed);
            }
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> ProgressSnapshot {
        let phases = self
            .phases
            .iter()
            .map(|phase| PhaseProgress {
                name: phase.name.clone(),
                weight: phase.weight,
                completed_steps: phase.completed_steps,
                total_steps: phase.total_steps,
                percent: phase.fraction() * 100.0,
                is_active: phase.is_active,
            })
            .collect();

        ProgressSnapshot {
            overall_percent: self.overall_percent(),
            active_phase: self.active_phase().map(|p| p.name.clone()),
            phases,
            estimated_remaining_seconds: self.estimate_remaining_secs(now),
        }
    }

    pub fn overall_percent(&self) -> f64 {
        if self.phases.iter().all(Phase::is_complete) {
            return 100.0;
        }
        let weighted: f64 = self.phases.iter().map(|p| p.weight * p.fraction()).sum();
        (weighted * 100.0).clamp(0.0, OPEN_PIPELINE_CEILING)
    }

    /// Zeroes every phase and clears activity and timestamps.
    pub fn reset(&mut self) {
        for phase in &mut self.phases {
            phase.completed_steps = 0;
            phase.is_active = false;
            phase.started_at = None;
            phase.resumed_at = None;
            phase.active_time = Duration::ZERO;
        }
        self.active = None;
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.name == name)
    }

    fn activate_at(&mut self, idx: usize, now: Instant) -> bool {
        if self.active == Some(idx) {
            return false;
        }
        self.deactivate_at(now);

        let phase = &mut self.phases[idx];
        phase.is_active = true;
        phase.resumed_at = Some(now);
        phase.started_at.get_or_insert(now);
        self.active = Some(idx);
        true
    }

    /// Seconds spent per unit of pipeline weight completed so far.
    fn seconds_per_weight(&self, now: Instant) -> Option<f64> {
        let weight_done: f64 = self.phases.iter().map(|p| p.weight * p.fraction()).sum();
        let elapsed: f64 = self.phases.iter().map(|p| p.elapsed_secs(now)).sum();
        if weight_done > 0.0 && elapsed > 0.0 {
            Some(elapsed / weight_done)
        } else {
            None
        }
    }

    fn estimate_remaining_secs(&self, now: Instant) -> Option<f64> {
        if self.phases.iter().all(Phase::is_complete) {
            return Some(0.0);
        }

        let active_idx = self.active?;
        let active = &self.phases[active_idx];
        let rate = self.seconds_per_weight(now);

        let active_remaining = if active.total_steps == 0 || active.is_complete() {
            0.0
        } else if active.completed_steps > 0 {
            let per_step = active.elapsed_secs(now) / active.completed_steps as f64;
            per_step * (active.total_steps - active.completed_steps) as f64
        } else {
            rate? * active.weight
        };

        let following: f64 = self.phases[active_idx + 1..]
            .iter()
            .filter(|p| !p.is_complete())
            .map(|p| p.weight * (1.0 - p.fraction()))
            .sum();

        let following_remaining = if following > 0.0 { rate? * following } else { 0.0 };

        Some(active_remaining + following_remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_phases() -> PhaseTracker {
        PhaseTracker::new(&[
            PhaseSpec::new("parsing", 0.2, 10),
            PhaseSpec::new("validating", 0.3, 10),
            PhaseSpec::new("importing", 0.5, 10),
        ])
        .unwrap()
    }

    #[test]
    fn weighted_overall_percent() {
        let mut tracker = three_phases();
        tracker.update_phase("parsing", 10, true);
        tracker.update_phase("validating", 5, true);

        let snapshot = tracker.snapshot();
        assert!((snapshot.overall_percent - 35.0).abs() < 1e-9);
        assert_eq!(snapshot.active_phase.as_deref(), Some("validating"));
        assert_eq!(snapshot.phase("parsing").unwrap().percent, 100.0);
        assert_eq!(snapshot.phase("importing").unwrap().percent, 0.0);
    }

    #[test]
    fn clamps_and_rejects_invalid_steps() {
        let mut tracker = three_phases();
        assert!(tracker.update_phase("parsing", 25, false));
        assert_eq!(tracker.phase("parsing").unwrap().completed_steps(), 10);

        assert!(!tracker.update_phase("parsing", -3, true));
        assert_eq!(tracker.phase("parsing").unwrap().completed_steps(), 10);
        assert!(!tracker.phase("parsing").unwrap().is_active());

        assert!(!tracker.update_phase("missing", 1, true));
    }

    #[test]
    fn repeated_update_is_idempotent() {
        let mut tracker = three_phases();
        let now = Instant::now();
        assert!(tracker.update_phase_at("validating", 4, true, now));
        let first = tracker.snapshot_at(now + Duration::from_secs(2));

        assert!(!tracker.update_phase_at("validating", 4, true, now + Duration::from_secs(1)));
        let second = tracker.snapshot_at(now + Duration::from_secs(2));
        assert_eq!(first, second);
    }

    #[test]
    fn zero_step_phase_is_binary() {
        let mut tracker = PhaseTracker::new(&[
            PhaseSpec::new("prepare", 0.5, 0),
            PhaseSpec::new("load", 0.5, 4),
        ])
        .unwrap();

        assert_eq!(tracker.snapshot().overall_percent, 0.0);
        tracker.activate("prepare");
        assert!((tracker.snapshot().overall_percent - 50.0).abs() < 1e-9);

        tracker.update_phase("load", 4, true);
        assert_eq!(tracker.snapshot().overall_percent, 100.0);
    }

    #[test]
    fn overall_reaches_100_only_when_everything_is_done() {
        let weight_sets: [&[f64]; 4] = [
            &[1.0],
            &[0.1, 0.2, 0.7],
            &[0.25, 0.25, 0.25, 0.25],
            &[0.333_333_3, 0.333_333_3, 0.333_333_4],
        ];

        for weights in weight_sets {
            let specs: Vec<_> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| PhaseSpec::new(format!("p{i}"), *w, 3))
                .collect();
            let mut tracker = PhaseTracker::new(&specs).unwrap();

            for (i, _) in weights.iter().enumerate() {
                for step in 0..=3 {
                    tracker.update_phase(&format!("p{i}"), step, true);
                    let percent = tracker.snapshot().overall_percent;
                    assert!((0.0..=100.0).contains(&percent));
                    let last = i == weights.len() - 1 && step == 3;
                    assert_eq!(percent == 100.0, last, "weights {weights:?} p{i} step {step}");
                }
            }
        }
    }

    #[test]
    fn estimates_remaining_time_from_throughput() {
        let mut tracker = PhaseTracker::new(&[
            PhaseSpec::new("validating", 0.5, 10),
            PhaseSpec::new("importing", 0.5, 10),
        ])
        .unwrap();
        let start = Instant::now();

        tracker.update_phase_at("validating", 5, true, start);
        let snapshot = tracker.snapshot_at(start + Duration::from_secs(10));
        // 2s per step * 5 remaining, then 0.5 weight at 40s per unit weight.
        let eta = snapshot.estimated_remaining_seconds.unwrap();
        assert!((eta - 30.0).abs() < 1e-6, "eta was {eta}");
    }

    #[test]
    fn reentered_phase_only_counts_its_active_time() {
        let mut tracker = PhaseTracker::new(&[
            PhaseSpec::new("a", 0.5, 10),
            PhaseSpec::new("b", 0.5, 10),
        ])
        .unwrap();
        let start = Instant::now();

        tracker.update_phase_at("a", 5, true, start);
        tracker.activate_named_at("b", start + Duration::from_secs(5));
        tracker.activate_named_at("a", start + Duration::from_secs(100));

        let snapshot = tracker.snapshot_at(start + Duration::from_secs(100));
        // a: 5 steps left at 1s each. b: 0.5 weight at 400s per unit weight.
        let eta = snapshot.estimated_remaining_seconds.unwrap();
        assert!((eta - 205.0).abs() < 1e-6, "eta was {eta}");

        let snapshot = tracker.snapshot_at(start + Duration::from_secs(102));
        let eta = snapshot.estimated_remaining_seconds.unwrap();
        // a has now been active 7s for 5 steps.
        assert!((eta - (7.0 + 204.0)).abs() < 1e-6, "eta was {eta}");
    }

    #[test]
    fn no_estimate_before_any_activity() {
        let tracker = three_phases();
        assert_eq!(tracker.snapshot().estimated_remaining_seconds, None);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut tracker = three_phases();
        tracker.update_phase("parsing", 10, true);
        tracker.update_phase("importing", 3, true);
        tracker.reset();

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.overall_percent, 0.0);
        assert_eq!(snapshot.active_phase, None);
        assert!(tracker.phases().iter().all(|p| p.started_at().is_none()));
    }

    #[test]
    fn rejects_invalid_declarations() {
        assert!(matches!(
            PhaseTracker::new(&[]),
            Err(ProgressError::EmptyPipeline)
        ));
        assert!(matches!(
            PhaseTracker::new(&[PhaseSpec::new("a", 0.5, 1), PhaseSpec::new("a", 0.5, 1)]),
            Err(ProgressError::DuplicatePhase(_))
        ));
        assert!(matches!(
            PhaseTracker::new(&[PhaseSpec::new("a", 0.0, 1), PhaseSpec::new("b", 1.0, 1)]),
            Err(ProgressError::InvalidWeight { .. })
        ));
        assert!(matches!(
            PhaseTracker::new(&[PhaseSpec::new("a", 0.5, 1), PhaseSpec::new("b", 0.4, 1)]),
            Err(ProgressError::WeightSum(_))
        ));
    }
}
