//! Homeostatic plasticity: tracks firing history and a calcium proxy, and
//! periodically nudges the firing threshold toward a target rate.

use std::collections::VecDeque;

use crate::error::{NeuronError, Result};
use crate::types::Timestamp;

/// Calcium baseline both states decay toward and fires are measured from.
pub const BASELINE_CALCIUM: f64 = 0.1;

/// Hard cap on `firing_history` length regardless of `activity_window`.
pub const FIRING_HISTORY_CAP: usize = 1000;

/// Validated, tunable homeostatic parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomeostaticParams {
    /// Desired steady-state firing rate, in Hz. Negative values are
    /// clamped to zero before use; zero drives the threshold toward its
    /// maximum bound (silencing).
    pub target_firing_rate: f64,
    /// Gain applied to the rate error when computing a threshold
    /// adjustment.
    pub homeostasis_strength: f64,
    /// Trailing window over which the firing rate is computed, in
    /// nanoseconds.
    pub activity_window_nanos: u64,
    /// Amount calcium increases on each fire.
    pub calcium_increment: f64,
    /// Multiplicative decay applied to calcium's distance from baseline
    /// on each homeostatic tick.
    pub calcium_decay_rate: f64,
}

impl HomeostaticParams {
    /// Construct with validation.
    pub fn new(
        target_firing_rate: f64,
        homeostasis_strength: f64,
        activity_window_nanos: u64,
        calcium_increment: f64,
        calcium_decay_rate: f64,
    ) -> Result<Self> {
        let params = Self {
            target_firing_rate,
            homeostasis_strength,
            activity_window_nanos,
            calcium_increment,
            calcium_decay_rate,
        };
        params.validate()?;
        Ok(params)
    }

    /// Re-check this configuration's invariants.
    pub fn validate(&self) -> Result<()> {
        if self.activity_window_nanos == 0 {
            return Err(NeuronError::invalid_configuration(
                "activity_window_nanos must be positive",
            ));
        }
        if self.calcium_increment < 0.0 {
            return Err(NeuronError::invalid_configuration(
                "calcium_increment must be non-negative",
            ));
        }
        if !(self.calcium_decay_rate > 0.0 && self.calcium_decay_rate <= 1.0) {
            return Err(NeuronError::invalid_configuration(
                "calcium_decay_rate must be in (0, 1]",
            ));
        }
        Ok(())
    }

    fn effective_target_rate(&self) -> f64 {
        self.target_firing_rate.max(0.0)
    }
}

impl Default for HomeostaticParams {
    fn default() -> Self {
        Self {
            target_firing_rate: 1.0,
            homeostasis_strength: 1.0,
            activity_window_nanos: 10_000_000_000,
            calcium_increment: 0.05,
            calcium_decay_rate: 0.1,
        }
    }
}

/// Firing-history and calcium bookkeeping, plasticity-adjusted threshold
/// excluded (that lives on `Soma`, which this controller mutates directly
/// in `tick`).
#[derive(Debug, Clone)]
pub struct HomeostaticState {
    calcium_level: f64,
    firing_history: VecDeque<Timestamp>,
}

impl HomeostaticState {
    /// Fresh state: calcium at baseline, no firing history.
    pub fn new() -> Self {
        Self {
            calcium_level: BASELINE_CALCIUM,
            firing_history: VecDeque::new(),
        }
    }

    /// Current calcium level.
    pub fn calcium_level(&self) -> f64 {
        self.calcium_level
    }

    /// Number of recorded fires currently retained.
    pub fn history_len(&self) -> usize {
        self.firing_history.len()
    }

    /// Record a fire at `now`: bumps calcium and appends to history,
    /// trimming and capping per the data-model invariants (P3, P4).
    pub fn record_fire(&mut self, now: Timestamp, params: &HomeostaticParams) {
        self.calcium_level += params.calcium_increment;

        self.firing_history.push_back(now);
        if self.firing_history.len() > FIRING_HISTORY_CAP {
            self.firing_history.pop_front();
        }
        self.trim(now, params);
    }

    fn trim(&mut self, now: Timestamp, params: &HomeostaticParams) {
        let cutoff = now.as_nanos().saturating_sub(params.activity_window_nanos);
        while let Some(front) = self.firing_history.front() {
            if front.as_nanos() < cutoff {
                self.firing_history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Firing rate over the trailing `activity_window`, in Hz.
    pub fn current_rate(&self, now: Timestamp, params: &HomeostaticParams) -> f64 {
        let cutoff = now.as_nanos().saturating_sub(params.activity_window_nanos);
        let count = self
            .firing_history
            .iter()
            .filter(|t| t.as_nanos() >= cutoff)
            .count();
        let window_seconds = params.activity_window_nanos as f64 / 1_000_000_000.0;
        count as f64 / window_seconds
    }
}

impl Default for HomeostaticState {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic homeostatic controller: on each tick, adjusts the threshold
/// toward the target firing rate (clamped into bounds) and decays calcium
/// toward baseline.
#[derive(Debug, Clone)]
pub struct HomeostaticController {
    params: HomeostaticParams,
}

impl HomeostaticController {
    /// Build a controller from validated parameters.
    pub fn new(params: HomeostaticParams) -> Self {
        Self { params }
    }

    /// Replace the parameters in effect for subsequent ticks.
    pub fn set_params(&mut self, params: HomeostaticParams) {
        self.params = params;
    }

    /// Current parameters.
    pub fn params(&self) -> &HomeostaticParams {
        &self.params
    }

    /// Run one homeostatic tick: compute the new threshold (clamped within
    /// `[min_threshold, max_threshold]`) from the current firing rate, and
    /// decay calcium toward baseline. Returns the new threshold; the caller
    /// is responsible for applying it to the soma under `state_mutex`.
    pub fn tick(
        &self,
        state: &mut HomeostaticState,
        now: Timestamp,
        current_threshold: f64,
        min_threshold: f64,
        max_threshold: f64,
    ) -> f64 {
        let current_rate = state.current_rate(now, &self.params);
        let difference = current_rate - self.params.effective_target_rate();
        let adjustment = difference * self.params.homeostasis_strength;
        let new_threshold = (current_threshold + adjustment).clamp(min_threshold, max_threshold);

        let distance = state.calcium_level - BASELINE_CALCIUM;
        state.calcium_level = BASELINE_CALCIUM + distance * (1.0 - self.params.calcium_decay_rate);

        state.trim(now, &self.params);
        new_threshold
    }
}
