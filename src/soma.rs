//! The firing/refractory state machine: maintains the membrane accumulator,
//! enforces threshold and refractory rules, and reports fire events.

use crate::error::{NeuronError, Result};
use crate::types::Timestamp;

const ACCUMULATOR_FLOOR: f64 = 1e-10;

/// Observable soma state, used for inspection (`get_firing_status`) and
/// logging; the actual control flow lives in `Soma::tick`, not in explicit
/// transitions between these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SomaState {
    /// No fire has happened yet and the accumulator is not past threshold.
    Resting,
    /// Accumulating input, not currently refractory.
    Integrating,
    /// A fire is being processed (momentary; observers never see a partial
    /// write of `last_fire_time`).
    Firing,
    /// Within `refractory_period` of the last fire.
    Refractory,
}

/// The outcome of a tick that crossed threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireEvent {
    /// `accumulator * fire_factor`, computed before the accumulator resets.
    pub output_value: f64,
    /// The timestamp at which the fire occurred.
    pub fire_time: Timestamp,
}

/// Validated, tunable soma parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SomaParams {
    /// Baseline threshold; also the reference for the homeostatic clamp
    /// bounds `[base * 0.1, base * 5.0]`.
    pub base_threshold: f64,
    /// Multiplicative decay applied to the accumulator each tick, `(0, 1)`.
    pub decay_rate: f64,
    /// Minimum inter-fire interval, in nanoseconds.
    pub refractory_period_nanos: u64,
    /// Multiplier applied to the accumulator to compute `output_value`.
    pub fire_factor: f64,
}

impl SomaParams {
    /// Construct with validation.
    pub fn new(
        base_threshold: f64,
        decay_rate: f64,
        refractory_period_nanos: u64,
        fire_factor: f64,
    ) -> Result<Self> {
        let params = Self {
            base_threshold,
            decay_rate,
            refractory_period_nanos,
            fire_factor,
        };
        params.validate()?;
        Ok(params)
    }

    /// Re-check this configuration's invariants.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_threshold > 0.0) {
            return Err(NeuronError::invalid_configuration(
                "base_threshold must be positive",
            ));
        }
        if !(self.decay_rate > 0.0 && self.decay_rate < 1.0) {
            return Err(NeuronError::invalid_configuration(
                "decay_rate must be in (0, 1)",
            ));
        }
        if !(self.fire_factor > 0.0) {
            return Err(NeuronError::invalid_configuration(
                "fire_factor must be positive",
            ));
        }
        Ok(())
    }

    /// Lower clamp bound for the threshold.
    pub fn min_threshold(&self) -> f64 {
        self.base_threshold * 0.1
    }

    /// Upper clamp bound for the threshold.
    pub fn max_threshold(&self) -> f64 {
        self.base_threshold * 5.0
    }
}

/// The membrane accumulator and firing/refractory bookkeeping for one
/// neuron. Not `Send`/`Sync` on its own; the owning `Neuron` guards it with
/// `state_mutex`.
#[derive(Debug, Clone)]
pub struct Soma {
    params: SomaParams,
    accumulator: f64,
    threshold: f64,
    last_fire_time: Option<Timestamp>,
}

impl Soma {
    /// Build a fresh soma at rest, threshold equal to `base_threshold`.
    pub fn new(params: SomaParams) -> Self {
        let threshold = params.base_threshold;
        Self {
            params,
            accumulator: 0.0,
            threshold,
            last_fire_time: None,
        }
    }

    /// Current accumulator value. Always finite (P5).
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Lower clamp bound for this soma's threshold, derived from its params.
    pub fn min_threshold(&self) -> f64 {
        self.params.min_threshold()
    }

    /// Upper clamp bound for this soma's threshold, derived from its params.
    pub fn max_threshold(&self) -> f64 {
        self.params.max_threshold()
    }

    /// Current threshold, always within `[base*0.1, base*5.0]` (P1).
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Set the threshold directly, clamped into bounds.
    pub fn set_threshold(&mut self, value: f64) {
        self.threshold = value.clamp(self.params.min_threshold(), self.params.max_threshold());
    }

    /// The timestamp of the most recent fire, if any.
    pub fn last_fire_time(&self) -> Option<Timestamp> {
        self.last_fire_time
    }

    /// `true` if `now` is still within `refractory_period` of the last fire.
    pub fn is_refractory(&self, now: Timestamp) -> bool {
        match self.last_fire_time {
            Some(t) => now.as_nanos().saturating_sub(t.as_nanos()) < self.params.refractory_period_nanos,
            None => false,
        }
    }

    /// This soma's current observable state.
    pub fn state(&self, now: Timestamp) -> SomaState {
        if self.is_refractory(now) {
            SomaState::Refractory
        } else if self.last_fire_time.is_none() && self.accumulator == 0.0 {
            SomaState::Resting
        } else {
            SomaState::Integrating
        }
    }

    /// Apply one processing tick: decay the accumulator, add `net_current`
    /// from the dendritic integrator, and fire if threshold is crossed and
    /// the neuron is not refractory.
    ///
    /// Signals arriving during refractory are still integrated (edge
    /// policy, spec §4.3) — they simply cannot trigger a fire until the
    /// refractory window elapses.
    pub fn tick(&mut self, net_current: f64, now: Timestamp) -> Option<FireEvent> {
        self.accumulator *= self.params.decay_rate;
        if self.accumulator.abs() < ACCUMULATOR_FLOOR {
            self.accumulator = 0.0;
        }

        self.accumulator += net_current;
        debug_assert!(self.accumulator.is_finite());

        if self.accumulator >= self.threshold && !self.is_refractory(now) {
            let output_value = self.accumulator * self.params.fire_factor;
            self.last_fire_time = Some(now);
            self.accumulator = 0.0;
            Some(FireEvent {
                output_value,
                fire_time: now,
            })
        } else {
            None
        }
    }
}
