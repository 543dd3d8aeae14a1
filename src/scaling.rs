//! Synaptic scaling: a per-source receptor-gain multiplier applied to each
//! incoming signal at reception, periodically adjusted toward a target mean
//! input strength.

use std::collections::{HashMap, VecDeque};

use crate::error::{NeuronError, Result};
use crate::types::{NeuronId, Timestamp};

/// Hard bounds on any source's receptor gain (spec §3 invariant, P7).
pub const MIN_GAIN: f64 = 0.01;
/// Hard bounds on any source's receptor gain (spec §3 invariant, P7).
pub const MAX_GAIN: f64 = 10.0;

/// Consecutive same-direction adjustments after which further changes in
/// that direction are suspended until the trend reverses.
const MAX_CONSECUTIVE_TREND: u32 = 5;

/// A single-tick factor whose magnitude would move gain by more than this
/// fraction is rejected outright (emergency stop), regardless of the
/// configured `min_factor`/`max_factor` bounds.
const EMERGENCY_STOP_FACTOR_DELTA: f64 = 0.5;

/// Minimum number of recent samples required before a source is eligible
/// for a scaling adjustment on a given tick.
const MIN_SAMPLES_FOR_SCALING: usize = 5;

/// Bound on how many recent input samples are retained per source.
const MAX_SAMPLES_PER_SOURCE: usize = 64;

/// Validated, tunable synaptic-scaling parameters. Mirrors the closed
/// option set in spec §9 ("Dynamic named config").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingParams {
    /// Desired mean input strength per source.
    pub target_strength: f64,
    /// Fraction of the computed error applied per tick, `(0, 0.05]`.
    pub scaling_rate: f64,
    /// Interval between scaling ticks, in nanoseconds. `>= 1s`.
    pub interval_nanos: u64,
    /// Minimum mean sample magnitude for a source to be eligible, `[0, 1]`.
    pub min_activity: f64,
    /// Errors smaller than this are treated as noise and skipped, `[0, 1]`.
    pub significance_threshold: f64,
    /// Upper clamp on the per-tick multiplicative factor, `>= 1`.
    pub max_factor: f64,
    /// Lower clamp on the per-tick multiplicative factor, `<= 1`.
    pub min_factor: f64,
}

impl ScalingParams {
    /// Construct with validation.
    pub fn new(
        target_strength: f64,
        scaling_rate: f64,
        interval_nanos: u64,
        min_activity: f64,
        significance_threshold: f64,
        max_factor: f64,
        min_factor: f64,
    ) -> Result<Self> {
        let params = Self {
            target_strength,
            scaling_rate,
            interval_nanos,
            min_activity,
            significance_threshold,
            max_factor,
            min_factor,
        };
        params.validate()?;
        Ok(params)
    }

    /// Re-check this configuration's invariants.
    pub fn validate(&self) -> Result<()> {
        if !(self.target_strength > 0.0) {
            return Err(NeuronError::invalid_configuration(
                "target_strength must be positive",
            ));
        }
        if !(self.scaling_rate > 0.0 && self.scaling_rate <= 0.05) {
            return Err(NeuronError::invalid_configuration(
                "scaling_rate must be in (0, 0.05]",
            ));
        }
        if self.interval_nanos < 1_000_000_000 {
            return Err(NeuronError::invalid_configuration(
                "interval must be at least 1s",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_activity) {
            return Err(NeuronError::invalid_configuration(
                "min_activity must be in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.significance_threshold) {
            return Err(NeuronError::invalid_configuration(
                "significance_threshold must be in [0, 1]",
            ));
        }
        if self.max_factor < 1.0 {
            return Err(NeuronError::invalid_configuration(
                "max_factor must be >= 1",
            ));
        }
        if self.min_factor > 1.0 {
            return Err(NeuronError::invalid_configuration(
                "min_factor must be <= 1",
            ));
        }
        Ok(())
    }
}

impl Default for ScalingParams {
    fn default() -> Self {
        Self {
            target_strength: 1.0,
            scaling_rate: 0.02,
            interval_nanos: 30_000_000_000,
            min_activity: 0.1,
            significance_threshold: 0.1,
            max_factor: 1.1,
            min_factor: 0.9,
        }
    }
}

/// Trend-tracking direction, used to decide when the consecutive-change
/// safety counters should reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trend {
    Increase,
    Decrease,
}

/// Per-source bookkeeping: current gain, recent raw input samples, and the
/// consecutive-change counters used for the emergency-stop safety.
#[derive(Debug, Clone)]
struct SourceState {
    receptor_gain: f64,
    recent_input_samples: VecDeque<f64>,
    last_updated: Option<Timestamp>,
    consecutive_increase: u32,
    consecutive_decrease: u32,
}

impl SourceState {
    fn new() -> Self {
        Self {
            receptor_gain: 1.0,
            recent_input_samples: VecDeque::new(),
            last_updated: None,
            consecutive_increase: 0,
            consecutive_decrease: 0,
        }
    }

    fn record_trend(&mut self, trend: Trend) {
        match trend {
            Trend::Increase => {
                self.consecutive_increase += 1;
                self.consecutive_decrease = 0;
            }
            Trend::Decrease => {
                self.consecutive_decrease += 1;
                self.consecutive_increase = 0;
            }
        }
    }

    fn suspended_for(&self, trend: Trend) -> bool {
        match trend {
            Trend::Increase => self.consecutive_increase >= MAX_CONSECUTIVE_TREND,
            Trend::Decrease => self.consecutive_decrease >= MAX_CONSECUTIVE_TREND,
        }
    }
}

/// Per-source receptor-gain state, shared by the reception-time gain
/// application and the periodic scaling controller.
#[derive(Debug, Clone, Default)]
pub struct SynapticScalingState {
    sources: HashMap<NeuronId, SourceState>,
}

impl SynapticScalingState {
    /// Construct empty scaling state; every unknown source defaults to gain
    /// `1.0` until it has been observed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current receptor gain for `source`, `1.0` if never observed.
    pub fn gain(&self, source: NeuronId) -> f64 {
        self.sources
            .get(&source)
            .map(|s| s.receptor_gain)
            .unwrap_or(1.0)
    }

    /// Record a raw (pre-gain) input sample from `source` at `now`, bounding
    /// the retained sample history.
    pub fn record_sample(&mut self, source: NeuronId, value: f64, now: Timestamp) {
        let state = self.sources.entry(source).or_insert_with(SourceState::new);
        if state.recent_input_samples.len() >= MAX_SAMPLES_PER_SOURCE {
            state.recent_input_samples.pop_front();
        }
        state.recent_input_samples.push_back(value);
        state.last_updated = Some(now);
    }

    /// Number of sources currently tracked.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

/// Periodic synaptic-scaling controller (spec §4.7).
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalingController;

impl ScalingController {
    /// Run one scaling tick: for each source with enough recent samples and
    /// sufficient activity, nudge its gain toward `target_strength`,
    /// respecting significance, the per-tick factor bounds, the
    /// emergency-stop bound, and the consecutive-trend suspension.
    pub fn tick(&self, state: &mut SynapticScalingState, params: &ScalingParams) {
        for source_state in state.sources.values_mut() {
            if source_state.recent_input_samples.len() < MIN_SAMPLES_FOR_SCALING {
                continue;
            }

            let avg_strength: f64 = source_state.recent_input_samples.iter().sum::<f64>()
                / source_state.recent_input_samples.len() as f64;

            if avg_strength.abs() < params.min_activity {
                continue;
            }

            let error = (params.target_strength - avg_strength) / params.target_strength;
            if error.abs() < params.significance_threshold {
                continue;
            }

            let trend = if error > 0.0 {
                Trend::Increase
            } else {
                Trend::Decrease
            };
            if source_state.suspended_for(trend) {
                continue;
            }

            let factor = (1.0 + error * params.scaling_rate)
                .clamp(params.min_factor, params.max_factor);

            if (factor - 1.0).abs() > EMERGENCY_STOP_FACTOR_DELTA {
                continue;
            }

            source_state.receptor_gain =
                (source_state.receptor_gain * factor).clamp(MIN_GAIN, MAX_GAIN);
            source_state.record_trend(trend);
        }
    }
}
