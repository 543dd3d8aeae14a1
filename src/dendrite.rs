//! Dendritic integration: transforms the raw incoming signal stream into a
//! net current delivered to the soma on each processing tick.
//!
//! Integration is a capability behind a two-operation interface rather than
//! a class hierarchy: every mode implements `handle` (called on each
//! arrival) and `process` (called once per tick). New modes are added by
//! extending the closed `DendriticMode` variant set, not by subclassing.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::error::{NeuronError, Result};
use crate::types::{LigandType, Timestamp};

/// Clamp applied to every raw input before integration so a pathological
/// upstream value (the spec calls out `|v|` up to `1e3`) cannot push any
/// accumulator toward overflow.
const INPUT_CLAMP: f64 = 1.0e4;

fn clamp_input(value: f64) -> f64 {
    value.clamp(-INPUT_CLAMP, INPUT_CLAMP)
}

/// Two-operation interface every dendritic integration mode implements.
pub trait DendriticIntegrator {
    /// Called on each signal arrival; may buffer the value for later
    /// processing rather than folding it in immediately.
    fn handle(&mut self, value: f64, timestamp: Timestamp, ligand: LigandType);

    /// Called once per processing tick; returns the net current to add to
    /// the soma's accumulator and clears whatever state was consumed.
    fn process(&mut self, now: Timestamp) -> f64;
}

/// Adds each signal straight to a pending sum; the simplest mode.
#[derive(Debug, Clone, Default)]
pub struct PassiveMembrane {
    pending_sum: f64,
}

impl DendriticIntegrator for PassiveMembrane {
    fn handle(&mut self, value: f64, _timestamp: Timestamp, _ligand: LigandType) {
        self.pending_sum += clamp_input(value);
    }

    fn process(&mut self, _now: Timestamp) -> f64 {
        let out = self.pending_sum;
        self.pending_sum = 0.0;
        out
    }
}

/// Buffers timestamped signals and sums only the ones within a trailing
/// active window at process time.
#[derive(Debug, Clone)]
pub struct TemporalSummation {
    window_nanos: u64,
    buffer: VecDeque<(Timestamp, f64)>,
    capacity: usize,
}

impl TemporalSummation {
    /// `window_nanos` is the active summation window; `capacity` bounds the
    /// buffer so a runaway sender cannot grow it unboundedly.
    pub fn new(window_nanos: u64, capacity: usize) -> Self {
        Self {
            window_nanos,
            buffer: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }
}

impl DendriticIntegrator for TemporalSummation {
    fn handle(&mut self, value: f64, timestamp: Timestamp, _ligand: LigandType) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back((timestamp, clamp_input(value)));
    }

    fn process(&mut self, now: Timestamp) -> f64 {
        let cutoff = now.as_nanos().saturating_sub(self.window_nanos);
        let sum: f64 = self
            .buffer
            .iter()
            .filter(|(ts, _)| ts.as_nanos() >= cutoff)
            .map(|(_, v)| v)
            .sum();
        self.buffer.clear();
        sum
    }
}

/// Separates excitatory and inhibitory input and applies a shunting
/// (divisive) combination: `E / (1 + k * I)`.
#[derive(Debug, Clone)]
pub struct ShuntingInhibition {
    k: f64,
    excitatory: f64,
    inhibitory: f64,
}

impl ShuntingInhibition {
    /// `k` is the shunting constant, expected in `(0, 1]`.
    pub fn new(k: f64) -> Result<Self> {
        if !(k > 0.0 && k <= 1.0) {
            return Err(NeuronError::invalid_configuration(
                "shunting constant k must be in (0, 1]",
            ));
        }
        Ok(Self {
            k,
            excitatory: 0.0,
            inhibitory: 0.0,
        })
    }
}

impl DendriticIntegrator for ShuntingInhibition {
    fn handle(&mut self, value: f64, _timestamp: Timestamp, ligand: LigandType) {
        let value = clamp_input(value);
        let is_inhibitory = value < 0.0 || matches!(ligand, LigandType::GABA);
        if is_inhibitory {
            self.inhibitory += value.abs();
        } else {
            self.excitatory += value;
        }
    }

    fn process(&mut self, _now: Timestamp) -> f64 {
        let out = self.excitatory / (1.0 + self.k * self.inhibitory);
        self.excitatory = 0.0;
        self.inhibitory = 0.0;
        out
    }
}

/// Buffers signals within a window, applies a nonlinear boost once the
/// windowed sum exceeds a local threshold, and optionally adds membrane
/// noise — modeling a simplified active dendritic compartment.
#[derive(Debug, Clone)]
pub struct ActiveDendrite {
    window_nanos: u64,
    buffer: VecDeque<(Timestamp, f64)>,
    capacity: usize,
    local_threshold: f64,
    boost_factor: f64,
    noise_amplitude: f64,
    rng_seed: u64,
}

impl ActiveDendrite {
    /// Construct from a biological preset plus window/capacity.
    pub fn new(
        config: &CorticalPyramidalConfig,
        window_nanos: u64,
        capacity: usize,
        local_threshold: f64,
        boost_factor: f64,
        rng_seed: u64,
    ) -> Self {
        Self {
            window_nanos,
            buffer: VecDeque::with_capacity(capacity.min(256)),
            capacity,
            local_threshold,
            boost_factor,
            noise_amplitude: config.membrane_noise_amplitude,
            rng_seed,
        }
    }
}

impl DendriticIntegrator for ActiveDendrite {
    fn handle(&mut self, value: f64, timestamp: Timestamp, _ligand: LigandType) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back((timestamp, clamp_input(value)));
    }

    fn process(&mut self, now: Timestamp) -> f64 {
        let cutoff = now.as_nanos().saturating_sub(self.window_nanos);
        let windowed_sum: f64 = self
            .buffer
            .iter()
            .filter(|(ts, _)| ts.as_nanos() >= cutoff)
            .map(|(_, v)| v)
            .sum();
        self.buffer.clear();

        let mut out = if windowed_sum.abs() > self.local_threshold {
            windowed_sum * self.boost_factor
        } else {
            windowed_sum
        };

        if self.noise_amplitude > 0.0 {
            // Deterministic per-tick seed derived from the timestamp keeps
            // the integrator reproducible for a given input sequence.
            let mut rng = rand::rngs::StdRng::seed_from_u64(self.rng_seed ^ now.as_nanos());
            let dist = Normal::new(0.0, self.noise_amplitude).expect("finite noise amplitude");
            out += dist.sample(&mut rng);
        }

        clamp_input(out)
    }
}

/// Biological preset controlling temporal window, membrane noise, jitter,
/// and spatial decay for the Active Dendrite (and, where relevant,
/// Temporal Summation) modes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorticalPyramidalConfig {
    /// Integration window, typically 5-20 ms.
    pub temporal_window_ms: f64,
    /// Amplitude of additive membrane noise.
    pub membrane_noise_amplitude: f64,
    /// Temporal jitter applied to arrival timestamps, in ms.
    pub temporal_jitter_ms: f64,
    /// Multiplicative decay applied across dendritic distance.
    pub spatial_decay_factor: f64,
}

impl Default for CorticalPyramidalConfig {
    fn default() -> Self {
        Self {
            temporal_window_ms: 10.0,
            membrane_noise_amplitude: 0.01,
            temporal_jitter_ms: 1.0,
            spatial_decay_factor: 0.9,
        }
    }
}

impl CorticalPyramidalConfig {
    /// Construct with validation.
    pub fn new(
        temporal_window_ms: f64,
        membrane_noise_amplitude: f64,
        temporal_jitter_ms: f64,
        spatial_decay_factor: f64,
    ) -> Result<Self> {
        let config = Self {
            temporal_window_ms,
            membrane_noise_amplitude,
            temporal_jitter_ms,
            spatial_decay_factor,
        };
        config.validate()?;
        Ok(config)
    }

    /// Re-check this configuration's invariants.
    pub fn validate(&self) -> Result<()> {
        if !(self.temporal_window_ms >= 5.0 && self.temporal_window_ms <= 20.0) {
            return Err(NeuronError::invalid_configuration(
                "temporal_window_ms must be in [5, 20]",
            ));
        }
        if self.membrane_noise_amplitude < 0.0 {
            return Err(NeuronError::invalid_configuration(
                "membrane_noise_amplitude must be non-negative",
            ));
        }
        if self.temporal_jitter_ms < 0.0 {
            return Err(NeuronError::invalid_configuration(
                "temporal_jitter_ms must be non-negative",
            ));
        }
        if !(self.spatial_decay_factor > 0.0 && self.spatial_decay_factor <= 1.0) {
            return Err(NeuronError::invalid_configuration(
                "spatial_decay_factor must be in (0, 1]",
            ));
        }
        Ok(())
    }

    /// The temporal window expressed in nanoseconds.
    pub fn window_nanos(&self) -> u64 {
        (self.temporal_window_ms * 1_000_000.0) as u64
    }
}

/// Closed set of dendritic integration modes. Dispatch is a match, not a
/// trait object, since the variant set is fixed by design (spec §9).
#[derive(Debug, Clone)]
pub enum DendriticMode {
    /// Immediate-sum passive membrane.
    Passive(PassiveMembrane),
    /// Windowed temporal summation.
    TemporalSummation(TemporalSummation),
    /// Divisive excitatory/inhibitory combination.
    ShuntingInhibition(ShuntingInhibition),
    /// Nonlinear boosted active dendrite with optional noise.
    ActiveDendrite(ActiveDendrite),
}

impl DendriticMode {
    /// Build the Passive Membrane mode.
    pub fn passive() -> Self {
        Self::Passive(PassiveMembrane::default())
    }

    /// Build the Temporal Summation mode from a biological preset.
    pub fn temporal_summation(config: &CorticalPyramidalConfig, capacity: usize) -> Self {
        Self::TemporalSummation(TemporalSummation::new(config.window_nanos(), capacity))
    }

    /// Build the Shunting Inhibition mode.
    pub fn shunting_inhibition(k: f64) -> Result<Self> {
        Ok(Self::ShuntingInhibition(ShuntingInhibition::new(k)?))
    }

    /// Build the Active Dendrite mode from a biological preset.
    pub fn active_dendrite(
        config: &CorticalPyramidalConfig,
        capacity: usize,
        local_threshold: f64,
        boost_factor: f64,
        rng_seed: u64,
    ) -> Self {
        Self::ActiveDendrite(ActiveDendrite::new(
            config,
            config.window_nanos(),
            capacity,
            local_threshold,
            boost_factor,
            rng_seed,
        ))
    }
}

impl DendriticIntegrator for DendriticMode {
    fn handle(&mut self, value: f64, timestamp: Timestamp, ligand: LigandType) {
        match self {
            Self::Passive(m) => m.handle(value, timestamp, ligand),
            Self::TemporalSummation(m) => m.handle(value, timestamp, ligand),
            Self::ShuntingInhibition(m) => m.handle(value, timestamp, ligand),
            Self::ActiveDendrite(m) => m.handle(value, timestamp, ligand),
        }
    }

    fn process(&mut self, now: Timestamp) -> f64 {
        match self {
            Self::Passive(m) => m.process(now),
            Self::TemporalSummation(m) => m.process(now),
            Self::ShuntingInhibition(m) => m.process(now),
            Self::ActiveDendrite(m) => m.process(now),
        }
    }
}
