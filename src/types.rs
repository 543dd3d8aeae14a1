//! Core value types shared across the neuron runtime

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier for a neuron
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NeuronId(pub u32);

impl NeuronId {
    /// Create a new neuron ID
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

/// Identifier for an individual synaptic connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SynapseId(pub u64);

impl SynapseId {
    /// Create a new synapse ID
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// A point in simulation time, expressed as nanoseconds since some epoch
/// chosen by the caller. The core never reads the wall clock itself: all
/// timestamps arrive from outside, which keeps the runtime deterministic
/// and trivially testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The zero timestamp
    pub const ZERO: Self = Self(0);

    /// Construct from nanoseconds
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    /// Construct from whole milliseconds
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms * 1_000_000)
    }

    /// Nanoseconds since the epoch
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Add a duration given in nanoseconds, saturating rather than wrapping
    pub const fn add_nanos(&self, ns: u64) -> Self {
        Self(self.0.saturating_add(ns))
    }

    /// Signed difference in nanoseconds: `self - other`
    pub fn diff_nanos(&self, other: Timestamp) -> i64 {
        self.0 as i64 - other.0 as i64
    }
}

/// Neurotransmitter kind tagged on a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LigandType {
    /// Primary excitatory neurotransmitter
    Glutamate,
    /// Primary inhibitory neurotransmitter
    GABA,
    /// Reward/modulatory signal
    Dopamine,
    /// Mood/arousal modulatory signal
    Serotonin,
    /// Attention/learning modulatory signal
    Acetylcholine,
    /// Any ligand kind not covered above
    Other(u16),
}

impl LigandType {
    /// Baseline release-concentration factor for this ligand, relative to
    /// `output_value * base_scale` (spec §6 "Chemical release concentrations")
    pub fn concentration_factor(&self) -> f64 {
        match self {
            LigandType::Glutamate => 1.0,
            LigandType::GABA => 0.8,
            LigandType::Dopamine => 0.5,
            LigandType::Serotonin | LigandType::Acetylcholine | LigandType::Other(_) => 1.0,
        }
    }
}

/// An immutable message exchanged between neurons
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NeuralSignal {
    /// Signed amplitude: positive excitatory, negative inhibitory
    pub value: f64,
    /// When the signal was emitted
    pub timestamp: Timestamp,
    /// Neuron that emitted the signal
    pub source_id: NeuronId,
    /// Neuron the signal is addressed to
    pub target_id: NeuronId,
    /// Synapse the signal traveled over
    pub synapse_id: SynapseId,
    /// Neurotransmitter kind carried by the signal
    pub ligand_type: LigandType,
}

impl NeuralSignal {
    /// Build a new signal
    pub fn new(
        value: f64,
        timestamp: Timestamp,
        source_id: NeuronId,
        target_id: NeuronId,
        synapse_id: SynapseId,
        ligand_type: LigandType,
    ) -> Self {
        Self {
            value,
            timestamp,
            source_id,
            target_id,
            synapse_id,
            ligand_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neuron_id() {
        let id = NeuronId::new(7);
        assert_eq!(id.raw(), 7);
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t0 = Timestamp::from_millis(10);
        let t1 = t0.add_nanos(5_000_000);
        assert_eq!(t1, Timestamp::from_millis(15));
        assert_eq!(t1.diff_nanos(t0), 5_000_000);
        assert_eq!(t0.diff_nanos(t1), -5_000_000);
    }

    #[test]
    fn test_ligand_concentration_factors() {
        assert_eq!(LigandType::Glutamate.concentration_factor(), 1.0);
        assert_eq!(LigandType::GABA.concentration_factor(), 0.8);
        assert_eq!(LigandType::Dopamine.concentration_factor(), 0.5);
        assert_eq!(LigandType::Serotonin.concentration_factor(), 1.0);
    }

    #[test]
    fn test_signal_construction() {
        let sig = NeuralSignal::new(
            1.5,
            Timestamp::ZERO,
            NeuronId::new(0),
            NeuronId::new(1),
            SynapseId::new(0),
            LigandType::Glutamate,
        );
        assert_eq!(sig.value, 1.5);
        assert_eq!(sig.source_id, NeuronId::new(0));
    }
}
