//! External collaborator interfaces.
//!
//! The core never depends on a concrete network, CLI, or persistence layer.
//! `MatrixCallbacks` is a plain struct of independently optional callback
//! handles (spec §6: "any field may be null") rather than one trait with
//! five mandatory methods, so an implementor can wire up `report_health`
//! without also wiring `release_chemical`, and the neuron skips exactly the
//! missing sub-behavior — counting a `CollaboratorUnavailable` skip per
//! field — rather than the whole collaborator (spec §7). `OutputCallback`
//! remains a small trait, one instance per downstream connection.

use std::sync::Arc;

use crate::types::{LigandType, NeuralSignal, NeuronId, SynapseId, Timestamp};

/// Outcome of a query against the collaborator's synapse registry, used by
/// the STDP feedback path to find incoming synapses for this neuron.
#[derive(Debug, Clone, PartialEq)]
pub struct SynapseInfo {
    /// The synapse being described.
    pub synapse_id: SynapseId,
    /// The upstream (pre-synaptic) neuron.
    pub source_id: NeuronId,
    /// When this synapse last transmitted a signal.
    pub last_transmission_time: Timestamp,
}

/// Criteria used to query the collaborator's synapse registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynapseQuery {
    /// Only synapses whose target is this neuron.
    pub target_id: NeuronId,
}

/// A weight-change proposal emitted by the STDP subsystem. The core never
/// applies this itself — it only reports timing and lets the collaborator
/// decide how (or whether) to update the synapse weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlasticityAdjustment {
    /// Synapse the adjustment applies to.
    pub synapse_id: SynapseId,
    /// `last_transmission_time - fire_time`, in nanoseconds. Negative means
    /// pre-before-post (potentiation); positive means post-before-pre
    /// (depression).
    pub delta_t: i64,
    /// The learning rate in effect when the adjustment was computed.
    pub learning_rate: f64,
    /// The timestamp of the fire that triggered this feedback.
    pub post_fire_time: Timestamp,
}

/// The kind of electrical signal reported to the collaborator on a fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectricalSignalKind {
    /// A full action potential.
    ActionPotential,
}

/// Callbacks into the surrounding "matrix" coordinator. Every field is
/// independently optional; a missing field means that one sub-behavior is
/// silently skipped (`CollaboratorUnavailable`, spec §7), while the others
/// still fire normally. Construct with [`MatrixCallbacks::new`] (or
/// `Default::default`) and set only the fields the surrounding system
/// actually wires up.
#[derive(Clone, Default)]
pub struct MatrixCallbacks {
    /// Report this neuron's current activity level and output-connection
    /// count, typically after a fire.
    pub report_health: Option<Arc<dyn Fn(f64, usize) + Send + Sync>>,

    /// Report an electrical signal event (e.g. an action potential).
    pub send_electrical_signal: Option<Arc<dyn Fn(ElectricalSignalKind, f64) + Send + Sync>>,

    /// Report release of a neurotransmitter at the given concentration.
    pub release_chemical: Option<Arc<dyn Fn(LigandType, f64) + Send + Sync>>,

    /// List synapses matching the given query, for STDP feedback.
    pub list_synapses: Option<Arc<dyn Fn(SynapseQuery) -> Vec<SynapseInfo> + Send + Sync>>,

    /// Submit a weight-change proposal.
    pub apply_plasticity: Option<Arc<dyn Fn(PlasticityAdjustment) + Send + Sync>>,
}

impl MatrixCallbacks {
    /// Every field absent. Equivalent to `Default::default`.
    pub fn new() -> Self {
        Self::default()
    }
}

/// One per downstream connection; installed via `add_output_callback`.
pub trait OutputCallback {
    /// Deliver a signal to the downstream peer. Errors are logged and
    /// counted (`TransmitFailure`); they never retry and never affect the
    /// firing neuron's own state.
    fn transmit_message(&self, signal: &NeuralSignal) -> Result<(), String>;

    /// The identifier of the downstream target, for inspection/logging.
    fn get_target_id(&self) -> NeuronId;

    /// The synaptic weight applied to outgoing signals on this connection.
    fn get_weight(&self) -> f64;

    /// The axonal delay applied to outgoing signals on this connection.
    fn get_delay(&self) -> Timestamp;
}

/// Optional hook invoked after every fire, while no neuron lock is held.
pub trait CustomBehaviors {
    /// `release_fn` is the neuron's own chemical-release path — it forwards
    /// to the matrix collaborator's `release_chemical` when that field is
    /// present, and counts a `CollaboratorUnavailable` skip otherwise. The
    /// hook decides whether, and with what ligand/concentration, to call it.
    fn custom_chemical_release(
        &self,
        activity_rate: f64,
        output_value: f64,
        release_fn: &dyn Fn(LigandType, f64),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_matrix_callback_invocation() {
        let healths: Arc<Mutex<Vec<(f64, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&healths);
        let matrix = MatrixCallbacks {
            report_health: Some(Arc::new(move |activity, count| {
                recorded.lock().unwrap().push((activity, count));
            })),
            ..MatrixCallbacks::new()
        };

        (matrix.report_health.as_ref().unwrap())(0.5, 3);
        assert_eq!(healths.lock().unwrap().as_slice(), &[(0.5, 3)]);
    }

    #[test]
    fn test_fields_independently_optional() {
        let matrix = MatrixCallbacks {
            release_chemical: Some(Arc::new(|_ligand, _concentration| {})),
            ..MatrixCallbacks::new()
        };

        assert!(matrix.release_chemical.is_some());
        assert!(matrix.report_health.is_none());
        assert!(matrix.send_electrical_signal.is_none());
        assert!(matrix.list_synapses.is_none());
        assert!(matrix.apply_plasticity.is_none());
    }

    #[test]
    fn test_custom_chemical_release_forwards_via_release_fn() {
        struct DoublingHook;
        impl CustomBehaviors for DoublingHook {
            fn custom_chemical_release(
                &self,
                activity_rate: f64,
                output_value: f64,
                release_fn: &dyn Fn(LigandType, f64),
            ) {
                release_fn(LigandType::Dopamine, activity_rate * output_value);
            }
        }

        let released: Arc<Mutex<Vec<(LigandType, f64)>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&released);
        let hook = DoublingHook;
        let release_fn = move |ligand: LigandType, concentration: f64| {
            recorded.lock().unwrap().push((ligand, concentration));
        };
        hook.custom_chemical_release(2.0, 3.0, &release_fn);

        let log = released.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, LigandType::Dopamine);
        assert!((log[0].1 - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_plasticity_adjustment_sign_convention() {
        // last_transmission_time before fire_time -> negative delta_t -> potentiation
        let adj = PlasticityAdjustment {
            synapse_id: SynapseId::new(1),
            delta_t: -5_000_000,
            learning_rate: 0.1,
            post_fire_time: Timestamp::from_millis(10),
        };
        assert!(adj.delta_t < 0);
    }
}
