//! Concurrent, event-driven single-neuron runtime.
//!
//! Each [`Neuron`](neuron::Neuron) is an independently schedulable unit: its
//! own dendritic integrator, firing/refractory state machine, axonal delayed
//! delivery queue, homeostatic controller, STDP feedback, and synaptic
//! scaling, running on its own background worker thread. Wiring neurons
//! together into a network — routing, topology, batch stepping — is left to
//! whatever surrounds this crate; see the collaborator traits in
//! [`collab`].

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod axon;
pub mod collab;
pub mod dendrite;
pub mod error;
pub mod homeostasis;
pub mod neuron;
pub mod scaling;
pub mod soma;
pub mod stdp;
pub mod types;

pub use collab::{
    CustomBehaviors, ElectricalSignalKind, MatrixCallbacks, OutputCallback, PlasticityAdjustment,
    SynapseInfo, SynapseQuery,
};
pub use dendrite::{CorticalPyramidalConfig, DendriticMode};
pub use error::{FailureCounters, LifecycleError, NeuronError, Result};
pub use homeostasis::{HomeostaticController, HomeostaticParams, HomeostaticState};
pub use neuron::{FiringStatus, Neuron, NeuronConfig, OutputConnectionInfo};
pub use scaling::{ScalingController, ScalingParams, SynapticScalingState};
pub use soma::{FireEvent, Soma, SomaParams, SomaState};
pub use stdp::{STDPController, STDPParams, STDPState};
pub use types::{LigandType, NeuralSignal, NeuronId, SynapseId, Timestamp};

/// Runtime crate version for compatibility checking.
pub const RUNTIME_VERSION: u32 = 1;
