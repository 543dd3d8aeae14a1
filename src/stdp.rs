//! Spike-timing-dependent plasticity (STDP) feedback.
//!
//! On a fire, if STDP is enabled, a feedback task is scheduled for
//! `now + feedback_delay`. When it becomes due, the neuron queries the
//! collaborator for incoming synapses and reports a timing-based
//! [`PlasticityAdjustment`] for each — it never mutates a weight itself.

use std::collections::VecDeque;

use crate::collab::{PlasticityAdjustment, SynapseInfo};
use crate::error::{NeuronError, Result};
use crate::types::Timestamp;

/// Validated, tunable STDP parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct STDPParams {
    /// Delay, in nanoseconds, between a fire and its feedback task.
    pub feedback_delay_nanos: u64,
    /// Learning rate reported alongside each adjustment.
    pub learning_rate: f64,
}

impl STDPParams {
    /// Construct with validation.
    pub fn new(feedback_delay_nanos: u64, learning_rate: f64) -> Result<Self> {
        let params = Self {
            feedback_delay_nanos,
            learning_rate,
        };
        params.validate()?;
        Ok(params)
    }

    /// Re-check this configuration's invariants.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) {
            return Err(NeuronError::invalid_configuration(
                "learning_rate must be positive",
            ));
        }
        Ok(())
    }
}

/// A scheduled-but-not-yet-due feedback task.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingFeedback {
    scheduled_time: Timestamp,
    fire_time: Timestamp,
    learning_rate: f64,
}

/// Whether STDP is enabled, its current parameters, and pending feedback
/// tasks awaiting their scheduled time.
#[derive(Debug, Clone)]
pub struct STDPState {
    enabled: bool,
    params: STDPParams,
    pending: VecDeque<PendingFeedback>,
}

impl STDPState {
    /// Construct in the disabled state with the given default parameters.
    pub fn new(params: STDPParams) -> Self {
        Self {
            enabled: false,
            params,
            pending: VecDeque::new(),
        }
    }

    /// Whether STDP feedback is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable STDP with the given parameters; the next feedback uses these
    /// values even if fires were already scheduled under old parameters.
    pub fn enable(&mut self, params: STDPParams) {
        self.enabled = true;
        self.params = params;
    }

    /// Disable STDP and silently drop any pending feedback tasks.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.pending.clear();
    }

    /// Current parameters, regardless of enabled state.
    pub fn params(&self) -> STDPParams {
        self.params
    }

    /// Number of feedback tasks awaiting their scheduled time.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Stateless scheduling/computation logic operating on an [`STDPState`].
#[derive(Debug, Default, Clone, Copy)]
pub struct STDPController;

impl STDPController {
    /// Schedule a feedback task for a fire at `fire_time`, if STDP is
    /// enabled. No-op if disabled.
    pub fn schedule_feedback(&self, state: &mut STDPState, fire_time: Timestamp) {
        if !state.enabled {
            return;
        }
        let scheduled_time = fire_time.add_nanos(state.params.feedback_delay_nanos);
        state.pending.push_back(PendingFeedback {
            scheduled_time,
            fire_time,
            learning_rate: state.params.learning_rate,
        });
    }

    /// Pop every feedback task due at or before `now` and, for each,
    /// compute one [`PlasticityAdjustment`] per synapse returned by
    /// `synapses`. `synapses` should already be filtered to incoming
    /// synapses targeting this neuron.
    pub fn due_adjustments(
        &self,
        state: &mut STDPState,
        now: Timestamp,
        synapses: &[SynapseInfo],
    ) -> Vec<PlasticityAdjustment> {
        let mut adjustments = Vec::new();
        while let Some(front) = state.pending.front() {
            if front.scheduled_time > now {
                break;
            }
            let task = state.pending.pop_front().expect("front exists");
            for synapse in synapses {
                let delta_t = synapse.last_transmission_time.diff_nanos(task.fire_time);
                adjustments.push(PlasticityAdjustment {
                    synapse_id: synapse.synapse_id,
                    delta_t,
                    learning_rate: task.learning_rate,
                    post_fire_time: task.fire_time,
                });
            }
        }
        adjustments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NeuronId, SynapseId};

    fn synapse(id: u64, last_transmission: Timestamp) -> SynapseInfo {
        SynapseInfo {
            synapse_id: SynapseId::new(id),
            source_id: NeuronId::new(0),
            last_transmission_time: last_transmission,
        }
    }

    #[test]
    fn test_params_validation() {
        assert!(STDPParams::new(20_000_000, 0.1).is_ok());
        assert!(STDPParams::new(20_000_000, 0.0).is_err());
    }

    #[test]
    fn test_disable_cancels_pending_silently() {
        let mut state = STDPState::new(STDPParams::new(20_000_000, 0.1).unwrap());
        let controller = STDPController;
        state.enable(state.params());
        controller.schedule_feedback(&mut state, Timestamp::ZERO);
        assert_eq!(state.pending_len(), 1);
        state.disable();
        assert_eq!(state.pending_len(), 0);

        let adjustments = controller.due_adjustments(&mut state, Timestamp::from_millis(100), &[]);
        assert!(adjustments.is_empty());
    }

    #[test]
    fn test_sign_convention_s5_potentiation() {
        // last_transmission_time = fire_time - 5ms -> negative delta_t -> LTP
        let mut state = STDPState::new(STDPParams::new(20_000_000, 0.1).unwrap());
        state.enable(state.params());
        let controller = STDPController;
        let fire_time = Timestamp::from_millis(100);
        controller.schedule_feedback(&mut state, fire_time);

        let due_time = fire_time.add_nanos(20_000_000);
        // last_transmission = fire_time - 5ms
        let last_transmission = Timestamp::from_nanos(fire_time.as_nanos() - 5_000_000);
        let synapses = vec![synapse(1, last_transmission)];

        let adjustments = controller.due_adjustments(&mut state, due_time, &synapses);
        assert_eq!(adjustments.len(), 1);
        assert!(adjustments[0].delta_t < 0);
    }

    #[test]
    fn test_sign_convention_s5_depression() {
        let mut state = STDPState::new(STDPParams::new(20_000_000, 0.1).unwrap());
        state.enable(state.params());
        let controller = STDPController;
        let fire_time = Timestamp::from_millis(100);
        controller.schedule_feedback(&mut state, fire_time);

        let due_time = fire_time.add_nanos(20_000_000);
        // last_transmission = fire_time + 5ms -> positive delta_t -> LTD
        let last_transmission = fire_time.add_nanos(5_000_000);
        let synapses = vec![synapse(1, last_transmission)];

        let adjustments = controller.due_adjustments(&mut state, due_time, &synapses);
        assert_eq!(adjustments.len(), 1);
        assert!(adjustments[0].delta_t > 0);
    }

    #[test]
    fn test_feedback_not_due_before_delay_elapses() {
        let mut state = STDPState::new(STDPParams::new(20_000_000, 0.1).unwrap());
        state.enable(state.params());
        let controller = STDPController;
        let fire_time = Timestamp::from_millis(100);
        controller.schedule_feedback(&mut state, fire_time);

        let too_early = fire_time.add_nanos(10_000_000);
        let adjustments = controller.due_adjustments(&mut state, too_early, &[synapse(1, fire_time)]);
        assert!(adjustments.is_empty());
        assert_eq!(state.pending_len(), 1);
    }
}
