//! Error kinds surfaced by the neuron's public API, plus the internal
//! failure counters for error kinds that are counted rather than returned.

use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Result type for neuron operations.
pub type Result<T> = std::result::Result<T, NeuronError>;

/// Errors returned from the neuron's configuration and lifecycle APIs.
///
/// Only two kinds ever reach a caller as a `Result::Err`. Queue overflow,
/// transmit failure, and collaborator-unavailable are never surfaced this
/// way — they are counted in [`FailureCounters`] and reported through
/// `get_firing_status()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NeuronError {
    /// A configuration API was called with invalid parameters.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Human-readable explanation of what failed validation.
        reason: String,
    },

    /// A lifecycle method was called in a state that does not permit it.
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

impl NeuronError {
    /// Build an `InvalidConfiguration` error.
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

/// Lifecycle-specific error kinds.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    /// `start()` was called while the neuron was already running with an
    /// incompatible configuration.
    #[error("neuron is already running")]
    AlreadyRunning,

    /// An operation that requires a running neuron (e.g. `receive`) was
    /// called after `stop()`.
    #[error("neuron is stopped")]
    Stopped,
}

/// Atomic counters for the error kinds the spec requires to be "counted,
/// not surfaced": queue overflow, dropped axonal deliveries, transmit
/// failures, and collaborator-unavailable skips.
///
/// These never produce a `NeuronError`; they accumulate for the lifetime
/// of the neuron and are read out through `get_firing_status()`.
#[derive(Debug, Default)]
pub struct FailureCounters {
    queue_overflow_count: AtomicU64,
    dropped_delivery_count: AtomicU64,
    transmit_failure_count: AtomicU64,
    collaborator_skip_count: AtomicU64,
}

impl FailureCounters {
    /// Create a fresh, zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an inbound signal was dropped because the receive queue
    /// was full.
    pub fn record_queue_overflow(&self) {
        self.queue_overflow_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that an outstanding scheduled delivery was dropped because
    /// the axonal delivery queue was full.
    pub fn record_dropped_delivery(&self) {
        self.dropped_delivery_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that an output callback's `transmit` failed or panicked.
    pub fn record_transmit_failure(&self) {
        self.transmit_failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a sub-behavior was skipped because the collaborator
    /// field needed for it was absent (null).
    pub fn record_collaborator_skip(&self) {
        self.collaborator_skip_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Current queue-overflow count.
    pub fn queue_overflow_count(&self) -> u64 {
        self.queue_overflow_count.load(Ordering::Relaxed)
    }

    /// Current dropped-delivery count.
    pub fn dropped_delivery_count(&self) -> u64 {
        self.dropped_delivery_count.load(Ordering::Relaxed)
    }

    /// Current transmit-failure count.
    pub fn transmit_failure_count(&self) -> u64 {
        self.transmit_failure_count.load(Ordering::Relaxed)
    }

    /// Current collaborator-skip count.
    pub fn collaborator_skip_count(&self) -> u64 {
        self.collaborator_skip_count.load(Ordering::Relaxed)
    }
}
