//! The `Neuron` actor: the public contract from spec §4.1, wiring the
//! dendritic integrator, soma, axonal delivery, homeostatic controller,
//! STDP feedback, and synaptic scaling into one owning unit with a private
//! background worker thread.
//!
//! Every signal that arrives through [`Neuron::receive`] is processed on the
//! neuron's own background thread: each wakeup drains whatever has queued up
//! into one processing tick, using the batch's latest timestamp as "now" —
//! the core never reads the wall clock to decide what a fire means. Real
//! wall-clock time only paces the worker's idle heartbeat, which keeps
//! scheduled axonal deliveries and periodic controllers progressing when no
//! new signal has arrived recently.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use crate::axon::AxonalDelivery;
use crate::collab::{
    CustomBehaviors, ElectricalSignalKind, MatrixCallbacks, OutputCallback, SynapseQuery,
};
use crate::dendrite::DendriticIntegrator;
pub use crate::dendrite::{CorticalPyramidalConfig, DendriticMode};
use crate::error::{FailureCounters, LifecycleError, NeuronError, Result};
use crate::homeostasis::{HomeostaticController, HomeostaticParams, HomeostaticState};
use crate::scaling::{ScalingController, ScalingParams, SynapticScalingState};
use crate::soma::{Soma, SomaParams};
use crate::stdp::{STDPController, STDPParams, STDPState};
use crate::types::{LigandType, NeuralSignal, NeuronId, SynapseId, Timestamp};

/// Capacity of the bounded inbound-signal queue (spec §4.1 back-pressure
/// policy: bounded, drop-newest-on-overflow, never block the caller).
const DEFAULT_INBOX_CAPACITY: usize = 4096;
/// Bound on the axonal delivery queue (spec §4.4).
const DEFAULT_AXON_CAPACITY: usize = 4096;
/// Cadence of the background worker's idle heartbeat: how often it wakes in
/// the absence of new signals to keep scheduled deliveries and periodic
/// controllers progressing.
const HEARTBEAT_PERIOD: Duration = Duration::from_millis(1);
/// Default homeostatic tick cadence (spec §4.5).
const DEFAULT_HOMEOSTATIC_TICK_NANOS: u64 = 10_000_000_000;
/// Default STDP feedback delay and learning rate, in effect until
/// `enable_stdp_feedback` is called.
const DEFAULT_STDP_FEEDBACK_DELAY_NANOS: u64 = 20_000_000;
const DEFAULT_STDP_LEARNING_RATE: f64 = 0.01;
/// Floor applied to a connection's configured delay (spec §4.4
/// "`max(c.delay, default_delay)`").
const DEFAULT_CONNECTION_DELAY_NANOS: u64 = 1_000_000;
/// Base scale applied to `output_value` to obtain a chemical release
/// concentration (spec §6).
const CHEMICAL_BASE_SCALE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Lifecycle {
    Idle = 0,
    Running = 1,
    Stopped = 2,
}

/// Bundled, validated construction parameters for a [`Neuron`]. Mirrors the
/// teacher's `LIFParams`/`STDPParams` validated-params idiom, generalized to
/// cover every subsystem a neuron owns.
#[derive(Debug, Clone, Copy)]
pub struct NeuronConfig {
    /// Soma/firing-state-machine parameters.
    pub soma: SomaParams,
    /// Homeostatic controller parameters.
    pub homeostatic: HomeostaticParams,
    /// Cadence between homeostatic ticks, in nanoseconds.
    pub homeostatic_tick_interval_nanos: u64,
    /// Initial STDP parameters (feedback starts disabled regardless).
    pub stdp: STDPParams,
    /// Capacity of the bounded inbound-signal queue.
    pub inbox_capacity: usize,
    /// Capacity of the axonal delivery queue.
    pub axon_capacity: usize,
}

impl NeuronConfig {
    /// Build a config from the spec's primary seven constructor parameters,
    /// filling in the remaining ambient defaults.
    pub fn new(
        threshold: f64,
        decay_rate: f64,
        refractory: Duration,
        fire_factor: f64,
        target_rate: f64,
        homeostasis_strength: f64,
    ) -> Result<Self> {
        let soma = SomaParams::new(
            threshold,
            decay_rate,
            refractory.as_nanos() as u64,
            fire_factor,
        )?;
        let homeostatic = HomeostaticParams::new(
            target_rate,
            homeostasis_strength,
            DEFAULT_HOMEOSTATIC_TICK_NANOS,
            0.05,
            0.1,
        )?;
        let stdp = STDPParams::new(DEFAULT_STDP_FEEDBACK_DELAY_NANOS, DEFAULT_STDP_LEARNING_RATE)?;
        Ok(Self {
            soma,
            homeostatic,
            homeostatic_tick_interval_nanos: DEFAULT_HOMEOSTATIC_TICK_NANOS,
            stdp,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            axon_capacity: DEFAULT_AXON_CAPACITY,
        })
    }
}

/// Typed snapshot of a neuron's observable state (spec §9 Design Notes:
/// "no dynamic-typed status map... expose a typed record").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiringStatus {
    /// Firing rate over the trailing activity window, in Hz.
    pub activity_level: f64,
    /// Current firing threshold.
    pub threshold: f64,
    /// Current calcium level.
    pub calcium: f64,
    /// Whether the neuron is currently within its refractory period.
    pub in_refractory: bool,
    /// Number of fires currently retained in the firing history.
    pub history_len: usize,
    /// Number of pending axonal deliveries.
    pub queue_depth: usize,
    /// Inbound signals dropped because the receive queue was full.
    pub queue_overflow_count: u64,
    /// Scheduled axonal deliveries dropped because the delivery queue was full.
    pub dropped_delivery_count: u64,
    /// Output-callback transmit failures, including panics.
    pub transmit_failure_count: u64,
    /// Sub-behaviors skipped because the needed collaborator field was absent.
    pub collaborator_skip_count: u64,
}

/// Typed snapshot of one output connection, for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConnectionInfo {
    /// Downstream neuron this connection delivers to.
    pub target_id: NeuronId,
    /// Synaptic weight applied to outgoing signals on this connection,
    /// represented as fixed-point-free `f64` bits since weights are `f64`
    /// in the wire model; compared bit-for-bit here only for test
    /// convenience (equality on inspected snapshots, not live weights).
    pub weight_bits: u64,
    /// Axonal delay applied to outgoing signals on this connection.
    pub delay_nanos: u64,
}

impl OutputConnectionInfo {
    /// The synaptic weight as a float.
    pub fn weight(&self) -> f64 {
        f64::from_bits(self.weight_bits)
    }
}

/// Configuration scalars and processing state guarded by `state_mutex`:
/// the soma's accumulator/threshold/refractory bookkeeping, the dendritic
/// integration mode, and the released-ligand list (spec §9 Open Question:
/// treated as mutable configuration, not lock-free "immutable after
/// setup").
struct StateBlock {
    soma: Soma,
    dendrite: DendriticMode,
    /// Almost always one or two ligand kinds, so this stays on the stack.
    released_ligands: SmallVec<[LigandType; 4]>,
}

/// Firing history and calcium, guarded by `activity_mutex`, plus the
/// homeostatic controller's own parameters and tick bookkeeping (kept
/// alongside since they are only ever touched together).
struct ActivityBlock {
    homeostatic_state: HomeostaticState,
    homeostatic_params: HomeostaticParams,
    homeostatic_tick_interval_nanos: u64,
    last_homeostatic_tick: Option<Timestamp>,
}

/// Synaptic scaling state and parameters; `None` while scaling is disabled.
struct ScalingBlock {
    state: SynapticScalingState,
    params: ScalingParams,
    last_tick: Option<Timestamp>,
}

type OutputsMap = HashMap<SynapseId, Arc<dyn OutputCallback + Send + Sync>>;

/// Shared state referenced by both the `Neuron` handle and its background
/// worker thread. Locks are always acquired in the order `state` →
/// `activity` → `outputs`, per spec §5; `axon`, `stdp`, and `scaling` sit
/// outside that ordering requirement and are never held concurrently with
/// more than one of the other locks at a time.
struct Inner {
    id: NeuronId,
    lifecycle: AtomicU8,
    state: Mutex<StateBlock>,
    activity: Mutex<ActivityBlock>,
    outputs: RwLock<OutputsMap>,
    axon: Mutex<AxonalDelivery>,
    stdp: Mutex<STDPState>,
    scaling: Mutex<Option<ScalingBlock>>,
    matrix_callbacks: RwLock<Option<MatrixCallbacks>>,
    custom_behaviors: RwLock<Option<Arc<dyn CustomBehaviors + Send + Sync>>>,
    inbox_tx: Sender<NeuralSignal>,
    inbox_rx: Receiver<NeuralSignal>,
    shutdown: AtomicBool,
    counters: FailureCounters,
    /// Monotonic logical clock: the latest timestamp seen on any processed
    /// signal, advanced by the idle heartbeat when nothing new arrives.
    logical_now: AtomicU64,
}

/// An independently scheduled spiking-neuron runtime unit: owns its
/// dendritic integration, firing state machine, axonal delivery, and
/// plasticity subsystems, and exposes a small synchronous API over them.
pub struct Neuron {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Neuron {
    /// Construct a neuron from the spec's primary seven parameters. Enters
    /// the `Idle` state; call [`Neuron::start`] to begin processing.
    pub fn new(
        id: NeuronId,
        threshold: f64,
        decay_rate: f64,
        refractory: Duration,
        fire_factor: f64,
        target_rate: f64,
        homeostasis_strength: f64,
    ) -> Result<Self> {
        let config = NeuronConfig::new(
            threshold,
            decay_rate,
            refractory,
            fire_factor,
            target_rate,
            homeostasis_strength,
        )?;
        Self::with_config(id, config)
    }

    /// Construct a neuron from a fully assembled, pre-validated
    /// [`NeuronConfig`].
    pub fn with_config(id: NeuronId, config: NeuronConfig) -> Result<Self> {
        config.soma.validate()?;
        config.homeostatic.validate()?;
        config.stdp.validate()?;

        let (inbox_tx, inbox_rx) = bounded(config.inbox_capacity);
        let inner = Arc::new(Inner {
            id,
            lifecycle: AtomicU8::new(Lifecycle::Idle as u8),
            state: Mutex::new(StateBlock {
                soma: Soma::new(config.soma),
                dendrite: DendriticMode::passive(),
                released_ligands: SmallVec::new(),
            }),
            activity: Mutex::new(ActivityBlock {
                homeostatic_state: HomeostaticState::new(),
                homeostatic_params: config.homeostatic,
                homeostatic_tick_interval_nanos: config.homeostatic_tick_interval_nanos,
                last_homeostatic_tick: None,
            }),
            outputs: RwLock::new(HashMap::new()),
            axon: Mutex::new(AxonalDelivery::new(config.axon_capacity)),
            stdp: Mutex::new(STDPState::new(config.stdp)),
            scaling: Mutex::new(None),
            matrix_callbacks: RwLock::new(None),
            custom_behaviors: RwLock::new(None),
            inbox_tx,
            inbox_rx,
            shutdown: AtomicBool::new(false),
            counters: FailureCounters::new(),
            logical_now: AtomicU64::new(0),
        });
        Ok(Self {
            inner,
            worker: Mutex::new(None),
        })
    }

    /// This neuron's identifier.
    pub fn id(&self) -> NeuronId {
        self.inner.id
    }

    // ---- Lifecycle ----------------------------------------------------

    /// Start the background worker. Idempotent in the sense that calling
    /// it while already `Running` does not corrupt state, but it is
    /// reported as [`LifecycleError::AlreadyRunning`] rather than silently
    /// accepted, since a second `start()` cannot apply a new configuration
    /// to an already-running worker.
    pub fn start(&self) -> Result<()> {
        let current = self.inner.lifecycle.load(Ordering::Acquire);
        if current == Lifecycle::Running as u8 {
            return Err(NeuronError::Lifecycle(LifecycleError::AlreadyRunning));
        }
        self.inner.lifecycle.store(Lifecycle::Running as u8, Ordering::Release);
        self.inner.shutdown.store(false, Ordering::Release);

        let mut worker = self.worker.lock();
        let inner = Arc::clone(&self.inner);
        *worker = Some(std::thread::spawn(move || run_worker(inner)));
        info!("neuron {:?} started", self.inner.id);
        Ok(())
    }

    /// Stop the background worker. Idempotent: stopping an already-stopped
    /// (or never-started) neuron is a harmless no-op. After this returns,
    /// `receive` discards signals and reports [`LifecycleError::Stopped`].
    pub fn stop(&self) -> Result<()> {
        let previous = self.inner.lifecycle.swap(Lifecycle::Stopped as u8, Ordering::AcqRel);
        if previous != Lifecycle::Running as u8 {
            return Ok(());
        }
        self.inner.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().take() {
            // The worker polls `shutdown` every `HEARTBEAT_PERIOD`, which
            // bounds how long this join can take.
            let _ = handle.join();
        }
        info!("neuron {:?} stopped", self.inner.id);
        Ok(())
    }

    /// `true` if the background worker is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.lifecycle.load(Ordering::Acquire) == Lifecycle::Running as u8
    }

    // ---- Signal reception ----------------------------------------------

    /// Non-blocking enqueue of an incoming signal. On queue overflow, the
    /// newest signal (this one) is dropped and a counter is recorded; the
    /// caller is never blocked. After `stop()`, returns a `Stopped` error
    /// and discards the signal.
    pub fn receive(&self, signal: NeuralSignal) -> Result<()> {
        if self.inner.lifecycle.load(Ordering::Acquire) == Lifecycle::Stopped as u8 {
            return Err(NeuronError::Lifecycle(LifecycleError::Stopped));
        }
        if self.inner.inbox_tx.try_send(signal).is_err() {
            self.inner.counters.record_queue_overflow();
            warn!("neuron {:?}: inbox full, dropping newest signal", self.inner.id);
        }
        Ok(())
    }

    // ---- Output connections ---------------------------------------------

    /// Install an output connection, replacing any existing one with the
    /// same `id`. Safe to call from any thread in any lifecycle state.
    pub fn add_output_callback(&self, id: SynapseId, callback: Arc<dyn OutputCallback + Send + Sync>) {
        self.inner.outputs.write().insert(id, callback);
    }

    /// Remove an output connection, returning it if it existed.
    pub fn remove_output_callback(
        &self,
        id: SynapseId,
    ) -> Option<Arc<dyn OutputCallback + Send + Sync>> {
        self.inner.outputs.write().remove(&id)
    }

    /// Typed snapshot of every currently installed output connection.
    pub fn get_output_connection_info(&self) -> HashMap<SynapseId, OutputConnectionInfo> {
        self.inner
            .outputs
            .read()
            .iter()
            .map(|(id, cb)| {
                (
                    *id,
                    OutputConnectionInfo {
                        target_id: cb.get_target_id(),
                        weight_bits: cb.get_weight().to_bits(),
                        delay_nanos: cb.get_delay().as_nanos(),
                    },
                )
            })
            .collect()
    }

    // ---- Collaborators ---------------------------------------------------

    /// Install (or clear, with `None`) the matrix collaborator. Each field
    /// of [`MatrixCallbacks`] is independently optional; whichever
    /// sub-behaviors are left unset are silently skipped
    /// (`CollaboratorUnavailable`, spec §7) without affecting the rest.
    pub fn set_matrix_callbacks(&self, callbacks: Option<MatrixCallbacks>) {
        *self.inner.matrix_callbacks.write() = callbacks;
    }

    /// Install a custom post-fire chemical-release hook.
    pub fn set_custom_chemical_release(&self, hook: Arc<dyn CustomBehaviors + Send + Sync>) {
        *self.inner.custom_behaviors.write() = Some(hook);
    }

    /// Remove the custom post-fire hook, if any.
    pub fn disable_custom_behaviors(&self) {
        *self.inner.custom_behaviors.write() = None;
    }

    // ---- Configuration -----------------------------------------------------

    /// Directly set the firing threshold, clamped into
    /// `[base*0.1, base*5.0]` (P1).
    pub fn set_threshold(&self, value: f64) {
        self.inner.state.lock().soma.set_threshold(value);
    }

    /// Current firing threshold.
    pub fn get_threshold(&self) -> f64 {
        self.inner.state.lock().soma.threshold()
    }

    /// Current membrane accumulator, always a finite `f64` (P5).
    pub fn accumulator(&self) -> f64 {
        self.inner.state.lock().soma.accumulator()
    }

    /// Firing rate over the trailing activity window, in Hz.
    pub fn get_activity_level(&self) -> f64 {
        let now = self.logical_now();
        let activity = self.inner.activity.lock();
        activity
            .homeostatic_state
            .current_rate(now, &activity.homeostatic_params)
    }

    /// Typed snapshot of this neuron's observable firing status.
    pub fn get_firing_status(&self) -> FiringStatus {
        let now = self.logical_now();

        let (threshold, in_refractory) = {
            let state = self.inner.state.lock();
            (state.soma.threshold(), state.soma.is_refractory(now))
        };
        let (activity_level, calcium, history_len) = {
            let activity = self.inner.activity.lock();
            (
                activity
                    .homeostatic_state
                    .current_rate(now, &activity.homeostatic_params),
                activity.homeostatic_state.calcium_level(),
                activity.homeostatic_state.history_len(),
            )
        };
        let queue_depth = self.inner.axon.lock().len();

        FiringStatus {
            activity_level,
            threshold,
            calcium,
            in_refractory,
            history_len,
            queue_depth,
            queue_overflow_count: self.inner.counters.queue_overflow_count(),
            dropped_delivery_count: self.inner.counters.dropped_delivery_count(),
            transmit_failure_count: self.inner.counters.transmit_failure_count(),
            collaborator_skip_count: self.inner.counters.collaborator_skip_count(),
        }
    }

    /// Replace the list of neurotransmitter kinds released on each fire.
    pub fn set_released_ligands(&self, ligands: Vec<LigandType>) {
        self.inner.state.lock().released_ligands = SmallVec::from_vec(ligands);
    }

    /// Replace the dendritic integration mode.
    pub fn set_dendritic_mode(&self, mode: DendriticMode) {
        self.inner.state.lock().dendrite = mode;
    }

    // ---- STDP feedback -----------------------------------------------------

    /// Enable STDP feedback with the given delay and learning rate. Takes
    /// effect for the next fire; any already-pending feedback keeps its
    /// originally scheduled parameters.
    pub fn enable_stdp_feedback(&self, feedback_delay: Duration, learning_rate: f64) -> Result<()> {
        let params = STDPParams::new(feedback_delay.as_nanos() as u64, learning_rate)?;
        self.inner.stdp.lock().enable(params);
        Ok(())
    }

    /// Disable STDP feedback, silently dropping any pending tasks.
    pub fn disable_stdp_feedback(&self) {
        self.inner.stdp.lock().disable();
    }

    /// `true` if STDP feedback is currently enabled.
    pub fn is_stdp_enabled(&self) -> bool {
        self.inner.stdp.lock().is_enabled()
    }

    /// Immediately process any STDP feedback tasks due at the current
    /// logical time, without waiting for the background worker's next
    /// heartbeat. Useful for deterministic testing.
    pub fn send_stdp_feedback(&self) {
        let now = self.logical_now();
        process_due_stdp(&self.inner, now);
    }

    // ---- Synaptic scaling ---------------------------------------------------

    /// Enable synaptic scaling toward `target_strength`, nudged by
    /// `scaling_rate` per tick, checked every `interval`. The remaining
    /// tunables (`min_activity`, `significance_threshold`, `min_factor`,
    /// `max_factor`) take their spec-default values.
    pub fn enable_synaptic_scaling(
        &self,
        target_strength: f64,
        scaling_rate: f64,
        interval: Duration,
    ) -> Result<()> {
        let params = ScalingParams::new(
            target_strength,
            scaling_rate,
            interval.as_nanos() as u64,
            0.1,
            0.1,
            1.1,
            0.9,
        )?;
        *self.inner.scaling.lock() = Some(ScalingBlock {
            state: SynapticScalingState::new(),
            params,
            last_tick: None,
        });
        Ok(())
    }

    /// Disable synaptic scaling; every source's effective gain returns to
    /// `1.0`.
    pub fn disable_synaptic_scaling(&self) {
        *self.inner.scaling.lock() = None;
    }

    /// Apply this signal's source-specific receptor gain (`1.0` if scaling
    /// is disabled or the source has never been observed), recording the
    /// raw value as a sample for the next scaling tick.
    pub fn apply_post_synaptic_gain(&self, signal: &NeuralSignal) -> f64 {
        apply_gain(&self.inner, signal)
    }

    /// Immediately run one synaptic-scaling tick, without waiting for the
    /// background worker's next heartbeat. No-op if scaling is disabled.
    pub fn perform_homeostasis_scaling(&self) {
        let now = self.logical_now();
        let mut scaling = self.inner.scaling.lock();
        if let Some(block) = scaling.as_mut() {
            ScalingController.tick(&mut block.state, &block.params);
            block.last_tick = Some(now);
        }
    }

    fn logical_now(&self) -> Timestamp {
        Timestamp::from_nanos(self.inner.logical_now.load(Ordering::Acquire))
    }
}

impl Drop for Neuron {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

// ---- Background worker and shared processing logic -------------------------

/// Upper bound on how many queued signals one processing tick will drain at
/// once, so a burst of arrivals cannot starve the delivery/controller work
/// that follows a batch indefinitely.
const MAX_BATCH_SIZE: usize = 256;

fn run_worker(inner: Arc<Inner>) {
    loop {
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }
        match inner.inbox_rx.recv_timeout(HEARTBEAT_PERIOD) {
            Ok(first) => {
                let mut batch = Vec::with_capacity(4);
                batch.push(first);
                while batch.len() < MAX_BATCH_SIZE {
                    match inner.inbox_rx.try_recv() {
                        Ok(signal) => batch.push(signal),
                        Err(_) => break,
                    }
                }
                process_batch(&inner, batch);
            }
            Err(RecvTimeoutError::Timeout) => heartbeat(&inner),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    // Drain whatever became ready up to the last known logical time before
    // the worker exits (spec §5 cancellation: drain outstanding entries
    // whose scheduled time has passed).
    let now = Timestamp::from_nanos(inner.logical_now.load(Ordering::Acquire));
    deliver_ready(&inner, now);
}

fn heartbeat(inner: &Inner) {
    let now = Timestamp::from_nanos(
        inner
            .logical_now
            .fetch_add(HEARTBEAT_PERIOD.as_nanos() as u64, Ordering::AcqRel)
            + HEARTBEAT_PERIOD.as_nanos() as u64,
    );
    deliver_ready(inner, now);
    run_homeostatic_tick_if_due(inner, now);
    run_scaling_tick_if_due(inner, now);
    process_due_stdp(inner, now);
}

fn advance_logical_clock(inner: &Inner, now: Timestamp) {
    inner.logical_now.fetch_max(now.as_nanos(), Ordering::AcqRel);
}

fn apply_gain(inner: &Inner, signal: &NeuralSignal) -> f64 {
    let mut scaling = inner.scaling.lock();
    match scaling.as_mut() {
        Some(block) => {
            block
                .state
                .record_sample(signal.source_id, signal.value, signal.timestamp);
            signal.value * block.state.gain(signal.source_id)
        }
        None => signal.value,
    }
}

/// Process one processing tick's worth of incoming signals: feed every
/// signal in the batch through the dendritic integrator's `handle`, then run
/// exactly one soma tick against the integrator's combined `process` output
/// (spec §4.2: `process` is called once per processing tick, not once per
/// arrival, so windowed modes like Temporal Summation and Shunting
/// Inhibition see every arrival in the tick before they combine). `now` is
/// the latest timestamp in the batch.
fn process_batch(inner: &Inner, batch: Vec<NeuralSignal>) {
    let now = batch
        .iter()
        .map(|s| s.timestamp)
        .max()
        .unwrap_or(Timestamp::ZERO);
    advance_logical_clock(inner, now);

    let gained: Vec<(f64, Timestamp, LigandType)> = batch
        .iter()
        .map(|signal| {
            trace!(
                "neuron {:?}: signal from {:?} value={:.4} at {:?}",
                inner.id, signal.source_id, signal.value, signal.timestamp
            );
            (apply_gain(inner, signal), signal.timestamp, signal.ligand_type)
        })
        .collect();

    let fire = {
        let mut state = inner.state.lock();
        for (value, timestamp, ligand) in gained {
            state.dendrite.handle(value, timestamp, ligand);
        }
        let net_current = state.dendrite.process(now);
        state.soma.tick(net_current, now)
    };

    run_homeostatic_tick_if_due(inner, now);
    run_scaling_tick_if_due(inner, now);

    if let Some(fire) = fire {
        handle_fire(inner, fire.output_value, fire.fire_time);
    }

    deliver_ready(inner, now);
    process_due_stdp(inner, now);
}

/// Everything that happens on a fire: activity bookkeeping, reporting to
/// collaborators (with no neuron lock held — spec §5's central
/// correctness rule), scheduling axonal deliveries, and scheduling STDP
/// feedback.
fn handle_fire(inner: &Inner, output_value: f64, fire_time: Timestamp) {
    debug!("neuron {:?}: fired, output={:.4} at {:?}", inner.id, output_value, fire_time);

    {
        let mut activity = inner.activity.lock();
        let params = activity.homeostatic_params;
        activity.homeostatic_state.record_fire(fire_time, &params);
    }

    let connections: Vec<(SynapseId, Arc<dyn OutputCallback + Send + Sync>)> = inner
        .outputs
        .read()
        .iter()
        .map(|(id, cb)| (*id, Arc::clone(cb)))
        .collect();
    let released_ligands = inner.state.lock().released_ligands.clone();
    let activity_level = {
        let activity = inner.activity.lock();
        activity
            .homeostatic_state
            .current_rate(fire_time, &activity.homeostatic_params)
    };
    let connection_count = connections.len();

    // Snapshot taken, all neuron locks released: safe to invoke external
    // collaborators now. Each sub-behavior is checked independently, so a
    // collaborator that only wires up e.g. `report_health` still gets that
    // call while the others are counted as skipped (spec §7).
    let matrix = inner.matrix_callbacks.read().clone();

    match matrix.as_ref().and_then(|m| m.report_health.clone()) {
        Some(f) => invoke_guarded(inner, "report_health", || f(activity_level, connection_count)),
        None => inner.counters.record_collaborator_skip(),
    }

    match matrix.as_ref().and_then(|m| m.send_electrical_signal.clone()) {
        Some(f) => invoke_guarded(inner, "send_electrical_signal", || {
            f(ElectricalSignalKind::ActionPotential, output_value)
        }),
        None => inner.counters.record_collaborator_skip(),
    }

    let release_chemical = matrix.as_ref().and_then(|m| m.release_chemical.clone());
    match &release_chemical {
        Some(f) => {
            for ligand in &released_ligands {
                let concentration = output_value * ligand.concentration_factor() * CHEMICAL_BASE_SCALE;
                let f = Arc::clone(f);
                invoke_guarded(inner, "release_chemical", || f(*ligand, concentration));
            }
        }
        None => inner.counters.record_collaborator_skip(),
    }

    let custom = inner.custom_behaviors.read().clone();
    if let Some(custom) = custom {
        let release_fn = |ligand: LigandType, concentration: f64| match release_chemical.as_ref() {
            Some(f) => {
                let f = Arc::clone(f);
                if panic::catch_unwind(AssertUnwindSafe(|| f(ligand, concentration))).is_err() {
                    warn!("neuron {:?}: release_chemical (via custom hook) panicked", inner.id);
                    inner.counters.record_transmit_failure();
                }
            }
            None => inner.counters.record_collaborator_skip(),
        };
        invoke_guarded(inner, "custom_chemical_release", || {
            custom.custom_chemical_release(activity_level, output_value, &release_fn)
        });
    }

    let release_ligand = released_ligands.first().copied().unwrap_or(LigandType::Glutamate);
    {
        let mut axon = inner.axon.lock();
        for (connection_id, callback) in &connections {
            let delay_nanos = callback.get_delay().as_nanos().max(DEFAULT_CONNECTION_DELAY_NANOS);
            let delivery_time = fire_time.add_nanos(delay_nanos);
            let outbound = NeuralSignal::new(
                output_value * callback.get_weight(),
                fire_time,
                inner.id,
                callback.get_target_id(),
                *connection_id,
                release_ligand,
            );
            if axon.schedule(delivery_time, *connection_id, outbound) {
                inner.counters.record_dropped_delivery();
            }
        }
    }

    STDPController.schedule_feedback(&mut inner.stdp.lock(), fire_time);
}

fn deliver_ready(inner: &Inner, now: Timestamp) {
    let ready = inner.axon.lock().drain_ready(now);
    if ready.is_empty() {
        return;
    }
    let calls: Vec<(Arc<dyn OutputCallback + Send + Sync>, NeuralSignal)> = {
        let outputs = inner.outputs.read();
        ready
            .into_iter()
            .filter_map(|entry| {
                outputs
                    .get(&entry.connection_id)
                    .map(|cb| (Arc::clone(cb), entry.signal))
            })
            .collect()
    };
    for (callback, signal) in calls {
        let result = panic::catch_unwind(AssertUnwindSafe(|| callback.transmit_message(&signal)));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                warn!("neuron {:?}: transmit failed: {reason}", inner.id);
                inner.counters.record_transmit_failure();
            }
            Err(_) => {
                warn!("neuron {:?}: transmit callback panicked", inner.id);
                inner.counters.record_transmit_failure();
            }
        }
    }
}

fn run_homeostatic_tick_if_due(inner: &Inner, now: Timestamp) {
    let mut state = inner.state.lock();
    let mut activity = inner.activity.lock();
    let due = match activity.last_homeostatic_tick {
        None => true,
        Some(last) => {
            now.as_nanos().saturating_sub(last.as_nanos()) >= activity.homeostatic_tick_interval_nanos
        }
    };
    if !due {
        return;
    }

    let min_threshold = state.soma.min_threshold();
    let max_threshold = state.soma.max_threshold();
    let current_threshold = state.soma.threshold();
    let controller = HomeostaticController::new(activity.homeostatic_params);
    let new_threshold = controller.tick(
        &mut activity.homeostatic_state,
        now,
        current_threshold,
        min_threshold,
        max_threshold,
    );
    state.soma.set_threshold(new_threshold);
    activity.last_homeostatic_tick = Some(now);
    debug!("neuron {:?}: homeostatic tick, threshold -> {new_threshold:.4}", inner.id);
}

fn run_scaling_tick_if_due(inner: &Inner, now: Timestamp) {
    let mut scaling = inner.scaling.lock();
    let Some(block) = scaling.as_mut() else {
        return;
    };
    let due = match block.last_tick {
        None => true,
        Some(last) => now.as_nanos().saturating_sub(last.as_nanos()) >= block.params.interval_nanos,
    };
    if !due {
        return;
    }
    ScalingController.tick(&mut block.state, &block.params);
    block.last_tick = Some(now);
}

fn process_due_stdp(inner: &Inner, now: Timestamp) {
    if inner.stdp.lock().pending_len() == 0 {
        return;
    }

    let matrix = inner.matrix_callbacks.read().clone();
    let list_synapses = matrix.as_ref().and_then(|m| m.list_synapses.clone());
    let synapses = match &list_synapses {
        Some(f) => {
            let query = SynapseQuery { target_id: inner.id };
            match panic::catch_unwind(AssertUnwindSafe(|| f(query))) {
                Ok(list) => list,
                Err(_) => {
                    warn!("neuron {:?}: list_synapses panicked", inner.id);
                    inner.counters.record_transmit_failure();
                    Vec::new()
                }
            }
        }
        None => {
            inner.counters.record_collaborator_skip();
            Vec::new()
        }
    };

    let adjustments = STDPController.due_adjustments(&mut inner.stdp.lock(), now, &synapses);
    if adjustments.is_empty() {
        return;
    }

    match matrix.as_ref().and_then(|m| m.apply_plasticity.clone()) {
        Some(f) => {
            for adjustment in adjustments {
                let f = Arc::clone(&f);
                invoke_guarded(inner, "apply_plasticity", || f(adjustment));
            }
        }
        None => inner.counters.record_collaborator_skip(),
    }
}

fn invoke_guarded<F: FnOnce()>(inner: &Inner, what: &str, f: F) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!("neuron {:?}: {what} callback panicked", inner.id);
        inner.counters.record_transmit_failure();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SynapseId;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn default_neuron(id: u32) -> Neuron {
        Neuron::new(
            NeuronId::new(id),
            1.0,
            0.95,
            Duration::from_millis(5),
            1.0,
            1.0,
            1.0,
        )
        .unwrap()
    }

    struct RecordingOutput {
        target: NeuronId,
        received: Arc<Mutex<Vec<NeuralSignal>>>,
    }

    impl OutputCallback for RecordingOutput {
        fn transmit_message(&self, signal: &NeuralSignal) -> std::result::Result<(), String> {
            self.received.lock().push(signal.clone());
            Ok(())
        }
        fn get_target_id(&self) -> NeuronId {
            self.target
        }
        fn get_weight(&self) -> f64 {
            1.0
        }
        fn get_delay(&self) -> Timestamp {
            Timestamp::from_millis(1)
        }
    }

    fn wait_until(mut predicate: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_start_stop_idempotent_round_trip() {
        let neuron = default_neuron(1);
        assert!(neuron.start().is_ok());
        assert!(neuron.start().is_err());
        assert!(neuron.stop().is_ok());
        assert!(neuron.stop().is_ok());
        assert!(neuron.start().is_ok());
        assert!(neuron.stop().is_ok());
    }

    #[test]
    fn test_receive_after_stop_errors() {
        let neuron = default_neuron(2);
        neuron.start().unwrap();
        neuron.stop().unwrap();
        let signal = NeuralSignal::new(
            1.0,
            Timestamp::ZERO,
            NeuronId::new(0),
            NeuronId::new(2),
            SynapseId::new(0),
            LigandType::Glutamate,
        );
        assert!(neuron.receive(signal).is_err());
    }

    #[test]
    fn test_single_fire_emits_one_transmit_s1() {
        let neuron = default_neuron(3);
        let received = Arc::new(Mutex::new(Vec::new()));
        neuron.add_output_callback(
            SynapseId::new(0),
            Arc::new(RecordingOutput {
                target: NeuronId::new(99),
                received: Arc::clone(&received),
            }),
        );
        neuron.start().unwrap();

        let signal = NeuralSignal::new(
            1.5,
            Timestamp::ZERO,
            NeuronId::new(0),
            NeuronId::new(3),
            SynapseId::new(0),
            LigandType::Glutamate,
        );
        neuron.receive(signal).unwrap();

        assert!(wait_until(|| !received.lock().is_empty()));
        let delivered = received.lock();
        assert_eq!(delivered.len(), 1);
        assert!((delivered[0].value - 1.5).abs() < 1e-9);

        let status = neuron.get_firing_status();
        assert_eq!(status.history_len, 1);
        neuron.stop().unwrap();
    }

    #[test]
    fn test_add_remove_output_callback_round_trip() {
        let neuron = default_neuron(4);
        let id = SynapseId::new(7);
        neuron.add_output_callback(
            id,
            Arc::new(RecordingOutput {
                target: NeuronId::new(1),
                received: Arc::new(Mutex::new(Vec::new())),
            }),
        );
        assert_eq!(neuron.get_output_connection_info().len(), 1);
        neuron.remove_output_callback(id);
        assert!(neuron.get_output_connection_info().is_empty());
    }

    #[test]
    fn test_stdp_round_trip_leaves_no_pending_feedback() {
        let neuron = default_neuron(5);
        neuron.enable_stdp_feedback(Duration::from_millis(20), 0.1).unwrap();
        assert!(neuron.is_stdp_enabled());
        neuron.disable_stdp_feedback();
        assert!(!neuron.is_stdp_enabled());
        assert_eq!(neuron.inner.stdp.lock().pending_len(), 0);
    }

    #[test]
    fn test_threshold_always_in_bounds_under_concurrent_access_p6() {
        let neuron = Arc::new(default_neuron(6));
        let writer = {
            let neuron = Arc::clone(&neuron);
            thread::spawn(move || {
                for i in 0..200 {
                    neuron.set_threshold(if i % 2 == 0 { 100.0 } else { -100.0 });
                }
            })
        };
        let reader_ok = Arc::new(AtomicUsize::new(0));
        let reader = {
            let neuron = Arc::clone(&neuron);
            let reader_ok = Arc::clone(&reader_ok);
            thread::spawn(move || {
                for _ in 0..200 {
                    let t = neuron.get_threshold();
                    if (0.1..=5.0).contains(&t) {
                        reader_ok.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(reader_ok.load(Ordering::Relaxed), 200);
    }

    #[test]
    fn test_apply_post_synaptic_gain_defaults_to_unity() {
        let neuron = default_neuron(7);
        let signal = NeuralSignal::new(
            2.0,
            Timestamp::ZERO,
            NeuronId::new(0),
            NeuronId::new(7),
            SynapseId::new(0),
            LigandType::Glutamate,
        );
        assert_eq!(neuron.apply_post_synaptic_gain(&signal), 2.0);
    }

    #[test]
    fn test_enable_synaptic_scaling_validates_parameters() {
        let neuron = default_neuron(8);
        assert!(neuron
            .enable_synaptic_scaling(1.0, 0.02, Duration::from_secs(30))
            .is_ok());
        assert!(neuron
            .enable_synaptic_scaling(-1.0, 0.02, Duration::from_secs(30))
            .is_err());
    }
}
