//! RT parameter store and the per-cycle synchronization protocol
//!
//! [`RtState`] lives on the audio thread. Each processing block runs:
//!
//! 1. [`apply_parameter_changes`](RtState::apply_parameter_changes) with the host's change list
//! 2. [`before_processing`](RtState::before_processing): pending GUI state, then pending
//!    inbound messages
//! 3. the plugin's own processing
//! 4. [`after_processing`](RtState::after_processing): publish the latest state if anything
//!    changed, then send dirty outbound messages
//!
//! [`RtStateHandle`] is its counterpart on the host's main thread. It reads
//! and writes persisted state and receives GUI messages. The two only share the
//! lock-free exchanges and the inbound pending slots.

use std::io::{Read, Write};
use std::sync::Arc;

use delegate::delegate;
use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::codec::ParamSerializer;
use crate::error::{DrainError, MessageError, SendFault, SendFaultKind, StateError};
use crate::exchange::{self, Publisher, Receiver};
use crate::message::{Message, MessageProducer, ParamValueQueue};
use crate::normalized::{NormalizedState, SaveOrder};
use crate::param::{ParamDef, ParamDefs, ParamId};
use crate::params::{
    ErasedInbound, ErasedInboundSender, ErasedOutbound, Inbound, Outbound, RtInboundParameter,
    RtOutboundParameter, RtParam, RtPlainParameter,
};

/// Where the RT state is within the current processing block
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CyclePhase {
    Idle,
    BeforeProcessing,
    Processing,
    AfterProcessing,
}

/// Outcome of the after-processing phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// A plain value changed during the cycle and a new latest state was published
    pub state_changed: bool,
    /// Number of outbound messages sent, or the combined send failures
    pub messages: Result<usize, DrainError>,
}

/// The RT half of the synchronized parameter state
pub struct RtState {
    defs: Arc<ParamDefs>,
    params: HashMap<ParamId, RtParam>,
    save_order: Arc<SaveOrder>,
    /// GUI to RT: states loaded by the host
    state_updates: Receiver<NormalizedState>,
    /// RT to GUI: latest computed state, for persistence
    latest_state: Publisher<NormalizedState>,
    /// Receives pending GUI states without allocating
    scratch: NormalizedState,
    phase: CyclePhase,
}

impl RtState {
    pub(crate) fn new(
        defs: Arc<ParamDefs>,
        params: HashMap<ParamId, RtParam>,
        senders: HashMap<ParamId, Box<dyn ErasedInboundSender>>,
        initial: NormalizedState,
        defaults: Vec<f64>,
    ) -> (RtState, RtStateHandle) {
        let save_order = initial.save_order().clone();
        let (update_publisher, update_receiver) = exchange::channel(initial.clone());
        let (latest_publisher, latest_receiver) = exchange::channel(initial.clone());

        let rt = RtState {
            defs: defs.clone(),
            params,
            save_order: save_order.clone(),
            state_updates: update_receiver,
            latest_state: latest_publisher,
            scratch: initial.clone(),
            phase: CyclePhase::Idle,
        };
        let handle = RtStateHandle {
            defs,
            save_order,
            defaults,
            state_updates: update_publisher,
            latest_state: latest_receiver,
            outgoing: initial.clone(),
            latest: initial,
            senders,
            after_read: None,
            before_write: None,
        };
        (rt, handle)
    }

    delegate! {
        to self.defs {
            /// Definition of a registered parameter
            pub fn definition(&self, id: ParamId) -> Option<&ParamDef>;
            /// Every registered id, in registration order
            pub fn registration_order(&self) -> &[ParamId];
        }
    }

    #[inline]
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    #[inline]
    pub fn save_order(&self) -> &Arc<SaveOrder> {
        &self.save_order
    }

    pub fn plain(&self, id: ParamId) -> Option<&RtPlainParameter> {
        match self.params.get(&id) {
            Some(RtParam::Plain(p)) => Some(p),
            _ => None,
        }
    }

    /// Current normalized value of a plain parameter
    pub fn normalized(&self, id: ParamId) -> Option<f64> {
        self.plain(id).map(RtPlainParameter::normalized)
    }

    pub fn previous_normalized(&self, id: ParamId) -> Option<f64> {
        self.plain(id).map(RtPlainParameter::previous_normalized)
    }

    /// Set a plain parameter from the processing logic; returns whether it changed
    pub fn set_normalized(&mut self, id: ParamId, value: f64) -> bool {
        match self.params.get_mut(&id) {
            Some(RtParam::Plain(p)) => p.update(value),
            _ => false,
        }
    }

    pub fn outbound<S: ParamSerializer>(
        &self,
        handle: &Outbound<S>,
    ) -> Option<&RtOutboundParameter<S>> {
        match self.params.get(&handle.id()) {
            Some(RtParam::Outbound(p)) => p.as_any().downcast_ref(),
            _ => None,
        }
    }

    pub fn outbound_mut<S: ParamSerializer>(
        &mut self,
        handle: &Outbound<S>,
    ) -> Option<&mut RtOutboundParameter<S>> {
        match self.params.get_mut(&handle.id()) {
            Some(RtParam::Outbound(p)) => p.as_any_mut().downcast_mut(),
            _ => None,
        }
    }

    pub fn inbound<S: ParamSerializer>(
        &self,
        handle: &Inbound<S>,
    ) -> Option<&RtInboundParameter<S>> {
        match self.params.get(&handle.id()) {
            Some(RtParam::Inbound(p)) => p.as_any().downcast_ref(),
            _ => None,
        }
    }

    /// Fold the host's per-block parameter changes into the plain parameters
    ///
    /// Only the last point of each queue counts. Ids that are unknown or not
    /// plain are ignored. Returns whether any value changed.
    pub fn apply_parameter_changes<'a, I, Q>(&mut self, changes: I) -> bool
    where
        I: IntoIterator<Item = &'a Q>,
        Q: ParamValueQueue + ?Sized + 'a,
    {
        let mut changed = false;
        for queue in changes {
            let Some((_, value)) = queue.last_point() else {
                continue;
            };
            if let Some(RtParam::Plain(p)) = self.params.get_mut(&queue.param_id()) {
                changed |= p.update(value);
            }
        }
        changed
    }

    /// Write every saved plain value into `into`, in save order
    pub fn compute_latest_state(&self, into: &mut NormalizedState) {
        fill_state(&self.params, &self.save_order, into);
    }

    /// Overwrite plain parameters from a state; returns whether any value changed
    pub fn apply_state(&mut self, state: &NormalizedState) -> bool {
        apply_values(&mut self.params, state)
    }

    /// Apply every value the GUI has sent since the last cycle
    pub fn apply_pending_inbound_messages(&mut self) -> bool {
        let mut applied = false;
        for param in self.params.values_mut() {
            if let RtParam::Inbound(p) = param {
                applied |= p.apply_update();
            }
        }
        applied
    }

    /// Roll every current value into its previous slot; returns whether any differed
    pub fn reset_previous_values(&mut self) -> bool {
        let mut changed = false;
        for param in self.params.values_mut() {
            if let RtParam::Plain(p) = param {
                changed |= p.reset_previous();
            }
        }
        changed
    }

    /// Make the current plain values available to the host thread
    pub fn publish_latest_state(&mut self) {
        let params = &self.params;
        let save_order = &self.save_order;
        self.latest_state.publish_with(|slot| fill_state(params, save_order, slot));
    }

    /// Send every dirty outbound parameter through `producer`
    ///
    /// A parameter that cannot be sent keeps its dirty flag; the others are
    /// still sent. Failures are combined into one [`DrainError`].
    pub fn drain_outbound_messages<P: MessageProducer + ?Sized>(
        &mut self,
        producer: &mut P,
    ) -> Result<usize, DrainError> {
        let mut sent = 0;
        let mut failed = 0;
        let mut first = None;

        for param in self.params.values() {
            let RtParam::Outbound(param) = param else {
                continue;
            };
            if !param.has_update() {
                continue;
            }

            let id = param.def().id();
            match send_one(&**param, producer) {
                Ok(()) => sent += 1,
                Err(kind) => {
                    failed += 1;
                    first.get_or_insert(SendFault { id, kind });
                }
            }
        }

        match first {
            None => Ok(sent),
            Some(first) => Err(DrainError { sent, failed, first }),
        }
    }

    /// Apply pending GUI state and inbound messages, in that order
    ///
    /// Returns whether anything changed.
    pub fn before_processing(&mut self) -> bool {
        debug_assert_eq!(self.phase, CyclePhase::Idle, "before_processing called out of order");
        self.phase = CyclePhase::BeforeProcessing;

        let mut changed = false;
        if self.state_updates.consume(&mut self.scratch) {
            changed |= apply_values(&mut self.params, &self.scratch);
        }
        changed |= self.apply_pending_inbound_messages();

        self.phase = CyclePhase::Processing;
        changed
    }

    /// Publish the latest state when a value changed, then drain outbound messages
    pub fn after_processing<P: MessageProducer + ?Sized>(
        &mut self,
        producer: &mut P,
    ) -> CycleReport {
        debug_assert_eq!(
            self.phase,
            CyclePhase::Processing,
            "after_processing called out of order"
        );
        self.phase = CyclePhase::AfterProcessing;

        let state_changed = self.reset_previous_values();
        if state_changed {
            self.publish_latest_state();
        }
        let messages = self.drain_outbound_messages(producer);

        self.phase = CyclePhase::Idle;
        CycleReport { state_changed, messages }
    }

    /// Run one whole block: host changes, before, `process`, after
    pub fn run_cycle<'a, I, Q, P, F>(
        &mut self,
        changes: I,
        producer: &mut P,
        process: F,
    ) -> CycleReport
    where
        I: IntoIterator<Item = &'a Q>,
        Q: ParamValueQueue + ?Sized + 'a,
        P: MessageProducer + ?Sized,
        F: FnOnce(&mut RtState),
    {
        self.apply_parameter_changes(changes);
        self.before_processing();
        process(self);
        self.after_processing(producer)
    }
}

fn fill_state(
    params: &HashMap<ParamId, RtParam>,
    save_order: &SaveOrder,
    into: &mut NormalizedState,
) {
    for (i, id) in save_order.ids().iter().enumerate() {
        if let Some(RtParam::Plain(p)) = params.get(id) {
            into.set(i, p.normalized());
        }
    }
}

fn apply_values(params: &mut HashMap<ParamId, RtParam>, state: &NormalizedState) -> bool {
    let mut changed = false;
    for (id, value) in state.iter() {
        if let Some(RtParam::Plain(p)) = params.get_mut(&id) {
            changed |= p.update(value);
        }
    }
    changed
}

fn send_one<P: MessageProducer + ?Sized>(
    param: &dyn ErasedOutbound,
    producer: &mut P,
) -> Result<(), SendFaultKind> {
    let mut message = producer.allocate_message().ok_or(SendFaultKind::Allocation)?;
    message.set_id(param.def().id());

    if param.write_to_message(&mut message).is_err() {
        producer.release_message(message);
        return Err(SendFaultKind::Encode);
    }

    match producer.send_message(message) {
        Ok(()) => {
            param.clear_update();
            Ok(())
        }
        Err(message) => {
            producer.release_message(message);
            Err(SendFaultKind::Delivery)
        }
    }
}

/// Host-thread half of the synchronized state
///
/// Loads and saves the persisted state, and turns GUI messages into pending
/// inbound updates. May allocate; never waits on the RT thread.
pub struct RtStateHandle {
    defs: Arc<ParamDefs>,
    save_order: Arc<SaveOrder>,
    defaults: Vec<f64>,
    state_updates: Publisher<NormalizedState>,
    latest_state: Receiver<NormalizedState>,
    latest: NormalizedState,
    /// Copy of `latest` handed to the write hook
    outgoing: NormalizedState,
    senders: HashMap<ParamId, Box<dyn ErasedInboundSender>>,
    after_read: Option<StateHook>,
    before_write: Option<StateHook>,
}

type StateHook = Box<dyn FnMut(&mut NormalizedState) + Send>;

impl RtStateHandle {
    delegate! {
        to self.defs {
            pub fn definition(&self, id: ParamId) -> Option<&ParamDef>;
            pub fn registration_order(&self) -> &[ParamId];
        }
    }

    #[inline]
    pub fn save_order(&self) -> &Arc<SaveOrder> {
        &self.save_order
    }

    /// Pick up the most recent state RT published, if any; returns whether one was new
    pub fn poll_latest_state(&mut self) -> bool {
        self.latest_state.consume(&mut self.latest)
    }

    /// The most recent state known to this side, always self-consistent
    pub fn latest_state(&self) -> &NormalizedState {
        &self.latest
    }

    /// Queue a full state for RT to apply before its next block
    pub fn queue_state(&mut self, state: &NormalizedState) {
        // Drop anything RT published before this state so a save right after
        // a load returns what was loaded.
        self.poll_latest_state();
        self.latest.clone_from(state);
        self.state_updates.publish(state);
    }

    /// Adjust every decoded state before it is queued for RT
    pub fn on_state_read<F>(&mut self, hook: F)
    where
        F: FnMut(&mut NormalizedState) + Send + 'static,
    {
        self.after_read = Some(Box::new(hook));
    }

    /// Adjust the state about to be serialized
    ///
    /// The hook sees a copy; the latest state itself is left as RT published it.
    pub fn on_state_write<F>(&mut self, hook: F)
    where
        F: FnMut(&mut NormalizedState) + Send + 'static,
    {
        self.before_write = Some(Box::new(hook));
    }

    /// Decode a persisted state and queue it for RT
    pub fn read_new_state<R: Read + ?Sized>(&mut self, stream: &mut R) -> Result<(), StateError> {
        let mut state = NormalizedState::new(self.save_order.clone());
        let read = state.read_from(stream, &self.defaults)?;
        if let Some(hook) = self.after_read.as_mut() {
            hook(&mut state);
        }
        debug!(read, expected = state.len(), "loaded state queued for RT");
        self.queue_state(&state);
        Ok(())
    }

    /// Serialize the latest state RT published
    pub fn write_latest_state<W: Write + ?Sized>(
        &mut self,
        stream: &mut W,
    ) -> Result<(), StateError> {
        self.poll_latest_state();
        match self.before_write.as_mut() {
            Some(hook) => {
                self.outgoing.clone_from(&self.latest);
                hook(&mut self.outgoing);
                self.outgoing.write_to(stream)?;
            }
            None => self.latest.write_to(stream)?,
        }
        debug!(values = self.latest.len(), "latest state written");
        Ok(())
    }

    /// Accept a GUI message for an inbound parameter
    ///
    /// The value is applied by RT at the start of its next block; a newer
    /// message for the same parameter replaces one not yet applied.
    pub fn handle_message(&mut self, message: &Message) -> Result<(), MessageError> {
        let id = message.id().ok_or(MessageError::MissingId)?;
        let sender = match self.senders.get_mut(&id) {
            Some(sender) => sender,
            None if self.defs.contains(id) => return Err(MessageError::NotInbound(id)),
            None => {
                warn!(id, "message for unknown parameter");
                return Err(MessageError::UnknownParam(id));
            }
        };

        sender.handle_message(message).map_err(|source| {
            warn!(id, "failed to decode inbound message: {}", source);
            MessageError::Codec { id, source }
        })?;
        debug_assert_eq!(sender.def().id(), id);
        Ok(())
    }
}
