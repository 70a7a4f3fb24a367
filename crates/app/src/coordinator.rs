//! Alarm incident coordinator.
//!
//! Owns the open incident of every (place, alarm type) key and drives it
//! through the alert state machine. All work on one key is serialized by an
//! async mutex; different keys proceed in parallel.
//!
//! Timers never touch incident state directly: a fired task only posts a
//! [`TimerEvent`] into the coordinator's [`TimerInbox`]. Whoever owns the
//! inbox feeds each event back through [`AlarmCoordinator::handle_timer`],
//! which re-validates it against the incident id and the dwell generation or
//! escalation epoch it was scheduled for.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, mpsc};

use vigil_domain::alarm::{ALARM_CALL_TREE, AlarmRegistry, AlarmType, DEFAULT_DWELL, SensorEvent, TriggerSource};
use vigil_domain::call_tree::Person;
use vigil_domain::error::{NotFoundError, ValidationError, VigilError};
use vigil_domain::escalation::{
    BackoffPolicy, DeliveryHandle, DeliveryOutcome, Escalation, EscalationPolicy, EscalationStatus,
    EscalationStep, Notification, NotificationAttempt, NotificationMethod, Priority,
    seconds_before_retry,
};
use vigil_domain::event::DeviceChange;
use vigil_domain::id::{IncidentId, PersonId, PlaceId};
use vigil_domain::incident::{AlarmIncident, IncidentKey};
use vigil_domain::model::Address;
use vigil_domain::state_machine::{self, AlertState, StateContext, TriggerEvent};
use vigil_domain::time;

use crate::ports::{
    CallTreeRepository, Clock, IncidentRepository, Notifier, PersonDirectory, Scheduler, TaskHandle,
};
use crate::services::call_tree_service::CallTreeService;

/// How escalation walks call trees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscalationSettings {
    pub policy: EscalationPolicy,
    pub backoff: BackoffPolicy,
    pub method: NotificationMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    DwellElapsed { generation: u64 },
    RetryDue { epoch: u64 },
    AcknowledgementDeadline { epoch: u64 },
    /// Resolving the call tree failed; try starting escalation again.
    EscalationStartDue { attempt: u32 },
}

/// A fired timer, posted to the [`TimerInbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub key: IncidentKey,
    pub incident_id: IncidentId,
    pub kind: TimerKind,
}

/// Receiving side of the coordinator's timer events.
#[derive(Debug)]
pub struct TimerInbox {
    receiver: mpsc::UnboundedReceiver<TimerEvent>,
}

impl TimerInbox {
    /// Next event; `None` once every coordinator clone is dropped.
    pub async fn recv(&mut self) -> Option<TimerEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TimerEvent> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    ArmDwellTimer,
    CancelDwellTimer,
    CancelPendingTasks,
    StartEscalation,
    StopEscalation,
    Archive,
}

/// Collects the effects requested by the state hooks; they are carried out
/// once the transition settled.
struct Effects {
    alarm_type: AlarmType,
    requested: Vec<Effect>,
}

impl StateContext for Effects {
    fn alarm_type(&self) -> AlarmType {
        self.alarm_type
    }

    fn arm_dwell_timer(&mut self) {
        self.requested.push(Effect::ArmDwellTimer);
    }

    fn cancel_dwell_timer(&mut self) {
        self.requested.push(Effect::CancelDwellTimer);
    }

    fn cancel_pending_tasks(&mut self) {
        self.requested.push(Effect::CancelPendingTasks);
    }

    fn start_escalation(&mut self) {
        self.requested.push(Effect::StartEscalation);
    }

    fn stop_escalation(&mut self) {
        self.requested.push(Effect::StopEscalation);
    }

    fn archive(&mut self) {
        self.requested.push(Effect::Archive);
    }
}

struct EscalationRun {
    key: IncidentKey,
    incident_id: IncidentId,
    escalation: Escalation,
    recipients: HashMap<PersonId, Person>,
    deliveries: HashMap<DeliveryHandle, PersonId>,
}

impl EscalationRun {
    fn timer(&self, kind: TimerKind) -> TimerEvent {
        TimerEvent {
            key: self.key,
            incident_id: self.incident_id,
            kind,
        }
    }
}

/// Everything known about one key. Only touched under its mutex.
#[derive(Default)]
struct Slot {
    loaded: bool,
    incident: Option<AlarmIncident>,
    escalation: Option<EscalationRun>,
    dwell: Option<TaskHandle>,
    retry: Option<TaskHandle>,
    deadline: Option<TaskHandle>,
    /// Failed call tree resolutions since escalation last started.
    start_failures: u32,
}

struct Shared<I, C, P, N, S, K> {
    registry: Arc<AlarmRegistry>,
    incidents: I,
    call_trees: CallTreeService<C, P>,
    notifier: N,
    scheduler: S,
    clock: K,
    settings: EscalationSettings,
    timers: mpsc::UnboundedSender<TimerEvent>,
    slots: Mutex<HashMap<IncidentKey, Arc<AsyncMutex<Slot>>>>,
}

/// Per-(place, type) incident lifecycle and escalation.
pub struct AlarmCoordinator<I, C, P, N, S, K> {
    shared: Arc<Shared<I, C, P, N, S, K>>,
}

impl<I, C, P, N, S, K> Clone for AlarmCoordinator<I, C, P, N, S, K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<I, C, P, N, S, K> AlarmCoordinator<I, C, P, N, S, K>
where
    I: IncidentRepository + Send + Sync + 'static,
    C: CallTreeRepository + Send + Sync + 'static,
    P: PersonDirectory + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    S: Scheduler + Send + Sync + 'static,
    K: Clock + Send + Sync + 'static,
{
    /// Create a coordinator and the inbox its timers post to.
    pub fn new(
        registry: Arc<AlarmRegistry>,
        incidents: I,
        call_trees: CallTreeService<C, P>,
        notifier: N,
        scheduler: S,
        clock: K,
        settings: EscalationSettings,
    ) -> (Self, TimerInbox) {
        let (timers, receiver) = mpsc::unbounded_channel();
        let shared = Shared {
            registry,
            incidents,
            call_trees,
            notifier,
            scheduler,
            clock,
            settings,
            timers,
            slots: Mutex::new(HashMap::new()),
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            TimerInbox { receiver },
        )
    }

    #[must_use]
    pub fn registry(&self) -> &AlarmRegistry {
        &self.shared.registry
    }

    #[must_use]
    pub fn call_trees(&self) -> &CallTreeService<C, P> {
        &self.shared.call_trees
    }

    /// Evaluate a device change against every applicable alarm type, in
    /// priority order, and drive the affected incidents.
    ///
    /// Returns the incidents that changed.
    ///
    /// # Errors
    ///
    /// Returns the first storage error hit while loading or saving an
    /// incident. Every applicable type is still evaluated; the in-memory
    /// state stays authoritative.
    #[tracing::instrument(skip(self, change), fields(place_id = %change.place_id, address = %change.address))]
    pub async fn on_device_change(
        &self,
        change: &DeviceChange,
    ) -> Result<Vec<AlarmIncident>, VigilError> {
        let Some(model) = change.model() else {
            tracing::warn!("changed model missing from snapshot, ignoring");
            return Ok(Vec::new());
        };

        let mut changed = Vec::new();
        let mut failure = None;
        for definition in self.shared.registry.definitions() {
            if !definition.is_applicable(&change.snapshot) {
                continue;
            }
            let alarm_type = definition.alarm_type;
            let Some(classifier) = self.shared.registry.classifier(alarm_type) else {
                continue;
            };
            let matched = definition.trigger.matches(model);
            let key = IncidentKey::new(change.place_id, alarm_type);

            let mut guard = match self.lock(key).await {
                Ok(guard) => guard,
                Err(err) => {
                    tracing::error!(error = %err, %alarm_type, "failed to load incident, skipping alarm type");
                    if failure.is_none() {
                        failure = Some(err);
                    }
                    continue;
                }
            };
            let slot = &mut *guard;
            let was_triggering = slot
                .incident
                .as_ref()
                .is_some_and(|incident| incident.is_triggering(&change.address));
            let Some(classification) = classifier.classify(model, matched, was_triggering) else {
                continue;
            };
            let touched = match classification.event {
                SensorEvent::Triggered => {
                    self.sensor_triggered(slot, key, &change.address, classification.source)
                        .await
                }
                SensorEvent::Restored => self.sensor_restored(slot, &change.address).await,
            };
            if !touched {
                continue;
            }
            match self.persist(slot).await {
                Ok(Some(incident)) => changed.push(incident),
                Ok(None) => {}
                Err(err) => {
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
        }
        failure.map_or(Ok(changed), Err)
    }

    /// A person confirmed the alarm.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::NotFound`] when no incident is open for the key,
    /// or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(
        &self,
        place_id: PlaceId,
        alarm_type: AlarmType,
        actor: &str,
    ) -> Result<AlarmIncident, VigilError> {
        self.command(
            IncidentKey::new(place_id, alarm_type),
            TriggerEvent::ConfirmedByPerson,
            actor,
        )
        .await
    }

    /// A person cancelled the alarm.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::NotFound`] when no incident is open for the key,
    /// or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        place_id: PlaceId,
        alarm_type: AlarmType,
        actor: &str,
    ) -> Result<AlarmIncident, VigilError> {
        self.command(
            IncidentKey::new(place_id, alarm_type),
            TriggerEvent::Cancelled,
            actor,
        )
        .await
    }

    /// A recipient took responsibility; escalation stops and the incident
    /// stays in ALERT.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::NotFound`] when no incident is open,
    /// [`ValidationError::NotARecipient`] when `person` is not being
    /// notified, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn acknowledge(
        &self,
        place_id: PlaceId,
        alarm_type: AlarmType,
        person: PersonId,
    ) -> Result<AlarmIncident, VigilError> {
        let key = IncidentKey::new(place_id, alarm_type);
        let mut guard = self.lock(key).await?;
        let slot = &mut *guard;
        if slot.incident.is_none() {
            return Err(not_found(key));
        }
        let now = self.shared.clock.now();
        let accepted = slot
            .escalation
            .as_mut()
            .is_some_and(|run| run.escalation.acknowledge(person, now));
        if !accepted {
            return Err(ValidationError::NotARecipient(person.to_string()).into());
        }
        tracing::info!(%person, "escalation acknowledged");
        cancel(&mut slot.retry);
        cancel(&mut slot.deadline);
        sync_escalation_status(slot);
        self.persist(slot).await?.ok_or_else(|| not_found(key))
    }

    /// Outcome of a notification previously handed to the notifier.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::NotFound`] when no incident is open for the key,
    /// or a storage error.
    #[tracing::instrument(skip(self, outcome))]
    pub async fn report_delivery(
        &self,
        place_id: PlaceId,
        alarm_type: AlarmType,
        handle: &DeliveryHandle,
        outcome: DeliveryOutcome,
    ) -> Result<(), VigilError> {
        let key = IncidentKey::new(place_id, alarm_type);
        let mut guard = self.lock(key).await?;
        let slot = &mut *guard;
        if slot.incident.is_none() {
            return Err(not_found(key));
        }
        let now = self.shared.clock.now();
        let Some(run) = slot.escalation.as_mut() else {
            tracing::debug!("no escalation running, ignoring delivery outcome");
            return Ok(());
        };
        let Some(recipient) = run.deliveries.remove(handle) else {
            tracing::debug!("unknown delivery handle, ignoring");
            return Ok(());
        };

        match outcome {
            DeliveryOutcome::Acknowledged { by } => {
                if !run.escalation.acknowledge(by, now) {
                    tracing::debug!(%by, "acknowledgement not applicable, ignoring");
                    return Ok(());
                }
                tracing::info!(%recipient, %by, "escalation acknowledged through delivery");
                cancel(&mut slot.retry);
                cancel(&mut slot.deadline);
                sync_escalation_status(slot);
            }
            DeliveryOutcome::Failed { reason } => {
                tracing::warn!(%recipient, reason, "notification delivery failed");
                let step = run.escalation.dispatch_failed(recipient, now);
                self.run_steps(slot, step).await;
            }
        }
        self.persist(slot).await.map(|_| ())
    }

    /// Feed back a fired timer. Stale events are ignored.
    ///
    /// # Errors
    ///
    /// Returns a storage error when loading or saving the incident failed.
    #[tracing::instrument(skip(self), fields(place_id = %event.key.place_id, alarm_type = %event.key.alarm_type))]
    pub async fn handle_timer(&self, event: TimerEvent) -> Result<(), VigilError> {
        let mut guard = self.lock(event.key).await?;
        let slot = &mut *guard;
        let current = slot
            .incident
            .as_ref()
            .is_some_and(|incident| incident.id == event.incident_id);
        if !current {
            tracing::debug!(?event.kind, "timer for a closed incident, ignoring");
            return Ok(());
        }
        let now = self.shared.clock.now();

        match event.kind {
            TimerKind::DwellElapsed { generation } => {
                let armed = slot.incident.as_ref().is_some_and(|incident| {
                    incident.state == AlertState::PreAlert && incident.generation == generation
                });
                if !armed {
                    tracing::debug!(generation, "stale dwell timer, ignoring");
                    return Ok(());
                }
                slot.dwell = None;
                self.drive(slot, TriggerEvent::DwellElapsed).await;
            }
            TimerKind::RetryDue { epoch } => {
                let Some(run) = slot
                    .escalation
                    .as_mut()
                    .filter(|run| run.escalation.epoch() == epoch)
                else {
                    tracing::debug!(epoch, "stale retry timer, ignoring");
                    return Ok(());
                };
                slot.retry = None;
                let step = run.escalation.retry_due(now);
                self.run_steps(slot, step).await;
            }
            TimerKind::AcknowledgementDeadline { epoch } => {
                let Some(run) = slot
                    .escalation
                    .as_mut()
                    .filter(|run| run.escalation.epoch() == epoch)
                else {
                    tracing::debug!(epoch, "stale acknowledgement deadline, ignoring");
                    return Ok(());
                };
                slot.deadline = None;
                let step = run.escalation.acknowledgement_deadline(now);
                self.run_steps(slot, step).await;
            }
            TimerKind::EscalationStartDue { attempt } => {
                let waiting = slot.escalation.is_none()
                    && slot.start_failures == attempt
                    && slot
                        .incident
                        .as_ref()
                        .is_some_and(|incident| incident.state == AlertState::Alert);
                if !waiting {
                    tracing::debug!(attempt, "stale escalation start, ignoring");
                    return Ok(());
                }
                slot.retry = None;
                self.start_escalation(slot).await;
            }
        }
        self.persist(slot).await.map(|_| ())
    }

    /// Feed every event of `inbox` back through [`Self::handle_timer`], one
    /// task per event. Runs for as long as the runtime does.
    pub async fn process_timers(self, mut inbox: TimerInbox) {
        while let Some(event) = inbox.recv().await {
            let coordinator = self.clone();
            tokio::spawn(async move {
                if let Err(err) = coordinator.handle_timer(event).await {
                    tracing::error!(error = %err, ?event, "failed to handle timer");
                }
            });
        }
        tracing::debug!("timer inbox closed");
    }

    /// The open incident for the key, if any.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the incident could not be loaded.
    pub async fn active_incident(
        &self,
        place_id: PlaceId,
        alarm_type: AlarmType,
    ) -> Result<Option<AlarmIncident>, VigilError> {
        let guard = self.lock(IncidentKey::new(place_id, alarm_type)).await?;
        Ok(guard.incident.clone())
    }

    /// Every incident of a place, archived ones included.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_incidents(&self, place_id: PlaceId) -> Result<Vec<AlarmIncident>, VigilError> {
        self.shared.incidents.list_by_place(place_id).await
    }

    /// Lock a key, loading (and resuming) its open incident on first access.
    async fn lock(&self, key: IncidentKey) -> Result<OwnedMutexGuard<Slot>, VigilError> {
        let slot = {
            let mut slots = self
                .shared
                .slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key).or_default())
        };
        let mut guard = slot.lock_owned().await;
        if !guard.loaded {
            guard.incident = self.shared.incidents.find_active(key).await?;
            guard.loaded = true;
            self.resume(&mut guard).await;
        }
        Ok(guard)
    }

    async fn resume(&self, slot: &mut Slot) {
        let Some(incident) = slot.incident.as_ref() else {
            return;
        };
        match incident.state {
            AlertState::PreAlert => {
                let deadline = time::add(incident.last_transition_at, self.dwell(incident.alarm_type));
                let delay = time::until(self.shared.clock.now(), deadline);
                tracing::info!(incident_id = %incident.id, ?delay, "resumed pre-alert, re-arming dwell timer");
                self.arm_dwell(slot, delay);
            }
            AlertState::Alert
                if !matches!(
                    incident.escalation,
                    EscalationStatus::Acknowledged { .. } | EscalationStatus::Exhausted { .. }
                ) =>
            {
                tracing::info!(incident_id = %incident.id, "resumed alert, restarting escalation");
                self.start_escalation(slot).await;
            }
            _ => {}
        }
    }

    async fn command(
        &self,
        key: IncidentKey,
        event: TriggerEvent,
        actor: &str,
    ) -> Result<AlarmIncident, VigilError> {
        let mut guard = self.lock(key).await?;
        let slot = &mut *guard;
        let Some(incident) = slot.incident.as_mut() else {
            return Err(not_found(key));
        };
        if incident.state.on_trigger_event(event) == incident.state {
            tracing::debug!(state = %incident.state, ?event, "command does not apply, ignoring");
            return Ok(incident.clone());
        }
        match event {
            TriggerEvent::ConfirmedByPerson => incident.confirmed_by = Some(actor.to_string()),
            TriggerEvent::Cancelled => incident.cancelled_by = Some(actor.to_string()),
            _ => {}
        }
        self.drive(slot, event).await;
        self.persist(slot).await?.ok_or_else(|| not_found(key))
    }

    async fn sensor_triggered(
        &self,
        slot: &mut Slot,
        key: IncidentKey,
        address: &Address,
        source: TriggerSource,
    ) -> bool {
        let now = self.shared.clock.now();
        let incident = slot
            .incident
            .get_or_insert_with(|| AlarmIncident::open(key, now));
        if !incident.record_trigger(address.clone(), source, now) {
            return false;
        }
        tracing::info!(incident_id = %incident.id, alarm_type = %key.alarm_type, ?source, "sensor triggered");
        self.drive(slot, TriggerEvent::SensorTriggered).await;
        true
    }

    async fn sensor_restored(&self, slot: &mut Slot, address: &Address) -> bool {
        let Some(incident) = slot.incident.as_mut() else {
            return false;
        };
        if !incident.record_restore(address) {
            return false;
        }
        let event = if incident.triggering.is_empty() {
            TriggerEvent::AllSensorsRestored
        } else {
            TriggerEvent::SensorRestored
        };
        tracing::info!(incident_id = %incident.id, remaining = incident.triggering.len(), "sensor restored");
        self.drive(slot, event).await;
        true
    }

    /// Run `event` through the state machine, then carry out the effects the
    /// state hooks requested.
    async fn drive(&self, slot: &mut Slot, event: TriggerEvent) {
        let Some(incident) = slot.incident.as_mut() else {
            return;
        };
        let mut effects = Effects {
            alarm_type: incident.alarm_type,
            requested: Vec::new(),
        };
        let transition = state_machine::apply(&mut effects, incident.state, event);
        if !transition.changed() {
            return;
        }
        let now = self.shared.clock.now();
        for state in &transition.path {
            incident.enter(*state, now);
        }
        tracing::info!(
            incident_id = %incident.id,
            alarm_type = %incident.alarm_type,
            from = %transition.from,
            to = %transition.to,
            ?event,
            "incident transitioned"
        );
        for effect in effects.requested {
            self.perform(slot, effect).await;
        }
    }

    async fn perform(&self, slot: &mut Slot, effect: Effect) {
        match effect {
            Effect::ArmDwellTimer => {
                if let Some(incident) = slot.incident.as_ref() {
                    let dwell = self.dwell(incident.alarm_type);
                    self.arm_dwell(slot, dwell);
                }
            }
            Effect::CancelDwellTimer => cancel(&mut slot.dwell),
            Effect::CancelPendingTasks => {
                cancel(&mut slot.dwell);
                cancel(&mut slot.retry);
                cancel(&mut slot.deadline);
            }
            Effect::StartEscalation => self.start_escalation(slot).await,
            Effect::StopEscalation => {
                cancel(&mut slot.retry);
                cancel(&mut slot.deadline);
                if let Some(run) = slot.escalation.as_mut() {
                    run.escalation.stop();
                }
                sync_escalation_status(slot);
                slot.escalation = None;
            }
            Effect::Archive => {
                if let Some(incident) = slot.incident.as_ref() {
                    tracing::info!(incident_id = %incident.id, state = %incident.state, "incident archived");
                }
            }
        }
    }

    fn dwell(&self, alarm_type: AlarmType) -> Duration {
        self.shared
            .registry
            .definition(alarm_type)
            .map_or(DEFAULT_DWELL, |definition| definition.dwell)
    }

    fn arm_dwell(&self, slot: &mut Slot, delay: Duration) {
        let Some(incident) = slot.incident.as_ref() else {
            return;
        };
        let event = TimerEvent {
            key: incident.key(),
            incident_id: incident.id,
            kind: TimerKind::DwellElapsed {
                generation: incident.generation,
            },
        };
        replace(&mut slot.dwell, self.schedule(delay, event));
    }

    fn schedule(&self, delay: Duration, event: TimerEvent) -> TaskHandle {
        let timers = self.shared.timers.clone();
        self.shared.scheduler.schedule(
            delay,
            Box::pin(async move {
                if timers.send(event).is_err() {
                    tracing::debug!(?event, "timer inbox closed, dropping event");
                }
            }),
        )
    }

    async fn start_escalation(&self, slot: &mut Slot) {
        let Some(incident) = slot.incident.as_ref() else {
            return;
        };
        let (key, incident_id) = (incident.key(), incident.id);
        if let Some(mut previous) = slot.escalation.take() {
            previous.escalation.stop();
        }

        let namespace = self
            .shared
            .registry
            .definition(key.alarm_type)
            .map_or(ALARM_CALL_TREE, |definition| definition.call_tree.as_str());
        let recipients = match self
            .shared
            .call_trees
            .resolve_recipients(key.place_id, namespace)
            .await
        {
            Ok(recipients) => recipients,
            Err(err) => {
                slot.start_failures += 1;
                let attempt = slot.start_failures;
                let delay = self.start_retry_delay(attempt);
                tracing::error!(error = %err, %incident_id, namespace, attempt, ?delay, "failed to resolve call tree, retrying");
                let event = TimerEvent {
                    key,
                    incident_id,
                    kind: TimerKind::EscalationStartDue { attempt },
                };
                replace(&mut slot.retry, self.schedule(delay, event));
                return;
            }
        };
        slot.start_failures = 0;
        tracing::info!(%incident_id, namespace, recipients = recipients.len(), "starting escalation");

        let settings = self.shared.settings;
        let mut escalation = Escalation::new(
            incident_id,
            recipients.iter().map(|person| person.id).collect(),
            settings.policy,
            settings.backoff,
            settings.method,
        );
        let step = escalation.start(self.shared.clock.now());
        slot.escalation = Some(EscalationRun {
            key,
            incident_id,
            escalation,
            recipients: recipients
                .into_iter()
                .map(|person| (person.id, person))
                .collect(),
            deliveries: HashMap::new(),
        });
        self.run_steps(slot, step).await;
    }

    /// Backoff between call tree resolution attempts, never below a second.
    fn start_retry_delay(&self, attempt: u32) -> Duration {
        let max_backoff = self.shared.settings.backoff.max_backoff.as_secs();
        Duration::from_secs(seconds_before_retry(attempt, max_backoff).max(1))
    }

    /// Carry out escalation steps until none is left to do right now.
    async fn run_steps(&self, slot: &mut Slot, first: EscalationStep) {
        let mut queue = VecDeque::from([first]);
        while let Some(step) = queue.pop_front() {
            let Some(run) = slot.escalation.as_mut() else {
                break;
            };
            match step {
                EscalationStep::Dispatch(attempts) => {
                    cancel(&mut slot.retry);
                    for attempt in &attempts {
                        let next = self.dispatch(run, attempt).await;
                        queue.push_back(next);
                    }
                }
                EscalationStep::RetryAfter(delay) => {
                    let event = run.timer(TimerKind::RetryDue {
                        epoch: run.escalation.epoch(),
                    });
                    replace(&mut slot.retry, self.schedule(delay, event));
                }
                EscalationStep::AwaitAcknowledgement(delay) => {
                    let event = run.timer(TimerKind::AcknowledgementDeadline {
                        epoch: run.escalation.epoch(),
                    });
                    replace(&mut slot.deadline, self.schedule(delay, event));
                }
                EscalationStep::Exhausted => {
                    tracing::warn!(incident_id = %run.incident_id, "call tree exhausted, incident stays in ALERT");
                }
                EscalationStep::Idle => {}
            }
            for report in run.escalation.take_reports() {
                tracing::warn!(
                    incident_id = %report.incident_id,
                    recipient = ?report.recipient,
                    attempts = report.attempts,
                    reason = ?report.reason,
                    "escalation expired"
                );
            }
        }
        sync_escalation_status(slot);
    }

    async fn dispatch(&self, run: &mut EscalationRun, attempt: &NotificationAttempt) -> EscalationStep {
        let recipient = attempt.recipient;
        let Some(person) = run.recipients.get(&recipient) else {
            return run
                .escalation
                .dispatch_failed(recipient, self.shared.clock.now());
        };
        let notification = Notification {
            incident_id: run.incident_id,
            place_id: run.key.place_id,
            alarm_type: run.key.alarm_type,
            state: AlertState::Alert,
            priority: Priority::Critical,
            attempt: attempt.attempt_count,
        };
        let result = self
            .shared
            .notifier
            .send(person, attempt.method, &notification)
            .await;
        let now = self.shared.clock.now();
        match result {
            Ok(handle) => {
                tracing::info!(
                    incident_id = %run.incident_id,
                    %recipient,
                    attempt = attempt.attempt_count,
                    %handle,
                    "notification dispatched"
                );
                run.deliveries.insert(handle, recipient);
                run.escalation.dispatched(recipient, now)
            }
            Err(err) => {
                tracing::warn!(
                    incident_id = %run.incident_id,
                    %recipient,
                    attempt = attempt.attempt_count,
                    error = %err,
                    "notification dispatch failed"
                );
                run.escalation.dispatch_failed(recipient, now)
            }
        }
    }

    /// Save the incident; a closed incident leaves the slot.
    async fn persist(&self, slot: &mut Slot) -> Result<Option<AlarmIncident>, VigilError> {
        let Some(incident) = slot.incident.clone() else {
            return Ok(None);
        };
        if !incident.is_open() {
            slot.incident = None;
            slot.escalation = None;
            slot.start_failures = 0;
        }
        let incident_id = incident.id;
        match self.shared.incidents.save(incident).await {
            Ok(saved) => Ok(Some(saved)),
            Err(err) => {
                tracing::error!(error = %err, %incident_id, "failed to persist incident");
                Err(err)
            }
        }
    }
}

fn not_found(key: IncidentKey) -> VigilError {
    NotFoundError {
        entity: "AlarmIncident",
        id: format!("{}/{}", key.place_id, key.alarm_type),
    }
    .into()
}

fn cancel(handle: &mut Option<TaskHandle>) {
    if let Some(handle) = handle.take() {
        handle.cancel();
    }
}

fn replace(current: &mut Option<TaskHandle>, next: TaskHandle) {
    if let Some(previous) = current.replace(next) {
        previous.cancel();
    }
}

fn sync_escalation_status(slot: &mut Slot) {
    if let (Some(incident), Some(run)) = (slot.incident.as_mut(), slot.escalation.as_ref()) {
        incident.escalation = run.escalation.status().clone();
    }
}
