//! In-memory port doubles shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vigil_domain::alarm::AlarmType;
use vigil_domain::call_tree::{CallTree, Person};
use vigil_domain::error::{TransientDispatchError, VigilError};
use vigil_domain::escalation::{DeliveryHandle, Notification, NotificationMethod};
use vigil_domain::id::{PersonId, PlaceId};
use vigil_domain::incident::{AlarmIncident, IncidentKey};
use vigil_domain::time::{self, Timestamp};

use crate::ports::{
    CallTreeRepository, Clock, IncidentRepository, Notifier, PersonDirectory, Scheduler, Task,
    TaskHandle,
};

#[derive(Clone, Default)]
pub struct InMemoryIncidentRepo {
    store: Arc<Mutex<Vec<AlarmIncident>>>,
    failing_lookups: Arc<Mutex<HashSet<AlarmType>>>,
}

impl InMemoryIncidentRepo {
    pub fn with(incidents: Vec<AlarmIncident>) -> Self {
        Self {
            store: Arc::new(Mutex::new(incidents)),
            failing_lookups: Arc::default(),
        }
    }

    /// `find_active` fails for every key of `alarm_type`.
    pub fn fail_find_active(&self, alarm_type: AlarmType) {
        self.failing_lookups.lock().unwrap().insert(alarm_type);
    }

    pub fn all(&self) -> Vec<AlarmIncident> {
        self.store.lock().unwrap().clone()
    }
}

impl IncidentRepository for InMemoryIncidentRepo {
    fn find_active(
        &self,
        key: IncidentKey,
    ) -> impl Future<Output = Result<Option<AlarmIncident>, VigilError>> + Send {
        let failing = self.failing_lookups.lock().unwrap().contains(&key.alarm_type);
        let store = self.store.lock().unwrap();
        let result = if failing {
            Err(storage_error("incident lookup failed"))
        } else {
            Ok(store
                .iter()
                .find(|incident| incident.key() == key && incident.is_open())
                .cloned())
        };
        async { result }
    }

    fn save(
        &self,
        incident: AlarmIncident,
    ) -> impl Future<Output = Result<AlarmIncident, VigilError>> + Send {
        let mut store = self.store.lock().unwrap();
        match store.iter_mut().find(|existing| existing.id == incident.id) {
            Some(existing) => *existing = incident.clone(),
            None => store.push(incident.clone()),
        }
        async { Ok(incident) }
    }

    fn list_by_place(
        &self,
        place_id: PlaceId,
    ) -> impl Future<Output = Result<Vec<AlarmIncident>, VigilError>> + Send {
        let store = self.store.lock().unwrap();
        let result: Vec<AlarmIncident> = store
            .iter()
            .rev()
            .filter(|incident| incident.place_id == place_id)
            .cloned()
            .collect();
        async { Ok(result) }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCallTreeRepo {
    store: Arc<Mutex<HashMap<(PlaceId, String), CallTree>>>,
    failing_loads: Arc<Mutex<u32>>,
}

impl InMemoryCallTreeRepo {
    pub fn with(place_id: PlaceId, namespace: &str, tree: CallTree) -> Self {
        let repo = Self::default();
        repo.store
            .lock()
            .unwrap()
            .insert((place_id, namespace.to_string()), tree);
        repo
    }

    /// The next `count` loads fail.
    pub fn fail_next_loads(&self, count: u32) {
        *self.failing_loads.lock().unwrap() = count;
    }
}

impl CallTreeRepository for InMemoryCallTreeRepo {
    fn load(
        &self,
        place_id: PlaceId,
        namespace: &str,
    ) -> impl Future<Output = Result<CallTree, VigilError>> + Send {
        let mut failing = self.failing_loads.lock().unwrap();
        let result = if *failing > 0 {
            *failing -= 1;
            Err(storage_error("call tree load failed"))
        } else {
            let store = self.store.lock().unwrap();
            Ok(store
                .get(&(place_id, namespace.to_string()))
                .cloned()
                .unwrap_or_default())
        };
        async { result }
    }

    fn save(
        &self,
        place_id: PlaceId,
        namespace: &str,
        tree: CallTree,
    ) -> impl Future<Output = Result<CallTree, VigilError>> + Send {
        let mut store = self.store.lock().unwrap();
        store.insert((place_id, namespace.to_string()), tree.clone());
        async { Ok(tree) }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPersonDirectory {
    people: Arc<Mutex<Vec<Person>>>,
    failing: Arc<Mutex<HashSet<PersonId>>>,
}

impl InMemoryPersonDirectory {
    pub fn with(people: Vec<Person>) -> Self {
        Self {
            people: Arc::new(Mutex::new(people)),
            failing: Arc::default(),
        }
    }

    /// Looking up `person` fails from now on.
    pub fn fail_lookup(&self, person: PersonId) {
        self.failing.lock().unwrap().insert(person);
    }
}

impl PersonDirectory for InMemoryPersonDirectory {
    fn find_by_id(
        &self,
        id: PersonId,
    ) -> impl Future<Output = Result<Option<Person>, VigilError>> + Send {
        let result = if self.failing.lock().unwrap().contains(&id) {
            Err(storage_error("person lookup failed"))
        } else {
            let people = self.people.lock().unwrap();
            Ok(people.iter().find(|person| person.id == id).cloned())
        };
        async { result }
    }

    fn list_by_place(
        &self,
        place_id: PlaceId,
    ) -> impl Future<Output = Result<Vec<Person>, VigilError>> + Send {
        let people = self.people.lock().unwrap();
        let result: Vec<Person> = people
            .iter()
            .filter(|person| person.place_id == place_id)
            .cloned()
            .collect();
        async { Ok(result) }
    }
}

fn storage_error(message: &'static str) -> VigilError {
    VigilError::Storage(message.into())
}

pub fn person(place_id: PlaceId, first_name: &str) -> Person {
    Person {
        id: PersonId::new(),
        place_id,
        first_name: first_name.to_string(),
        last_name: "Tester".to_string(),
    }
}

/// One hand-off recorded by [`RecordingNotifier`].
#[derive(Debug, Clone)]
pub struct Sent {
    pub recipient: PersonId,
    pub method: NotificationMethod,
    pub notification: Notification,
    pub handle: Option<DeliveryHandle>,
    pub at: Timestamp,
}

/// Records every hand-off; recipients marked unreachable fail immediately.
#[derive(Clone)]
pub struct RecordingNotifier {
    clock: ManualClock,
    sent: Arc<Mutex<Vec<Sent>>>,
    unreachable: Arc<Mutex<HashSet<PersonId>>>,
}

impl RecordingNotifier {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            sent: Arc::default(),
            unreachable: Arc::default(),
        }
    }

    pub fn make_unreachable(&self, person: PersonId) {
        self.unreachable.lock().unwrap().insert(person);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, person: PersonId) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|sent| sent.recipient == person)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn send(
        &self,
        recipient: &Person,
        method: NotificationMethod,
        notification: &Notification,
    ) -> impl Future<Output = Result<DeliveryHandle, TransientDispatchError>> + Send {
        let mut sent = self.sent.lock().unwrap();
        let reachable = !self.unreachable.lock().unwrap().contains(&recipient.id);
        let handle = reachable.then(|| DeliveryHandle::new(format!("delivery-{}", sent.len())));
        sent.push(Sent {
            recipient: recipient.id,
            method,
            notification: notification.clone(),
            handle: handle.clone(),
            at: self.clock.now(),
        });
        let result = handle.ok_or_else(|| TransientDispatchError::new("recipient unreachable"));
        async { result }
    }
}

#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Arc::new(Mutex::new(time::now())),
        }
    }
}

impl ManualClock {
    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

struct Scheduled {
    due: Timestamp,
    seq: u64,
    handle: TaskHandle,
    task: Task,
}

/// Keeps tasks until the test pops them; time only moves when told to.
#[derive(Clone)]
pub struct ManualScheduler {
    clock: ManualClock,
    tasks: Arc<Mutex<Vec<Scheduled>>>,
    seq: Arc<Mutex<u64>>,
}

impl ManualScheduler {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            tasks: Arc::default(),
            seq: Arc::default(),
        }
    }

    /// Tasks neither started nor cancelled.
    pub fn pending(&self) -> usize {
        let tasks = self.tasks.lock().unwrap();
        tasks.iter().filter(|task| task.handle.is_pending()).count()
    }

    /// Earliest pending task due at or before `deadline`.
    pub fn pop_due(&self, deadline: Timestamp) -> Option<(Timestamp, TaskHandle, Task)> {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|task| task.handle.is_pending());
        let index = tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.due <= deadline)
            .min_by_key(|(_, task)| (task.due, task.seq))
            .map(|(index, _)| index)?;
        let scheduled = tasks.remove(index);
        Some((scheduled.due, scheduled.handle, scheduled.task))
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let mut seq = self.seq.lock().unwrap();
        *seq += 1;
        self.tasks.lock().unwrap().push(Scheduled {
            due: time::add(self.clock.now(), delay),
            seq: *seq,
            handle: handle.clone(),
            task,
        });
        handle
    }
}
