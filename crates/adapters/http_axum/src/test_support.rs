//! In-memory ports wired into a real coordinator for the router tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vigil_app::coordinator::{AlarmCoordinator, EscalationSettings};
use vigil_app::ports::{
    CallTreeRepository, IncidentRepository, Notifier, PersonDirectory, Scheduler, SystemClock,
    Task, TaskHandle,
};
use vigil_app::services::call_tree_service::CallTreeService;
use vigil_domain::alarm::{ALARM_CALL_TREE, AlarmRegistry, AlarmSettings};
use vigil_domain::call_tree::{CallTree, CallTreeEntry, Person};
use vigil_domain::error::{TransientDispatchError, VigilError};
use vigil_domain::escalation::{DeliveryHandle, Notification, NotificationMethod};
use vigil_domain::id::{PersonId, PlaceId};
use vigil_domain::incident::{AlarmIncident, IncidentKey};

use crate::state::AppState;

#[derive(Clone, Default)]
pub struct Incidents(Arc<Mutex<Vec<AlarmIncident>>>);

impl IncidentRepository for Incidents {
    fn find_active(
        &self,
        key: IncidentKey,
    ) -> impl Future<Output = Result<Option<AlarmIncident>, VigilError>> + Send {
        let found = self
            .0
            .lock()
            .unwrap()
            .iter()
            .find(|incident| incident.key() == key && incident.is_open())
            .cloned();
        async { Ok(found) }
    }

    fn save(
        &self,
        incident: AlarmIncident,
    ) -> impl Future<Output = Result<AlarmIncident, VigilError>> + Send {
        let mut store = self.0.lock().unwrap();
        store.retain(|existing| existing.id != incident.id);
        store.push(incident.clone());
        async { Ok(incident) }
    }

    fn list_by_place(
        &self,
        place_id: PlaceId,
    ) -> impl Future<Output = Result<Vec<AlarmIncident>, VigilError>> + Send {
        let listed: Vec<AlarmIncident> = self
            .0
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|incident| incident.place_id == place_id)
            .cloned()
            .collect();
        async { Ok(listed) }
    }
}

#[derive(Clone, Default)]
pub struct CallTrees(Arc<Mutex<HashMap<(PlaceId, String), CallTree>>>);

impl CallTreeRepository for CallTrees {
    fn load(
        &self,
        place_id: PlaceId,
        namespace: &str,
    ) -> impl Future<Output = Result<CallTree, VigilError>> + Send {
        let tree = self
            .0
            .lock()
            .unwrap()
            .get(&(place_id, namespace.to_string()))
            .cloned()
            .unwrap_or_default();
        async { Ok(tree) }
    }

    fn save(
        &self,
        place_id: PlaceId,
        namespace: &str,
        tree: CallTree,
    ) -> impl Future<Output = Result<CallTree, VigilError>> + Send {
        self.0
            .lock()
            .unwrap()
            .insert((place_id, namespace.to_string()), tree.clone());
        async { Ok(tree) }
    }
}

#[derive(Clone, Default)]
pub struct People(Arc<Vec<Person>>);

impl PersonDirectory for People {
    fn find_by_id(
        &self,
        id: PersonId,
    ) -> impl Future<Output = Result<Option<Person>, VigilError>> + Send {
        let found = self.0.iter().find(|person| person.id == id).cloned();
        async { Ok(found) }
    }

    fn list_by_place(
        &self,
        place_id: PlaceId,
    ) -> impl Future<Output = Result<Vec<Person>, VigilError>> + Send {
        let listed: Vec<Person> = self
            .0
            .iter()
            .filter(|person| person.place_id == place_id)
            .cloned()
            .collect();
        async { Ok(listed) }
    }
}

/// Accepts every notification and counts them.
#[derive(Clone, Default)]
pub struct CountingNotifier(Arc<AtomicUsize>);

impl CountingNotifier {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl Notifier for CountingNotifier {
    fn send(
        &self,
        _recipient: &Person,
        _method: NotificationMethod,
        _notification: &Notification,
    ) -> impl Future<Output = Result<DeliveryHandle, TransientDispatchError>> + Send {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        async move { Ok(DeliveryHandle::new(format!("test-{n}"))) }
    }
}

/// Never runs anything; the router tests do not advance time.
#[derive(Clone, Default)]
pub struct IdleScheduler;

impl Scheduler for IdleScheduler {
    fn schedule(&self, _delay: Duration, _task: Task) -> TaskHandle {
        TaskHandle::new()
    }
}

pub type TestState = AppState<Incidents, CallTrees, People, CountingNotifier, IdleScheduler, SystemClock>;

pub struct TestApp {
    pub state: TestState,
    pub notifier: CountingNotifier,
    pub place_id: PlaceId,
    /// Only entry of the place's alarm call tree.
    pub person: Person,
}

pub fn test_app() -> TestApp {
    let place_id = PlaceId::new();
    let person = Person {
        id: PersonId::new(),
        place_id,
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
    };
    let trees = CallTrees::default();
    trees.0.lock().unwrap().insert(
        (place_id, ALARM_CALL_TREE.to_string()),
        CallTree::new(vec![CallTreeEntry::new(person.id, true, 0)]).unwrap(),
    );
    let notifier = CountingNotifier::default();
    let (coordinator, _inbox) = AlarmCoordinator::new(
        Arc::new(AlarmRegistry::standard(&AlarmSettings::default()).unwrap()),
        Incidents::default(),
        CallTreeService::new(trees, People(Arc::new(vec![person.clone()]))),
        notifier.clone(),
        IdleScheduler,
        SystemClock,
        EscalationSettings::default(),
    );
    TestApp {
        state: AppState::new(coordinator),
        notifier,
        place_id,
        person,
    }
}
