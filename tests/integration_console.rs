use lead_console::{
    latency, seed, views, Channel, Event, EventBus, LeadEngine, LeadPatch, LeadQuery, MemoryStore,
    RestoreOutcome, SqliteStore,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A view subtree that never touches the persisted keys directly: it keeps a
/// snapshot of derived state and refreshes it through the engine whenever the
/// bus signals a change.
struct LeadTableView {
    snapshot: Arc<Mutex<Vec<lead_console::Lead>>>,
    reloads: Arc<AtomicUsize>,
}

impl LeadTableView {
    fn attach(engine: Arc<LeadEngine>, bus: &EventBus) -> Self {
        let snapshot = Arc::new(Mutex::new(engine.reload()));
        let reloads = Arc::new(AtomicUsize::new(0));
        let view = Self {
            snapshot: snapshot.clone(),
            reloads: reloads.clone(),
        };
        let _subscription = bus.subscribe(Channel::LeadsChanged, move |_| {
            *snapshot.lock().expect("snapshot lock") = engine.reload();
            reloads.fetch_add(1, Ordering::SeqCst);
        });
        view
    }

    fn ids(&self) -> HashSet<i64> {
        self.snapshot
            .lock()
            .expect("snapshot lock")
            .iter()
            .map(|lead| lead.id)
            .collect()
    }
}

struct ClientsTableView {
    snapshot: Arc<Mutex<Vec<lead_console::Client>>>,
}

impl ClientsTableView {
    fn attach(engine: Arc<LeadEngine>, bus: &EventBus) -> Self {
        let snapshot = Arc::new(Mutex::new(
            engine.clients().expect("initial client load"),
        ));
        let view = Self {
            snapshot: snapshot.clone(),
        };
        let _subscription = bus.subscribe(Channel::ClientsChanged, move |_| {
            *snapshot.lock().expect("snapshot lock") =
                engine.clients().expect("client reload");
        });
        view
    }

    fn ids(&self) -> HashSet<i64> {
        self.snapshot
            .lock()
            .expect("snapshot lock")
            .iter()
            .map(|client| client.id)
            .collect()
    }
}

#[test]
fn independent_views_converge_through_the_event_bus() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SqliteStore::open(&dir.path().join("console.db")).expect("store"));
    let bus = EventBus::new();
    let engine = Arc::new(LeadEngine::new(store, bus.clone()));

    let lead_view = LeadTableView::attach(engine.clone(), &bus);
    let clients_view = ClientsTableView::attach(engine.clone(), &bus);
    let deleted_ids = Arc::new(Mutex::new(Vec::new()));
    let _deleted = {
        let deleted_ids = deleted_ids.clone();
        bus.subscribe(Channel::ClientDeleted, move |event| {
            if let Event::ClientDeleted { client_id } = event {
                deleted_ids.lock().expect("deleted lock").push(*client_id);
            }
        })
    };

    assert!(lead_view.ids().contains(&1));
    assert!(clients_view.ids().is_empty());

    let target = seed::lead_by_id(1).expect("seed lead").clone();
    engine.convert(&target).expect("convert");

    assert!(!lead_view.ids().contains(&1));
    assert!(clients_view.ids().contains(&1));
    assert!(lead_view.ids().is_disjoint(&clients_view.ids()));

    let clients = engine.clients().expect("clients");
    let outcome = engine.delete_client(&clients[0]).expect("delete");
    assert_eq!(outcome, RestoreOutcome::Restored);

    assert!(lead_view.ids().contains(&1));
    assert!(clients_view.ids().is_empty());
    assert_eq!(*deleted_ids.lock().expect("deleted lock"), vec![1]);
}

#[test]
fn partition_survives_an_engine_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("console.db");

    {
        let store = Arc::new(SqliteStore::open(&path).expect("store"));
        let engine = LeadEngine::new(store, EventBus::new());
        engine.reload();
        engine
            .convert(&seed::lead_by_id(2).expect("seed lead").clone())
            .expect("convert");
    }

    let store = Arc::new(SqliteStore::open(&path).expect("reopen store"));
    let engine = LeadEngine::new(store, EventBus::new());
    let leads = engine.reload();
    let clients = engine.clients().expect("clients");

    assert!(leads.iter().all(|lead| lead.id != 2));
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].id, 2);
}

#[test]
fn rapid_coalesced_notifications_are_idempotent_for_views() {
    let store = Arc::new(MemoryStore::new());
    let bus = EventBus::new();
    let engine = Arc::new(LeadEngine::new(store, bus.clone()));
    let view = LeadTableView::attach(engine.clone(), &bus);

    let patch = LeadPatch {
        email: Some("burst@test.co".to_string()),
        ..LeadPatch::default()
    };
    for _ in 0..5 {
        engine.update(1, &patch).expect("update");
    }

    assert_eq!(view.reloads.load(Ordering::SeqCst), 5);
    let snapshot = view.snapshot.lock().expect("snapshot lock").clone();
    let updated = snapshot.iter().find(|lead| lead.id == 1).expect("lead 1");
    assert_eq!(updated.email, "burst@test.co");
    assert_eq!(snapshot, engine.reload());
}

#[test]
fn filters_persist_under_the_reserved_key_without_affecting_state() {
    let store = Arc::new(MemoryStore::new());
    let engine = LeadEngine::new(store, EventBus::new());
    let before = engine.reload();

    let query = LeadQuery {
        search: Some("globex".to_string()),
        status: None,
        sort_order: views::SortOrder::Desc,
    };
    assert!(engine.save_filters(&query));
    assert_eq!(engine.reload(), before);

    let visible = views::filter_and_sort(&before, &query);
    assert!(visible.iter().all(|lead| lead.company == "Globex"));
}

#[tokio::test]
async fn a_reload_interleaving_a_slow_save_is_tolerated() {
    let store = Arc::new(MemoryStore::new());
    let bus = EventBus::new();
    let engine = Arc::new(LeadEngine::new(store, bus.clone()));
    engine.reload();

    // The save flow suspends at the simulated call; another component
    // reloads while it is parked, then the save lands on top.
    let save = {
        let engine = engine.clone();
        tokio::spawn(async move {
            latency::simulate_api_call(Duration::from_millis(20), 0.0)
                .await
                .expect("simulated call");
            engine.update(
                4,
                &LeadPatch {
                    email: Some("late@test.co".to_string()),
                    ..LeadPatch::default()
                },
            )
        })
    };

    engine.reload();
    let leads = save.await.expect("join").expect("update");
    let updated = leads.iter().find(|lead| lead.id == 4).expect("lead 4");
    assert_eq!(updated.email, "late@test.co");
    assert_eq!(engine.reload(), leads);
}
