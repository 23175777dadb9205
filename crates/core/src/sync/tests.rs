use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::drains::{CleaningRecord, Drain, DrainCategory, DrainFields, DrainRegistry};
use crate::errors::Error;
use crate::notifications::{LogNotificationSink, NotificationGate};
use crate::store::{MemoryStateStore, StateStore, STATE_KEY_SYNC_CODE};

use super::*;

struct FakeRemote {
    blobs: Mutex<HashMap<String, String>>,
    next_code: AtomicUsize,
    create_calls: AtomicUsize,
    replace_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    fail_create: AtomicBool,
    fail_fetch: AtomicBool,
}

impl FakeRemote {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            blobs: Mutex::new(HashMap::new()),
            next_code: AtomicUsize::new(1),
            create_calls: AtomicUsize::new(0),
            replace_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
            fail_fetch: AtomicBool::new(false),
        })
    }

    fn seed(&self, code: &str, payload: &str) {
        self.blobs
            .lock()
            .unwrap()
            .insert(code.to_string(), payload.to_string());
    }

    fn blob(&self, code: &str) -> Option<String> {
        self.blobs.lock().unwrap().get(code).cloned()
    }

    fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn replaces(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }

    fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSnapshotStore for FakeRemote {
    async fn create(&self, payload: &str) -> RemoteResult<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(RemoteError::unavailable("remote down"));
        }
        let code = format!("code-{}", self.next_code.fetch_add(1, Ordering::SeqCst));
        self.blobs
            .lock()
            .unwrap()
            .insert(code.clone(), payload.to_string());
        Ok(code)
    }

    async fn replace(&self, sync_code: &str, payload: &str) -> RemoteResult<()> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        let mut blobs = self.blobs.lock().unwrap();
        if !blobs.contains_key(sync_code) {
            return Err(RemoteError::code_not_found(sync_code));
        }
        blobs.insert(sync_code.to_string(), payload.to_string());
        Ok(())
    }

    async fn fetch(&self, sync_code: &str) -> RemoteResult<String> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(RemoteError::unavailable("remote down"));
        }
        self.blobs
            .lock()
            .unwrap()
            .get(sync_code)
            .cloned()
            .ok_or_else(|| RemoteError::code_not_found(sync_code))
    }
}

struct Fixture {
    registry: Arc<DrainRegistry>,
    store: Arc<MemoryStateStore>,
    remote: Arc<FakeRemote>,
    engine: Arc<SyncEngine>,
}

fn fast_options() -> SyncOptions {
    SyncOptions {
        push_debounce: Duration::from_millis(100),
        pull_interval: Duration::from_secs(60),
    }
}

fn fixture() -> Fixture {
    fixture_on(Arc::new(MemoryStateStore::new()), FakeRemote::new(), fast_options())
}

fn fixture_on(
    store: Arc<MemoryStateStore>,
    remote: Arc<FakeRemote>,
    options: SyncOptions,
) -> Fixture {
    let registry = Arc::new(DrainRegistry::load(store.clone()).expect("load registry"));
    let gate = Arc::new(
        NotificationGate::load(store.clone(), Arc::new(LogNotificationSink)).expect("load gate"),
    );
    let engine = SyncEngine::with_options(
        registry.clone(),
        store.clone(),
        remote.clone(),
        gate,
        options,
    )
    .expect("build engine");
    Fixture {
        registry,
        store,
        remote,
        engine,
    }
}

fn fields(name: &str, frequency_days: u32) -> DrainFields {
    DrainFields {
        name: name.to_string(),
        location: "Sector 4".to_string(),
        category: DrainCategory::Medium,
        frequency_days,
    }
}

fn remote_drain(id: &str, name: &str) -> Drain {
    Drain {
        id: id.to_string(),
        name: name.to_string(),
        location: "Remote yard".to_string(),
        category: DrainCategory::Small,
        history: vec![CleaningRecord {
            id: format!("{}-r1", id),
            date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            notes: String::new(),
            performer: "crew".to_string(),
        }],
        frequency_days: 30,
    }
}

#[tokio::test]
async fn first_push_creates_a_blob_and_persists_the_code() {
    let f = fixture();
    f.registry.add_drain(fields("Main culvert", 30)).expect("add");

    let outcome = f.engine.push_pending().await.expect("push");
    let PushOutcome::Created { sync_code } = outcome else {
        panic!("expected creation, got {:?}", outcome);
    };

    assert_eq!(
        f.store.load(STATE_KEY_SYNC_CODE).expect("load"),
        Some(sync_code.clone())
    );
    assert_eq!(
        f.remote.blob(&sync_code).expect("blob stored"),
        serialize_snapshot(&f.registry.snapshot()).expect("serialize")
    );

    let status = f.engine.status();
    assert_eq!(status.phase, SyncPhase::Idle);
    assert_eq!(status.sync_code, Some(sync_code));
    assert!(status.last_push_at.is_some());
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn push_without_local_changes_sends_nothing() {
    let f = fixture();
    assert_eq!(
        f.engine.push_pending().await.expect("push"),
        PushOutcome::Unchanged
    );
    assert_eq!(f.remote.creates(), 0);
}

#[tokio::test]
async fn later_pushes_replace_the_existing_blob() {
    let f = fixture();
    f.registry.add_drain(fields("First", 30)).expect("add");
    let PushOutcome::Created { sync_code } = f.engine.push_pending().await.expect("push") else {
        panic!("expected creation");
    };

    f.registry.add_drain(fields("Second", 14)).expect("add");
    assert_eq!(
        f.engine.push_pending().await.expect("push"),
        PushOutcome::Replaced
    );
    assert_eq!(f.remote.creates(), 1);
    assert_eq!(f.remote.replaces(), 1);
    assert!(f.remote.blob(&sync_code).expect("blob").contains("Second"));
}

#[tokio::test]
async fn deleting_everything_before_first_link_skips_creation() {
    let store = Arc::new(MemoryStateStore::new());
    let seeded = DrainRegistry::load(store.clone()).expect("load");
    let drain = seeded.add_drain(fields("Doomed", 30)).expect("add");
    drop(seeded);

    let f = fixture_on(store, FakeRemote::new(), fast_options());
    f.registry.delete_drain(&drain.id).expect("delete");

    assert_eq!(
        f.engine.push_pending().await.expect("push"),
        PushOutcome::SkippedEmpty
    );
    assert_eq!(f.remote.creates(), 0);
    assert_eq!(f.engine.status().phase, SyncPhase::Idle);
}

#[tokio::test]
async fn failed_push_surfaces_in_status_and_retries_on_demand() {
    let f = fixture();
    f.registry.add_drain(fields("Flaky", 30)).expect("add");

    f.remote.fail_create.store(true, Ordering::SeqCst);
    let err = f.engine.push_pending().await.unwrap_err();
    assert!(matches!(err, Error::Remote(RemoteError::Unavailable(_))));

    let status = f.engine.status();
    assert_eq!(status.phase, SyncPhase::Error);
    assert!(status
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("Push failed"));

    f.remote.fail_create.store(false, Ordering::SeqCst);
    assert!(matches!(
        f.engine.push_pending().await.expect("retry"),
        PushOutcome::Created { .. }
    ));
    assert_eq!(f.engine.status().phase, SyncPhase::Idle);
}

#[tokio::test]
async fn activation_rejects_an_empty_registry() {
    let f = fixture();
    let err = f.engine.activate_cloud().await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(f.remote.creates(), 0);
}

#[tokio::test]
async fn activation_creates_once_then_pushes_immediately() {
    let f = fixture();
    f.registry.add_drain(fields("Shared", 30)).expect("add");

    let code = f.engine.activate_cloud().await.expect("activate");
    assert_eq!(f.remote.creates(), 1);

    f.registry.add_drain(fields("Late addition", 7)).expect("add");
    let same = f.engine.activate_cloud().await.expect("sync now");
    assert_eq!(same, code);
    assert_eq!(f.remote.creates(), 1);
    assert_eq!(f.remote.replaces(), 1);
    assert!(f
        .remote
        .blob(&code)
        .expect("blob")
        .contains("Late addition"));
}

#[tokio::test]
async fn fetching_validates_codes_and_payloads() {
    let f = fixture();

    assert!(matches!(
        f.engine.fetch_remote("  ").await.unwrap_err(),
        Error::InvalidArgument(_)
    ));
    assert!(matches!(
        f.engine.fetch_remote("nope").await.unwrap_err(),
        Error::Remote(RemoteError::CodeNotFound(_))
    ));

    f.remote.seed("bad", "{\"not\":\"a list\"}");
    assert!(matches!(
        f.engine.fetch_remote("bad").await.unwrap_err(),
        Error::Remote(RemoteError::Format(_))
    ));
}

#[tokio::test]
async fn adopting_a_remote_snapshot_replaces_local_state_without_echo() {
    let f = fixture();
    f.registry.add_drain(fields("Local only", 30)).expect("add");

    let incoming = vec![remote_drain("rd-1", "Harbour drain")];
    f.remote
        .seed("code-77", &serialize_snapshot(&incoming).expect("serialize"));

    let fetched = f.engine.fetch_remote("code-77").await.expect("fetch");
    assert_eq!(f.engine.adopt_remote("code-77", fetched).expect("adopt"), 1);

    assert_eq!(f.registry.snapshot(), incoming);
    assert_eq!(
        f.store.load(STATE_KEY_SYNC_CODE).expect("load"),
        Some("code-77".to_string())
    );
    assert_eq!(
        f.engine.push_pending().await.expect("push"),
        PushOutcome::Unchanged
    );
    assert_eq!(f.remote.replaces(), 0);
}

#[tokio::test]
async fn pull_without_a_code_reports_not_linked() {
    let f = fixture();
    assert_eq!(
        f.engine.pull_cycle().await.expect("pull"),
        PullOutcome::NotLinked
    );
    assert_eq!(f.remote.fetches(), 0);
}

#[tokio::test]
async fn pull_adopts_differing_remote_state_once() {
    let store = Arc::new(MemoryStateStore::new());
    store.save(STATE_KEY_SYNC_CODE, "code-9").expect("seed code");
    let remote = FakeRemote::new();
    let incoming = vec![remote_drain("rd-9", "Ridge culvert")];
    remote.seed("code-9", &serialize_snapshot(&incoming).expect("serialize"));

    let f = fixture_on(store, remote, fast_options());
    assert_eq!(
        f.engine.pull_cycle().await.expect("pull"),
        PullOutcome::Applied { drain_count: 1 }
    );
    assert_eq!(f.registry.snapshot(), incoming);
    assert!(f.engine.status().last_pull_at.is_some());

    assert_eq!(
        f.engine.pull_cycle().await.expect("repeat"),
        PullOutcome::Unchanged
    );
}

#[tokio::test]
async fn push_then_pull_round_trip_is_stable() {
    let f = fixture();
    f.registry.add_drain(fields("Stable", 30)).expect("add");
    let before = f.registry.snapshot();

    assert!(matches!(
        f.engine.push_pending().await.expect("push"),
        PushOutcome::Created { .. }
    ));
    assert_eq!(
        f.engine.pull_cycle().await.expect("pull"),
        PullOutcome::Unchanged
    );
    assert_eq!(f.registry.snapshot(), before);
}

#[tokio::test]
async fn pull_failures_are_recorded_but_not_fatal() {
    let store = Arc::new(MemoryStateStore::new());
    store.save(STATE_KEY_SYNC_CODE, "code-5").expect("seed code");
    let remote = FakeRemote::new();
    remote.seed("code-5", "[]");
    let f = fixture_on(store, remote, fast_options());

    f.remote.fail_fetch.store(true, Ordering::SeqCst);
    assert!(f.engine.pull_cycle().await.is_err());
    let status = f.engine.status();
    assert_eq!(status.phase, SyncPhase::Idle);
    assert!(status
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("Pull failed"));

    f.remote.fail_fetch.store(false, Ordering::SeqCst);
    assert_eq!(
        f.engine.pull_cycle().await.expect("pull"),
        PullOutcome::Unchanged
    );
}

#[tokio::test]
async fn remote_formatting_differences_do_not_cause_adoption() {
    let f = fixture();
    f.registry.add_drain(fields("Pretty", 30)).expect("add");
    let PushOutcome::Created { sync_code } = f.engine.push_pending().await.expect("push") else {
        panic!("expected creation");
    };

    let pretty = serde_json::to_string_pretty(&f.registry.snapshot()).expect("pretty");
    f.remote.seed(&sync_code, &pretty);

    assert_eq!(
        f.engine.pull_cycle().await.expect("pull"),
        PullOutcome::Unchanged
    );
}

#[tokio::test]
async fn rapid_mutations_coalesce_into_one_push() {
    let f = fixture();
    f.engine.start().await;

    f.registry.add_drain(fields("One", 30)).expect("add");
    f.registry.add_drain(fields("Two", 14)).expect("add");
    f.registry.add_drain(fields("Three", 7)).expect("add");

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(f.remote.creates(), 1);
    assert_eq!(f.remote.replaces(), 0);
    let code = f.engine.sync_code().expect("linked");
    assert_eq!(
        f.remote.blob(&code).expect("blob"),
        serialize_snapshot(&f.registry.snapshot()).expect("serialize")
    );
    f.engine.stop().await;
}

#[tokio::test]
async fn mutations_that_cancel_out_push_nothing() {
    let f = fixture();
    f.engine.start().await;

    let drain = f.registry.add_drain(fields("Fleeting", 30)).expect("add");
    f.registry.delete_drain(&drain.id).expect("delete");

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(f.remote.creates(), 0);
    assert_eq!(f.remote.replaces(), 0);
    assert_eq!(f.engine.status().phase, SyncPhase::Idle);
    f.engine.stop().await;
}

#[tokio::test]
async fn background_pull_adopts_remote_updates_without_echo() {
    let store = Arc::new(MemoryStateStore::new());
    store.save(STATE_KEY_SYNC_CODE, "code-3").expect("seed code");
    let remote = FakeRemote::new();
    let incoming = vec![remote_drain("rd-3", "Quarry drain")];
    remote.seed("code-3", &serialize_snapshot(&incoming).expect("serialize"));

    let f = fixture_on(
        store,
        remote,
        SyncOptions {
            push_debounce: Duration::from_millis(50),
            pull_interval: Duration::from_millis(100),
        },
    );
    f.engine.start().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(f.registry.snapshot(), incoming);
    assert_eq!(f.remote.creates(), 0);
    assert_eq!(f.remote.replaces(), 0);
    f.engine.stop().await;
}

#[tokio::test]
async fn background_sync_survives_a_restart() {
    let f = fixture();
    f.engine.start().await;

    f.registry
        .add_drain(fields("Before restart", 30))
        .expect("add");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(f.remote.creates(), 1);

    f.engine.stop().await;
    f.engine.start().await;

    f.registry
        .add_drain(fields("After restart", 14))
        .expect("add");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(f.remote.replaces(), 1);
    f.engine.stop().await;
}

#[tokio::test]
async fn two_devices_exchange_state_through_the_shared_remote() {
    let remote = FakeRemote::new();
    let device_a = fixture_on(
        Arc::new(MemoryStateStore::new()),
        remote.clone(),
        fast_options(),
    );
    let device_b = fixture_on(
        Arc::new(MemoryStateStore::new()),
        remote.clone(),
        fast_options(),
    );

    let drain = device_a
        .registry
        .add_drain(fields("Shared culvert", 30))
        .expect("add");
    let code = device_a.engine.activate_cloud().await.expect("activate");

    let preview = device_b.engine.fetch_remote(&code).await.expect("fetch");
    assert_eq!(preview.len(), 1);
    device_b.engine.adopt_remote(&code, preview).expect("adopt");
    assert_eq!(device_b.registry.snapshot(), device_a.registry.snapshot());

    device_a
        .registry
        .record_cleaning(&drain.id, "cleared silt", "crew A")
        .expect("record");
    assert_eq!(
        device_a.engine.push_pending().await.expect("push"),
        PushOutcome::Replaced
    );

    assert_eq!(
        device_b.engine.pull_cycle().await.expect("pull"),
        PullOutcome::Applied { drain_count: 1 }
    );
    let adopted = device_b.registry.snapshot();
    assert_eq!(adopted, device_a.registry.snapshot());
    assert_eq!(adopted[0].history.len(), 1);
    assert_eq!(adopted[0].history[0].notes, "cleared silt");
}
