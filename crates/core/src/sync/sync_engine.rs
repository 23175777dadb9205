//! Last-write-wins sync engine.
//!
//! Local state is authoritative between cycles. Mutations schedule a
//! debounced push of the whole serialized snapshot; a periodic pull adopts
//! the remote snapshot wholesale when it differs from local state. The
//! last-known-synced serialization (the baseline) is the coordination
//! point: a mutation only schedules a push when the snapshot drifts from
//! the baseline, and a pull records the fetched serialization as the new
//! baseline before replacing local state, so the replacement event never
//! schedules an echo push.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;

use crate::drains::{Drain, DrainRegistry};
use crate::errors::{Error, Result};
use crate::events::{DomainEvent, DomainEventSink};
use crate::notifications::NotificationGate;
use crate::store::{StateStore, STATE_KEY_SYNC_CODE};

use super::sync_model::{
    parse_snapshot, serialize_snapshot, PullOutcome, PushOutcome, RemoteSnapshotStore, SyncPhase,
    SyncStatus,
};
use super::sync_scheduler::{PULL_INTERVAL_SECS, PUSH_DEBOUNCE_MS};

/// Engine timings. Production code uses the defaults; tests shorten them.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub push_debounce: Duration,
    pub pull_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            push_debounce: Duration::from_millis(PUSH_DEBOUNCE_MS),
            pull_interval: Duration::from_secs(PULL_INTERVAL_SECS),
        }
    }
}

struct EngineShared {
    phase: SyncPhase,
    sync_code: Option<String>,
    baseline: String,
    last_push_at: Option<String>,
    last_pull_at: Option<String>,
    last_error: Option<String>,
}

struct BackgroundTasks {
    push_task: JoinHandle<()>,
    pull_task: JoinHandle<()>,
}

/// Event sink the engine installs on the registry. Each event re-evaluates
/// alerts and, when the snapshot drifted from the baseline, schedules a
/// debounced push.
struct MutationSink {
    registry: Weak<DrainRegistry>,
    gate: Arc<NotificationGate>,
    shared: Arc<Mutex<EngineShared>>,
    mutation_tx: UnboundedSender<()>,
}

impl DomainEventSink for MutationSink {
    fn publish(&self, event: DomainEvent) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let snapshot = registry.snapshot();
        if let Err(err) = self.gate.evaluate(&snapshot) {
            warn!("[Sync] Alert evaluation after {:?} failed: {}", event, err);
        }
        let serialized = match serialize_snapshot(&snapshot) {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!(
                    "[Sync] Snapshot serialization after {:?} failed: {}",
                    event, err
                );
                return;
            }
        };
        {
            let mut shared = self.shared.lock().unwrap();
            if shared.baseline == serialized {
                return;
            }
            if !matches!(shared.phase, SyncPhase::Pushing | SyncPhase::Pulling) {
                shared.phase = SyncPhase::PushPending;
            }
        }
        let _ = self.mutation_tx.send(());
    }
}

/// Cross-device snapshot synchronization over a dumb remote blob store.
pub struct SyncEngine {
    registry: Arc<DrainRegistry>,
    store: Arc<dyn StateStore>,
    remote: Arc<dyn RemoteSnapshotStore>,
    gate: Arc<NotificationGate>,
    options: SyncOptions,
    shared: Arc<Mutex<EngineShared>>,
    mutation_rx: Arc<TokioMutex<UnboundedReceiver<()>>>,
    push_gate: TokioMutex<()>,
    background: TokioMutex<Option<BackgroundTasks>>,
}

impl SyncEngine {
    /// Builds the engine: restores the persisted sync code, seeds the
    /// baseline from current local state, and hooks the registry's event
    /// stream. Background tasks start separately via [`SyncEngine::start`].
    pub fn new(
        registry: Arc<DrainRegistry>,
        store: Arc<dyn StateStore>,
        remote: Arc<dyn RemoteSnapshotStore>,
        gate: Arc<NotificationGate>,
    ) -> Result<Arc<Self>> {
        Self::with_options(registry, store, remote, gate, SyncOptions::default())
    }

    /// [`SyncEngine::new`] with explicit timings.
    pub fn with_options(
        registry: Arc<DrainRegistry>,
        store: Arc<dyn StateStore>,
        remote: Arc<dyn RemoteSnapshotStore>,
        gate: Arc<NotificationGate>,
        options: SyncOptions,
    ) -> Result<Arc<Self>> {
        let sync_code = store.load(STATE_KEY_SYNC_CODE)?;
        let baseline = serialize_snapshot(&registry.snapshot())?;
        let (mutation_tx, mutation_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(EngineShared {
            phase: SyncPhase::Idle,
            sync_code,
            baseline,
            last_push_at: None,
            last_pull_at: None,
            last_error: None,
        }));
        registry.set_event_sink(Arc::new(MutationSink {
            registry: Arc::downgrade(&registry),
            gate: gate.clone(),
            shared: shared.clone(),
            mutation_tx,
        }));
        Ok(Arc::new(Self {
            registry,
            store,
            remote,
            gate,
            options,
            shared,
            mutation_rx: Arc::new(TokioMutex::new(mutation_rx)),
            push_gate: TokioMutex::new(()),
            background: TokioMutex::new(None),
        }))
    }

    /// Current observable engine state.
    pub fn status(&self) -> SyncStatus {
        let shared = self.shared.lock().unwrap();
        SyncStatus {
            phase: shared.phase,
            sync_code: shared.sync_code.clone(),
            last_push_at: shared.last_push_at.clone(),
            last_pull_at: shared.last_pull_at.clone(),
            last_error: shared.last_error.clone(),
        }
    }

    /// The sync code this device is linked to, if any.
    pub fn sync_code(&self) -> Option<String> {
        self.shared.lock().unwrap().sync_code.clone()
    }

    /// Runs one push cycle against current state. The debounce task calls
    /// this when the quiet window closes; it is also callable directly to
    /// flush without waiting.
    pub async fn push_pending(&self) -> Result<PushOutcome> {
        let _push = self.push_gate.lock().await;

        let snapshot = self.registry.snapshot();
        let serialized = serialize_snapshot(&snapshot)?;
        let sync_code = {
            let mut shared = self.shared.lock().unwrap();
            if shared.baseline == serialized {
                if shared.phase == SyncPhase::PushPending {
                    shared.phase = SyncPhase::Idle;
                }
                return Ok(PushOutcome::Unchanged);
            }
            if shared.sync_code.is_none() && snapshot.is_empty() {
                if shared.phase == SyncPhase::PushPending {
                    shared.phase = SyncPhase::Idle;
                }
                return Ok(PushOutcome::SkippedEmpty);
            }
            shared.phase = SyncPhase::Pushing;
            shared.sync_code.clone()
        };

        match sync_code {
            Some(code) => match self.remote.replace(&code, &serialized).await {
                Ok(()) => {
                    self.settle_push(None, serialized);
                    debug!("[Sync] Pushed snapshot to remote {}", code);
                    Ok(PushOutcome::Replaced)
                }
                Err(err) => {
                    self.mark_error(format!("Push failed: {}", err));
                    Err(err.into())
                }
            },
            None => match self.remote.create(&serialized).await {
                Ok(code) => {
                    self.persist_code(&code)?;
                    self.settle_push(Some(code.clone()), serialized);
                    info!("[Sync] Created remote snapshot, sync code {}", code);
                    Ok(PushOutcome::Created { sync_code: code })
                }
                Err(err) => {
                    self.mark_error(format!("Push failed: {}", err));
                    Err(err.into())
                }
            },
        }
    }

    /// Runs one pull cycle. Identical remote content is discarded; anything
    /// else replaces local state wholesale.
    pub async fn pull_cycle(&self) -> Result<PullOutcome> {
        let Some(code) = self.sync_code() else {
            return Ok(PullOutcome::NotLinked);
        };

        {
            let mut shared = self.shared.lock().unwrap();
            if shared.phase == SyncPhase::Idle {
                shared.phase = SyncPhase::Pulling;
            }
        }

        let outcome = self.pull_from(&code).await;
        let mut shared = self.shared.lock().unwrap();
        if shared.phase == SyncPhase::Pulling {
            shared.phase = SyncPhase::Idle;
        }
        match outcome {
            Ok(outcome) => {
                shared.last_pull_at = Some(Utc::now().to_rfc3339());
                Ok(outcome)
            }
            Err(err) => {
                shared.last_error = Some(format!("Pull failed: {}", err));
                drop(shared);
                warn!("[Sync] Pull from {} failed: {}", code, err);
                Err(err)
            }
        }
    }

    async fn pull_from(&self, code: &str) -> Result<PullOutcome> {
        let raw = self.remote.fetch(code).await?;
        let remote_drains = parse_snapshot(&raw)?;
        let fetched = serialize_snapshot(&remote_drains)?;

        if fetched == serialize_snapshot(&self.registry.snapshot())? {
            return Ok(PullOutcome::Unchanged);
        }

        // Baseline first: the replacement event must find it already equal,
        // or the engine would push back what it just pulled.
        self.shared.lock().unwrap().baseline = fetched;
        let drain_count = remote_drains.len();
        self.registry.replace_all(remote_drains)?;
        info!("[Sync] Adopted remote snapshot ({} drains)", drain_count);
        Ok(PullOutcome::Applied { drain_count })
    }

    /// Shares this device's state. Without a code this creates the remote
    /// blob and returns the new sync code; with one it pushes immediately
    /// to the existing blob.
    pub async fn activate_cloud(&self) -> Result<String> {
        let _push = self.push_gate.lock().await;

        let snapshot = self.registry.snapshot();
        let serialized = serialize_snapshot(&snapshot)?;
        let existing = self.sync_code();

        if existing.is_none() && snapshot.is_empty() {
            return Err(Error::invalid_argument("cannot share an empty drain list"));
        }

        self.shared.lock().unwrap().phase = SyncPhase::Pushing;
        match existing {
            Some(code) => match self.remote.replace(&code, &serialized).await {
                Ok(()) => {
                    self.settle_push(None, serialized);
                    info!("[Sync] Manual push to remote {}", code);
                    Ok(code)
                }
                Err(err) => {
                    self.mark_error(format!("Push failed: {}", err));
                    Err(err.into())
                }
            },
            None => match self.remote.create(&serialized).await {
                Ok(code) => {
                    self.persist_code(&code)?;
                    self.settle_push(Some(code.clone()), serialized);
                    info!("[Sync] Cloud sync activated, sync code {}", code);
                    Ok(code)
                }
                Err(err) => {
                    self.mark_error(format!("Activation failed: {}", err));
                    Err(err.into())
                }
            },
        }
    }

    /// Fetches and parses the snapshot behind a sync code without touching
    /// local state, so the caller can inspect it before adopting.
    pub async fn fetch_remote(&self, sync_code: &str) -> Result<Vec<Drain>> {
        let code = sync_code.trim();
        if code.is_empty() {
            return Err(Error::invalid_argument("sync code must not be empty"));
        }
        let raw = self.remote.fetch(code).await?;
        Ok(parse_snapshot(&raw)?)
    }

    /// Links this device to a sync code and replaces local state with the
    /// snapshot previously obtained from [`SyncEngine::fetch_remote`].
    pub fn adopt_remote(&self, sync_code: &str, drains: Vec<Drain>) -> Result<usize> {
        let code = sync_code.trim();
        if code.is_empty() {
            return Err(Error::invalid_argument("sync code must not be empty"));
        }
        let serialized = serialize_snapshot(&drains)?;
        self.store.save(STATE_KEY_SYNC_CODE, code)?;
        {
            let mut shared = self.shared.lock().unwrap();
            shared.sync_code = Some(code.to_string());
            shared.baseline = serialized;
            shared.last_error = None;
        }
        let drain_count = drains.len();
        self.registry.replace_all(drains)?;
        info!("[Sync] Linked to remote {} ({} drains)", code, drain_count);
        Ok(drain_count)
    }

    /// Spawns the debounce and pull loops and evaluates alerts once for the
    /// state present at startup. Idempotent while running.
    pub async fn start(self: &Arc<Self>) {
        let mut background = self.background.lock().await;
        if background.is_some() {
            return;
        }
        if let Err(err) = self.gate.evaluate(&self.registry.snapshot()) {
            warn!("[Sync] Alert evaluation at startup failed: {}", err);
        }
        let push_task = tokio::spawn(Arc::clone(self).run_push_loop());
        let pull_task = tokio::spawn(Arc::clone(self).run_pull_loop());
        *background = Some(BackgroundTasks {
            push_task,
            pull_task,
        });
        info!("[Sync] Background sync started");
    }

    /// Aborts the background loops. A later `start` resumes them.
    pub async fn stop(&self) {
        let mut background = self.background.lock().await;
        if let Some(tasks) = background.take() {
            tasks.push_task.abort();
            tasks.pull_task.abort();
            info!("[Sync] Background sync stopped");
        }
    }

    async fn run_push_loop(self: Arc<Self>) {
        let mut mutations = self.mutation_rx.clone().lock_owned().await;
        while mutations.recv().await.is_some() {
            // Quiet window: every further mutation restarts the clock.
            loop {
                match tokio::time::timeout(self.options.push_debounce, mutations.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }
            // Failures land in status; the next mutation schedules a retry.
            let _ = self.push_pending().await;
        }
    }

    async fn run_pull_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.options.pull_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval fires immediately; the first pull waits one full period.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            // Pull failures are transient; the next tick retries.
            let _ = self.pull_cycle().await;
        }
    }

    fn persist_code(&self, code: &str) -> Result<()> {
        if let Err(err) = self.store.save(STATE_KEY_SYNC_CODE, code) {
            self.mark_error(format!("Failed to persist sync code {}: {}", code, err));
            return Err(err);
        }
        Ok(())
    }

    fn settle_push(&self, new_code: Option<String>, baseline: String) {
        let mut shared = self.shared.lock().unwrap();
        if let Some(code) = new_code {
            shared.sync_code = Some(code);
        }
        shared.baseline = baseline;
        shared.phase = SyncPhase::Idle;
        shared.last_push_at = Some(Utc::now().to_rfc3339());
        shared.last_error = None;
    }

    fn mark_error(&self, message: String) {
        warn!("[Sync] {}", message);
        let mut shared = self.shared.lock().unwrap();
        shared.phase = SyncPhase::Error;
        shared.last_error = Some(message);
    }
}
