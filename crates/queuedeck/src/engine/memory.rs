//! In-process engine with the same list/set semantics as the Bull layout.
//! Backs the test suite and local demos; every adapter on the same
//! `(host, port, name)` sees the same engine.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::{EngineKey, JobState, NativeCounts, QueueDescriptor};
use crate::engine::{
    default_job_opts, ConnectionLease, ConnectionRegistry, EngineJob, QueueConnector,
    QueueControlPort, DEFAULT_JOB_NAME,
};
use crate::error::{QueueError, Result};

#[derive(Default)]
struct EngineState {
    jobs: HashMap<String, EngineJob>,
    // Newest first, like LPUSH'd lists and ZREVRANGE'd sets.
    lists: HashMap<JobState, VecDeque<String>>,
    paused: bool,
    locks: HashSet<String>,
    unreachable: bool,
}

impl EngineState {
    fn list(&mut self, state: JobState) -> &mut VecDeque<String> {
        self.lists.entry(state).or_default()
    }

    fn len(&self, state: JobState) -> u64 {
        self.lists.get(&state).map(|l| l.len() as u64).unwrap_or(0)
    }

    fn state_of(&self, id: &str) -> Option<JobState> {
        JobState::ALL
            .into_iter()
            .find(|s| self.lists.get(s).is_some_and(|l| l.iter().any(|j| j == id)))
    }

    fn pending_list(&self) -> JobState {
        if self.paused {
            JobState::Paused
        } else {
            JobState::Waiting
        }
    }
}

#[derive(Default)]
pub struct MemoryEngine {
    state: Mutex<EngineState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_state<T>(&self, endpoint: &str, f: impl FnOnce(&mut EngineState) -> T) -> Result<T> {
        let mut state = self.lock();
        if state.unreachable {
            return Err(QueueError::engine(endpoint, "connection refused"));
        }
        Ok(f(&mut state))
    }

    /// Makes every following call fail as if the engine were down.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().unreachable = !reachable;
    }

    pub fn is_reachable(&self) -> bool {
        !self.lock().unreachable
    }

    /// Places `record` at the head of `state`'s list.
    pub fn insert(&self, state: JobState, record: EngineJob) {
        let mut s = self.lock();
        let id = record.id.clone();
        s.jobs.insert(id.clone(), record);
        s.list(state).push_front(id);
    }

    /// Seeds a job with `payload` in `state` and returns its id.
    pub fn seed(&self, state: JobState, payload: Value) -> String {
        let id = uuid::Uuid::now_v7().to_string();
        let now = Utc::now().timestamp_millis();
        let mut record = EngineJob::new(
            id.clone(),
            DEFAULT_JOB_NAME,
            payload,
            default_job_opts(&id, now),
            now,
        );

        match state {
            JobState::Active => record.processed_on = Some(now),
            JobState::Completed => {
                record.processed_on = Some(now);
                record.finished_on = Some(now);
                record.attempts_made = 1;
            }
            JobState::Failed => {
                record.processed_on = Some(now);
                record.finished_on = Some(now);
                record.attempts_made = 1;
                record.failed_reason = Some("job failed".to_string());
                record.stacktrace = Some(vec!["Error: job failed".to_string()]);
            }
            _ => {}
        }

        self.insert(state, record);
        id
    }

    /// Marks `id` as held by a worker.
    pub fn lock_job(&self, id: &str) {
        self.lock().locks.insert(id.to_string());
    }

    pub fn job(&self, id: &str) -> Option<EngineJob> {
        self.lock().jobs.get(id).cloned()
    }

    pub fn state_of(&self, id: &str) -> Option<JobState> {
        self.lock().state_of(id)
    }

    pub fn ids_in(&self, state: JobState) -> Vec<String> {
        self.lock()
            .lists
            .get(&state)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn job_count(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn paused(&self) -> bool {
        self.lock().paused
    }
}

/// Opens [`MemoryAdapter`]s, creating one engine per `(host, port, name)` on demand.
#[derive(Clone)]
pub struct MemoryConnector {
    engines: Arc<Mutex<HashMap<EngineKey, Arc<MemoryEngine>>>>,
    registry: ConnectionRegistry<Arc<MemoryEngine>>,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            engines: Arc::new(Mutex::new(HashMap::new())),
            registry: ConnectionRegistry::startup(),
        }
    }

    pub fn engine(&self, queue: &QueueDescriptor) -> Result<Arc<MemoryEngine>> {
        Ok(self.engine_for(&queue.engine_key()?))
    }

    fn engine_for(&self, key: &EngineKey) -> Arc<MemoryEngine> {
        let mut engines = self
            .engines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(engines.entry(key.clone()).or_default())
    }

    pub fn registry(&self) -> &ConnectionRegistry<Arc<MemoryEngine>> {
        &self.registry
    }
}

#[async_trait]
impl QueueConnector for MemoryConnector {
    async fn open(&self, queue: &QueueDescriptor) -> Result<Box<dyn QueueControlPort>> {
        let key = queue.engine_key()?;
        let engine = self.engine_for(&key);

        let lease = self
            .registry
            .acquire(&key, || async {
                if engine.is_reachable() {
                    Ok(Arc::clone(&engine))
                } else {
                    Err(QueueError::engine(key.to_string(), "connection refused"))
                }
            })
            .await?;

        Ok(Box::new(MemoryAdapter {
            queue: queue.clone(),
            lease,
        }))
    }
}

pub struct MemoryAdapter {
    queue: QueueDescriptor,
    lease: ConnectionLease<Arc<MemoryEngine>>,
}

impl MemoryAdapter {
    fn with_state<T>(&self, f: impl FnOnce(&mut EngineState) -> T) -> Result<T> {
        self.lease
            .connection()
            .with_state(&self.queue.endpoint(), f)
    }
}

#[async_trait]
impl QueueControlPort for MemoryAdapter {
    fn descriptor(&self) -> &QueueDescriptor {
        &self.queue
    }

    async fn is_paused(&self) -> Result<bool> {
        self.with_state(|s| s.paused)
    }

    async fn native_counts(&self) -> Result<NativeCounts> {
        self.with_state(|s| NativeCounts {
            waiting: s.len(JobState::Waiting) + s.len(JobState::Paused),
            active: s.len(JobState::Active),
            delayed: s.len(JobState::Delayed),
            failed: s.len(JobState::Failed),
            completed: s.len(JobState::Completed),
        })
    }

    async fn fetch_jobs(&self, state: JobState, start: u64, end: u64) -> Result<Vec<EngineJob>> {
        self.with_state(|s| {
            let Some(list) = s.lists.get(&state) else {
                return Vec::new();
            };
            let skip = usize::try_from(start).unwrap_or(usize::MAX);
            let take = usize::try_from(end.saturating_sub(start))
                .map_or(usize::MAX, |n| n.saturating_add(1));
            list.iter()
                .skip(skip)
                .take(take)
                .filter_map(|id| s.jobs.get(id).cloned())
                .collect()
        })
    }

    async fn fetch_job(&self, id: &str) -> Result<Option<(EngineJob, Option<JobState>)>> {
        self.with_state(|s| s.jobs.get(id).cloned().map(|j| (j, s.state_of(id))))
    }

    async fn enqueue(&self, id: &str, name: &str, payload: Value) -> Result<()> {
        self.with_state(|s| {
            if s.jobs.contains_key(id) {
                return;
            }
            let now = Utc::now().timestamp_millis();
            let record = EngineJob::new(id, name, payload, default_job_opts(id, now), now);
            s.jobs.insert(id.to_string(), record);
            let target = s.pending_list();
            s.list(target).push_front(id.to_string());
        })
    }

    async fn remove_job(&self, id: &str) -> Result<bool> {
        self.with_state(|s| {
            if !s.jobs.contains_key(id) || s.locks.contains(id) {
                return false;
            }
            for list in s.lists.values_mut() {
                list.retain(|j| j != id);
            }
            s.jobs.remove(id);
            true
        })
    }

    async fn retry_job(&self, id: &str) -> Result<bool> {
        self.with_state(|s| {
            if !s.jobs.contains_key(id) || s.locks.contains(id) {
                return false;
            }
            let failed = s.list(JobState::Failed);
            let Some(pos) = failed.iter().position(|j| j == id) else {
                return false;
            };
            failed.remove(pos);

            if let Some(job) = s.jobs.get_mut(id) {
                job.failed_reason = None;
                job.finished_on = None;
                job.processed_on = None;
            }
            let target = s.pending_list();
            s.list(target).push_front(id.to_string());
            true
        })
    }

    async fn set_paused(&self, paused: bool) -> Result<()> {
        self.with_state(|s| {
            s.paused = paused;
            let (src, dst) = if paused {
                (JobState::Waiting, JobState::Paused)
            } else {
                (JobState::Paused, JobState::Waiting)
            };
            let moved: Vec<String> = s.list(src).drain(..).collect();
            let dst = s.list(dst);
            for id in moved.into_iter().rev() {
                dst.push_front(id);
            }
        })
    }

    fn close(self: Box<Self>) {}
}
