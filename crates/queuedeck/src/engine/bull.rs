//! Adapter for Bull (v3) queues stored in Redis.
//!
//! Key layout under `<prefix>:<queue name>`:
//! - `wait`, `active`, `paused` lists (newest job at the head)
//! - `delayed`, `failed`, `completed` sorted sets
//! - `meta-paused` flag, present while the queue is paused
//! - `<job id>` job hash, `<job id>:lock` worker lock, `<job id>:logs`
//!
//! Writes that touch more than one key run as Lua scripts so Redis applies
//! them atomically with respect to workers.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, Script};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::{EngineKey, JobState, NativeCounts, QueueDescriptor};
use crate::engine::{
    default_job_opts, ConnectionLease, ConnectionRegistry, EngineJob, QueueConnector,
    QueueControlPort,
};
use crate::error::{QueueError, Result};

pub const DEFAULT_PREFIX: &str = "bull";

const ADD_JOB: &str = r#"
-- KEYS: job, wait, paused, meta-paused
-- ARGV: id, name, data, opts, timestamp
if redis.call("EXISTS", KEYS[1]) == 1 then
  return 0
end
redis.call("HMSET", KEYS[1],
  "name", ARGV[2], "data", ARGV[3], "opts", ARGV[4], "timestamp", ARGV[5],
  "delay", "0", "priority", "0", "attemptsMade", "0")
local target = KEYS[2]
if redis.call("EXISTS", KEYS[4]) == 1 then
  target = KEYS[3]
end
redis.call("LPUSH", target, ARGV[1])
return 1
"#;

const REMOVE_JOB: &str = r#"
-- KEYS: job, lock, active, wait, paused, delayed, failed, completed, priority, logs
-- ARGV: id
-- Ids share the namespace with the queue's own keys, only a hash is a job.
if redis.call("TYPE", KEYS[1]).ok ~= "hash" then
  return 0
end
if redis.call("EXISTS", KEYS[2]) == 1 then
  return -1
end
for i = 3, 5 do
  redis.call("LREM", KEYS[i], 0, ARGV[1])
end
for i = 6, 9 do
  redis.call("ZREM", KEYS[i], ARGV[1])
end
redis.call("DEL", KEYS[1], KEYS[10])
return 1
"#;

const RETRY_JOB: &str = r#"
-- KEYS: job, lock, failed, wait, paused, meta-paused
-- ARGV: id
if redis.call("TYPE", KEYS[1]).ok ~= "hash" then
  return 0
end
if redis.call("EXISTS", KEYS[2]) == 1 then
  return -1
end
if redis.call("ZREM", KEYS[3], ARGV[1]) == 0 then
  return -2
end
redis.call("HDEL", KEYS[1], "finishedOn", "processedOn", "failedReason")
local target = KEYS[4]
if redis.call("EXISTS", KEYS[6]) == 1 then
  target = KEYS[5]
end
redis.call("LPUSH", target, ARGV[1])
return 1
"#;

const SET_PAUSED: &str = r#"
-- KEYS: wait, paused, meta-paused
-- ARGV: "pause" | "resume"
local src, dst
if ARGV[1] == "pause" then
  src, dst = KEYS[1], KEYS[2]
  redis.call("SET", KEYS[3], 1)
else
  src, dst = KEYS[2], KEYS[1]
  redis.call("DEL", KEYS[3])
end
if redis.call("EXISTS", src) == 1 then
  if redis.call("EXISTS", dst) == 0 then
    redis.call("RENAME", src, dst)
  else
    while redis.call("RPOPLPUSH", src, dst) do end
  end
end
return 1
"#;

const JOB_STATE: &str = r#"
-- KEYS: completed, failed, delayed, active, wait, paused
-- ARGV: id
local id = ARGV[1]
if redis.call("ZSCORE", KEYS[1], id) then return "completed" end
if redis.call("ZSCORE", KEYS[2], id) then return "failed" end
if redis.call("ZSCORE", KEYS[3], id) then return "delayed" end
local function in_list(key)
  for _, v in ipairs(redis.call("LRANGE", key, 0, -1)) do
    if v == id then return true end
  end
  return false
end
if in_list(KEYS[4]) then return "active" end
if in_list(KEYS[5]) then return "waiting" end
if in_list(KEYS[6]) then return "paused" end
return false
"#;

pub struct BullScripts {
    add_job: Script,
    remove_job: Script,
    retry_job: Script,
    set_paused: Script,
    job_state: Script,
}

impl BullScripts {
    pub fn load() -> Self {
        Self {
            add_job: Script::new(ADD_JOB),
            remove_job: Script::new(REMOVE_JOB),
            retry_job: Script::new(RETRY_JOB),
            set_paused: Script::new(SET_PAUSED),
            job_state: Script::new(JOB_STATE),
        }
    }
}

#[derive(Debug, Clone)]
struct BullKeys {
    base: String,
}

impl BullKeys {
    fn new(prefix: &str, queue: &str) -> Self {
        Self {
            base: format!("{prefix}:{queue}"),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.base, suffix)
    }

    fn job(&self, id: &str) -> String {
        self.key(id)
    }

    fn lock(&self, id: &str) -> String {
        format!("{}:{}:lock", self.base, id)
    }

    fn logs(&self, id: &str) -> String {
        format!("{}:{}:logs", self.base, id)
    }

    fn for_state(&self, state: JobState) -> String {
        match state {
            JobState::Waiting => self.key("wait"),
            JobState::Paused => self.key("paused"),
            JobState::Active => self.key("active"),
            JobState::Delayed => self.key("delayed"),
            JobState::Failed => self.key("failed"),
            JobState::Completed => self.key("completed"),
        }
    }
}

/// Opens [`BullAdapter`]s over pooled Redis connections.
#[derive(Clone)]
pub struct BullConnector {
    registry: ConnectionRegistry<ConnectionManager>,
    scripts: Arc<BullScripts>,
    prefix: String,
    connect_timeout: Duration,
}

impl BullConnector {
    pub fn new(
        registry: ConnectionRegistry<ConnectionManager>,
        prefix: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            scripts: Arc::new(BullScripts::load()),
            prefix: prefix.into(),
            connect_timeout,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry<ConnectionManager> {
        &self.registry
    }
}

async fn connect(key: &EngineKey, timeout: Duration) -> Result<ConnectionManager> {
    let info = ConnectionInfo {
        addr: ConnectionAddr::Tcp(key.host.clone(), key.port),
        redis: RedisConnectionInfo::default(),
    };
    let client = Client::open(info).map_err(|e| QueueError::engine(key.to_string(), e))?;

    match tokio::time::timeout(timeout, ConnectionManager::new(client)).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(QueueError::engine(key.to_string(), e)),
        Err(_) => Err(QueueError::engine(
            key.to_string(),
            format!("connect timed out after {}ms", timeout.as_millis()),
        )),
    }
}

#[async_trait]
impl QueueConnector for BullConnector {
    async fn open(&self, queue: &QueueDescriptor) -> Result<Box<dyn QueueControlPort>> {
        let key = queue.engine_key()?;
        let timeout = self.connect_timeout;
        let lease = self
            .registry
            .acquire(&key, || connect(&key, timeout))
            .await?;

        Ok(Box::new(BullAdapter {
            queue: queue.clone(),
            keys: BullKeys::new(&self.prefix, &queue.name),
            scripts: Arc::clone(&self.scripts),
            lease,
        }))
    }
}

pub struct BullAdapter {
    queue: QueueDescriptor,
    keys: BullKeys,
    scripts: Arc<BullScripts>,
    lease: ConnectionLease<ConnectionManager>,
}

impl BullAdapter {
    fn conn(&self) -> ConnectionManager {
        self.lease.connection().clone()
    }

    fn fail(&self, e: impl ToString) -> QueueError {
        QueueError::engine(self.queue.endpoint(), e)
    }

    async fn load_hashes(&self, ids: &[String]) -> Result<Vec<EngineJob>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in ids {
            pipe.hgetall(self.keys.job(id));
        }

        let mut con = self.conn();
        let hashes: Vec<HashMap<String, String>> =
            pipe.query_async(&mut con).await.map_err(|e| self.fail(e))?;

        let mut out = Vec::with_capacity(ids.len());
        for (id, hash) in ids.iter().zip(hashes) {
            // Removed between the range read and the hash read.
            if hash.is_empty() {
                continue;
            }
            out.push(parse_job_hash(id, hash).map_err(|e| self.fail(e))?);
        }
        Ok(out)
    }
}

#[async_trait]
impl QueueControlPort for BullAdapter {
    fn descriptor(&self) -> &QueueDescriptor {
        &self.queue
    }

    async fn is_paused(&self) -> Result<bool> {
        let mut con = self.conn();
        con.exists(self.keys.key("meta-paused"))
            .await
            .map_err(|e| self.fail(e))
    }

    async fn native_counts(&self) -> Result<NativeCounts> {
        let mut con = self.conn();
        let (wait, paused, active, delayed, failed, completed): (u64, u64, u64, u64, u64, u64) =
            redis::pipe()
                .llen(self.keys.key("wait"))
                .llen(self.keys.key("paused"))
                .llen(self.keys.key("active"))
                .zcard(self.keys.key("delayed"))
                .zcard(self.keys.key("failed"))
                .zcard(self.keys.key("completed"))
                .query_async(&mut con)
                .await
                .map_err(|e| self.fail(e))?;

        Ok(NativeCounts {
            waiting: wait + paused,
            active,
            delayed,
            failed,
            completed,
        })
    }

    async fn fetch_jobs(&self, state: JobState, start: u64, end: u64) -> Result<Vec<EngineJob>> {
        let key = self.keys.for_state(state);
        // Redis reads negative indices from the tail.
        let Ok(start) = isize::try_from(start) else {
            return Ok(Vec::new());
        };
        let end = isize::try_from(end).unwrap_or(isize::MAX);
        let mut con = self.conn();

        let ids: Vec<String> = match state {
            JobState::Waiting | JobState::Paused | JobState::Active => {
                con.lrange(key, start, end).await
            }
            JobState::Delayed | JobState::Failed | JobState::Completed => {
                con.zrevrange(key, start, end).await
            }
        }
        .map_err(|e| self.fail(e))?;

        self.load_hashes(&ids).await
    }

    async fn fetch_job(&self, id: &str) -> Result<Option<(EngineJob, Option<JobState>)>> {
        let mut con = self.conn();
        let job_key = self.keys.job(id);
        let kind: String = redis::cmd("TYPE")
            .arg(&job_key)
            .query_async(&mut con)
            .await
            .map_err(|e| self.fail(e))?;
        if kind != "hash" {
            return Ok(None);
        }

        let hash: HashMap<String, String> =
            con.hgetall(&job_key).await.map_err(|e| self.fail(e))?;
        if hash.is_empty() {
            return Ok(None);
        }
        let record = parse_job_hash(id, hash).map_err(|e| self.fail(e))?;

        let mut invocation = self.scripts.job_state.key(self.keys.key("completed"));
        invocation
            .key(self.keys.key("failed"))
            .key(self.keys.key("delayed"))
            .key(self.keys.key("active"))
            .key(self.keys.key("wait"))
            .key(self.keys.key("paused"))
            .arg(id);
        let state: Option<String> = invocation
            .invoke_async(&mut con)
            .await
            .map_err(|e| self.fail(e))?;

        let state = state.and_then(|s| s.parse::<JobState>().ok());
        Ok(Some((record, state)))
    }

    async fn enqueue(&self, id: &str, name: &str, payload: Value) -> Result<()> {
        let timestamp = Utc::now().timestamp_millis();
        let data = serde_json::to_string(&payload).map_err(|e| self.fail(e))?;
        let opts = default_job_opts(id, timestamp).to_string();

        let mut invocation = self.scripts.add_job.key(self.keys.job(id));
        invocation
            .key(self.keys.key("wait"))
            .key(self.keys.key("paused"))
            .key(self.keys.key("meta-paused"))
            .arg(id)
            .arg(name)
            .arg(data)
            .arg(opts)
            .arg(timestamp);

        let mut con = self.conn();
        let added: i64 = invocation
            .invoke_async(&mut con)
            .await
            .map_err(|e| self.fail(e))?;

        debug!(queue = %self.queue.name, job_id = id, added, "enqueued job");
        Ok(())
    }

    async fn remove_job(&self, id: &str) -> Result<bool> {
        let mut invocation = self.scripts.remove_job.key(self.keys.job(id));
        invocation
            .key(self.keys.lock(id))
            .key(self.keys.key("active"))
            .key(self.keys.key("wait"))
            .key(self.keys.key("paused"))
            .key(self.keys.key("delayed"))
            .key(self.keys.key("failed"))
            .key(self.keys.key("completed"))
            .key(self.keys.key("priority"))
            .key(self.keys.logs(id))
            .arg(id);

        let mut con = self.conn();
        let code: i64 = invocation
            .invoke_async(&mut con)
            .await
            .map_err(|e| self.fail(e))?;

        if code == -1 {
            debug!(
                queue = %self.queue.name,
                job_id = id,
                "job is locked by a worker, not removed"
            );
        }
        Ok(code == 1)
    }

    async fn retry_job(&self, id: &str) -> Result<bool> {
        let mut invocation = self.scripts.retry_job.key(self.keys.job(id));
        invocation
            .key(self.keys.lock(id))
            .key(self.keys.key("failed"))
            .key(self.keys.key("wait"))
            .key(self.keys.key("paused"))
            .key(self.keys.key("meta-paused"))
            .arg(id);

        let mut con = self.conn();
        let code: i64 = invocation
            .invoke_async(&mut con)
            .await
            .map_err(|e| self.fail(e))?;

        if code < 0 {
            debug!(queue = %self.queue.name, job_id = id, code, "job not retryable");
        }
        Ok(code == 1)
    }

    async fn set_paused(&self, paused: bool) -> Result<()> {
        let mut invocation = self.scripts.set_paused.key(self.keys.key("wait"));
        invocation
            .key(self.keys.key("paused"))
            .key(self.keys.key("meta-paused"))
            .arg(if paused { "pause" } else { "resume" });

        let mut con = self.conn();
        let _: i64 = invocation
            .invoke_async(&mut con)
            .await
            .map_err(|e| self.fail(e))?;
        Ok(())
    }

    fn close(self: Box<Self>) {
        debug!(queue = %self.queue.name, "closing bull adapter");
    }
}

/// Decodes a Bull job hash. Numeric fields are stored as decimal strings and
/// `data`, `opts`, `stacktrace`, `returnvalue`, `progress` as JSON text.
pub fn parse_job_hash(
    id: &str,
    mut hash: HashMap<String, String>,
) -> std::result::Result<EngineJob, String> {
    type Field<T> = std::result::Result<Option<T>, String>;

    let json_field = |hash: &mut HashMap<String, String>, field: &str| -> Field<Value> {
        match hash.remove(field) {
            Some(raw) if !raw.is_empty() => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| format!("job {id}: bad {field} json: {e}")),
            _ => Ok(None),
        }
    };
    let int_field = |hash: &mut HashMap<String, String>, field: &str| -> Field<i64> {
        match hash.remove(field) {
            Some(raw) if !raw.is_empty() => raw
                .parse::<f64>()
                .map(|n| Some(n as i64))
                .map_err(|e| format!("job {id}: bad {field}: {e}")),
            _ => Ok(None),
        }
    };

    let data = json_field(&mut hash, "data")?.unwrap_or(Value::Null);
    let opts = json_field(&mut hash, "opts")?
        .unwrap_or_else(|| Value::Object(Default::default()));
    let progress = json_field(&mut hash, "progress")?.unwrap_or_else(|| Value::from(0));
    let returnvalue = json_field(&mut hash, "returnvalue")?.unwrap_or(Value::Null);
    let stacktrace = match json_field(&mut hash, "stacktrace")? {
        Some(v) => Some(
            serde_json::from_value::<Vec<String>>(v)
                .map_err(|e| format!("job {id}: bad stacktrace: {e}"))?,
        ),
        None => None,
    };

    Ok(EngineJob {
        id: id.to_string(),
        name: hash.remove("name").unwrap_or_default(),
        data,
        opts,
        progress,
        delay: int_field(&mut hash, "delay")?.unwrap_or(0),
        timestamp: int_field(&mut hash, "timestamp")?.unwrap_or(0),
        attempts_made: int_field(&mut hash, "attemptsMade")?.unwrap_or(0).max(0) as u32,
        failed_reason: hash.remove("failedReason").filter(|r| !r.is_empty()),
        stacktrace,
        returnvalue,
        finished_on: int_field(&mut hash, "finishedOn")?,
        processed_on: int_field(&mut hash, "processedOn")?,
    })
}
