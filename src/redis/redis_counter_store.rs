use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::{Client, FromRedisValue, Script, aio::ConnectionManager};

use crate::{
    CounterStore, DistributedRateLimiterFactory, RedisKey, RedisRateLimiterOptions, RequotaError,
    Rule, WindowIncrement, distributed::common::window_base_key,
};

/// Walks the buckets still inside the window, newest first, in batches small
/// enough for `unpack`. Expects `now`, `base_key`, `window_seconds`,
/// `bucket_width` and `current` to be defined, and calls `visit(batch)`.
const WINDOW_WALK: &str = r#"
local function walk_window(visit)
    local batch = {}
    local start = current

    while start >= 0 and start + window_seconds > now do
        batch[#batch + 1] = base_key .. ":" .. start
        if #batch == 512 then
            visit(batch)
            batch = {}
        end
        start = start - bucket_width
    end

    if #batch > 0 then
        visit(batch)
    end
end
"#;

const PRELUDE: &str = r#"
local time_array = redis.call("TIME")
local now = tonumber(time_array[1])

local base_key = KEYS[1]
local window_seconds = tonumber(ARGV[1])
local bucket_width = tonumber(ARGV[2])

local current = now - (now % bucket_width)
"#;

const INCREMENT_AND_SUM: &str = r#"
local weight = tonumber(ARGV[3])
local bucket_key = base_key .. ":" .. current

redis.call("INCRBY", bucket_key, weight)
redis.call("EXPIRE", bucket_key, window_seconds + bucket_width)

local total = 0
walk_window(function(batch)
    local values = redis.call("MGET", unpack(batch))
    for i = 1, #values do
        total = total + (tonumber(values[i]) or 0)
    end
end)

return total
"#;

const SUM: &str = r#"
local total = 0
walk_window(function(batch)
    local values = redis.call("MGET", unpack(batch))
    for i = 1, #values do
        total = total + (tonumber(values[i]) or 0)
    end
end)

return total
"#;

const RESET: &str = r#"
local removed = 0
walk_window(function(batch)
    removed = removed + redis.call("DEL", unpack(batch))
end)

return removed
"#;

/// [`CounterStore`] executing each window evaluation as one Lua script on Redis.
///
/// Bucket timestamps come from the server's `TIME`, so every process sharing
/// the store agrees on bucket boundaries regardless of local clock skew.
///
/// # Shared connection
///
/// A single [`ConnectionManager`] is opened on first use and shared by every
/// limiter of the owning factory. Opening happens without holding a lock: two
/// near-simultaneous first calls may both connect, in which case the first
/// one published is kept and the other is dropped (and with it, its socket).
/// Avoiding that would put a lock on every call for no gain in correctness.
pub struct RedisCounterStore {
    client: Client,
    prefix: RedisKey,
    command_timeout: Duration,
    connection: RwLock<Option<ConnectionManager>>,
    closed: AtomicBool,
    increment_script: Script,
    sum_script: Script,
    reset_script: Script,
}

impl RedisCounterStore {
    /// Create a store. No connection is opened until the first evaluation.
    pub fn new(options: RedisRateLimiterOptions) -> Self {
        let script = |body: &str| Script::new(&format!("{PRELUDE}{WINDOW_WALK}{body}"));

        Self {
            client: options.client,
            prefix: options.prefix.unwrap_or_else(RedisKey::default_prefix),
            command_timeout: options.command_timeout,
            connection: RwLock::new(None),
            closed: AtomicBool::new(false),
            increment_script: script(INCREMENT_AND_SUM),
            sum_script: script(SUM),
            reset_script: script(RESET),
        }
    }

    /// Whether the shared connection has been opened.
    pub fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    async fn connection(&self) -> Result<ConnectionManager, RequotaError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RequotaError::ClosedFactory);
        }

        let existing = self.connection.read().clone();
        if let Some(connection) = existing {
            return Ok(connection);
        }

        let opened = tokio::time::timeout(self.command_timeout, self.client.get_connection_manager())
            .await
            .map_err(|_| {
                RequotaError::StoreUnavailable(format!(
                    "connecting timed out after {:?}",
                    self.command_timeout
                ))
            })??;

        let mut slot = self.connection.write();

        if self.closed.load(Ordering::Acquire) {
            return Err(RequotaError::ClosedFactory);
        }

        match slot.as_ref() {
            Some(published) => {
                tracing::debug!("requota.redis.connection.discarded, lost open race");
                Ok(published.clone())
            }
            None => {
                tracing::info!(prefix = &*self.prefix, "requota.redis.connection.opened");
                *slot = Some(opened.clone());
                Ok(opened)
            }
        }
    } // end method connection

    async fn invoke<T: FromRedisValue>(
        &self,
        script: &Script,
        base_key: &str,
        args: &[u64],
    ) -> Result<T, RequotaError> {
        let mut connection = self.connection().await?;

        let mut invocation = script.key(base_key);
        for arg in args {
            invocation.arg(*arg);
        }

        match tokio::time::timeout(self.command_timeout, invocation.invoke_async(&mut connection))
            .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                tracing::warn!(base_key, error = ?err, "requota.redis.script.error");
                Err(err.into())
            }
            Err(_) => {
                tracing::warn!(base_key, "requota.redis.script.timeout");
                Err(RequotaError::StoreUnavailable(format!(
                    "no reply within {:?}",
                    self.command_timeout
                )))
            }
        }
    } // end method invoke
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_and_sum(
        &self,
        increment: WindowIncrement<'_>,
    ) -> Result<u64, RequotaError> {
        let rule = increment.rule;
        let base_key = window_base_key(&self.prefix, increment.key, rule);

        self.invoke(
            &self.increment_script,
            &base_key,
            &[
                rule.window_seconds(),
                rule.bucket_width_seconds(),
                increment.weight,
            ],
        )
        .await
    }

    async fn sum(&self, key: &str, rule: &Rule) -> Result<u64, RequotaError> {
        let base_key = window_base_key(&self.prefix, key, rule);

        self.invoke(
            &self.sum_script,
            &base_key,
            &[rule.window_seconds(), rule.bucket_width_seconds()],
        )
        .await
    }

    async fn reset(&self, key: &str, rule: &Rule) -> Result<bool, RequotaError> {
        let base_key = window_base_key(&self.prefix, key, rule);

        let removed: u64 = self
            .invoke(
                &self.reset_script,
                &base_key,
                &[rule.window_seconds(), rule.bucket_width_seconds()],
            )
            .await?;

        Ok(removed > 0)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);

        if self.connection.write().take().is_some() {
            tracing::info!(prefix = &*self.prefix, "requota.redis.connection.closed");
        }
    }
}

/// Distributed factory backed by Redis.
pub type RedisRateLimiterFactory = DistributedRateLimiterFactory<RedisCounterStore>;

impl DistributedRateLimiterFactory<RedisCounterStore> {
    /// Create a Redis-backed factory. The connection opens lazily on first use.
    pub fn from_options(options: RedisRateLimiterOptions) -> Self {
        Self::new(RedisCounterStore::new(options))
    }
}
