use std::{ops::Deref, sync::Arc, time::Duration};

use redis::Client;

use crate::RequotaError;

/// A validated namespace prefix for Redis keys.
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons or braces
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct RedisKey(Arc<str>);

impl RedisKey {
    /// The prefix used when none is configured.
    pub fn default_prefix() -> Self {
        Self(Arc::from("requota"))
    }
}

impl Deref for RedisKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for RedisKey {
    type Error = RequotaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(RequotaError::InvalidKey(
                "Redis key prefix must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(RequotaError::InvalidKey(
                "Redis key prefix must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains([':', '{', '}']) {
            Err(RequotaError::InvalidKey(
                "Redis key prefix must not contain colons or braces".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for RedisKey {
    type Error = RequotaError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// Configuration for the Redis-backed counter store.
///
/// # Requirements
///
/// - **Redis version:** >= 5.0 (scripts call `TIME` before writing)
/// - **Runtime:** Tokio
///
/// # Examples
///
/// ```ignore
/// use std::time::Duration;
/// use requota::{RedisKey, RedisRateLimiterOptions};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
///
/// let options = RedisRateLimiterOptions {
///     prefix: Some(RedisKey::try_from("myapp")?), // Keys: myapp:{<key>}:...
///     command_timeout: Duration::from_millis(250),
///     ..RedisRateLimiterOptions::new(client)
/// };
/// ```
#[derive(Clone, Debug)]
pub struct RedisRateLimiterOptions {
    /// Client used to open the shared connection on first use.
    pub client: Client,

    /// Optional prefix for all Redis keys. Defaults to `"requota"`.
    pub prefix: Option<RedisKey>,

    /// Upper bound on connecting and on each script round-trip.
    ///
    /// Exceeding it yields [`RequotaError::StoreUnavailable`].
    pub command_timeout: Duration,
}

impl RedisRateLimiterOptions {
    /// Options with the default prefix and a one second timeout.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            prefix: None,
            command_timeout: Duration::from_secs(1),
        }
    }
}
