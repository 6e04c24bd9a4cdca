use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use thiserror::Error;

const KEY_PREFIX: &str = "ratelimit:";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("counter call exceeded {0:?}")]
    Timeout(Duration),
}

/// Atomic per-key counter with expiry, shared between processes.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Increment the counter for `key` and return the post-increment value.
    ///
    /// The counter expires `window` after the increment that created it.
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, BackendError>;
}

/// Redis fixed-window counter.
///
/// Each increment runs `SET key 0 EX window NX` and `INCR key` in one
/// `MULTI` block, so a counter never exists without its expiry.
#[derive(Clone)]
pub struct RedisCounter {
    connection: ConnectionManager,
    timeout: Duration,
}

impl RedisCounter {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = redis::Client::open(url)?;
        let connection = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| BackendError::Timeout(timeout))??;
        Ok(Self {
            connection,
            timeout,
        })
    }
}

#[async_trait]
impl CounterBackend for RedisCounter {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<u64, BackendError> {
        let mut connection = self.connection.clone();
        let pipeline = increment_pipeline(&format!("{KEY_PREFIX}{key}"), window);

        let round_trip = async move {
            let (count,): (u64,) = pipeline.query_async(&mut connection).await?;
            Ok::<u64, BackendError>(count)
        };

        tokio::time::timeout(self.timeout, round_trip)
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))?
    }
}

fn increment_pipeline(key: &str, window: Duration) -> redis::Pipeline {
    let mut pipeline = redis::pipe();
    pipeline
        .atomic()
        .cmd("SET")
        .arg(key)
        .arg(0_u64)
        .arg("EX")
        .arg(window.as_secs().max(1))
        .arg("NX")
        .ignore()
        .cmd("INCR")
        .arg(key);
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(pipeline: &redis::Pipeline) -> String {
        String::from_utf8_lossy(&pipeline.get_packed_pipeline()).into_owned()
    }

    #[test]
    fn expiry_is_set_in_the_same_transaction_as_the_increment() {
        let wire = packed(&increment_pipeline("ratelimit:ip:10.0.0.1", Duration::from_secs(60)));

        let multi = wire.find("MULTI").expect("transaction opened");
        let set = wire.find("SET").expect("expiry write");
        let incr = wire.find("INCR").expect("increment");
        let exec = wire.find("EXEC").expect("transaction committed");
        assert!(multi < set && set < incr && incr < exec);
        assert!(wire.contains("\r\nEX\r\n"));
        assert!(wire.contains("\r\n60\r\n"));
        assert!(wire.contains("\r\nNX\r\n"));
    }

    #[test]
    fn sub_second_windows_expire_after_one_second() {
        let wire = packed(&increment_pipeline("ratelimit:ip:10.0.0.2", Duration::from_millis(200)));
        assert!(wire.contains("\r\nEX\r\n$1\r\n1\r\n"));
    }
}
