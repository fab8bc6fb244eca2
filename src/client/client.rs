//! Typed operations over the store's command families.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::connection::StoreConnector;
use super::executor::{CommandExecutor, RemoteExecutor, ReplyShape};
use crate::core::{ResourcePool, RuntimeError};
use crate::store::{Reply, StoreHandle};

fn cmd<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}

fn unexpected(command: &str, reply: &Reply) -> RuntimeError {
    RuntimeError::Protocol(format!("unexpected reply to {command}: {reply:?}"))
}

/// Typed client of the coordination store.
///
/// Cheap to clone; every clone shares one executor.
#[derive(Clone)]
pub struct CoordinationClient {
    executor: Arc<dyn CommandExecutor>,
}

impl std::fmt::Debug for CoordinationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationClient").finish_non_exhaustive()
    }
}

impl CoordinationClient {
    /// Client over any executor.
    pub fn new(executor: impl CommandExecutor + 'static) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    /// Client running commands in-process.
    #[must_use]
    pub fn local(handle: StoreHandle) -> Self {
        Self::new(handle)
    }

    /// Client running commands over pooled TCP connections.
    #[must_use]
    pub fn remote(pool: ResourcePool<StoreConnector>) -> Self {
        Self::new(RemoteExecutor::new(pool))
    }

    /// Run a raw command. Error replies become [`RuntimeError::Backend`].
    ///
    /// # Errors
    ///
    /// Transport failures from the executor, or `Backend` for error replies.
    pub async fn call(&self, args: Vec<String>) -> Result<Reply, RuntimeError> {
        self.call_expecting(args, ReplyShape::Any).await
    }

    async fn call_expecting(&self, args: Vec<String>, expect: ReplyShape) -> Result<Reply, RuntimeError> {
        match self.executor.execute(args, expect).await? {
            Reply::Error(msg) => Err(RuntimeError::Backend(msg)),
            reply => Ok(reply),
        }
    }

    async fn integer(&self, args: Vec<String>) -> Result<i64, RuntimeError> {
        let name = args.first().cloned().unwrap_or_default();
        match self.call_expecting(args, ReplyShape::Integer).await? {
            Reply::Integer(n) => Ok(n),
            other => Err(unexpected(&name, &other)),
        }
    }

    async fn flag(&self, args: Vec<String>) -> Result<bool, RuntimeError> {
        Ok(self.integer(args).await? > 0)
    }

    async fn count(&self, args: Vec<String>) -> Result<u64, RuntimeError> {
        Ok(u64::try_from(self.integer(args).await?).unwrap_or(0))
    }

    async fn optional(&self, args: Vec<String>) -> Result<Option<String>, RuntimeError> {
        let name = args.first().cloned().unwrap_or_default();
        match self.call_expecting(args, ReplyShape::OptionalBulk).await? {
            Reply::Bulk(s) => Ok(Some(s)),
            Reply::Nil => Ok(None),
            other => Err(unexpected(&name, &other)),
        }
    }

    async fn strings(&self, args: Vec<String>) -> Result<Vec<String>, RuntimeError> {
        let name = args.first().cloned().unwrap_or_default();
        match self.call_expecting(args, ReplyShape::Strings).await? {
            Reply::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Reply::Bulk(s) => Ok(s),
                    other => Err(unexpected(&name, &other)),
                })
                .collect(),
            Reply::Nil => Ok(Vec::new()),
            other => Err(unexpected(&name, &other)),
        }
    }

    async fn status(&self, args: Vec<String>) -> Result<(), RuntimeError> {
        let name = args.first().cloned().unwrap_or_default();
        match self.call_expecting(args, ReplyShape::Status).await? {
            Reply::Status(_) => Ok(()),
            other => Err(unexpected(&name, &other)),
        }
    }

    /// Round-trip check.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub async fn ping(&self) -> Result<(), RuntimeError> {
        self.status(cmd(["PING"])).await
    }

    /// Force a snapshot.
    ///
    /// # Errors
    ///
    /// `Backend` when snapshots are disabled or the write failed.
    pub async fn save(&self) -> Result<(), RuntimeError> {
        self.status(cmd(["SAVE"])).await
    }

    // -- scalars ---------------------------------------------------------

    /// `GET key`.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` if `key` is not a string.
    pub async fn get(&self, key: &str) -> Result<Option<String>, RuntimeError> {
        self.optional(cmd(["GET", key])).await
    }

    /// `SET key value`.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), RuntimeError> {
        self.status(cmd(["SET", key, value])).await
    }

    /// `SET key value EX secs`.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub async fn set_ex(&self, key: &str, value: &str, secs: u64) -> Result<(), RuntimeError> {
        self.status(cmd(["SET", key, value, "EX", &secs.to_string()])).await
    }

    /// `DEL key...`; returns how many keys existed.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub async fn del(&self, keys: &[&str]) -> Result<u64, RuntimeError> {
        let mut args = cmd(["DEL"]);
        args.extend(keys.iter().map(|k| (*k).to_string()));
        self.count(args).await
    }

    /// `EXISTS key`.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub async fn exists(&self, key: &str) -> Result<bool, RuntimeError> {
        self.flag(cmd(["EXISTS", key])).await
    }

    /// `EXPIRE key secs`; false when the key does not exist.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub async fn expire(&self, key: &str, secs: i64) -> Result<bool, RuntimeError> {
        self.flag(cmd(["EXPIRE", key, &secs.to_string()])).await
    }

    /// `TTL key`: seconds left, `-1` without expiry, `-2` when missing.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub async fn ttl(&self, key: &str) -> Result<i64, RuntimeError> {
        self.integer(cmd(["TTL", key])).await
    }

    /// `INCR key`.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` if the value is not an integer.
    pub async fn incr(&self, key: &str) -> Result<i64, RuntimeError> {
        self.integer(cmd(["INCR", key])).await
    }

    /// `DECR key`.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` if the value is not an integer.
    pub async fn decr(&self, key: &str) -> Result<i64, RuntimeError> {
        self.integer(cmd(["DECR", key])).await
    }

    /// `INCRBY key delta`.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` if the value is not an integer.
    pub async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, RuntimeError> {
        self.integer(cmd(["INCRBY", key, &delta.to_string()])).await
    }

    // -- lists -----------------------------------------------------------

    /// `LPUSH key value`; returns the new length.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch.
    pub async fn lpush(&self, key: &str, value: &str) -> Result<u64, RuntimeError> {
        self.count(cmd(["LPUSH", key, value])).await
    }

    /// `RPUSH key value`; returns the new length.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch.
    pub async fn rpush(&self, key: &str, value: &str) -> Result<u64, RuntimeError> {
        self.count(cmd(["RPUSH", key, value])).await
    }

    /// `LPOP key`.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch.
    pub async fn lpop(&self, key: &str) -> Result<Option<String>, RuntimeError> {
        self.optional(cmd(["LPOP", key])).await
    }

    /// `RPOP key`.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch.
    pub async fn rpop(&self, key: &str) -> Result<Option<String>, RuntimeError> {
        self.optional(cmd(["RPOP", key])).await
    }

    /// `LRANGE key start stop` (inclusive, negative indices from the end).
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch.
    pub async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, RuntimeError> {
        self.strings(cmd(["LRANGE", key, &start.to_string(), &stop.to_string()]))
            .await
    }

    /// `LLEN key`.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch.
    pub async fn llen(&self, key: &str) -> Result<u64, RuntimeError> {
        self.count(cmd(["LLEN", key])).await
    }

    // -- sets ------------------------------------------------------------

    /// `SADD key member`; true when the member was new.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch.
    pub async fn sadd(&self, key: &str, member: &str) -> Result<bool, RuntimeError> {
        self.flag(cmd(["SADD", key, member])).await
    }

    /// `SMEMBERS key`, sorted.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch.
    pub async fn smembers(&self, key: &str) -> Result<Vec<String>, RuntimeError> {
        self.strings(cmd(["SMEMBERS", key])).await
    }

    /// `SISMEMBER key member`.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch.
    pub async fn sismember(&self, key: &str, member: &str) -> Result<bool, RuntimeError> {
        self.flag(cmd(["SISMEMBER", key, member])).await
    }

    /// `SREM key member`; true when the member was present.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch.
    pub async fn srem(&self, key: &str, member: &str) -> Result<bool, RuntimeError> {
        self.flag(cmd(["SREM", key, member])).await
    }

    // -- hashes ----------------------------------------------------------

    /// `HSET key field value [field value ...]`; returns the number of new fields.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch or empty `fields`.
    pub async fn hset<K, V>(&self, key: &str, fields: &[(K, V)]) -> Result<u64, RuntimeError>
    where
        K: AsRef<str> + Sync,
        V: AsRef<str> + Sync,
    {
        let mut args = cmd(["HSET", key]);
        for (field, value) in fields {
            args.push(field.as_ref().to_string());
            args.push(value.as_ref().to_string());
        }
        self.count(args).await
    }

    /// `HGET key field`.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch.
    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, RuntimeError> {
        self.optional(cmd(["HGET", key, field])).await
    }

    /// `HGETALL key` as a map.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch.
    pub async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, RuntimeError> {
        let flat = self.strings(cmd(["HGETALL", key])).await?;
        if flat.len() % 2 != 0 {
            return Err(RuntimeError::Protocol("HGETALL returned an odd number of items".into()));
        }
        let mut map = BTreeMap::new();
        let mut iter = flat.into_iter();
        while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
            map.insert(field, value);
        }
        Ok(map)
    }

    /// `HDEL key field`; true when the field was present.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` on a type mismatch.
    pub async fn hdel(&self, key: &str, field: &str) -> Result<bool, RuntimeError> {
        self.flag(cmd(["HDEL", key, field])).await
    }

    // -- append-only logs ------------------------------------------------

    /// `APPENDLOG name entry` into today's partition; returns its new size.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` when logging is disabled or the write failed.
    pub async fn append_log(&self, name: &str, entry: &str) -> Result<u64, RuntimeError> {
        self.count(cmd(["APPENDLOG", name, entry])).await
    }

    /// `COUNTLOG name [day]`; `None` means today.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` when logging is disabled.
    pub async fn count_log(&self, name: &str, day: Option<&str>) -> Result<u64, RuntimeError> {
        let args = match day {
            Some(day) => cmd(["COUNTLOG", name, day]),
            None => cmd(["COUNTLOG", name]),
        };
        self.count(args).await
    }

    /// `READLOG name day start limit`.
    ///
    /// # Errors
    ///
    /// Transport failures, or `Backend` when logging is disabled.
    pub async fn read_log(
        &self,
        name: &str,
        day: &str,
        start: usize,
        limit: usize,
    ) -> Result<Vec<String>, RuntimeError> {
        self.strings(cmd(["READLOG", name, day, &start.to_string(), &limit.to_string()]))
            .await
    }

    // -- JSON records ----------------------------------------------------

    /// Store `value` as JSON under `key`.
    ///
    /// # Errors
    ///
    /// `Serialization` or transport failures.
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), RuntimeError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw).await
    }

    /// Read a JSON value stored under `key`.
    ///
    /// # Errors
    ///
    /// `Serialization` for undecodable contents, or transport failures.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RuntimeError> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
