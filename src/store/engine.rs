//! Command execution against the in-memory keyspace.
//!
//! The keyspace is owned by exactly one task (see [`super::server`]); every
//! command runs to completion before the next begins, so nothing here locks.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use tracing::warn;

use super::applog::AppendLog;
use super::protocol::Reply;
use super::value::{Entry, Value};
use crate::util::day_partition;

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INTEGER: &str = "value is not an integer or out of range";

/// The authoritative in-memory map plus the append-only log sink.
#[derive(Debug, Default)]
pub struct Keyspace {
    entries: HashMap<String, Entry>,
    logs: Option<AppendLog>,
}

fn arity(name: &str) -> Reply {
    Reply::err(format!("wrong number of arguments for '{}' command", name.to_ascii_lowercase()))
}

fn parse_i64(raw: &str) -> Result<i64, Reply> {
    raw.parse::<i64>().map_err(|_| Reply::err(NOT_INTEGER))
}

/// Redis-style inclusive range with negative indices counted from the end.
fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len_i = i64::try_from(len).ok()?;
    let start = if start < 0 { (len_i + start).max(0) } else { start };
    let stop = if stop < 0 { len_i + stop } else { stop.min(len_i - 1) };
    if len == 0 || start > stop || start >= len_i {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}

impl Keyspace {
    /// Empty keyspace without log support.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyspace seeded from a snapshot.
    #[must_use]
    pub fn from_entries(entries: HashMap<String, Entry>) -> Self {
        Self {
            entries,
            logs: None,
        }
    }

    /// Enable the APPENDLOG/COUNTLOG/READLOG family.
    #[must_use]
    pub fn with_logs(mut self, logs: AppendLog) -> Self {
        self.logs = Some(logs);
        self
    }

    /// Number of live keys at `now_ms`.
    #[must_use]
    pub fn len(&self, now_ms: u64) -> usize {
        self.entries.values().filter(|e| !e.is_expired(now_ms)).count()
    }

    /// Whether no live key exists at `now_ms`.
    #[must_use]
    pub fn is_empty(&self, now_ms: u64) -> bool {
        self.len(now_ms) == 0
    }

    /// Drop expired keys and return the live map for snapshotting.
    pub fn purge_expired(&mut self, now_ms: u64) -> &HashMap<String, Entry> {
        self.entries.retain(|_, e| !e.is_expired(now_ms));
        &self.entries
    }

    fn live(&mut self, key: &str, now_ms: u64) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|e| e.is_expired(now_ms)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(|e| e.value.is_empty_aggregate()) {
            self.entries.remove(key);
        }
    }

    /// Execute one command. Never fails: errors become error replies.
    pub fn execute(&mut self, args: &[String], now_ms: u64) -> Reply {
        let Some(name) = args.first() else {
            return Reply::err("empty command");
        };
        let cmd = name.to_ascii_uppercase();
        let rest = &args[1..];
        let result = match cmd.as_str() {
            "PING" => Ok(self.ping(rest)),
            "GET" => self.get(rest, now_ms),
            "SET" => self.set(rest, now_ms),
            "DEL" => Ok(self.del(rest, now_ms)),
            "EXISTS" => Ok(self.exists(rest, now_ms)),
            "EXPIRE" => self.expire(rest, now_ms),
            "TTL" => self.ttl(rest, now_ms),
            "INCR" => self.incr_by(rest, 1, 1, now_ms),
            "DECR" => self.incr_by(rest, 1, -1, now_ms),
            "INCRBY" => self.incr_by(rest, 2, 1, now_ms),
            "LPUSH" => self.push(rest, true, now_ms),
            "RPUSH" => self.push(rest, false, now_ms),
            "LPOP" => self.pop(rest, true, now_ms),
            "RPOP" => self.pop(rest, false, now_ms),
            "LRANGE" => self.lrange(rest, now_ms),
            "LLEN" => self.llen(rest, now_ms),
            "SADD" => self.sadd(rest, now_ms),
            "SMEMBERS" => self.smembers(rest, now_ms),
            "SISMEMBER" => self.sismember(rest, now_ms),
            "SREM" => self.srem(rest, now_ms),
            "HSET" => self.hset(rest, now_ms),
            "HGET" => self.hget(rest, now_ms),
            "HGETALL" => self.hgetall(rest, now_ms),
            "HDEL" => self.hdel(rest, now_ms),
            "APPENDLOG" => self.append_log(rest),
            "COUNTLOG" => self.count_log(rest),
            "READLOG" => self.read_log(rest),
            _ => Err(Reply::err(format!("unknown command '{name}'"))),
        };
        result.unwrap_or_else(|e| e)
    }

    fn ping(&self, rest: &[String]) -> Reply {
        rest.first()
            .map_or_else(|| Reply::Status("PONG".into()), |msg| Reply::Bulk(msg.clone()))
    }

    fn get(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let [key] = rest else { return Err(arity("get")) };
        match self.live(key, now_ms) {
            None => Ok(Reply::Nil),
            Some(Entry { value: Value::String(s), .. }) => Ok(Reply::Bulk(s.clone())),
            Some(_) => Err(Reply::Error(WRONGTYPE.into())),
        }
    }

    fn set(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let (key, value, options) = match rest {
            [key, value, options @ ..] => (key, value, options),
            _ => return Err(arity("set")),
        };
        let expires_at_ms = match options {
            [] => None,
            [unit, amount] => {
                let amount = parse_i64(amount)?;
                if amount <= 0 {
                    return Err(Reply::err("invalid expire time in 'set' command"));
                }
                let amount = amount.unsigned_abs();
                match unit.to_ascii_uppercase().as_str() {
                    "EX" => Some(now_ms.saturating_add(amount.saturating_mul(1000))),
                    "PX" => Some(now_ms.saturating_add(amount)),
                    _ => return Err(Reply::err("syntax error")),
                }
            }
            _ => return Err(Reply::err("syntax error")),
        };
        self.entries.insert(
            key.clone(),
            Entry {
                value: Value::String(value.clone()),
                expires_at_ms,
            },
        );
        Ok(Reply::ok())
    }

    fn del(&mut self, rest: &[String], now_ms: u64) -> Reply {
        if rest.is_empty() {
            return arity("del");
        }
        let removed = rest
            .iter()
            .filter(|key| {
                self.entries
                    .remove(key.as_str())
                    .is_some_and(|e| !e.is_expired(now_ms))
            })
            .count();
        Reply::Integer(i64::try_from(removed).unwrap_or(i64::MAX))
    }

    fn exists(&mut self, rest: &[String], now_ms: u64) -> Reply {
        if rest.is_empty() {
            return arity("exists");
        }
        let found = rest.iter().filter(|k| self.live(k, now_ms).is_some()).count();
        Reply::Integer(i64::try_from(found).unwrap_or(i64::MAX))
    }

    fn expire(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let [key, secs] = rest else { return Err(arity("expire")) };
        let secs = parse_i64(secs)?;
        if self.live(key, now_ms).is_none() {
            return Ok(Reply::Integer(0));
        }
        if secs <= 0 {
            self.entries.remove(key);
            return Ok(Reply::Integer(1));
        }
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expires_at_ms = Some(now_ms.saturating_add(secs.unsigned_abs().saturating_mul(1000)));
        }
        Ok(Reply::Integer(1))
    }

    fn ttl(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let [key] = rest else { return Err(arity("ttl")) };
        Ok(match self.live(key, now_ms) {
            None => Reply::Integer(-2),
            Some(Entry { expires_at_ms: None, .. }) => Reply::Integer(-1),
            Some(Entry { expires_at_ms: Some(at), .. }) => {
                let remaining_ms = at.saturating_sub(now_ms);
                Reply::Integer(i64::try_from(remaining_ms.div_ceil(1000)).unwrap_or(i64::MAX))
            }
        })
    }

    fn incr_by(
        &mut self,
        rest: &[String],
        expected_args: usize,
        sign: i64,
        now_ms: u64,
    ) -> Result<Reply, Reply> {
        if rest.len() != expected_args {
            return Err(arity(if expected_args == 1 { "incr" } else { "incrby" }));
        }
        let key = &rest[0];
        let delta = if expected_args == 2 { parse_i64(&rest[1])? } else { 1 };
        let delta = delta.checked_mul(sign).ok_or_else(|| Reply::err(NOT_INTEGER))?;
        let current = match self.live(key, now_ms) {
            None => 0,
            Some(Entry { value: Value::String(s), .. }) => parse_i64(s)?,
            Some(_) => return Err(Reply::Error(WRONGTYPE.into())),
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| Reply::err("increment or decrement would overflow"))?;
        match self.entries.get_mut(key) {
            Some(entry) => entry.value = Value::String(next.to_string()),
            None => {
                self.entries
                    .insert(key.clone(), Entry::new(Value::String(next.to_string())));
            }
        }
        Ok(Reply::Integer(next))
    }

    fn list_mut(&mut self, key: &str, now_ms: u64, create: bool) -> Result<Option<&mut VecDeque<String>>, Reply> {
        if self.live(key, now_ms).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries
                .insert(key.to_string(), Entry::new(Value::List(VecDeque::new())));
        }
        match self.entries.get_mut(key) {
            Some(Entry { value: Value::List(list), .. }) => Ok(Some(list)),
            Some(_) => Err(Reply::Error(WRONGTYPE.into())),
            None => Ok(None),
        }
    }

    fn push(&mut self, rest: &[String], front: bool, now_ms: u64) -> Result<Reply, Reply> {
        let [key, values @ ..] = rest else {
            return Err(arity(if front { "lpush" } else { "rpush" }));
        };
        if values.is_empty() {
            return Err(arity(if front { "lpush" } else { "rpush" }));
        }
        let Some(list) = self.list_mut(key, now_ms, true)? else {
            return Ok(Reply::Integer(0));
        };
        for value in values {
            if front {
                list.push_front(value.clone());
            } else {
                list.push_back(value.clone());
            }
        }
        Ok(Reply::Integer(i64::try_from(list.len()).unwrap_or(i64::MAX)))
    }

    fn pop(&mut self, rest: &[String], front: bool, now_ms: u64) -> Result<Reply, Reply> {
        let [key] = rest else {
            return Err(arity(if front { "lpop" } else { "rpop" }));
        };
        let popped = match self.list_mut(key, now_ms, false)? {
            Some(list) if front => list.pop_front(),
            Some(list) => list.pop_back(),
            None => None,
        };
        self.drop_if_empty(key);
        Ok(Reply::from_option(popped))
    }

    fn lrange(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let [key, start, stop] = rest else { return Err(arity("lrange")) };
        let (start, stop) = (parse_i64(start)?, parse_i64(stop)?);
        let Some(list) = self.list_mut(key, now_ms, false)? else {
            return Ok(Reply::Array(Vec::new()));
        };
        Ok(match normalize_range(start, stop, list.len()) {
            Some((from, to)) => Reply::bulk_array(list.range(from..=to).cloned()),
            None => Reply::Array(Vec::new()),
        })
    }

    fn llen(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let [key] = rest else { return Err(arity("llen")) };
        let len = self.list_mut(key, now_ms, false)?.map_or(0, |l| l.len());
        Ok(Reply::Integer(i64::try_from(len).unwrap_or(i64::MAX)))
    }

    fn set_mut(&mut self, key: &str, now_ms: u64, create: bool) -> Result<Option<&mut BTreeSet<String>>, Reply> {
        if self.live(key, now_ms).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries
                .insert(key.to_string(), Entry::new(Value::Set(BTreeSet::new())));
        }
        match self.entries.get_mut(key) {
            Some(Entry { value: Value::Set(set), .. }) => Ok(Some(set)),
            Some(_) => Err(Reply::Error(WRONGTYPE.into())),
            None => Ok(None),
        }
    }

    fn sadd(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let [key, members @ ..] = rest else { return Err(arity("sadd")) };
        if members.is_empty() {
            return Err(arity("sadd"));
        }
        let Some(set) = self.set_mut(key, now_ms, true)? else {
            return Ok(Reply::Integer(0));
        };
        let added = members.iter().filter(|m| set.insert((*m).clone())).count();
        Ok(Reply::Integer(i64::try_from(added).unwrap_or(i64::MAX)))
    }

    fn smembers(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let [key] = rest else { return Err(arity("smembers")) };
        Ok(match self.set_mut(key, now_ms, false)? {
            Some(set) => Reply::bulk_array(set.iter().cloned()),
            None => Reply::Array(Vec::new()),
        })
    }

    fn sismember(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let [key, member] = rest else { return Err(arity("sismember")) };
        let found = self
            .set_mut(key, now_ms, false)?
            .is_some_and(|set| set.contains(member));
        Ok(Reply::Integer(i64::from(found)))
    }

    fn srem(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let [key, members @ ..] = rest else { return Err(arity("srem")) };
        if members.is_empty() {
            return Err(arity("srem"));
        }
        let removed = match self.set_mut(key, now_ms, false)? {
            Some(set) => members.iter().filter(|m| set.remove(m.as_str())).count(),
            None => 0,
        };
        self.drop_if_empty(key);
        Ok(Reply::Integer(i64::try_from(removed).unwrap_or(i64::MAX)))
    }

    fn hash_mut(&mut self, key: &str, now_ms: u64, create: bool) -> Result<Option<&mut BTreeMap<String, String>>, Reply> {
        if self.live(key, now_ms).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries
                .insert(key.to_string(), Entry::new(Value::Hash(BTreeMap::new())));
        }
        match self.entries.get_mut(key) {
            Some(Entry { value: Value::Hash(hash), .. }) => Ok(Some(hash)),
            Some(_) => Err(Reply::Error(WRONGTYPE.into())),
            None => Ok(None),
        }
    }

    fn hset(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let [key, pairs @ ..] = rest else { return Err(arity("hset")) };
        if pairs.is_empty() || pairs.len() % 2 != 0 {
            return Err(arity("hset"));
        }
        let Some(hash) = self.hash_mut(key, now_ms, true)? else {
            return Ok(Reply::Integer(0));
        };
        let added = pairs
            .chunks_exact(2)
            .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
            .count();
        Ok(Reply::Integer(i64::try_from(added).unwrap_or(i64::MAX)))
    }

    fn hget(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let [key, field] = rest else { return Err(arity("hget")) };
        let value = self
            .hash_mut(key, now_ms, false)?
            .and_then(|hash| hash.get(field).cloned());
        Ok(Reply::from_option(value))
    }

    fn hgetall(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let [key] = rest else { return Err(arity("hgetall")) };
        Ok(match self.hash_mut(key, now_ms, false)? {
            Some(hash) => Reply::bulk_array(hash.iter().flat_map(|(f, v)| [f.clone(), v.clone()])),
            None => Reply::Array(Vec::new()),
        })
    }

    fn hdel(&mut self, rest: &[String], now_ms: u64) -> Result<Reply, Reply> {
        let [key, fields @ ..] = rest else { return Err(arity("hdel")) };
        if fields.is_empty() {
            return Err(arity("hdel"));
        }
        let removed = match self.hash_mut(key, now_ms, false)? {
            Some(hash) => fields.iter().filter(|f| hash.remove(f.as_str()).is_some()).count(),
            None => 0,
        };
        self.drop_if_empty(key);
        Ok(Reply::Integer(i64::try_from(removed).unwrap_or(i64::MAX)))
    }

    fn logs(&self) -> Result<&AppendLog, Reply> {
        self.logs
            .as_ref()
            .ok_or_else(|| Reply::err("append-only logs are not enabled"))
    }

    fn log_error(e: &crate::core::RuntimeError) -> Reply {
        warn!(error = %e, "append-only log operation failed");
        Reply::err(e.to_string())
    }

    fn append_log(&self, rest: &[String]) -> Result<Reply, Reply> {
        let [name, entry] = rest else { return Err(arity("appendlog")) };
        let count = self
            .logs()?
            .append(name, &day_partition(), entry)
            .map_err(|e| Self::log_error(&e))?;
        Ok(Reply::Integer(i64::try_from(count).unwrap_or(i64::MAX)))
    }

    fn count_log(&self, rest: &[String]) -> Result<Reply, Reply> {
        let (name, day) = match rest {
            [name] => (name, day_partition()),
            [name, day] => (name, day.clone()),
            _ => return Err(arity("countlog")),
        };
        let count = self.logs()?.count(name, &day).map_err(|e| Self::log_error(&e))?;
        Ok(Reply::Integer(i64::try_from(count).unwrap_or(i64::MAX)))
    }

    fn read_log(&self, rest: &[String]) -> Result<Reply, Reply> {
        let [name, day, start, limit] = rest else { return Err(arity("readlog")) };
        let start = usize::try_from(parse_i64(start)?).map_err(|_| Reply::err(NOT_INTEGER))?;
        let limit = usize::try_from(parse_i64(limit)?).map_err(|_| Reply::err(NOT_INTEGER))?;
        let lines = self
            .logs()?
            .read(name, day, start, limit)
            .map_err(|e| Self::log_error(&e))?;
        Ok(Reply::bulk_array(lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ks: &mut Keyspace, args: &[&str]) -> Reply {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        ks.execute(&args, 1_000)
    }

    fn run_at(ks: &mut Keyspace, now_ms: u64, args: &[&str]) -> Reply {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        ks.execute(&args, now_ms)
    }

    #[test]
    fn test_scalar_commands() {
        let mut ks = Keyspace::new();
        assert_eq!(run(&mut ks, &["set", "k", "v"]), Reply::ok());
        assert_eq!(run(&mut ks, &["GET", "k"]), Reply::Bulk("v".into()));
        assert_eq!(run(&mut ks, &["INCR", "n"]), Reply::Integer(1));
        assert_eq!(run(&mut ks, &["INCRBY", "n", "9"]), Reply::Integer(10));
        assert_eq!(run(&mut ks, &["DECR", "n"]), Reply::Integer(9));
        assert_eq!(run(&mut ks, &["DEL", "k", "missing"]), Reply::Integer(1));
        assert_eq!(run(&mut ks, &["GET", "k"]), Reply::Nil);
        assert!(matches!(run(&mut ks, &["INCR", "n", "x"]), Reply::Error(_)));
    }

    #[test]
    fn test_incr_on_non_integer_fails() {
        let mut ks = Keyspace::new();
        run(&mut ks, &["SET", "k", "abc"]);
        assert_eq!(run(&mut ks, &["INCR", "k"]), Reply::err(NOT_INTEGER));
    }

    #[test]
    fn test_expiry_is_lazy_and_exact() {
        let mut ks = Keyspace::new();
        run_at(&mut ks, 1_000, &["SET", "k", "v"]);
        assert_eq!(run_at(&mut ks, 1_000, &["EXPIRE", "k", "2"]), Reply::Integer(1));
        assert_eq!(run_at(&mut ks, 1_500, &["TTL", "k"]), Reply::Integer(2));
        assert_eq!(run_at(&mut ks, 2_999, &["GET", "k"]), Reply::Bulk("v".into()));
        assert_eq!(run_at(&mut ks, 3_000, &["GET", "k"]), Reply::Nil);
        assert_eq!(run_at(&mut ks, 3_000, &["TTL", "k"]), Reply::Integer(-2));

        run_at(&mut ks, 0, &["SET", "p", "v", "PX", "10"]);
        assert_eq!(run_at(&mut ks, 10, &["EXISTS", "p"]), Reply::Integer(0));
    }

    #[test]
    fn test_list_commands() {
        let mut ks = Keyspace::new();
        assert_eq!(run(&mut ks, &["RPUSH", "l", "a", "b"]), Reply::Integer(2));
        assert_eq!(run(&mut ks, &["LPUSH", "l", "z"]), Reply::Integer(3));
        assert_eq!(run(&mut ks, &["LRANGE", "l", "0", "-1"]), Reply::bulk_array(["z", "a", "b"]));
        assert_eq!(run(&mut ks, &["LRANGE", "l", "-2", "10"]), Reply::bulk_array(["a", "b"]));
        assert_eq!(run(&mut ks, &["LRANGE", "l", "5", "10"]), Reply::Array(vec![]));
        assert_eq!(run(&mut ks, &["LPOP", "l"]), Reply::Bulk("z".into()));
        assert_eq!(run(&mut ks, &["RPOP", "l"]), Reply::Bulk("b".into()));
        assert_eq!(run(&mut ks, &["LLEN", "l"]), Reply::Integer(1));
        run(&mut ks, &["LPOP", "l"]);
        assert_eq!(run(&mut ks, &["EXISTS", "l"]), Reply::Integer(0), "empty list is removed");
        assert_eq!(run(&mut ks, &["LPOP", "l"]), Reply::Nil);
    }

    #[test]
    fn test_set_and_hash_commands() {
        let mut ks = Keyspace::new();
        assert_eq!(run(&mut ks, &["SADD", "s", "b", "a", "b"]), Reply::Integer(2));
        assert_eq!(run(&mut ks, &["SMEMBERS", "s"]), Reply::bulk_array(["a", "b"]));
        assert_eq!(run(&mut ks, &["SISMEMBER", "s", "a"]), Reply::Integer(1));
        assert_eq!(run(&mut ks, &["SREM", "s", "a", "x"]), Reply::Integer(1));

        assert_eq!(run(&mut ks, &["HSET", "h", "f1", "1", "f2", "2"]), Reply::Integer(2));
        assert_eq!(run(&mut ks, &["HSET", "h", "f1", "10"]), Reply::Integer(0));
        assert_eq!(run(&mut ks, &["HGET", "h", "f1"]), Reply::Bulk("10".into()));
        assert_eq!(run(&mut ks, &["HGETALL", "h"]), Reply::bulk_array(["f1", "10", "f2", "2"]));
        assert_eq!(run(&mut ks, &["HDEL", "h", "f1"]), Reply::Integer(1));
        assert_eq!(run(&mut ks, &["HGET", "h", "f1"]), Reply::Nil);
    }

    #[test]
    fn test_wrong_type_and_arity_errors() {
        let mut ks = Keyspace::new();
        run(&mut ks, &["RPUSH", "l", "a"]);
        assert_eq!(run(&mut ks, &["GET", "l"]), Reply::Error(WRONGTYPE.into()));
        assert_eq!(run(&mut ks, &["SADD", "l", "x"]), Reply::Error(WRONGTYPE.into()));
        assert_eq!(
            run(&mut ks, &["GET"]),
            Reply::err("wrong number of arguments for 'get' command")
        );
        assert_eq!(run(&mut ks, &["HSET", "h", "f"]), arity("hset"));
        assert_eq!(run(&mut ks, &["FLUSHALL"]), Reply::err("unknown command 'FLUSHALL'"));
    }

    #[test]
    fn test_log_commands_need_log_dir() {
        let mut ks = Keyspace::new();
        assert!(matches!(run(&mut ks, &["APPENDLOG", "audit", "x"]), Reply::Error(_)));

        let dir = tempfile::tempdir().unwrap();
        let mut ks = Keyspace::new().with_logs(AppendLog::open(dir.path()).unwrap());
        assert_eq!(run(&mut ks, &["APPENDLOG", "audit", "x"]), Reply::Integer(1));
        assert_eq!(run(&mut ks, &["APPENDLOG", "audit", "y"]), Reply::Integer(2));
        assert_eq!(run(&mut ks, &["COUNTLOG", "audit"]), Reply::Integer(2));
        let day = day_partition();
        assert_eq!(
            run(&mut ks, &["READLOG", "audit", day.as_str(), "1", "5"]),
            Reply::bulk_array(["y"])
        );
    }
}
