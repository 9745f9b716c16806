//! In-memory keyspaces for the fake store.
//!
//! One `HashMap` per logical database behind a `std::sync::Mutex`. Expiry is
//! lazy: expired entries are dropped whenever their database is touched.

use bytes::Bytes;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// A stored value. `Stream` exists only so `TYPE` can report a kind the
/// gateway does not handle; no command writes one.
#[derive(Debug, Clone)]
pub enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
    Set(BTreeSet<Bytes>),
    /// Kept sorted by score, then member.
    ZSet(Vec<(f64, Bytes)>),
    /// Insertion order, like a small hash on a real store.
    Hash(Vec<(Bytes, Bytes)>),
    Stream,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::ZSet(_) => "zset",
            Value::Hash(_) => "hash",
            Value::Stream => "stream",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }

    /// Remaining lifetime in whole seconds, rounded the way a store does.
    pub fn ttl_secs(&self) -> i64 {
        match self.expires_at {
            None => -1,
            Some(exp) => {
                let left = exp.saturating_duration_since(Instant::now());
                ((left.as_millis() + 500) / 1000) as i64
            }
        }
    }
}

pub type Keyspace = HashMap<Bytes, Entry>;

/// All databases of one fake server.
#[derive(Debug)]
pub struct FakeStore {
    databases: Vec<Mutex<Keyspace>>,
}

impl FakeStore {
    pub fn new(databases: u16) -> Self {
        Self {
            databases: (0..databases).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    pub fn db_count(&self) -> u16 {
        self.databases.len() as u16
    }

    /// Runs `f` against database `db` with expired keys already removed.
    pub fn with_db<R>(&self, db: u16, f: impl FnOnce(&mut Keyspace) -> R) -> R {
        let mut keyspace = self.databases[db as usize].lock().unwrap();
        keyspace.retain(|_, entry| !entry.is_expired());
        f(&mut keyspace)
    }

    pub fn contains(&self, db: u16, key: &str) -> bool {
        self.with_db(db, |ks| ks.contains_key(key.as_bytes()))
    }

    pub fn set_string(&self, db: u16, key: &str, value: &str) {
        self.with_db(db, |ks| {
            ks.insert(
                Bytes::copy_from_slice(key.as_bytes()),
                Entry::new(Value::String(Bytes::copy_from_slice(value.as_bytes()))),
            );
        });
    }

    pub fn insert(&self, db: u16, key: &str, value: Value) {
        self.with_db(db, |ks| {
            ks.insert(Bytes::copy_from_slice(key.as_bytes()), Entry::new(value));
        });
    }

    pub fn get(&self, db: u16, key: &str) -> Option<Value> {
        self.with_db(db, |ks| ks.get(key.as_bytes()).map(|e| e.value.clone()))
    }

    pub fn ttl(&self, db: u16, key: &str) -> i64 {
        self.with_db(db, |ks| ks.get(key.as_bytes()).map_or(-2, Entry::ttl_secs))
    }

    pub fn expire(&self, db: u16, key: &str, ttl: Duration) -> bool {
        self.with_db(db, |ks| match ks.get_mut(key.as_bytes()) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        })
    }

    /// `(db, keys, expires)` for every non-empty database.
    pub fn keyspace_summary(&self) -> Vec<(u16, usize, usize)> {
        (0..self.db_count())
            .filter_map(|db| {
                self.with_db(db, |ks| {
                    if ks.is_empty() {
                        return None;
                    }
                    let expires = ks.values().filter(|e| e.expires_at.is_some()).count();
                    Some((db, ks.len(), expires))
                })
            })
            .collect()
    }
}

/// Glob matching for `KEYS`: `*`, `?` and literal bytes.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|i| glob_match(rest, &text[i..])),
        Some((b'?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((&c, rest)) => text.first() == Some(&c) && glob_match(rest, &text[1..]),
    }
}

/// Resolves an inclusive, possibly negative, index range against `len`.
pub fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_expiry() {
        let store = FakeStore::new(2);
        store.set_string(1, "session", "abc");
        assert!(store.expire(1, "session", Duration::from_millis(0)));
        assert!(!store.contains(1, "session"));
        assert_eq!(store.ttl(1, "session"), -2);
    }

    #[test]
    fn test_keyspace_summary_skips_empty() {
        let store = FakeStore::new(4);
        store.set_string(0, "a", "1");
        store.set_string(2, "b", "1");
        store.set_string(2, "c", "1");
        store.expire(2, "c", Duration::from_secs(60));
        assert_eq!(store.keyspace_summary(), vec![(0, 1, 0), (2, 2, 1)]);
    }

    #[test]
    fn test_glob() {
        assert!(glob_match(b"*", b"anything"));
        assert!(glob_match(b"user:*", b"user:1"));
        assert!(glob_match(b"h?llo", b"hello"));
        assert!(!glob_match(b"user:*", b"session:1"));
    }

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(3, 0, -1), Some((0, 2)));
        assert_eq!(resolve_range(3, -2, 10), Some((1, 2)));
        assert_eq!(resolve_range(3, 2, 1), None);
        assert_eq!(resolve_range(0, 0, -1), None);
    }
}
