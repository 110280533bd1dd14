//! In-memory store and connector for tests.
//!
//! [`MockStore`] implements the full [`KeyValueStore`] surface with expiry,
//! glob `KEYS` and a fault queue that fails the next N commands.
//! [`MockConnector`] hands out the same store on every connect and counts
//! how often it was asked.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tradecache_core::{StoreError, Ttl};

use super::traits::{KeyValueStore, StoreConnector};

#[derive(Debug, Clone)]
enum MockValue {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct MockEntry {
    value: MockValue,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct MockState {
    entries: HashMap<String, MockEntry>,
    faults: VecDeque<StoreError>,
    calls: HashMap<&'static str, u64>,
    writes: Vec<(String, Ttl)>,
}

impl MockState {
    fn live(&mut self, key: &str) -> Option<&mut MockEntry> {
        let expired = self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));
    }
}

fn wrong_type(operation: &str) -> StoreError {
    StoreError::operation(
        operation,
        "WRONGTYPE Operation against a key holding the wrong kind of value",
    )
}

/// Resolve Redis-style inclusive indices against a list length.
fn list_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Glob match supporting `*`, `?` and `[...]` classes.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => (0..=text.len()).any(|skip| glob_match(rest, &text[skip..])),
        Some(('?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some(('[', rest)) => {
            let Some(close) = rest.iter().position(|c| *c == ']') else {
                return text.first() == Some(&'[') && glob_match(rest, &text[1..]);
            };
            let Some(first) = text.first() else {
                return false;
            };
            rest[..close].contains(first) && glob_match(&rest[close + 1..], &text[1..])
        }
        Some((c, rest)) => text.first() == Some(c) && glob_match(rest, &text[1..]),
    }
}

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MockStore {
    state: Mutex<MockState>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` commands with `error`.
    pub fn fail_next(&self, count: usize, error: StoreError) {
        let mut state = self.lock();
        state.faults.extend(std::iter::repeat(error).take(count));
    }

    /// Drop any queued faults.
    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Number of times a command was issued, including failed ones.
    pub fn call_count(&self, command: &str) -> u64 {
        self.lock().calls.get(command).copied().unwrap_or(0)
    }

    /// Every successful `set`, in order, with the TTL it carried.
    pub fn writes(&self) -> Vec<(String, Ttl)> {
        self.lock().writes.clone()
    }

    /// Raw value of a string key, ignoring faults.
    pub fn peek(&self, key: &str) -> Option<String> {
        match self.lock().live(key).map(|entry| &entry.value) {
            Some(MockValue::Str(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Write a string key directly, ignoring faults.
    pub fn seed(&self, key: &str, value: &str, ttl: Ttl) {
        let mut state = self.lock();
        state.entries.insert(
            key.to_string(),
            MockEntry {
                value: MockValue::Str(value.to_string()),
                expires_at: ttl.as_duration().map(|d| Instant::now() + d),
            },
        );
    }

    /// Record the call and pop a queued fault.
    fn begin(&self, command: &'static str) -> Result<std::sync::MutexGuard<'_, MockState>, StoreError> {
        let mut state = self.lock();
        *state.calls.entry(command).or_insert(0) += 1;
        match state.faults.pop_front() {
            Some(fault) => Err(fault),
            None => Ok(state),
        }
    }

    fn list_mut<'a>(
        state: &'a mut MockState,
        key: &str,
        command: &str,
    ) -> Result<&'a mut VecDeque<String>, StoreError> {
        if state.live(key).is_none() {
            state.entries.insert(
                key.to_string(),
                MockEntry {
                    value: MockValue::List(VecDeque::new()),
                    expires_at: None,
                },
            );
        }
        match state.entries.get_mut(key).map(|entry| &mut entry.value) {
            Some(MockValue::List(list)) => Ok(list),
            _ => Err(wrong_type(command)),
        }
    }

    fn ltrim_in(state: &mut MockState, key: &str, start: i64, stop: i64) -> Result<(), StoreError> {
        let range = match state.live(key).map(|entry| &mut entry.value) {
            None => return Ok(()),
            Some(MockValue::List(list)) => {
                let range = list_range(list.len(), start, stop);
                if let Some((from, to)) = range {
                    list.truncate(to + 1);
                    list.drain(..from);
                }
                range
            }
            Some(_) => return Err(wrong_type("ltrim")),
        };
        if range.is_none() {
            state.entries.remove(key);
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MockStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.begin("ping").map(|_| ())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut state = self.begin("get")?;
        match state.live(key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(MockValue::Str(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type("get")),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), StoreError> {
        let mut state = self.begin("set")?;
        if ttl == Ttl::Seconds(0) {
            return Err(StoreError::operation("set", "invalid expire time in 'set' command"));
        }
        state.entries.insert(
            key.to_string(),
            MockEntry {
                value: MockValue::Str(value.to_string()),
                expires_at: ttl.as_duration().map(|d| Instant::now() + d),
            },
        );
        state.writes.push((key.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut state = self.begin("delete")?;
        state.purge_expired();
        Ok(keys
            .iter()
            .filter(|key| state.entries.remove(key.as_str()).is_some())
            .count() as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut state = self.begin("exists")?;
        Ok(state.live(key).is_some())
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, StoreError> {
        let mut state = self.begin("expire")?;
        match state.live(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        let mut state = self.begin("ttl")?;
        Ok(match state.live(key) {
            None => -2,
            Some(MockEntry {
                expires_at: None, ..
            }) => -1,
            Some(MockEntry {
                expires_at: Some(at),
                ..
            }) => {
                let remaining = at.saturating_duration_since(Instant::now());
                remaining.as_millis().div_ceil(1000) as i64
            }
        })
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let mut state = self.begin("hset")?;
        if state.live(key).is_none() {
            state.entries.insert(
                key.to_string(),
                MockEntry {
                    value: MockValue::Hash(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        match state.entries.get_mut(key).map(|entry| &mut entry.value) {
            Some(MockValue::Hash(hash)) => {
                Ok(hash.insert(field.to_string(), value.to_string()).is_none())
            }
            _ => Err(wrong_type("hset")),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut state = self.begin("hget")?;
        match state.live(key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(MockValue::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(wrong_type("hget")),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut state = self.begin("hgetall")?;
        match state.live(key).map(|entry| &entry.value) {
            None => Ok(HashMap::new()),
            Some(MockValue::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(wrong_type("hgetall")),
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<u64, StoreError> {
        let mut state = self.begin("hdel")?;
        match state.live(key).map(|entry| &mut entry.value) {
            None => Ok(0),
            Some(MockValue::Hash(hash)) => Ok(u64::from(hash.remove(field).is_some())),
            Some(_) => Err(wrong_type("hdel")),
        }
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut state = self.begin("lpush")?;
        let list = Self::list_mut(&mut state, key, "lpush")?;
        list.push_front(value.to_string());
        Ok(list.len() as u64)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut state = self.begin("rpush")?;
        let list = Self::list_mut(&mut state, key, "rpush")?;
        list.push_back(value.to_string());
        Ok(list.len() as u64)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        let mut state = self.begin("lrange")?;
        match state.live(key).map(|entry| &entry.value) {
            None => Ok(Vec::new()),
            Some(MockValue::List(list)) => Ok(match list_range(list.len(), start, stop) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            }),
            Some(_) => Err(wrong_type("lrange")),
        }
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), StoreError> {
        let mut state = self.begin("ltrim")?;
        Self::ltrim_in(&mut state, key, start, stop)
    }

    async fn llen(&self, key: &str) -> Result<u64, StoreError> {
        let mut state = self.begin("llen")?;
        match state.live(key).map(|entry| &entry.value) {
            None => Ok(0),
            Some(MockValue::List(list)) => Ok(list.len() as u64),
            Some(_) => Err(wrong_type("llen")),
        }
    }

    async fn push_capped(&self, key: &str, value: &str, max_items: u64) -> Result<u64, StoreError> {
        // Both steps run under one lock, like MULTI/EXEC
        let mut state = self.begin("push_capped")?;
        Self::list_mut(&mut state, key, "push_capped")?.push_front(value.to_string());
        let stop = i64::try_from(max_items).unwrap_or(i64::MAX) - 1;
        Self::ltrim_in(&mut state, key, 0, stop)?;
        match state.live(key).map(|entry| &entry.value) {
            Some(MockValue::List(list)) => Ok(list.len() as u64),
            _ => Ok(0),
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut state = self.begin("keys")?;
        state.purge_expired();
        let pattern: Vec<char> = pattern.chars().collect();
        let mut keys: Vec<String> = state
            .entries
            .keys()
            .filter(|key| glob_match(&pattern, &key.chars().collect::<Vec<_>>()))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Connector that always returns the same [`MockStore`].
#[derive(Debug)]
pub struct MockConnector {
    store: Arc<MockStore>,
    connects: AtomicU64,
    fail_setup: AtomicBool,
}

impl MockConnector {
    pub fn new(store: Arc<MockStore>) -> Self {
        Self {
            store,
            connects: AtomicU64::new(0),
            fail_setup: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<MockStore> {
        &self.store
    }

    /// Connect attempts so far, including failed ones.
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make subsequent connects fail with `ConnectionSetup`.
    pub fn fail_setup(&self, fail: bool) {
        self.fail_setup.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreConnector for MockConnector {
    type Store = MockStore;

    async fn connect(&self) -> Result<Arc<MockStore>, StoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_setup.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionSetup {
                reason: "mock connector configured to fail".to_string(),
            });
        }
        Ok(Arc::clone(&self.store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match(&chars("cache:*"), &chars("cache:stock_quote:symbol=A")));
        assert!(glob_match(&chars("a?c"), &chars("abc")));
        assert!(glob_match(&chars("[ab]x"), &chars("bx")));
        assert!(!glob_match(&chars("[ab]x"), &chars("cx")));
        assert!(!glob_match(&chars("cache:positions:*"), &chars("cache:stock_bars:x")));
    }

    #[test]
    fn test_list_range() {
        assert_eq!(list_range(5, 0, -1), Some((0, 4)));
        assert_eq!(list_range(5, 0, 2), Some((0, 2)));
        assert_eq!(list_range(5, -2, -1), Some((3, 4)));
        assert_eq!(list_range(5, 3, 1), None);
        assert_eq!(list_range(0, 0, -1), None);
        assert_eq!(list_range(2, 0, 10), Some((0, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MockStore::new();
        store.set("k", "v", Ttl::Seconds(60)).await.unwrap();
        assert_eq!(store.ttl("k").await, Ok(60));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.get("k").await, Ok(None));
        assert_eq!(store.ttl("k").await, Ok(-2));
    }

    #[tokio::test]
    async fn test_faults_consumed_in_order() {
        let store = MockStore::new();
        store.fail_next(1, StoreError::transient("get", "refused"));
        assert!(store.get("k").await.is_err());
        assert_eq!(store.get("k").await, Ok(None));
        assert_eq!(store.call_count("get"), 2);
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MockStore::new();
        store.set("k", "v", Ttl::Persistent).await.unwrap();
        assert!(matches!(store.lpush("k", "x").await, Err(StoreError::Operation { .. })));
    }
}
