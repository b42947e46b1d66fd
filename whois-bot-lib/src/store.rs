//! Persistent and in-memory bot state.
//!
//! Three stores live here:
//! - [`UserStore`]: every user id the bot has seen, persisted write-through
//!   as `{"users": [...]}`.
//! - [`SearchLog`]: a global newest-first log of lookups, bounded per user.
//! - [`JsonConfigStore`]: a free-form JSON object for runtime bookkeeping.
//!
//! None of these lock internally; the router wraps each in a mutex.

use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::BotError;
use crate::types::RecentSearch;

/// Number of recent searches kept per user unless configured otherwise.
pub const DEFAULT_RECENT_LIMIT: usize = 5;

/// Set of known user ids.
pub trait UserStore: Send {
    /// Add a user. Returns `true` if the user was not known before.
    /// Implementations persist the change before returning.
    fn register_user(&mut self, user_id: i64) -> Result<bool, BotError>;

    fn contains(&self, user_id: i64) -> bool;

    /// All known user ids in ascending order.
    fn users(&self) -> Vec<i64>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush the current state to durable storage.
    fn save(&self) -> Result<(), BotError>;
}

/// User store that lives only in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryUserStore {
    users: BTreeSet<i64>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users<I: IntoIterator<Item = i64>>(users: I) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }
}

impl UserStore for MemoryUserStore {
    fn register_user(&mut self, user_id: i64) -> Result<bool, BotError> {
        Ok(self.users.insert(user_id))
    }

    fn contains(&self, user_id: i64) -> bool {
        self.users.contains(&user_id)
    }

    fn users(&self) -> Vec<i64> {
        self.users.iter().copied().collect()
    }

    fn len(&self) -> usize {
        self.users.len()
    }

    fn save(&self) -> Result<(), BotError> {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UsersFile {
    users: Vec<Value>,
}

/// User store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonUserStore {
    path: PathBuf,
    users: BTreeSet<i64>,
}

impl JsonUserStore {
    /// Create an empty store that will persist to `path`. Nothing is read.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            users: BTreeSet::new(),
        }
    }

    /// Create a store and load any users already persisted at `path`.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, BotError> {
        let mut store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory set with the file contents.
    ///
    /// A missing file is an empty store. Ids may be JSON integers or
    /// digit-only strings; any other entry is skipped.
    pub fn load(&mut self) -> Result<usize, BotError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No users file yet");
            self.users.clear();
            return Ok(0);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            BotError::file_error(
                self.path.to_string_lossy(),
                format!("Failed to read users file: {}", e),
            )
        })?;
        let file: UsersFile = serde_json::from_str(&content)?;

        self.users = file.users.iter().filter_map(parse_user_id).collect();
        info!(count = self.users.len(), "Loaded users from file");
        Ok(self.users.len())
    }
}

fn parse_user_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().filter(|id| *id >= 0),
        Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
            s.parse().ok()
        }
        _ => None,
    }
}

impl UserStore for JsonUserStore {
    fn register_user(&mut self, user_id: i64) -> Result<bool, BotError> {
        if !self.users.insert(user_id) {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    fn contains(&self, user_id: i64) -> bool {
        self.users.contains(&user_id)
    }

    fn users(&self) -> Vec<i64> {
        self.users.iter().copied().collect()
    }

    fn len(&self) -> usize {
        self.users.len()
    }

    fn save(&self) -> Result<(), BotError> {
        let file = UsersFile {
            users: self.users.iter().map(|id| Value::from(*id)).collect(),
        };
        write_json(&self.path, &serde_json::to_value(file)?)?;
        info!(count = self.users.len(), "Saved users to file");
        Ok(())
    }
}

/// Newest-first log of domain lookups.
pub trait SearchLog: Send {
    /// Record a lookup and evict this user's entries beyond the per-user limit.
    fn record_search(&mut self, user_id: i64, domain: &str, at: DateTime<Utc>);

    /// The user's most recent lookups, newest first.
    fn list_recent(&self, user_id: i64) -> Vec<RecentSearch>;

    /// Number of entries currently held across all users.
    fn total_searches(&self) -> usize;
}

/// In-memory search log. Lookups are not persisted across restarts.
#[derive(Debug, Clone)]
pub struct MemorySearchLog {
    entries: VecDeque<RecentSearch>,
    per_user_limit: usize,
}

impl MemorySearchLog {
    pub fn new(per_user_limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            per_user_limit,
        }
    }
}

impl Default for MemorySearchLog {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_LIMIT)
    }
}

impl SearchLog for MemorySearchLog {
    fn record_search(&mut self, user_id: i64, domain: &str, at: DateTime<Utc>) {
        self.entries.push_front(RecentSearch {
            user_id,
            domain: domain.to_string(),
            timestamp: at,
        });

        let limit = self.per_user_limit;
        let mut seen = 0;
        self.entries.retain(|entry| {
            if entry.user_id != user_id {
                return true;
            }
            seen += 1;
            seen <= limit
        });
    }

    fn list_recent(&self, user_id: i64) -> Vec<RecentSearch> {
        self.entries
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .take(self.per_user_limit)
            .cloned()
            .collect()
    }

    fn total_searches(&self) -> usize {
        self.entries.len()
    }
}

/// Free-form JSON object persisted next to the users file.
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl JsonConfigStore {
    /// Open the store, reading `path` if it exists.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, BotError> {
        let path = path.into();
        let values = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                BotError::file_error(
                    path.to_string_lossy(),
                    format!("Failed to read config map: {}", e),
                )
            })?;
            match serde_json::from_str::<Value>(&content)? {
                Value::Object(map) => map,
                _ => {
                    return Err(BotError::file_error(
                        path.to_string_lossy(),
                        "Config map must be a JSON object",
                    ))
                }
            }
        } else {
            Map::new()
        };
        info!(path = %path.display(), keys = values.len(), "Configuration map loaded");
        Ok(Self { path, values })
    }

    /// In-memory store that writes to `path` on the first mutation.
    pub fn empty<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            values: Map::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(Value::as_u64)
    }

    /// Set a value and persist immediately.
    pub fn set<V: Into<Value>>(&mut self, key: &str, value: V) -> Result<(), BotError> {
        self.values.insert(key.to_string(), value.into());
        self.save()
    }

    /// Increment an integer counter and persist. Returns the new value.
    pub fn increment(&mut self, key: &str) -> Result<u64, BotError> {
        let next = self.get_u64(key).unwrap_or(0) + 1;
        self.set(key, next)?;
        Ok(next)
    }

    pub fn save(&self) -> Result<(), BotError> {
        write_json(&self.path, &Value::Object(self.values.clone()))?;
        debug!(path = %self.path.display(), "Configuration map saved");
        Ok(())
    }
}

/// Write JSON through a temporary file so a crash never leaves half a file.
fn write_json(path: &Path, value: &Value) -> Result<(), BotError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                BotError::file_error(
                    parent.to_string_lossy(),
                    format!("Failed to create data directory: {}", e),
                )
            })?;
        }
    }

    let tmp = path.with_extension("json.tmp");
    let content = serde_json::to_string(value)?;
    fs::write(&tmp, content)
        .and_then(|_| fs::rename(&tmp, path))
        .map_err(|e| {
            BotError::file_error(path.to_string_lossy(), format!("Failed to write file: {}", e))
        })
}
