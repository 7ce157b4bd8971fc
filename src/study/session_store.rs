use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use uuid::Uuid;

/// Request-scoped key/value storage carried across a visitor's requests.
#[cfg_attr(test, mockall::automock)]
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);
    fn remove(&self, key: &str);
}

/// In-process session store, one per visitor.
#[derive(Debug)]
pub struct MemorySessionStore {
    key: String,
    values: RwLock<HashMap<String, Value>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            key: Uuid::new_v4().to_string(),
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Cookie value identifying this session.
    pub fn session_key(&self) -> &str {
        &self.key
    }

    pub fn is_empty(&self) -> bool {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
