use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
#[cfg(test)]
use std::cell::RefCell;
#[cfg(test)]
use std::collections::HashMap;
use tracing::warn;

pub mod keys {
    pub const MARKS: &str = "marks";
    pub const PROFILE: &str = "profile";
    pub const TODOS: &str = "todos";
    pub const TUTORS: &str = "tutors";
    pub const CUSTOM_SUBJECTS: &str = "customSubjects";
    pub const FAVORITE_SUBJECTS: &str = "favoriteSubjects";
    pub const STUDY_SESSIONS: &str = "studySessions";
}

/// String-keyed persistence: one JSON document per key, last write wins.
pub trait Storage {
    fn get_raw(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set_raw(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;

    /// Implementations backed by a database should make this atomic.
    fn set_many(&self, entries: &[(String, String)]) -> anyhow::Result<()> {
        for (k, v) in entries {
            self.set_raw(k, v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl Storage for MemoryStore {
    fn get_raw(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.values.borrow_mut().remove(key);
        Ok(())
    }
}

pub fn get_json<T: DeserializeOwned>(store: &dyn Storage, key: &str) -> anyhow::Result<Option<T>> {
    let Some(raw) = store.get_raw(key)? else {
        return Ok(None);
    };
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("stored value for {key} is not valid"))?;
    Ok(Some(value))
}

pub fn set_json<T: Serialize + ?Sized>(
    store: &dyn Storage,
    key: &str,
    value: &T,
) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value).with_context(|| format!("failed to serialize {key}"))?;
    store.set_raw(key, &raw)
}

/// Reads a list, treating a malformed stored value as empty.
pub fn load_list<T: DeserializeOwned>(store: &dyn Storage, key: &str) -> anyhow::Result<Vec<T>> {
    let Some(raw) = store.get_raw(key)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(v) => Ok(v),
        Err(e) => {
            warn!(key, error = %e, "stored list is malformed; reading as empty");
            Ok(Vec::new())
        }
    }
}

/// Same fallback as [`load_list`] for singleton objects.
pub fn load_or_default<T: DeserializeOwned + Default>(
    store: &dyn Storage,
    key: &str,
) -> anyhow::Result<T> {
    let Some(raw) = store.get_raw(key)? else {
        return Ok(T::default());
    };
    match serde_json::from_str::<T>(&raw) {
        Ok(v) => Ok(v),
        Err(e) => {
            warn!(key, error = %e, "stored object is malformed; using defaults");
            Ok(T::default())
        }
    }
}
