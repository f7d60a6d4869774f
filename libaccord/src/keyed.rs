// Copyright 2021 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A table of independently locked values.
//!
//! Each key owns its own async mutex, so work on one key never waits for work on another. The
//! table's own lock only guards the map and is never held across an await.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Mutex as AsyncMutex;

pub(crate) type Slot<V> = Arc<AsyncMutex<V>>;

pub(crate) struct KeyedMutex<K, V> {
    entries: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> KeyedMutex<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        KeyedMutex {
            entries: Mutex::new(HashMap::new()),
        }
    }

    // A poisoned map is still consistent.
    fn entries(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &K) -> Option<Slot<V>> {
        self.entries().get(key).cloned()
    }

    /// Inserts a value under a key which must not already exist. Returns the value back if the
    /// key is taken.
    pub fn insert_new(&self, key: K, value: V) -> Result<Slot<V>, V> {
        let mut entries = self.entries();
        if entries.contains_key(&key) {
            return Err(value);
        }
        let slot = Arc::new(AsyncMutex::new(value));
        entries.insert(key, slot.clone());
        Ok(slot)
    }

    pub fn get_or_insert_with<F>(&self, key: K, init: F) -> Slot<V>
    where
        F: FnOnce() -> V,
    {
        self.entries()
            .entry(key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(init())))
            .clone()
    }

    /// Drops the entry for a key if no one else holds its slot.
    pub fn remove_idle(&self, key: &K) -> bool {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(slot) if Arc::strong_count(slot) == 1 => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, key: &K) -> Option<Slot<V>> {
        self.entries().remove(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries().keys().cloned().collect()
    }
}

impl<K, V> Default for KeyedMutex<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        KeyedMutex::new()
    }
}
