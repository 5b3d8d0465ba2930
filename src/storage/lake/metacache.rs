// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use prost::Message;

use crate::service::proto::{TabletMetadataPb, TxnLogPb};

/// An opened data segment as seen by the cache: enough footer state to answer
/// size questions without another remote read.
#[derive(Debug)]
pub struct Segment {
    path: String,
    data_size: u64,
}

impl Segment {
    pub fn new(path: impl Into<String>, data_size: u64) -> Self {
        Self {
            path: path.into(),
            data_size,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn mem_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.path.len()
    }
}

#[derive(Clone)]
enum CacheValue {
    TabletMetadata(Arc<TabletMetadataPb>),
    TxnLog(Arc<TxnLogPb>),
    Segment(Arc<Segment>),
}

struct CacheEntry {
    value: CacheValue,
    charge: usize,
    prev: Option<String>,
    next: Option<String>,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    head: Option<String>,
    tail: Option<String>,
    size: usize,
    capacity: usize,
}

/// In-memory cache over parsed lake files, keyed by the file path. Vacuum
/// erases a path here before the delete of that path is issued, so a reader
/// can never observe a cached snapshot whose backing file is already gone.
pub struct Metacache {
    inner: Mutex<CacheInner>,
}

impl Metacache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                head: None,
                tail: None,
                size: 0,
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn cache_tablet_metadata(&self, path: impl Into<String>, metadata: Arc<TabletMetadataPb>) {
        let charge = metadata.encoded_len().max(1);
        self.insert(path.into(), CacheValue::TabletMetadata(metadata), charge);
    }

    pub fn lookup_tablet_metadata(&self, path: &str) -> Option<Arc<TabletMetadataPb>> {
        match self.lookup(path)? {
            CacheValue::TabletMetadata(m) => Some(m),
            _ => None,
        }
    }

    pub fn cache_txn_log(&self, path: impl Into<String>, log: Arc<TxnLogPb>) {
        let charge = log.encoded_len().max(1);
        self.insert(path.into(), CacheValue::TxnLog(log), charge);
    }

    pub fn lookup_txn_log(&self, path: &str) -> Option<Arc<TxnLogPb>> {
        match self.lookup(path)? {
            CacheValue::TxnLog(l) => Some(l),
            _ => None,
        }
    }

    pub fn cache_segment(&self, path: impl Into<String>, segment: Arc<Segment>) {
        let charge = segment.mem_usage();
        self.insert(path.into(), CacheValue::Segment(segment), charge);
    }

    pub fn lookup_segment(&self, path: &str) -> Option<Arc<Segment>> {
        match self.lookup(path)? {
            CacheValue::Segment(s) => Some(s),
            _ => None,
        }
    }

    /// Re-charge the cached segment at `path` with its real memory cost once
    /// it has been fully opened. `hint` (the segment's address when the caller
    /// looked it up, 0 to skip the check) guards against re-charging a
    /// different segment that replaced the original under the same path.
    /// Returns the applied charge, or 0 when nothing was updated.
    pub fn cache_segment_if_present(&self, path: &str, mem_cost: usize, hint: usize) -> u64 {
        let mut inner = self.inner.lock().expect("metacache lock");
        let Some(entry) = inner.entries.get(path) else {
            return 0;
        };
        let CacheValue::Segment(segment) = &entry.value else {
            return 0;
        };
        if hint != 0 && Arc::as_ptr(segment) as usize != hint {
            return 0;
        }
        let charge = mem_cost.max(1);
        let old_charge = entry.charge;
        if let Some(entry) = inner.entries.get_mut(path) {
            entry.charge = charge;
        }
        inner.size = inner.size.saturating_sub(old_charge).saturating_add(charge);
        let key = path.to_string();
        inner.move_to_tail(&key);
        charge as u64
    }

    pub fn erase(&self, path: &str) {
        let mut inner = self.inner.lock().expect("metacache lock");
        inner.remove_entry(path);
    }

    pub fn memory_usage(&self) -> usize {
        self.inner.lock().expect("metacache lock").size
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().expect("metacache lock").capacity
    }

    fn lookup(&self, path: &str) -> Option<CacheValue> {
        let mut inner = self.inner.lock().expect("metacache lock");
        let value = inner.entries.get(path)?.value.clone();
        let key = path.to_string();
        inner.move_to_tail(&key);
        Some(value)
    }

    fn insert(&self, key: String, value: CacheValue, charge: usize) {
        let mut inner = self.inner.lock().expect("metacache lock");
        if charge > inner.capacity {
            return;
        }
        if inner.entries.contains_key(&key) {
            inner.remove_entry(&key);
        }
        while inner.size.saturating_add(charge) > inner.capacity {
            if !inner.evict_one() {
                return;
            }
        }
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                charge,
                prev: None,
                next: None,
            },
        );
        inner.attach_tail(&key);
        inner.size = inner.size.saturating_add(charge);
    }
}

impl CacheInner {
    fn evict_one(&mut self) -> bool {
        let Some(head) = self.head.clone() else {
            return false;
        };
        self.remove_entry(&head).is_some()
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let (prev, next, charge) = {
            let entry = self.entries.get(key)?;
            (entry.prev.clone(), entry.next.clone(), entry.charge)
        };
        if let Some(prev_key) = prev.as_ref() {
            if let Some(prev_entry) = self.entries.get_mut(prev_key) {
                prev_entry.next = next.clone();
            }
        } else {
            self.head = next.clone();
        }
        if let Some(next_key) = next.as_ref() {
            if let Some(next_entry) = self.entries.get_mut(next_key) {
                next_entry.prev = prev.clone();
            }
        } else {
            self.tail = prev.clone();
        }
        let entry = self.entries.remove(key);
        if entry.is_some() {
            self.size = self.size.saturating_sub(charge);
        }
        entry
    }

    fn attach_tail(&mut self, key: &str) {
        let tail_key = self.tail.clone();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.prev = tail_key.clone();
            entry.next = None;
        }
        if let Some(tail) = tail_key {
            if let Some(entry) = self.entries.get_mut(&tail) {
                entry.next = Some(key.to_string());
            }
        } else {
            self.head = Some(key.to_string());
        }
        self.tail = Some(key.to_string());
    }

    fn move_to_tail(&mut self, key: &str) {
        if self.tail.as_deref() == Some(key) {
            return;
        }
        let (prev, next) = match self.entries.get(key) {
            Some(entry) => (entry.prev.clone(), entry.next.clone()),
            None => return,
        };
        if let Some(prev_key) = prev.as_ref() {
            if let Some(prev_entry) = self.entries.get_mut(prev_key) {
                prev_entry.next = next.clone();
            }
        } else {
            self.head = next.clone();
        }
        if let Some(next_key) = next.as_ref() {
            if let Some(next_entry) = self.entries.get_mut(next_key) {
                next_entry.prev = prev.clone();
            }
        } else {
            self.tail = prev.clone();
        }
        self.attach_tail(key);
    }
}
