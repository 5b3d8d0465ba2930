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
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::storage::lake::metacache::Metacache;

struct UpdaterState {
    stopped: AtomicBool,
    // pending (segment path, segment address hint) requests
    segments: Mutex<Vec<(String, usize)>>,
    cv: Condvar,
}

/// Deferred backfill of segment charges in the metacache.
///
/// Opening a segment inserts it with a placeholder charge because the real
/// memory cost is only known after column indexes are loaded. Producers hand
/// the path (plus the segment address they observed) to this worker, which
/// wakes once a second and re-charges whatever is still cached.
pub struct SegmentCacheUpdater {
    metacache: Arc<Metacache>,
    state: Arc<UpdaterState>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SegmentCacheUpdater {
    pub fn new(metacache: Arc<Metacache>) -> Self {
        let updater = Self {
            metacache,
            state: Arc::new(UpdaterState {
                stopped: AtomicBool::new(true),
                segments: Mutex::new(Vec::new()),
                cv: Condvar::new(),
            }),
            thread: Mutex::new(None),
        };
        updater.start();
        updater
    }

    fn start(&self) {
        if self
            .state
            .stopped
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return; // Already running.
        }
        let state = Arc::clone(&self.state);
        let metacache = Arc::clone(&self.metacache);
        let handle = std::thread::Builder::new()
            .name("seg_cache_updater".to_string())
            .spawn(move || run(&state, &metacache))
            .expect("spawn seg_cache_updater thread");
        *self.thread.lock().expect("updater thread slot lock") = Some(handle);
    }

    /// Idempotent; the second and later calls are no-ops.
    pub fn stop(&self) {
        if self
            .state
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return; // Already stopped.
        }
        self.state.cv.notify_all();
        let handle = self.thread.lock().expect("updater thread slot lock").take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Request that `segment_path` be re-charged once the worker runs.
    /// `segment_hint` is the address of the segment the caller looked up, or 0
    /// to accept whatever is cached under the path.
    pub fn update(&self, segment_path: &str, segment_hint: usize) {
        let mut pending = self.state.segments.lock().expect("updater pending lock");
        pending.push((segment_path.to_string(), segment_hint));
    }
}

impl Drop for SegmentCacheUpdater {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(state: &UpdaterState, metacache: &Metacache) {
    // Wake up every second to process tasks.
    let wait_timeout = Duration::from_secs(1);
    while !state.stopped.load(Ordering::Acquire) {
        let tasks = {
            let guard = state.segments.lock().expect("updater pending lock");
            let (mut guard, _timeout) = state
                .cv
                .wait_timeout_while(guard, wait_timeout, |_| {
                    !state.stopped.load(Ordering::Acquire)
                })
                .expect("updater pending wait");
            std::mem::take(&mut *guard)
        };
        if state.stopped.load(Ordering::Acquire) {
            break;
        }
        process_tasks(state, metacache, tasks);
    }
}

fn process_tasks(
    state: &UpdaterState,
    metacache: &Metacache,
    tasks: Vec<(String, usize)>,
) -> usize {
    let mut processed_paths: HashSet<String> = HashSet::new();
    for (path, hint) in tasks {
        if state.stopped.load(Ordering::Acquire) {
            return processed_paths.len();
        }

        // A path already processed this round stays cached, so a duplicate
        // request has nothing left to do regardless of its hint.
        if processed_paths.contains(&path) {
            continue;
        }

        let Some(segment) = metacache.lookup_segment(&path) else {
            continue;
        };
        if hint != 0 && Arc::as_ptr(&segment) as usize != hint {
            continue;
        }

        let mem_cost = segment.mem_usage();
        let done = metacache.cache_segment_if_present(&path, mem_cost, hint);
        if done != 0 {
            processed_paths.insert(path);
        }
    }
    processed_paths.len()
}
