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
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};

use threadpool::ThreadPool;

use crate::common::config::lake_delete_file_thread_num;
use crate::common::status::{Result, Status};

struct TaskCompletion {
    done: AtomicBool,
    result: Mutex<Option<Result<()>>>,
    cv: Condvar,
}

impl TaskCompletion {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            result: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn complete(&self, result: Result<()>) {
        {
            let mut guard = self.result.lock().expect("delete task result lock");
            *guard = Some(result);
        }
        self.done.store(true, Ordering::Release);
        self.cv.notify_all();
    }

    fn wait(&self) -> Result<()> {
        let guard = self.result.lock().expect("delete task result lock");
        let mut guard = self
            .cv
            .wait_while(guard, |_| !self.done.load(Ordering::Acquire))
            .expect("delete task result wait");
        guard.take().unwrap_or(Ok(()))
    }
}

/// Handle for one submitted deletion task. `wait` blocks until the task
/// finishes and consumes its result; a second `wait` returns `Ok`.
#[derive(Clone)]
pub struct DeleteTaskHandle {
    completion: Arc<TaskCompletion>,
}

impl DeleteTaskHandle {
    pub fn wait(&self) -> Result<()> {
        self.completion.wait()
    }

    pub fn is_finished(&self) -> bool {
        self.completion.done.load(Ordering::Acquire)
    }
}

/// Produce an already-finished handle carrying `result`.
pub fn completed_task_handle(result: Result<()>) -> DeleteTaskHandle {
    let completion = Arc::new(TaskCompletion::new());
    completion.complete(result);
    DeleteTaskHandle { completion }
}

pub struct DeleteExecutor {
    pool: ThreadPool,
}

impl DeleteExecutor {
    fn new(num_threads: usize) -> Self {
        let threads = num_threads.max(1);
        let pool = ThreadPool::with_name("lake_delete".to_string(), threads);
        Self { pool }
    }

    /// Submit a fallible task; a panic inside the task is captured and
    /// surfaced as an internal status instead of poisoning the pool.
    pub fn submit<F>(&self, task: F) -> DeleteTaskHandle
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let completion = Arc::new(TaskCompletion::new());
        let completion_clone = Arc::clone(&completion);
        self.pool.execute(move || {
            let result = match catch_unwind(AssertUnwindSafe(task)) {
                Ok(result) => result,
                Err(panic) => Err(Status::internal(format!(
                    "delete task panicked: {}",
                    panic_message(&panic)
                ))),
            };
            completion_clone.complete(result);
        });
        DeleteTaskHandle { completion }
    }

    /// Fire-and-forget submission for cleanup jobs whose outcome nobody awaits.
    pub fn submit_detached<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.execute(move || {
            let _ = catch_unwind(AssertUnwindSafe(task));
        });
    }

    pub fn queued_count(&self) -> usize {
        self.pool.queued_count()
    }

    pub fn active_count(&self) -> usize {
        self.pool.active_count()
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

static DELETE_EXECUTOR: OnceLock<DeleteExecutor> = OnceLock::new();

/// The process-wide worker pool for deletion batches and clear tasks.
pub fn delete_file_executor() -> &'static DeleteExecutor {
    DELETE_EXECUTOR.get_or_init(|| DeleteExecutor::new(lake_delete_file_thread_num()))
}

#[cfg(test)]
mod tests {
    use super::{DeleteExecutor, completed_task_handle};
    use crate::common::status::Status;

    #[test]
    fn submit_returns_task_result() {
        let executor = DeleteExecutor::new(2);
        let ok = executor.submit(|| Ok(()));
        assert!(ok.wait().is_ok());

        let err = executor.submit(|| Err(Status::io_error("boom")));
        let st = err.wait().expect_err("error expected");
        assert!(st.message().contains("boom"));
    }

    #[test]
    fn panic_is_captured_as_internal_status() {
        let executor = DeleteExecutor::new(1);
        let handle = executor.submit(|| panic!("kaboom"));
        let st = handle.wait().expect_err("panic should surface");
        assert!(st.message().contains("kaboom"));
    }

    #[test]
    fn wait_consumes_the_result_once() {
        let handle = completed_task_handle(Err(Status::io_error("first")));
        assert!(handle.wait().is_err());
        assert!(handle.wait().is_ok());
    }
}
