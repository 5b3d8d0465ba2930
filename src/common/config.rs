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
use crate::novalake_config::config as novalake_app_config;

pub(crate) fn lake_vacuum_retry_max_attempts() -> i64 {
    novalake_app_config()
        .ok()
        .map(|c| c.lake.vacuum_retry_max_attempts)
        .unwrap_or(5)
}

pub(crate) fn lake_vacuum_retry_pattern() -> String {
    novalake_app_config()
        .ok()
        .map(|c| c.lake.vacuum_retry_pattern.clone())
        .unwrap_or_else(|| "(?i)request rate".to_string())
}

pub(crate) fn lake_vacuum_retry_min_delay_ms() -> i64 {
    novalake_app_config()
        .ok()
        .map(|c| c.lake.vacuum_retry_min_delay_ms)
        .unwrap_or(100)
}

pub(crate) fn lake_vacuum_min_batch_delete_size() -> usize {
    novalake_app_config()
        .ok()
        .map(|c| c.lake.vacuum_min_batch_delete_size.max(1) as usize)
        .unwrap_or(1000)
}

pub(crate) fn experimental_lake_wait_per_delete_ms() -> i64 {
    novalake_app_config()
        .ok()
        .map(|c| c.lake.experimental_wait_per_delete_ms)
        .unwrap_or(0)
}

pub(crate) fn lake_print_delete_log() -> bool {
    novalake_app_config()
        .ok()
        .map(|c| c.lake.print_delete_log)
        .unwrap_or(false)
}

pub(crate) fn lake_delete_file_thread_num() -> usize {
    novalake_app_config()
        .ok()
        .map(|c| c.lake.delete_file_thread_num.max(1))
        .unwrap_or(8)
}
