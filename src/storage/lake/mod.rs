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
pub mod filenames;
pub mod metacache;
pub mod segment_cache_updater;
pub mod tablet_manager;
pub mod vacuum;

pub use metacache::{Metacache, Segment};
pub use segment_cache_updater::SegmentCacheUpdater;
pub use tablet_manager::TabletManager;
pub use vacuum::{
    AsyncBundleFileDeleter, AsyncFileDeleter, datafile_gc, delete_files, delete_files_async,
    delete_files_callable, delete_tablets_impl, run_clear_task_async, vacuum_impl,
};
