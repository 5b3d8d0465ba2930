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
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use chrono::Utc;
use prost::Message;
use regex::Regex;

use crate::common::config::{
    experimental_lake_wait_per_delete_ms, lake_print_delete_log, lake_vacuum_min_batch_delete_size,
    lake_vacuum_retry_max_attempts, lake_vacuum_retry_min_delay_ms, lake_vacuum_retry_pattern,
};
use crate::common::status::{Result, Status, ignore_not_found};
use crate::fs::{DirEntry, FileSystem};
use crate::novalake_logging::{debug, error, info, warn};
use crate::runtime::{DeleteTaskHandle, completed_task_handle, delete_file_executor};
use crate::service::proto::{TabletInfoPb, TabletMetadataPb, VacuumRequest, VacuumResponse};
use crate::storage::lake::filenames::{
    METADATA_DIRECTORY_NAME, SEGMENT_DIRECTORY_NAME, TXN_LOG_DIRECTORY_NAME, extract_txn_id_prefix,
    is_segment, is_sst, is_tablet_metadata, join_path, parse_combined_txn_log_filename,
    parse_tablet_metadata_filename, parse_txn_log_filename, parse_txn_slog_filename,
    parse_txn_vlog_filename, tablet_metadata_filename,
};
use crate::storage::lake::tablet_manager::TabletManager;

/// Tablet id under which bundled (partition-level) metadata files are written.
const BUNDLE_TABLET_ID: i64 = 0;

const DUPLICATE_FILES_ERROR: &str =
    "Duplicate files were returned from the remote storage. The most likely cause is an S3 or \
     HDFS API compatibility issue with your remote storage implementation.";

/// Version range of bundled metadata files eligible for deletion,
/// half-open `[min_version, max_version)`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct VacuumTabletMetaVersionRange {
    pub min_version: i64,
    pub max_version: i64,
}

impl VacuumTabletMetaVersionRange {
    /// Shrink toward the range every tablet can delete: elementwise minimum of
    /// both bounds, so the merged upper bound is the low watermark across
    /// tablets.
    pub fn merge(&mut self, min: i64, max: i64) {
        if self.min_version == 0 && self.max_version == 0 {
            self.min_version = min;
            self.max_version = max;
        } else {
            self.min_version = self.min_version.min(min);
            self.max_version = self.max_version.min(max);
        }
    }
}

/// Classifies deletion failures as retriable and computes the backoff.
pub(crate) struct DeleteRetryPolicy {
    max_attempts: i64,
    min_delay_ms: i64,
    pattern: Option<Regex>,
}

impl DeleteRetryPolicy {
    pub fn from_config() -> Self {
        Self::new(
            lake_vacuum_retry_max_attempts(),
            &lake_vacuum_retry_pattern(),
            lake_vacuum_retry_min_delay_ms(),
        )
    }

    pub fn new(max_attempts: i64, pattern: &str, min_delay_ms: i64) -> Self {
        let pattern = if pattern.is_empty() {
            None
        } else {
            match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("invalid lake_vacuum_retry_pattern '{}': {}", pattern, e);
                    None
                }
            }
        };
        Self {
            max_attempts,
            min_delay_ms,
            pattern,
        }
    }

    pub fn should_retry(&self, st: &Status, attempted_retries: i64) -> bool {
        if attempted_retries >= self.max_attempts {
            return false;
        }
        if st.is_resource_busy() {
            return true;
        }
        self.pattern
            .as_ref()
            .is_some_and(|re| re.is_match(st.message()))
    }

    pub fn retry_delay(&self, attempted_retries: i64) -> Duration {
        let shift = attempted_retries.clamp(0, 20) as u32;
        Duration::from_millis((self.min_delay_ms.max(0) as u64) << shift)
    }
}

fn delete_files_with_retry(fs: &FileSystem, paths: &[String]) -> Result<()> {
    let policy = DeleteRetryPolicy::from_config();
    let mut attempted_retries: i64 = 0;
    loop {
        match fs.delete_files(paths) {
            Ok(()) => return Ok(()),
            Err(st) if policy.should_retry(&st, attempted_retries) => {
                let delay = policy.retry_delay(attempted_retries);
                warn!(
                    "Fail to delete: {} will retry after {}ms",
                    st,
                    delay.as_millis()
                );
                sleep(delay);
                attempted_retries += 1;
            }
            Err(st) => return Err(st),
        }
    }
}

fn delete_single_batch(fs: &FileSystem, batch: &[String]) -> Result<()> {
    let wait_duration = experimental_lake_wait_per_delete_ms();
    if wait_duration > 0 {
        sleep(Duration::from_millis(wait_duration as u64));
    }

    if lake_print_delete_log() {
        for (i, path) in batch.iter().enumerate() {
            info!("Deleting {} ({}/{})", path, i + 1, batch.len());
        }
    }

    let t0 = Instant::now();
    match delete_files_with_retry(fs, batch) {
        Ok(()) => {
            debug!(
                "Deleted {} files cost {}us",
                batch.len(),
                t0.elapsed().as_micros()
            );
            Ok(())
        }
        Err(st) => {
            warn!("Fail to delete: {}", st);
            Err(st)
        }
    }
}

/// Batch delete files with the given file system.
pub(crate) fn do_delete_files(fs: &FileSystem, paths: &[String]) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }
    let batch_size = lake_vacuum_min_batch_delete_size();
    for batch in paths.chunks(batch_size) {
        delete_single_batch(fs, batch)?;
    }
    Ok(())
}

/// Batch delete files with an automatically derived file system.
/// REQUIRE: all paths share one file system scheme.
pub fn delete_files(paths: &[String]) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }
    let fs = FileSystem::create_shared_from_string(&paths[0])?;
    do_delete_files(&fs, paths)
}

/// Fire-and-forget deletion through the shared worker pool.
pub fn delete_files_async(files_to_delete: Vec<String>) {
    if files_to_delete.is_empty() {
        return;
    }
    delete_file_executor().submit_detached(move || {
        if let Err(st) = delete_files(&files_to_delete) {
            error!("async delete failed: {}", st);
        }
    });
}

/// Deletion through the shared worker pool with an awaitable handle.
pub fn delete_files_callable(files_to_delete: Vec<String>) -> DeleteTaskHandle {
    if files_to_delete.is_empty() {
        return completed_task_handle(Ok(()));
    }
    delete_file_executor().submit(move || delete_files(&files_to_delete))
}

/// Run an arbitrary cleanup job on the shared delete pool.
pub fn run_clear_task_async<F>(task: F)
where
    F: FnOnce() + Send + 'static,
{
    delete_file_executor().submit_detached(task);
}

pub type DeleteCallback = Box<dyn Fn(&[String]) + Send>;

/// Accumulates paths into batches and deletes them asynchronously, keeping at
/// most one batch in flight. A failure of the previous batch surfaces at the
/// next `delete_file` or at `finish`; no further batches are submitted after
/// that.
pub struct AsyncFileDeleter {
    batch_size: usize,
    delete_count: i64,
    batch: Vec<String>,
    prev_task: Option<DeleteTaskHandle>,
    cb: Option<DeleteCallback>,
}

impl AsyncFileDeleter {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            delete_count: 0,
            batch: Vec::new(),
            prev_task: None,
            cb: None,
        }
    }

    /// The callback runs synchronously right before a batch is handed to the
    /// pool; metadata deleters use it to drop cache entries so no cached
    /// snapshot can outlive the delete call.
    pub fn with_callback(batch_size: usize, cb: DeleteCallback) -> Self {
        let mut deleter = Self::new(batch_size);
        deleter.cb = Some(cb);
        deleter
    }

    pub fn delete_file(&mut self, path: String) -> Result<()> {
        self.batch.push(path);
        if self.batch.len() < self.batch_size {
            return Ok(());
        }
        self.submit()
    }

    pub fn finish(&mut self) -> Result<()> {
        if !self.batch.is_empty() {
            self.submit()?;
        }
        self.wait()
    }

    /// Number of paths handed to the pipeline, not necessarily deleted on
    /// failure.
    pub fn delete_count(&self) -> i64 {
        self.delete_count
    }

    fn wait(&mut self) -> Result<()> {
        match self.prev_task.take() {
            Some(task) => task.wait(),
            None => Ok(()),
        }
    }

    fn submit(&mut self) -> Result<()> {
        // Await the previous batch before submitting a new one.
        self.wait()?;
        self.delete_count += self.batch.len() as i64;
        if let Some(cb) = &self.cb {
            cb(&self.batch);
        }
        let files = std::mem::take(&mut self.batch);
        self.prev_task = Some(delete_files_callable(files));
        Ok(())
    }
}

/// Deleter for files shared by multiple tablets. Per-tablet planning only
/// records them; whether a file is really deletable is decided after every
/// tablet finished, by subtracting the files still referenced at the highest
/// vacuumed version.
pub struct AsyncBundleFileDeleter {
    deleter: AsyncFileDeleter,
    // file to shared count.
    pending_files: HashMap<String, u32>,
    delay_delete_files: HashSet<String>,
}

impl AsyncBundleFileDeleter {
    pub fn new(batch_size: usize) -> Self {
        Self {
            deleter: AsyncFileDeleter::new(batch_size),
            pending_files: HashMap::new(),
            delay_delete_files: HashSet::new(),
        }
    }

    pub fn delete_file(&mut self, path: String) -> Result<()> {
        *self.pending_files.entry(path).or_insert(0) += 1;
        Ok(())
    }

    pub fn delay_delete(&mut self, path: String) -> Result<()> {
        self.delay_delete_files.insert(path);
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        for (path, count) in &self.pending_files {
            if !self.delay_delete_files.contains(path) {
                if lake_print_delete_log() {
                    info!("Deleting bundle file: {} ref count: {}", path, count);
                }
                self.deleter.delete_file(path.clone())?;
            }
        }
        self.deleter.finish()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_files.is_empty()
    }

    pub fn delete_count(&self) -> i64 {
        self.deleter.delete_count()
    }
}

fn collect_garbage_files(
    metadata: &TabletMetadataPb,
    base_dir: &str,
    deleter: &mut AsyncFileDeleter,
    mut bundle_file_deleter: Option<&mut AsyncBundleFileDeleter>,
    garbage_data_size: &mut i64,
) -> Result<()> {
    for rowset in &metadata.compaction_inputs {
        for segment in &rowset.segments {
            match bundle_file_deleter.as_deref_mut() {
                Some(bundle) if !rowset.bundle_file_offsets.is_empty() => {
                    bundle.delete_file(join_path(base_dir, segment))?;
                }
                _ => deleter.delete_file(join_path(base_dir, segment))?,
            }
        }
        for del_file in &rowset.del_files {
            if let Some(name) = del_file.name.as_deref().filter(|v| !v.is_empty()) {
                deleter.delete_file(join_path(base_dir, name))?;
            }
        }
        *garbage_data_size += rowset.data_size.unwrap_or(0);
    }
    for file in &metadata.orphan_files {
        if let Some(name) = file.name.as_deref().filter(|v| !v.is_empty()) {
            deleter.delete_file(join_path(base_dir, name))?;
        }
        *garbage_data_size += file.size.unwrap_or(0);
    }
    Ok(())
}

/// Register every bundle file still referenced at `version` so `finish` skips
/// it. `version` is the highest vacuumed version across the tablet group, the
/// strongest upper bound on the live set under concurrent per-tablet progress.
fn collect_alive_bundle_files(
    tablet_mgr: &TabletManager,
    tablet_infos: &[TabletInfoPb],
    version: i64,
    root_dir: &str,
    deleter: &mut AsyncBundleFileDeleter,
) -> Result<()> {
    let data_dir = join_path(root_dir, SEGMENT_DIRECTORY_NAME);
    for tablet_info in tablet_infos {
        let tablet_id = tablet_info.tablet_id.unwrap_or(0);
        // The snapshot must exist; not-found here is an error, not a chain end.
        let metadata = tablet_mgr.get_tablet_metadata(tablet_id, version, false)?;
        for rowset in &metadata.rowsets {
            if !rowset.bundle_file_offsets.is_empty() {
                for segment in &rowset.segments {
                    deleter.delay_delete(join_path(&data_dir, segment))?;
                }
            }
        }
    }
    Ok(())
}

fn collect_extra_files_size(metadata: &TabletMetadataPb, min_retain_version: i64) -> i64 {
    if metadata.version.unwrap_or(0) > min_retain_version {
        return 0;
    }
    let mut extra_file_size: i64 = 0;
    for rowset in &metadata.compaction_inputs {
        extra_file_size += rowset.data_size.unwrap_or(0);
    }
    for file in &metadata.orphan_files {
        extra_file_size += file.size.unwrap_or(0);
    }
    extra_file_size
}

/// Walk one tablet's metadata chain backwards from `min_retain_version` along
/// `prev_garbage_version` and hand everything past retention to the deleters.
///
/// The youngest snapshot committed before `grace_timestamp` is retained: the
/// grace timestamp is the earliest possible start time of queries still in
/// flight, and such a query may need the last state that existed before it
/// started. Only the snapshots older than that one are deletable.
#[allow(clippy::too_many_arguments)]
fn collect_files_to_vacuum(
    tablet_mgr: &TabletManager,
    root_dir: &str,
    tablet_info: &mut TabletInfoPb,
    grace_timestamp: i64,
    min_retain_version: i64,
    mut vacuum_version_range: Option<&mut VacuumTabletMetaVersionRange>,
    datafile_deleter: &mut AsyncFileDeleter,
    metafile_deleter: &mut AsyncFileDeleter,
    bundle_file_deleter: &mut AsyncBundleFileDeleter,
    total_datafile_size: &mut i64,
    vacuumed_version: &mut i64,
    extra_datafile_size: &mut i64,
) -> Result<()> {
    let t0 = Instant::now();
    let meta_dir = join_path(root_dir, METADATA_DIRECTORY_NAME);
    let data_dir = join_path(root_dir, SEGMENT_DIRECTORY_NAME);
    let mut final_retain_version = min_retain_version;
    let mut version = final_retain_version;
    let tablet_id = tablet_info.tablet_id.unwrap_or(0);
    let min_version = tablet_info.min_version.unwrap_or(0).max(1);
    // grace_timestamp <= 0 means no grace timestamp.
    let mut skip_check_grace_timestamp = grace_timestamp <= 0;
    let mut extra_file_size: i64 = 0;
    let mut prepare_vacuum_file_size: i64 = 0;
    // The chain strictly decreases, so it can have at most this many entries.
    let mut remaining_hops = final_retain_version;
    while version >= min_version {
        let metadata = match tablet_mgr.get_tablet_metadata(tablet_id, version, false) {
            Err(st) if st.is_not_found() => break,
            Err(st) => return Err(st),
            Ok(metadata) => metadata,
        };
        extra_file_size += collect_extra_files_size(&metadata, min_retain_version);
        if skip_check_grace_timestamp {
            debug_assert!(version <= final_retain_version);
            collect_garbage_files(
                &metadata,
                &data_dir,
                datafile_deleter,
                Some(bundle_file_deleter),
                &mut prepare_vacuum_file_size,
            )?;
        } else {
            // A zero commit time marks a legacy snapshot; it compares below
            // any positive grace timestamp and therefore becomes the retained
            // snapshot, which is the safe side.
            let compare_time = metadata.commit_time.filter(|t| *t > 0).unwrap_or(0);
            if compare_time < grace_timestamp {
                // The youngest snapshot older than the grace line: retain the
                // snapshot itself, but its recorded garbage is deletable, and
                // everything older no longer needs the grace check.
                final_retain_version = version;
                skip_check_grace_timestamp = true;
                collect_garbage_files(
                    &metadata,
                    &data_dir,
                    datafile_deleter,
                    Some(bundle_file_deleter),
                    total_datafile_size,
                )?;
            } else {
                debug_assert!(version <= final_retain_version);
                final_retain_version = version;
            }
        }

        let prev_garbage_version = metadata.prev_garbage_version.unwrap_or(0);
        if prev_garbage_version >= version {
            return Err(Status::corruption(format!(
                "metadata chain corrupted: tablet_id={} version={} prev_garbage_version={}",
                tablet_id, version, prev_garbage_version
            )));
        }
        remaining_hops -= 1;
        if remaining_hops < 0 {
            return Err(Status::corruption(format!(
                "metadata chain of tablet_id={} does not terminate",
                tablet_id
            )));
        }
        version = prev_garbage_version;
    }
    debug!(
        "tablet_id={} metadata travel took {}ms",
        tablet_id,
        t0.elapsed().as_millis()
    );
    if !skip_check_grace_timestamp {
        // Every snapshot on the chain is younger than the grace line, so the
        // retention point is ambiguous. Report one version below the oldest
        // retained snapshot so its garbage stays reachable for the next run,
        // and delete no metadata.
        *vacuumed_version = final_retain_version - 1;
        return Ok(());
    }
    *vacuumed_version = final_retain_version;
    debug_assert!(version <= final_retain_version);
    match vacuum_version_range.as_deref_mut() {
        None => {
            for v in (version + 1)..final_retain_version {
                metafile_deleter
                    .delete_file(join_path(&meta_dir, &tablet_metadata_filename(tablet_id, v)))?;
            }
        }
        // With file bundling the metadata files are shared across the
        // partition; only remember the range and let the caller decide what is
        // deletable for all tablets at once.
        Some(range) => range.merge(version + 1, final_retain_version),
    }
    tablet_info.min_version = Some(final_retain_version);
    *total_datafile_size += prepare_vacuum_file_size;
    *extra_datafile_size += extra_file_size;
    Ok(())
}

fn metafile_delete_cb(tablet_mgr: &TabletManager) -> DeleteCallback {
    let metacache = Arc::clone(tablet_mgr.metacache());
    // The cache key for tablet metadata is the metadata file path.
    Box::new(move |files: &[String]| {
        for path in files {
            metacache.erase(path);
        }
    })
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn vacuum_tablet_metadata(
    tablet_mgr: &TabletManager,
    root_dir: &str,
    tablet_infos: &mut [TabletInfoPb],
    min_retain_version: i64,
    grace_timestamp: i64,
    enable_file_bundling: bool,
    vacuumed_files: &mut i64,
    vacuumed_file_size: &mut i64,
    vacuumed_version: &mut i64,
    extra_file_size: &mut i64,
) -> Result<()> {
    debug_assert!(tablet_infos.is_sorted_by_key(|info| info.tablet_id.unwrap_or(0)));
    debug_assert!(min_retain_version >= 0);
    debug_assert!(grace_timestamp >= 0);

    let batch_size = lake_vacuum_min_batch_delete_size();
    let mut vacuum_version_range =
        enable_file_bundling.then(VacuumTabletMetaVersionRange::default);
    let mut bundle_file_deleter = AsyncBundleFileDeleter::new(batch_size);
    let mut final_vacuum_version = i64::MAX;
    let mut max_vacuum_version: i64 = 0;
    for tablet_info in tablet_infos.iter_mut() {
        let mut tablet_vacuumed_version: i64 = 0;
        let mut datafile_deleter = AsyncFileDeleter::new(batch_size);
        let mut metafile_deleter =
            AsyncFileDeleter::with_callback(usize::MAX, metafile_delete_cb(tablet_mgr));
        collect_files_to_vacuum(
            tablet_mgr,
            root_dir,
            tablet_info,
            grace_timestamp,
            min_retain_version,
            vacuum_version_range.as_mut(),
            &mut datafile_deleter,
            &mut metafile_deleter,
            &mut bundle_file_deleter,
            vacuumed_file_size,
            &mut tablet_vacuumed_version,
            extra_file_size,
        )?;
        datafile_deleter.finish()?;
        *vacuumed_files += datafile_deleter.delete_count();
        if !enable_file_bundling {
            metafile_deleter.finish()?;
            *vacuumed_files += metafile_deleter.delete_count();
        }
        // The partition-wide safe point is the minimum tablet vacuumed version.
        final_vacuum_version = final_vacuum_version.min(tablet_vacuumed_version);
        max_vacuum_version = max_vacuum_version.max(tablet_vacuumed_version);
    }
    if max_vacuum_version > 0 && !bundle_file_deleter.is_empty() {
        collect_alive_bundle_files(
            tablet_mgr,
            tablet_infos,
            max_vacuum_version,
            root_dir,
            &mut bundle_file_deleter,
        )?;
        bundle_file_deleter.finish()?;
        *vacuumed_files += bundle_file_deleter.delete_count();
    }
    if enable_file_bundling {
        if let Some(range) = vacuum_version_range.as_ref() {
            let mut metafile_deleter =
                AsyncFileDeleter::with_callback(usize::MAX, metafile_delete_cb(tablet_mgr));
            let meta_dir = join_path(root_dir, METADATA_DIRECTORY_NAME);
            // A tablet created by a finished alter job writes its initial
            // metadata under its own tablet_id so the bundled file is not
            // overwritten; those files are vacuumed per tablet_id here.
            if range.min_version <= 1 {
                for tablet_info in tablet_infos.iter() {
                    metafile_deleter.delete_file(join_path(
                        &meta_dir,
                        &tablet_metadata_filename(tablet_info.tablet_id.unwrap_or(0), 1),
                    ))?;
                }
            }
            for v in range.min_version..range.max_version {
                metafile_deleter.delete_file(join_path(
                    &meta_dir,
                    &tablet_metadata_filename(BUNDLE_TABLET_ID, v),
                ))?;
            }
            metafile_deleter.finish()?;
            *vacuumed_files += metafile_deleter.delete_count();
        }
    }
    *vacuumed_version = final_vacuum_version;
    Ok(())
}

fn vacuum_txn_log(
    root_location: &str,
    min_active_txn_id: i64,
    vacuumed_files: &mut i64,
    vacuumed_file_size: &mut i64,
) -> Result<()> {
    let fs = FileSystem::create_shared_from_string(root_location)?;
    let t0 = Instant::now();
    let batch_size = lake_vacuum_min_batch_delete_size();
    let mut deleter = AsyncFileDeleter::new(batch_size);
    let mut ret: Result<()> = Ok(());
    let log_dir = join_path(root_location, TXN_LOG_DIRECTORY_NAME);
    let iter_st = ignore_not_found(fs.iterate_dir2(&log_dir, |entry: DirEntry| {
        let expired = if let Some((_, txn_id)) = parse_txn_log_filename(&entry.name) {
            txn_id < min_active_txn_id
        } else if let Some((_, txn_id)) = parse_txn_slog_filename(&entry.name) {
            txn_id < min_active_txn_id
        } else if let Some(txn_id) = parse_combined_txn_log_filename(&entry.name) {
            txn_id < min_active_txn_id
        } else {
            // Unknown names are left alone.
            false
        };
        if !expired {
            return true;
        }

        *vacuumed_files += 1;
        *vacuumed_file_size += entry.size.unwrap_or(0);

        let path = join_path(&log_dir, &entry.name);
        match deleter.delete_file(path) {
            Ok(()) => true,
            Err(st) => {
                warn!(
                    "Fail to delete {}: {}",
                    join_path(&log_dir, &entry.name),
                    st
                );
                if ret.is_ok() {
                    ret = Err(st);
                }
                false // Stop listing if delete failed.
            }
        }
    }));
    if ret.is_ok() {
        ret = iter_st;
    }
    let finish_st = deleter.finish();
    if ret.is_ok() {
        ret = finish_st;
    }

    debug!("txn log vacuum took {}ms", t0.elapsed().as_millis());

    ret
}

pub fn vacuum_impl(tablet_mgr: &TabletManager, request: &VacuumRequest) -> Result<VacuumResponse> {
    if request.tablet_ids.is_empty() && request.tablet_infos.is_empty() {
        return Err(Status::invalid_argument(
            "both tablet_ids and tablet_infos are empty",
        ));
    }
    if request.min_retain_version.unwrap_or(0) <= 0 {
        return Err(Status::invalid_argument(
            "value of min_retain_version is zero or negative",
        ));
    }
    if request.grace_timestamp.unwrap_or(0) <= 0 {
        return Err(Status::invalid_argument(
            "value of grace_timestamp is zero or negative",
        ));
    }

    let mut tablet_infos = if !request.tablet_infos.is_empty() {
        request.tablet_infos.clone()
    } else {
        // Request from an older coordinator carrying bare tablet ids.
        request
            .tablet_ids
            .iter()
            .map(|tablet_id| TabletInfoPb {
                tablet_id: Some(*tablet_id),
                min_version: Some(0),
            })
            .collect()
    };
    tablet_infos.sort_by_key(|info| info.tablet_id.unwrap_or(0));

    let root_loc = tablet_mgr.tablet_root_location(tablet_infos[0].tablet_id.unwrap_or(0));
    let min_retain_version = request.min_retain_version.unwrap_or(0);
    let grace_timestamp = request.grace_timestamp.unwrap_or(0);
    let min_active_txn_id = request.min_active_txn_id.unwrap_or(0);

    let mut vacuumed_files: i64 = 0;
    let mut vacuumed_file_size: i64 = 0;
    let mut vacuumed_version: i64 = 0;
    let mut extra_file_size: i64 = 0;

    vacuum_tablet_metadata(
        tablet_mgr,
        &root_loc,
        &mut tablet_infos,
        min_retain_version,
        grace_timestamp,
        request.enable_file_bundling.unwrap_or(false),
        &mut vacuumed_files,
        &mut vacuumed_file_size,
        &mut vacuumed_version,
        &mut extra_file_size,
    )?;
    extra_file_size -= vacuumed_file_size;
    if request.delete_txn_log.unwrap_or(false) {
        vacuum_txn_log(
            &root_loc,
            min_active_txn_id,
            &mut vacuumed_files,
            &mut vacuumed_file_size,
        )?;
    }

    Ok(VacuumResponse {
        status: None,
        vacuumed_files: Some(vacuumed_files),
        vacuumed_file_size: Some(vacuumed_file_size),
        vacuumed_version: Some(vacuumed_version),
        extra_file_size: Some(extra_file_size),
        tablet_infos,
    })
}

/// Full purge for a sorted tablet set: every metadata version, every txn log
/// of those tablets, and all data files either still live at the latest
/// snapshot or recorded as garbage anywhere on the chain.
pub fn delete_tablets_impl(
    tablet_mgr: &TabletManager,
    root_dir: &str,
    tablet_ids: &[i64],
) -> Result<()> {
    debug_assert!(tablet_ids.is_sorted());

    let fs = FileSystem::create_shared_from_string(root_dir)?;

    let meta_dir = join_path(root_dir, METADATA_DIRECTORY_NAME);
    let data_dir = join_path(root_dir, SEGMENT_DIRECTORY_NAME);
    let log_dir = join_path(root_dir, TXN_LOG_DIRECTORY_NAME);

    let mut txn_logs: BTreeSet<String> = BTreeSet::new();
    let mut duplicate: Option<Status> = None;
    ignore_not_found(fs.iterate_dir(&log_dir, |name: &str| {
        let matched = if let Some((tablet_id, _txn_id)) = parse_txn_log_filename(name) {
            tablet_ids.binary_search(&tablet_id).is_ok()
        } else if let Some((tablet_id, _txn_id)) = parse_txn_slog_filename(name) {
            tablet_ids.binary_search(&tablet_id).is_ok()
        } else if let Some((tablet_id, _version)) = parse_txn_vlog_filename(name) {
            tablet_ids.binary_search(&tablet_id).is_ok()
        } else {
            false
        };
        if !matched {
            return true;
        }

        if !txn_logs.insert(name.to_string()) {
            duplicate = Some(Status::corruption(format!(
                "{} duplicate file: {}",
                DUPLICATE_FILES_ERROR,
                join_path(&log_dir, name)
            )));
            return false;
        }
        true
    }))?;
    if let Some(st) = duplicate.take() {
        error!("{}", st);
        return Err(st);
    }

    let batch_size = lake_vacuum_min_batch_delete_size();
    let mut deleter = AsyncFileDeleter::new(batch_size);
    for log_name in &txn_logs {
        let log_path = join_path(&log_dir, log_name);
        let log = match tablet_mgr.get_txn_log(&log_path, false) {
            Err(st) if st.is_not_found() => continue,
            Err(st) => return Err(st),
            Ok(log) => log,
        };
        if let Some(op) = &log.op_write {
            if let Some(rowset) = &op.rowset {
                for segment in &rowset.segments {
                    deleter.delete_file(join_path(&data_dir, segment))?;
                }
            }
            for del in &op.dels {
                deleter.delete_file(join_path(&data_dir, del))?;
            }
        }
        if let Some(op) = &log.op_compaction {
            if let Some(rowset) = &op.output_rowset {
                for segment in &rowset.segments {
                    deleter.delete_file(join_path(&data_dir, segment))?;
                }
            }
        }
        if let Some(op) = &log.op_schema_change {
            for rowset in &op.rowsets {
                for segment in &rowset.segments {
                    deleter.delete_file(join_path(&data_dir, segment))?;
                }
            }
        }
        deleter.delete_file(log_path)?;
    }

    let mut tablet_versions: HashMap<i64, BTreeSet<i64>> = HashMap::new();
    ignore_not_found(fs.iterate_dir(&meta_dir, |name: &str| {
        if !is_tablet_metadata(name) {
            return true;
        }
        let Some((tablet_id, version)) = parse_tablet_metadata_filename(name) else {
            return true;
        };
        if tablet_ids.binary_search(&tablet_id).is_err() {
            return true;
        }
        if !tablet_versions.entry(tablet_id).or_default().insert(version) {
            duplicate = Some(Status::corruption(format!(
                "{} duplicate file: {}",
                DUPLICATE_FILES_ERROR,
                join_path(&meta_dir, name)
            )));
            return false;
        }
        true
    }))?;
    if let Some(st) = duplicate.take() {
        error!("{}", st);
        return Err(st);
    }

    for (tablet_id, versions) in &tablet_versions {
        let Some(min_version) = versions.first().copied() else {
            continue;
        };
        let Some(max_version) = versions.last().copied() else {
            continue;
        };

        let mut latest_metadata: Option<Arc<TabletMetadataPb>> = None;

        // Walk the chain of metadata with garbage records and delete all those
        // files; the latest snapshot additionally contributes its live files.
        let mut garbage_version = max_version;
        while garbage_version >= min_version {
            let metadata = match tablet_mgr.get_tablet_metadata(*tablet_id, garbage_version, false)
            {
                Err(st) if st.is_not_found() => break,
                Err(st) => {
                    error!(
                        "Fail to read tablet_id={} version={}: {}",
                        tablet_id, garbage_version, st
                    );
                    return Err(st);
                }
                Ok(metadata) => metadata,
            };
            if latest_metadata.is_none() {
                latest_metadata = Some(Arc::clone(&metadata));
            }
            let mut dummy_file_size: i64 = 0;
            collect_garbage_files(&metadata, &data_dir, &mut deleter, None, &mut dummy_file_size)?;
            match metadata.prev_garbage_version {
                Some(prev) if prev < garbage_version => garbage_version = prev,
                Some(prev) => {
                    return Err(Status::corruption(format!(
                        "metadata chain corrupted: tablet_id={} version={} prev_garbage_version={}",
                        tablet_id, garbage_version, prev
                    )));
                }
                None => break,
            }
        }

        if let Some(latest) = latest_metadata {
            for rowset in &latest.rowsets {
                for segment in &rowset.segments {
                    deleter.delete_file(join_path(&data_dir, segment))?;
                }
            }
            if let Some(delvec_meta) = &latest.delvec_meta {
                for file in delvec_meta.version_to_file.values() {
                    if let Some(name) = file.name.as_deref().filter(|v| !v.is_empty()) {
                        deleter.delete_file(join_path(&data_dir, name))?;
                    }
                }
            }
            if let Some(sstable_meta) = &latest.sstable_meta {
                for sstable in &sstable_meta.sstables {
                    if let Some(name) = sstable.filename.as_deref().filter(|v| !v.is_empty()) {
                        deleter.delete_file(join_path(&data_dir, name))?;
                    }
                }
            }
        }

        for version in versions {
            deleter.delete_file(join_path(
                &meta_dir,
                &tablet_metadata_filename(*tablet_id, *version),
            ))?;
        }
    }

    deleter.finish()
}

/// Append-mode audit trail of an orphan scan. An empty path disables it, and
/// write failures never fail the scan.
struct AuditLog {
    file: Option<std::fs::File>,
}

impl AuditLog {
    fn open(path: &str) -> Self {
        if path.trim().is_empty() {
            return Self { file: None };
        }
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Self { file: Some(file) },
            Err(e) => {
                warn!("open audit file {} failed: {}", path, e);
                Self { file: None }
            }
        }
    }

    fn write_line(&mut self, line: &str) {
        if let Some(file) = &mut self.file {
            let _ = writeln!(file, "{line}");
        }
    }
}

fn load_tablet_metadata(fs: &FileSystem, location: &str) -> Result<TabletMetadataPb> {
    let bytes = fs.read_file(location)?;
    TabletMetadataPb::decode(bytes.as_slice())
        .map_err(|e| Status::corruption(format!("parse tablet metadata failed: {location}: {e}")))
}

fn list_meta_files(fs: &FileSystem, metadata_root_location: &str) -> Result<Vec<String>> {
    info!("Start to list {}", metadata_root_location);
    let mut meta_files = Vec::new();
    ignore_not_found(fs.iterate_dir(metadata_root_location, |name: &str| {
        if is_tablet_metadata(name) {
            meta_files.push(name.to_string());
        }
        true
    }))
    .inspect_err(|_| warn!("Failed to list {}", metadata_root_location))?;
    info!("Found {} meta files", meta_files.len());
    Ok(meta_files)
}

fn list_data_files(
    fs: &FileSystem,
    segment_root_location: &str,
    expired_seconds: i64,
) -> Result<BTreeMap<String, DirEntry>> {
    info!("Start to list {}", segment_root_location);
    let mut data_files = BTreeMap::new();
    let mut total_files: i64 = 0;
    let mut total_bytes: i64 = 0;
    let now = Utc::now().timestamp();
    ignore_not_found(fs.iterate_dir2(segment_root_location, |entry: DirEntry| {
        total_files += 1;
        total_bytes += entry.size.unwrap_or(0);

        // Only segment files and SSTs.
        if !is_segment(&entry.name) && !is_sst(&entry.name) {
            return true;
        }
        let Some(mtime) = entry.mtime else {
            warn!("Fail to get modified time of {}", entry.name);
            return true;
        };

        if now >= mtime + expired_seconds {
            data_files.insert(entry.name.clone(), entry);
        }
        true
    }))
    .inspect_err(|_| warn!("Failed to list {}", segment_root_location))?;
    info!(
        "Listed all data files, total files: {}, total bytes: {}, candidate files: {}",
        total_files,
        total_bytes,
        data_files.len()
    );
    Ok(data_files)
}

/// A candidate that is simultaneously referenced by a metadata file means the
/// candidate set is inconsistent with the metadata universe; deleting anything
/// from it would be unsafe.
fn double_check_orphan_files(
    candidates: &BTreeMap<String, DirEntry>,
    referenced: &HashSet<String>,
) -> Result<()> {
    for name in candidates.keys() {
        if referenced.contains(name) {
            warn!("Failed to do double checking, file: {}", name);
            return Err(Status::internal("Failed to do double checking"));
        }
    }
    Ok(())
}

fn find_orphan_data_files(
    fs: &FileSystem,
    root_location: &str,
    expired_seconds: i64,
    audit: &mut AuditLog,
) -> Result<BTreeMap<String, DirEntry>> {
    let metadata_root_location = join_path(root_location, METADATA_DIRECTORY_NAME);
    let segment_root_location = join_path(root_location, SEGMENT_DIRECTORY_NAME);

    let mut data_files = list_data_files(fs, &segment_root_location, expired_seconds)?;
    if data_files.is_empty() {
        return Ok(data_files);
    }

    let meta_files = list_meta_files(fs, &metadata_root_location)?;
    audit.write_line(&format!("Total meta files: {}", meta_files.len()));
    info!("Start to filter with metadatas, count: {}", meta_files.len());

    let mut referenced: HashSet<String> = HashSet::new();
    let mut progress: usize = 0;
    for name in &meta_files {
        let location = join_path(&metadata_root_location, name);
        let metadata = match load_tablet_metadata(fs, &location) {
            // This metadata file was deleted by another node.
            Err(st) if st.is_not_found() => {
                info!("{} is deleted by other node", location);
                continue;
            }
            Err(st) => {
                warn!("Failed to get meta file: {}, status: {}", location, st);
                continue;
            }
            Ok(metadata) => metadata,
        };
        for rowset in &metadata.rowsets {
            for segment in &rowset.segments {
                data_files.remove(segment);
                referenced.insert(segment.clone());
            }
        }
        if let Some(sstable_meta) = &metadata.sstable_meta {
            for sstable in &sstable_meta.sstables {
                if let Some(filename) = sstable.filename.as_deref() {
                    data_files.remove(filename);
                    referenced.insert(filename.to_string());
                }
            }
        }
        progress += 1;
        audit.write_line(&format!("({}/{}) {}", progress, meta_files.len(), name));
        debug!(
            "Filtered with meta file: {} ({}/{})",
            name,
            progress,
            meta_files.len()
        );
    }

    double_check_orphan_files(&data_files, &referenced)?;
    info!("Found {} orphan files", data_files.len());

    Ok(data_files)
}

// root_location is one partition directory.
fn partition_datafile_gc(
    root_location: &str,
    audit_file_path: &str,
    expired_seconds: i64,
    do_delete: bool,
) -> Result<(i64, i64)> {
    let fs = FileSystem::create_shared_from_string(root_location)?;
    let mut audit = AuditLog::open(audit_file_path);

    audit.write_line(&format!(
        "Start to clean partition root location: {root_location}"
    ));
    info!("Start to clean partition root location: {}", root_location);
    let orphan_data_files = find_orphan_data_files(&fs, root_location, expired_seconds, &mut audit)?;

    let segment_root_location = join_path(root_location, SEGMENT_DIRECTORY_NAME);
    let mut files_to_delete = Vec::with_capacity(orphan_data_files.len());
    let mut transaction_ids: BTreeSet<i64> = BTreeSet::new();
    let mut bytes_to_delete: i64 = 0;
    let mut progress: usize = 0;
    for (name, entry) in &orphan_data_files {
        files_to_delete.push(join_path(&segment_root_location, name));
        transaction_ids.insert(extract_txn_id_prefix(name).unwrap_or(0));
        bytes_to_delete += entry.size.unwrap_or(0);
        progress += 1;
        audit.write_line(&format!(
            "({}/{}) {}, size: {}, mtime: {}",
            progress,
            orphan_data_files.len(),
            name,
            entry.size.unwrap_or(0),
            entry.mtime.unwrap_or(0)
        ));
    }

    audit.write_line(&format!(
        "Total orphan data files: {}, total size: {}, total transaction ids: {}",
        orphan_data_files.len(),
        bytes_to_delete,
        transaction_ids.len()
    ));
    info!(
        "Total orphan data files: {}, total size: {}, total transaction ids: {}",
        orphan_data_files.len(),
        bytes_to_delete,
        transaction_ids.len()
    );

    if !do_delete {
        return Ok((orphan_data_files.len() as i64, bytes_to_delete));
    }

    audit.write_line(&format!(
        "Start to delete orphan data files: {}",
        orphan_data_files.len()
    ));
    info!(
        "Start to delete orphan data files: {}, total size: {}",
        orphan_data_files.len(),
        bytes_to_delete
    );
    do_delete_files(&fs, &files_to_delete)?;

    Ok((orphan_data_files.len() as i64, bytes_to_delete))
}

fn path_datafile_gc(
    root_location: &str,
    audit_file_path: &str,
    expired_seconds: i64,
    do_delete: bool,
) -> Result<(i64, i64)> {
    let fs = FileSystem::create_shared_from_string(root_location)?;
    let mut total = (0i64, 0i64);
    let mut inner_error: Option<Status> = None;

    ignore_not_found(fs.iterate_dir2(root_location, |entry: DirEntry| {
        if !entry.is_dir.unwrap_or(false) {
            return true;
        }

        // A layout directory marks this level as a partition root.
        if entry.name == SEGMENT_DIRECTORY_NAME
            || entry.name == METADATA_DIRECTORY_NAME
            || entry.name == TXN_LOG_DIRECTORY_NAME
        {
            match partition_datafile_gc(root_location, audit_file_path, expired_seconds, do_delete)
            {
                Ok((count, bytes)) => {
                    total.0 += count;
                    total.1 += bytes;
                }
                Err(st) => {
                    warn!("Failed to gc: {}, status: {}", root_location, st);
                    inner_error = Some(st);
                }
            }
            return false;
        }

        let child = join_path(root_location, &entry.name);
        match path_datafile_gc(&child, audit_file_path, expired_seconds, do_delete) {
            Ok((count, bytes)) => {
                total.0 += count;
                total.1 += bytes;
                true
            }
            Err(st) => {
                warn!("Failed to gc: {}, status: {}", child, st);
                inner_error = Some(st);
                false
            }
        }
    }))
    .inspect_err(|_| warn!("Failed to list {}", root_location))?;

    if let Some(st) = inner_error {
        return Err(st);
    }
    Ok(total)
}

/// Listing-based reconciliation of `segment/` against the metadata universe
/// under `root_location`, recursing into nested partition directories.
/// Returns `(orphan_count, orphan_bytes)`.
pub fn datafile_gc(
    root_location: &str,
    audit_file_path: &str,
    expired_seconds: i64,
    do_delete: bool,
) -> Result<(i64, i64)> {
    match path_datafile_gc(root_location, audit_file_path, expired_seconds, do_delete) {
        Ok((count, bytes)) => {
            info!(
                "Finished to gc: {}, total orphan data files: {}, total size: {}",
                root_location, count, bytes
            );
            Ok((count, bytes))
        }
        Err(st) => {
            warn!("Failed to gc: {}, status: {}", root_location, st);
            Err(st)
        }
    }
}
