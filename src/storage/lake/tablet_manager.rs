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
use std::sync::Arc;

use prost::Message;

use crate::common::status::{Result, Status};
use crate::fs::FileSystem;
use crate::service::proto::{TabletMetadataPb, TxnLogPb};
use crate::storage::lake::filenames::{
    METADATA_DIRECTORY_NAME, TXN_LOG_DIRECTORY_NAME, combined_txn_log_filename, join_path,
    tablet_metadata_filename, txn_log_filename, txn_slog_filename, txn_vlog_filename,
};
use crate::storage::lake::metacache::{Metacache, Segment};

const DEFAULT_METACACHE_CAPACITY: usize = 128 * 1024 * 1024;

/// Loads and caches parsed tablet state for one tablet root. The manager never
/// writes metadata; maintenance only removes files and cache entries.
pub struct TabletManager {
    root_location: String,
    fs: Arc<FileSystem>,
    metacache: Arc<Metacache>,
}

impl TabletManager {
    pub fn new(root_location: impl Into<String>) -> Result<Self> {
        Self::with_cache_capacity(root_location, DEFAULT_METACACHE_CAPACITY)
    }

    pub fn with_cache_capacity(
        root_location: impl Into<String>,
        cache_capacity: usize,
    ) -> Result<Self> {
        let root_location = root_location.into();
        let root = root_location.trim().trim_end_matches('/').to_string();
        if root.is_empty() {
            return Err(Status::invalid_argument("tablet root location is empty"));
        }
        let fs = FileSystem::create_shared_from_string(&root)?;
        Ok(Self {
            root_location: root,
            fs,
            metacache: Arc::new(Metacache::new(cache_capacity)),
        })
    }

    pub fn fs(&self) -> &Arc<FileSystem> {
        &self.fs
    }

    pub fn metacache(&self) -> &Arc<Metacache> {
        &self.metacache
    }

    /// All tablets of one partition share a root; the id parameter mirrors the
    /// coordinator-facing surface.
    pub fn tablet_root_location(&self, _tablet_id: i64) -> String {
        self.root_location.clone()
    }

    pub fn tablet_metadata_location(&self, tablet_id: i64, version: i64) -> String {
        join_path(
            &join_path(&self.root_location, METADATA_DIRECTORY_NAME),
            &tablet_metadata_filename(tablet_id, version),
        )
    }

    pub fn txn_log_location(&self, tablet_id: i64, txn_id: i64) -> String {
        join_path(
            &join_path(&self.root_location, TXN_LOG_DIRECTORY_NAME),
            &txn_log_filename(tablet_id, txn_id),
        )
    }

    pub fn txn_slog_location(&self, tablet_id: i64, txn_id: i64) -> String {
        join_path(
            &join_path(&self.root_location, TXN_LOG_DIRECTORY_NAME),
            &txn_slog_filename(tablet_id, txn_id),
        )
    }

    pub fn txn_vlog_location(&self, tablet_id: i64, version: i64) -> String {
        join_path(
            &join_path(&self.root_location, TXN_LOG_DIRECTORY_NAME),
            &txn_vlog_filename(tablet_id, version),
        )
    }

    pub fn combined_txn_log_location(&self, _tablet_id: i64, txn_id: i64) -> String {
        join_path(
            &join_path(&self.root_location, TXN_LOG_DIRECTORY_NAME),
            &combined_txn_log_filename(txn_id),
        )
    }

    /// Load one snapshot. Cache key is the metadata file path.
    pub fn get_tablet_metadata(
        &self,
        tablet_id: i64,
        version: i64,
        fill_cache: bool,
    ) -> Result<Arc<TabletMetadataPb>> {
        let location = self.tablet_metadata_location(tablet_id, version);
        if let Some(cached) = self.metacache.lookup_tablet_metadata(&location) {
            return Ok(cached);
        }
        let bytes = self.fs.read_file(&location)?;
        let metadata = TabletMetadataPb::decode(bytes.as_slice()).map_err(|e| {
            Status::corruption(format!("parse tablet metadata failed: {location}: {e}"))
        })?;
        let metadata = Arc::new(metadata);
        if fill_cache {
            self.metacache
                .cache_tablet_metadata(location, Arc::clone(&metadata));
        }
        Ok(metadata)
    }

    /// Load a txn log by its full path (the caller already classified the
    /// name).
    pub fn get_txn_log(&self, path: &str, fill_cache: bool) -> Result<Arc<TxnLogPb>> {
        if let Some(cached) = self.metacache.lookup_txn_log(path) {
            return Ok(cached);
        }
        let bytes = self.fs.read_file(path)?;
        let log = TxnLogPb::decode(bytes.as_slice())
            .map_err(|e| Status::corruption(format!("parse txn log failed: {path}: {e}")))?;
        let log = Arc::new(log);
        if fill_cache {
            self.metacache.cache_txn_log(path.to_string(), Arc::clone(&log));
        }
        Ok(log)
    }

    /// Register an opened segment in the cache with a placeholder charge; the
    /// background updater re-charges it once the real memory cost is known.
    pub fn cache_segment(&self, path: impl Into<String>, segment: Arc<Segment>) {
        self.metacache.cache_segment(path, segment);
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;
    use tempfile::tempdir;

    use super::TabletManager;
    use crate::service::proto::TabletMetadataPb;

    #[test]
    fn metadata_location_layout() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path().to_str().unwrap().to_string();
        let mgr = TabletManager::new(&root).expect("manager");
        assert_eq!(
            mgr.tablet_metadata_location(0x2741, 12),
            format!("{root}/meta/0000000000002741_000000000000000C.meta")
        );
        assert!(mgr.txn_log_location(1, 2).contains("/txnlog/"));
        assert!(mgr.combined_txn_log_location(1, 2).ends_with(".logs"));
    }

    #[test]
    fn get_tablet_metadata_reads_and_caches() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path().to_str().unwrap().to_string();
        let mgr = TabletManager::new(&root).expect("manager");

        let metadata = TabletMetadataPb {
            id: Some(5),
            version: Some(3),
            commit_time: Some(42),
            prev_garbage_version: Some(0),
            ..Default::default()
        };
        let location = mgr.tablet_metadata_location(5, 3);
        std::fs::create_dir_all(dir.path().join("meta")).expect("mkdir");
        std::fs::write(&location, metadata.encode_to_vec()).expect("write metadata");

        let loaded = mgr.get_tablet_metadata(5, 3, true).expect("load");
        assert_eq!(loaded.version, Some(3));

        // Cached copy survives file removal until erased.
        std::fs::remove_file(&location).expect("remove");
        assert!(mgr.get_tablet_metadata(5, 3, true).is_ok());
        mgr.metacache().erase(&location);
        let err = mgr.get_tablet_metadata(5, 3, false).expect_err("gone");
        assert!(err.is_not_found());
    }

    #[test]
    fn missing_metadata_is_not_found() {
        let dir = tempdir().expect("tempdir");
        let mgr = TabletManager::new(dir.path().to_str().unwrap()).expect("manager");
        let err = mgr.get_tablet_metadata(1, 1, false).expect_err("missing");
        assert!(err.is_not_found());
    }
}
