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
//! Shared helpers to lay out a lake tablet root inside a temp directory.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use prost::Message;
use tempfile::TempDir;

use novalake::service::proto::{
    CombinedTxnLogPb, FileMetadataPb, RowsetMetadataPb, TabletMetadataPb, TxnLogPb,
};
use novalake::storage::lake::TabletManager;

pub struct LakeTestEnv {
    pub temp_dir: TempDir,
    pub root: String,
    pub tablet_mgr: TabletManager,
}

impl LakeTestEnv {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let root = temp_dir.path().to_str().expect("utf-8 path").to_string();
        let tablet_mgr = TabletManager::new(&root).expect("create tablet manager");
        Self {
            temp_dir,
            root,
            tablet_mgr,
        }
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.temp_dir.path().join("meta")
    }

    pub fn segment_dir(&self) -> PathBuf {
        self.temp_dir.path().join("segment")
    }

    pub fn txnlog_dir(&self) -> PathBuf {
        self.temp_dir.path().join("txnlog")
    }

    pub fn metadata_path(&self, tablet_id: i64, version: i64) -> PathBuf {
        PathBuf::from(self.tablet_mgr.tablet_metadata_location(tablet_id, version))
    }

    pub fn segment_path(&self, name: &str) -> PathBuf {
        self.segment_dir().join(name)
    }

    pub fn write_metadata(&self, metadata: &TabletMetadataPb) {
        let path = self.metadata_path(metadata.id.unwrap_or(0), metadata.version.unwrap_or(0));
        write_file(&path, &metadata.encode_to_vec());
    }

    pub fn write_txn_log(&self, log: &TxnLogPb) {
        let path = self
            .tablet_mgr
            .txn_log_location(log.tablet_id.unwrap_or(0), log.txn_id.unwrap_or(0));
        write_file(Path::new(&path), &log.encode_to_vec());
    }

    pub fn write_combined_txn_log(&self, txn_id: i64, log: &CombinedTxnLogPb) {
        let path = self.tablet_mgr.combined_txn_log_location(0, txn_id);
        write_file(Path::new(&path), &log.encode_to_vec());
    }

    /// Raw file in `txnlog/`, for vlogs and unrelated names.
    pub fn write_txnlog_file(&self, name: &str, bytes: &[u8]) {
        write_file(&self.txnlog_dir().join(name), bytes);
    }

    pub fn write_segment(&self, name: &str) {
        write_file(&self.segment_path(name), b"segment-bytes");
    }
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, bytes).expect("write file");
}

/// A snapshot whose `compaction_inputs` carry the given garbage segments and
/// whose `rowsets` carry the given live segments.
pub fn make_metadata(
    tablet_id: i64,
    version: i64,
    commit_time: i64,
    prev_garbage_version: i64,
    live_segments: &[&str],
    garbage_segments: &[&str],
) -> TabletMetadataPb {
    TabletMetadataPb {
        id: Some(tablet_id),
        version: Some(version),
        commit_time: Some(commit_time),
        prev_garbage_version: Some(prev_garbage_version),
        rowsets: rowsets_from(live_segments),
        compaction_inputs: rowsets_from(garbage_segments),
        ..Default::default()
    }
}

pub fn rowsets_from(segments: &[&str]) -> Vec<RowsetMetadataPb> {
    if segments.is_empty() {
        return Vec::new();
    }
    vec![RowsetMetadataPb {
        segments: segments.iter().map(|s| s.to_string()).collect(),
        num_rows: Some(100),
        data_size: Some(1024 * segments.len() as i64),
        ..Default::default()
    }]
}

pub fn bundle_rowset(segments: &[&str]) -> RowsetMetadataPb {
    RowsetMetadataPb {
        segments: segments.iter().map(|s| s.to_string()).collect(),
        data_size: Some(2048),
        bundle_file_offsets: (0..segments.len() as i64).map(|i| i * 1024).collect(),
        ..Default::default()
    }
}

pub fn orphan_file(name: &str, size: i64) -> FileMetadataPb {
    FileMetadataPb {
        name: Some(name.to_string()),
        size: Some(size),
        shared: None,
    }
}
