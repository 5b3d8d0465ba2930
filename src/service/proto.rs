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

//! Prost message definitions for the lake wire format (tablet metadata, txn
//! logs, and the maintenance request/response surface). Hand-maintained in
//! generated style so builds do not require protoc; tags are part of the
//! on-disk format and must never be reused.

use std::collections::HashMap;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatusPb {
    #[prost(int32, tag = "1")]
    pub status_code: i32,
    #[prost(string, repeated, tag = "2")]
    pub error_msgs: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileMetadataPb {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(int64, optional, tag = "2")]
    pub size: Option<i64>,
    #[prost(bool, optional, tag = "3")]
    pub shared: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RowsetMetadataPb {
    #[prost(uint32, optional, tag = "1")]
    pub id: Option<u32>,
    #[prost(bool, optional, tag = "2")]
    pub overlapped: Option<bool>,
    #[prost(string, repeated, tag = "3")]
    pub segments: Vec<String>,
    #[prost(int64, optional, tag = "4")]
    pub num_rows: Option<i64>,
    #[prost(int64, optional, tag = "5")]
    pub data_size: Option<i64>,
    #[prost(message, repeated, tag = "6")]
    pub del_files: Vec<FileMetadataPb>,
    #[prost(int64, repeated, tag = "7")]
    pub segment_size: Vec<i64>,
    /// Non-empty iff the rowset's segments live in bundle files shared across
    /// tablets of the partition.
    #[prost(int64, repeated, tag = "8")]
    pub bundle_file_offsets: Vec<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DelvecMetadataPb {
    #[prost(map = "int64, message", tag = "1")]
    pub version_to_file: HashMap<i64, FileMetadataPb>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PersistentIndexSstablePb {
    #[prost(string, optional, tag = "1")]
    pub filename: Option<String>,
    #[prost(uint64, optional, tag = "2")]
    pub filesize: Option<u64>,
    #[prost(bool, optional, tag = "3")]
    pub shared: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PersistentIndexSstableMetaPb {
    #[prost(message, repeated, tag = "1")]
    pub sstables: Vec<PersistentIndexSstablePb>,
}

/// One immutable snapshot of a tablet.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TabletMetadataPb {
    #[prost(int64, optional, tag = "1")]
    pub id: Option<i64>,
    #[prost(int64, optional, tag = "2")]
    pub version: Option<i64>,
    #[prost(message, repeated, tag = "3")]
    pub rowsets: Vec<RowsetMetadataPb>,
    /// Rowsets superseded by a compaction; garbage from this version onward.
    #[prost(message, repeated, tag = "4")]
    pub compaction_inputs: Vec<RowsetMetadataPb>,
    /// Deleted unconditionally once this snapshot is past retention.
    #[prost(message, repeated, tag = "5")]
    pub orphan_files: Vec<FileMetadataPb>,
    /// The immediately older snapshot that still records garbage. Strictly
    /// smaller than `version`.
    #[prost(int64, optional, tag = "6")]
    pub prev_garbage_version: Option<i64>,
    /// Seconds since epoch; 0 for legacy snapshots with no commit time.
    #[prost(int64, optional, tag = "7")]
    pub commit_time: Option<i64>,
    #[prost(message, optional, tag = "8")]
    pub delvec_meta: Option<DelvecMetadataPb>,
    #[prost(message, optional, tag = "9")]
    pub sstable_meta: Option<PersistentIndexSstableMetaPb>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxnLogPb {
    #[prost(int64, optional, tag = "1")]
    pub tablet_id: Option<i64>,
    #[prost(int64, optional, tag = "2")]
    pub txn_id: Option<i64>,
    #[prost(message, optional, tag = "3")]
    pub op_write: Option<txn_log_pb::OpWrite>,
    #[prost(message, optional, tag = "4")]
    pub op_compaction: Option<txn_log_pb::OpCompaction>,
    #[prost(message, optional, tag = "5")]
    pub op_schema_change: Option<txn_log_pb::OpSchemaChange>,
}

pub mod txn_log_pb {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct OpWrite {
        #[prost(message, optional, tag = "1")]
        pub rowset: Option<super::RowsetMetadataPb>,
        #[prost(string, repeated, tag = "2")]
        pub dels: Vec<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct OpCompaction {
        #[prost(uint32, repeated, tag = "1")]
        pub input_rowsets: Vec<u32>,
        #[prost(message, optional, tag = "2")]
        pub output_rowset: Option<super::RowsetMetadataPb>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct OpSchemaChange {
        #[prost(message, repeated, tag = "1")]
        pub rowsets: Vec<super::RowsetMetadataPb>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CombinedTxnLogPb {
    #[prost(message, repeated, tag = "1")]
    pub txn_logs: Vec<TxnLogPb>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TabletInfoPb {
    #[prost(int64, optional, tag = "1")]
    pub tablet_id: Option<i64>,
    /// Lower bound already known vacuumed; rises monotonically across
    /// successful vacuums.
    #[prost(int64, optional, tag = "2")]
    pub min_version: Option<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxnInfoPb {
    #[prost(int64, optional, tag = "1")]
    pub txn_id: Option<i64>,
    #[prost(bool, optional, tag = "2")]
    pub combined_txn_log: Option<bool>,
    #[prost(int64, optional, tag = "3")]
    pub commit_time: Option<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VacuumRequest {
    /// Kept for older coordinators; upgraded to `tablet_infos` with
    /// min_version 0.
    #[prost(int64, repeated, tag = "1")]
    pub tablet_ids: Vec<i64>,
    #[prost(int64, optional, tag = "2")]
    pub min_retain_version: Option<i64>,
    #[prost(int64, optional, tag = "3")]
    pub grace_timestamp: Option<i64>,
    #[prost(int64, optional, tag = "4")]
    pub min_active_txn_id: Option<i64>,
    #[prost(bool, optional, tag = "5")]
    pub delete_txn_log: Option<bool>,
    #[prost(message, repeated, tag = "6")]
    pub tablet_infos: Vec<TabletInfoPb>,
    #[prost(bool, optional, tag = "7")]
    pub enable_file_bundling: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VacuumResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<StatusPb>,
    #[prost(int64, optional, tag = "2")]
    pub vacuumed_files: Option<i64>,
    #[prost(int64, optional, tag = "3")]
    pub vacuumed_file_size: Option<i64>,
    #[prost(int64, optional, tag = "4")]
    pub vacuumed_version: Option<i64>,
    #[prost(int64, optional, tag = "5")]
    pub extra_file_size: Option<i64>,
    #[prost(message, repeated, tag = "6")]
    pub tablet_infos: Vec<TabletInfoPb>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VacuumFullRequest {
    #[prost(int64, repeated, tag = "1")]
    pub tablet_ids: Vec<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VacuumFullResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<StatusPb>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteTabletRequest {
    #[prost(int64, repeated, tag = "1")]
    pub tablet_ids: Vec<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteTabletResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<StatusPb>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteTxnLogRequest {
    #[prost(int64, repeated, tag = "1")]
    pub tablet_ids: Vec<i64>,
    #[prost(int64, repeated, tag = "2")]
    pub txn_ids: Vec<i64>,
    #[prost(message, repeated, tag = "3")]
    pub txn_infos: Vec<TxnInfoPb>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteTxnLogResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<StatusPb>,
}
