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

//! File-name grammar of the tablet layout. Under a tablet root:
//! `meta/` tablet metadata, `segment/` data files (segments, SSTs, delete
//! vectors), `txnlog/` transaction logs. Names are fixed-width hex so that
//! lexicographic order matches numeric order.

pub const METADATA_DIRECTORY_NAME: &str = "meta";
pub const SEGMENT_DIRECTORY_NAME: &str = "segment";
pub const TXN_LOG_DIRECTORY_NAME: &str = "txnlog";

const HEX_WIDTH: usize = 16;

pub fn join_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if parent.is_empty() {
        return name.to_string();
    }
    if name.is_empty() {
        return parent.to_string();
    }
    format!("{parent}/{name}")
}

pub fn tablet_metadata_filename(tablet_id: i64, version: i64) -> String {
    format!("{:016X}_{:016X}.meta", tablet_id as u64, version as u64)
}

pub fn txn_log_filename(tablet_id: i64, txn_id: i64) -> String {
    format!("{:016X}_{:016X}.log", tablet_id as u64, txn_id as u64)
}

pub fn txn_slog_filename(tablet_id: i64, txn_id: i64) -> String {
    format!("{:016X}_{:016X}.slog", tablet_id as u64, txn_id as u64)
}

pub fn txn_vlog_filename(tablet_id: i64, version: i64) -> String {
    format!("{:016X}_{:016X}.vlog", tablet_id as u64, version as u64)
}

pub fn combined_txn_log_filename(txn_id: i64) -> String {
    format!("{:016X}.logs", txn_id as u64)
}

pub fn is_tablet_metadata(name: &str) -> bool {
    parse_tablet_metadata_filename(name).is_some()
}

pub fn is_txn_log(name: &str) -> bool {
    parse_txn_log_filename(name).is_some()
}

pub fn is_txn_slog(name: &str) -> bool {
    parse_txn_slog_filename(name).is_some()
}

pub fn is_txn_vlog(name: &str) -> bool {
    parse_txn_vlog_filename(name).is_some()
}

pub fn is_combined_txn_log(name: &str) -> bool {
    parse_combined_txn_log_filename(name).is_some()
}

pub fn is_segment(name: &str) -> bool {
    name.ends_with(".dat")
}

pub fn is_sst(name: &str) -> bool {
    name.ends_with(".sst")
}

pub fn is_delvec(name: &str) -> bool {
    name.ends_with(".delvec")
}

/// `(tablet_id, version)` from a `meta/` entry.
pub fn parse_tablet_metadata_filename(name: &str) -> Option<(i64, i64)> {
    parse_id_pair(name.strip_suffix(".meta")?)
}

/// `(tablet_id, txn_id)` from a `txnlog/` write-log entry.
pub fn parse_txn_log_filename(name: &str) -> Option<(i64, i64)> {
    parse_id_pair(name.strip_suffix(".log")?)
}

pub fn parse_txn_slog_filename(name: &str) -> Option<(i64, i64)> {
    parse_id_pair(name.strip_suffix(".slog")?)
}

pub fn parse_txn_vlog_filename(name: &str) -> Option<(i64, i64)> {
    parse_id_pair(name.strip_suffix(".vlog")?)
}

pub fn parse_combined_txn_log_filename(name: &str) -> Option<i64> {
    parse_fixed_hex(name.strip_suffix(".logs")?)
}

/// Segment and SST names are minted with a leading `{txn_id:016x}_` by the
/// writer; pull it back out for GC reporting.
pub fn extract_txn_id_prefix(name: &str) -> Option<i64> {
    let (prefix, rest) = name.split_at_checked(HEX_WIDTH)?;
    if !rest.starts_with('_') {
        return None;
    }
    parse_fixed_hex(prefix)
}

fn parse_id_pair(stem: &str) -> Option<(i64, i64)> {
    let (first, second) = stem.split_once('_')?;
    Some((parse_fixed_hex(first)?, parse_fixed_hex(second)?))
}

fn parse_fixed_hex(token: &str) -> Option<i64> {
    if token.len() != HEX_WIDTH {
        return None;
    }
    let parsed = u64::from_str_radix(token, 16).ok()?;
    if parsed > i64::MAX as u64 {
        return None;
    }
    Some(parsed as i64)
}
