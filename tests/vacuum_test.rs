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
//! End-to-end vacuum scenarios against a local tablet root.

use novalake::service::proto::{
    CombinedTxnLogPb, TabletInfoPb, TabletMetadataPb, VacuumRequest,
};
use novalake::storage::lake::filenames::{
    combined_txn_log_filename, txn_log_filename,
};
use novalake::{vacuum, vacuum_full};

use crate::common::{LakeTestEnv, bundle_rowset, make_metadata, orphan_file};

mod common;

fn base_request(tablet_ids: &[i64], min_retain_version: i64, grace_timestamp: i64) -> VacuumRequest {
    VacuumRequest {
        tablet_infos: tablet_ids
            .iter()
            .map(|id| TabletInfoPb {
                tablet_id: Some(*id),
                min_version: Some(0),
            })
            .collect(),
        min_retain_version: Some(min_retain_version),
        grace_timestamp: Some(grace_timestamp),
        ..Default::default()
    }
}

fn assert_ok(status: &Option<novalake::service::proto::StatusPb>) {
    let status = status.as_ref().expect("status set");
    assert_eq!(status.status_code, 0, "unexpected status: {:?}", status);
}

#[test]
fn vacuum_retains_youngest_snapshot_before_grace() {
    let env = LakeTestEnv::new();
    // Chain 10 -> 5; v5 committed before the grace line, v10 after.
    env.write_metadata(&make_metadata(1, 5, 100, 0, &["v5live.dat"], &["v5old.dat"]));
    env.write_metadata(&make_metadata(1, 10, 200, 5, &["v10live.dat"], &["v10old.dat"]));
    for name in ["v5live.dat", "v5old.dat", "v10live.dat", "v10old.dat"] {
        env.write_segment(name);
    }

    let response = vacuum(&env.tablet_mgr, &base_request(&[1], 10, 150));
    assert_ok(&response.status);
    assert_eq!(response.vacuumed_version, Some(5));
    assert_eq!(response.tablet_infos.len(), 1);
    assert_eq!(response.tablet_infos[0].min_version, Some(5));

    // v5 is the youngest snapshot before the grace line: its metadata stays,
    // its recorded garbage goes.
    assert!(env.metadata_path(1, 5).exists());
    assert!(env.metadata_path(1, 10).exists());
    assert!(!env.segment_path("v5old.dat").exists());
    // Live files and the garbage of retained-younger snapshots are untouched.
    assert!(env.segment_path("v5live.dat").exists());
    assert!(env.segment_path("v10live.dat").exists());
    assert!(env.segment_path("v10old.dat").exists());
}

#[test]
fn vacuum_walks_grace_chain_and_deletes_older_metadata() {
    let env = LakeTestEnv::new();
    // Chain 20 -> 15 -> 10 -> 5 with commit times 250/200/150/100, grace 180.
    env.write_metadata(&make_metadata(2, 5, 100, 0, &[], &["g5.dat"]));
    let mut v10 = make_metadata(2, 10, 150, 5, &[], &["g10.dat"]);
    v10.orphan_files = vec![orphan_file("stray10.dat", 64)];
    env.write_metadata(&v10);
    env.write_metadata(&make_metadata(2, 15, 200, 10, &[], &["g15.dat"]));
    env.write_metadata(&make_metadata(2, 20, 250, 15, &["live.dat"], &["g20.dat"]));
    for name in ["g5.dat", "g10.dat", "g15.dat", "g20.dat", "live.dat", "stray10.dat"] {
        env.write_segment(name);
    }

    let response = vacuum(&env.tablet_mgr, &base_request(&[2], 20, 180));
    assert_ok(&response.status);
    // v10 is the youngest snapshot committed before 180.
    assert_eq!(response.vacuumed_version, Some(10));
    assert_eq!(response.tablet_infos[0].min_version, Some(10));

    // Garbage of v10 (the retained boundary) and of everything older is gone,
    // orphan files included.
    assert!(!env.segment_path("g10.dat").exists());
    assert!(!env.segment_path("stray10.dat").exists());
    assert!(!env.segment_path("g5.dat").exists());
    // Snapshots younger than the boundary keep their garbage.
    assert!(env.segment_path("g15.dat").exists());
    assert!(env.segment_path("g20.dat").exists());
    assert!(env.segment_path("live.dat").exists());

    // Metadata strictly older than the boundary is deleted, the rest kept.
    assert!(!env.metadata_path(2, 5).exists());
    assert!(env.metadata_path(2, 10).exists());
    assert!(env.metadata_path(2, 15).exists());
    assert!(env.metadata_path(2, 20).exists());
}

#[test]
fn vacuum_erases_deleted_metadata_from_the_metacache() {
    let env = LakeTestEnv::new();
    env.write_metadata(&make_metadata(3, 1, 100, 0, &[], &[]));
    env.write_metadata(&make_metadata(3, 4, 120, 1, &[], &[]));

    // Warm the cache with the snapshot that is about to be vacuumed.
    env.tablet_mgr
        .get_tablet_metadata(3, 1, true)
        .expect("load v1");
    let v1_location = env.tablet_mgr.tablet_metadata_location(3, 1);
    assert!(
        env.tablet_mgr
            .metacache()
            .lookup_tablet_metadata(&v1_location)
            .is_some()
    );

    let response = vacuum(&env.tablet_mgr, &base_request(&[3], 4, 200));
    assert_ok(&response.status);
    assert_eq!(response.vacuumed_version, Some(4));

    assert!(!env.metadata_path(3, 1).exists());
    assert!(
        env.tablet_mgr
            .metacache()
            .lookup_tablet_metadata(&v1_location)
            .is_none()
    );
}

#[test]
fn repeated_vacuum_is_idempotent_and_min_version_monotonic() {
    let env = LakeTestEnv::new();
    env.write_metadata(&make_metadata(4, 5, 100, 0, &["live.dat"], &["old.dat"]));
    env.write_metadata(&make_metadata(4, 9, 200, 5, &["live.dat"], &[]));
    env.write_segment("live.dat");
    env.write_segment("old.dat");

    let first = vacuum(&env.tablet_mgr, &base_request(&[4], 9, 150));
    assert_ok(&first.status);
    let first_min_version = first.tablet_infos[0].min_version.unwrap();
    assert_eq!(first_min_version, 5);
    assert!(!env.segment_path("old.dat").exists());
    assert!(env.segment_path("live.dat").exists());

    // Re-run with the echoed tablet_infos, the way the coordinator would.
    let mut request = base_request(&[4], 9, 150);
    request.tablet_infos = first.tablet_infos.clone();
    let second = vacuum(&env.tablet_mgr, &request);
    assert_ok(&second.status);
    let second_min_version = second.tablet_infos[0].min_version.unwrap();
    assert!(second_min_version >= first_min_version);

    // State is unchanged: retained snapshots and live data still exist.
    assert!(env.metadata_path(4, 5).exists());
    assert!(env.metadata_path(4, 9).exists());
    assert!(env.segment_path("live.dat").exists());
}

#[test]
fn vacuum_with_file_bundling_preserves_shared_bundle_files() {
    let env = LakeTestEnv::new();

    // Tablet 1 still references bundle file B.dat at version 8; tablet 2 only
    // records B.dat (and its own C.dat) as compaction garbage.
    let mut t1_v8 = make_metadata(1, 8, 50, 7, &[], &[]);
    t1_v8.rowsets = vec![bundle_rowset(&["B.dat"])];
    env.write_metadata(&t1_v8);
    let mut t1_v7 = make_metadata(1, 7, 40, 0, &[], &[]);
    t1_v7.compaction_inputs = vec![bundle_rowset(&["B.dat"])];
    env.write_metadata(&t1_v7);

    let mut t2_v8 = make_metadata(2, 8, 50, 0, &["t2live.dat"], &[]);
    t2_v8.compaction_inputs = vec![bundle_rowset(&["B.dat", "C.dat"])];
    env.write_metadata(&t2_v8);

    env.write_segment("B.dat");
    env.write_segment("C.dat");
    env.write_segment("t2live.dat");

    // Partition-level (bundled) metadata files for versions 1..=8.
    for v in 1..=8 {
        env.write_metadata(&TabletMetadataPb {
            id: Some(0),
            version: Some(v),
            commit_time: Some(40),
            prev_garbage_version: Some(0),
            ..Default::default()
        });
    }

    let mut request = base_request(&[1, 2], 8, 100);
    request.enable_file_bundling = Some(true);
    let response = vacuum(&env.tablet_mgr, &request);
    assert_ok(&response.status);
    assert_eq!(response.vacuumed_version, Some(8));

    // B.dat is referenced by tablet 1 at the max vacuumed version: retained.
    assert!(env.segment_path("B.dat").exists());
    // C.dat is garbage only: deleted.
    assert!(!env.segment_path("C.dat").exists());
    assert!(env.segment_path("t2live.dat").exists());

    // Bundled metadata in [range.min, range.max) under tablet_id 0 is deleted;
    // the retained version 8 survives.
    for v in 1..8 {
        assert!(!env.metadata_path(0, v).exists(), "version {v} should be gone");
    }
    assert!(env.metadata_path(0, 8).exists());
}

#[test]
fn vacuum_deletes_expired_txn_logs() {
    let env = LakeTestEnv::new();
    env.write_metadata(&make_metadata(1, 3, 50, 0, &[], &[]));

    env.write_txnlog_file(&txn_log_filename(1, 999), b"");
    env.write_txnlog_file(&txn_log_filename(1, 1000), b"");
    env.write_combined_txn_log(998, &CombinedTxnLogPb::default());
    env.write_txnlog_file("foo.txt", b"unrelated");

    let mut request = base_request(&[1], 3, 100);
    request.delete_txn_log = Some(true);
    request.min_active_txn_id = Some(1000);
    let response = vacuum(&env.tablet_mgr, &request);
    assert_ok(&response.status);

    assert!(!env.txnlog_dir().join(txn_log_filename(1, 999)).exists());
    assert!(!env.txnlog_dir().join(combined_txn_log_filename(998)).exists());
    assert!(env.txnlog_dir().join(txn_log_filename(1, 1000)).exists());
    assert!(env.txnlog_dir().join("foo.txt").exists());
}

#[test]
fn vacuum_rejects_invalid_requests() {
    let env = LakeTestEnv::new();

    let empty = vacuum(&env.tablet_mgr, &VacuumRequest::default());
    assert_ne!(empty.status.as_ref().unwrap().status_code, 0);

    let mut no_retain = base_request(&[1], 0, 100);
    no_retain.min_retain_version = Some(0);
    let response = vacuum(&env.tablet_mgr, &no_retain);
    assert_ne!(response.status.as_ref().unwrap().status_code, 0);

    let mut no_grace = base_request(&[1], 3, 0);
    no_grace.grace_timestamp = Some(0);
    let response = vacuum(&env.tablet_mgr, &no_grace);
    assert_ne!(response.status.as_ref().unwrap().status_code, 0);
}

#[test]
fn vacuum_accepts_legacy_tablet_id_requests() {
    let env = LakeTestEnv::new();
    env.write_metadata(&make_metadata(6, 2, 50, 0, &[], &[]));

    let request = VacuumRequest {
        tablet_ids: vec![6],
        min_retain_version: Some(2),
        grace_timestamp: Some(100),
        ..Default::default()
    };
    let response = vacuum(&env.tablet_mgr, &request);
    assert_ok(&response.status);
    // Bare ids are upgraded to tablet_infos and echoed back.
    assert_eq!(response.tablet_infos.len(), 1);
    assert_eq!(response.tablet_infos[0].tablet_id, Some(6));
    assert_eq!(response.tablet_infos[0].min_version, Some(2));
}

#[test]
fn delete_txn_log_removes_logs_in_the_background() {
    use novalake::delete_txn_log;
    use novalake::service::proto::{DeleteTxnLogRequest, TxnInfoPb};
    use std::time::{Duration, Instant};

    let env = LakeTestEnv::new();
    env.write_txnlog_file(&txn_log_filename(1, 7), b"");
    env.write_combined_txn_log(8, &CombinedTxnLogPb::default());

    let request = DeleteTxnLogRequest {
        tablet_ids: vec![1],
        txn_ids: vec![7],
        txn_infos: vec![TxnInfoPb {
            txn_id: Some(8),
            combined_txn_log: Some(true),
            commit_time: None,
        }],
    };
    let response = delete_txn_log(&env.tablet_mgr, &request);
    assert_eq!(response.status.as_ref().unwrap().status_code, 0);

    // Deletion is fire-and-forget through the shared pool; poll for it.
    let plain = env.txnlog_dir().join(txn_log_filename(1, 7));
    let combined = env.txnlog_dir().join(combined_txn_log_filename(8));
    let deadline = Instant::now() + Duration::from_secs(10);
    while plain.exists() || combined.exists() {
        assert!(Instant::now() < deadline, "txn logs were not deleted in time");
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn vacuum_full_is_not_supported() {
    let env = LakeTestEnv::new();
    let response = vacuum_full(&env.tablet_mgr, &Default::default());
    let status = response.status.expect("status");
    assert_ne!(status.status_code, 0);
    assert!(status.error_msgs[0].contains("not implemented"));
}
