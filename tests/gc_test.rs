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
//! Tablet purge and orphan-file GC scenarios.

use std::collections::HashMap;

use novalake::delete_tablets;
use novalake::service::proto::{
    DeleteTabletRequest, DelvecMetadataPb, FileMetadataPb, PersistentIndexSstableMetaPb,
    PersistentIndexSstablePb, TabletMetadataPb, TxnLogPb, txn_log_pb,
};
use novalake::storage::lake::datafile_gc;
use novalake::storage::lake::filenames::{txn_log_filename, txn_vlog_filename};

use crate::common::{LakeTestEnv, make_metadata, rowsets_from, write_file};

mod common;

#[test]
fn delete_tablets_purges_only_the_requested_tablets() {
    let env = LakeTestEnv::new();

    // Tablet 1: two versions; v2 compacted away v1's rowset and carries a
    // delvec plus an sstable.
    env.write_metadata(&make_metadata(1, 1, 10, 0, &["t1old.dat"], &[]));
    let mut t1_v2 = make_metadata(1, 2, 20, 1, &["t1live.dat"], &["t1old.dat"]);
    t1_v2.delvec_meta = Some(DelvecMetadataPb {
        version_to_file: HashMap::from([(
            2,
            FileMetadataPb {
                name: Some("t1.delvec".to_string()),
                size: Some(16),
                shared: None,
            },
        )]),
    });
    t1_v2.sstable_meta = Some(PersistentIndexSstableMetaPb {
        sstables: vec![PersistentIndexSstablePb {
            filename: Some("t1index.sst".to_string()),
            filesize: Some(32),
            shared: None,
        }],
    });
    env.write_metadata(&t1_v2);

    // Tablet 1 txn logs: a write log referencing extra data files and a vlog.
    env.write_txn_log(&TxnLogPb {
        tablet_id: Some(1),
        txn_id: Some(5),
        op_write: Some(txn_log_pb::OpWrite {
            rowset: rowsets_from(&["t1txn.dat"]).into_iter().next(),
            dels: vec!["t1txn.del".to_string()],
        }),
        ..Default::default()
    });
    env.write_txnlog_file(&txn_vlog_filename(1, 2), b"");

    // Tablet 2 must survive untouched.
    env.write_metadata(&make_metadata(2, 1, 10, 0, &["t2live.dat"], &[]));
    env.write_txnlog_file(&txn_log_filename(2, 5), b"");

    for name in [
        "t1live.dat",
        "t1old.dat",
        "t1.delvec",
        "t1index.sst",
        "t1txn.dat",
        "t1txn.del",
        "t2live.dat",
    ] {
        env.write_segment(name);
    }

    let response = delete_tablets(
        &env.tablet_mgr,
        &DeleteTabletRequest {
            tablet_ids: vec![1],
        },
    );
    assert_eq!(response.status.as_ref().unwrap().status_code, 0);

    // All of tablet 1 is gone: metadata, txn logs, live + garbage data.
    assert!(!env.metadata_path(1, 1).exists());
    assert!(!env.metadata_path(1, 2).exists());
    assert!(!env.txnlog_dir().join(txn_log_filename(1, 5)).exists());
    assert!(!env.txnlog_dir().join(txn_vlog_filename(1, 2)).exists());
    for name in [
        "t1live.dat",
        "t1old.dat",
        "t1.delvec",
        "t1index.sst",
        "t1txn.dat",
        "t1txn.del",
    ] {
        assert!(!env.segment_path(name).exists(), "{name} should be deleted");
    }

    // Tablet 2 is intact.
    assert!(env.metadata_path(2, 1).exists());
    assert!(env.txnlog_dir().join(txn_log_filename(2, 5)).exists());
    assert!(env.segment_path("t2live.dat").exists());
}

#[test]
fn datafile_gc_deletes_unreferenced_expired_segments() {
    let env = LakeTestEnv::new();

    env.write_metadata(&make_metadata(1, 1, 10, 0, &["referenced.dat"], &[]));
    env.write_segment("referenced.dat");
    env.write_segment("orphan.dat");
    // Non-data files in segment/ are never candidates.
    write_file(&env.segment_dir().join("notes.txt"), b"ignore me");

    let (count, bytes) = datafile_gc(&env.root, "", 0, true).expect("gc");
    assert_eq!(count, 1);
    assert!(bytes > 0);

    assert!(!env.segment_path("orphan.dat").exists());
    assert!(env.segment_path("referenced.dat").exists());
    assert!(env.segment_dir().join("notes.txt").exists());
}

#[test]
fn datafile_gc_respects_expiration_window() {
    let env = LakeTestEnv::new();

    env.write_metadata(&make_metadata(1, 1, 10, 0, &[], &[]));
    env.write_segment("fresh-orphan.dat");

    // The file was just written; a one hour window keeps it.
    let (count, _bytes) = datafile_gc(&env.root, "", 3600, true).expect("gc");
    assert_eq!(count, 0);
    assert!(env.segment_path("fresh-orphan.dat").exists());
}

#[test]
fn datafile_gc_dry_run_reports_without_deleting() {
    let env = LakeTestEnv::new();

    env.write_metadata(&make_metadata(1, 1, 10, 0, &[], &[]));
    env.write_segment("orphan.dat");

    let (count, bytes) = datafile_gc(&env.root, "", 0, false).expect("gc dry run");
    assert_eq!(count, 1);
    assert!(bytes > 0);
    assert!(env.segment_path("orphan.dat").exists());
}

#[test]
fn datafile_gc_recurses_into_partition_directories() {
    let env = LakeTestEnv::new();

    // Two partition roots nested under the scan root.
    let p1 = env.temp_dir.path().join("table1/partition1");
    let p2 = env.temp_dir.path().join("table1/partition2");
    for partition in [&p1, &p2] {
        let metadata = TabletMetadataPb {
            id: Some(1),
            version: Some(1),
            prev_garbage_version: Some(0),
            ..Default::default()
        };
        use prost::Message;
        write_file(
            &partition.join("meta/0000000000000001_0000000000000001.meta"),
            &metadata.encode_to_vec(),
        );
        write_file(&partition.join("txnlog/.keep"), b"");
        write_file(&partition.join("segment/orphan.dat"), b"bytes");
    }

    let (count, _bytes) = datafile_gc(&env.root, "", 0, true).expect("gc");
    assert_eq!(count, 2);
    assert!(!p1.join("segment/orphan.dat").exists());
    assert!(!p2.join("segment/orphan.dat").exists());
}

#[test]
fn datafile_gc_writes_an_audit_trail() {
    let env = LakeTestEnv::new();

    env.write_metadata(&make_metadata(1, 1, 10, 0, &[], &[]));
    env.write_segment("orphan.dat");

    let audit_path = env.temp_dir.path().join("gc_audit.log");
    let audit = audit_path.to_str().unwrap();
    let (count, _bytes) = datafile_gc(&env.root, audit, 0, true).expect("gc");
    assert_eq!(count, 1);

    let contents = std::fs::read_to_string(&audit_path).expect("audit file");
    assert!(contents.contains("orphan.dat"));
    assert!(contents.contains("Total orphan data files: 1"));
}
