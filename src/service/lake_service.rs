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

//! Coordinator-facing entry points of the maintenance engine. Each wrapper
//! runs the fallible implementation and folds the outcome into the response
//! status.

use crate::common::status::Status;
use crate::novalake_logging::error;
use crate::service::proto::{
    DeleteTabletRequest, DeleteTabletResponse, DeleteTxnLogRequest, DeleteTxnLogResponse, StatusPb,
    VacuumFullRequest, VacuumFullResponse, VacuumRequest, VacuumResponse,
};
use crate::storage::lake::tablet_manager::TabletManager;
use crate::storage::lake::vacuum::{delete_files_async, delete_tablets_impl, vacuum_impl};

fn ok_status_pb() -> StatusPb {
    StatusPb {
        status_code: 0,
        error_msgs: Vec::new(),
    }
}

fn error_status_pb(st: &Status) -> StatusPb {
    StatusPb {
        status_code: st.code(),
        error_msgs: vec![st.to_string()],
    }
}

pub fn vacuum(tablet_mgr: &TabletManager, request: &VacuumRequest) -> VacuumResponse {
    match vacuum_impl(tablet_mgr, request) {
        Ok(mut response) => {
            response.status = Some(ok_status_pb());
            response
        }
        Err(st) => {
            error!("vacuum failed: {}", st);
            VacuumResponse {
                status: Some(error_status_pb(&st)),
                ..Default::default()
            }
        }
    }
}

pub fn vacuum_full(
    _tablet_mgr: &TabletManager,
    _request: &VacuumFullRequest,
) -> VacuumFullResponse {
    let st = Status::not_supported("vacuum_full not implemented yet");
    VacuumFullResponse {
        status: Some(error_status_pb(&st)),
    }
}

pub fn delete_tablets(
    tablet_mgr: &TabletManager,
    request: &DeleteTabletRequest,
) -> DeleteTabletResponse {
    if request.tablet_ids.is_empty() {
        let st = Status::invalid_argument("missing tablet_ids");
        return DeleteTabletResponse {
            status: Some(error_status_pb(&st)),
        };
    }
    let mut tablet_ids = request.tablet_ids.clone();
    tablet_ids.sort_unstable();
    tablet_ids.dedup();
    let root_dir = tablet_mgr.tablet_root_location(tablet_ids[0]);
    match delete_tablets_impl(tablet_mgr, &root_dir, &tablet_ids) {
        Ok(()) => DeleteTabletResponse {
            status: Some(ok_status_pb()),
        },
        Err(st) => {
            error!("delete_tablets failed: {}", st);
            DeleteTabletResponse {
                status: Some(error_status_pb(&st)),
            }
        }
    }
}

/// Fire-and-forget deletion of txn logs through the shared pool. Cache entries
/// for the plain log paths are erased synchronously so a publish retry cannot
/// pick up a cached log scheduled for deletion.
pub fn delete_txn_log(
    tablet_mgr: &TabletManager,
    request: &DeleteTxnLogRequest,
) -> DeleteTxnLogResponse {
    if request.tablet_ids.is_empty() {
        let st = Status::invalid_argument("missing tablet_ids");
        return DeleteTxnLogResponse {
            status: Some(error_status_pb(&st)),
        };
    }

    let mut files_to_delete = Vec::with_capacity(
        request.tablet_ids.len() * (request.txn_ids.len() + request.txn_infos.len()),
    );

    for tablet_id in &request.tablet_ids {
        // The coordinator sets only one of txn_ids and txn_infos; iterating
        // both saves telling them apart.
        for txn_id in &request.txn_ids {
            let log_path = tablet_mgr.txn_log_location(*tablet_id, *txn_id);
            tablet_mgr.metacache().erase(&log_path);
            files_to_delete.push(log_path);
        }
        for info in &request.txn_infos {
            let txn_id = info.txn_id.unwrap_or(0);
            let log_path = if info.combined_txn_log.unwrap_or(false) {
                tablet_mgr.combined_txn_log_location(*tablet_id, txn_id)
            } else {
                tablet_mgr.txn_log_location(*tablet_id, txn_id)
            };
            files_to_delete.push(log_path);
        }
    }

    delete_files_async(files_to_delete);

    DeleteTxnLogResponse {
        status: Some(ok_status_pb()),
    }
}
