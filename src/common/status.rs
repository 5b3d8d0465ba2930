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
use thiserror::Error;

/// Classified status for lake maintenance operations.
///
/// Maintenance paths must tell apart "chain walk reached a gap" (not found),
/// "the store throttled us" (retriable), and "the listing or metadata chain is
/// inconsistent" (fatal for the current pass), so a plain error string is not
/// enough here.
#[derive(Clone, Debug, Error)]
pub enum Status {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Resource busy: {0}")]
    ResourceBusy(String),
    #[error("Corruption: {0}")]
    Corruption(String),
    #[error("Not supported: {0}")]
    NotSupported(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Aborted: {0}")]
    Aborted(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = Status> = std::result::Result<T, E>;

impl Status {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Status::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Status::NotFound(msg.into())
    }

    pub fn resource_busy(msg: impl Into<String>) -> Self {
        Status::ResourceBusy(msg.into())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        Status::Corruption(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Status::NotSupported(msg.into())
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Status::IoError(msg.into())
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        Status::Aborted(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Status::Internal(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Status::NotFound(_))
    }

    pub fn is_resource_busy(&self) -> bool {
        matches!(self, Status::ResourceBusy(_))
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, Status::Corruption(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Status::InvalidArgument(m)
            | Status::NotFound(m)
            | Status::ResourceBusy(m)
            | Status::Corruption(m)
            | Status::NotSupported(m)
            | Status::IoError(m)
            | Status::Aborted(m)
            | Status::Internal(m) => m,
        }
    }

    /// Wire status code carried in `StatusPb.status_code`; 0 is reserved for OK.
    pub fn code(&self) -> i32 {
        match self {
            Status::Internal(_) => 1,
            Status::IoError(_) => 2,
            Status::InvalidArgument(_) => 3,
            Status::Corruption(_) => 4,
            Status::NotFound(_) => 5,
            Status::NotSupported(_) => 7,
            Status::ResourceBusy(_) => 9,
            Status::Aborted(_) => 10,
        }
    }
}

impl From<opendal::Error> for Status {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => Status::NotFound(err.to_string()),
            opendal::ErrorKind::RateLimited => Status::ResourceBusy(err.to_string()),
            _ => Status::IoError(err.to_string()),
        }
    }
}

impl From<std::io::Error> for Status {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Status::NotFound(err.to_string()),
            std::io::ErrorKind::ResourceBusy => Status::ResourceBusy(err.to_string()),
            _ => Status::IoError(err.to_string()),
        }
    }
}

/// Not-found from a listing or a chain walk terminates the walk, it is not a
/// failure of the operation itself.
pub fn ignore_not_found(res: Result<()>) -> Result<()> {
    match res {
        Err(st) if st.is_not_found() => Ok(()),
        other => other,
    }
}
