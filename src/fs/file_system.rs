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
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use futures::TryStreamExt;
use opendal::Operator;

use crate::common::status::{Result, Status};
use crate::fs::object_store::{
    build_object_store_operator, normalize_object_path, object_storage_config,
    object_store_block_on,
};

/// One listing entry. `size`/`mtime`/`is_dir` are best-effort: object stores
/// may omit them depending on the listing API.
#[derive(Clone, Debug, Default)]
pub struct DirEntry {
    pub name: String,
    pub size: Option<i64>,
    pub mtime: Option<i64>,
    pub is_dir: Option<bool>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathScheme {
    Local,
    ObjectStore,
}

pub fn classify_path_scheme(path: &str) -> PathScheme {
    let trimmed = path.trim();
    if trimmed.starts_with("s3://") || trimmed.starts_with("oss://") {
        PathScheme::ObjectStore
    } else {
        PathScheme::Local
    }
}

enum Backend {
    Local,
    Remote {
        op: Operator,
        bucket: String,
        root: String,
    },
}

/// Scheme-dispatched file system facade over the local FS and S3-compatible
/// object stores. Instances are cheap to share; the object-store operator is
/// cached process-wide.
pub struct FileSystem {
    backend: Backend,
}

impl FileSystem {
    /// Derive a file system from any path/URL under it. All paths later passed
    /// to this instance must share the same scheme.
    pub fn create_shared_from_string(path: &str) -> Result<Arc<FileSystem>> {
        match classify_path_scheme(path) {
            PathScheme::Local => Ok(Arc::new(FileSystem {
                backend: Backend::Local,
            })),
            PathScheme::ObjectStore => {
                let cfg = object_storage_config()?;
                let op = build_object_store_operator(&cfg)?;
                Ok(Arc::new(FileSystem {
                    backend: Backend::Remote {
                        op,
                        bucket: cfg.bucket,
                        root: cfg.root,
                    },
                }))
            }
        }
    }

    /// Visit file names under `dir`. The visitor returns `false` to stop early.
    /// A missing directory surfaces as `NotFound`; callers that treat it as
    /// empty wrap the result in `ignore_not_found`.
    pub fn iterate_dir<F>(&self, dir: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(&str) -> bool,
    {
        self.iterate_dir2(dir, |entry| visit(&entry.name))
    }

    pub fn iterate_dir2<F>(&self, dir: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(DirEntry) -> bool,
    {
        match &self.backend {
            Backend::Local => {
                let dir_path = PathBuf::from(dir);
                if !dir_path.exists() {
                    return Err(Status::not_found(format!("directory not found: {dir}")));
                }
                if !dir_path.is_dir() {
                    return Err(Status::io_error(format!("path is not a directory: {dir}")));
                }
                let entries = fs::read_dir(&dir_path)
                    .map_err(|e| Status::io_error(format!("list {dir} failed: {e}")))?;
                for entry in entries {
                    let entry = entry
                        .map_err(|e| Status::io_error(format!("iterate {dir} failed: {e}")))?;
                    let Some(name) = entry.file_name().to_str().map(|v| v.to_string()) else {
                        continue;
                    };
                    let meta = entry
                        .metadata()
                        .map_err(|e| Status::io_error(format!("stat {dir}/{name} failed: {e}")))?;
                    let mtime = meta
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                        .map(|d| d.as_secs() as i64);
                    let dir_entry = DirEntry {
                        name,
                        size: Some(meta.len() as i64),
                        mtime,
                        is_dir: Some(meta.is_dir()),
                    };
                    if !visit(dir_entry) {
                        break;
                    }
                }
                Ok(())
            }
            Backend::Remote { op, bucket, root } => {
                let rel = normalize_object_path(dir, bucket, root)?;
                let prefix = if rel.is_empty() {
                    String::new()
                } else {
                    format!("{}/", rel.trim_end_matches('/'))
                };
                object_store_block_on(async {
                    let mut lister = op
                        .lister_with(&prefix)
                        .recursive(false)
                        .await
                        .map_err(Status::from)?;
                    while let Some(entry) = lister.try_next().await.map_err(Status::from)? {
                        let path = entry.path().trim_end_matches('/');
                        if path.is_empty() || path == prefix.trim_end_matches('/') {
                            continue;
                        }
                        let name = path.rsplit('/').next().unwrap_or(path).trim();
                        if name.is_empty() {
                            continue;
                        }
                        let meta = entry.metadata();
                        let dir_entry = DirEntry {
                            name: name.to_string(),
                            size: Some(meta.content_length() as i64),
                            mtime: meta.last_modified().map(|t| t.timestamp()),
                            is_dir: Some(meta.is_dir() || entry.path().ends_with('/')),
                        };
                        if !visit(dir_entry) {
                            break;
                        }
                    }
                    Ok(())
                })?
            }
        }
    }

    /// Delete a batch of files. Deleting an absent file succeeds, matching
    /// object-store semantics on both backends.
    pub fn delete_files(&self, paths: &[String]) -> Result<()> {
        match &self.backend {
            Backend::Local => {
                for path in paths {
                    match fs::remove_file(path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => {
                            return Err(Status::io_error(format!("delete {path} failed: {e}")));
                        }
                    }
                }
                Ok(())
            }
            Backend::Remote { op, bucket, root } => {
                for path in paths {
                    let rel = normalize_object_path(path, bucket, root)?;
                    let res = object_store_block_on(op.delete(&rel))?;
                    match res {
                        Ok(()) => {}
                        Err(e) if e.kind() == opendal::ErrorKind::NotFound => {}
                        Err(e) => return Err(Status::from(e)),
                    }
                }
                Ok(())
            }
        }
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        match &self.backend {
            Backend::Local => match fs::read(path) {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(Status::not_found(format!("file not found: {path}")))
                }
                Err(e) => Err(Status::io_error(format!("read {path} failed: {e}"))),
            },
            Backend::Remote { op, bucket, root } => {
                let rel = normalize_object_path(path, bucket, root)?;
                let res = object_store_block_on(op.read(&rel))?;
                match res {
                    Ok(buffer) => Ok(buffer.to_vec()),
                    Err(e) => Err(Status::from(e)),
                }
            }
        }
    }

    pub fn stat(&self, path: &str) -> Result<DirEntry> {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        match &self.backend {
            Backend::Local => match fs::metadata(path) {
                Ok(meta) => Ok(DirEntry {
                    name,
                    size: Some(meta.len() as i64),
                    mtime: meta
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                        .map(|d| d.as_secs() as i64),
                    is_dir: Some(meta.is_dir()),
                }),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(Status::not_found(format!("file not found: {path}")))
                }
                Err(e) => Err(Status::io_error(format!("stat {path} failed: {e}"))),
            },
            Backend::Remote { op, bucket, root } => {
                let rel = normalize_object_path(path, bucket, root)?;
                let res = object_store_block_on(op.stat(&rel))?;
                match res {
                    Ok(meta) => Ok(DirEntry {
                        name,
                        size: Some(meta.content_length() as i64),
                        mtime: meta.last_modified().map(|t| t.timestamp()),
                        is_dir: Some(meta.is_dir()),
                    }),
                    Err(e) => Err(Status::from(e)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FileSystem, classify_path_scheme, PathScheme};
    use crate::common::status::ignore_not_found;

    #[test]
    fn classify_path_scheme_recognizes_object_urls() {
        assert_eq!(classify_path_scheme("s3://bucket/a/b"), PathScheme::ObjectStore);
        assert_eq!(classify_path_scheme("oss://bucket/a"), PathScheme::ObjectStore);
        assert_eq!(classify_path_scheme("/data/lake/tbl"), PathScheme::Local);
    }

    #[test]
    fn iterate_missing_dir_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs = FileSystem::create_shared_from_string(dir.path().to_str().unwrap())
            .expect("create fs");
        let missing = dir.path().join("absent").to_str().unwrap().to_string();
        let res = fs.iterate_dir(&missing, |_| true);
        assert!(res.as_ref().err().is_some_and(|e| e.is_not_found()));
        assert!(ignore_not_found(res).is_ok());
    }

    #[test]
    fn delete_files_tolerates_absent_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("a.dat");
        std::fs::write(&file, b"x").expect("write");
        let fs = FileSystem::create_shared_from_string(dir.path().to_str().unwrap())
            .expect("create fs");
        let paths = vec![
            file.to_str().unwrap().to_string(),
            dir.path().join("missing.dat").to_str().unwrap().to_string(),
        ];
        fs.delete_files(&paths).expect("delete batch");
        assert!(!file.exists());
    }

    #[test]
    fn iterate_dir2_reports_size_and_mtime() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("seg.dat"), b"hello").expect("write");
        let fs = FileSystem::create_shared_from_string(dir.path().to_str().unwrap())
            .expect("create fs");
        let mut seen = Vec::new();
        fs.iterate_dir2(dir.path().to_str().unwrap(), |entry| {
            seen.push(entry);
            true
        })
        .expect("iterate");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].name, "seg.dat");
        assert_eq!(seen[0].size, Some(5));
        assert!(seen[0].mtime.is_some());
        assert_eq!(seen[0].is_dir, Some(false));
    }
}
