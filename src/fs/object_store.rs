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
use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use opendal::Operator;
use opendal::layers::{RetryLayer, TimeoutLayer};

use crate::common::app_config::ObjectStorageConfig;
use crate::common::status::{Result, Status};
use crate::novalake_config::config as novalake_app_config;
use crate::novalake_logging::debug;

const DEFAULT_RETRY_MAX_TIMES: usize = 6;
const DEFAULT_RETRY_MIN_DELAY_MS: u64 = 100;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 2_000;

static OPERATOR_CACHE: OnceLock<Mutex<HashMap<ObjectStorageConfig, Operator>>> = OnceLock::new();
static OBJECT_STORE_RUNTIME: OnceLock<std::result::Result<tokio::runtime::Runtime, String>> =
    OnceLock::new();

/// Resolve the `[object_storage]` config section; object-store paths cannot be
/// served without it.
pub fn object_storage_config() -> Result<ObjectStorageConfig> {
    novalake_app_config()
        .ok()
        .and_then(|c| c.object_storage.clone())
        .ok_or_else(|| {
            Status::invalid_argument(
                "missing [object_storage] config section for object-store path",
            )
        })
}

fn operator_cache() -> &'static Mutex<HashMap<ObjectStorageConfig, Operator>> {
    OPERATOR_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn build_object_store_operator(cfg: &ObjectStorageConfig) -> Result<Operator> {
    if let Some(op) = {
        let guard = operator_cache()
            .lock()
            .map_err(|_| Status::internal("lock object store operator cache failed"))?;
        guard.get(cfg).cloned()
    } {
        return Ok(op);
    }

    debug!(
        "init object store operator: endpoint={} bucket={} root={}",
        cfg.endpoint, cfg.bucket, cfg.root
    );
    let op = build_raw_operator(cfg)?;
    let mut guard = operator_cache()
        .lock()
        .map_err(|_| Status::internal("lock object store operator cache failed"))?;
    let cached = guard.entry(cfg.clone()).or_insert_with(|| op.clone());
    Ok(cached.clone())
}

fn build_raw_operator(cfg: &ObjectStorageConfig) -> Result<Operator> {
    let endpoint = normalize_s3_endpoint(&cfg.endpoint)?;
    let use_path_style = should_use_path_style(cfg);

    let mut builder = opendal::services::S3::default()
        .endpoint(&endpoint)
        .bucket(&cfg.bucket)
        .region(cfg.region.as_deref().unwrap_or("us-east-1"))
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.access_key_secret);
    if !use_path_style {
        builder = builder.enable_virtual_host_style();
    }
    if let Some(token) = cfg.session_token.as_deref() {
        builder = builder.session_token(token);
    }
    if !cfg.root.is_empty() {
        builder = builder.root(&cfg.root);
    }
    let mut op = Operator::new(builder)
        .map_err(|e| Status::io_error(format!("init s3 operator failed: {e}")))?
        .finish();

    if let Some(timeout_layer) = build_timeout_layer(cfg) {
        op = op.layer(timeout_layer);
    }
    op = op.layer(build_retry_layer(cfg));
    Ok(op)
}

fn build_retry_layer(cfg: &ObjectStorageConfig) -> RetryLayer {
    let max_times = cfg.retry_max_times.unwrap_or(DEFAULT_RETRY_MAX_TIMES);
    let min_delay_ms = cfg.retry_min_delay_ms.unwrap_or(DEFAULT_RETRY_MIN_DELAY_MS);
    let max_delay_ms = cfg
        .retry_max_delay_ms
        .unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS)
        .max(min_delay_ms);

    RetryLayer::new()
        .with_jitter()
        .with_min_delay(Duration::from_millis(min_delay_ms))
        .with_max_delay(Duration::from_millis(max_delay_ms))
        .with_max_times(max_times)
}

fn build_timeout_layer(cfg: &ObjectStorageConfig) -> Option<TimeoutLayer> {
    if cfg.timeout_ms.is_none() && cfg.io_timeout_ms.is_none() {
        return None;
    }
    let mut layer = TimeoutLayer::new();
    if let Some(timeout_ms) = cfg.timeout_ms.filter(|v| *v > 0) {
        layer = layer.with_timeout(Duration::from_millis(timeout_ms));
    }
    if let Some(io_timeout_ms) = cfg.io_timeout_ms.filter(|v| *v > 0) {
        layer = layer.with_io_timeout(Duration::from_millis(io_timeout_ms));
    }
    Some(layer)
}

fn endpoint_host(endpoint: &str) -> String {
    let mut view = endpoint.trim();
    if let Some(rest) = view.strip_prefix("http://") {
        view = rest;
    } else if let Some(rest) = view.strip_prefix("https://") {
        view = rest;
    }
    if let Some((authority, _)) = view.split_once('/') {
        view = authority;
    }
    if let Some(rest) = view.strip_prefix('[') {
        if let Some((host, _)) = rest.split_once(']') {
            return host.to_ascii_lowercase();
        }
    }
    view.split(':').next().unwrap_or(view).to_ascii_lowercase()
}

fn is_local_endpoint(endpoint: &str) -> bool {
    let host = endpoint_host(endpoint);
    host == "localhost" || host.parse::<IpAddr>().is_ok()
}

fn prefer_virtual_host_style(endpoint: &str) -> bool {
    let host = endpoint_host(endpoint);
    let suffixes = [
        ".amazonaws.com",
        ".aliyuncs.com",
        ".myhuaweicloud.com",
        ".myqcloud.com",
        ".volces.com",
        ".ivolces.com",
        ".ksyuncs.com",
        "storage.googleapis.com",
    ];
    suffixes.iter().any(|suffix| host.ends_with(suffix))
}

fn should_use_path_style(cfg: &ObjectStorageConfig) -> bool {
    if let Some(v) = cfg.enable_path_style_access {
        return v;
    }
    !prefer_virtual_host_style(&cfg.endpoint)
}

fn normalize_s3_endpoint(raw_endpoint: &str) -> Result<String> {
    let endpoint = raw_endpoint.trim().trim_end_matches('/');
    if endpoint.is_empty() {
        return Err(Status::invalid_argument("empty object store endpoint"));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return Ok(endpoint.to_string());
    }
    let scheme = if is_local_endpoint(endpoint) {
        "http"
    } else {
        "https"
    };
    Ok(format!("{scheme}://{endpoint}"))
}

fn object_store_runtime() -> Result<&'static tokio::runtime::Runtime> {
    match OBJECT_STORE_RUNTIME.get_or_init(|| {
        tokio::runtime::Runtime::new().map_err(|e| format!("init tokio runtime failed: {e}"))
    }) {
        Ok(rt) => Ok(rt),
        Err(err) => Err(Status::internal(err.clone())),
    }
}

pub fn object_store_block_on<F>(future: F) -> Result<F::Output>
where
    F: Future,
{
    let rt = object_store_runtime()?;
    Ok(rt.block_on(future))
}

/// Turn `s3://bucket/key` (or an already-relative key) into a path relative to
/// the configured OpenDAL root.
pub fn normalize_object_path(full: &str, bucket: &str, root: &str) -> Result<String> {
    let mut s = full.trim().to_string();

    for scheme in ["s3://", "oss://"] {
        if let Some(rest) = s.strip_prefix(scheme) {
            let (b, key) = rest
                .split_once('/')
                .ok_or_else(|| Status::invalid_argument(format!("invalid object url: {full}")))?;
            if b != bucket {
                return Err(Status::invalid_argument(format!(
                    "bucket mismatch: url bucket={b} config bucket={bucket}"
                )));
            }
            s = key.to_string();
            break;
        }
    }

    s = s.trim_start_matches('/').to_string();

    let root_trim = root.trim_matches('/');
    if !root_trim.is_empty() {
        let prefix = format!("{root_trim}/");
        if let Some(rest) = s.strip_prefix(&prefix) {
            s = rest.to_string();
        } else if s == root_trim {
            s.clear();
        }
    }

    Ok(s)
}
