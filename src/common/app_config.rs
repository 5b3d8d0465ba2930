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
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static CONFIG: OnceLock<NovalakeConfig> = OnceLock::new();

fn default_log_level() -> String {
    "info".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static NovalakeConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = path.as_ref().to_path_buf();
    let cfg = NovalakeConfig::load_from_file(&path)?;
    let _ = CONFIG.set(cfg);
    Ok(CONFIG.get().expect("CONFIG set"))
}

pub fn init_from_env_or_default() -> Result<&'static NovalakeConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    let cfg = NovalakeConfig::load_from_file(&path)?;
    let _ = CONFIG.set(cfg);
    Ok(CONFIG.get().expect("CONFIG set"))
}

pub fn config() -> Result<&'static NovalakeConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("NOVALAKE_CONFIG") {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }

    let candidates = [PathBuf::from("novalake.toml")];
    for p in candidates {
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "missing config file: set $NOVALAKE_CONFIG or create ./novalake.toml"
    ))
}

#[derive(Clone, Deserialize)]
pub struct NovalakeConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "novalake=debug,opendal=off"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub lake: LakeConfig,

    #[serde(default)]
    pub object_storage: Option<ObjectStorageConfig>,
}

impl NovalakeConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: NovalakeConfig =
            toml::from_str(&s).with_context(|| format!("parse toml: {}", path.display()))?;
        Ok(cfg)
    }
}

impl Default for NovalakeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            lake: LakeConfig::default(),
            object_storage: None,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct LakeConfig {
    #[serde(default = "default_vacuum_retry_max_attempts")]
    pub vacuum_retry_max_attempts: i64,
    #[serde(default = "default_vacuum_retry_pattern")]
    pub vacuum_retry_pattern: String,
    #[serde(default = "default_vacuum_retry_min_delay_ms")]
    pub vacuum_retry_min_delay_ms: i64,
    #[serde(default = "default_vacuum_min_batch_delete_size")]
    pub vacuum_min_batch_delete_size: i64,
    #[serde(default)]
    pub experimental_wait_per_delete_ms: i64,
    #[serde(default)]
    pub print_delete_log: bool,
    #[serde(default = "default_delete_file_thread_num")]
    pub delete_file_thread_num: usize,
}

fn default_vacuum_retry_max_attempts() -> i64 {
    5
}
fn default_vacuum_retry_pattern() -> String {
    "(?i)request rate".to_string()
}
fn default_vacuum_retry_min_delay_ms() -> i64 {
    100
}
fn default_vacuum_min_batch_delete_size() -> i64 {
    1000
}
fn default_delete_file_thread_num() -> usize {
    8
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            vacuum_retry_max_attempts: default_vacuum_retry_max_attempts(),
            vacuum_retry_pattern: default_vacuum_retry_pattern(),
            vacuum_retry_min_delay_ms: default_vacuum_retry_min_delay_ms(),
            vacuum_min_batch_delete_size: default_vacuum_min_batch_delete_size(),
            experimental_wait_per_delete_ms: 0,
            print_delete_log: false,
            delete_file_thread_num: default_delete_file_thread_num(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
pub struct ObjectStorageConfig {
    pub endpoint: String,
    pub bucket: String,
    #[serde(default)]
    pub root: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub enable_path_style_access: Option<bool>,
    #[serde(default)]
    pub retry_max_times: Option<usize>,
    #[serde(default)]
    pub retry_min_delay_ms: Option<u64>,
    #[serde(default)]
    pub retry_max_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub io_timeout_ms: Option<u64>,
}
