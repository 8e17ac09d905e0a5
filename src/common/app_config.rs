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

static CONFIG: OnceLock<JoinRfConfig> = OnceLock::new();

const CONFIG_ENV: &str = "JOINRF_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "joinrf.toml";

fn default_log_level() -> String {
    "info".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static JoinRfConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let cfg = JoinRfConfig::load_from_file(path.as_ref())?;
    let _ = CONFIG.set(cfg);
    CONFIG
        .get()
        .ok_or_else(|| anyhow!("config not initialized"))
}

pub fn init_from_env_or_default() -> Result<&'static JoinRfConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    init_from_path(path)
}

pub fn config() -> Result<&'static JoinRfConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(CONFIG_ENV)
        && !p.trim().is_empty()
    {
        return Ok(PathBuf::from(p.trim()));
    }
    let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
    if candidate.exists() {
        return Ok(candidate);
    }
    Err(anyhow!(
        "missing config file: set ${} or create ./{}",
        CONFIG_ENV,
        DEFAULT_CONFIG_FILE
    ))
}

#[derive(Clone, Debug, Deserialize)]
pub struct JoinRfConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "joinrf=debug"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl JoinRfConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        Self::parse(&s).with_context(|| format!("parse toml: {}", path.display()))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let cfg: JoinRfConfig = toml::from_str(s)?;
        cfg.runtime.validate()?;
        Ok(cfg)
    }

    pub fn effective_log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(&self.log_level)
    }
}

impl Default for JoinRfConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            runtime: RuntimeConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Largest build cardinality for which an IN filter stays an exact set.
    #[serde(default = "default_runtime_filter_max_in_num")]
    pub runtime_filter_max_in_num: u64,
    #[serde(default = "default_runtime_bloom_filter_min_size")]
    pub runtime_bloom_filter_min_size: u64,
    #[serde(default = "default_runtime_bloom_filter_max_size")]
    pub runtime_bloom_filter_max_size: u64,
    #[serde(default = "default_runtime_filter_wait_timeout_ms")]
    pub runtime_filter_wait_timeout_ms: u64,
}

fn default_runtime_filter_max_in_num() -> u64 {
    1024
}
fn default_runtime_bloom_filter_min_size() -> u64 {
    1024
}
fn default_runtime_bloom_filter_max_size() -> u64 {
    16 * 1024 * 1024
}
fn default_runtime_filter_wait_timeout_ms() -> u64 {
    10_000
}

impl RuntimeConfig {
    fn validate(&self) -> Result<()> {
        if self.runtime_bloom_filter_min_size > self.runtime_bloom_filter_max_size {
            return Err(anyhow!(
                "runtime_bloom_filter_min_size ({}) exceeds runtime_bloom_filter_max_size ({})",
                self.runtime_bloom_filter_min_size,
                self.runtime_bloom_filter_max_size
            ));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            runtime_filter_max_in_num: default_runtime_filter_max_in_num(),
            runtime_bloom_filter_min_size: default_runtime_bloom_filter_min_size(),
            runtime_bloom_filter_max_size: default_runtime_bloom_filter_max_size(),
            runtime_filter_wait_timeout_ms: default_runtime_filter_wait_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::JoinRfConfig;

    #[test]
    fn test_parse_partial_runtime_table() {
        let cfg = JoinRfConfig::parse(
            r#"
log_level = "debug"

[runtime]
runtime_filter_max_in_num = 64
"#,
        )
        .unwrap();
        assert_eq!(cfg.effective_log_filter(), "debug");
        assert_eq!(cfg.runtime.runtime_filter_max_in_num, 64);
        assert_eq!(cfg.runtime.runtime_bloom_filter_max_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_log_filter_overrides_level() {
        let cfg = JoinRfConfig::parse("log_filter = \"joinrf=trace\"").unwrap();
        assert_eq!(cfg.effective_log_filter(), "joinrf=trace");
    }

    #[test]
    fn test_reject_inverted_bloom_bounds() {
        let err = JoinRfConfig::parse(
            r#"
[runtime]
runtime_bloom_filter_min_size = 4096
runtime_bloom_filter_max_size = 1024
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("runtime_bloom_filter_min_size"));
    }
}
