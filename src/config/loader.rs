// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::*;
use crate::config::validation::validate_config;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration file.
///
/// Both sections are optional; a missing section falls back to defaults.
///
/// # Example
/// ```yaml
/// engine:
///   max_noutput_items: 4096
///   buffer_margin_items: 4096
///   max_buffer_bytes: 268435456
/// harness:
///   item_count: 1000000
///   tag_interval: 101
///   scenarios: [baseline, connect_sink, declared_delay]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub harness: HarnessConfig,
}

/// Scheduler and buffer limits shared by every flowgraph built from it.
///
/// # Fields
/// * `max_noutput_items` - Items granted to one `work` call at most (defaults to 4096)
/// * `buffer_margin_items` - Slack kept in every buffer beyond history and alignment (defaults to 4096)
/// * `max_buffer_bytes` - Edits that would grow a buffer past this fail with `BufferTooLarge` (defaults to 256 MiB)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub max_noutput_items: Option<usize>,
    pub buffer_margin_items: Option<usize>,
    pub max_buffer_bytes: Option<usize>,
}

impl EngineConfig {
    pub fn get_max_noutput_items(&self) -> usize {
        self.max_noutput_items.unwrap_or(DEFAULT_MAX_NOUTPUT_ITEMS)
    }

    pub fn get_buffer_margin_items(&self) -> usize {
        self.buffer_margin_items.unwrap_or(DEFAULT_BUFFER_MARGIN_ITEMS)
    }

    pub fn get_max_buffer_bytes(&self) -> usize {
        self.max_buffer_bytes.unwrap_or(DEFAULT_MAX_BUFFER_BYTES)
    }
}

/// Parameters of the reconfiguration scenario matrix.
///
/// An empty `scenarios` list runs every scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub item_count: Option<u64>,
    pub tag_interval: Option<u64>,
    pub test_item_diff: Option<u64>,
    pub source_alignment: Option<usize>,
    pub base_history: Option<usize>,
    pub delay: Option<u64>,
    pub completion_timeout_secs: Option<u64>,
    #[serde(default)]
    pub scenarios: Vec<String>,
}

impl HarnessConfig {
    pub fn get_item_count(&self) -> u64 {
        self.item_count.unwrap_or(DEFAULT_ITEM_COUNT)
    }

    pub fn get_tag_interval(&self) -> u64 {
        self.tag_interval.unwrap_or(DEFAULT_TAG_INTERVAL)
    }

    pub fn get_test_item_diff(&self) -> u64 {
        self.test_item_diff.unwrap_or(DEFAULT_TEST_ITEM_DIFF)
    }

    pub fn get_source_alignment(&self) -> usize {
        self.source_alignment.unwrap_or(DEFAULT_SOURCE_ALIGNMENT)
    }

    pub fn get_base_history(&self) -> usize {
        self.base_history.unwrap_or(DEFAULT_BASE_HISTORY)
    }

    pub fn get_delay(&self) -> u64 {
        self.delay.unwrap_or(DEFAULT_DELAY)
    }

    pub fn get_completion_timeout(&self) -> Duration {
        Duration::from_secs(
            self.completion_timeout_secs
                .unwrap_or(DEFAULT_COMPLETION_TIMEOUT_SECS),
        )
    }
}

/// Load a config from a YAML or TOML file, chosen by extension.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg: Config = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content)?,
        "toml" => toml::from_str(&content)?,
        other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
    };
    Ok(cfg)
}

/// Load a config and check every value against its allowed range.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let cfg = load_config(path)?;
    validate_config(&cfg).map_err(ConfigError::Invalid)?;
    Ok(cfg)
}
