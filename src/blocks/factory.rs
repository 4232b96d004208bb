// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::blocks::{CountingSink, CountingSource, HistoryBlock};
use crate::config::{DEFAULT_ITEM_COUNT, DEFAULT_TAG_INTERVAL};
use crate::errors::GraphError;
use crate::graph::BlockSettings;
use crate::traits::{Block, TagPropagation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declarative description of one block: which body to build, its options,
/// and scheduling settings that override what the body asks for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: HashMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub history: Option<usize>,
    #[serde(default)]
    pub alignment: Option<usize>,
    #[serde(default)]
    pub declared_delay: Option<u64>,
    #[serde(default)]
    pub tag_propagation: Option<TagPropagation>,
}

impl BlockConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_history(mut self, history: usize) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = Some(alignment);
        self
    }

    pub fn with_declared_delay(mut self, delay: u64) -> Self {
        self.declared_delay = Some(delay);
        self
    }

    /// Settings after applying the overrides present in this config.
    pub fn apply_to(&self, settings: BlockSettings) -> BlockSettings {
        BlockSettings {
            history: self.history.unwrap_or(settings.history),
            alignment: self.alignment.unwrap_or(settings.alignment),
            declared_delay: self.declared_delay.unwrap_or(settings.declared_delay),
            tag_propagation: self.tag_propagation.unwrap_or(settings.tag_propagation),
        }
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.kind)
    }

    /// Unsigned integer option, `default` when absent.
    fn u64_option(&self, option: &str, default: u64) -> Result<u64, GraphError> {
        match self.options.get(option) {
            None => Ok(default),
            Some(value) => value.as_u64().ok_or_else(|| GraphError::InvalidOption {
                block: self.label().to_string(),
                option: option.to_string(),
                reason: format!("expected a non-negative integer, got {:?}", value),
            }),
        }
    }
}

/// Builds block bodies from [`BlockConfig`].
pub struct BlockFactory;

impl BlockFactory {
    /// Create a block body from configuration.
    ///
    /// The `kind` field selects the body:
    /// - "counting_source" -> CountingSource (options `item_count`, `tag_interval`)
    /// - "counting_sink" -> CountingSink
    /// - "history" -> HistoryBlock (options `delay`, `item_size`)
    pub fn create(config: &BlockConfig) -> Result<Box<dyn Block>, GraphError> {
        let block: Box<dyn Block> = match config.kind.as_str() {
            "counting_source" => {
                let item_count = config.u64_option("item_count", DEFAULT_ITEM_COUNT)?;
                let tag_interval = config.u64_option("tag_interval", DEFAULT_TAG_INTERVAL)?;
                let source = CountingSource::new(item_count, tag_interval);
                match &config.name {
                    Some(name) => Box::new(source.with_name(name)),
                    None => Box::new(source),
                }
            }
            "counting_sink" => {
                let sink = CountingSink::new();
                match &config.name {
                    Some(name) => Box::new(sink.with_name(name)),
                    None => Box::new(sink),
                }
            }
            "history" => {
                let delay = config.u64_option("delay", 0)? as usize;
                let item_size = config.u64_option("item_size", 4)? as usize;
                if item_size == 0 {
                    return Err(GraphError::InvalidOption {
                        block: config.label().to_string(),
                        option: "item_size".to_string(),
                        reason: "must be positive".to_string(),
                    });
                }
                let block = HistoryBlock::new(delay).with_item_size(item_size);
                match &config.name {
                    Some(name) => Box::new(block.with_name(name)),
                    None => Box::new(block),
                }
            }
            other => return Err(GraphError::UnknownBlockKind(other.to_string())),
        };
        Ok(block)
    }

    pub fn list_available_kinds() -> Vec<&'static str> {
        vec!["counting_source", "counting_sink", "history"]
    }

    pub fn is_kind_available(kind: &str) -> bool {
        Self::list_available_kinds().contains(&kind)
    }
}
