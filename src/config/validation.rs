// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Range checks for a loaded [`Config`].
//!
//! Every problem is collected so a bad file can be fixed in one pass.

use crate::config::Config;
use crate::scenarios::Scenario;
use std::str::FromStr;

/// Check every configured value; returns all problems found.
pub fn validate_config(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    let engine = &config.engine;
    let harness = &config.harness;

    if engine.get_max_noutput_items() == 0 {
        errors.push("engine.max_noutput_items must be positive".to_string());
    }
    let smallest = engine.get_buffer_margin_items().max(1) * 4;
    if engine.get_max_buffer_bytes() < smallest {
        errors.push(format!(
            "engine.max_buffer_bytes ({}) cannot hold the buffer margin ({} bytes of u32 items)",
            engine.get_max_buffer_bytes(),
            smallest
        ));
    }

    if harness.get_item_count() == 0 {
        errors.push("harness.item_count must be positive".to_string());
    }
    if harness.get_source_alignment() == 0 {
        errors.push("harness.source_alignment must be positive".to_string());
    }
    if harness.get_test_item_diff() >= harness.get_item_count() {
        errors.push(format!(
            "harness.test_item_diff ({}) must be below harness.item_count ({})",
            harness.get_test_item_diff(),
            harness.get_item_count()
        ));
    }
    if harness.completion_timeout_secs == Some(0) {
        errors.push("harness.completion_timeout_secs must be positive".to_string());
    }
    for name in &harness.scenarios {
        if let Err(e) = Scenario::from_str(name) {
            errors.push(format!("harness.scenarios: {}", e));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, HarnessConfig};

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&Config::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_problem() {
        let config = Config {
            engine: EngineConfig {
                max_noutput_items: Some(0),
                buffer_margin_items: None,
                max_buffer_bytes: Some(16),
            },
            harness: HarnessConfig {
                item_count: Some(1000),
                source_alignment: Some(0),
                test_item_diff: Some(5000),
                scenarios: vec!["baseline".to_string(), "bogus".to_string()],
                ..HarnessConfig::default()
            },
        };

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5, "{:?}", errors);
        assert!(errors.iter().any(|e| e.contains("bogus")));
    }
}
