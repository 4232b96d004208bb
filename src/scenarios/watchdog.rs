// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::WatchdogError;
use crate::graph::BlockHandle;
use std::time::Duration;

/// Bounds the scenario driver's waits on the source.
///
/// A reconfiguration step must happen mid-stream, so waiting for a target
/// at or past `ceiling` items is a failure rather than a late success.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    ceiling: u64,
    timeout: Duration,
}

impl Watchdog {
    pub fn new(ceiling: u64, timeout: Duration) -> Self {
        Self { ceiling, timeout }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Wait until `source` has produced `target` items.
    ///
    /// Fails with `SampleCeilingReached` when the source hits the ceiling (or
    /// ends) first, and with `Timeout` when nothing happens in time.
    pub async fn wait_for_items(
        &self,
        source: &BlockHandle,
        target: u64,
    ) -> Result<u64, WatchdogError> {
        let bounded = target.min(self.ceiling);
        let produced = tokio::time::timeout(self.timeout, source.wait_for_produced(bounded))
            .await
            .map_err(|_| WatchdogError::Timeout {
                waiting_for: format!("{} items from '{}'", target, source.name()),
                elapsed: self.timeout,
            })?;

        if produced >= target {
            Ok(produced)
        } else {
            Err(WatchdogError::SampleCeilingReached {
                target,
                ceiling: self.ceiling,
                produced,
            })
        }
    }
}
