// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::blocks::StageSnapshot;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// What one sink saw over a whole scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkReport {
    pub name: String,
    pub items: u64,
    pub tags: u64,
    pub offset_mismatches: u64,
    pub last_offset_delta: i64,
}

impl SinkReport {
    pub fn new(name: impl Into<String>, snapshot: StageSnapshot) -> Self {
        Self {
            name: name.into(),
            items: snapshot.items,
            tags: snapshot.tags,
            offset_mismatches: snapshot.offset_mismatches,
            last_offset_delta: snapshot.last_offset_delta,
        }
    }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub description: String,
    pub sent_items: u64,
    pub sent_tags: u64,
    /// Sent tags that still land inside the stream after the processing
    /// block's declared delay
    pub deliverable_tags: u64,
    /// Source count when the edit was applied, if the scenario paused
    pub reconfigured_at: Option<u64>,
    /// The sink fed by the processing block for the whole run
    pub main_sink: SinkReport,
    /// Sinks attached or detached mid-run
    pub extra_sinks: Vec<SinkReport>,
    pub duration: Duration,
}

impl ScenarioReport {
    pub fn lost_items(&self) -> u64 {
        self.sent_items.saturating_sub(self.main_sink.items)
    }

    pub fn lost_tags(&self) -> u64 {
        self.deliverable_tags.saturating_sub(self.main_sink.tags)
    }
}

impl Display for ScenarioReport {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        writeln!(f, "{} ({})", self.description, self.scenario)?;
        if let Some(at) = self.reconfigured_at {
            writeln!(f, " Reconfigured at source count: {}", at)?;
        }
        writeln!(f, " Sent: {} items {} tags", self.sent_items, self.sent_tags)?;
        if self.deliverable_tags < self.sent_tags {
            writeln!(
                f,
                " Delayed past end of stream: {} tags",
                self.sent_tags - self.deliverable_tags
            )?;
        }
        writeln!(f, "{}", self.main_sink.name)?;
        writeln!(
            f,
            " Received: {} items {} tags",
            self.main_sink.items, self.main_sink.tags
        )?;
        writeln!(
            f,
            " Lost: {} items {} tags",
            self.lost_items(),
            self.lost_tags()
        )?;
        writeln!(
            f,
            " Offset tags: {} last offset={}",
            self.main_sink.offset_mismatches, self.main_sink.last_offset_delta
        )?;
        for sink in &self.extra_sinks {
            writeln!(f, "{}", sink.name)?;
            writeln!(f, " Received: {} items {} tags", sink.items, sink.tags)?;
            writeln!(
                f,
                " Offset tags: {} last offset={}",
                sink.offset_mismatches, sink.last_offset_delta
            )?;
        }
        write!(f, " Took {:?}", self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(deliverable_tags: u64, received_items: u64, received_tags: u64) -> ScenarioReport {
        ScenarioReport {
            scenario: "declared_delay".to_string(),
            description: "Connect sink, processing block with declared delay".to_string(),
            sent_items: 1_000_000,
            sent_tags: 9900,
            deliverable_tags,
            reconfigured_at: Some(50_400),
            main_sink: SinkReport {
                name: "dst0".to_string(),
                items: received_items,
                tags: received_tags,
                offset_mismatches: 0,
                last_offset_delta: 0,
            },
            extra_sinks: vec![],
            duration: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_lost_counts_and_rendering() {
        let report = report(9900, 999_000, 9880);

        assert_eq!(report.lost_items(), 1000);
        assert_eq!(report.lost_tags(), 20);
        let text = report.to_string();
        assert!(text.contains(" Sent: 1000000 items 9900 tags"));
        assert!(text.contains(" Lost: 1000 items 20 tags"));
        assert!(text.contains("Reconfigured at source count: 50400"));
        assert!(!text.contains("Delayed past end of stream"));
    }

    #[test]
    fn test_tags_delayed_past_end_of_stream_are_not_lost() {
        let report = report(9881, 1_000_000, 9881);

        assert_eq!(report.lost_items(), 0);
        assert_eq!(report.lost_tags(), 0);
        let text = report.to_string();
        assert!(text.contains(" Delayed past end of stream: 19 tags"));
        assert!(text.contains(" Lost: 0 items 0 tags"));
    }
}
