// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Reconfiguration scenario matrix.
//!
//! Every scenario builds the same graph: a counting source feeding a history
//! block feeding a counting sink, plus two spare sinks. It lets the source run
//! for a while, pauses the graph, applies one kind of edit, resumes and waits
//! for end-of-stream. The [`ScenarioReport`] then shows whether items or tags
//! were lost and whether tags still annotate the items they were written on.

mod report;
mod runner;
mod watchdog;

pub use report::{ScenarioReport, SinkReport};
pub use runner::{run_scenario, selected_scenarios};
pub use watchdog::Watchdog;

use crate::errors::ScenarioError;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Run to completion without pausing
    Baseline,
    ConnectSink,
    ConnectDisconnectSink,
    ExpandHistory,
    ShrinkHistory,
    ChangeProcessingBlock,
    ChangeToLargerHistory,
    ChangeToSmallerHistory,
    ExpandSourceAlignment,
    ShrinkSourceAlignment,
    AddLargeHistorySink,
    RemoveLargeHistorySink,
    AddLargeAlignmentSink,
    RemoveLargeAlignmentSink,
    ChangeWithoutHistory,
    /// Processing block delays its items without telling the scheduler
    UndeclaredDelay,
    DeclaredDelay,
    /// In-place `replace` instead of disconnect/create/connect
    ReplaceProcessingBlock,
    /// Pause and resume with no edit in between
    PauseResume,
}

impl Scenario {
    pub const ALL: [Scenario; 19] = [
        Scenario::Baseline,
        Scenario::ConnectSink,
        Scenario::ConnectDisconnectSink,
        Scenario::ExpandHistory,
        Scenario::ShrinkHistory,
        Scenario::ChangeProcessingBlock,
        Scenario::ChangeToLargerHistory,
        Scenario::ChangeToSmallerHistory,
        Scenario::ExpandSourceAlignment,
        Scenario::ShrinkSourceAlignment,
        Scenario::AddLargeHistorySink,
        Scenario::RemoveLargeHistorySink,
        Scenario::AddLargeAlignmentSink,
        Scenario::RemoveLargeAlignmentSink,
        Scenario::ChangeWithoutHistory,
        Scenario::UndeclaredDelay,
        Scenario::DeclaredDelay,
        Scenario::ReplaceProcessingBlock,
        Scenario::PauseResume,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Baseline => "baseline",
            Scenario::ConnectSink => "connect_sink",
            Scenario::ConnectDisconnectSink => "connect_disconnect_sink",
            Scenario::ExpandHistory => "expand_history",
            Scenario::ShrinkHistory => "shrink_history",
            Scenario::ChangeProcessingBlock => "change_processing_block",
            Scenario::ChangeToLargerHistory => "change_to_larger_history",
            Scenario::ChangeToSmallerHistory => "change_to_smaller_history",
            Scenario::ExpandSourceAlignment => "expand_source_alignment",
            Scenario::ShrinkSourceAlignment => "shrink_source_alignment",
            Scenario::AddLargeHistorySink => "add_large_history_sink",
            Scenario::RemoveLargeHistorySink => "remove_large_history_sink",
            Scenario::AddLargeAlignmentSink => "add_large_alignment_sink",
            Scenario::RemoveLargeAlignmentSink => "remove_large_alignment_sink",
            Scenario::ChangeWithoutHistory => "change_without_history",
            Scenario::UndeclaredDelay => "undeclared_delay",
            Scenario::DeclaredDelay => "declared_delay",
            Scenario::ReplaceProcessingBlock => "replace_processing_block",
            Scenario::PauseResume => "pause_resume",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::Baseline => "No lock",
            Scenario::ConnectSink => "Connect sink",
            Scenario::ConnectDisconnectSink => "Connect/disconnect sink",
            Scenario::ExpandHistory => "Expand history",
            Scenario::ShrinkHistory => "Shrink history",
            Scenario::ChangeProcessingBlock => {
                "Change processing block (late attach, not lossless)"
            }
            Scenario::ChangeToLargerHistory => {
                "Change processing block to a block with larger history \
                 (late attach, not lossless)"
            }
            Scenario::ChangeToSmallerHistory => {
                "Change processing block to a block with smaller history \
                 (late attach, not lossless)"
            }
            Scenario::ExpandSourceAlignment => "Expand src alignment",
            Scenario::ShrinkSourceAlignment => "Shrink src alignment",
            Scenario::AddLargeHistorySink => "Add a sink with a large history",
            Scenario::RemoveLargeHistorySink => "Remove a sink with a large history",
            Scenario::AddLargeAlignmentSink => "Add a sink with a large alignment",
            Scenario::RemoveLargeAlignmentSink => "Remove a sink with a large alignment",
            Scenario::ChangeWithoutHistory => {
                "Change processing block without a history (late attach, not lossless)"
            }
            Scenario::UndeclaredDelay => "Connect sink, processing block with undeclared delay",
            Scenario::DeclaredDelay => "Connect sink, processing block with declared delay",
            Scenario::ReplaceProcessingBlock => "Replace processing block in place (lossless)",
            Scenario::PauseResume => "Pause and resume without edits",
        }
    }

    /// Whether the graph is paused mid-stream at all.
    pub fn locks(&self) -> bool {
        *self != Scenario::Baseline
    }

    /// Whether the spare sink `dst1` gets connected to the processing block.
    pub fn connects_sink(&self) -> bool {
        matches!(
            self,
            Scenario::ConnectSink
                | Scenario::ConnectDisconnectSink
                | Scenario::UndeclaredDelay
                | Scenario::DeclaredDelay
        )
    }

    /// Whether the processing block delays its items.
    pub fn delays(&self) -> bool {
        matches!(self, Scenario::UndeclaredDelay | Scenario::DeclaredDelay)
    }
}

impl Display for Scenario {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Scenario {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Scenario::ALL
            .iter()
            .copied()
            .find(|scenario| scenario.name() == wanted)
            .ok_or_else(|| ScenarioError::Unknown(s.to_string()))
    }
}
