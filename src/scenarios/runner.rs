// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::blocks::{tags_within_stream, CountingSink, CountingSource, HistoryBlock};
use crate::config::{Config, HarnessConfig};
use crate::engine::FlowGraph;
use crate::errors::{ScenarioError, WatchdogError};
use crate::graph::{BlockHandle, BlockSettings};
use crate::observability::messages::scenario::{
    ScenarioFinished, ScenarioStarted, ScenarioStep, WatchdogTripped,
};
use crate::observability::messages::StructuredLog;
use crate::scenarios::{Scenario, ScenarioReport, SinkReport, Watchdog};
use std::str::FromStr;
use std::time::Instant;

const EXPANDED_HISTORY: usize = 5500;
const SHRUNK_HISTORY: usize = 3500;
const LARGER_REPLACEMENT_HISTORY: usize = 6000;
const SMALLER_REPLACEMENT_HISTORY: usize = 3000;
const EXPANDED_SOURCE_ALIGNMENT: usize = 200;
const SHRUNK_SOURCE_ALIGNMENT: usize = 64;
const LARGE_SINK_HISTORY: usize = 7000;
/// Alignment of the spare sink that is attached before start and removed mid-run
const REMOVED_SINK_ALIGNMENT: usize = 200;
/// Alignment of the spare sink that is attached mid-run
const ADDED_SINK_ALIGNMENT: usize = 500;

/// Scenarios to run: `requested` names when given, else the config's list,
/// else every scenario.
pub fn selected_scenarios(
    harness: &HarnessConfig,
    requested: &[String],
) -> Result<Vec<Scenario>, ScenarioError> {
    let names = if requested.is_empty() {
        harness.scenarios.as_slice()
    } else {
        requested
    };
    if names.is_empty() {
        return Ok(Scenario::ALL.to_vec());
    }
    names.iter().map(|name| Scenario::from_str(name)).collect()
}

/// The blocks every scenario starts with.
struct Rig {
    graph: FlowGraph,
    src: BlockHandle,
    cpy: BlockHandle,
    dst0: BlockHandle,
    dst1: BlockHandle,
    dst2: BlockHandle,
}

impl Rig {
    async fn build(scenario: Scenario, config: &Config) -> Result<Self, ScenarioError> {
        let harness = &config.harness;
        let graph = FlowGraph::new(scenario.name(), config.engine.clone());

        let src = graph
            .add_block_with(
                Box::new(CountingSource::new(
                    harness.get_item_count(),
                    harness.get_tag_interval(),
                )),
                BlockSettings::default().with_alignment(harness.get_source_alignment()),
            )
            .await?;

        let delay = if scenario.delays() { harness.get_delay() } else { 0 };
        let history = if scenario == Scenario::ChangeWithoutHistory {
            0
        } else {
            harness.get_base_history()
        };
        let mut cpy_settings = BlockSettings::default().with_history(history);
        if scenario == Scenario::DeclaredDelay {
            cpy_settings = cpy_settings.with_declared_delay(delay);
        }
        let cpy = graph
            .add_block_with(
                Box::new(HistoryBlock::new(delay as usize).with_name("cpy")),
                cpy_settings,
            )
            .await?;

        let dst0 = graph.add_block(Box::new(CountingSink::new().with_name("dst0"))).await?;
        let dst1 = graph.add_block(Box::new(CountingSink::new().with_name("dst1"))).await?;
        let dst2 = graph.add_block(Box::new(CountingSink::new().with_name("dst2"))).await?;

        graph.connect(src.id(), 0, cpy.id(), 0).await?;
        graph.connect(cpy.id(), 0, dst0.id(), 0).await?;
        match scenario {
            Scenario::RemoveLargeHistorySink => {
                graph.set_history(dst2.id(), LARGE_SINK_HISTORY).await?;
                graph.connect(src.id(), 0, dst2.id(), 0).await?;
            }
            Scenario::RemoveLargeAlignmentSink => {
                graph.set_alignment(dst2.id(), REMOVED_SINK_ALIGNMENT).await?;
                graph.connect(src.id(), 0, dst2.id(), 0).await?;
            }
            _ => {}
        }

        Ok(Self {
            graph,
            src,
            cpy,
            dst0,
            dst1,
            dst2,
        })
    }

    fn step(&self, scenario: Scenario, step: &str) {
        ScenarioStep {
            scenario: scenario.name(),
            step,
            source_items: self.src.produced(),
        }
        .log();
    }

    /// A fresh processing block with no delay.
    async fn fresh_processing_block(&self, history: usize) -> Result<BlockHandle, ScenarioError> {
        Ok(self
            .graph
            .add_block_with(
                Box::new(HistoryBlock::new(0).with_name("cpy")),
                BlockSettings::default().with_history(history),
            )
            .await?)
    }

    /// Apply the scenario's edit. The graph is paused.
    async fn reconfigure(
        &mut self,
        scenario: Scenario,
        harness: &HarnessConfig,
        watchdog: &Watchdog,
    ) -> Result<(), ScenarioError> {
        let graph = self.graph.clone();
        match scenario {
            Scenario::ExpandHistory => graph.set_history(self.cpy.id(), EXPANDED_HISTORY).await?,
            Scenario::ShrinkHistory => graph.set_history(self.cpy.id(), SHRUNK_HISTORY).await?,
            Scenario::ChangeProcessingBlock
            | Scenario::ChangeToLargerHistory
            | Scenario::ChangeToSmallerHistory
            | Scenario::ChangeWithoutHistory => {
                let history = match scenario {
                    Scenario::ChangeToLargerHistory => LARGER_REPLACEMENT_HISTORY,
                    Scenario::ChangeToSmallerHistory => SMALLER_REPLACEMENT_HISTORY,
                    _ => harness.get_base_history(),
                };
                graph.disconnect(self.src.id(), 0, self.cpy.id(), 0).await?;
                graph.disconnect(self.cpy.id(), 0, self.dst0.id(), 0).await?;
                let cpy = self.fresh_processing_block(history).await?;
                graph.connect(self.src.id(), 0, cpy.id(), 0).await?;
                graph.connect(cpy.id(), 0, self.dst0.id(), 0).await?;
                self.cpy = cpy;
            }
            Scenario::ReplaceProcessingBlock => {
                let cpy = self.fresh_processing_block(harness.get_base_history()).await?;
                graph.replace(self.cpy.id(), cpy.id()).await?;
                self.cpy = cpy;
            }
            Scenario::ExpandSourceAlignment => {
                graph.set_alignment(self.src.id(), EXPANDED_SOURCE_ALIGNMENT).await?
            }
            Scenario::ShrinkSourceAlignment => {
                graph.set_alignment(self.src.id(), SHRUNK_SOURCE_ALIGNMENT).await?
            }
            Scenario::ConnectSink
            | Scenario::ConnectDisconnectSink
            | Scenario::UndeclaredDelay
            | Scenario::DeclaredDelay => {
                graph.connect(self.cpy.id(), 0, self.dst1.id(), 0).await?;
                self.step(scenario, "connect sink");
                if scenario == Scenario::ConnectDisconnectSink {
                    graph.unlock().await?;
                    let target = self.src.produced() + harness.get_test_item_diff();
                    watchdog.wait_for_items(&self.src, target).await?;
                    graph.lock().await?;
                    graph.disconnect(self.cpy.id(), 0, self.dst1.id(), 0).await?;
                    self.step(scenario, "disconnect sink");
                }
            }
            Scenario::RemoveLargeHistorySink | Scenario::RemoveLargeAlignmentSink => {
                graph.disconnect(self.src.id(), 0, self.dst2.id(), 0).await?
            }
            Scenario::AddLargeHistorySink => {
                graph.set_history(self.dst2.id(), LARGE_SINK_HISTORY).await?;
                graph.connect(self.src.id(), 0, self.dst2.id(), 0).await?;
            }
            Scenario::AddLargeAlignmentSink => {
                graph.set_alignment(self.dst2.id(), ADDED_SINK_ALIGNMENT).await?;
                graph.connect(self.src.id(), 0, self.dst2.id(), 0).await?;
            }
            Scenario::Baseline | Scenario::PauseResume => {}
        }
        Ok(())
    }

    async fn drive(
        &mut self,
        scenario: Scenario,
        harness: &HarnessConfig,
    ) -> Result<Option<u64>, ScenarioError> {
        let watchdog = Watchdog::new(
            harness.get_item_count().saturating_sub(1),
            harness.get_completion_timeout(),
        );

        self.graph.start().await?;
        let mut reconfigured_at = None;
        if scenario.locks() {
            let target = self.src.produced() + harness.get_test_item_diff();
            watchdog.wait_for_items(&self.src, target).await?;
            self.graph.lock().await?;
            reconfigured_at = Some(self.src.produced());
            self.reconfigure(scenario, harness, &watchdog).await?;
            self.step(scenario, "resume");
            self.graph.unlock().await?;
        }

        let timeout = harness.get_completion_timeout();
        tokio::time::timeout(timeout, self.graph.wait_for_completion())
            .await
            .map_err(|_| WatchdogError::Timeout {
                waiting_for: "end of stream".to_string(),
                elapsed: timeout,
            })??;
        Ok(reconfigured_at)
    }

    fn report(
        &self,
        scenario: Scenario,
        harness: &HarnessConfig,
        reconfigured_at: Option<u64>,
        started: Instant,
    ) -> Result<ScenarioReport, ScenarioError> {
        let snapshot = |handle: &BlockHandle| {
            handle
                .stage_counters()
                .map(|counters| counters.snapshot())
                .ok_or_else(|| ScenarioError::MissingCounters(handle.name().to_string()))
        };

        let sent = snapshot(&self.src)?;
        let mut extra_sinks = Vec::new();
        if scenario.connects_sink() {
            extra_sinks.push(SinkReport::new(self.dst1.name(), snapshot(&self.dst1)?));
        }
        if matches!(
            scenario,
            Scenario::AddLargeHistorySink
                | Scenario::RemoveLargeHistorySink
                | Scenario::AddLargeAlignmentSink
                | Scenario::RemoveLargeAlignmentSink
        ) {
            extra_sinks.push(SinkReport::new(self.dst2.name(), snapshot(&self.dst2)?));
        }

        Ok(ScenarioReport {
            scenario: scenario.name().to_string(),
            description: scenario.description().to_string(),
            sent_items: sent.items,
            sent_tags: sent.tags,
            deliverable_tags: tags_within_stream(
                sent.items,
                harness.get_tag_interval(),
                self.cpy.declared_delay(),
            )
            .min(sent.tags),
            reconfigured_at,
            main_sink: SinkReport::new(self.dst0.name(), snapshot(&self.dst0)?),
            extra_sinks,
            duration: started.elapsed(),
        })
    }
}

/// Build the scenario's graph, run it to end-of-stream and report what the
/// sinks saw. The graph is stopped if anything fails on the way.
pub async fn run_scenario(
    scenario: Scenario,
    config: &Config,
) -> Result<ScenarioReport, ScenarioError> {
    let started = Instant::now();
    ScenarioStarted {
        scenario: scenario.name(),
        description: scenario.description(),
    }
    .log();

    let mut rig = Rig::build(scenario, config).await?;
    let reconfigured_at = match rig.drive(scenario, &config.harness).await {
        Ok(at) => at,
        Err(error) => {
            if let ScenarioError::Watchdog(watchdog) = &error {
                WatchdogTripped {
                    scenario: scenario.name(),
                    error: watchdog,
                }
                .log();
            }
            rig.graph.stop().await;
            return Err(error);
        }
    };

    let report = rig.report(scenario, &config.harness, reconfigured_at, started)?;
    ScenarioFinished {
        scenario: scenario.name(),
        sent: report.sent_items,
        received: report.main_sink.items,
        offset_mismatches: report.main_sink.offset_mismatches,
        duration: report.duration,
    }
    .log();
    Ok(report)
}
