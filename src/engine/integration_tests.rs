// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end tests of the engine driving real blocks through start, pause,
//! edits, resume and end-of-stream.

#[cfg(test)]
mod tests {
    use crate::blocks::{
        tags_within_stream, BlockConfig, CountingSink, CountingSource, HistoryBlock, StageSnapshot,
    };
    use crate::buffer::WorkIo;
    use crate::config::{Config, EngineConfig, HarnessConfig};
    use crate::engine::{FlowGraph, RunState};
    use crate::errors::{BlockError, EngineError, GraphError, StateError};
    use crate::graph::{BlockHandle, BlockSettings, LoopState};
    use crate::scenarios::{run_scenario, Scenario};
    use crate::traits::{Block, IoSignature, WorkResult};
    use tokio_util::sync::CancellationToken;

    const ITEMS: u64 = 200_000;
    const INTERVAL: u64 = 101;
    const STEP: u64 = 20_000;

    /// src -> cpy -> dst0, plus an unconnected spare sink.
    struct Chain {
        graph: FlowGraph,
        src: BlockHandle,
        cpy: BlockHandle,
        dst0: BlockHandle,
        dst1: BlockHandle,
    }

    async fn chain(delay: usize, declared: u64) -> Chain {
        chain_with(EngineConfig::default(), ITEMS, delay, declared).await
    }

    async fn chain_with(config: EngineConfig, items: u64, delay: usize, declared: u64) -> Chain {
        let graph = FlowGraph::new("chain", config);
        let src = graph
            .add_block_with(
                Box::new(CountingSource::new(items, INTERVAL)),
                BlockSettings::default().with_alignment(100),
            )
            .await
            .unwrap();
        let cpy = graph
            .add_block_with(
                Box::new(HistoryBlock::new(delay)),
                BlockSettings::default()
                    .with_history(5000)
                    .with_declared_delay(declared),
            )
            .await
            .unwrap();
        let dst0 = graph.add_block(Box::new(CountingSink::new())).await.unwrap();
        let dst1 = graph.add_block(Box::new(CountingSink::new())).await.unwrap();

        graph.connect(src.id(), 0, cpy.id(), 0).await.unwrap();
        graph.connect(cpy.id(), 0, dst0.id(), 0).await.unwrap();
        Chain {
            graph,
            src,
            cpy,
            dst0,
            dst1,
        }
    }

    fn stage(handle: &BlockHandle) -> StageSnapshot {
        handle.stage_counters().unwrap().snapshot()
    }

    /// Tags written by a source of `items` items that still land inside the
    /// stream after being shifted by `delay`.
    fn expected_tags(items: u64, delay: u64) -> u64 {
        (1..=items / INTERVAL)
            .filter(|m| m * INTERVAL - 1 + delay < items)
            .count() as u64
    }

    async fn pause_after(chain: &Chain, more: u64) {
        let target = chain.src.produced() + more;
        let reached = chain.src.wait_for_produced(target).await;
        assert!(reached >= target, "source ended before {}", target);
        chain.graph.lock().await.unwrap();
        assert_eq!(chain.graph.state(), RunState::Paused);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_baseline_delivers_every_item_and_tag() {
        let chain = chain(0, 0).await;
        chain.graph.start().await.unwrap();
        chain.graph.wait_for_completion().await.unwrap();

        assert_eq!(chain.graph.state(), RunState::Completed);
        assert_eq!(chain.src.produced(), ITEMS);
        assert_eq!(chain.dst0.consumed(), ITEMS);
        assert_eq!(chain.dst0.tags_received(), ITEMS / INTERVAL);

        let sink = stage(&chain.dst0);
        assert_eq!(sink.items, ITEMS);
        assert_eq!(sink.tags, ITEMS / INTERVAL);
        assert_eq!(sink.offset_mismatches, 0);
        assert_eq!(stage(&chain.src).tags, ITEMS / INTERVAL);
        assert_eq!(chain.src.loop_state(), LoopState::Finished);
        assert_eq!(chain.dst1.loop_state(), LoopState::NotStarted);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_baseline_at_full_size() {
        let chain = chain_with(EngineConfig::default(), 1_000_000, 0, 0).await;
        chain.graph.start().await.unwrap();
        chain.graph.wait_for_completion().await.unwrap();

        assert_eq!(chain.src.produced(), 1_000_000);
        assert_eq!(stage(&chain.src).tags, 9900);
        let sink = stage(&chain.dst0);
        assert_eq!(sink.items, 1_000_000);
        assert_eq!(sink.tags, 9900);
        assert_eq!(sink.offset_mismatches, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_readers_stay_within_produced_and_capacity() {
        let chain = chain(0, 0).await;
        let finished = CancellationToken::new();
        let sampler = {
            let graph = chain.graph.clone();
            let finished = finished.clone();
            let producers = [chain.src.id(), chain.cpy.id()];
            tokio::spawn(async move {
                let mut samples = 0u64;
                while !finished.is_cancelled() {
                    for producer in producers {
                        let stats = graph.buffer_stats(producer, 0).await.unwrap();
                        for reader in &stats.readers {
                            assert!(
                                reader.consumed <= stats.produced,
                                "{:?} consumed {} of {}",
                                reader.reader,
                                reader.consumed,
                                stats.produced
                            );
                            assert!(
                                stats.produced - reader.consumed <= stats.capacity as u64,
                                "{:?} is {} behind a ring of {}",
                                reader.reader,
                                stats.produced - reader.consumed,
                                stats.capacity
                            );
                            samples += 1;
                        }
                    }
                    tokio::task::yield_now().await;
                }
                samples
            })
        };

        chain.graph.start().await.unwrap();
        pause_after(&chain, STEP).await;
        chain.graph.set_history(chain.cpy.id(), 5500).await.unwrap();
        chain.graph.unlock().await.unwrap();
        pause_after(&chain, STEP).await;
        chain.graph.set_history(chain.dst0.id(), 3000).await.unwrap();
        chain.graph.unlock().await.unwrap();
        chain.graph.wait_for_completion().await.unwrap();

        finished.cancel();
        let samples = sampler.await.unwrap();
        assert!(samples > 0);
        assert_eq!(chain.dst0.consumed(), ITEMS);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_late_attach_sees_stream_from_attach_point() {
        let chain = chain(0, 0).await;
        chain.graph.start().await.unwrap();
        pause_after(&chain, STEP).await;

        let attach_point = chain.cpy.produced();
        chain
            .graph
            .connect(chain.cpy.id(), 0, chain.dst1.id(), 0)
            .await
            .unwrap();
        chain.graph.unlock().await.unwrap();
        chain.graph.wait_for_completion().await.unwrap();

        assert_eq!(chain.dst0.consumed(), ITEMS);
        assert_eq!(stage(&chain.dst0).offset_mismatches, 0);

        let late = stage(&chain.dst1);
        assert_eq!(late.items, ITEMS - attach_point);
        assert_eq!(late.offset_mismatches, 0);
        assert!(late.tags > 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_history_grows_mid_run() {
        let chain = chain(0, 0).await;
        chain.graph.start().await.unwrap();
        pause_after(&chain, STEP).await;

        chain.graph.set_history(chain.cpy.id(), 5500).await.unwrap();
        assert_eq!(chain.cpy.history(), 5500);
        let stats = chain.graph.buffer_stats(chain.src.id(), 0).await.unwrap();
        assert!(stats.capacity >= 5500 + 100);

        chain.graph.unlock().await.unwrap();
        chain.graph.wait_for_completion().await.unwrap();

        let sink = stage(&chain.dst0);
        assert_eq!(sink.items, ITEMS);
        assert_eq!(sink.tags, ITEMS / INTERVAL);
        assert_eq!(sink.offset_mismatches, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_undeclared_delay_is_reported_as_mismatches() {
        let chain = chain(2000, 0).await;
        chain.graph.start().await.unwrap();
        chain.graph.wait_for_completion().await.unwrap();

        let sink = stage(&chain.dst0);
        assert_eq!(sink.items, ITEMS);
        assert_eq!(sink.tags, ITEMS / INTERVAL);
        assert_eq!(sink.offset_mismatches, sink.tags);
        assert_eq!(sink.last_offset_delta, -2000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_declared_delay_keeps_tags_on_their_items() {
        let chain = chain(2000, 2000).await;
        chain.graph.start().await.unwrap();
        pause_after(&chain, STEP).await;
        chain
            .graph
            .connect(chain.cpy.id(), 0, chain.dst1.id(), 0)
            .await
            .unwrap();
        chain.graph.unlock().await.unwrap();
        chain.graph.wait_for_completion().await.unwrap();

        let sink = stage(&chain.dst0);
        assert_eq!(sink.items, ITEMS);
        assert_eq!(sink.offset_mismatches, 0);
        // tags shifted past the last item are never delivered
        assert_eq!(sink.tags, expected_tags(ITEMS, 2000));
        assert_eq!(stage(&chain.dst1).offset_mismatches, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_declaring_the_delay_only_moves_tags() {
        let undeclared = chain(2000, 0).await;
        undeclared.graph.start().await.unwrap();
        undeclared.graph.wait_for_completion().await.unwrap();

        let declared = chain(2000, 2000).await;
        declared.graph.start().await.unwrap();
        declared.graph.wait_for_completion().await.unwrap();

        assert_eq!(undeclared.src.produced(), declared.src.produced());
        assert_eq!(undeclared.cpy.produced(), declared.cpy.produced());
        assert_eq!(undeclared.dst0.consumed(), declared.dst0.consumed());
        assert_eq!(stage(&undeclared.src), stage(&declared.src));

        let (before, after) = (stage(&undeclared.dst0), stage(&declared.dst0));
        assert_eq!(before.items, after.items);
        assert_eq!(before.tags, ITEMS / INTERVAL);
        assert_eq!(before.offset_mismatches, before.tags);
        assert_eq!(after.offset_mismatches, 0);
        // only the tags moved past the last item go missing
        assert_eq!(after.tags, expected_tags(ITEMS, 2000));
        assert_eq!(after.tags, tags_within_stream(ITEMS, INTERVAL, 2000));

        let config = small_harness();
        let before = run_scenario(Scenario::UndeclaredDelay, &config).await.unwrap();
        let after = run_scenario(Scenario::DeclaredDelay, &config).await.unwrap();
        assert_eq!(before.sent_items, after.sent_items);
        assert_eq!(before.sent_tags, after.sent_tags);
        assert_eq!(before.main_sink.items, after.main_sink.items);
        for report in [&before, &after] {
            assert_eq!(report.lost_items(), 0, "{}", report.scenario);
            assert_eq!(report.lost_tags(), 0, "{}", report.scenario);
        }
        assert_eq!(after.deliverable_tags, expected_tags(ITEMS, 2000));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pause_resume_without_edits_is_lossless() {
        let reference = chain(0, 0).await;
        reference.graph.start().await.unwrap();
        reference.graph.wait_for_completion().await.unwrap();

        let paused = chain(0, 0).await;
        paused.graph.start().await.unwrap();
        for _ in 0..3 {
            pause_after(&paused, STEP).await;
            let frozen = paused.dst0.counters();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            assert_eq!(paused.dst0.counters(), frozen, "block ran while paused");
            paused.graph.unlock().await.unwrap();
        }
        paused.graph.wait_for_completion().await.unwrap();

        let expected = reference.dst0.counters();
        let actual = paused.dst0.counters();
        assert_eq!(actual.consumed, expected.consumed);
        assert_eq!(actual.tags_received, expected.tags_received);
        assert_eq!(stage(&paused.dst0), stage(&reference.dst0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_replace_is_lossless() {
        let mut chain = chain(0, 0).await;
        chain.graph.start().await.unwrap();
        pause_after(&chain, STEP).await;

        let old = chain.cpy.clone();
        let new = chain
            .graph
            .add_block_with(
                Box::new(HistoryBlock::new(0)),
                BlockSettings::default().with_history(6000),
            )
            .await
            .unwrap();
        chain.graph.replace(old.id(), new.id()).await.unwrap();
        assert!(new.is_attached());
        assert!(!old.is_attached());
        chain.cpy = new;

        chain.graph.unlock().await.unwrap();
        chain.graph.wait_for_completion().await.unwrap();

        assert_eq!(old.loop_state(), LoopState::Detached);
        assert_eq!(old.consumed() + chain.cpy.consumed(), ITEMS);
        let sink = stage(&chain.dst0);
        assert_eq!(sink.items, ITEMS);
        assert_eq!(sink.tags, ITEMS / INTERVAL);
        assert_eq!(sink.offset_mismatches, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_replace_rejects_different_shapes() {
        let chain = chain(0, 0).await;
        let other = chain.graph.add_block(Box::new(CountingSink::new())).await.unwrap();

        let result = chain.graph.replace(chain.cpy.id(), other.id()).await;
        assert!(matches!(
            result,
            Err(EngineError::Graph(GraphError::IncompatibleReplacement { .. }))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_edits_require_pause() {
        let chain = chain(0, 0).await;
        chain.graph.start().await.unwrap();

        let connect = chain.graph.connect(chain.cpy.id(), 0, chain.dst1.id(), 0).await;
        assert!(matches!(
            connect,
            Err(EngineError::State(StateError::NotPaused { state: RunState::Running }))
        ));
        let history = chain.graph.set_history(chain.cpy.id(), 10).await;
        assert!(matches!(history, Err(EngineError::State(StateError::NotPaused { .. }))));
        assert_eq!(chain.cpy.history(), 5000);

        chain.graph.wait_for_completion().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_state_rules() {
        let chain = chain(0, 0).await;
        assert!(matches!(
            chain.graph.wait_for_completion().await,
            Err(EngineError::State(StateError::InvalidTransition { .. }))
        ));
        assert!(chain.graph.unlock().await.is_err());

        chain.graph.start().await.unwrap();
        assert!(chain.graph.start().await.is_err());
        pause_after(&chain, STEP).await;
        assert!(matches!(
            chain.graph.wait_for_completion().await,
            Err(EngineError::State(StateError::InvalidTransition { .. }))
        ));
        chain.graph.unlock().await.unwrap();
        chain.graph.wait_for_completion().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_topology_keeps_graph_paused() {
        let chain = chain(0, 0).await;
        chain.graph.start().await.unwrap();
        pause_after(&chain, STEP).await;

        // cpy keeps its input but loses its only consumer
        chain
            .graph
            .disconnect(chain.cpy.id(), 0, chain.dst0.id(), 0)
            .await
            .unwrap();
        let result = chain.graph.unlock().await;
        assert!(matches!(
            result,
            Err(EngineError::Graph(GraphError::UnconnectedPort { .. }))
        ));
        assert_eq!(chain.graph.state(), RunState::Paused);

        chain
            .graph
            .connect(chain.cpy.id(), 0, chain.dst1.id(), 0)
            .await
            .unwrap();
        chain.graph.unlock().await.unwrap();
        chain.graph.wait_for_completion().await.unwrap();
        assert_eq!(chain.dst0.loop_state(), LoopState::Detached);
        assert!(stage(&chain.dst1).items > 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_buffer_limit_rolls_back_the_edit() {
        let config = EngineConfig {
            max_buffer_bytes: Some(200_000),
            ..EngineConfig::default()
        };
        let chain = chain_with(config, ITEMS, 0, 0).await;
        let before = chain.graph.buffer_stats(chain.src.id(), 0).await.unwrap();

        let result = chain.graph.set_history(chain.cpy.id(), 100_000).await;
        assert!(matches!(
            result,
            Err(EngineError::Graph(GraphError::BufferTooLarge { .. }))
        ));
        assert_eq!(chain.cpy.history(), 5000);
        let after = chain.graph.buffer_stats(chain.src.id(), 0).await.unwrap();
        assert_eq!(after.capacity, before.capacity);
        assert_eq!(after.readers, before.readers);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_zero_alignment_is_rejected() {
        let graph = FlowGraph::new("align", EngineConfig::default());
        let result = graph
            .add_block_with(
                Box::new(CountingSink::new()),
                BlockSettings::default().with_alignment(0),
            )
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Graph(GraphError::InvalidAlignment { .. }))
        ));

        let sink = graph.add_block(Box::new(CountingSink::new())).await.unwrap();
        assert!(graph.set_alignment(sink.id(), 0).await.is_err());
        assert_eq!(sink.alignment(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tail_is_flushed_below_alignment() {
        let graph = FlowGraph::new("tail", EngineConfig::default());
        let src = graph
            .add_block(Box::new(CountingSource::new(1050, 0)))
            .await
            .unwrap();
        let dst = graph
            .create(&BlockConfig::new("counting_sink").with_alignment(100))
            .await
            .unwrap();
        graph.connect(src.id(), 0, dst.id(), 0).await.unwrap();
        graph.start().await.unwrap();
        graph.wait_for_completion().await.unwrap();

        assert_eq!(dst.consumed(), 1050);
        assert_eq!(stage(&dst).items, 1050);
        assert_eq!(dst.loop_state(), LoopState::Finished);
    }

    /// Sink that answers every grant with `granted + over - under` items.
    struct Miscounting {
        over: usize,
        under: usize,
    }

    impl Block for Miscounting {
        fn name(&self) -> &str {
            "miscounting"
        }

        fn signature(&self) -> IoSignature {
            IoSignature::sink(4)
        }

        fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkResult, BlockError> {
            Ok(WorkResult::Produced(io.noutput_items() + self.over - self.under))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_contract_violations_fail_the_block() {
        let cases = vec![(10, 0, "for a grant of"), (0, 1, "not a multiple of alignment")];

        for (over, under, expected) in cases {
            let graph = FlowGraph::new("contract", EngineConfig::default());
            let src = graph
                .add_block(Box::new(CountingSource::new(1000, 0)))
                .await
                .unwrap();
            let bad = graph
                .add_block_with(
                    Box::new(Miscounting { over, under }),
                    BlockSettings::default().with_alignment(10),
                )
                .await
                .unwrap();
            graph.connect(src.id(), 0, bad.id(), 0).await.unwrap();
            graph.start().await.unwrap();

            match graph.wait_for_completion().await {
                Err(EngineError::Block {
                    block,
                    source: BlockError::ContractViolation { reason, .. },
                }) => {
                    assert_eq!(block, "miscounting");
                    assert!(reason.contains(expected), "{}", reason);
                }
                other => panic!("expected a contract violation, got {:?}", other),
            }
            assert_eq!(bad.loop_state(), LoopState::Failed);
            assert_eq!(bad.consumed(), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_cancels_a_paused_graph() {
        let chain = chain(0, 0).await;
        chain.graph.start().await.unwrap();
        pause_after(&chain, STEP).await;

        chain.graph.stop().await;
        chain.graph.wait_for_completion().await.unwrap();
        assert_eq!(chain.graph.state(), RunState::Stopped);
        assert_eq!(chain.src.loop_state(), LoopState::Stopped);
        assert!(chain.dst0.consumed() < ITEMS);
    }

    fn small_harness() -> Config {
        Config {
            engine: EngineConfig::default(),
            harness: HarnessConfig {
                item_count: Some(ITEMS),
                test_item_diff: Some(STEP),
                ..HarnessConfig::default()
            },
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_matrix() {
        let config = small_harness();
        for scenario in Scenario::ALL {
            let report = run_scenario(scenario, &config)
                .await
                .unwrap_or_else(|e| panic!("{} failed: {}", scenario, e));

            assert_eq!(report.sent_items, ITEMS, "{}", scenario);
            assert_eq!(report.sent_tags, ITEMS / INTERVAL, "{}", scenario);
            assert!(report.main_sink.items <= ITEMS, "{}", scenario);

            match scenario {
                Scenario::UndeclaredDelay => {
                    assert!(report.main_sink.offset_mismatches > 0);
                    assert_eq!(report.main_sink.last_offset_delta, -2000);
                    assert_eq!(report.lost_tags(), 0);
                }
                Scenario::DeclaredDelay => {
                    assert_eq!(report.main_sink.offset_mismatches, 0);
                    assert_eq!(report.main_sink.tags, expected_tags(ITEMS, 2000));
                    assert_eq!(report.lost_items(), 0);
                    assert_eq!(report.lost_tags(), 0);
                }
                // disconnect/create/connect is a late attach for the new block
                Scenario::ChangeProcessingBlock
                | Scenario::ChangeToLargerHistory
                | Scenario::ChangeToSmallerHistory
                | Scenario::ChangeWithoutHistory => {
                    assert_eq!(report.main_sink.offset_mismatches, 0, "{}", scenario);
                }
                _ => {
                    assert_eq!(report.lost_items(), 0, "{}", scenario);
                    assert_eq!(report.lost_tags(), 0, "{}", scenario);
                    assert_eq!(report.main_sink.offset_mismatches, 0, "{}", scenario);
                }
            }
            for sink in &report.extra_sinks {
                if scenario != Scenario::UndeclaredDelay {
                    assert_eq!(sink.offset_mismatches, 0, "{} {}", scenario, sink.name);
                }
            }
        }
    }
}
