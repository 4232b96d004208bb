// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Shared per-block state.
//!
//! A [`BlockCore`] is held by the topology, by the block's execution loop and
//! (through [`BlockHandle`]) by driver code. It is dropped when the last of
//! those lets go, which can only happen after the block was disconnected and
//! its loop has exited.

use crate::blocks::StageCounters;
use crate::buffer::{ChannelBuffer, ReaderId, ReaderRequirements};
use crate::config::EngineConfig;
use crate::errors::GraphError;
use crate::graph::{Endpoint, PortDirection};
use crate::traits::{Block, BlockKind, IoSignature, TagPropagation};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};

/// Identity of a block inside one flowgraph. Allocated in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BlockId(pub u64);

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scheduling settings of a block. Changed only while the graph is idle or paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockSettings {
    /// Look-back items kept before the read cursor on every input
    pub history: usize,
    /// Granularity of every grant
    pub alignment: usize,
    /// Item shift applied to propagated tags
    pub declared_delay: u64,
    pub tag_propagation: TagPropagation,
}

impl Default for BlockSettings {
    fn default() -> Self {
        Self {
            history: 0,
            alignment: 1,
            declared_delay: 0,
            tag_propagation: TagPropagation::AllToAll,
        }
    }
}

impl BlockSettings {
    pub fn with_history(mut self, history: usize) -> Self {
        self.history = history;
        self
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_declared_delay(mut self, delay: u64) -> Self {
        self.declared_delay = delay;
        self
    }

    pub fn with_tag_propagation(mut self, policy: TagPropagation) -> Self {
        self.tag_propagation = policy;
        self
    }
}

/// Counters maintained by the scheduler, written only by the block's own loop.
#[derive(Debug, Default)]
pub struct EngineCounters {
    produced: AtomicU64,
    consumed: AtomicU64,
    tags_received: AtomicU64,
    tags_emitted: AtomicU64,
    invocations: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub produced: u64,
    pub consumed: u64,
    pub tags_received: u64,
    pub tags_emitted: u64,
    pub invocations: u64,
}

impl EngineCounters {
    pub(crate) fn record(&self, produced: u64, consumed: u64, received: u64, emitted: u64) {
        self.produced.fetch_add(produced, Ordering::Release);
        self.consumed.fetch_add(consumed, Ordering::Release);
        self.tags_received.fetch_add(received, Ordering::Release);
        self.tags_emitted.fetch_add(emitted, Ordering::Release);
        self.invocations.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            produced: self.produced.load(Ordering::Acquire),
            consumed: self.consumed.load(Ordering::Acquire),
            tags_received: self.tags_received.load(Ordering::Acquire),
            tags_emitted: self.tags_emitted.load(Ordering::Acquire),
            invocations: self.invocations.load(Ordering::Acquire),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.produced,
            &self.consumed,
            &self.tags_received,
            &self.tags_emitted,
            &self.invocations,
        ] {
            counter.store(0, Ordering::Release);
        }
    }
}

/// An input port's connection: the upstream buffer and this block's cursor in it.
#[derive(Debug, Clone)]
pub(crate) struct InputBinding {
    pub buffer: Arc<ChannelBuffer>,
    pub reader: ReaderId,
    pub upstream: Endpoint,
}

/// Current buffers of a block. Cloned by the execution loop each iteration.
#[derive(Debug, Clone, Default)]
pub(crate) struct Wiring {
    pub inputs: Vec<Option<InputBinding>>,
    pub outputs: Vec<Arc<ChannelBuffer>>,
}

/// Where a block's execution loop is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    NotStarted,
    Running,
    /// End of stream reached
    Finished,
    /// Left the graph; a new loop is spawned if it is connected again
    Detached,
    Failed,
    Stopped,
}

impl LoopState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LoopState::Running,
            2 => LoopState::Finished,
            3 => LoopState::Detached,
            4 => LoopState::Failed,
            5 => LoopState::Stopped,
            _ => LoopState::NotStarted,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LoopState::NotStarted => 0,
            LoopState::Running => 1,
            LoopState::Finished => 2,
            LoopState::Detached => 3,
            LoopState::Failed => 4,
            LoopState::Stopped => 5,
        }
    }
}

fn policy_from_u8(raw: u8) -> TagPropagation {
    match raw {
        1 => TagPropagation::OneToOne,
        2 => TagPropagation::Dont,
        _ => TagPropagation::AllToAll,
    }
}

fn policy_as_u8(policy: TagPropagation) -> u8 {
    match policy {
        TagPropagation::AllToAll => 0,
        TagPropagation::OneToOne => 1,
        TagPropagation::Dont => 2,
    }
}

pub(crate) struct BlockCore {
    id: BlockId,
    name: String,
    kind: BlockKind,
    signature: IoSignature,
    history: AtomicUsize,
    alignment: AtomicUsize,
    declared_delay: AtomicU64,
    tag_propagation: AtomicU8,
    pub wiring: RwLock<Wiring>,
    pub body: Mutex<Box<dyn Block>>,
    /// Woken by upstream writes, downstream consumption and run-state changes
    pub wakeup: Arc<Notify>,
    /// Signalled after every invocation, for observers
    pub progress: Notify,
    attached: AtomicBool,
    loop_state: AtomicU8,
    pub counters: EngineCounters,
    stage_counters: Option<Arc<StageCounters>>,
}

impl std::fmt::Debug for BlockCore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("settings", &self.settings())
            .field("loop_state", &self.loop_state())
            .finish()
    }
}

impl BlockCore {
    /// Validate the body's shape and allocate one buffer per output port.
    pub fn new(
        id: BlockId,
        body: Box<dyn Block>,
        settings: BlockSettings,
        config: &EngineConfig,
    ) -> Result<Self, GraphError> {
        let name = body.name().to_string();
        let signature = body.signature();
        let kind = signature
            .kind()
            .ok_or_else(|| GraphError::NoPorts { block: name.clone() })?;
        if settings.alignment == 0 {
            return Err(GraphError::InvalidAlignment { block: name });
        }
        let zero_sized = [
            (PortDirection::Input, &signature.input_sizes),
            (PortDirection::Output, &signature.output_sizes),
        ]
        .into_iter()
        .find_map(|(direction, sizes)| {
            sizes
                .iter()
                .position(|size| *size == 0)
                .map(|port| (direction, port))
        });
        if let Some((direction, port)) = zero_sized {
            return Err(GraphError::InvalidItemSize {
                block: name,
                direction,
                port,
            });
        }

        let wakeup = Arc::new(Notify::new());
        let capacity = settings.alignment + config.get_buffer_margin_items();
        let outputs = signature
            .output_sizes
            .iter()
            .map(|size| {
                Arc::new(ChannelBuffer::new(
                    *size,
                    capacity,
                    settings.alignment,
                    wakeup.clone(),
                ))
            })
            .collect();
        let wiring = Wiring {
            inputs: vec![None; signature.inputs()],
            outputs,
        };

        Ok(Self {
            id,
            name,
            kind,
            stage_counters: body.counters(),
            signature,
            history: AtomicUsize::new(settings.history),
            alignment: AtomicUsize::new(settings.alignment),
            declared_delay: AtomicU64::new(settings.declared_delay),
            tag_propagation: AtomicU8::new(policy_as_u8(settings.tag_propagation)),
            wiring: RwLock::new(wiring),
            body: Mutex::new(body),
            wakeup,
            progress: Notify::new(),
            attached: AtomicBool::new(false),
            loop_state: AtomicU8::new(LoopState::NotStarted.as_u8()),
            counters: EngineCounters::default(),
        })
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn signature(&self) -> &IoSignature {
        &self.signature
    }

    pub fn history(&self) -> usize {
        self.history.load(Ordering::Acquire)
    }

    pub fn alignment(&self) -> usize {
        self.alignment.load(Ordering::Acquire)
    }

    pub fn declared_delay(&self) -> u64 {
        self.declared_delay.load(Ordering::Acquire)
    }

    pub fn tag_propagation(&self) -> TagPropagation {
        policy_from_u8(self.tag_propagation.load(Ordering::Acquire))
    }

    pub fn settings(&self) -> BlockSettings {
        BlockSettings {
            history: self.history(),
            alignment: self.alignment(),
            declared_delay: self.declared_delay(),
            tag_propagation: self.tag_propagation(),
        }
    }

    /// What this block asks of every buffer it reads.
    pub fn reader_requirements(&self) -> ReaderRequirements {
        ReaderRequirements {
            history: self.history(),
            alignment: self.alignment(),
        }
    }

    pub fn set_history(&self, history: usize) {
        self.history.store(history, Ordering::Release);
    }

    pub fn set_alignment(&self, alignment: usize) {
        self.alignment.store(alignment, Ordering::Release);
    }

    pub fn set_declared_delay(&self, delay: u64) {
        self.declared_delay.store(delay, Ordering::Release);
    }

    pub fn set_tag_propagation(&self, policy: TagPropagation) {
        self.tag_propagation
            .store(policy_as_u8(policy), Ordering::Release);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::Release);
    }

    pub fn loop_state(&self) -> LoopState {
        LoopState::from_u8(self.loop_state.load(Ordering::Acquire))
    }

    pub fn set_loop_state(&self, state: LoopState) {
        self.loop_state.store(state.as_u8(), Ordering::Release);
    }

    /// Attached and without a live loop.
    pub fn needs_loop(&self) -> bool {
        self.is_attached()
            && matches!(
                self.loop_state(),
                LoopState::NotStarted | LoopState::Detached
            )
    }

    pub fn stage_counters(&self) -> Option<Arc<StageCounters>> {
        self.stage_counters.clone()
    }
}

/// Read-only view of a block for driver code.
///
/// Counter reads are atomic and may be taken from any task at any time.
#[derive(Debug, Clone)]
pub struct BlockHandle {
    core: Arc<BlockCore>,
}

impl BlockHandle {
    pub(crate) fn new(core: Arc<BlockCore>) -> Self {
        Self { core }
    }

    pub fn id(&self) -> BlockId {
        self.core.id()
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn kind(&self) -> BlockKind {
        self.core.kind()
    }

    pub fn produced(&self) -> u64 {
        self.core.counters.snapshot().produced
    }

    pub fn consumed(&self) -> u64 {
        self.core.counters.snapshot().consumed
    }

    pub fn tags_received(&self) -> u64 {
        self.core.counters.snapshot().tags_received
    }

    pub fn tags_emitted(&self) -> u64 {
        self.core.counters.snapshot().tags_emitted
    }

    pub fn invocations(&self) -> u64 {
        self.core.counters.snapshot().invocations
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.core.counters.snapshot()
    }

    pub fn history(&self) -> usize {
        self.core.history()
    }

    pub fn alignment(&self) -> usize {
        self.core.alignment()
    }

    pub fn declared_delay(&self) -> u64 {
        self.core.declared_delay()
    }

    pub fn settings(&self) -> BlockSettings {
        self.core.settings()
    }

    pub fn stage_counters(&self) -> Option<Arc<StageCounters>> {
        self.core.stage_counters()
    }

    pub fn loop_state(&self) -> LoopState {
        self.core.loop_state()
    }

    pub fn is_attached(&self) -> bool {
        self.core.is_attached()
    }

    /// True once the block's loop has ended for good.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.core.loop_state(),
            LoopState::Finished | LoopState::Failed | LoopState::Stopped
        )
    }

    /// Zero the engine counters and the block body's own counters.
    pub fn reset_counters(&self) {
        self.core.counters.reset();
        if let Some(stage) = self.core.stage_counters() {
            stage.reset();
        }
    }

    /// Wait until the block has produced at least `target` items or its loop
    /// has ended. Returns the produced count at that point.
    pub async fn wait_for_produced(&self, target: u64) -> u64 {
        loop {
            let notified = self.core.progress.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let produced = self.produced();
            if produced >= target || self.is_finished() {
                return produced;
            }
            notified.await;
        }
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<BlockCore> {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::WorkIo;
    use crate::errors::BlockError;
    use crate::traits::WorkResult;

    struct Shape(IoSignature);

    impl Block for Shape {
        fn name(&self) -> &str {
            "shape"
        }

        fn signature(&self) -> IoSignature {
            self.0.clone()
        }

        fn work(&mut self, _io: &mut WorkIo<'_>) -> Result<WorkResult, BlockError> {
            Ok(WorkResult::Done)
        }
    }

    fn core(signature: IoSignature, settings: BlockSettings) -> Result<BlockCore, GraphError> {
        BlockCore::new(
            BlockId(1),
            Box::new(Shape(signature)),
            settings,
            &EngineConfig::default(),
        )
    }

    #[test]
    fn test_new_core_allocates_one_buffer_per_output() {
        let core = core(
            IoSignature::new(vec![4], vec![4, 8]),
            BlockSettings::default(),
        )
        .unwrap();
        let wiring = core.wiring.try_read().unwrap();
        assert_eq!(wiring.inputs.len(), 1);
        assert_eq!(wiring.outputs.len(), 2);
        assert_eq!(core.kind(), BlockKind::Transform);
        assert_eq!(core.loop_state(), LoopState::NotStarted);
        assert!(!core.needs_loop(), "not attached yet");
    }

    #[test]
    fn test_new_core_rejects_bad_shapes() {
        assert!(matches!(
            core(IoSignature::new(vec![], vec![]), BlockSettings::default()),
            Err(GraphError::NoPorts { .. })
        ));
        assert!(matches!(
            core(IoSignature::sink(4), BlockSettings::default().with_alignment(0)),
            Err(GraphError::InvalidAlignment { .. })
        ));
    }

    #[test]
    fn test_new_core_rejects_zero_item_sizes() {
        let cases = vec![
            (IoSignature::source(0), PortDirection::Output, 0),
            (IoSignature::sink(0), PortDirection::Input, 0),
            (IoSignature::new(vec![4, 0], vec![4]), PortDirection::Input, 1),
            (IoSignature::new(vec![4], vec![4, 0]), PortDirection::Output, 1),
        ];
        for (signature, expected_direction, expected_port) in cases {
            match core(signature, BlockSettings::default()) {
                Err(GraphError::InvalidItemSize {
                    direction, port, ..
                }) => {
                    assert_eq!(direction, expected_direction);
                    assert_eq!(port, expected_port);
                }
                other => panic!("expected InvalidItemSize, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_settings_round_trip_through_atomics() {
        let core = core(IoSignature::transform(4), BlockSettings::default()).unwrap();
        core.set_history(5000);
        core.set_alignment(64);
        core.set_declared_delay(2000);
        core.set_tag_propagation(TagPropagation::Dont);
        assert_eq!(
            core.settings(),
            BlockSettings {
                history: 5000,
                alignment: 64,
                declared_delay: 2000,
                tag_propagation: TagPropagation::Dont,
            }
        );
    }

    #[test]
    fn test_reset_counters_clears_engine_counters() {
        let handle = BlockHandle::new(Arc::new(
            core(IoSignature::sink(4), BlockSettings::default()).unwrap(),
        ));
        handle.core().counters.record(0, 100, 3, 0);
        assert_eq!(handle.consumed(), 100);
        assert_eq!(handle.invocations(), 1);
        handle.reset_counters();
        assert_eq!(handle.counters().consumed, 0);
        assert_eq!(handle.tags_received(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_produced_returns_when_finished() {
        let handle = BlockHandle::new(Arc::new(
            core(IoSignature::source(4), BlockSettings::default()).unwrap(),
        ));
        handle.core().set_loop_state(LoopState::Finished);
        assert_eq!(handle.wait_for_produced(1_000).await, 0);
    }
}
