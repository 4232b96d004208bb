// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The driver-facing flowgraph: build, run, pause, edit, resume, wait.
//!
//! Every edit takes the topology lock, checks the run state, validates the
//! whole edit (including buffer limits) and only then applies it, so a failing
//! call leaves the graph exactly as it was.
//!
//! # Examples
//!
//! ```no_run
//! use streamwood::blocks::{CountingSink, CountingSource, HistoryBlock};
//! use streamwood::config::EngineConfig;
//! use streamwood::engine::FlowGraph;
//! use streamwood::graph::BlockSettings;
//!
//! # async fn demo() -> Result<(), streamwood::errors::EngineError> {
//! let fg = FlowGraph::new("demo", EngineConfig::default());
//! let src = fg.add_block(Box::new(CountingSource::new(1_000_000, 101))).await?;
//! let cpy = fg
//!     .add_block_with(Box::new(HistoryBlock::new(0)), BlockSettings::default().with_history(5000))
//!     .await?;
//! let dst = fg.add_block(Box::new(CountingSink::new())).await?;
//!
//! fg.connect(src.id(), 0, cpy.id(), 0).await?;
//! fg.connect(cpy.id(), 0, dst.id(), 0).await?;
//! fg.start().await?;
//!
//! src.wait_for_produced(50_000).await;
//! fg.lock().await?;
//! fg.set_history(cpy.id(), 5500).await?;
//! fg.unlock().await?;
//!
//! fg.wait_for_completion().await?;
//! assert_eq!(dst.consumed(), 1_000_000);
//! # Ok(())
//! # }
//! ```

use crate::blocks::{BlockConfig, BlockFactory};
use crate::buffer::{BufferStats, ChannelBuffer, ReaderRequirements};
use crate::config::EngineConfig;
use crate::engine::coordinator::{Coordinator, RunState};
use crate::engine::scheduler::{BlockRunner, LoopOutcome};
use crate::errors::{EngineError, GraphError, StateError};
use crate::graph::{
    BlockCore, BlockHandle, BlockId, BlockSettings, Edge, Endpoint, InputBinding, PortDirection,
    Topology, Wiring,
};
use crate::observability::messages::engine::{BlockAdded, FlowgraphCompleted, FlowgraphStarted, FlowgraphStopped};
use crate::observability::messages::reconfig::{
    BlockReplaced, BufferResized, EdgeConnected, EdgeDisconnected, GraphPaused, GraphResumed,
    PauseRequested, SettingChanged,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{Block, TagPropagation};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;

struct Inner {
    name: String,
    config: EngineConfig,
    topology: Mutex<Topology>,
    coordinator: Arc<Coordinator>,
    tasks: Mutex<JoinSet<LoopOutcome>>,
    next_id: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

/// A graph of blocks plus the loops that run them. Cheap to clone.
#[derive(Clone)]
pub struct FlowGraph {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowGraph")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

impl FlowGraph {
    pub fn new(name: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                topology: Mutex::new(Topology::new()),
                coordinator: Arc::new(Coordinator::new()),
                tasks: Mutex::new(JoinSet::new()),
                next_id: AtomicU64::new(0),
                started_at: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn state(&self) -> RunState {
        self.inner.coordinator.state()
    }

    // ---- construction ----

    /// Register a block with the settings it asks for.
    pub async fn add_block(&self, block: Box<dyn Block>) -> Result<BlockHandle, EngineError> {
        let settings = block.settings();
        self.add_block_with(block, settings).await
    }

    /// Register a block with explicit settings. The block joins the running
    /// graph only when it gains its first edge.
    pub async fn add_block_with(
        &self,
        block: Box<dyn Block>,
        settings: BlockSettings,
    ) -> Result<BlockHandle, EngineError> {
        let id = BlockId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let core = Arc::new(BlockCore::new(id, block, settings, &self.inner.config)?);
        self.inner.topology.lock().await.insert_block(core.clone());
        BlockAdded {
            block: core.name(),
            id,
            kind: core.kind(),
            settings,
        }
        .log();
        Ok(BlockHandle::new(core))
    }

    /// Build a block from configuration through the [`BlockFactory`].
    pub async fn create(&self, config: &BlockConfig) -> Result<BlockHandle, EngineError> {
        let block = BlockFactory::create(config)?;
        let settings = config.apply_to(block.settings());
        self.add_block_with(block, settings).await
    }

    pub async fn block(&self, id: BlockId) -> Result<BlockHandle, GraphError> {
        let topology = self.inner.topology.lock().await;
        Ok(BlockHandle::new(topology.block(id)?.clone()))
    }

    pub async fn edges(&self) -> Vec<Edge> {
        self.inner.topology.lock().await.edges().to_vec()
    }

    pub async fn buffer_stats(&self, block: BlockId, port: usize) -> Result<BufferStats, GraphError> {
        let core = self.inner.topology.lock().await.block(block)?.clone();
        let buffer = output_buffer(&core, port).await?;
        Ok(buffer.stats().await)
    }

    // ---- edits (idle or paused only) ----

    pub async fn connect(
        &self,
        src: BlockId,
        src_port: usize,
        dst: BlockId,
        dst_port: usize,
    ) -> Result<(), EngineError> {
        let mut topology = self.inner.topology.lock().await;
        self.inner.coordinator.ensure_mutable()?;

        let (src_ep, dst_ep) = (Endpoint::new(src, src_port), Endpoint::new(dst, dst_port));
        topology.validate_new_edge(src_ep, dst_ep)?;
        let src_core = topology.block(src)?.clone();
        let dst_core = topology.block(dst)?.clone();

        let buffer = output_buffer(&src_core, src_port).await?;
        let reader = buffer.next_reader_id();
        let requirements = dst_core.reader_requirements();
        {
            let mut state = buffer.lock().await;
            let required = state.required_capacity_for(
                self.margin(),
                state.writer_alignment(),
                Some((reader, requirements)),
            );
            self.check_limit(src_ep, required, state.item_size())?;
            state.add_reader(reader, requirements, dst_core.wakeup.clone());
            if let Some((from, to)) = state.ensure_capacity(required) {
                BufferResized { endpoint: src_ep, from, to }.log();
            }
        }

        if let Some(slot) = dst_core.wiring.write().await.inputs.get_mut(dst_port) {
            *slot = Some(InputBinding {
                buffer,
                reader,
                upstream: src_ep,
            });
        }
        topology.add_edge(src_ep, dst_ep);
        topology.sync_attached();

        EdgeConnected {
            src: src_ep,
            dst: dst_ep,
            src_name: src_core.name(),
            dst_name: dst_core.name(),
        }
        .log();
        Ok(())
    }

    pub async fn disconnect(
        &self,
        src: BlockId,
        src_port: usize,
        dst: BlockId,
        dst_port: usize,
    ) -> Result<(), EngineError> {
        let mut topology = self.inner.topology.lock().await;
        self.inner.coordinator.ensure_mutable()?;
        let edge = topology.remove_edge(Endpoint::new(src, src_port), Endpoint::new(dst, dst_port))?;
        unbind(&topology, edge).await?;
        topology.sync_attached();
        Ok(())
    }

    /// Remove every edge touching `block`.
    pub async fn disconnect_all(&self, block: BlockId) -> Result<(), EngineError> {
        let mut topology = self.inner.topology.lock().await;
        self.inner.coordinator.ensure_mutable()?;
        topology.block(block)?;
        for edge in topology.edges_of(block) {
            topology.remove_edge(edge.src, edge.dst)?;
            unbind(&topology, edge).await?;
        }
        topology.sync_attached();
        Ok(())
    }

    /// Swap `old` for the unconnected block `new` without losing items.
    ///
    /// `new` takes over the input cursors of `old` (with its own history and
    /// alignment) and the output buffers of `old`, so downstream cursors and
    /// produced counts continue where they were.
    pub async fn replace(&self, old: BlockId, new: BlockId) -> Result<(), EngineError> {
        let mut topology = self.inner.topology.lock().await;
        self.inner.coordinator.ensure_mutable()?;

        let old_core = topology.block(old)?.clone();
        let new_core = topology.block(new)?.clone();
        let incompatible = |reason: &str| GraphError::IncompatibleReplacement {
            old: old_core.name().to_string(),
            new: new_core.name().to_string(),
            reason: reason.to_string(),
        };
        if old == new {
            return Err(incompatible("a block cannot replace itself").into());
        }
        if topology.is_attached(new) {
            return Err(incompatible("the replacement is already connected").into());
        }
        if old_core.signature() != new_core.signature() {
            return Err(incompatible("port shapes differ").into());
        }

        let requirements = new_core.reader_requirements();
        let alignment = new_core.alignment();
        let old_wiring = old_core.wiring.read().await.clone();
        self.preview_inputs(&old_wiring, requirements).await?;
        self.preview_outputs(new, &old_wiring, alignment).await?;

        {
            let mut old_wiring = old_core.wiring.write().await;
            let mut new_wiring = new_core.wiring.write().await;
            std::mem::swap(&mut *old_wiring, &mut *new_wiring);

            // the unused buffers `new` was created with now belong to `old`
            for buffer in &old_wiring.outputs {
                let mut state = buffer.lock().await;
                state.set_writer_wakeup(old_core.wakeup.clone());
                state.set_writer_alignment(old_core.alignment());
            }
            self.apply_inputs(&new_wiring, requirements, Some(&new_core.wakeup))
                .await;
            self.apply_outputs(new, &new_wiring, alignment, Some(&new_core.wakeup))
                .await;
        }

        for edge in topology.edges_of(old) {
            if edge.src.block != old {
                continue;
            }
            let consumer = topology.block(edge.dst.block)?;
            let mut wiring = consumer.wiring.write().await;
            if let Some(Some(binding)) = wiring.inputs.get_mut(edge.dst.port) {
                binding.upstream = Endpoint::new(new, edge.src.port);
            }
        }
        topology.replace_block(old, new);
        topology.sync_attached();

        BlockReplaced {
            old: old_core.name(),
            new: new_core.name(),
            old_id: old,
            new_id: new,
        }
        .log();
        Ok(())
    }

    pub async fn set_history(&self, block: BlockId, history: usize) -> Result<(), EngineError> {
        let topology = self.inner.topology.lock().await;
        self.inner.coordinator.ensure_mutable()?;
        let core = topology.block(block)?.clone();

        let requirements = ReaderRequirements {
            history,
            alignment: core.alignment(),
        };
        let wiring = core.wiring.read().await.clone();
        self.preview_inputs(&wiring, requirements).await?;

        let previous = core.history();
        core.set_history(history);
        self.apply_inputs(&wiring, requirements, None).await;
        SettingChanged {
            block: core.name(),
            setting: "history",
            from: previous.to_string(),
            to: history.to_string(),
        }
        .log();
        Ok(())
    }

    /// Set the output multiple. Resizes both the buffers the block reads and
    /// the buffers it writes.
    pub async fn set_alignment(&self, block: BlockId, alignment: usize) -> Result<(), EngineError> {
        let topology = self.inner.topology.lock().await;
        self.inner.coordinator.ensure_mutable()?;
        let core = topology.block(block)?.clone();
        if alignment == 0 {
            return Err(GraphError::InvalidAlignment {
                block: core.name().to_string(),
            }
            .into());
        }

        let requirements = ReaderRequirements {
            history: core.history(),
            alignment,
        };
        let wiring = core.wiring.read().await.clone();
        self.preview_inputs(&wiring, requirements).await?;
        self.preview_outputs(block, &wiring, alignment).await?;

        let previous = core.alignment();
        core.set_alignment(alignment);
        self.apply_inputs(&wiring, requirements, None).await;
        self.apply_outputs(block, &wiring, alignment, None).await;
        SettingChanged {
            block: core.name(),
            setting: "alignment",
            from: previous.to_string(),
            to: alignment.to_string(),
        }
        .log();
        Ok(())
    }

    pub async fn declare_delay(&self, block: BlockId, delay: u64) -> Result<(), EngineError> {
        let topology = self.inner.topology.lock().await;
        self.inner.coordinator.ensure_mutable()?;
        let core = topology.block(block)?;
        let previous = core.declared_delay();
        core.set_declared_delay(delay);
        SettingChanged {
            block: core.name(),
            setting: "declared_delay",
            from: previous.to_string(),
            to: delay.to_string(),
        }
        .log();
        Ok(())
    }

    pub async fn set_tag_propagation(
        &self,
        block: BlockId,
        policy: TagPropagation,
    ) -> Result<(), EngineError> {
        let topology = self.inner.topology.lock().await;
        self.inner.coordinator.ensure_mutable()?;
        let core = topology.block(block)?;
        let previous = core.tag_propagation();
        core.set_tag_propagation(policy);
        SettingChanged {
            block: core.name(),
            setting: "tag_propagation",
            from: format!("{:?}", previous),
            to: format!("{:?}", policy),
        }
        .log();
        Ok(())
    }

    // ---- run control ----

    /// Validate the graph and spawn one loop per attached block.
    pub async fn start(&self) -> Result<(), EngineError> {
        let topology = self.inner.topology.lock().await;
        self.inner
            .coordinator
            .expect_state("start", RunState::Idle)?;
        topology.validate_runnable()?;
        topology.sync_attached();

        self.inner.coordinator.set_state(RunState::Running);
        *self.inner.started_at.lock().await = Some(Instant::now());
        let loops = self.spawn_loops(topology.blocks_needing_loops()).await;

        FlowgraphStarted {
            name: &self.inner.name,
            loops,
            edges: topology.edges().len(),
        }
        .log();
        Ok(())
    }

    /// Pause every loop between invocations and wait until all of them are parked.
    pub async fn lock(&self) -> Result<(), EngineError> {
        {
            let _topology = self.inner.topology.lock().await;
            self.inner
                .coordinator
                .expect_state("lock", RunState::Running)?;
            self.inner.coordinator.set_state(RunState::Pausing);
        }
        PauseRequested {
            name: &self.inner.name,
            live_loops: self.inner.coordinator.live_loops(),
        }
        .log();

        self.wake_all().await;
        self.inner.coordinator.wait_quiesced().await;

        let topology = self.inner.topology.lock().await;
        self.inner
            .coordinator
            .expect_state("lock", RunState::Pausing)?;
        self.inner.coordinator.set_state(RunState::Paused);
        drop(topology);

        GraphPaused {
            name: &self.inner.name,
            parked: self.inner.coordinator.parked_loops(),
        }
        .log();
        Ok(())
    }

    /// Re-validate the topology, start loops for newly attached blocks and
    /// release the parked ones. An invalid topology leaves the graph paused.
    pub async fn unlock(&self) -> Result<(), EngineError> {
        let topology = self.inner.topology.lock().await;
        self.inner
            .coordinator
            .expect_state("unlock", RunState::Paused)?;
        topology.validate_runnable()?;

        self.inner.coordinator.set_state(RunState::Resuming);
        topology.sync_attached();
        let spawned = self.spawn_loops(topology.blocks_needing_loops()).await;
        self.inner.coordinator.set_state(RunState::Running);
        for core in topology.blocks() {
            core.wakeup.notify_one();
        }

        GraphResumed {
            name: &self.inner.name,
            spawned,
        }
        .log();
        Ok(())
    }

    /// Cancel every loop at its next suspension point.
    pub async fn stop(&self) {
        if self.state() == RunState::Completed {
            return;
        }
        self.inner.coordinator.cancel();
        let previous = self.inner.coordinator.set_state(RunState::Stopped);
        self.wake_all().await;
        FlowgraphStopped {
            name: &self.inner.name,
            previous,
        }
        .log();
    }

    /// Wait for every loop to end and join it. Returns the first block error.
    pub async fn wait_for_completion(&self) -> Result<(), EngineError> {
        let state = self.state();
        if matches!(state, RunState::Idle | RunState::Pausing | RunState::Paused) {
            return Err(StateError::InvalidTransition {
                operation: "wait for completion",
                state,
            }
            .into());
        }

        self.inner.coordinator.wait_all_exited().await;

        let mut first_error = None;
        let mut joined = 0;
        {
            let mut tasks = self.inner.tasks.lock().await;
            while let Some(outcome) = tasks.join_next().await {
                joined += 1;
                let error = match outcome {
                    Ok((_, _, Ok(_))) => continue,
                    Ok((_, _, Err(error))) => error,
                    Err(join_error) => EngineError::TaskJoin {
                        block: "unknown".to_string(),
                        reason: join_error.to_string(),
                    },
                };
                first_error.get_or_insert(error);
            }
        }

        if self.state() != RunState::Stopped {
            self.inner.coordinator.set_state(RunState::Completed);
        }
        let elapsed = self
            .inner
            .started_at
            .lock()
            .await
            .as_ref()
            .map(Instant::elapsed)
            .unwrap_or_default();
        FlowgraphCompleted {
            name: &self.inner.name,
            loops_joined: joined,
            duration: elapsed,
            failed: first_error.is_some(),
        }
        .log();

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    // ---- helpers ----

    fn margin(&self) -> usize {
        self.inner.config.get_buffer_margin_items()
    }

    fn check_limit(&self, endpoint: Endpoint, required: usize, item_size: usize) -> Result<(), GraphError> {
        let limit_bytes = self.inner.config.get_max_buffer_bytes();
        let required_bytes = required.saturating_mul(item_size);
        if required_bytes > limit_bytes {
            return Err(GraphError::BufferTooLarge {
                endpoint,
                required_items: required,
                required_bytes,
                limit_bytes,
            });
        }
        Ok(())
    }

    /// Check that new reader requirements fit on every input buffer.
    async fn preview_inputs(&self, wiring: &Wiring, requirements: ReaderRequirements) -> Result<(), GraphError> {
        for binding in wiring.inputs.iter().flatten() {
            let state = binding.buffer.lock().await;
            let required = state.required_capacity_for(
                self.margin(),
                state.writer_alignment(),
                Some((binding.reader, requirements)),
            );
            self.check_limit(binding.upstream, required, state.item_size())?;
        }
        Ok(())
    }

    /// Check that a new writer alignment fits on every output buffer.
    async fn preview_outputs(&self, block: BlockId, wiring: &Wiring, alignment: usize) -> Result<(), GraphError> {
        for (port, buffer) in wiring.outputs.iter().enumerate() {
            let state = buffer.lock().await;
            let required = state.required_capacity_for(self.margin(), alignment, None);
            self.check_limit(Endpoint::new(block, port), required, state.item_size())?;
        }
        Ok(())
    }

    async fn apply_inputs(&self, wiring: &Wiring, requirements: ReaderRequirements, wakeup: Option<&Arc<Notify>>) {
        for binding in wiring.inputs.iter().flatten() {
            let mut state = binding.buffer.lock().await;
            state.set_reader_requirements(binding.reader, requirements);
            if let Some(wakeup) = wakeup {
                state.set_reader_wakeup(binding.reader, wakeup.clone());
            }
            let required = state.required_capacity(self.margin());
            if let Some((from, to)) = state.ensure_capacity(required) {
                BufferResized {
                    endpoint: binding.upstream,
                    from,
                    to,
                }
                .log();
            }
        }
    }

    async fn apply_outputs(
        &self,
        block: BlockId,
        wiring: &Wiring,
        alignment: usize,
        wakeup: Option<&Arc<Notify>>,
    ) {
        for (port, buffer) in wiring.outputs.iter().enumerate() {
            let mut state = buffer.lock().await;
            state.set_writer_alignment(alignment);
            if let Some(wakeup) = wakeup {
                state.set_writer_wakeup(wakeup.clone());
            }
            let required = state.required_capacity(self.margin());
            if let Some((from, to)) = state.ensure_capacity(required) {
                BufferResized {
                    endpoint: Endpoint::new(block, port),
                    from,
                    to,
                }
                .log();
            }
        }
    }

    async fn spawn_loops(&self, cores: Vec<Arc<BlockCore>>) -> usize {
        let mut tasks = self.inner.tasks.lock().await;
        let count = cores.len();
        for core in cores {
            let runner = BlockRunner::new(core, self.inner.coordinator.clone(), &self.inner.config);
            tasks.spawn(runner.run());
        }
        count
    }

    async fn wake_all(&self) {
        let topology = self.inner.topology.lock().await;
        for core in topology.blocks() {
            core.wakeup.notify_one();
        }
    }
}

async fn output_buffer(
    core: &BlockCore,
    port: usize,
) -> Result<Arc<ChannelBuffer>, GraphError> {
    let wiring = core.wiring.read().await;
    let available = wiring.outputs.len();
    let buffer = wiring.outputs.get(port).cloned();
    buffer.ok_or_else(|| GraphError::PortOutOfRange {
        block: core.name().to_string(),
        direction: PortDirection::Output,
        port,
        available,
    })
}

/// Drop the consumer's cursor for an edge already removed from the topology.
async fn unbind(topology: &Topology, edge: Edge) -> Result<(), GraphError> {
    let consumer = topology.block(edge.dst.block)?;
    let binding = consumer
        .wiring
        .write()
        .await
        .inputs
        .get_mut(edge.dst.port)
        .and_then(Option::take);
    if let Some(binding) = binding {
        binding.buffer.lock().await.remove_reader(binding.reader);
    }
    EdgeDisconnected {
        src: edge.src,
        dst: edge.dst,
    }
    .log();
    Ok(())
}
