// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! One execution loop per block.
//!
//! Each iteration honours pause and cancellation, snapshots the block's wiring,
//! computes the largest aligned grant every input and output allows, and either
//! invokes `work` or suspends on the block's wake-up `Notify`. Upstream writes,
//! downstream consumption and run-state changes all signal that `Notify`, and
//! its permit semantics mean a signal sent before the loop starts waiting is
//! not lost.
//!
//! # Grant
//!
//! ```text
//! n = min(max_noutput rounded to alignment, space on every output, available on every input)
//! n = n - n % alignment
//! ```
//!
//! When `n` is zero and every upstream writer is done, the loop either ends
//! (no input left) or makes a single tail call with the sub-alignment
//! remainder, so no item is stranded at end of stream.
//!
//! # Tag propagation
//!
//! After a transform consumes `count` items, each tag it read from the
//! consumed part of an input window is re-emitted on the outputs selected by
//! its [`TagPropagation`] policy at
//!
//! ```text
//! out_offset = in_offset - consumed_before + produced_before + declared_delay
//! ```

use crate::buffer::{InputItems, OutputItems, Tag, WindowCopy, WorkIo};
use crate::config::EngineConfig;
use crate::engine::coordinator::{Coordinator, LoopGuard};
use crate::errors::{BlockError, EngineError};
use crate::graph::{BlockCore, BlockId, LoopState, Wiring};
use crate::observability::messages::engine::{BlockFailed, BlockLoopExited, BlockLoopStarted};
use crate::observability::messages::StructuredLog;
use crate::traits::{BlockKind, TagPropagation, WorkResult};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Why a loop ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// End of stream; outputs were marked done
    Finished,
    /// The block left the graph
    Detached,
    /// The flowgraph was stopped
    Stopped,
}

impl Display for LoopExit {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            LoopExit::Finished => write!(f, "end of stream"),
            LoopExit::Detached => write!(f, "detached"),
            LoopExit::Stopped => write!(f, "stopped"),
        }
    }
}

pub(crate) type LoopOutcome = (BlockId, String, Result<LoopExit, EngineError>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    Ready(usize),
    Tail(usize),
    EndOfStream,
    Blocked,
    Detached,
}

enum Step {
    Continue,
    Finished,
    Detached,
}

pub(crate) struct BlockRunner {
    core: Arc<BlockCore>,
    coordinator: Arc<Coordinator>,
    max_noutput_items: usize,
    first_start: bool,
    scratch_in: Vec<Vec<u8>>,
    scratch_out: Vec<Vec<u8>>,
    _guard: LoopGuard,
}

impl BlockRunner {
    /// Registers the loop as live immediately, so a `lock()` issued before the
    /// task is first polled still waits for it.
    pub fn new(core: Arc<BlockCore>, coordinator: Arc<Coordinator>, config: &EngineConfig) -> Self {
        let guard = coordinator.register_loop();
        let first_start = core.loop_state() == LoopState::NotStarted;
        core.set_loop_state(LoopState::Running);
        Self {
            scratch_in: vec![Vec::new(); core.signature().inputs()],
            scratch_out: vec![Vec::new(); core.signature().outputs()],
            core,
            coordinator,
            max_noutput_items: config.get_max_noutput_items(),
            first_start,
            _guard: guard,
        }
    }

    pub async fn run(mut self) -> LoopOutcome {
        let id = self.core.id();
        let name = self.core.name().to_string();
        BlockLoopStarted {
            block: &name,
            kind: self.core.kind(),
            settings: self.core.settings(),
        }
        .log();

        let mut result = self.drive().await;

        let final_state = match &result {
            Ok(LoopExit::Finished) => LoopState::Finished,
            Ok(LoopExit::Detached) => LoopState::Detached,
            Ok(LoopExit::Stopped) => LoopState::Stopped,
            Err(_) => LoopState::Failed,
        };
        if matches!(final_state, LoopState::Finished | LoopState::Failed) {
            self.mark_outputs_done().await;
        }
        if final_state != LoopState::Detached {
            let stopped = self.core.body.lock().await.stop();
            if let Err(error) = stopped {
                if result.is_ok() {
                    result = Err(self.block_error(error));
                }
            }
        }

        let reason = match &result {
            Ok(exit) => exit.to_string(),
            Err(error) => error.to_string(),
        };
        BlockLoopExited {
            block: &name,
            reason: &reason,
            counters: self.core.counters.snapshot(),
        }
        .log();

        self.core.set_loop_state(final_state);
        self.core.progress.notify_waiters();
        (id, name, result)
    }

    async fn drive(&mut self) -> Result<LoopExit, EngineError> {
        if self.first_start {
            let started = self.core.body.lock().await.start();
            started.map_err(|e| self.block_error(e))?;
        }
        let cancel = self.coordinator.cancel_token();

        loop {
            if cancel.is_cancelled() {
                return Ok(LoopExit::Stopped);
            }
            if self.coordinator.pause_requested() {
                if !self.coordinator.park().await {
                    return Ok(LoopExit::Stopped);
                }
                continue;
            }
            if !self.core.is_attached() {
                return Ok(LoopExit::Detached);
            }

            let wiring = self.core.wiring.read().await.clone();
            let step = match self.grant(&wiring).await {
                Grant::Ready(n) => self.invoke(&wiring, n, false).await?,
                Grant::Tail(n) => self.invoke(&wiring, n, true).await?,
                Grant::EndOfStream => Step::Finished,
                Grant::Detached => Step::Detached,
                Grant::Blocked => {
                    tokio::select! {
                        _ = self.core.wakeup.notified() => {}
                        _ = cancel.cancelled() => return Ok(LoopExit::Stopped),
                    }
                    continue;
                }
            };

            match step {
                Step::Continue => tokio::task::yield_now().await,
                Step::Finished => return Ok(LoopExit::Finished),
                Step::Detached => return Ok(LoopExit::Detached),
            }
        }
    }

    async fn grant(&self, wiring: &Wiring) -> Grant {
        let alignment = self.core.alignment().max(1);
        let limit = (self.max_noutput_items / alignment).max(1) * alignment;

        let mut available = usize::MAX;
        let mut upstream_done = !wiring.inputs.is_empty();
        for input in &wiring.inputs {
            let Some(binding) = input else {
                return Grant::Detached;
            };
            let state = binding.buffer.lock().await;
            let Some(status) = state.reader_status(binding.reader) else {
                return Grant::Detached;
            };
            available = available.min(status.available);
            upstream_done &= status.writer_done;
        }

        let mut space = usize::MAX;
        for output in &wiring.outputs {
            space = space.min(output.lock().await.space());
        }

        let n = limit.min(available).min(space);
        let aligned = n - n % alignment;
        if aligned > 0 {
            return Grant::Ready(aligned);
        }
        if upstream_done {
            if available == 0 {
                return Grant::EndOfStream;
            }
            if available < alignment && space >= available {
                return Grant::Tail(available);
            }
        }
        Grant::Blocked
    }

    async fn invoke(&mut self, wiring: &Wiring, n: usize, tail: bool) -> Result<Step, EngineError> {
        let signature = self.core.signature().clone();

        let mut windows: Vec<WindowCopy> = Vec::with_capacity(wiring.inputs.len());
        for (port, input) in wiring.inputs.iter().enumerate() {
            let Some(binding) = input else {
                return Ok(Step::Detached);
            };
            let state = binding.buffer.lock().await;
            match state.read_window(binding.reader, n, &mut self.scratch_in[port]) {
                Some(window) => windows.push(window),
                None => return Ok(Step::Detached),
            }
        }

        let mut produced_before = Vec::with_capacity(wiring.outputs.len());
        for (port, output) in wiring.outputs.iter().enumerate() {
            let state = output.lock().await;
            produced_before.push(state.produced());
            let scratch = &mut self.scratch_out[port];
            scratch.clear();
            scratch.resize(n * state.item_size(), 0);
        }

        let inputs = windows
            .iter()
            .zip(&self.scratch_in)
            .zip(&signature.input_sizes)
            .map(|((window, data), size)| {
                InputItems::new(data, *size, window.window_start, window.lookback, &window.tags)
            })
            .collect();
        let outputs = self
            .scratch_out
            .iter_mut()
            .zip(&signature.output_sizes)
            .zip(&produced_before)
            .enumerate()
            .map(|(port, ((data, size), before))| OutputItems::new(port, data, *size, *before))
            .collect();

        let mut io = WorkIo::new(n, inputs, outputs);
        let result = {
            let mut body = self.core.body.lock().await;
            body.work(&mut io)
        };
        let written_tags = io.take_output_tags();
        drop(io);

        let (count, finished) = match result.map_err(|e| self.block_error(e))? {
            WorkResult::Produced(count) => (count, false),
            WorkResult::Finished(count) => (count, true),
            WorkResult::Done => (0, true),
        };
        self.check_count(count, n, finished || tail)?;

        let (mut out_tags, received) = self.route_tags(written_tags, &windows, &produced_before, count);
        let emitted: usize = out_tags.iter().map(Vec::len).sum();

        for (port, output) in wiring.outputs.iter().enumerate() {
            let tags = std::mem::take(&mut out_tags[port]);
            if count == 0 && tags.is_empty() {
                continue;
            }
            let mut state = output.lock().await;
            let bytes = count * state.item_size();
            state.write(&self.scratch_out[port][..bytes], tags);
        }
        if count > 0 {
            for binding in wiring.inputs.iter().flatten() {
                binding.buffer.lock().await.consume(binding.reader, count);
            }
        }

        let produced = if wiring.outputs.is_empty() { 0 } else { count };
        let consumed = if wiring.inputs.is_empty() { 0 } else { count };
        self.core
            .counters
            .record(produced as u64, consumed as u64, received as u64, emitted as u64);
        self.core.progress.notify_waiters();

        Ok(if finished { Step::Finished } else { Step::Continue })
    }

    fn check_count(&self, count: usize, granted: usize, partial_allowed: bool) -> Result<(), EngineError> {
        let alignment = self.core.alignment().max(1);
        let reason = if count > granted {
            format!("returned {} items for a grant of {}", count, granted)
        } else if !partial_allowed && count % alignment != 0 {
            format!("returned {} items, not a multiple of alignment {}", count, alignment)
        } else {
            return Ok(());
        };
        Err(self.block_error(BlockError::ContractViolation {
            block: self.core.name().to_string(),
            reason,
        }))
    }

    /// Tags written by the block plus propagated input tags, per output port.
    /// Also returns how many input tags fell inside the consumed span.
    fn route_tags(
        &self,
        written: Vec<Vec<Tag>>,
        windows: &[WindowCopy],
        produced_before: &[u64],
        count: usize,
    ) -> (Vec<Vec<Tag>>, usize) {
        let name = self.core.name();
        let mut out_tags: Vec<Vec<Tag>> = written
            .into_iter()
            .map(|tags| {
                tags.into_iter()
                    .map(|tag| match tag.source {
                        Some(_) => tag,
                        None => tag.with_source(name),
                    })
                    .collect()
            })
            .collect();

        let outputs = out_tags.len();
        let propagate = self.core.kind() == BlockKind::Transform;
        let policy = self.core.tag_propagation();
        let delay = self.core.declared_delay();
        let mut received = 0;

        for (port, window) in windows.iter().enumerate() {
            let consumed_end = window.consumed + count as u64;
            for tag in window.tags.iter().filter(|t| t.offset < consumed_end) {
                received += 1;
                if !propagate {
                    continue;
                }
                let targets = match policy {
                    TagPropagation::AllToAll => 0..outputs,
                    TagPropagation::OneToOne if port < outputs => port..port + 1,
                    _ => 0..0,
                };
                for out in targets {
                    let offset = tag.offset - window.consumed + produced_before[out] + delay;
                    out_tags[out].push(tag.moved_to(offset));
                }
            }
        }
        (out_tags, received)
    }

    async fn mark_outputs_done(&self) {
        let outputs = self.core.wiring.read().await.outputs.clone();
        for output in outputs {
            output.lock().await.mark_done();
        }
    }

    fn block_error(&self, source: BlockError) -> EngineError {
        BlockFailed {
            block: self.core.name(),
            error: &source,
        }
        .log();
        EngineError::Block {
            block: self.core.name().to_string(),
            source,
        }
    }
}
