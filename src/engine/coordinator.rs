// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Run state and the cooperative pause barrier.
//!
//! Execution loops check for a pause only between invocations. A loop that
//! sees `Pausing` or `Paused` parks: it bumps the parked count, signals the
//! `quiesced` condition and waits on the run-state channel until the graph is
//! resumed or cancelled. `lock()` waits until every live loop is parked or has
//! exited, which is the point at which no `work` call can be in flight.

use crate::errors::StateError;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Built but not started
    Idle,
    Running,
    /// Pause requested, waiting for loops to park
    Pausing,
    /// Every loop parked; the graph may be edited
    Paused,
    /// Edits validated, loops being released
    Resuming,
    /// Cancelled by `stop()`
    Stopped,
    /// Every loop ended and was joined
    Completed,
}

impl RunState {
    pub fn is_pausing_or_paused(self) -> bool {
        matches!(self, RunState::Pausing | RunState::Paused)
    }

    /// Topology and settings may change.
    pub fn allows_mutation(self) -> bool {
        matches!(self, RunState::Idle | RunState::Paused)
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let state = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Pausing => "pausing",
            RunState::Paused => "paused",
            RunState::Resuming => "resuming",
            RunState::Stopped => "stopped",
            RunState::Completed => "completed",
        };
        write!(f, "{}", state)
    }
}

#[derive(Debug)]
pub(crate) struct Coordinator {
    state_tx: watch::Sender<RunState>,
    live_loops: AtomicUsize,
    parked: AtomicUsize,
    quiesced: Notify,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            state_tx,
            live_loops: AtomicUsize::new(0),
            parked: AtomicUsize::new(0),
            quiesced: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state_tx.borrow()
    }

    pub fn set_state(&self, state: RunState) -> RunState {
        self.state_tx.send_replace(state)
    }

    pub fn ensure_mutable(&self) -> Result<(), StateError> {
        let state = self.state();
        if state.allows_mutation() {
            Ok(())
        } else {
            Err(StateError::NotPaused { state })
        }
    }

    pub fn expect_state(&self, operation: &'static str, expected: RunState) -> Result<(), StateError> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(StateError::InvalidTransition { operation, state })
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn pause_requested(&self) -> bool {
        self.state().is_pausing_or_paused()
    }

    /// Count a loop as live. Paired with the drop of the returned guard.
    pub fn register_loop(self: &std::sync::Arc<Self>) -> LoopGuard {
        self.live_loops.fetch_add(1, Ordering::SeqCst);
        LoopGuard {
            coordinator: self.clone(),
        }
    }

    pub fn live_loops(&self) -> usize {
        self.live_loops.load(Ordering::SeqCst)
    }

    pub fn parked_loops(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    fn loop_exited(&self) {
        self.live_loops.fetch_sub(1, Ordering::SeqCst);
        self.quiesced.notify_waiters();
    }

    /// Park the calling loop until the graph leaves `Pausing`/`Paused`.
    /// Returns `false` if the graph was cancelled instead.
    pub async fn park(&self) -> bool {
        let mut state_rx = self.state_tx.subscribe();
        self.parked.fetch_add(1, Ordering::SeqCst);
        self.quiesced.notify_waiters();

        let resumed = tokio::select! {
            changed = state_rx.wait_for(|s| !s.is_pausing_or_paused()) => changed.is_ok(),
            _ = self.cancel.cancelled() => false,
        };

        self.parked.fetch_sub(1, Ordering::SeqCst);
        resumed
    }

    /// Wait until every live loop is parked or gone.
    pub async fn wait_quiesced(&self) {
        self.wait_until(|live, parked| parked >= live).await
    }

    /// Wait until no loop is live.
    pub async fn wait_all_exited(&self) {
        self.wait_until(|live, _| live == 0).await
    }

    async fn wait_until(&self, done: impl Fn(usize, usize) -> bool) {
        loop {
            let notified = self.quiesced.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if done(self.live_loops(), self.parked_loops()) {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps a loop counted as live; decrements on drop, including on panic or abort.
#[derive(Debug)]
pub(crate) struct LoopGuard {
    coordinator: std::sync::Arc<Coordinator>,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.coordinator.loop_exited();
    }
}
