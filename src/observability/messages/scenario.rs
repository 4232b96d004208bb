// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the scenario driver.

use crate::errors::WatchdogError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A scenario built its flowgraph and is about to start it.
///
/// # Log Level
/// `info!` - One per scenario
pub struct ScenarioStarted<'a> {
    pub scenario: &'a str,
    pub description: &'a str,
}

impl Display for ScenarioStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Running scenario '{}': {}", self.scenario, self.description)
    }
}

impl StructuredLog for ScenarioStarted<'_> {
    fn log(&self) {
        tracing::info!(scenario = self.scenario, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("scenario", span_name = name, scenario = self.scenario)
    }
}

/// A reconfiguration step was applied while the graph was paused.
///
/// # Log Level
/// `info!` - Records where in the stream the edit happened
///
/// # Example
/// ```
/// use streamwood::observability::messages::scenario::ScenarioStep;
///
/// let msg = ScenarioStep {
///     scenario: "connect_sink",
///     step: "connect sink",
///     source_items: 50_400,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ScenarioStep<'a> {
    pub scenario: &'a str,
    pub step: &'a str,
    pub source_items: u64,
}

impl Display for ScenarioStep<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} with source at {} items",
            self.scenario, self.step, self.source_items
        )
    }
}

impl StructuredLog for ScenarioStep<'_> {
    fn log(&self) {
        tracing::info!(
            scenario = self.scenario,
            step = self.step,
            source_items = self.source_items,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "scenario_step",
            span_name = name,
            scenario = self.scenario,
            step = self.step,
        )
    }
}

/// Every loop of the scenario's flowgraph was joined.
///
/// # Log Level
/// `info!` - Summary counters
pub struct ScenarioFinished<'a> {
    pub scenario: &'a str,
    pub sent: u64,
    pub received: u64,
    pub offset_mismatches: u64,
    pub duration: Duration,
}

impl Display for ScenarioFinished<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Scenario '{}' finished in {:?}: sent {}, main sink received {}, {} offset mismatches",
            self.scenario, self.duration, self.sent, self.received, self.offset_mismatches
        )
    }
}

impl StructuredLog for ScenarioFinished<'_> {
    fn log(&self) {
        tracing::info!(
            scenario = self.scenario,
            sent = self.sent,
            received = self.received,
            offset_mismatches = self.offset_mismatches,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "scenario_finished",
            span_name = name,
            scenario = self.scenario,
            duration = ?self.duration,
        )
    }
}

/// The watchdog abandoned a scenario.
///
/// # Log Level
/// `error!` - The scenario did not exercise what it was meant to
pub struct WatchdogTripped<'a> {
    pub scenario: &'a str,
    pub error: &'a WatchdogError,
}

impl Display for WatchdogTripped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Scenario '{}' failed: {}", self.scenario, self.error)
    }
}

impl StructuredLog for WatchdogTripped<'_> {
    fn log(&self) {
        tracing::error!(scenario = self.scenario, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("watchdog", span_name = name, scenario = self.scenario)
    }
}
