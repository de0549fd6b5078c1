//! Bounded, newest-first history of service observations for one probe
//!
//! Every report pushes a node at the head. Each node carries, per service, the parsed
//! status and a run-length count of consecutive identical non-pass observations:
//!
//! ```text
//! head ─► [svc-a: fail ×3] ─► [svc-a: fail ×2] ─► [svc-a: fail ×1] ─► [svc-a: pass ×0] ─► …
//! ```
//!
//! Once the history grows past its cap it is trimmed, keeping the head and never cutting
//! through an open failure run that still fits in the window.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{trace, warn};

use crate::{ServiceState, config::Thresholds};

/// Number of nodes a series may hold before it gets trimmed
pub const TRIM_THRESHOLD: usize = 100;

/// Repeat notices for a service stuck beyond the high alert are logged this often
pub const REPEAT_NOTICE_INTERVAL: usize = 10;

/// One service observation inside a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceObservation {
    pub state: ServiceState,

    /// Consecutive identical non-pass observations, this one included. Always 0 for pass.
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct TimeSeriesNode {
    pub timestamp: DateTime<Utc>,
    pub services: HashMap<String, ServiceObservation>,
}

impl TimeSeriesNode {
    /// Whether every service in this node passed. A node without services counts as passing.
    pub fn all_pass(&self) -> bool {
        self.services.values().all(|obs| obs.state.is_pass())
    }
}

/// How a trim pass changed the series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimOutcome {
    /// Size did not exceed the cap
    Untouched,
    /// Whole history was passing, only the head is left
    CollapsedToHead,
    /// Passing run reached the cap, the newest `cap` nodes are left
    CutAtCap,
    /// Cut at the first node with a non-pass service
    CutAtFailure { retained: usize },
}

#[derive(Debug)]
pub struct TimeSeries {
    /// Front is the head (newest node)
    nodes: VecDeque<TimeSeriesNode>,
    cap: usize,
}

impl Default for TimeSeries {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::with_cap(TRIM_THRESHOLD)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            nodes: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn head(&self) -> Option<&TimeSeriesNode> {
        self.nodes.front()
    }

    /// Nodes from newest to oldest
    pub fn iter(&self) -> impl Iterator<Item = &TimeSeriesNode> {
        self.nodes.iter()
    }

    pub fn needs_trim(&self) -> bool {
        self.nodes.len() > self.cap
    }

    /// Fold one report into the series and return the new head.
    ///
    /// Unrecognized status strings are stored as `fail`.
    pub fn store(
        &mut self,
        timestamp: DateTime<Utc>,
        services: &HashMap<String, String>,
    ) -> &TimeSeriesNode {
        let previous = self.nodes.front();

        let services = services
            .iter()
            .map(|(name, raw)| {
                let state = raw.parse::<ServiceState>().unwrap_or_else(|e| {
                    warn!(service = %name, "{e}, treating as fail");
                    ServiceState::Fail
                });

                let count = match state {
                    ServiceState::Pass => 0,
                    _ => match previous.and_then(|node| node.services.get(name)) {
                        Some(prev) if prev.state == state => prev.count + 1,
                        _ => 1,
                    },
                };

                (name.clone(), ServiceObservation { state, count })
            })
            .collect();

        self.nodes.push_front(TimeSeriesNode {
            timestamp,
            services,
        });

        trace!(size = self.nodes.len(), "stored report");

        &self.nodes[0]
    }

    /// Bound the history once it exceeds the cap.
    ///
    /// Walks back from the head over fully passing nodes:
    /// - everything passes: only the head is kept
    /// - the passing run reaches the cap: the newest `cap` nodes are kept
    /// - otherwise the cut lands on the first node holding a non-pass service,
    ///   extended back to the start of the runs recorded there (bounded by the cap)
    pub fn trim(&mut self) -> TrimOutcome {
        if !self.needs_trim() {
            return TrimOutcome::Untouched;
        }

        let first_failure = self.nodes.iter().position(|node| !node.all_pass());

        let outcome = match first_failure {
            None => {
                self.nodes.truncate(1);
                TrimOutcome::CollapsedToHead
            }
            Some(index) if index >= self.cap => {
                self.nodes.truncate(self.cap);
                TrimOutcome::CutAtCap
            }
            Some(index) => {
                let longest_run = self.nodes[index]
                    .services
                    .values()
                    .map(|obs| obs.count)
                    .max()
                    .unwrap_or(1);
                let retained = (index + longest_run.max(1)).min(self.cap);
                self.nodes.truncate(retained);
                TrimOutcome::CutAtFailure {
                    retained: self.nodes.len(),
                }
            }
        };

        trace!(size = self.nodes.len(), ?outcome, "trimmed series");

        outcome
    }
}

/// Result of checking one service's run against the alert thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEvaluation {
    /// Passing, warning, or failing without any boundary reached
    Quiet,
    /// The run just reached the low boundary
    ReachesLow,
    /// The run just reached the high boundary
    ReachesHigh,
    /// Beyond the high boundary on a repeat-notice tick
    StillFailing,
}

impl ServiceEvaluation {
    /// Edge-triggered: boundaries fire only on exact equality, so each fires once per run.
    pub fn evaluate(observation: ServiceObservation, thresholds: &Thresholds) -> Self {
        if observation.state != ServiceState::Fail {
            return ServiceEvaluation::Quiet;
        }

        let count = observation.count;
        let low = thresholds.failed_to_alerted_low;
        let high = thresholds.high_boundary();

        if count == low {
            ServiceEvaluation::ReachesLow
        } else if count == high {
            ServiceEvaluation::ReachesHigh
        } else if count > high && (count - high) % REPEAT_NOTICE_INTERVAL == 0 {
            ServiceEvaluation::StillFailing
        } else {
            ServiceEvaluation::Quiet
        }
    }
}
