//! Message types for actor communication
//!
//! 1. **Ingress**: [`Report`] values flow from the HTTP layer into the registry
//! 2. **Commands**: request/response messages sent to one actor via mpsc + oneshot
//! 3. **Snapshots**: [`DashboardSnapshot`] values broadcast to dashboard subscribers

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::ProbeStatus;

/// One status report pushed by an agent
#[derive(Debug, Clone)]
pub struct Report {
    /// Machine identity the report belongs to
    pub machine: String,

    /// Set for delete-control messages, which carry no services
    pub delete: bool,

    /// Service name → raw reported status (`pass`, `warn`, `fail`, or anything else)
    pub services: HashMap<String, String>,

    /// When the report was received
    pub timestamp: DateTime<Utc>,
}

impl Report {
    pub fn new(machine: impl Into<String>, services: HashMap<String, String>) -> Self {
        Self {
            machine: machine.into(),
            delete: false,
            services,
            timestamp: Utc::now(),
        }
    }

    /// Delete-control message for a machine
    pub fn delete(machine: impl Into<String>) -> Self {
        Self {
            machine: machine.into(),
            delete: true,
            services: HashMap::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Messages accepted by a probe worker's mailbox
#[derive(Debug)]
pub enum ProbeCommand {
    /// Fold a report into the probe's state
    Report(Report),

    /// Get the current probe state
    GetState {
        respond_to: oneshot::Sender<ProbeState>,
    },
}

/// Detailed state of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeState {
    pub name: String,
    pub status: ProbeStatus,

    /// Consecutive inactivity ticks counted in the current status
    pub counter: usize,

    pub last_normal: DateTime<Utc>,

    /// Number of nodes retained in the service history
    pub series_size: usize,
}

/// Commands that can be sent to the registry
#[derive(Debug)]
pub enum RegistryCommand {
    /// Build a snapshot of every registered probe
    Snapshot {
        respond_to: oneshot::Sender<DashboardSnapshot>,
    },

    /// Get the detailed state of one probe (`None` if unknown)
    ProbeState {
        machine: String,
        respond_to: oneshot::Sender<Option<ProbeState>>,
    },

    /// Stop every probe worker, then the registry itself
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Name and status of one probe, as shown on the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSummary {
    pub name: String,
    pub status: ProbeStatus,
}

/// Immutable copy of every live probe, in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub probes: Vec<ProbeSummary>,
}

impl DashboardSnapshot {
    pub fn get(&self, name: &str) -> Option<&ProbeSummary> {
        self.probes.iter().find(|probe| probe.name == name)
    }
}
