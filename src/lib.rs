pub mod actors;
pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod discord;
pub mod timeseries;
pub mod util;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Escalation level of a probe.
///
/// The ordering is meaningful: `Normal < Degraded < Failed < AlertedLow < AlertedHigh`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ProbeStatus {
    #[default]
    Normal,
    Degraded,
    Failed,
    AlertedLow,
    AlertedHigh,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Normal => "normal",
            ProbeStatus::Degraded => "degraded",
            ProbeStatus::Failed => "failed",
            ProbeStatus::AlertedLow => "alertedLow",
            ProbeStatus::AlertedHigh => "alertedHigh",
        }
    }

    /// The next rung on the ladder. `AlertedHigh` is terminal.
    pub fn next(self) -> ProbeStatus {
        match self {
            ProbeStatus::Normal => ProbeStatus::Degraded,
            ProbeStatus::Degraded => ProbeStatus::Failed,
            ProbeStatus::Failed => ProbeStatus::AlertedLow,
            ProbeStatus::AlertedLow | ProbeStatus::AlertedHigh => ProbeStatus::AlertedHigh,
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single service as reported by an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Pass,
    Warn,
    Fail,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Pass => "pass",
            ServiceState::Warn => "warn",
            ServiceState::Fail => "fail",
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, ServiceState::Pass)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an agent reports a status outside of `pass|warn|fail`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service status '{0}'")]
pub struct UnknownServiceState(pub String);

impl FromStr for ServiceState {
    type Err = UnknownServiceState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pass" => Ok(ServiceState::Pass),
            "warn" => Ok(ServiceState::Warn),
            "fail" => Ok(ServiceState::Fail),
            other => Err(UnknownServiceState(other.to_string())),
        }
    }
}
