//! Request and response bodies

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::actors::messages::ProbeSummary;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

/// Body of `POST /probe/{machine}/report`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    /// Service name → reported status
    #[serde(default)]
    pub services: HashMap<String, String>,

    /// `"delete"` turns the report into a delete request
    #[serde(default)]
    pub machine_status: Option<String>,
}

impl ReportPayload {
    pub fn is_delete(&self) -> bool {
        self.machine_status
            .as_deref()
            .is_some_and(|status| status.trim().eq_ignore_ascii_case("delete"))
    }
}

/// Response of `GET /probes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbesResponse {
    pub probes: Vec<ProbeSummary>,
    pub total: usize,
}
