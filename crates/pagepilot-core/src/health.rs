//! Component health primitives.

use serde::Serialize;

/// Coarse health of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// True unless the component is unhealthy.
    pub fn is_serving(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }
}

/// Health report for one named component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl ComponentHealth {
    /// A healthy report with no detail.
    pub fn healthy(name: impl Into<String>) -> Self {
        ComponentHealth {
            name: name.into(),
            status: HealthStatus::Healthy,
            latency_ms: None,
            error: None,
            detail: serde_json::Value::Null,
        }
    }

    /// An unhealthy report carrying the failure reason.
    pub fn unhealthy(name: impl Into<String>, error: impl Into<String>) -> Self {
        ComponentHealth {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            error: Some(error.into()),
            detail: serde_json::Value::Null,
        }
    }

    /// Attaches measured latency.
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Attaches structured detail.
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_still_serves() {
        assert!(HealthStatus::Healthy.is_serving());
        assert!(HealthStatus::Degraded.is_serving());
        assert!(!HealthStatus::Unhealthy.is_serving());
    }
}
