//! Provider health tracking.
//!
//! Network probes are noisy: a single failed request says very little
//! about a provider. The tracker therefore runs a small hysteresis state
//! machine per provider. A provider only becomes unhealthy after
//! `unhealthy_threshold` consecutive failures, and only recovers after
//! `recovery_threshold` consecutive successes, so a flaky probe can never
//! flip the status on its own.
//!
//! The probe itself is injected behind [`probe::NetworkProbe`]; the
//! tracker owns the state machine and the batching, nothing else.

pub(crate) mod probe;
pub(crate) mod tracker;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub(crate) enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

/// Aggregate verdict across all tracked providers.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub(crate) enum OverallStatus {
    #[default]
    Unknown,
    Healthy,
    /// At least one non-critical provider is unhealthy.
    Degraded,
    /// At least one critical provider is unhealthy.
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ProviderHealth {
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    /// Critical providers pull the aggregate status to unhealthy on their
    /// own; non-critical ones only degrade it.
    pub critical: bool,
}

impl ProviderHealth {
    pub(crate) fn new(critical: bool) -> ProviderHealth {
        ProviderHealth {
            status: HealthStatus::Unknown,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_check: None,
            last_success: None,
            last_failure: None,
            critical,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct HealthSummary {
    pub total_providers: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub overall_status: OverallStatus,
}

#[derive(Debug, Clone)]
pub(crate) struct HealthThresholds {
    pub unhealthy_threshold: u32,
    pub recovery_threshold: u32,
    pub max_concurrent_checks: usize,
    pub probe_timeout: Duration,
    pub enable_detailed_checks: bool,
}

impl Default for HealthThresholds {
    fn default() -> HealthThresholds {
        HealthThresholds {
            unhealthy_threshold: 3,
            recovery_threshold: 2,
            max_concurrent_checks: 5,
            probe_timeout: Duration::from_secs(30),
            enable_detailed_checks: false,
        }
    }
}
