//! Backend routing advice from recent call outcomes

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Outcomes kept per backend
pub(super) const CALL_WINDOW: usize = 50;

/// Fewer samples than this and a backend's numbers are not trusted
const MIN_SAMPLES: usize = 5;

/// Success-rate gap (percentage points) that outweighs latency
const SUCCESS_RATE_MARGIN: f64 = 10.0;

/// Relative latency gap needed to prefer the faster backend
const LATENCY_MARGIN: f64 = 0.2;

/// The two ways a lookup can be served: through this service's cached API,
/// or by calling the third-party provider directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Internal,
    External,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Internal => write!(f, "internal"),
            Backend::External => write!(f, "external"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(super) struct CallOutcome {
    pub success: bool,
    pub latency: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStats {
    pub calls: usize,
    /// Percent of calls that succeeded
    pub success_rate: f64,
    pub average_latency_ms: f64,
}

impl BackendStats {
    pub(super) fn from_calls<'a>(calls: impl Iterator<Item = &'a CallOutcome>) -> Self {
        let mut count = 0usize;
        let mut ok = 0usize;
        let mut latency_ms = 0.0;
        for call in calls {
            count += 1;
            if call.success {
                ok += 1;
            }
            latency_ms += call.latency.as_micros() as f64 / 1000.0;
        }
        if count == 0 {
            return Self::default();
        }
        Self {
            calls: count,
            success_rate: ok as f64 / count as f64 * 100.0,
            average_latency_ms: latency_ms / count as f64,
        }
    }

    fn trusted(&self) -> bool {
        self.calls >= MIN_SAMPLES
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingAdvice {
    pub preferred: Backend,
    pub reason: String,
    pub internal: BackendStats,
    pub external: BackendStats,
}

impl RoutingAdvice {
    pub fn recommend(internal: BackendStats, external: BackendStats) -> Self {
        let (preferred, reason) = match (internal.trusted(), external.trusted()) {
            (false, false) => (
                Backend::Internal,
                "not enough samples yet, defaulting to internal".to_string(),
            ),
            (true, false) => (
                Backend::Internal,
                format!("only internal has data ({:.0}% success)", internal.success_rate),
            ),
            (false, true) => (
                Backend::External,
                format!("only external has data ({:.0}% success)", external.success_rate),
            ),
            (true, true) => Self::compare(&internal, &external),
        };

        Self {
            preferred,
            reason,
            internal,
            external,
        }
    }

    fn compare(internal: &BackendStats, external: &BackendStats) -> (Backend, String) {
        let gap = internal.success_rate - external.success_rate;
        if gap.abs() >= SUCCESS_RATE_MARGIN {
            let preferred = if gap > 0.0 { Backend::Internal } else { Backend::External };
            return (
                preferred,
                format!(
                    "success rate {:.0}% vs {:.0}%",
                    internal.success_rate, external.success_rate
                ),
            );
        }

        let faster_external =
            external.average_latency_ms < internal.average_latency_ms * (1.0 - LATENCY_MARGIN);
        if faster_external {
            (
                Backend::External,
                format!(
                    "external is faster ({:.0}ms vs {:.0}ms) at similar reliability",
                    external.average_latency_ms, internal.average_latency_ms
                ),
            )
        } else {
            (
                Backend::Internal,
                format!(
                    "comparable reliability, internal latency {:.0}ms",
                    internal.average_latency_ms
                ),
            )
        }
    }
}

impl fmt::Display for RoutingAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prefer {} backend: {}", self.preferred, self.reason)
    }
}
