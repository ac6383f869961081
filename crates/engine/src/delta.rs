//! Week-over-week change between the current run and the previous entry.

use stablecoin_core::{Metric, MetricKind, MetricsSnapshot, UNAVAILABLE};
use std::fmt;

/// Change of one metric against the previous run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delta {
    /// Either side is missing, or a relative change has a zero base
    Unavailable,
    /// Relative change as a ratio (0.5 = +50%)
    Relative(f64),
    /// Absolute change of a share, in percentage points
    PercentagePoints(f64),
}

impl Delta {
    /// Compute the change for a metric of the given kind.
    ///
    /// Currency metrics use the relative change; shares are already ratios,
    /// so their change is the absolute difference in percentage points.
    pub fn between(kind: MetricKind, current: Option<f64>, previous: Option<f64>) -> Self {
        let (Some(current), Some(previous)) = (current, previous) else {
            return Delta::Unavailable;
        };
        match kind {
            MetricKind::Share => Delta::PercentagePoints((current - previous) * 100.0),
            MetricKind::Currency => {
                if previous == 0.0 {
                    Delta::Unavailable
                } else {
                    Delta::Relative((current - previous) / previous)
                }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Delta::Unavailable)
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delta::Unavailable => f.write_str(UNAVAILABLE),
            Delta::Relative(ratio) => write!(f, "{:+.2}%", ratio * 100.0),
            Delta::PercentagePoints(pp) => write!(f, "{:+.2}pp", pp),
        }
    }
}

/// Deltas for all four metrics, in report order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaSet([(Metric, Delta); 4]);

impl DeltaSet {
    /// All deltas unavailable, as for a first run with no history.
    pub fn unavailable() -> Self {
        Self(Metric::ALL.map(|m| (m, Delta::Unavailable)))
    }

    pub fn get(&self, metric: Metric) -> Delta {
        self.0
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, d)| *d)
            .unwrap_or(Delta::Unavailable)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, Delta)> + '_ {
        self.0.iter().copied()
    }
}

/// Compute deltas of `current` against the previous run's metrics, if any.
pub fn compute_deltas(current: &MetricsSnapshot, previous: Option<&MetricsSnapshot>) -> DeltaSet {
    DeltaSet(Metric::ALL.map(|metric| {
        let delta = Delta::between(
            metric.kind(),
            current.get(metric),
            previous.and_then(|p| p.get(metric)),
        );
        (metric, delta)
    }))
}
