//! The four reportable metrics and the snapshot that holds them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a metric is formatted and how its week-over-week change is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// USD amount; change is relative
    Currency,
    /// Ratio in [0, 1]; change is in percentage points
    Share,
}

/// Reportable metric identifiers, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "total_supply_usd")]
    TotalSupplyUsd,
    #[serde(rename = "usdc_supply_usd")]
    UsdcSupplyUsd,
    #[serde(rename = "usdc_supply_share")]
    UsdcSupplyShare,
    #[serde(rename = "usdc_transfer_volume_share_7d")]
    UsdcTransferVolumeShare7d,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::TotalSupplyUsd,
        Metric::UsdcSupplyUsd,
        Metric::UsdcSupplyShare,
        Metric::UsdcTransferVolumeShare7d,
    ];

    /// Stable key used in persisted history.
    pub fn name(self) -> &'static str {
        match self {
            Metric::TotalSupplyUsd => "total_supply_usd",
            Metric::UsdcSupplyUsd => "usdc_supply_usd",
            Metric::UsdcSupplyShare => "usdc_supply_share",
            Metric::UsdcTransferVolumeShare7d => "usdc_transfer_volume_share_7d",
        }
    }

    /// Display label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            Metric::TotalSupplyUsd => "全市场稳定币总供给",
            Metric::UsdcSupplyUsd => "USDC 供给",
            Metric::UsdcSupplyShare => "USDC 供给份额",
            Metric::UsdcTransferVolumeShare7d => "USDC 过去 7 天链上转账量份额",
        }
    }

    pub fn kind(self) -> MetricKind {
        match self {
            Metric::TotalSupplyUsd | Metric::UsdcSupplyUsd => MetricKind::Currency,
            Metric::UsdcSupplyShare | Metric::UsdcTransferVolumeShare7d => MetricKind::Share,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values of the four metrics for one run. `None` means unavailable.
///
/// Serializes as an object keyed by metric name, with `null` for
/// unavailable values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(default)]
    pub total_supply_usd: Option<f64>,
    #[serde(default)]
    pub usdc_supply_usd: Option<f64>,
    #[serde(default)]
    pub usdc_supply_share: Option<f64>,
    #[serde(default)]
    pub usdc_transfer_volume_share_7d: Option<f64>,
}

impl MetricsSnapshot {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::TotalSupplyUsd => self.total_supply_usd,
            Metric::UsdcSupplyUsd => self.usdc_supply_usd,
            Metric::UsdcSupplyShare => self.usdc_supply_share,
            Metric::UsdcTransferVolumeShare7d => self.usdc_transfer_volume_share_7d,
        }
    }

    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        let slot = match metric {
            Metric::TotalSupplyUsd => &mut self.total_supply_usd,
            Metric::UsdcSupplyUsd => &mut self.usdc_supply_usd,
            Metric::UsdcSupplyShare => &mut self.usdc_supply_share,
            Metric::UsdcTransferVolumeShare7d => &mut self.usdc_transfer_volume_share_7d,
        };
        *slot = value;
    }

    /// Iterate metrics in report order.
    pub fn iter(&self) -> impl Iterator<Item = (Metric, Option<f64>)> + '_ {
        Metric::ALL.into_iter().map(move |m| (m, self.get(m)))
    }

    /// True when every metric has a value.
    pub fn is_complete(&self) -> bool {
        self.iter().all(|(_, v)| v.is_some())
    }
}
