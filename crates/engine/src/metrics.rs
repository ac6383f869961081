//! Derivation of the reportable metrics.
//!
//! Metrics are recorded into a [`MetricsSnapshot`] as soon as their inputs
//! are known, so a later failure still leaves the earlier values available
//! for the failure report.

use crate::reconcile::ShareBreakdown;
use stablecoin_core::{Metric, MetricsSnapshot, SupplySnapshot};

/// Ratio that is unavailable instead of infinite or NaN when the denominator
/// is not positive.
pub fn safe_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 && numerator.is_finite() {
        Some(numerator / denominator)
    } else {
        None
    }
}

/// Record total supply, USDC supply and USDC supply share.
pub fn record_supply_metrics(metrics: &mut MetricsSnapshot, supply: &SupplySnapshot) {
    metrics.set(Metric::TotalSupplyUsd, Some(supply.total_supply_usd));
    metrics.set(Metric::UsdcSupplyUsd, Some(supply.usdc_supply_usd));
    metrics.set(
        Metric::UsdcSupplyShare,
        safe_ratio(supply.usdc_supply_usd, supply.total_supply_usd),
    );
}

/// Record the 7-day transfer volume share (possibly unavailable).
pub fn record_volume_share(metrics: &mut MetricsSnapshot, breakdown: &ShareBreakdown) {
    metrics.set(Metric::UsdcTransferVolumeShare7d, breakdown.share);
}
