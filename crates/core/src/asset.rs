//! Pegged asset records and the supply-side snapshot derived from them.

use crate::error::ReportError;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Number of stablecoins ranked by supply that form the volume denominator.
pub const TOP_SYMBOL_LIMIT: usize = 20;

/// Normalized symbol of the tracked stablecoin.
pub const USDC_SYMBOL: &str = "usdc";

/// Provider identifier for USD-pegged assets.
const PEGGED_USD: &str = "peggedUSD";

/// The currency an asset claims to track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PegType {
    PeggedUsd,
    Other(CompactString),
}

impl PegType {
    /// Parse the provider's peg type field (e.g. "peggedUSD", "peggedEUR").
    pub fn from_provider(raw: &str) -> Self {
        if raw == PEGGED_USD {
            PegType::PeggedUsd
        } else {
            PegType::Other(CompactString::new(raw))
        }
    }

    #[inline]
    pub fn is_usd(&self) -> bool {
        matches!(self, PegType::PeggedUsd)
    }
}

/// Normalize a symbol for cross-provider matching: trimmed and lowercase.
pub fn normalize_symbol(raw: &str) -> CompactString {
    CompactString::from(raw.trim().to_lowercase())
}

/// A stablecoin as reported by the supply provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeggedAsset {
    /// Raw symbol as reported (e.g., "USDC", " usdt ")
    pub symbol: CompactString,
    pub peg_type: PegType,
    /// Circulating supply in USD
    pub circulating_usd: f64,
}

impl PeggedAsset {
    pub fn new(symbol: &str, peg_type: PegType, circulating_usd: f64) -> Self {
        Self {
            symbol: CompactString::new(symbol),
            peg_type,
            circulating_usd,
        }
    }

    /// Shorthand for a USD-pegged asset.
    pub fn usd(symbol: &str, circulating_usd: f64) -> Self {
        Self::new(symbol, PegType::PeggedUsd, circulating_usd)
    }

    pub fn normalized_symbol(&self) -> CompactString {
        normalize_symbol(&self.symbol)
    }
}

/// Supply-side figures for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplySnapshot {
    /// Total USD-pegged supply, always positive
    pub total_supply_usd: f64,
    pub usdc_supply_usd: f64,
    /// Normalized symbols of the largest stablecoins, highest supply first
    pub top_symbols: Vec<CompactString>,
}

impl SupplySnapshot {
    /// Build a snapshot, rejecting a non-positive total as corrupt data.
    pub fn new(
        total_supply_usd: f64,
        usdc_supply_usd: f64,
        top_symbols: Vec<CompactString>,
    ) -> Result<Self, ReportError> {
        if !(total_supply_usd > 0.0) {
            return Err(ReportError::data_unavailable(
                "DefiLlama total supply is not positive",
            ));
        }
        Ok(Self {
            total_supply_usd,
            usdc_supply_usd,
            top_symbols,
        })
    }

    /// Build a snapshot from the chart total and the full asset list.
    pub fn from_assets(total_supply_usd: f64, assets: &[PeggedAsset]) -> Result<Self, ReportError> {
        let selection = select_top_symbols(assets)?;
        Self::new(total_supply_usd, selection.usdc_supply_usd, selection.top_symbols)
    }

    pub fn usdc_supply_share(&self) -> f64 {
        self.usdc_supply_usd / self.total_supply_usd
    }
}

/// Result of ranking the asset list.
#[derive(Debug, Clone, PartialEq)]
pub struct TopSymbolSelection {
    pub top_symbols: Vec<CompactString>,
    pub usdc_supply_usd: f64,
}

/// Rank USD-pegged assets by circulating supply.
///
/// Symbols are trimmed and lowercased, empty ones dropped, the list is sorted
/// by circulating supply descending (stable for ties) and deduplicated keeping
/// the largest record, then cut to [`TOP_SYMBOL_LIMIT`]. USDC supply is the
/// maximum over every record whose symbol is USDC, since the provider can list
/// several records for the same coin.
pub fn select_top_symbols(assets: &[PeggedAsset]) -> Result<TopSymbolSelection, ReportError> {
    let mut usd_assets: Vec<(CompactString, f64)> = Vec::new();
    let mut usdc_candidates: Vec<f64> = Vec::new();

    for asset in assets.iter().filter(|a| a.peg_type.is_usd()) {
        let symbol = asset.symbol.trim();
        if symbol.is_empty() {
            continue;
        }
        if symbol.eq_ignore_ascii_case(USDC_SYMBOL) {
            usdc_candidates.push(asset.circulating_usd);
        }
        usd_assets.push((normalize_symbol(symbol), asset.circulating_usd));
    }

    if usd_assets.is_empty() {
        return Err(ReportError::data_unavailable(
            "No peggedUSD assets found in DefiLlama response",
        ));
    }
    let usdc_supply_usd = usdc_candidates
        .into_iter()
        .reduce(f64::max)
        .ok_or_else(|| {
            ReportError::data_unavailable("USDC supply not found in DefiLlama stablecoins list")
        })?;

    usd_assets.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut seen: HashSet<CompactString> = HashSet::new();
    let top_symbols = usd_assets
        .into_iter()
        .filter_map(|(symbol, _)| seen.insert(symbol.clone()).then_some(symbol))
        .take(TOP_SYMBOL_LIMIT)
        .collect();

    Ok(TopSymbolSelection {
        top_symbols,
        usdc_supply_usd,
    })
}
