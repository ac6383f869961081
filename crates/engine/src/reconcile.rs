//! Symbol reconciliation between the supply and volume providers.
//!
//! Query rows are matched to supply symbols by normalized symbol. Column
//! names in the query output are not fixed, so each logical field is looked
//! up through an ordered list of accepted synonyms.

use compact_str::CompactString;
use serde_json::Value;
use stablecoin_core::{normalize_symbol, ReportError, VolumeRow, USDC_SYMBOL};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const DEFAULT_SYMBOL_COLUMNS: [&str; 5] = ["symbol", "token_symbol", "asset", "stablecoin", "project"];

const DEFAULT_VOLUME_COLUMNS: [&str; 6] = [
    "volume_7d_usd",
    "volume_usd_7d",
    "transfer_volume_usd",
    "volume_usd",
    "amount_usd",
    "volume",
];

/// Ordered column-name synonyms for the symbol and volume fields.
///
/// The first synonym present in a row wins. Names are matched
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSynonyms {
    symbol: Vec<CompactString>,
    volume: Vec<CompactString>,
}

impl Default for ColumnSynonyms {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_SYMBOL_COLUMNS.iter().map(|c| CompactString::new(c)).collect(),
            volume: DEFAULT_VOLUME_COLUMNS.iter().map(|c| CompactString::new(c)).collect(),
        }
    }
}

impl ColumnSynonyms {
    pub fn new<S, V>(symbol: S, volume: V) -> Self
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
        V: IntoIterator,
        V::Item: AsRef<str>,
    {
        Self {
            symbol: symbol.into_iter().map(|c| normalize_symbol(c.as_ref())).collect(),
            volume: volume.into_iter().map(|c| normalize_symbol(c.as_ref())).collect(),
        }
    }

    /// Append a symbol column synonym with the lowest priority.
    pub fn with_symbol_column(mut self, column: &str) -> Self {
        let column = normalize_symbol(column);
        if !column.is_empty() && !self.symbol.contains(&column) {
            self.symbol.push(column);
        }
        self
    }

    /// Append a volume column synonym with the lowest priority.
    pub fn with_volume_column(mut self, column: &str) -> Self {
        let column = normalize_symbol(column);
        if !column.is_empty() && !self.volume.contains(&column) {
            self.volume.push(column);
        }
        self
    }

    pub fn symbol_columns(&self) -> &[CompactString] {
        &self.symbol
    }

    pub fn volume_columns(&self) -> &[CompactString] {
        &self.volume
    }
}

/// Returns the value of the first candidate column present in the row.
/// A present-but-null column still wins over later candidates.
fn lookup<'a>(lowered: &HashMap<String, &'a Value>, candidates: &[CompactString]) -> Option<&'a Value> {
    candidates
        .iter()
        .find_map(|c| lowered.get(c.as_str()).copied())
}

fn symbol_from_value(value: &Value) -> Option<CompactString> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    let symbol = normalize_symbol(&raw);
    (!symbol.is_empty()).then_some(symbol)
}

fn volume_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Summed transfer volume per normalized symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolVolumeTotals(BTreeMap<CompactString, f64>);

impl SymbolVolumeTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add volume for a symbol. Accumulation is additive and order-independent.
    pub fn add(&mut self, symbol: CompactString, volume: f64) {
        *self.0.entry(symbol).or_insert(0.0) += volume;
    }

    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.0.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(CompactString, f64)> for SymbolVolumeTotals {
    fn from_iter<I: IntoIterator<Item = (CompactString, f64)>>(iter: I) -> Self {
        let mut totals = Self::new();
        for (symbol, volume) in iter {
            totals.add(symbol, volume);
        }
        totals
    }
}

/// Extract one (symbol, volume) pair from a row, if usable.
pub fn extract_row(row: &VolumeRow, columns: &ColumnSynonyms) -> Option<(CompactString, f64)> {
    let lowered: HashMap<String, &Value> = row
        .iter()
        .map(|(key, value)| (key.to_lowercase(), value))
        .collect();

    let symbol = lookup(&lowered, columns.symbol_columns()).and_then(symbol_from_value)?;
    let volume = lookup(&lowered, columns.volume_columns()).and_then(volume_from_value)?;
    Some((symbol, volume))
}

/// Sum volumes per symbol across all rows.
///
/// Rows without a usable symbol or volume are skipped. If no row is usable
/// the query schema is considered wrong and the run cannot continue.
pub fn extract_symbol_totals(
    rows: &[VolumeRow],
    columns: &ColumnSynonyms,
) -> Result<SymbolVolumeTotals, ReportError> {
    let mut totals = SymbolVolumeTotals::new();
    let mut skipped = 0usize;

    for row in rows {
        match extract_row(row, columns) {
            Some((symbol, volume)) => totals.add(symbol, volume),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(skipped, total = rows.len(), "Skipped query rows without usable symbol/volume");
    }

    if totals.is_empty() {
        return Err(ReportError::data_unavailable(
            "Dune query rows did not contain usable symbol and volume columns. \
             Expected columns like symbol + volume_7d_usd.",
        ));
    }
    Ok(totals)
}

/// Volume share of USDC within the top stablecoins by supply.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareBreakdown {
    /// USDC volume over the summed volume of present symbols; `None` when
    /// USDC itself has no volume rows
    pub share: Option<f64>,
    /// Top symbols with no volume rows, in supply rank order
    pub missing_symbols: Vec<CompactString>,
    /// Volume of each top symbol that was found
    pub present: BTreeMap<CompactString, f64>,
}

/// Compute USDC's transfer-volume share among `top_symbols`.
///
/// Only symbols in the supply top set count toward the denominator. Missing
/// symbols are reported but tolerated; a present-but-zero denominator is not.
pub fn compute_share(
    totals: &SymbolVolumeTotals,
    top_symbols: &[CompactString],
) -> Result<ShareBreakdown, ReportError> {
    let mut missing_symbols = Vec::new();
    let mut present = BTreeMap::new();

    for symbol in top_symbols {
        match totals.get(symbol) {
            Some(volume) => {
                present.insert(symbol.clone(), volume);
            }
            None => missing_symbols.push(symbol.clone()),
        }
    }

    let share = match present.get(USDC_SYMBOL) {
        None => None,
        Some(usdc_volume) => {
            let denominator: f64 = present.values().sum();
            if !(denominator > 0.0) {
                return Err(ReportError::data_unavailable("Dune denominator volume is zero"));
            }
            Some(usdc_volume / denominator)
        }
    };

    Ok(ShareBreakdown {
        share,
        missing_symbols,
        present,
    })
}
