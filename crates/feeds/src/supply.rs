//! DefiLlama stablecoin supply snapshot.
//!
//! Two GETs: the full stablecoin list (for USDC supply and the top-20
//! ranking) and the aggregate chart (for total USD-pegged supply, taken from
//! the most recent point).

use crate::http::{HttpRequest, RetryingClient};
use serde_json::Value;
use stablecoin_core::{PegType, PeggedAsset, ReportError, SupplySnapshot};
use tracing::{debug, info};

pub const DEFILLAMA_STABLECOINS_URL: &str = "https://stablecoins.llama.fi/stablecoins";
pub const DEFILLAMA_CHART_URL: &str = "https://stablecoins.llama.fi/stablecoincharts/all";

/// DefiLlama endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyEndpoints {
    pub stablecoins_url: String,
    pub chart_url: String,
}

impl Default for SupplyEndpoints {
    fn default() -> Self {
        Self {
            stablecoins_url: DEFILLAMA_STABLECOINS_URL.to_string(),
            chart_url: DEFILLAMA_CHART_URL.to_string(),
        }
    }
}

/// Fetches the supply side of the report.
#[derive(Clone)]
pub struct SupplySnapshotClient {
    client: RetryingClient,
    endpoints: SupplyEndpoints,
}

impl SupplySnapshotClient {
    pub fn new(client: RetryingClient, endpoints: SupplyEndpoints) -> Self {
        Self { client, endpoints }
    }

    /// Fetch the stablecoin list.
    pub async fn fetch_pegged_assets(&self) -> Result<Vec<PeggedAsset>, ReportError> {
        let request = HttpRequest::get("defillama.stablecoins", &self.endpoints.stablecoins_url);
        let payload = self.client.request_json(&request).await?;
        parse_pegged_assets(&payload)
    }

    /// Fetch the aggregate supply chart. Always non-empty on success.
    pub async fn fetch_total_chart(&self) -> Result<Vec<Value>, ReportError> {
        let request = HttpRequest::get("defillama.chart", &self.endpoints.chart_url);
        match self.client.request_json(&request).await? {
            Value::Array(points) if !points.is_empty() => Ok(points),
            _ => Err(ReportError::data_unavailable(
                "Unexpected DefiLlama chart response structure",
            )),
        }
    }

    /// Fetch both endpoints and build the snapshot.
    pub async fn fetch_snapshot(&self) -> Result<SupplySnapshot, ReportError> {
        let assets = self.fetch_pegged_assets().await?;
        debug!(count = assets.len(), "Fetched DefiLlama stablecoin list");

        let chart = self.fetch_total_chart().await?;
        let total_supply_usd = total_supply_from_chart(&chart)?;
        let snapshot = SupplySnapshot::from_assets(total_supply_usd, &assets)?;

        info!(
            total_supply_usd = snapshot.total_supply_usd,
            usdc_supply_usd = snapshot.usdc_supply_usd,
            top_symbols = snapshot.top_symbols.len(),
            "Supply snapshot ready"
        );
        Ok(snapshot)
    }
}

/// Parse `peggedAssets` from the stablecoin list response.
///
/// Entries that are not objects are ignored. Circulating supply is read from
/// `circulating.peggedUSD` (or `circulating` itself when it is a bare value);
/// anything unparseable counts as zero.
pub fn parse_pegged_assets(payload: &Value) -> Result<Vec<PeggedAsset>, ReportError> {
    let entries = payload
        .get("peggedAssets")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ReportError::data_unavailable("Unexpected DefiLlama stablecoins response structure")
        })?;

    Ok(entries
        .iter()
        .filter_map(Value::as_object)
        .map(|entry| {
            let symbol = match entry.get("symbol") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            let peg_type = entry
                .get("pegType")
                .and_then(Value::as_str)
                .map(PegType::from_provider)
                .unwrap_or_else(|| PegType::from_provider(""));
            let circulating = match entry.get("circulating") {
                Some(Value::Object(by_peg)) => by_peg.get("peggedUSD"),
                other => other,
            };
            PeggedAsset::new(&symbol, peg_type, numeric(circulating).unwrap_or(0.0))
        })
        .collect())
}

/// Total USD-pegged supply from the most recent chart point.
pub fn total_supply_from_chart(points: &[Value]) -> Result<f64, ReportError> {
    let latest = points.last().ok_or_else(|| {
        ReportError::data_unavailable("Unexpected DefiLlama chart response structure")
    })?;
    let totals = latest
        .get("totalCirculating")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            ReportError::data_unavailable("DefiLlama chart is missing totalCirculating data")
        })?;

    let total = match totals.get("peggedUSD") {
        None | Some(Value::Null) => {
            return Err(ReportError::data_unavailable(
                "DefiLlama chart is missing peggedUSD total supply",
            ))
        }
        value => numeric(value).ok_or_else(|| {
            ReportError::data_unavailable("DefiLlama chart has a non-numeric peggedUSD total supply")
        })?,
    };

    if !(total > 0.0) {
        return Err(ReportError::data_unavailable(
            "DefiLlama total supply is not positive",
        ));
    }
    Ok(total)
}

/// A JSON number, or a string holding one.
fn numeric(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
