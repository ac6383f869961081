//! Application configuration.
//!
//! Built once from the environment (after `.env` is loaded) and the command
//! line, then passed by reference. Credentials are optional at load time and
//! required when first used, so a missing Dune key still lets the failure
//! report reach the webhook.

use stablecoin_alerts::DEFAULT_HISTORY_PATH;
use stablecoin_core::ReportError;
use stablecoin_engine::ColumnSynonyms;
use stablecoin_feeds::{PollSettings, SupplyEndpoints, DUNE_API_BASE_URL, REQUEST_TIMEOUT};
use std::path::PathBuf;
use std::time::Duration;

pub const DUNE_API_KEY: &str = "DUNE_API_KEY";
pub const DUNE_QUERY_ID: &str = "DUNE_QUERY_ID";
pub const FEISHU_WEBHOOK_URL: &str = "FEISHU_WEBHOOK_URL";
pub const FORCE_RUN: &str = "FORCE_RUN";
/// Extra comma-separated column synonyms, tried after the built-in ones.
pub const DUNE_SYMBOL_COLUMNS: &str = "DUNE_SYMBOL_COLUMNS";
pub const DUNE_VOLUME_COLUMNS: &str = "DUNE_VOLUME_COLUMNS";

const REDACTED: &str = "***";

/// Provider base URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub supply: SupplyEndpoints,
    pub dune_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            supply: SupplyEndpoints::default(),
            dune_base_url: DUNE_API_BASE_URL.to_string(),
        }
    }
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    dune_api_key: Option<String>,
    dune_query_id: Option<String>,
    webhook_url: Option<String>,
    /// Skip the Monday 07:00 schedule gate.
    pub force_run: bool,
    pub history_path: PathBuf,
    pub endpoints: Endpoints,
    pub poll: PollSettings,
    pub request_timeout: Duration,
    pub columns: ColumnSynonyms,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| REDACTED);
        f.debug_struct("AppConfig")
            .field("dune_api_key", &mask(&self.dune_api_key))
            .field("dune_query_id", &self.dune_query_id)
            .field("webhook_url", &mask(&self.webhook_url))
            .field("force_run", &self.force_run)
            .field("history_path", &self.history_path)
            .field("endpoints", &self.endpoints)
            .field("poll", &self.poll)
            .field("request_timeout", &self.request_timeout)
            .field("columns", &self.columns)
            .finish()
    }
}

/// Trimmed value, `None` when absent or blank.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn column_list(raw: Option<String>) -> Vec<String> {
    raw.map(|list| {
        list.split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

impl AppConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let columns = column_list(lookup(DUNE_SYMBOL_COLUMNS))
            .iter()
            .fold(ColumnSynonyms::default(), |c, col| c.with_symbol_column(col));
        let columns = column_list(lookup(DUNE_VOLUME_COLUMNS))
            .iter()
            .fold(columns, |c, col| c.with_volume_column(col));

        Self {
            dune_api_key: non_blank(lookup(DUNE_API_KEY)),
            dune_query_id: non_blank(lookup(DUNE_QUERY_ID)),
            webhook_url: non_blank(lookup(FEISHU_WEBHOOK_URL)),
            force_run: non_blank(lookup(FORCE_RUN)).as_deref() == Some("1"),
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
            endpoints: Endpoints::default(),
            poll: PollSettings::default(),
            request_timeout: REQUEST_TIMEOUT,
            columns,
        }
    }

    /// Apply command-line overrides. `--force` can only turn forcing on.
    pub fn with_overrides(mut self, force: bool, history_path: Option<PathBuf>) -> Self {
        self.force_run |= force;
        if let Some(path) = history_path {
            self.history_path = path;
        }
        self
    }

    pub fn require_api_key(&self) -> Result<&str, ReportError> {
        self.dune_api_key
            .as_deref()
            .ok_or_else(|| ReportError::missing_env(DUNE_API_KEY))
    }

    pub fn require_query_id(&self) -> Result<u64, ReportError> {
        let raw = self
            .dune_query_id
            .as_deref()
            .ok_or_else(|| ReportError::missing_env(DUNE_QUERY_ID))?;
        raw.parse().map_err(|_| {
            ReportError::Config(format!("{} must be an integer, got {:?}", DUNE_QUERY_ID, raw))
        })
    }

    /// The webhook URL, which must be an absolute http(s) URL.
    pub fn require_webhook_url(&self) -> Result<&str, ReportError> {
        let raw = self
            .webhook_url
            .as_deref()
            .ok_or_else(|| ReportError::missing_env(FEISHU_WEBHOOK_URL))?;
        match url::Url::parse(raw) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(raw),
            _ => Err(ReportError::Config(format!(
                "{} is not a valid http(s) URL",
                FEISHU_WEBHOOK_URL
            ))),
        }
    }

    /// The webhook URL if one is configured and valid, for failure reports.
    pub fn webhook_url(&self) -> Option<&str> {
        self.require_webhook_url().ok()
    }

    /// Replace every configured secret in `text` with `***`.
    pub fn redact(&self, text: &str) -> String {
        [&self.dune_api_key, &self.webhook_url]
            .into_iter()
            .flatten()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    const WEBHOOK: &str = "https://open.feishu.cn/open-apis/bot/v2/hook/abc123";

    fn load(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]);
        assert!(!config.force_run);
        assert_eq!(config.history_path, PathBuf::from("data/weekly_history.json"));
        assert_eq!(config.endpoints.dune_base_url, "https://api.dune.com/api/v1");
        assert_eq!(config.poll, PollSettings::default());
        assert_eq!(config.request_timeout, Duration::from_secs(20));
        assert_eq!(config.columns, ColumnSynonyms::default());
    }

    #[test]
    fn test_missing_values_fail_lazily() {
        let config = load(&[(DUNE_API_KEY, "  ")]);
        assert_eq!(
            config.require_api_key().unwrap_err().to_string(),
            "Missing required environment variable: DUNE_API_KEY"
        );
        assert_eq!(
            config.require_query_id().unwrap_err().to_string(),
            "Missing required environment variable: DUNE_QUERY_ID"
        );
        assert!(config.webhook_url().is_none());
    }

    #[test]
    fn test_values_are_trimmed_and_parsed() {
        let config = load(&[
            (DUNE_API_KEY, " key "),
            (DUNE_QUERY_ID, "4242"),
            (FEISHU_WEBHOOK_URL, WEBHOOK),
        ]);
        assert_eq!(config.require_api_key().unwrap(), "key");
        assert_eq!(config.require_query_id().unwrap(), 4242);
        assert_eq!(config.require_webhook_url().unwrap(), WEBHOOK);
    }

    #[test]
    fn test_non_integer_query_id() {
        let config = load(&[(DUNE_QUERY_ID, "abc")]);
        let err = config.require_query_id().unwrap_err();
        assert!(matches!(err, ReportError::Config(_)));
    }

    #[test]
    fn test_invalid_webhook_url() {
        let config = load(&[(FEISHU_WEBHOOK_URL, "not a url")]);
        assert!(config.require_webhook_url().is_err());
        let config = load(&[(FEISHU_WEBHOOK_URL, "ftp://example.com/hook")]);
        assert!(config.webhook_url().is_none());
    }

    #[test]
    fn test_force_run_only_on_exact_one() {
        assert!(load(&[(FORCE_RUN, "1")]).force_run);
        assert!(!load(&[(FORCE_RUN, "true")]).force_run);
        assert!(load(&[]).with_overrides(true, None).force_run);
    }

    #[test]
    fn test_history_path_override() {
        let config = load(&[]).with_overrides(false, Some(PathBuf::from("/tmp/h.json")));
        assert_eq!(config.history_path, PathBuf::from("/tmp/h.json"));
    }

    #[test]
    fn test_extra_columns_appended() {
        let config = load(&[
            (DUNE_SYMBOL_COLUMNS, "Ticker, coin"),
            (DUNE_VOLUME_COLUMNS, "usd_volume"),
        ]);
        let symbols: Vec<&str> = config.columns.symbol_columns().iter().map(|c| c.as_str()).collect();
        assert_eq!(symbols[symbols.len() - 2..], ["ticker", "coin"]);
        assert_eq!(
            config.columns.volume_columns().last().map(|c| c.as_str()),
            Some("usd_volume")
        );
    }

    #[test]
    fn test_redact_secrets() {
        let config = load(&[(DUNE_API_KEY, "sk-123"), (FEISHU_WEBHOOK_URL, WEBHOOK)]);
        assert_eq!(
            config.redact(&format!("POST {} with key sk-123", WEBHOOK)),
            "POST *** with key ***"
        );
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-123"));
        assert!(!rendered.contains("abc123"));
    }
}
