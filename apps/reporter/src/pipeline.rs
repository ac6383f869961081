//! One weekly report run.
//!
//! Order: schedule gate, credentials, supply snapshot, report window, Dune
//! volume query, share, history, deltas, notification, history write. Metrics
//! are recorded into [`RunProgress`] as they become known so a failure report
//! can show everything computed up to that point. History is only written
//! after the success report was delivered; a failed write at that point is
//! recorded on the completed run rather than reported to the chat a second
//! time.

use crate::config::AppConfig;
use crate::schedule::should_run_now;
use chrono::{DateTime, FixedOffset};
use compact_str::CompactString;
use stablecoin_alerts::{
    previous_metrics, Delivery, FailureReport, HistoryStore, SuccessReport, WebhookNotifier,
};
use stablecoin_core::{format_symbol_list, HistoryEntry, MetricsSnapshot, ReportError, ReportWindow};
use stablecoin_engine::{
    compute_deltas, compute_share, extract_symbol_totals, record_supply_metrics,
    record_volume_share,
};
use stablecoin_feeds::{RetryingClient, SupplySnapshotClient, VolumeQueryClient};
use tracing::{error, info, warn};

/// State accumulated during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunProgress {
    pub metrics: MetricsSnapshot,
    pub missing_symbols: Vec<CompactString>,
    pub window: Option<ReportWindow>,
}

#[derive(Debug)]
pub struct CompletedRun {
    pub report: SuccessReport,
    pub delivery: Delivery,
    pub history_len: usize,
    /// Set when the report went out but the history file could not be written
    pub history_error: Option<ReportError>,
}

#[derive(Debug)]
pub struct PartialFailure {
    pub run_time: DateTime<FixedOffset>,
    pub progress: RunProgress,
    pub error: ReportError,
    /// Whether the failure report reached the webhook
    pub notified: bool,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Outside the schedule and not forced
    Skipped,
    Completed(CompletedRun),
    PartialFailure(PartialFailure),
}

impl RunOutcome {
    /// Process exit status: 0 for skipped runs and fully completed runs,
    /// 1 for failures and for completed runs whose history was not saved.
    pub fn exit_status(&self) -> u8 {
        match self {
            RunOutcome::Skipped => 0,
            RunOutcome::Completed(run) if run.history_error.is_none() => 0,
            RunOutcome::Completed(_) | RunOutcome::PartialFailure(_) => 1,
        }
    }
}

pub struct ReportPipeline<'a> {
    config: &'a AppConfig,
    client: RetryingClient,
}

impl<'a> ReportPipeline<'a> {
    pub fn new(config: &'a AppConfig, client: RetryingClient) -> Self {
        Self { config, client }
    }

    pub async fn run(&self, now: DateTime<FixedOffset>) -> RunOutcome {
        if !should_run_now(now, self.config.force_run) {
            info!(now = %now, "Outside the Monday 07:00 report window, nothing to do");
            return RunOutcome::Skipped;
        }

        let mut progress = RunProgress::default();
        match self.execute(now, &mut progress).await {
            Ok(completed) => {
                info!(
                    delivery = ?completed.delivery,
                    history_len = completed.history_len,
                    history_saved = completed.history_error.is_none(),
                    "Weekly report completed"
                );
                RunOutcome::Completed(completed)
            }
            Err(e) => {
                error!(error = %self.config.redact(&e.to_string()), "Weekly report failed");
                info!(
                    metrics = %serde_json::to_string(&progress.metrics).unwrap_or_default(),
                    missing_symbols = %format_symbol_list(&progress.missing_symbols),
                    "Partial state at failure"
                );
                let notified = self.notify_failure(now, &progress, &e).await;
                RunOutcome::PartialFailure(PartialFailure {
                    run_time: now,
                    progress,
                    error: e,
                    notified,
                })
            }
        }
    }

    async fn execute(
        &self,
        now: DateTime<FixedOffset>,
        progress: &mut RunProgress,
    ) -> Result<CompletedRun, ReportError> {
        let config = self.config;
        let api_key = config.require_api_key()?;
        let query_id = config.require_query_id()?;
        let webhook_url = config.require_webhook_url()?;

        info!("Fetching DefiLlama supply snapshot");
        let supply = SupplySnapshotClient::new(self.client.clone(), config.endpoints.supply.clone())
            .fetch_snapshot()
            .await?;
        record_supply_metrics(&mut progress.metrics, &supply);

        let window = ReportWindow::ending_before(now);
        progress.window = Some(window);

        info!(query_id, window = %window, "Executing Dune transfer volume query");
        let volume = VolumeQueryClient::new(
            self.client.clone(),
            &config.endpoints.dune_base_url,
            api_key,
            config.poll,
        );
        let rows = volume.run(query_id).await?;
        let totals = extract_symbol_totals(&rows, &config.columns)?;
        let breakdown = compute_share(&totals, &supply.top_symbols)?;
        progress.missing_symbols = breakdown.missing_symbols.clone();
        record_volume_share(&mut progress.metrics, &breakdown);

        if breakdown.share.is_none() {
            return Err(ReportError::data_unavailable(
                "Dune query result did not include usable USDC transfer volume data",
            ));
        }
        if !progress.missing_symbols.is_empty() {
            warn!(
                missing = %format_symbol_list(&progress.missing_symbols),
                "Top stablecoins without transfer volume rows"
            );
        }

        let store = HistoryStore::new(&config.history_path);
        let mut history = store.load()?;
        let deltas = compute_deltas(&progress.metrics, previous_metrics(&history));

        let report = SuccessReport {
            run_time: now,
            window,
            metrics: progress.metrics,
            deltas,
            missing_symbols: progress.missing_symbols.clone(),
        };
        let delivery = WebhookNotifier::new(self.client.clone(), webhook_url)
            .send_report(&report)
            .await?;

        let entry = HistoryEntry::new(
            now,
            window,
            progress.metrics,
            progress.missing_symbols.clone(),
        );
        store.append(&mut history, entry);
        let history_error = match store.save(&history) {
            Ok(()) => None,
            Err(e) => {
                error!(
                    path = %store.path().display(),
                    error = %e,
                    "Report delivered but history could not be saved"
                );
                Some(e)
            }
        };

        Ok(CompletedRun {
            report,
            delivery,
            history_len: history.len(),
            history_error,
        })
    }

    /// Best-effort failure report. Returns whether it was delivered.
    async fn notify_failure(
        &self,
        now: DateTime<FixedOffset>,
        progress: &RunProgress,
        error: &ReportError,
    ) -> bool {
        let Some(webhook_url) = self.config.webhook_url() else {
            warn!("FEISHU_WEBHOOK_URL is not set, skipping failure notification");
            return false;
        };

        let report = FailureReport {
            run_time: now,
            window: progress.window,
            error: self.config.redact(&error.to_string()),
            metrics: progress.metrics,
            missing_symbols: progress.missing_symbols.clone(),
        };
        match WebhookNotifier::new(self.client.clone(), webhook_url)
            .send_report(&report)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(
                    error = %self.config.redact(&e.to_string()),
                    "Failed to send failure notification"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use stablecoin_alerts::Report;
    use stablecoin_feeds::mock::{MockTransport, RecordingSleeper};
    use stablecoin_feeds::{HttpMethod, DEFILLAMA_CHART_URL, DEFILLAMA_STABLECOINS_URL};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    const WEBHOOK: &str = "https://open.feishu.test/open-apis/bot/v2/hook/secret-token";
    const EXECUTE_URL: &str = "https://api.dune.com/api/v1/query/4242/execute";
    const STATUS_URL: &str = "https://api.dune.com/api/v1/execution/01EXEC/status";
    const RESULTS_URL: &str = "https://api.dune.com/api/v1/execution/01EXEC/results";

    fn monday_seven() -> DateTime<FixedOffset> {
        crate::schedule::report_offset()
            .with_ymd_and_hms(2025, 1, 6, 7, 0, 3)
            .single()
            .unwrap()
    }

    fn config(dir: &TempDir, vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
            .with_overrides(false, Some(dir.path().join("weekly_history.json")))
    }

    fn full_config(dir: &TempDir) -> AppConfig {
        config(
            dir,
            &[
                ("DUNE_API_KEY", "dune-key"),
                ("DUNE_QUERY_ID", "4242"),
                ("FEISHU_WEBHOOK_URL", WEBHOOK),
            ],
        )
    }

    fn client(transport: &Arc<MockTransport>) -> RetryingClient {
        RetryingClient::new(transport.clone()).with_sleeper(Arc::new(RecordingSleeper::new()))
    }

    fn asset(symbol: &str, circulating: f64) -> Value {
        json!({"symbol": symbol, "pegType": "peggedUSD", "circulating": {"peggedUSD": circulating}})
    }

    fn script_supply(transport: &MockTransport) {
        transport.push_json(
            HttpMethod::Get,
            DEFILLAMA_STABLECOINS_URL,
            json!({"peggedAssets": [
                asset("USDT", 600_000_000.0),
                asset("USDC", 250_000_000.0),
                asset("DAI", 50_000_000.0),
                asset("PYUSD", 10_000_000.0),
            ]}),
        );
        transport.push_json(
            HttpMethod::Get,
            DEFILLAMA_CHART_URL,
            json!([
                {"totalCirculating": {"peggedUSD": 900_000_000.0}},
                {"totalCirculating": {"peggedUSD": 1_000_000_000.0}},
            ]),
        );
    }

    fn script_dune(transport: &MockTransport, rows: Value) {
        transport.push_json(HttpMethod::Post, EXECUTE_URL, json!({"execution_id": "01EXEC"}));
        transport.push_json(
            HttpMethod::Get,
            STATUS_URL,
            json!({"state": "QUERY_STATE_EXECUTING", "is_execution_finished": false}),
        );
        transport.push_json(
            HttpMethod::Get,
            STATUS_URL,
            json!({"state": "QUERY_STATE_COMPLETED", "is_execution_finished": true}),
        );
        transport.push_json(
            HttpMethod::Get,
            RESULTS_URL,
            json!({"result": {"rows": rows}, "next_offset": null}),
        );
    }

    fn webhook_markdown(transport: &MockTransport, index: usize) -> String {
        let sent = transport.requests_to(WEBHOOK);
        sent[index].body.as_ref().unwrap()["card"]["elements"][0]["content"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_successful_run() {
        let dir = TempDir::new().unwrap();
        let config = full_config(&dir);
        let transport = Arc::new(MockTransport::new());
        script_supply(&transport);
        script_dune(
            &transport,
            json!([
                {"Symbol": "USDC", "volume_7d_usd": 40.0},
                {"symbol": "usdt", "volume_7d_usd": "60"},
                {"symbol": "weth", "volume_7d_usd": 1000.0},
            ]),
        );
        transport.push_json(HttpMethod::Post, WEBHOOK, json!({"code": 0, "msg": "success"}));

        let outcome = ReportPipeline::new(&config, client(&transport))
            .run(monday_seven())
            .await;
        assert_eq!(outcome.exit_status(), 0);
        let run = match outcome {
            RunOutcome::Completed(run) => run,
            other => panic!("expected completed run, got {:?}", other),
        };

        assert_eq!(run.delivery, Delivery::Card);
        assert_eq!(run.history_len, 1);
        assert!(run.history_error.is_none());
        assert_eq!(run.report.metrics.usdc_supply_share, Some(0.25));
        assert_eq!(run.report.metrics.usdc_transfer_volume_share_7d, Some(0.4));
        assert_eq!(run.report.missing_symbols, vec!["dai", "pyusd"]);

        let markdown = webhook_markdown(&transport, 0);
        assert!(markdown.contains("**全市场稳定币总供给**：10.00 亿 USD  \nWoW：N/A"));
        assert!(markdown.contains("**USDC 供给份额**：25.00%"));
        assert!(markdown.contains("**USDC 过去 7 天链上转账量份额**：40.00%"));
        assert!(markdown.contains("**missing_symbols**：dai, pyusd"));

        let history = HistoryStore::new(&config.history_path).load().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].start_date.to_string(), "2024-12-30");
        assert_eq!(history[0].end_date.to_string(), "2025-01-05");
        assert_eq!(history[0].metrics, run.report.metrics);
    }

    #[tokio::test]
    async fn test_week_over_week_uses_previous_entry() {
        let dir = TempDir::new().unwrap();
        let config = full_config(&dir);
        let store = HistoryStore::new(&config.history_path);
        let last_week = monday_seven() - chrono::Duration::weeks(1);
        store
            .save(&[HistoryEntry::new(
                last_week,
                ReportWindow::ending_before(last_week),
                MetricsSnapshot {
                    total_supply_usd: Some(800_000_000.0),
                    usdc_supply_usd: Some(200_000_000.0),
                    usdc_supply_share: Some(0.25),
                    usdc_transfer_volume_share_7d: Some(0.35),
                },
                vec![],
            )])
            .unwrap();

        let transport = Arc::new(MockTransport::new());
        script_supply(&transport);
        script_dune(
            &transport,
            json!([
                {"symbol": "USDC", "volume_7d_usd": 40.0},
                {"symbol": "USDT", "volume_7d_usd": 60.0},
            ]),
        );
        transport.push_json(HttpMethod::Post, WEBHOOK, json!({"code": 0}));

        let outcome = ReportPipeline::new(&config, client(&transport))
            .run(monday_seven())
            .await;
        let run = match outcome {
            RunOutcome::Completed(run) => run,
            other => panic!("expected completed run, got {:?}", other),
        };
        assert_eq!(run.history_len, 2);

        let text = run.report.plain_text();
        assert!(text.contains("全市场稳定币总供给：10.00 亿 USD | WoW +25.00%"));
        assert!(text.contains("USDC 供给：2.50 亿 USD | WoW +25.00%"));
        assert!(text.contains("USDC 供给份额：25.00% | WoW +0.00pp"));
        assert!(text.contains("USDC 过去 7 天链上转账量份额：40.00% | WoW +5.00pp"));
    }

    #[tokio::test]
    async fn test_dune_failure_reports_partial_metrics() {
        let dir = TempDir::new().unwrap();
        let config = full_config(&dir);
        let transport = Arc::new(MockTransport::new());
        script_supply(&transport);
        transport.push_json(HttpMethod::Post, EXECUTE_URL, json!({"execution_id": "01EXEC"}));
        transport.push_json(
            HttpMethod::Get,
            STATUS_URL,
            json!({"state": "QUERY_STATE_FAILED", "error": {"message": "query timed out"}}),
        );
        transport.push_json(HttpMethod::Post, WEBHOOK, json!({"code": 0}));

        let outcome = ReportPipeline::new(&config, client(&transport))
            .run(monday_seven())
            .await;
        assert_eq!(outcome.exit_status(), 1);
        let failure = match outcome {
            RunOutcome::PartialFailure(failure) => failure,
            other => panic!("expected failure, got {:?}", other),
        };
        assert!(failure.notified);
        assert_eq!(failure.error.to_string(), "query timed out");
        assert_eq!(failure.progress.metrics.total_supply_usd, Some(1_000_000_000.0));
        assert_eq!(failure.progress.metrics.usdc_transfer_volume_share_7d, None);

        let sent = transport.requests_to(WEBHOOK);
        assert_eq!(sent[0].body.as_ref().unwrap()["card"]["header"]["template"], "red");
        let markdown = webhook_markdown(&transport, 0);
        assert!(markdown.contains("**统计区间（北京时间）**：2024-12-30 至 2025-01-05"));
        assert!(markdown.contains("**失败原因**：query timed out"));
        assert!(markdown.contains("**USDC 供给**：2.50 亿 USD"));
        assert!(markdown.contains("**USDC 过去 7 天链上转账量份额**：N/A"));

        assert!(!config.history_path.exists());
    }

    #[tokio::test]
    async fn test_missing_usdc_volume_is_failure() {
        let dir = TempDir::new().unwrap();
        let config = full_config(&dir);
        let transport = Arc::new(MockTransport::new());
        script_supply(&transport);
        script_dune(&transport, json!([{"symbol": "USDT", "volume_7d_usd": 60.0}]));
        transport.push_json(HttpMethod::Post, WEBHOOK, json!({"code": 0}));

        let outcome = ReportPipeline::new(&config, client(&transport))
            .run(monday_seven())
            .await;
        let failure = match outcome {
            RunOutcome::PartialFailure(failure) => failure,
            other => panic!("expected failure, got {:?}", other),
        };
        assert_eq!(
            failure.error.to_string(),
            "Dune query result did not include usable USDC transfer volume data"
        );
        assert_eq!(failure.progress.missing_symbols, vec!["usdc", "dai", "pyusd"]);
        assert!(webhook_markdown(&transport, 0).contains("**missing_symbols**：usdc, dai, pyusd"));
        assert!(!config.history_path.exists());
    }

    #[tokio::test]
    async fn test_history_write_failure_after_delivery_sends_single_report() {
        let dir = TempDir::new().unwrap();
        let config = full_config(&dir);
        // A directory where the temp file should go makes the write fail
        let mut temp = config.history_path.clone().into_os_string();
        temp.push(".tmp");
        std::fs::create_dir_all(&temp).unwrap();

        let transport = Arc::new(MockTransport::new());
        script_supply(&transport);
        script_dune(
            &transport,
            json!([
                {"symbol": "USDC", "volume_7d_usd": 40.0},
                {"symbol": "USDT", "volume_7d_usd": 60.0},
            ]),
        );
        transport.push_json(HttpMethod::Post, WEBHOOK, json!({"code": 0}));

        let outcome = ReportPipeline::new(&config, client(&transport))
            .run(monday_seven())
            .await;
        assert_eq!(outcome.exit_status(), 1);
        let run = match outcome {
            RunOutcome::Completed(run) => run,
            other => panic!("expected completed run, got {:?}", other),
        };
        assert_eq!(run.delivery, Delivery::Card);
        assert!(matches!(run.history_error, Some(ReportError::Io(_))));

        let sent = transport.requests_to(WEBHOOK);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body.as_ref().unwrap()["card"]["header"]["template"], "blue");
        assert!(!config.history_path.exists());
    }

    #[tokio::test]
    async fn test_skipped_outside_schedule() {
        let dir = TempDir::new().unwrap();
        let config = full_config(&dir);
        let transport = Arc::new(MockTransport::new());
        let tuesday = monday_seven() + chrono::Duration::days(1);

        let outcome = ReportPipeline::new(&config, client(&transport)).run(tuesday).await;
        assert!(matches!(outcome, RunOutcome::Skipped));
        assert_eq!(outcome.exit_status(), 0);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_api_key_still_notifies() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &[("DUNE_QUERY_ID", "4242"), ("FEISHU_WEBHOOK_URL", WEBHOOK)]);
        let transport = Arc::new(MockTransport::new());
        transport.push_json(HttpMethod::Post, WEBHOOK, json!({"code": 0}));

        let outcome = ReportPipeline::new(&config, client(&transport))
            .run(monday_seven())
            .await;
        let failure = match outcome {
            RunOutcome::PartialFailure(failure) => failure,
            other => panic!("expected failure, got {:?}", other),
        };
        assert!(failure.notified);
        assert_eq!(failure.progress, RunProgress::default());
        assert_eq!(transport.requests().len(), 1);

        let markdown = webhook_markdown(&transport, 0);
        assert!(markdown.contains("**统计区间（北京时间）**：N/A"));
        assert!(markdown.contains("**失败原因**：Missing required environment variable: DUNE_API_KEY"));
    }

    #[tokio::test]
    async fn test_undeliverable_failure_report() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &[("DUNE_API_KEY", "k"), ("FEISHU_WEBHOOK_URL", WEBHOOK)]);
        let transport = Arc::new(MockTransport::new());
        transport.push_status(HttpMethod::Post, WEBHOOK, 400);
        transport.push_status(HttpMethod::Post, WEBHOOK, 400);

        let outcome = ReportPipeline::new(&config, client(&transport))
            .run(monday_seven())
            .await;
        assert_eq!(outcome.exit_status(), 1);
        let failure = match outcome {
            RunOutcome::PartialFailure(failure) => failure,
            other => panic!("expected failure, got {:?}", other),
        };
        assert!(!failure.notified);
        let sent = transport.requests_to(WEBHOOK);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].body.as_ref().unwrap()["msg_type"], "text");
    }
}
