//! Report composition for the Feishu webhook.
//!
//! Each report renders twice: as an interactive card (one markdown element)
//! and as plain text for the fallback message.

use chrono::{DateTime, FixedOffset};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use stablecoin_core::{format_metric, format_run_time, format_symbol_list, MetricsSnapshot, ReportWindow};
use stablecoin_engine::DeltaSet;

/// Time zone label shown next to dates.
pub const REPORT_TIME_LABEL: &str = "北京时间";

const DATA_SOURCES: &str = "Supply 来自 DefiLlama；Transfer Volume 来自 Dune";

/// Body of a webhook POST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type", rename_all = "lowercase")]
pub enum WebhookPayload {
    Interactive { card: Card },
    Text { content: TextContent },
}

impl WebhookPayload {
    pub fn text(text: impl Into<String>) -> Self {
        WebhookPayload::Text {
            content: TextContent { text: text.into() },
        }
    }

    pub fn card(template: HeaderTemplate, title: impl Into<String>, markdown: impl Into<String>) -> Self {
        WebhookPayload::Interactive {
            card: Card {
                config: CardConfig {
                    wide_screen_mode: true,
                },
                header: CardHeader {
                    template,
                    title: CardTitle {
                        content: title.into(),
                    },
                },
                elements: vec![CardElement::Markdown {
                    content: markdown.into(),
                }],
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub config: CardConfig,
    pub header: CardHeader,
    pub elements: Vec<CardElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardConfig {
    pub wide_screen_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardHeader {
    pub template: HeaderTemplate,
    pub title: CardTitle,
}

/// Header color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderTemplate {
    Blue,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename = "plain_text")]
pub struct CardTitle {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "lowercase")]
pub enum CardElement {
    Markdown { content: String },
}

/// A report that can be delivered as a card or as plain text.
pub trait Report {
    fn card(&self) -> WebhookPayload;

    fn plain_text(&self) -> String;

    fn text_payload(&self) -> WebhookPayload {
        WebhookPayload::text(self.plain_text())
    }
}

/// Report for a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessReport {
    pub run_time: DateTime<FixedOffset>,
    pub window: ReportWindow,
    pub metrics: MetricsSnapshot,
    pub deltas: DeltaSet,
    pub missing_symbols: Vec<CompactString>,
}

impl SuccessReport {
    pub fn title(&self) -> String {
        format!("USDC 周报 {}", self.window.end)
    }
}

impl Report for SuccessReport {
    fn card(&self) -> WebhookPayload {
        let mut sections = vec![
            format!(
                "**统计日期（{}）**：{}",
                REPORT_TIME_LABEL,
                self.run_time.date_naive()
            ),
            format!("**统计区间（{}）**：{}", REPORT_TIME_LABEL, self.window),
        ];
        for (metric, value) in self.metrics.iter() {
            sections.push(format!(
                "**{}**：{}  \nWoW：{}",
                metric.label(),
                format_metric(metric, value),
                self.deltas.get(metric)
            ));
        }
        sections.push(format!(
            "**missing_symbols**：{}",
            format_symbol_list(&self.missing_symbols)
        ));
        sections.push(format!("**数据源**：{}", DATA_SOURCES));

        WebhookPayload::card(HeaderTemplate::Blue, self.title(), sections.join("\n\n"))
    }

    fn plain_text(&self) -> String {
        let mut lines = vec![
            self.title(),
            format!(
                "统计日期（{}）：{}",
                REPORT_TIME_LABEL,
                self.run_time.date_naive()
            ),
            format!("统计区间（{}）：{}", REPORT_TIME_LABEL, self.window),
        ];
        for (metric, value) in self.metrics.iter() {
            lines.push(format!(
                "{}：{} | WoW {}",
                metric.label(),
                format_metric(metric, value),
                self.deltas.get(metric)
            ));
        }
        lines.push(format!(
            "missing_symbols：{}",
            format_symbol_list(&self.missing_symbols)
        ));
        lines.push(format!("数据源：{}", DATA_SOURCES));
        lines.join("\n")
    }
}

/// Report for a run that failed after it started.
///
/// Carries whatever metrics were computed before the failure.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub run_time: DateTime<FixedOffset>,
    pub window: Option<ReportWindow>,
    pub error: String,
    pub metrics: MetricsSnapshot,
    pub missing_symbols: Vec<CompactString>,
}

impl Report for FailureReport {
    fn card(&self) -> WebhookPayload {
        let window = self
            .window
            .map(|w| w.to_string())
            .unwrap_or_else(|| stablecoin_core::UNAVAILABLE.to_string());
        let mut sections = vec![
            format!(
                "**执行时间（{}）**：{}",
                REPORT_TIME_LABEL,
                format_run_time(&self.run_time)
            ),
            format!("**统计区间（{}）**：{}", REPORT_TIME_LABEL, window),
            format!("**失败原因**：{}", self.error),
        ];
        for (metric, value) in self.metrics.iter() {
            sections.push(format!("**{}**：{}", metric.label(), format_metric(metric, value)));
        }
        sections.push(format!(
            "**missing_symbols**：{}",
            format_symbol_list(&self.missing_symbols)
        ));

        WebhookPayload::card(HeaderTemplate::Red, "USDC 周报执行失败", sections.join("\n\n"))
    }

    fn plain_text(&self) -> String {
        let mut lines = vec![
            format!("USDC 周报执行失败：{}", self.error),
            format!(
                "执行时间（{}）：{}",
                REPORT_TIME_LABEL,
                format_run_time(&self.run_time)
            ),
        ];
        if let Some(window) = self.window {
            lines.push(format!("统计区间（{}）：{}", REPORT_TIME_LABEL, window));
        }
        for (metric, value) in self.metrics.iter() {
            lines.push(format!("{}：{}", metric.label(), format_metric(metric, value)));
        }
        lines.push(format!(
            "missing_symbols：{}",
            format_symbol_list(&self.missing_symbols)
        ));
        lines.join("\n")
    }
}
