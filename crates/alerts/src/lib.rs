//! Weekly report delivery and run history.
//!
//! This crate provides:
//! - Feishu card and plain-text report composition
//! - Webhook delivery with a plain-text fallback
//! - JSON history storage capped at one year of weekly runs

pub mod notifier;
pub mod report;
pub mod store;

pub use notifier::{Delivery, WebhookNotifier};
pub use report::{
    Card, CardConfig, CardElement, CardHeader, CardTitle, FailureReport, HeaderTemplate, Report,
    SuccessReport, TextContent, WebhookPayload,
};
pub use store::{previous_metrics, HistoryStore, DEFAULT_HISTORY_PATH, MAX_HISTORY_ITEMS};
