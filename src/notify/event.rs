use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// How urgently an operator should look at an [`ErrorEvent`].
///
/// Only affects presentation (embed color); delivery is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category labels used by the engine.
pub mod category {
    pub const STATE_MANAGEMENT: &str = "State Management";
    pub const FEED_PROCESSING: &str = "Feed Processing";
    pub const DELIVERY: &str = "Delivery";
}

/// A failure worth telling a human about, built where it happened and
/// handed to [`Notifier::report_error`](super::Notifier::report_error) once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub category: String,
    pub message: String,
    pub severity: Severity,
    pub feed_id: Option<String>,
    /// Extra key/value context, rendered as one embed field per entry
    pub details: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorEvent {
    pub fn new(category: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
            severity,
            feed_id: None,
            details: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_feed(mut self, feed_id: impl Into<String>) -> Self {
        self.feed_id = Some(feed_id.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}
