//! Suspicious-activity rows and their CSV rendering

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, ListQuery};
use crate::export::PageFetcher;

/// Which suspicious-activity list to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspiciousKind {
    Clicks,
    Conversions,
}

impl SuspiciousKind {
    pub fn path(self) -> &'static str {
        match self {
            SuspiciousKind::Clicks => "/api/suspicious/clicks",
            SuspiciousKind::Conversions => "/api/suspicious/conversions",
        }
    }

    /// Prefix of exported file names
    pub fn csv_prefix(self) -> &'static str {
        match self {
            SuspiciousKind::Clicks => "suspicious_clicks",
            SuspiciousKind::Conversions => "suspicious_conversions",
        }
    }

    pub fn count_label(self) -> &'static str {
        match self {
            SuspiciousKind::Clicks => "Clicks",
            SuspiciousKind::Conversions => "Conversions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

/// One aggregated IP/user-agent pair flagged by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousItem {
    #[serde(default)]
    pub date: String,
    pub ipaddress: String,
    pub useragent: String,
    #[serde(default)]
    pub total_clicks: Option<u64>,
    #[serde(default)]
    pub total_conversions: Option<u64>,
    #[serde(default)]
    pub media_count: u64,
    #[serde(default)]
    pub program_count: u64,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub reasons_formatted: Vec<String>,
    #[serde(default)]
    pub min_click_to_conv_seconds: Option<f64>,
    #[serde(default)]
    pub max_click_to_conv_seconds: Option<f64>,
    #[serde(default)]
    pub media_names: Vec<String>,
    #[serde(default)]
    pub program_names: Vec<String>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub risk_label: Option<String>,
}

impl SuspiciousItem {
    /// Detector reasons without duplicates, in first-seen order
    pub fn readable_reasons(&self) -> Vec<&str> {
        let source = if self.reasons.is_empty() {
            &self.reasons_formatted
        } else {
            &self.reasons
        };
        let mut seen = Vec::with_capacity(source.len());
        for reason in source {
            if !seen.contains(&reason.as_str()) {
                seen.push(reason.as_str());
            }
        }
        seen
    }
}

/// One page of the list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousPage {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub data: Vec<SuspiciousItem>,
    pub total: usize,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

fn optional_seconds(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Pages through one suspicious-activity list for export
pub struct SuspiciousPages {
    backend: Arc<dyn Backend>,
    kind: SuspiciousKind,
    date: Option<String>,
    search: Option<String>,
}

impl SuspiciousPages {
    pub fn new(
        backend: Arc<dyn Backend>,
        kind: SuspiciousKind,
        date: Option<String>,
        search: Option<String>,
    ) -> Self {
        Self {
            backend,
            kind,
            date,
            search,
        }
    }

    /// Total row estimate for the current filters
    pub async fn total(&self) -> crate::Result<usize> {
        let page = self.backend.list_suspicious(self.kind, &self.query(0, 1)).await?;
        Ok(page.total)
    }

    /// `<prefix>_<date>[_<search>].csv`
    pub fn file_name(&self) -> String {
        let date = self.date.as_deref().unwrap_or_default();
        match self.search.as_deref().filter(|s| !s.is_empty()) {
            Some(search) => format!("{}_{}_{}.csv", self.kind.csv_prefix(), date, search),
            None => format!("{}_{}.csv", self.kind.csv_prefix(), date),
        }
    }

    fn query(&self, offset: usize, limit: usize) -> ListQuery {
        ListQuery {
            date: self.date.clone(),
            limit,
            offset,
            search: self.search.clone(),
        }
    }
}

#[async_trait]
impl PageFetcher for SuspiciousPages {
    type Row = SuspiciousItem;

    fn header(&self) -> Vec<String> {
        let mut header = vec![
            "Risk level".to_string(),
            "IP address".to_string(),
            "User Agent".to_string(),
            self.kind.count_label().to_string(),
        ];
        if self.kind == SuspiciousKind::Conversions {
            header.push("Min seconds to conversion".to_string());
            header.push("Max seconds to conversion".to_string());
        }
        header.extend(
            ["Media count", "Media", "Program count", "Programs", "Reasons"]
                .iter()
                .map(|s| s.to_string()),
        );
        header
    }

    fn record(&self, item: &SuspiciousItem) -> Vec<String> {
        let count = match self.kind {
            SuspiciousKind::Clicks => item.total_clicks,
            SuspiciousKind::Conversions => item.total_conversions,
        };
        let mut record = vec![
            item.risk_label.clone().unwrap_or_else(|| "-".to_string()),
            item.ipaddress.clone(),
            item.useragent.clone(),
            count.unwrap_or(0).to_string(),
        ];
        if self.kind == SuspiciousKind::Conversions {
            record.push(optional_seconds(item.min_click_to_conv_seconds));
            record.push(optional_seconds(item.max_click_to_conv_seconds));
        }
        record.push(item.media_count.to_string());
        record.push(item.media_names.join(", "));
        record.push(item.program_count.to_string());
        record.push(item.program_names.join(", "));
        record.push(item.readable_reasons().join(", "));
        record
    }

    async fn fetch(&self, offset: usize, limit: usize) -> crate::Result<Vec<SuspiciousItem>> {
        let page = self
            .backend
            .list_suspicious(self.kind, &self.query(offset, limit))
            .await?;
        Ok(page.data)
    }
}
