//! Batched CSV export of paginated result sets
//!
//! Batches are fetched strictly one after another, so memory stays bounded
//! by the row cap and progress is monotonic. A failing batch aborts the
//! export and no file is produced.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::ExportConfig;
use crate::notice::{NewNotice, NoticeDuration};

const BOM: &str = "\u{FEFF}";

/// How long the "export finished" notice stays up
pub const SUCCESS_NOTICE_DURATION: Duration = Duration::from_millis(8000);

/// A paginated, filtered collection that can be exported
#[async_trait]
pub trait PageFetcher: Send + Sync {
    type Row: Send;

    fn header(&self) -> Vec<String>;

    fn record(&self, row: &Self::Row) -> Vec<String>;

    /// Fetch up to `limit` rows starting at `offset`
    async fn fetch(&self, offset: usize, limit: usize) -> crate::Result<Vec<Self::Row>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Fetching,
    Building,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportProgress {
    pub current: usize,
    pub total: usize,
    pub stage: ExportStage,
}

/// The finished file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    /// Write the artifact into `dir`, returning the full path
    pub async fn save_to(&self, dir: &Path) -> crate::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(sanitize_file_name(&self.file_name));
        tokio::fs::write(&path, &self.bytes).await?;
        tracing::info!("Wrote export {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

/// Replace path separators so a search term cannot escape the output directory
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// No rows came back
    Empty,
    /// Stopped between batches; nothing was produced
    Cancelled,
    Written {
        artifact: ExportArtifact,
        rows: usize,
        /// Row count the backend reported for the filters
        total: usize,
    },
}

impl ExportOutcome {
    pub fn is_truncated(&self) -> bool {
        matches!(self, ExportOutcome::Written { rows, total, .. } if rows < total)
    }

    /// Operator notices describing this outcome
    pub fn notices(&self) -> Vec<NewNotice> {
        match self {
            ExportOutcome::Empty => {
                vec![NewNotice::info("Nothing to export")
                    .with_description("No rows matched the current filters")]
            }
            ExportOutcome::Cancelled => vec![NewNotice::info("Export cancelled")],
            ExportOutcome::Written { rows, total, .. } => {
                let mut notices = vec![NewNotice::success("Export finished")
                    .with_description(format!("Exported {} rows", rows))
                    .with_duration(NoticeDuration::After(SUCCESS_NOTICE_DURATION))];
                if rows < total {
                    notices.push(
                        NewNotice::warning("Export truncated")
                            .with_description(format!("Exported {} of {} rows", rows, total)),
                    );
                }
                notices
            }
        }
    }
}

/// Persistent notice for a failed export
pub fn failure_notice(error: &crate::ConsoleError) -> NewNotice {
    NewNotice::error("Export failed")
        .with_description(error.user_message("Export failed"))
        .persistent()
}

/// Sizing policy for exports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportEngine {
    batch_size: usize,
    max_rows: usize,
}

impl ExportEngine {
    pub fn new(batch_size: usize, max_rows: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_rows,
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.batch_size, config.max_rows)
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Plan an export of `total` rows.
    ///
    /// Totals above the cap need an explicit confirmation before any
    /// fetching happens.
    pub fn start(&self, total: usize) -> ExportStart {
        if total == 0 {
            return ExportStart::Empty;
        }
        if total > self.max_rows {
            return ExportStart::NeedsConfirmation(CapConfirmation {
                total,
                cap: self.max_rows,
                batch_size: self.batch_size,
            });
        }
        ExportStart::Ready(ExportJob {
            total,
            export_total: total,
            batch_size: self.batch_size,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStart {
    Empty,
    Ready(ExportJob),
    NeedsConfirmation(CapConfirmation),
}

/// Pending confirmation for an export larger than the cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapConfirmation {
    pub total: usize,
    pub cap: usize,
    #[serde(skip)]
    batch_size: usize,
}

impl CapConfirmation {
    pub fn message(&self) -> String {
        format!(
            "{} rows match; only the top {} will be exported",
            self.total, self.cap
        )
    }

    pub fn confirm(self) -> ExportJob {
        ExportJob {
            total: self.total,
            export_total: self.cap,
            batch_size: self.batch_size,
        }
    }
}

/// An export that is cleared to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportJob {
    total: usize,
    export_total: usize,
    batch_size: usize,
}

impl ExportJob {
    pub fn total(&self) -> usize {
        self.total
    }

    /// Rows that will be requested, `min(total, cap)`
    pub fn export_total(&self) -> usize {
        self.export_total
    }

    pub async fn run<F, P>(
        &self,
        fetcher: &F,
        file_name: impl Into<String>,
        mut progress: P,
        cancel: &CancellationToken,
    ) -> crate::Result<ExportOutcome>
    where
        F: PageFetcher,
        P: FnMut(ExportProgress) + Send,
    {
        let mut lines: Vec<String> = Vec::new();
        let mut offset = 0;
        progress(ExportProgress {
            current: 0,
            total: self.export_total,
            stage: ExportStage::Fetching,
        });

        while offset < self.export_total {
            if cancel.is_cancelled() {
                tracing::info!("Export cancelled after {} rows", offset);
                return Ok(ExportOutcome::Cancelled);
            }
            let limit = self.batch_size.min(self.export_total - offset);
            tracing::debug!("Fetching export batch offset={} limit={}", offset, limit);
            let rows = fetcher.fetch(offset, limit).await?;
            if cancel.is_cancelled() {
                tracing::info!("Export cancelled, discarding batch at offset {}", offset);
                return Ok(ExportOutcome::Cancelled);
            }
            if rows.is_empty() {
                tracing::debug!("Empty batch at offset {}, stopping early", offset);
                break;
            }

            lines.extend(rows.iter().map(|row| csv_line(&fetcher.record(row))));
            offset += rows.len();
            progress(ExportProgress {
                current: offset,
                total: self.export_total,
                stage: ExportStage::Fetching,
            });
        }

        if lines.is_empty() {
            return Ok(ExportOutcome::Empty);
        }

        progress(ExportProgress {
            current: offset,
            total: self.export_total,
            stage: ExportStage::Building,
        });
        let rows = lines.len();
        let mut csv = String::from(BOM);
        csv.push_str(&csv_line(&fetcher.header()));
        for line in &lines {
            csv.push('\n');
            csv.push_str(line);
        }

        tracing::info!("Built export of {} of {} rows", rows, self.total);
        Ok(ExportOutcome::Written {
            artifact: ExportArtifact {
                file_name: file_name.into(),
                bytes: csv.into_bytes(),
            },
            rows,
            total: self.total,
        })
    }
}

/// Quote a cell when it contains a separator, quote or line break
pub fn quote(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn csv_line(cells: &[String]) -> String {
    cells
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(",")
}
