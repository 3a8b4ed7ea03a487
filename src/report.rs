//! Report row assembly for the downstream document renderer.
//!
//! The renderer itself is an external collaborator behind [`ReportRenderer`];
//! this module owns everything up to that boundary: category filtering, row
//! ordering, and the decision of which photos are embeddable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::model::{PhotoRef, PunchlistItem};

/// One row of the paginated punchlist report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub room: String,
    pub category: String,
    pub description: String,
    /// Present only when the photo was resolvable at build time
    pub thumbnail: Option<PhotoRef>,
}

/// A finalized, filtered item collection ready for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub title: String,
    pub job_name: String,
    pub category_filter: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<ReportRow>,
}

impl Report {
    /// Assemble report rows from a job's items, honoring the category filter.
    ///
    /// Items with an unresolvable photo still get a row; the missing
    /// thumbnail is logged and skipped rather than failing the report.
    pub fn build(
        items: &[PunchlistItem],
        job_name: &str,
        category_filter: Option<&str>,
    ) -> Self {
        let rows = items
            .iter()
            .filter(|item| match category_filter {
                Some(category) => item.category == category,
                None => true,
            })
            .map(|item| {
                let thumbnail = if item.photo.is_resolvable() {
                    Some(item.photo.clone())
                } else {
                    warn!("photo for item {} is not resolvable, skipping thumbnail", item.id);
                    None
                };
                ReportRow {
                    room: item.room.clone(),
                    category: item.category.clone(),
                    description: item.description.clone(),
                    thumbnail,
                }
            })
            .collect();

        let filter_label = category_filter.unwrap_or("All");
        Self {
            title: format!("Punchlist Report - {}", filter_label),
            job_name: job_name.to_string(),
            category_filter: category_filter.map(str::to_string),
            generated_at: Utc::now(),
            rows,
        }
    }

    /// Suggested file name for the downloaded document.
    pub fn file_name(&self) -> String {
        let filter = self
            .category_filter
            .as_deref()
            .unwrap_or("all")
            .to_lowercase()
            .replace(' ', "_");
        format!(
            "punchlist_{}_{}.pdf",
            filter,
            self.generated_at.format("%Y-%m-%d")
        )
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Renders a report into a downloadable paginated document.
///
/// Implementations render row by row; a row whose thumbnail fails to decode
/// or draw is logged and rendered without it, never failing the whole
/// document.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, report: &Report) -> anyhow::Result<Vec<u8>>;
}
