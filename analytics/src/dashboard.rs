use crate::aggregate::{
    count_by_sentiment, count_by_source, count_by_source_and_sentiment, count_key_metrics,
    count_over_time, split_examples, ExampleRows, KeyMetrics, SentimentCount,
    SourceSentimentCount, SourceShare, TrendPoint,
};
use crate::filter::{apply_selection, Selection};
use sentiscope_core::PostTable;
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EmptyReason {
    NoData,
    NoSourcesSelected,
    InvertedWindow,
    NoMatchingRows,
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            EmptyReason::NoData => "No posts to analyse yet. Run a search first.",
            EmptyReason::NoSourcesSelected => "Select at least one subreddit.",
            EmptyReason::InvertedWindow => "The start date is after the end date.",
            EmptyReason::NoMatchingRows => "No posts match the current filters.",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterOutcome {
    Empty { reason: EmptyReason },
    Ready { rows: usize },
}

/// Every view of one selection, computed from a single filtered pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub outcome: FilterOutcome,
    pub metrics: KeyMetrics,
    pub distribution: Vec<SentimentCount>,
    pub trend: Vec<TrendPoint>,
    pub contribution: Vec<SourceShare>,
    pub contribution_by_sentiment: Vec<SourceSentimentCount>,
    pub examples: ExampleRows,
}

impl Dashboard {
    pub fn build(table: &PostTable, selection: &Selection) -> Self {
        let rows = apply_selection(table, selection);

        let outcome = if table.is_empty() {
            FilterOutcome::Empty {
                reason: EmptyReason::NoData,
            }
        } else if selection.sources.is_empty() {
            FilterOutcome::Empty {
                reason: EmptyReason::NoSourcesSelected,
            }
        } else if selection.window.start > selection.window.end {
            FilterOutcome::Empty {
                reason: EmptyReason::InvertedWindow,
            }
        } else if rows.is_empty() {
            FilterOutcome::Empty {
                reason: EmptyReason::NoMatchingRows,
            }
        } else {
            FilterOutcome::Ready { rows: rows.len() }
        };
        debug!("Dashboard over {} of {} rows: {:?}", rows.len(), table.len(), outcome);

        Self {
            outcome,
            metrics: count_key_metrics(&rows),
            distribution: count_by_sentiment(&rows),
            trend: count_over_time(&rows),
            contribution: count_by_source(&rows),
            contribution_by_sentiment: count_by_source_and_sentiment(&rows),
            examples: split_examples(&rows),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.outcome, FilterOutcome::Empty { .. })
    }
}
