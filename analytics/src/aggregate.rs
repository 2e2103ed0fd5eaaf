//! Counts over an already filtered set of rows.
//!
//! Groupings come back sorted by their key. Categories with no rows are
//! absent, except in [`KeyMetrics`] where they count as zero.

use crate::filter::{apply_selection, Selection};
use chrono::NaiveDateTime;
use sentiscope_core::{LabeledPost, PostTable, Sentiment};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyMetrics {
    pub total: usize,
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentimentCount {
    pub sentiment: Sentiment,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub sentiment: Sentiment,
    pub bucket: NaiveDateTime,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceShare {
    pub source: String,
    pub count: usize,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSentimentCount {
    pub source: String,
    pub sentiment: Sentiment,
    pub count: usize,
}

/// Example rows split by the three known sentiments, in table order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExampleRows {
    pub positive: Vec<ExampleRow>,
    pub neutral: Vec<ExampleRow>,
    pub negative: Vec<ExampleRow>,
}

/// A row as shown to the user. The classifier's normalized text is left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleRow {
    pub title: String,
    pub source: String,
    pub post_time: String,
    pub text: String,
    pub link: String,
}

impl From<&LabeledPost> for ExampleRow {
    fn from(row: &LabeledPost) -> Self {
        Self {
            title: row.title.clone(),
            source: row.source.clone(),
            post_time: row.post_time.to_string(),
            text: row.text.clone(),
            link: row.link.clone(),
        }
    }
}

pub fn count_key_metrics(rows: &[&LabeledPost]) -> KeyMetrics {
    rows.iter().fold(
        KeyMetrics {
            total: rows.len(),
            ..KeyMetrics::default()
        },
        |mut metrics, row| {
            match row.sentiment {
                Sentiment::Positive => metrics.positive += 1,
                Sentiment::Neutral => metrics.neutral += 1,
                Sentiment::Negative => metrics.negative += 1,
                Sentiment::Other(_) => {}
            }
            metrics
        },
    )
}

pub fn count_by_sentiment(rows: &[&LabeledPost]) -> Vec<SentimentCount> {
    group_counts(rows.iter().map(|row| row.sentiment.clone()))
        .into_iter()
        .map(|(sentiment, count)| SentimentCount { sentiment, count })
        .collect()
}

/// One point per (sentiment, timestamp) pair present in `rows`. Rows whose
/// timestamp does not parse are skipped. No gap filling.
pub fn count_over_time(rows: &[&LabeledPost]) -> Vec<TrendPoint> {
    group_counts(
        rows.iter()
            .filter_map(|row| Some((row.sentiment.clone(), row.post_time.parse()?))),
    )
    .into_iter()
    .map(|((sentiment, bucket), count)| TrendPoint {
        sentiment,
        bucket,
        count,
    })
    .collect()
}

pub fn count_by_source(rows: &[&LabeledPost]) -> Vec<SourceShare> {
    let total = rows.len();
    group_counts(rows.iter().map(|row| row.source.clone()))
        .into_iter()
        .map(|(source, count)| SourceShare {
            source,
            count,
            share: if total > 0 {
                count as f64 / total as f64
            } else {
                0.0
            },
        })
        .collect()
}

pub fn count_by_source_and_sentiment(rows: &[&LabeledPost]) -> Vec<SourceSentimentCount> {
    group_counts(
        rows.iter()
            .map(|row| (row.source.clone(), row.sentiment.clone())),
    )
    .into_iter()
    .map(|((source, sentiment), count)| SourceSentimentCount {
        source,
        sentiment,
        count,
    })
    .collect()
}

pub fn split_examples(rows: &[&LabeledPost]) -> ExampleRows {
    let mut examples = ExampleRows::default();
    for row in rows {
        let bucket = match row.sentiment {
            Sentiment::Positive => &mut examples.positive,
            Sentiment::Neutral => &mut examples.neutral,
            Sentiment::Negative => &mut examples.negative,
            Sentiment::Other(_) => continue,
        };
        bucket.push(ExampleRow::from(*row));
    }
    examples
}

fn group_counts<K: Ord>(keys: impl Iterator<Item = K>) -> BTreeMap<K, usize> {
    let mut counts = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Totals for the selection. Sentiments with no rows count as zero.
pub fn key_metrics(table: &PostTable, selection: &Selection) -> KeyMetrics {
    count_key_metrics(&apply_selection(table, selection))
}

pub fn sentiment_distribution(table: &PostTable, selection: &Selection) -> Vec<SentimentCount> {
    count_by_sentiment(&apply_selection(table, selection))
}

pub fn sentiment_over_time(table: &PostTable, selection: &Selection) -> Vec<TrendPoint> {
    count_over_time(&apply_selection(table, selection))
}

pub fn source_contribution(table: &PostTable, selection: &Selection) -> Vec<SourceShare> {
    count_by_source(&apply_selection(table, selection))
}

pub fn source_contribution_by_sentiment(
    table: &PostTable,
    selection: &Selection,
) -> Vec<SourceSentimentCount> {
    count_by_source_and_sentiment(&apply_selection(table, selection))
}

pub fn example_rows(table: &PostTable, selection: &Selection) -> ExampleRows {
    split_examples(&apply_selection(table, selection))
}
