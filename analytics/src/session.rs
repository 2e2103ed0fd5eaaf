//! What the user is currently looking at: the last good table and the
//! selection applied to it.

use crate::dashboard::Dashboard;
use crate::filter::{source_list, valid_time_range, DateBounds, DateWindow, Selection};
use chrono::{NaiveDate, Utc};
use sentiscope_core::{CoreError, ErrorExt, PostTable};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Fetching,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct AnalysisSession {
    query: String,
    per_source_limit: usize,
    table: Option<Arc<PostTable>>,
    selection: Selection,
    status: SessionStatus,
}

impl AnalysisSession {
    pub fn new(per_source_limit: usize) -> Self {
        let today = Utc::now().date_naive();
        Self {
            query: String::new(),
            per_source_limit,
            table: None,
            selection: Selection::new(Vec::<String>::new(), DateWindow::new(today, today)),
            status: SessionStatus::Idle,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn per_source_limit(&self) -> usize {
        self.per_source_limit
    }

    pub fn table(&self) -> Option<&Arc<PostTable>> {
        self.table.as_ref()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn is_fetching(&self) -> bool {
        self.status == SessionStatus::Fetching
    }

    /// Message of the last failed fetch, shown next to the stale table.
    pub fn last_error(&self) -> Option<&str> {
        match &self.status {
            SessionStatus::Failed(message) => Some(message),
            _ => None,
        }
    }

    /// Sources present in the current table, in first-seen order.
    pub fn available_sources(&self) -> Vec<String> {
        self.table
            .as_deref()
            .map(source_list)
            .unwrap_or_default()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.table.as_deref().and_then(valid_time_range)
    }

    pub fn begin_fetch(&mut self, query: &str, per_source_limit: usize) -> Result<(), CoreError> {
        if self.is_fetching() {
            return Err(CoreError::invalid_input("A fetch is already running"));
        }
        let query = query.trim();
        if query.is_empty() {
            return Err(CoreError::invalid_input("Search query must not be empty"));
        }
        if per_source_limit == 0 {
            return Err(CoreError::invalid_input(
                "Posts per subreddit must be at least 1",
            ));
        }

        self.query = query.to_string();
        self.per_source_limit = per_source_limit;
        self.status = SessionStatus::Fetching;
        info!("Fetching '{}' ({} posts per source)", query, per_source_limit);
        Ok(())
    }

    /// Starts loading a table from a file instead of the source. `label`
    /// becomes the session's query.
    pub fn begin_load(&mut self, label: &str) -> Result<(), CoreError> {
        if self.is_fetching() {
            return Err(CoreError::invalid_input("A fetch is already running"));
        }
        self.query = label.to_string();
        self.status = SessionStatus::Fetching;
        info!("Loading '{}' from file", label);
        Ok(())
    }

    /// Ends a fetch that produced no table, such as saving raw posts to a
    /// file. The current table and selection are unchanged.
    pub fn finish_without_table(&mut self) {
        self.status = if self.table.is_some() {
            SessionStatus::Ready
        } else {
            SessionStatus::Idle
        };
    }

    /// A new table replaces the old one and resets the selection to all of
    /// it. On failure the previous table and selection stay in place.
    pub fn complete_fetch(&mut self, result: Result<PostTable, CoreError>) {
        match result {
            Ok(table) => {
                let sources = source_list(&table);
                let bounds = self.selection.window.bounds;
                let window = match valid_time_range(&table) {
                    Some((start, end)) => DateWindow::new(start, end),
                    None => self.selection.window,
                }
                .with_bounds(bounds);

                info!(
                    "Loaded {} rows from {} sources for '{}'",
                    table.len(),
                    sources.len(),
                    table.query()
                );
                self.selection = Selection::new(sources, window);
                self.table = Some(Arc::new(table));
                self.status = SessionStatus::Ready;
            }
            Err(error) => {
                warn!("Fetch failed, keeping previous results: {}", error);
                self.fail_fetch(error.user_friendly_message());
            }
        }
    }

    /// Records a failure already rendered for display. The table and
    /// selection are left as they were.
    pub fn fail_fetch(&mut self, message: impl Into<String>) {
        self.status = SessionStatus::Failed(message.into());
    }

    pub fn toggle_source(&mut self, source: &str) {
        if !self.selection.sources.remove(source) {
            self.selection.sources.insert(source.to_string());
        }
    }

    pub fn select_all_sources(&mut self) {
        self.selection.sources = self.available_sources().into_iter().collect();
    }

    pub fn clear_sources(&mut self) {
        self.selection.sources = BTreeSet::new();
    }

    /// Sets the window, clamped to the table's observed date range.
    pub fn set_window(&mut self, start: NaiveDate, end: NaiveDate) {
        let (start, end) = match self.date_range() {
            Some((min, max)) => (start.clamp(min, max), end.clamp(min, max)),
            None => (start, end),
        };
        self.selection.window.start = start;
        self.selection.window.end = end;
    }

    pub fn set_bounds(&mut self, bounds: DateBounds) {
        self.selection.window.bounds = bounds;
    }

    pub fn dashboard(&self) -> Option<Dashboard> {
        self.table
            .as_deref()
            .map(|table| Dashboard::build(table, &self.selection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentiscope_core::{LabeledPost, PostTime, Sentiment, SourceApiError};

    fn row(source: &str, post_time: &str, sentiment: Sentiment) -> LabeledPost {
        LabeledPost {
            title: "t".to_string(),
            source: source.to_string(),
            post_time: PostTime::new(post_time),
            text: "x".to_string(),
            link: String::new(),
            sentiment,
            normalized_text: "t x".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_table() -> PostTable {
        PostTable::new(
            "rust",
            vec![
                row("rust", "01/2024", Sentiment::Positive),
                row("learnrust", "03/2024", Sentiment::Negative),
                row("rust", "06/2024", Sentiment::Neutral),
            ],
        )
    }

    #[test]
    fn test_begin_fetch_validation() {
        let mut session = AnalysisSession::new(100);
        assert!(session.begin_fetch("  ", 10).is_err());
        assert!(session.begin_fetch("rust", 0).is_err());
        assert_eq!(session.status(), &SessionStatus::Idle);

        session.begin_fetch(" rust ", 25).unwrap();
        assert!(session.is_fetching());
        assert_eq!(session.query(), "rust");
        assert_eq!(session.per_source_limit(), 25);

        // One fetch at a time
        assert!(session.begin_fetch("other", 25).is_err());
    }

    #[test]
    fn test_successful_fetch_selects_everything() {
        let mut session = AnalysisSession::new(100);
        session.begin_fetch("rust", 100).unwrap();
        session.complete_fetch(Ok(sample_table()));

        assert_eq!(session.status(), &SessionStatus::Ready);
        assert_eq!(session.available_sources(), vec!["rust", "learnrust"]);
        assert_eq!(session.selection().sources.len(), 2);
        assert_eq!(session.selection().window.start, date(2024, 1, 1));
        assert_eq!(session.selection().window.end, date(2024, 6, 1));

        let dashboard = session.dashboard().unwrap();
        assert_eq!(dashboard.metrics.total, 3);
    }

    #[test]
    fn test_failed_fetch_keeps_stale_table() {
        let mut session = AnalysisSession::new(100);
        session.begin_fetch("rust", 100).unwrap();
        session.complete_fetch(Ok(sample_table()));
        session.toggle_source("learnrust");
        let selection_before = session.selection().clone();

        session.begin_fetch("cpp", 100).unwrap();
        session.complete_fetch(Err(CoreError::SourceApi(SourceApiError::ServerError {
            status_code: 502,
        })));

        assert!(session.last_error().is_some());
        assert_eq!(session.table().unwrap().query(), "rust");
        assert_eq!(session.table().unwrap().len(), 3);
        assert_eq!(session.selection(), &selection_before);
        assert_eq!(session.dashboard().unwrap().metrics.total, 2);
    }

    #[test]
    fn test_source_toggles() {
        let mut session = AnalysisSession::new(100);
        session.begin_fetch("rust", 100).unwrap();
        session.complete_fetch(Ok(sample_table()));

        session.toggle_source("rust");
        assert!(!session.selection().sources.contains("rust"));
        session.toggle_source("rust");
        assert!(session.selection().sources.contains("rust"));

        session.clear_sources();
        assert!(session.dashboard().unwrap().is_empty());

        session.select_all_sources();
        assert_eq!(session.selection().sources.len(), 2);
    }

    #[test]
    fn test_window_is_clamped_to_data() {
        let mut session = AnalysisSession::new(100);
        session.begin_fetch("rust", 100).unwrap();
        session.complete_fetch(Ok(sample_table()));

        session.set_window(date(2020, 1, 1), date(2030, 1, 1));
        assert_eq!(session.selection().window.start, date(2024, 1, 1));
        assert_eq!(session.selection().window.end, date(2024, 6, 1));

        session.set_window(date(2024, 2, 1), date(2024, 5, 1));
        assert_eq!(session.dashboard().unwrap().metrics.total, 1);
    }

    #[test]
    fn test_file_load_and_fetch_without_table() {
        let mut session = AnalysisSession::new(100);
        session.begin_fetch("rust", 10).unwrap();
        session.finish_without_table();
        assert_eq!(session.status(), &SessionStatus::Idle);

        session.begin_load("sentiment").unwrap();
        assert!(session.is_fetching());
        assert!(session.begin_load("again").is_err());
        session.complete_fetch(Ok(sample_table()));
        assert_eq!(session.query(), "sentiment");

        session.begin_fetch("cpp", 10).unwrap();
        session.finish_without_table();
        assert_eq!(session.status(), &SessionStatus::Ready);
        assert_eq!(session.table().unwrap().len(), 3);
    }

    #[test]
    fn test_bounds_survive_a_new_fetch() {
        let mut session = AnalysisSession::new(100);
        session.set_bounds(DateBounds::Exclusive);
        session.begin_fetch("rust", 100).unwrap();
        session.complete_fetch(Ok(sample_table()));
        assert_eq!(session.selection().window.bounds, DateBounds::Exclusive);
    }
}
