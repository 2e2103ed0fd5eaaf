use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sentiscope_core::{LabeledPost, PostTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How the window's edges treat a post that falls exactly on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateBounds {
    #[default]
    Inclusive,
    /// Strict on both sides, so a post stamped exactly at midnight on the
    /// start date is left out.
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub bounds: DateBounds,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            bounds: DateBounds::default(),
        }
    }

    pub fn with_bounds(mut self, bounds: DateBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn start_of_day(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN)
    }

    pub fn end_of_day(&self) -> NaiveDateTime {
        // Last representable instant of the end date
        self.end.and_time(
            NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN),
        )
    }

    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        let (start, end) = (self.start_of_day(), self.end_of_day());
        match self.bounds {
            DateBounds::Inclusive => start <= instant && instant <= end,
            DateBounds::Exclusive => start < instant && instant < end,
        }
    }
}

/// The sources and date window every aggregate is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub sources: BTreeSet<String>,
    pub window: DateWindow,
}

impl Selection {
    pub fn new<I, S>(sources: I, window: DateWindow) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            window,
        }
    }

    /// Every source in `table` over its full valid date range, or `None`
    /// when no row has a parseable timestamp.
    pub fn everything(table: &PostTable) -> Option<Self> {
        let (start, end) = valid_time_range(table)?;
        Some(Self::new(source_list(table), DateWindow::new(start, end)))
    }
}

pub fn filter_by_source<'a>(
    rows: impl IntoIterator<Item = &'a LabeledPost>,
    sources: &BTreeSet<String>,
) -> Vec<&'a LabeledPost> {
    rows.into_iter()
        .filter(|row| sources.contains(&row.source))
        .collect()
}

/// Rows whose timestamp parses and falls inside `window`. Unparseable rows
/// are left out.
pub fn filter_by_date<'a>(
    rows: impl IntoIterator<Item = &'a LabeledPost>,
    window: &DateWindow,
) -> Vec<&'a LabeledPost> {
    rows.into_iter()
        .filter(|row| {
            row.post_time
                .parse()
                .is_some_and(|instant| window.contains(instant))
        })
        .collect()
}

/// Source filter first, then date filter.
pub fn apply_selection<'a>(table: &'a PostTable, selection: &Selection) -> Vec<&'a LabeledPost> {
    let by_source = filter_by_source(table.iter(), &selection.sources);
    filter_by_date(by_source, &selection.window)
}

/// Unique sources in first-seen order.
pub fn source_list(table: &PostTable) -> Vec<String> {
    let mut seen = BTreeSet::new();
    table
        .iter()
        .filter(|row| seen.insert(row.source.as_str()))
        .map(|row| row.source.clone())
        .collect()
}

/// Earliest and latest dates over rows with a parseable timestamp.
pub fn valid_time_range(table: &PostTable) -> Option<(NaiveDate, NaiveDate)> {
    let mut dates = table
        .iter()
        .filter_map(|row| row.post_time.parse())
        .map(|instant| instant.date());

    let first = dates.next()?;
    Some(dates.fold((first, first), |(min, max), date| {
        (min.min(date), max.max(date))
    }))
}
