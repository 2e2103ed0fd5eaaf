use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Display format the fetcher normalizes every timestamp to.
pub const MONTH_FORMAT: &str = "%m/%Y";
const FULL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A post as returned by the source, before it is tied to a table row.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPost {
    pub title: String,
    pub text: Option<String>,
    pub created_utc: i64,
    pub url: String,
}

/// Textual timestamp of a row.
///
/// Rows carry the timestamp as text because the fetcher coarsens it to
/// month/year for display and tables can be re-imported from CSV. Consumers
/// that need a point in time call [`PostTime::parse`], which is lenient and
/// returns `None` instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostTime(String);

impl PostTime {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime.format(FULL_FORMAT).to_string())
    }

    pub fn from_timestamp(epoch_seconds: i64) -> Self {
        match DateTime::from_timestamp(epoch_seconds, 0) {
            Some(datetime) => Self::from_datetime(datetime),
            None => Self(epoch_seconds.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Coarsens to `MM/YYYY`. Unparseable values are kept as they are.
    pub fn to_month(&self) -> PostTime {
        match self.parse() {
            Some(datetime) => Self(datetime.format(MONTH_FORMAT).to_string()),
            None => self.clone(),
        }
    }

    pub fn parse(&self) -> Option<NaiveDateTime> {
        parse_lenient(&self.0)
    }
}

impl fmt::Display for PostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_lenient(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Some(datetime.naive_utc());
    }

    for format in [FULL_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
            return Some(datetime);
        }
    }

    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    // MM/YYYY has no day, so chrono cannot parse it directly.
    let (month, year) = value.split_once('/')?;
    if year.len() != 4 {
        return None;
    }
    let month: u32 = month.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

/// Sentiment label returned by the classifier, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Other(String),
}

impl Sentiment {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "neutral" => Sentiment::Neutral,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Other(label.trim().to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Sentiment::Positive => 0,
            Sentiment::Neutral => 1,
            Sentiment::Negative => 2,
            Sentiment::Other(_) => 3,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
            Sentiment::Other(label) => label,
        }
    }
}

impl From<String> for Sentiment {
    fn from(label: String) -> Self {
        Sentiment::from_label(&label)
    }
}

impl From<Sentiment> for String {
    fn from(sentiment: Sentiment) -> Self {
        sentiment.as_str().to_string()
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sorted by display label. A hand-built `Other` that spells a known label
/// sorts right after it, so ordering agrees with equality.
impl Ord for Sentiment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str()
            .cmp(other.as_str())
            .then_with(|| self.rank().cmp(&other.rank()))
    }
}

impl PartialOrd for Sentiment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub title: String,
    pub source: String,
    pub post_time: PostTime,
    pub text: Option<String>,
    pub link: String,
}

impl Post {
    pub fn from_raw(source: &str, raw: RawPost) -> Self {
        Self {
            title: raw.title,
            source: source.to_string(),
            post_time: PostTime::from_timestamp(raw.created_utc),
            text: raw.text,
            link: raw.url,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPost {
    pub title: String,
    pub source: String,
    pub post_time: PostTime,
    pub text: String,
    pub link: String,
    pub sentiment: Sentiment,
    /// Cleaned title + text fed to the classifier. Never exported.
    pub normalized_text: String,
}

impl LabeledPost {
    pub fn new(post: Post, text: String, normalized_text: String, sentiment: Sentiment) -> Self {
        Self {
            title: post.title,
            source: post.source,
            post_time: post.post_time,
            text,
            link: post.link,
            sentiment,
            normalized_text,
        }
    }
}

/// The labeled rows of one analysis run. Replaced wholesale, never edited.
#[derive(Debug, Clone)]
pub struct PostTable {
    query: String,
    rows: Vec<LabeledPost>,
    created_at: DateTime<Utc>,
}

impl PostTable {
    pub fn new(query: impl Into<String>, rows: Vec<LabeledPost>) -> Self {
        Self {
            query: query.into(),
            rows,
            created_at: Utc::now(),
        }
    }

    pub fn empty(query: impl Into<String>) -> Self {
        Self::new(query, Vec::new())
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn rows(&self) -> &[LabeledPost] {
        &self.rows
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LabeledPost> {
        self.rows.iter()
    }
}

/// Remote quota as last reported by the source.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateLimitQuota {
    pub remaining: Option<f64>,
    /// Epoch seconds at which the remote window resets.
    pub reset_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    #[serde(default)]
    pub score: Option<f32>,
}
