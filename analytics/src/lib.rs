//! Filtering and aggregation over a labeled post table.

pub mod aggregate;
pub mod dashboard;
pub mod filter;
pub mod session;

pub use aggregate::*;
pub use dashboard::{Dashboard, EmptyReason, FilterOutcome};
pub use filter::{
    apply_selection, filter_by_date, filter_by_source, source_list, valid_time_range, DateBounds,
    DateWindow, Selection,
};
pub use session::{AnalysisSession, SessionStatus};
