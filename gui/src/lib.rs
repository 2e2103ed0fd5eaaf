use analytics::{AnalysisSession, DateBounds};
use chrono::NaiveDate;
use collector::FetchOrchestrator;
use iced::{Command, Element, Theme};
use sentiment_engine::SentimentClassifier;
use sentiscope_core::{export, AppConfig, CoreError, ErrorExt, ErrorReporter, PostSource, PostTable};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

mod views;

pub const DATE_INPUT_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone)]
pub enum Message {
    QueryChanged(String),
    LimitChanged(String),
    Analyse,
    AnalysisFinished(Result<PostTable, String>),
    FetchToFile,
    PostsSaved(Result<(PathBuf, usize), String>),
    ClassifySaved,
    Import,
    ToggleSource(String),
    SelectAllSources,
    ClearSources,
    StartDateChanged(String),
    EndDateChanged(String),
    ApplyDates,
    BoundsToggled,
    Export,
    ExportFinished(Result<PathBuf, String>),
}

/// Collaborators built once at startup and shared with every command.
#[derive(Clone)]
pub struct Services {
    pub fetcher: Arc<FetchOrchestrator<dyn PostSource>>,
    pub classifier: Arc<SentimentClassifier>,
    pub config: AppConfig,
}

pub struct App {
    services: Services,
    session: AnalysisSession,
    query_input: String,
    limit_input: String,
    start_input: String,
    end_input: String,
    notice: Option<String>,
}

impl App {
    pub fn new(services: Services) -> Self {
        let limit = services.config.fetch.per_source_limit;
        Self {
            session: AnalysisSession::new(limit),
            services,
            query_input: String::new(),
            limit_input: limit.to_string(),
            start_input: String::new(),
            end_input: String::new(),
            notice: None,
        }
    }

    pub fn session(&self) -> &AnalysisSession {
        &self.session
    }

    /// Input validation and export feedback, separate from fetch errors.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::QueryChanged(query) => {
                self.query_input = query;
                Command::none()
            }
            Message::LimitChanged(limit) => {
                self.limit_input = limit;
                Command::none()
            }
            Message::Analyse => self.start_analysis(),
            Message::AnalysisFinished(Ok(table)) => {
                self.session.complete_fetch(Ok(table));
                self.sync_date_inputs();
                Command::none()
            }
            Message::AnalysisFinished(Err(message)) => {
                self.session.fail_fetch(message);
                Command::none()
            }
            Message::FetchToFile => self.start_fetch_to_file(),
            Message::PostsSaved(Ok((path, count))) => {
                self.session.finish_without_table();
                self.notice = Some(format!("Saved {} posts to {}", count, path.display()));
                Command::none()
            }
            Message::PostsSaved(Err(message)) => {
                self.session.fail_fetch(message);
                Command::none()
            }
            Message::ClassifySaved => {
                let path = self.services.config.export.working_path.clone();
                let services = self.services.clone();
                let source = path.clone();
                self.start_load(&path, move |label| classify_saved(services, label, source))
            }
            Message::Import => {
                let path = self.services.config.export.path.clone();
                let source = path.clone();
                self.start_load(&path, move |label| async move {
                    blocking(move || export::import_table(&label, &source)).await
                })
            }
            Message::ToggleSource(source) => {
                self.session.toggle_source(&source);
                Command::none()
            }
            Message::SelectAllSources => {
                self.session.select_all_sources();
                Command::none()
            }
            Message::ClearSources => {
                self.session.clear_sources();
                Command::none()
            }
            Message::StartDateChanged(value) => {
                self.start_input = value;
                Command::none()
            }
            Message::EndDateChanged(value) => {
                self.end_input = value;
                Command::none()
            }
            Message::ApplyDates => {
                self.apply_dates();
                Command::none()
            }
            Message::BoundsToggled => {
                let bounds = match self.session.selection().window.bounds {
                    DateBounds::Inclusive => DateBounds::Exclusive,
                    DateBounds::Exclusive => DateBounds::Inclusive,
                };
                self.session.set_bounds(bounds);
                Command::none()
            }
            Message::Export => self.start_export(),
            Message::ExportFinished(Ok(path)) => {
                self.notice = Some(format!("Exported to {}", path.display()));
                Command::none()
            }
            Message::ExportFinished(Err(message)) => {
                self.notice = Some(message);
                Command::none()
            }
        }
    }

    pub fn view(&self) -> Element<Message, Theme> {
        views::render(self)
    }

    /// Validates the query and limit inputs and marks the session as
    /// fetching. `None` means the notice already says what was wrong.
    fn begin_fetch(&mut self) -> Option<(String, usize)> {
        let Ok(limit) = self.limit_input.trim().parse::<usize>() else {
            self.notice = Some("Posts per subreddit must be a whole number.".to_string());
            return None;
        };
        if let Err(e) = self.session.begin_fetch(&self.query_input, limit) {
            self.notice = Some(e.user_friendly_message());
            return None;
        }
        self.notice = None;
        Some((self.session.query().to_string(), limit))
    }

    fn start_analysis(&mut self) -> Command<Message> {
        let Some((query, limit)) = self.begin_fetch() else {
            return Command::none();
        };
        let services = self.services.clone();
        Command::perform(analyse(services, query, limit), table_message)
    }

    fn start_fetch_to_file(&mut self) -> Command<Message> {
        let Some((query, limit)) = self.begin_fetch() else {
            return Command::none();
        };
        let services = self.services.clone();
        Command::perform(fetch_to_file(services, query, limit), |result| {
            Message::PostsSaved(result.map_err(|e| {
                ErrorReporter::new().report_error(&e);
                e.user_friendly_message()
            }))
        })
    }

    /// Starts a table load from `path`. The file stem labels the session.
    fn start_load<F, Fut>(&mut self, path: &Path, load: F) -> Command<Message>
    where
        F: FnOnce(String) -> Fut,
        Fut: std::future::Future<Output = Result<PostTable, CoreError>> + Send + 'static,
    {
        let label = file_label(path);
        if let Err(e) = self.session.begin_load(&label) {
            self.notice = Some(e.user_friendly_message());
            return Command::none();
        }
        self.notice = None;
        Command::perform(load(label), table_message)
    }

    fn apply_dates(&mut self) {
        let start = NaiveDate::parse_from_str(self.start_input.trim(), DATE_INPUT_FORMAT);
        let end = NaiveDate::parse_from_str(self.end_input.trim(), DATE_INPUT_FORMAT);
        match (start, end) {
            (Ok(start), Ok(end)) => {
                self.session.set_window(start, end);
                self.notice = None;
                self.sync_date_inputs();
            }
            _ => {
                self.notice = Some("Dates must be written as YYYY-MM-DD.".to_string());
            }
        }
    }

    fn sync_date_inputs(&mut self) {
        let window = self.session.selection().window;
        self.start_input = window.start.format(DATE_INPUT_FORMAT).to_string();
        self.end_input = window.end.format(DATE_INPUT_FORMAT).to_string();
    }

    fn start_export(&mut self) -> Command<Message> {
        let Some(table) = self.session.table().cloned() else {
            self.notice = Some("Nothing to export yet.".to_string());
            return Command::none();
        };
        let path = self.services.config.export.path.clone();

        Command::perform(
            async move {
                let target = path.clone();
                blocking(move || export::export_table(&table, &target)).await?;
                Ok::<PathBuf, CoreError>(path)
            },
            |result| {
                Message::ExportFinished(result.map_err(|e| {
                    warn!("Export failed: {}", e);
                    e.user_friendly_message()
                }))
            },
        )
    }
}

/// Fetch then classify, as one unit of work.
async fn analyse(services: Services, query: String, limit: usize) -> Result<PostTable, CoreError> {
    let posts = services.fetcher.fetch(&query, limit).await?;
    let classifier = &services.config.classifier;
    let table = services
        .classifier
        .classify(&query, posts, classifier.batch_size, classifier.max_length)
        .await?;
    info!(
        "Analysis of '{}' produced {} rows with {}",
        query,
        table.len(),
        services.classifier.model_name()
    );
    Ok(table)
}

/// The first stage alone: fetch and save the unlabeled posts.
async fn fetch_to_file(
    services: Services,
    query: String,
    limit: usize,
) -> Result<(PathBuf, usize), CoreError> {
    let posts = services.fetcher.fetch(&query, limit).await?;
    let path = services.config.export.working_path.clone();
    let count = posts.len();
    let target = path.clone();
    blocking(move || export::save_posts(&posts, &target)).await?;
    Ok((path, count))
}

/// The second stage alone: classify posts saved by [`fetch_to_file`].
async fn classify_saved(
    services: Services,
    label: String,
    path: PathBuf,
) -> Result<PostTable, CoreError> {
    let posts = blocking(move || export::load_posts(&path)).await?;
    let classifier = &services.config.classifier;
    services
        .classifier
        .classify(&label, posts, classifier.batch_size, classifier.max_length)
        .await
}

async fn blocking<T, F>(task: F) -> Result<T, CoreError>
where
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| CoreError::Internal {
            message: format!("File task failed: {}", e),
        })?
}

fn table_message(result: Result<PostTable, CoreError>) -> Message {
    Message::AnalysisFinished(result.map_err(|e| {
        ErrorReporter::new().report_error(&e);
        e.user_friendly_message()
    }))
}

fn file_label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "imported".to_string())
}
